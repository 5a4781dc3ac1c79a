// src/render/mod.rs
//
// Message text to display structure. Pure over the message: safe to call on
// every patch while a response streams.

pub mod highlight;
pub mod markdown;
pub mod terminal;
pub mod thinking;

use crate::parser::parse_message;
use crate::types::Message;

use highlight::escape_html;
pub use markdown::{Block, CodeBlock};
pub use terminal::{blocks_terminal, code_block_terminal};
pub use thinking::{ThinkingSection, ThinkingState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    /// User text, shown verbatim.
    Plain(String),
    /// Assistant placeholder before any content has arrived.
    Typing,
    Rendered {
        thinking: Option<ThinkingSection>,
        blocks: Vec<Block>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: String,
    pub is_user: bool,
    pub streaming: bool,
    pub body: Body,
}

pub fn render_message(message: &Message, thinking: &ThinkingState) -> RenderedMessage {
    let body = if message.is_user() {
        Body::Plain(message.content.clone())
    } else if message.pending && message.content.is_empty() {
        Body::Typing
    } else {
        let parsed = parse_message(&message.content, message.streaming);
        Body::Rendered {
            thinking: parsed.reasoning.as_deref().map(|reasoning| {
                ThinkingSection::new(reasoning, thinking.is_expanded(&message.id), message.streaming)
            }),
            blocks: markdown::render_blocks(&parsed.final_text),
        }
    };

    RenderedMessage {
        id: message.id.clone(),
        is_user: message.is_user(),
        streaming: message.streaming,
        body,
    }
}

impl RenderedMessage {
    pub fn to_html(&self) -> String {
        let class = if self.is_user { "message user" } else { "message assistant" };
        let inner = match &self.body {
            Body::Plain(text) => format!("<p class=\"plain\">{}</p>", escape_html(text)),
            Body::Typing => "<p class=\"typing\">...</p>".to_string(),
            Body::Rendered { thinking, blocks } => {
                let mut out = String::new();
                if let Some(section) = thinking {
                    out.push_str(&thinking_html(section));
                }
                out.push_str(&blocks_html(blocks));
                out
            }
        };
        format!("<div class=\"{class}\" id=\"m-{}\">{inner}</div>\n", escape_html(&self.id))
    }
}

fn blocks_html(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::Markdown { html, .. } => html.clone(),
            Block::Code(code) => markdown::code_block_html(code),
        })
        .collect()
}

fn thinking_html(section: &ThinkingSection) -> String {
    format!(
        "<details class=\"thinking\"{}><summary>Thinking <span class=\"badge\">{}</span></summary>{}</details>\n",
        if section.expanded { " open" } else { "" },
        section.badge(),
        blocks_html(&section.blocks)
    )
}

const TRANSCRIPT_STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem}\
.message{margin:1rem 0;padding:.75rem 1rem;border-radius:.75rem}\
.user{background:#6d28d9;color:#fff;margin-left:20%}\
.assistant{background:#f3f4f6}\
.code-block{position:relative}.code-block pre{padding:1rem;overflow-x:auto;border-radius:.375rem}\
.code-header{display:flex;justify-content:space-between;font:12px monospace}\
.thinking summary{cursor:pointer;color:#6b7280}";

const COPY_SCRIPT: &str = "document.querySelectorAll('.copy-code').forEach(b=>b.addEventListener('click',()=>{\
navigator.clipboard.writeText(b.dataset.code);b.textContent='Copied';setTimeout(()=>b.textContent='Copy',2000)}));";

/// A standalone HTML document for one chat.
pub fn transcript_html(title: &str, messages: &[Message]) -> String {
    let state = ThinkingState::new();
    let body: String = messages
        .iter()
        .map(|m| render_message(m, &state).to_html())
        .collect();

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{TRANSCRIPT_STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}<script>{COPY_SCRIPT}</script>\n</body>\n</html>\n",
        title = escape_html(title),
    )
}
