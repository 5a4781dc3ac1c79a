// src/render/markdown.rs
//
// Markdown to blocks. Fenced and indented code is split out of the event
// stream so each block can be highlighted and copied on its own; everything
// else goes through pulldown-cmark's HTML writer.

use std::ops::Range;

use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use super::highlight::{highlight_html, language_label};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeBlock {
    /// Fence info string's first word, empty when absent.
    pub language: String,
    pub label: String,
    /// Copy text: the block's content without its final newline.
    pub code: String,
    pub html: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// Prose, as HTML and as the markdown it came from.
    Markdown { html: String, source: String },
    Code(CodeBlock),
}

pub fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_MATH);
    options
}

/// Render `text` into blocks. Never fails: partial input such as an
/// unterminated fence renders as whatever structure it has so far.
pub fn render_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending = Pending::default();
    let mut code: Option<(String, String)> = None;

    for (event, range) in Parser::new_ext(text, options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                pending.flush(text, &mut blocks);
                let language = match kind {
                    CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or("").to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some((language, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((language, body)) = code.take() {
                    blocks.push(Block::Code(code_block(language, &body)));
                }
            }
            Event::Text(t) if code.is_some() => {
                if let Some((_, body)) = code.as_mut() {
                    body.push_str(&t);
                }
            }
            e => {
                if code.is_none() {
                    pending.push(e, range);
                }
            }
        }
    }

    // The parser closes open blocks at end of input, but keep whatever
    // was collected if it ever does not.
    if let Some((language, body)) = code.take() {
        blocks.push(Block::Code(code_block(language, &body)));
    }
    pending.flush(text, &mut blocks);
    blocks
}

/// Whole document as one HTML string.
pub fn render_html(text: &str) -> String {
    render_blocks(text)
        .into_iter()
        .map(|block| match block {
            Block::Markdown { html, .. } => html,
            Block::Code(code) => code_block_html(&code),
        })
        .collect()
}

pub fn code_block_html(code: &CodeBlock) -> String {
    let copy = super::highlight::escape_html(&code.code);
    format!(
        "<div class=\"code-block\"><div class=\"code-header\"><span class=\"code-language\">{}</span>\
         <button class=\"copy-code\" data-code=\"{}\">Copy</button></div>{}</div>\n",
        super::highlight::escape_html(&code.label),
        copy,
        code.html
    )
}

fn code_block(language: String, body: &str) -> CodeBlock {
    let code = body.strip_suffix('\n').unwrap_or(body).to_string();
    CodeBlock {
        label: language_label(&language),
        html: highlight_html(body, &language),
        language,
        code,
    }
}

/// Prose events waiting for the next code block, with the source they span.
#[derive(Default)]
struct Pending<'a> {
    events: Vec<Event<'a>>,
    span: Option<Range<usize>>,
}

impl<'a> Pending<'a> {
    fn push(&mut self, event: Event<'a>, range: Range<usize>) {
        self.span = Some(match self.span.take() {
            Some(span) => span.start.min(range.start)..span.end.max(range.end),
            None => range,
        });
        self.events.push(event);
    }

    fn flush(&mut self, text: &str, blocks: &mut Vec<Block>) {
        let span = self.span.take();
        if self.events.is_empty() {
            return;
        }
        let mut out = String::new();
        html::push_html(&mut out, self.events.drain(..));
        if out.trim().is_empty() {
            return;
        }
        let source = span
            .and_then(|s| text.get(s))
            .unwrap_or_default()
            .trim_end()
            .to_string();
        blocks.push(Block::Markdown { html: out, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_blocks(blocks: &[Block]) -> Vec<&CodeBlock> {
        blocks
            .iter()
            .filter_map(|b| match b {
                Block::Code(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_code_block_is_split_out() {
        let blocks = render_blocks("Intro\n\n```python\nprint('hi')\n```\n\nOutro");
        assert_eq!(blocks.len(), 3);

        let code = code_blocks(&blocks);
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].language, "python");
        assert_eq!(code[0].code, "print('hi')");
        assert!(matches!(&blocks[0], Block::Markdown { html, source } if html.contains("<p>Intro</p>") && source == "Intro"));
        assert!(matches!(&blocks[2], Block::Markdown { html, source } if html.contains("<p>Outro</p>") && source == "Outro"));
    }

    #[test]
    fn test_gfm_extensions() {
        let html = render_html("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains("checkbox"));
    }

    #[test]
    fn test_inline_code_stays_in_markdown() {
        let blocks = render_blocks("Use `cargo` here");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0], Block::Markdown { html, .. } if html.contains("<code>cargo</code>")));
    }

    #[test]
    fn test_math_is_marked_up() {
        let html = render_html("Euler: $e^{i\\pi} + 1 = 0$");
        assert!(html.contains("math"));
    }

    #[test]
    fn test_unterminated_fence_renders_every_prefix() {
        let text = "Here:\n\n```rust\nfn main() {\n    println!(\"hi\");\n}\n```\nDone.";
        for end in 0..=text.len() {
            let _ = render_blocks(&text[..end]);
        }

        let partial = render_blocks("Here:\n\n```rust\nfn main() {");
        let code = code_blocks(&partial);
        assert_eq!(code.len(), 1);
        assert_eq!(code[0].code, "fn main() {");
    }

    #[test]
    fn test_markdown_source_spans_several_blocks() {
        let blocks = render_blocks("# Title\n\n- one\n- two\n\n```sh\nls\n```");
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0], Block::Markdown { source, .. } if source == "# Title\n\n- one\n- two"));
    }

    #[test]
    fn test_empty_input() {
        assert!(render_blocks("").is_empty());
        assert!(render_blocks("   \n").is_empty());
    }
}
