// src/render/terminal.rs
//
// Blocks to text for the terminal. Prose is printed as the markdown it came
// from; code blocks get a language header and ANSI highlighting.

use super::highlight::highlight_terminal;
use super::markdown::{Block, CodeBlock};

pub fn code_block_terminal(code: &CodeBlock) -> String {
    let label = if code.label.is_empty() { "code" } else { code.label.as_str() };
    format!("[{label}]\n{}\n", highlight_terminal(&code.code, &code.language))
}

/// Blocks separated by blank lines, each ending in a newline.
pub fn blocks_terminal(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(|block| match block {
            Block::Markdown { source, .. } => format!("{source}\n"),
            Block::Code(code) => code_block_terminal(code),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
