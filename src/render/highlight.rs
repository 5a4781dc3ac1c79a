// src/render/highlight.rs

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::{as_24_bit_terminal_escaped, LinesWithEndings};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const THEME_NAME: &str = "base16-ocean.dark";
const ANSI_RESET: &str = "\x1b[0m";

/// Human-readable name for a fence tag, or the tag itself when unknown.
pub fn language_label(language: &str) -> String {
    let label = match language {
        "js" => "JavaScript",
        "jsx" => "React JSX",
        "ts" => "TypeScript",
        "tsx" => "React TSX",
        "py" => "Python",
        "rb" => "Ruby",
        "java" => "Java",
        "go" => "Go",
        "rust" => "Rust",
        "c" => "C",
        "cpp" => "C++",
        "cs" => "C#",
        "php" => "PHP",
        "html" => "HTML",
        "css" => "CSS",
        "json" => "JSON",
        "yaml" => "YAML",
        "md" => "Markdown",
        "sql" => "SQL",
        "bash" => "Bash",
        "sh" => "Shell",
        other => other,
    };
    label.to_string()
}

fn theme() -> Option<&'static Theme> {
    THEMES
        .themes
        .get(THEME_NAME)
        .or_else(|| THEMES.themes.values().next())
}

// Token, then extension, then name.
fn syntax_for(language: &str) -> &'static SyntaxReference {
    let ss: &'static SyntaxSet = &SYNTAXES;
    let language = language.trim();
    if language.is_empty() {
        return ss.find_syntax_plain_text();
    }
    ss.find_syntax_by_token(language)
        .or_else(|| ss.find_syntax_by_extension(language))
        .or_else(|| ss.find_syntax_by_name(language))
        .unwrap_or_else(|| ss.find_syntax_plain_text())
}

/// Highlighted `<pre>` for a code block. Falls back to escaped plain text if
/// highlighting fails.
pub fn highlight_html(code: &str, language: &str) -> String {
    let Some(theme) = theme() else {
        return plain_html(code);
    };

    match highlighted_html_for_string(code, &SYNTAXES, syntax_for(language), theme) {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!("[render] highlighting '{language}' failed: {e}");
            plain_html(code)
        }
    }
}

/// `code` with 24-bit ANSI colours, ending in a reset. Lines that fail to
/// highlight are kept as plain text.
pub fn highlight_terminal(code: &str, language: &str) -> String {
    let Some(theme) = theme() else {
        return code.to_string();
    };

    let mut highlighter = HighlightLines::new(syntax_for(language), theme);
    let mut out = String::with_capacity(code.len() * 2);
    for line in LinesWithEndings::from(code) {
        match highlighter.highlight_line(line, &SYNTAXES) {
            Ok(ranges) => out.push_str(&as_24_bit_terminal_escaped(&ranges, false)),
            Err(e) => {
                tracing::warn!("[render] highlighting '{language}' failed: {e}");
                out.push_str(line);
            }
        }
    }
    out.push_str(ANSI_RESET);
    out
}

pub fn plain_html(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", escape_html(code))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_labels() {
        assert_eq!(language_label("py"), "Python");
        assert_eq!(language_label("cpp"), "C++");
        assert_eq!(language_label("zig"), "zig");
    }

    #[test]
    fn test_known_language_is_styled() {
        let html = highlight_html("fn main() {}\n", "rust");
        assert!(html.starts_with("<pre"));
        assert!(html.contains("style="));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_unknown_language_still_escapes() {
        let html = highlight_html("<b>&</b>\n", "no-such-language");
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_terminal_highlight_colours_and_resets() {
        let out = highlight_terminal("fn main() {}", "rust");
        assert!(out.contains("\x1b[38;2;"));
        assert!(out.contains("main"));
        assert!(out.ends_with(ANSI_RESET));
    }

    #[test]
    fn test_terminal_highlight_keeps_unknown_language_text() {
        let out = highlight_terminal("a <b> c\nsecond", "no-such-language");
        assert!(out.contains("a <b> c"));
        assert!(out.contains("second"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;");
    }
}
