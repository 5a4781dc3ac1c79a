// src/parser.rs
//
// Splits a message's accumulated text into reasoning and final answer using
// the in-band `<think>...</think>` markers. Pure: safe to call on every
// growing prefix of a streaming message.
//
// While a message streams, a tag may be cut off mid-way ("<thi", "</thi").
// Those fragments are held back until they resolve. Once the message has
// settled nothing more can arrive, so the text is taken as it is.

pub const OPEN_TAG: &str = "<think>";
pub const CLOSE_TAG: &str = "</think>";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedMessage {
    /// Text inside the first tag pair, `None` when the message has no reasoning.
    pub reasoning: Option<String>,
    /// Text after the reasoning, or the whole message when there is none.
    pub final_text: String,
}

impl ParsedMessage {
    fn plain(text: &str) -> Self {
        Self {
            reasoning: None,
            final_text: text.to_string(),
        }
    }
}

/// Parse the full text seen so far. `streaming` says whether more text may
/// still arrive.
///
/// * no tags: everything is final text
/// * open tag without close tag: reasoning, final is empty
/// * both tags: reasoning is the first pair's interior, final is what follows it
///
/// A close tag with no open tag before it counts as no tags. Only the first
/// pair is honoured; later pairs stay in the final text.
pub fn parse_message(text: &str, streaming: bool) -> ParsedMessage {
    // The opening tag may still be arriving ("<thi").
    let lead = text.trim_start();
    if streaming && !lead.is_empty() && lead.len() < OPEN_TAG.len() && OPEN_TAG.starts_with(lead) {
        return ParsedMessage::default();
    }

    let Some(open) = text.find(OPEN_TAG) else {
        return ParsedMessage::plain(text);
    };
    let after_open = &text[open + OPEN_TAG.len()..];

    match after_open.find(CLOSE_TAG) {
        Some(close) => ParsedMessage {
            reasoning: Some(after_open[..close].trim().to_string()),
            final_text: after_open[close + CLOSE_TAG.len()..].trim().to_string(),
        },
        // A close tag that only appears before the open tag pairs with nothing.
        None if text.contains(CLOSE_TAG) => ParsedMessage::plain(text),
        None => {
            let interior = after_open
                .split(OPEN_TAG)
                .next()
                .unwrap_or(after_open);
            let interior = if streaming { strip_partial_close(interior) } else { interior };
            ParsedMessage {
                reasoning: Some(interior.trim().to_string()),
                final_text: String::new(),
            }
        }
    }
}

/// Withhold a trailing fragment of `</think>` until it either completes or
/// turns out to be ordinary text.
fn strip_partial_close(text: &str) -> &str {
    for len in (1..CLOSE_TAG.len()).rev() {
        if text.ends_with(&CLOSE_TAG[..len]) {
            return &text[..text.len() - len];
        }
    }
    text
}

/// Whitespace-separated word count, shown on the thinking section badge.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_tags_is_all_final() {
        let parsed = parse_message("Just an answer.", false);
        assert_eq!(parsed.reasoning, None);
        assert_eq!(parsed.final_text, "Just an answer.");
    }

    #[test]
    fn test_open_tag_only_hides_final() {
        let parsed = parse_message("<think>  working it out ", true);
        assert_eq!(parsed.reasoning.as_deref(), Some("working it out"));
        assert_eq!(parsed.final_text, "");
    }

    #[test]
    fn test_complete_pair() {
        let parsed = parse_message("<think>\nstep one\nstep two\n</think>\n\nThe answer is 4.", false);
        assert_eq!(parsed.reasoning.as_deref(), Some("step one\nstep two"));
        assert_eq!(parsed.final_text, "The answer is 4.");
    }

    #[test]
    fn test_close_without_open_is_plain() {
        let text = "stray </think> tag";
        assert_eq!(parse_message(text, false), ParsedMessage::plain(text));

        let text = "</think> before <think> after";
        assert_eq!(parse_message(text, false), ParsedMessage::plain(text));
    }

    #[test]
    fn test_first_pair_wins() {
        let parsed = parse_message("<think>a</think>b<think>c</think>d", false);
        assert_eq!(parsed.reasoning.as_deref(), Some("a"));
        assert_eq!(parsed.final_text, "b<think>c</think>d");
    }

    #[test]
    fn test_empty_reasoning() {
        let parsed = parse_message("<think></think>Hi", false);
        assert_eq!(parsed.reasoning.as_deref(), Some(""));
        assert_eq!(parsed.final_text, "Hi");
    }

    #[test]
    fn test_growing_prefixes() {
        let full = "<think>Let me consider this carefully</think>The answer is 42.";
        let close_at = full.find(CLOSE_TAG).unwrap();
        let close_end = close_at + CLOSE_TAG.len();
        let interior = &full[OPEN_TAG.len()..close_at];

        for end in 1..=full.len() {
            let prefix = &full[..end];
            let parsed = parse_message(prefix, true);

            if end < close_end {
                assert_eq!(parsed.final_text, "", "prefix {prefix:?}");
            }
            if end > OPEN_TAG.len() && end <= close_at {
                let so_far = interior[..end - OPEN_TAG.len()].trim();
                assert_eq!(parsed.reasoning.as_deref(), Some(so_far), "prefix {prefix:?}");
            }
            if end >= close_end {
                assert_eq!(parsed.reasoning.as_deref(), Some(interior));
                assert_eq!(parsed.final_text, full[close_end..end].trim());
            }
        }
    }

    #[test]
    fn test_fragmented_scenario() {
        let mut acc = String::new();
        let mut finals = Vec::new();
        for fragment in ["<thi", "nk>Let me ", "consider</think>Hi there!"] {
            acc.push_str(fragment);
            finals.push(parse_message(&acc, true).final_text);
        }

        assert_eq!(finals, vec!["", "", "Hi there!"]);
        let parsed = parse_message(&acc, true);
        assert_eq!(parsed.reasoning.as_deref(), Some("Let me consider"));
        assert_eq!(parsed.final_text, "Hi there!");
    }

    #[test]
    fn test_partial_close_tag_is_withheld() {
        let parsed = parse_message("<think>almost done</thi", true);
        assert_eq!(parsed.reasoning.as_deref(), Some("almost done"));
        assert_eq!(parsed.final_text, "");
    }

    #[test]
    fn test_settled_text_keeps_tag_fragments() {
        for text in ["<", "<t", "<think", " <thi"] {
            let parsed = parse_message(text, false);
            assert_eq!(parsed.reasoning, None);
            assert_eq!(parsed.final_text, text);
        }

        let parsed = parse_message("<think>cut off at </thi", false);
        assert_eq!(parsed.reasoning.as_deref(), Some("cut off at </thi"));
    }

    #[test]
    fn test_streaming_withholds_open_tag_prefix() {
        for text in ["<", "<t", "<think"] {
            assert_eq!(parse_message(text, true), ParsedMessage::default());
        }
        assert_eq!(parse_message("<b>", true).final_text, "<b>");
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree\tfour  "), 4);
        assert_eq!(word_count(""), 0);
    }
}
