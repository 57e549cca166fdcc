//! Streaming removal of `<think>...</think>` reasoning blocks.
//!
//! Local reasoning models emit their chain of thought inline. The filter
//! works on arbitrary chunk boundaries: a tag split across two deltas is held
//! back until it can be recognised.

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Default)]
pub struct ReasoningFilter {
    pending: String,
    inside: bool,
    trim_leading: bool,
}

impl ReasoningFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one content delta; returns the visible part (possibly empty).
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut visible = String::new();

        loop {
            let tag = if self.inside { CLOSE_TAG } else { OPEN_TAG };
            if let Some(pos) = self.pending.find(tag) {
                if !self.inside {
                    let before: String = self.pending[..pos].to_string();
                    self.emit(&before, &mut visible);
                }
                self.pending.drain(..pos + tag.len());
                self.inside = !self.inside;
                // Models put a blank line after the closing tag.
                if !self.inside {
                    self.trim_leading = true;
                }
                continue;
            }

            let keep = partial_tag_len(&self.pending, tag);
            let emit_to = self.pending.len() - keep;
            if !self.inside {
                let ready: String = self.pending[..emit_to].to_string();
                self.emit(&ready, &mut visible);
            }
            self.pending.drain(..emit_to);
            break;
        }

        visible
    }

    /// Flush text held back as a possible tag prefix at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.inside {
            return String::new();
        }
        let mut visible = String::new();
        self.emit(&rest, &mut visible);
        visible
    }

    fn emit(&mut self, text: &str, out: &mut String) {
        if self.trim_leading {
            let trimmed = text.trim_start();
            if !trimmed.is_empty() {
                self.trim_leading = false;
            }
            out.push_str(trimmed);
        } else {
            out.push_str(text);
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}
