//! Verbatim-span protection.
//!
//! Code fences, inline code, comments and declarations are swapped for
//! placeholder tokens before tag scanning so that tag-like text inside them
//! can never become structure. Placeholders are delimited by private-use code
//! points and carry the index of the original span.

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

/// Text with protected spans replaced, plus the side table of originals.
#[derive(Debug, Default)]
pub(crate) struct Protected {
    pub text: String,
    originals: Vec<String>,
}

impl Protected {
    fn stash(&mut self, span: &str) {
        self.text.push(OPEN);
        self.text.push_str(&self.originals.len().to_string());
        self.text.push(CLOSE);
        self.originals.push(span.to_owned());
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Substitute every placeholder in `s` with its original span.
    pub fn restore(&self, s: &str) -> String {
        if self.originals.is_empty() || !s.contains(OPEN) {
            return s.to_owned();
        }
        let mut out = String::with_capacity(s.len());
        let mut rest = s;
        while let Some(start) = rest.find(OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + OPEN.len_utf8()..];
            let restored = after.find(CLOSE).and_then(|end| {
                let idx: usize = after[..end].parse().ok()?;
                let original = self.originals.get(idx)?;
                Some((original, end))
            });
            match restored {
                Some((original, end)) => {
                    out.push_str(original);
                    rest = &after[end + CLOSE.len_utf8()..];
                }
                None => {
                    out.push(OPEN);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Length of the protected span starting at the beginning of `s`, if any.
/// Unterminated spans are not protected.
fn span_at(s: &str) -> Option<usize> {
    if let Some(body) = s.strip_prefix("```") {
        return body.find("```").map(|end| 3 + end + 3);
    }
    if let Some(body) = s.strip_prefix('`') {
        let line_end = body.find('\n').unwrap_or(body.len());
        return body[..line_end].find('`').map(|end| 1 + end + 1);
    }
    if let Some(body) = s.strip_prefix("<!--") {
        return body.find("-->").map(|end| 4 + end + 3);
    }
    if let Some(body) = s.strip_prefix("<!") {
        let starts_decl = body
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '[');
        if starts_decl {
            return body.find('>').map(|end| 2 + end + 1);
        }
    }
    None
}

pub(crate) fn protect(input: &str) -> Protected {
    let mut out = Protected {
        text: String::with_capacity(input.len()),
        originals: Vec::new(),
    };
    let mut pos = 0;
    while pos < input.len() {
        let rest = &input[pos..];
        let Some(offset) = rest.find(['`', '<']) else {
            out.text.push_str(rest);
            break;
        };
        out.text.push_str(&rest[..offset]);
        pos += offset;

        let here = &input[pos..];
        match span_at(here) {
            Some(len) => {
                out.stash(&here[..len]);
                pos += len;
            }
            None => {
                // Skip the whole backtick run so an unterminated fence is not
                // reread as inline code.
                let run = if here.starts_with('`') {
                    here.len() - here.trim_start_matches('`').len()
                } else {
                    1
                };
                out.text.push_str(&here[..run]);
                pos += run;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_is_replaced_and_restored() {
        let input = "before\n```\n<read path=\"x\"/>\n```\nafter";
        let p = protect(input);
        assert!(!p.text.contains("<read"));
        assert!(p.text.starts_with("before\n"));
        assert!(p.text.ends_with("\nafter"));
        assert_eq!(p.restore(&p.text), input);
    }

    #[test]
    fn inline_code_single_line_only() {
        let p = protect("use `<b>` here");
        assert!(!p.text.contains("<b>"));
        assert_eq!(p.restore(&p.text), "use `<b>` here");

        let p = protect("a ` lone\nbacktick `x`");
        assert!(p.text.starts_with("a ` lone\nbacktick "));
    }

    #[test]
    fn comments_and_declarations() {
        let p = protect("<!DOCTYPE html><!-- <finish/> --><p>");
        assert!(!p.text.contains("finish"));
        assert!(!p.text.contains("DOCTYPE"));
        assert!(p.text.ends_with("<p>"));
    }

    #[test]
    fn unterminated_spans_stay_literal() {
        let input = "```\n<read path=\"x\"/>\nno closing fence";
        let p = protect(input);
        assert!(p.is_empty());
        assert_eq!(p.text, input);

        let p = protect("<!-- open comment <ask>?</ask>");
        assert!(p.text.contains("<ask>"));
    }

    #[test]
    fn restore_leaves_foreign_markers_alone() {
        let p = protect("`x`");
        let stray = format!("{OPEN}99{CLOSE} and {OPEN}junk");
        assert_eq!(p.restore(&stray), stray);
    }

    #[test]
    fn multiple_spans_keep_order() {
        let input = "`a` then `b` then ```c```";
        let p = protect(input);
        assert_eq!(p.originals, ["`a`", "`b`", "```c```"]);
        assert_eq!(p.restore(&p.text), input);
    }
}
