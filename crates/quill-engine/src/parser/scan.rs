//! Cursor-based tag tokenizer over an immutable input buffer.

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Open {
        name: String,
        attributes: BTreeMap<String, String>,
        self_closing: bool,
    },
    Close {
        name: String,
        raw: &'a str,
    },
}

pub(crate) struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    pub fn next_token(&mut self) -> Option<Token<'a>> {
        if self.pos >= self.input.len() {
            return None;
        }
        if self.rest().starts_with('<') {
            if let Some((token, len)) = tag_at(self.rest()) {
                self.pos += len;
                return Some(token);
            }
        }
        // Text runs to the next '<' that is not at the cursor.
        let rest = self.rest();
        let first = rest.chars().next().map_or(1, char::len_utf8);
        let end = rest[first..].find('<').map_or(rest.len(), |i| i + first);
        self.pos += end;
        Some(Token::Text(&rest[..end]))
    }

    /// Consume raw text up to the matching `</name>`. Without a matching close
    /// tag, everything up to the end of input is consumed.
    pub fn raw_until_close(&mut self, name: &str) -> &'a str {
        let rest = self.rest();
        let mut search = 0;
        while let Some(i) = rest[search..].find("</") {
            let at = search + i;
            if let Some((Token::Close { name: close, .. }, len)) = tag_at(&rest[at..]) {
                if close == name {
                    self.pos += at + len;
                    return &rest[..at];
                }
            }
            search = at + 2;
        }
        self.pos = self.input.len();
        rest
    }
}

/// Parse a tag at the start of `s`. Returns the token and its byte length.
fn tag_at(s: &str) -> Option<(Token<'_>, usize)> {
    let mut cur = Cursor { s, pos: 1 };

    if cur.eat('/') {
        let name = cur.name()?;
        cur.skip_ws();
        if !cur.eat('>') {
            return None;
        }
        let len = cur.pos;
        return Some((Token::Close { name, raw: &s[..len] }, len));
    }

    let name = cur.name()?;
    let mut attributes = BTreeMap::new();
    loop {
        let had_ws = cur.skip_ws();
        if cur.eat('>') {
            let len = cur.pos;
            return Some((
                Token::Open { name, attributes, self_closing: false },
                len,
            ));
        }
        if cur.eat_str("/>") {
            let len = cur.pos;
            return Some((
                Token::Open { name, attributes, self_closing: true },
                len,
            ));
        }
        if !had_ws {
            return None;
        }
        let key = cur.attr_key()?;
        cur.skip_ws();
        let value = if cur.eat('=') {
            cur.skip_ws();
            cur.attr_value()?
        } else {
            String::new()
        };
        attributes.insert(key, value);
    }
}

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, lit: &str) -> bool {
        if self.s[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.pos != start
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.s[start..self.pos]
    }

    /// Tag names are case-insensitive and stored lowercased.
    fn name(&mut self) -> Option<String> {
        if !self.peek().is_some_and(is_name_start) {
            return None;
        }
        Some(self.take_while(is_name_char).to_ascii_lowercase())
    }

    fn attr_key(&mut self) -> Option<String> {
        if !self.peek().is_some_and(|c| is_name_start(c) || c == '_') {
            return None;
        }
        Some(self.take_while(is_name_char).to_ascii_lowercase())
    }

    /// Quoted values may contain `>`; unquoted values stop at whitespace, `>` or `/>`.
    fn attr_value(&mut self) -> Option<String> {
        match self.peek()? {
            q @ ('"' | '\'') => {
                self.pos += 1;
                let body = &self.s[self.pos..];
                let end = body.find(q)?;
                self.pos += end + 1;
                Some(body[..end].to_owned())
            }
            _ => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || c == '>' || self.s[self.pos..].starts_with("/>") {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                if self.pos == start {
                    return None;
                }
                Some(self.s[start..self.pos].to_owned())
            }
        }
    }
}
