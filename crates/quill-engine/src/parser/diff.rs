//! SEARCH/REPLACE diff blocks inside `edit` bodies.
//!
//! ```text
//! <<<<<<< SEARCH
//! pattern
//! =======
//! replacement
//! >>>>>>> REPLACE
//! ```

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffBlock {
    pub search: String,
    pub replace: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Line {
    Search,
    Separator,
    Replace,
    Other,
}

fn classify(line: &str) -> Line {
    let t = line.trim();
    if t.len() >= 7 && t.starts_with("<<<<<<<") && t.trim_start_matches('<').trim() == "SEARCH" {
        Line::Search
    } else if t.len() >= 7 && t.chars().all(|c| c == '=') {
        Line::Separator
    } else if t.len() >= 7
        && t.starts_with(">>>>>>>")
        && t.trim_start_matches('>').trim() == "REPLACE"
    {
        Line::Replace
    } else {
        Line::Other
    }
}

pub fn has_blocks(body: &str) -> bool {
    body.lines().any(|l| classify(l) == Line::Search)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    InSearch,
    InReplace,
}

/// Escape `$` as `$$` in every replacement section so it is treated literally
/// by a regex replacer. Everything else is copied through unchanged.
pub fn escape_replacements(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut state = State::Outside;
    for line in body.split_inclusive('\n') {
        match (state, classify(line)) {
            (_, Line::Search) => state = State::InSearch,
            (State::InSearch, Line::Separator) => state = State::InReplace,
            (State::InReplace, Line::Replace) => state = State::Outside,
            (State::InReplace, _) => {
                out.push_str(&line.replace('$', "$$"));
                continue;
            }
            _ => {}
        }
        out.push_str(line);
    }
    out
}

/// Split an edit body into blocks. Any unterminated or out-of-order marker is
/// an error; the caller must not apply a partial patch.
pub fn parse_blocks(body: &str) -> Result<Vec<DiffBlock>, String> {
    let mut blocks = Vec::new();
    let mut state = State::Outside;
    let mut search: Vec<&str> = Vec::new();
    let mut replace: Vec<&str> = Vec::new();

    for (n, line) in body.lines().enumerate() {
        let n = n + 1;
        match (state, classify(line)) {
            (State::Outside, Line::Search) => {
                state = State::InSearch;
                search.clear();
                replace.clear();
            }
            (State::Outside, Line::Other) => {}
            (State::InSearch, Line::Separator) => state = State::InReplace,
            (State::InSearch, Line::Other) => search.push(line),
            (State::InReplace, Line::Replace) => {
                blocks.push(DiffBlock {
                    search: search.join("\n"),
                    replace: replace.join("\n"),
                });
                state = State::Outside;
            }
            // Only the first separator splits a block; later ones are content.
            (State::InReplace, Line::Other | Line::Separator) => replace.push(line),
            (_, _) => return Err(format!("unexpected diff marker on line {n}")),
        }
    }

    match state {
        State::Outside if blocks.is_empty() => Err("no SEARCH/REPLACE blocks found".into()),
        State::Outside => Ok(blocks),
        _ => Err("unterminated SEARCH/REPLACE block".into()),
    }
}
