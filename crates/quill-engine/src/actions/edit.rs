use regex::Regex;

use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;
use quill_store::EditMode;

use crate::dispatch::{ActionContext, ActionHandler};
use crate::parser::diff;

/// Diff-block or line-mode edit of an existing file.
///
/// Diff blocks are applied in order to an in-memory copy; the file is written
/// only if every block matched and changed something.
pub struct EditAction;

fn parse_line(action: &Action, key: &str) -> Result<Option<usize>, ActionError> {
    match action.param(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ActionError::InvalidArguments(format!("`{key}` must be a line number, got `{v}`"))),
    }
}

/// Apply every block to `content`, replacing the first match of each.
pub fn apply_blocks(
    content: &str,
    blocks: &[diff::DiffBlock],
    use_regex: bool,
) -> Result<String, ActionError> {
    let mut current = content.to_owned();
    for (i, block) in blocks.iter().enumerate() {
        let n = i + 1;
        if block.search.is_empty() {
            return Err(ActionError::PatchNotApplied(format!("block {n} has an empty SEARCH section")));
        }
        let pattern = if use_regex {
            block.search.clone()
        } else {
            regex::escape(&block.search)
        };
        let re = Regex::new(&pattern)
            .map_err(|e| ActionError::InvalidArguments(format!("block {n}: invalid pattern: {e}")))?;
        if !re.is_match(&current) {
            return Err(ActionError::PatchNotApplied(format!(
                "block {n}: SEARCH text not found in file"
            )));
        }
        let next = re.replacen(&current, 1, block.replace.as_str()).into_owned();
        if next == current {
            return Err(ActionError::PatchNotApplied(format!(
                "block {n}: replacement produced no change"
            )));
        }
        current = next;
    }
    Ok(current)
}

impl ActionHandler for EditAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let path = action.required("path")?;

        if let Some(mode) = action.param("mode") {
            let mode: EditMode = mode.parse()?;
            let start = parse_line(action, "start")?;
            let end = parse_line(action, "end")?;
            ctx.store
                .edit_lines(path, start, end, mode, &action.raw_body)?;
            let range = match (start, end) {
                (Some(s), Some(e)) => format!(" lines {s}-{e}"),
                (Some(s), None) => format!(" at line {s}"),
                _ => String::new(),
            };
            return Ok(ExecutionResult::ok(format!(
                "Edited {path} ({}{range})",
                action.param("mode").unwrap_or_default().to_ascii_lowercase()
            )));
        }

        if !diff::has_blocks(&action.raw_body) {
            return Err(ActionError::InvalidArguments(
                "edit needs SEARCH/REPLACE blocks or a `mode` attribute".into(),
            ));
        }
        let blocks = diff::parse_blocks(&action.raw_body).map_err(ActionError::PatchNotApplied)?;
        let original = ctx.store.read(path)?.content.clone();
        let updated = apply_blocks(&original, &blocks, action.flag("regex"))?;
        ctx.store.write(path, updated)?;

        Ok(ExecutionResult::ok(format!(
            "Applied {} block(s) to {path}",
            blocks.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::run;
    use crate::parser;
    use quill_store::ContentStore;

    fn store_with(path: &str, content: &str) -> ContentStore {
        let mut store = ContentStore::default();
        store.write(path, content).unwrap();
        store
    }

    fn parsed_edit(text: &str) -> Action {
        parser::parse(text).remove(0)
    }

    #[test]
    fn applies_multiple_blocks() {
        let mut store = store_with("a.rs", "fn one() {}\nfn two() {}\n");
        let action = parsed_edit(
            "<edit path=\"a.rs\">\n<<<<<<< SEARCH\nfn one() {}\n=======\nfn uno() {}\n>>>>>>> REPLACE\n<<<<<<< SEARCH\nfn two() {}\n=======\nfn dos() {}\n>>>>>>> REPLACE\n</edit>",
        );
        let result = run(&EditAction, &mut store, &action).unwrap();
        assert_eq!(result.log, "Applied 2 block(s) to a.rs");
        assert_eq!(store.read("a.rs").unwrap().content, "fn uno() {}\nfn dos() {}\n");
    }

    #[test]
    fn line_mode_body_with_marker_text_is_written_verbatim() {
        let mut store = store_with("notes.md", "# Notes\n");
        let action = parsed_edit(
            "<edit path=\"notes.md\" mode=\"append\">\n<<<<<<< SEARCH\nprice $5\n=======\ncost $6\n>>>>>>> REPLACE\n</edit>",
        );
        run(&EditAction, &mut store, &action).unwrap();
        let content = &store.read("notes.md").unwrap().content;
        assert!(content.contains("price $5\n=======\ncost $6\n"));
        assert!(!content.contains("$$"));
    }

    #[test]
    fn heading_underline_in_replacement_is_applied() {
        let mut store = store_with("README.md", "Title\nbody\n");
        let action = parsed_edit(
            "<edit path=\"README.md\">\n<<<<<<< SEARCH\nTitle\n=======\nTitle\n=========\n>>>>>>> REPLACE\n</edit>",
        );
        run(&EditAction, &mut store, &action).unwrap();
        assert_eq!(store.read("README.md").unwrap().content, "Title\n=========\nbody\n");
    }

    #[test]
    fn dollar_in_replacement_is_literal() {
        let mut store = store_with("run.sh", "echo HOME\n");
        let action = parsed_edit(
            "<edit path=\"run.sh\">\n<<<<<<< SEARCH\necho HOME\n=======\necho $HOME $1\n>>>>>>> REPLACE\n</edit>",
        );
        run(&EditAction, &mut store, &action).unwrap();
        assert_eq!(store.read("run.sh").unwrap().content, "echo $HOME $1\n");
    }

    #[test]
    fn search_text_with_regex_metacharacters_is_literal() {
        let mut store = store_with("a.txt", "total = (a + b) * 2;\n");
        let action = parsed_edit(
            "<edit path=\"a.txt\">\n<<<<<<< SEARCH\n(a + b) * 2\n=======\n(a + b) * 3\n>>>>>>> REPLACE\n</edit>",
        );
        run(&EditAction, &mut store, &action).unwrap();
        assert_eq!(store.read("a.txt").unwrap().content, "total = (a + b) * 3;\n");
    }

    #[test]
    fn regex_mode() {
        let mut store = store_with("v.txt", "version = 1.2.3\n");
        let action = parsed_edit(
            "<edit path=\"v.txt\" regex=\"true\">\n<<<<<<< SEARCH\n\\d+\\.\\d+\\.\\d+\n=======\n2.0.0\n>>>>>>> REPLACE\n</edit>",
        );
        run(&EditAction, &mut store, &action).unwrap();
        assert_eq!(store.read("v.txt").unwrap().content, "version = 2.0.0\n");
    }

    #[test]
    fn failing_block_aborts_without_partial_write() {
        let mut store = store_with("a.txt", "alpha\nbeta\n");
        let action = parsed_edit(
            "<edit path=\"a.txt\">\n<<<<<<< SEARCH\nalpha\n=======\nALPHA\n>>>>>>> REPLACE\n<<<<<<< SEARCH\ngamma\n=======\nGAMMA\n>>>>>>> REPLACE\n</edit>",
        );
        let err = run(&EditAction, &mut store, &action).unwrap_err();
        assert!(matches!(err, ActionError::PatchNotApplied(ref m) if m.contains("block 2")));
        assert_eq!(store.read("a.txt").unwrap().content, "alpha\nbeta\n");
    }

    #[test]
    fn no_op_block_is_rejected() {
        let mut store = store_with("a.txt", "same\n");
        let action = parsed_edit(
            "<edit path=\"a.txt\">\n<<<<<<< SEARCH\nsame\n=======\nsame\n>>>>>>> REPLACE\n</edit>",
        );
        let err = run(&EditAction, &mut store, &action).unwrap_err();
        assert!(matches!(err, ActionError::PatchNotApplied(ref m) if m.contains("no change")));
    }

    #[test]
    fn malformed_blocks_rejected() {
        let mut store = store_with("a.txt", "x\n");
        let action = Action::new("edit")
            .with_param("path", "a.txt")
            .with_body("<<<<<<< SEARCH\nx\n=======\ny\n");
        assert!(matches!(
            run(&EditAction, &mut store, &action),
            Err(ActionError::PatchNotApplied(_))
        ));
        assert_eq!(store.read("a.txt").unwrap().content, "x\n");
    }

    #[test]
    fn line_mode_edits() {
        let mut store = store_with("list.txt", "a\nb\nc\n");
        let replace = Action::new("edit")
            .with_param("path", "list.txt")
            .with_param("mode", "replace")
            .with_param("start", "2")
            .with_param("end", "2")
            .with_body("B");
        let result = run(&EditAction, &mut store, &replace).unwrap();
        assert_eq!(result.log, "Edited list.txt (replace lines 2-2)");
        assert_eq!(store.read("list.txt").unwrap().content, "a\nB\nc\n");

        let bad = Action::new("edit")
            .with_param("path", "list.txt")
            .with_param("mode", "replace")
            .with_param("start", "two");
        assert!(matches!(
            run(&EditAction, &mut store, &bad),
            Err(ActionError::InvalidArguments(_))
        ));
    }

    #[test]
    fn edit_without_blocks_or_mode_rejected() {
        let mut store = store_with("a.txt", "x");
        let action = Action::new("edit").with_param("path", "a.txt").with_body("just text");
        assert!(matches!(
            run(&EditAction, &mut store, &action),
            Err(ActionError::InvalidArguments(_))
        ));
    }
}
