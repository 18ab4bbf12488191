use std::collections::BTreeMap;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quill_core::events::{ObserverId, Observers, StoreEvent};

use crate::error::StoreError;

/// Empty file that marks an otherwise empty directory.
pub const DIR_SENTINEL: &str = ".keep";

pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Listing record with metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub path: String,
    pub kind: EntryKind,
    pub size: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Line edit mode for [`ContentStore::edit_lines`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditMode {
    Replace,
    Delete,
    Insert,
    Append,
}

impl FromStr for EditMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "delete" => Ok(Self::Delete),
            "insert" => Ok(Self::Insert),
            "append" => Ok(Self::Append),
            other => Err(StoreError::InvalidRange(format!("unknown edit mode `{other}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    File,
    Directory { removed: usize },
    /// Nothing matched. Reported, not an error.
    NotFound,
}

/// Decoded shape of a `data:` URI entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinarySummary {
    pub mime_type: String,
    pub bytes: usize,
}

/// Strip leading slashes and resolve `.`/`..` segments, clamped at the root.
///
/// `..` is only meaningful as a whole segment; `a..b.txt` is left alone.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.trim().split(['/', '\\']) {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

pub fn parent_of(path: &str) -> Option<&str> {
    path.rfind('/').map(|i| &path[..i])
}

pub fn encode_binary(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

/// Summarize a base64 data URI; `None` for ordinary text content.
pub fn describe_binary(content: &str) -> Option<BinarySummary> {
    let rest = content.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?.len();
    Some(BinarySummary {
        mime_type: mime_type.to_owned(),
        bytes,
    })
}

fn sentinel_dir(path: &str) -> Option<&str> {
    if path == DIR_SENTINEL {
        return Some("");
    }
    path.strip_suffix(DIR_SENTINEL)?.strip_suffix('/')
}

fn split_lines(content: &str) -> (Vec<String>, bool) {
    if content.is_empty() {
        return (Vec::new(), false);
    }
    let trailing = content.ends_with('\n');
    let body = if trailing { &content[..content.len() - 1] } else { content };
    (body.split('\n').map(str::to_owned).collect(), trailing)
}

/// Quota-bounded path→content map with emulated directories.
///
/// Directories are never stored. A path is a directory when some key has it
/// as a strict `path/` prefix, which includes the `.keep` sentinel.
#[derive(Debug)]
pub struct ContentStore {
    files: BTreeMap<String, FileEntry>,
    quota_bytes: usize,
    observers: Observers<StoreEvent>,
}

impl ContentStore {
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            files: BTreeMap::new(),
            quota_bytes,
            observers: Observers::new(),
        }
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    /// Recomputed on every call; there is no cached counter.
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(|f| f.content.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&StoreEvent) + Send + Sync + 'static) -> ObserverId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    pub fn is_directory(&self, path: &str) -> bool {
        let p = normalize(path);
        if p.is_empty() {
            return true;
        }
        self.has_children(&p)
    }

    fn has_children(&self, normalized: &str) -> bool {
        let prefix = format!("{normalized}/");
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&prefix))
    }

    fn keys_under(&self, normalized: &str) -> Vec<String> {
        let prefix = format!("{normalized}/");
        self.files
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn require_path(path: &str) -> Result<String, StoreError> {
        let p = normalize(path);
        if p.is_empty() {
            return Err(StoreError::InvalidPath(format!("`{path}` resolves to the root")));
        }
        Ok(p)
    }

    /// Rejects destinations whose ancestor is an existing file.
    fn check_ancestors(&self, normalized: &str) -> Result<(), StoreError> {
        let mut current = normalized;
        while let Some(parent) = parent_of(current) {
            if self.files.contains_key(parent) {
                return Err(StoreError::NotAFile(format!(
                    "`{parent}` is a file and cannot contain `{normalized}`"
                )));
            }
            current = parent;
        }
        Ok(())
    }

    /// A store already over quota (loaded before the quota was lowered) still
    /// accepts changes that do not grow it.
    fn check_quota(&self, replaced: usize, added: usize) -> Result<(), StoreError> {
        let required = self.total_bytes() - replaced + added;
        if required > self.quota_bytes && added > replaced {
            return Err(StoreError::QuotaExceeded {
                required,
                quota: self.quota_bytes,
            });
        }
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<&FileEntry, StoreError> {
        let p = normalize(path);
        match self.files.get(&p) {
            Some(entry) => Ok(entry),
            None if self.is_directory(&p) => Err(StoreError::IsDirectory(p)),
            None => Err(StoreError::NotFound(p)),
        }
    }

    /// Upsert a file. On rejection the store is unchanged.
    pub fn write(&mut self, path: &str, content: impl Into<String>) -> Result<(), StoreError> {
        let p = Self::require_path(path)?;
        let content = content.into();
        if self.has_children(&p) {
            return Err(StoreError::IsDirectory(p));
        }
        self.check_ancestors(&p)?;

        let old_len = self.files.get(&p).map_or(0, |f| f.content.len());
        self.check_quota(old_len, content.len())?;

        let now = Utc::now();
        let event = match self.files.get_mut(&p) {
            Some(entry) => {
                entry.content = content;
                entry.updated_at = now;
                StoreEvent::Modified { path: p.clone() }
            }
            None => {
                self.files.insert(
                    p.clone(),
                    FileEntry {
                        path: p.clone(),
                        content,
                        created_at: now,
                        updated_at: now,
                    },
                );
                StoreEvent::Created { path: p.clone() }
            }
        };
        debug!(path = %p, total = self.total_bytes(), "store write");
        self.observers.notify(&event);
        Ok(())
    }

    /// Create an empty directory. Returns false if it already existed.
    pub fn create_dir(&mut self, path: &str) -> Result<bool, StoreError> {
        let p = Self::require_path(path)?;
        if self.files.contains_key(&p) {
            return Err(StoreError::AlreadyExists(p));
        }
        if self.has_children(&p) {
            return Ok(false);
        }
        self.write(&format!("{p}/{DIR_SENTINEL}"), String::new())?;
        Ok(true)
    }

    /// Delete a file, or every key under `path/` when no such file exists.
    pub fn delete(&mut self, path: &str) -> Result<DeleteOutcome, StoreError> {
        let p = Self::require_path(path)?;
        if self.files.remove(&p).is_some() {
            debug!(path = %p, "store delete");
            self.observers.notify(&StoreEvent::Deleted { path: p });
            return Ok(DeleteOutcome::File);
        }

        let removed = self.keys_under(&p);
        if removed.is_empty() {
            return Ok(DeleteOutcome::NotFound);
        }
        for key in &removed {
            self.files.remove(key);
        }
        let count = removed.len();
        debug!(path = %p, removed = count, "store directory delete");
        self.observers
            .notify(&StoreEvent::DirectoryDeleted { path: p, removed });
        Ok(DeleteOutcome::Directory { removed: count })
    }

    /// Move a file or a whole directory. Returns the number of keys moved.
    ///
    /// Directory moves are all-or-nothing: every destination is checked and the
    /// new key set is built before anything is removed.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<usize, StoreError> {
        let src = Self::require_path(from)?;
        let dst = Self::require_path(to)?;
        if src == dst {
            return Err(StoreError::InvalidPath(format!(
                "source and destination are both `{src}`"
            )));
        }
        if self.files.contains_key(&dst) {
            return Err(StoreError::AlreadyExists(dst));
        }
        self.check_ancestors(&dst)?;

        if self.files.contains_key(&src) && self.has_children(&dst) {
            return Err(StoreError::AlreadyExists(dst));
        }
        if let Some(mut entry) = self.files.remove(&src) {
            entry.path = dst.clone();
            entry.updated_at = Utc::now();
            self.files.insert(dst.clone(), entry);
            self.observers
                .notify(&StoreEvent::Renamed { from: src, to: dst });
            return Ok(1);
        }

        let keys = self.keys_under(&src);
        if keys.is_empty() {
            return Err(StoreError::NotFound(src));
        }
        if dst.starts_with(&format!("{src}/")) {
            return Err(StoreError::InvalidPath(format!(
                "cannot move `{src}` into itself"
            )));
        }

        let now = Utc::now();
        let mut moved = Vec::with_capacity(keys.len());
        for key in &keys {
            let rest = &key[src.len()..];
            let new_key = format!("{dst}{rest}");
            if self.files.contains_key(&new_key) {
                // Both sides are already directories; the source marker is dropped.
                if sentinel_dir(&new_key).is_some() {
                    continue;
                }
                return Err(StoreError::AlreadyExists(new_key));
            }
            if let Some(entry) = self.files.get(key) {
                moved.push(FileEntry {
                    path: new_key,
                    content: entry.content.clone(),
                    created_at: entry.created_at,
                    updated_at: now,
                });
            }
        }

        for key in &keys {
            self.files.remove(key);
        }
        let count = moved.len();
        for entry in moved {
            self.files.insert(entry.path.clone(), entry);
        }
        debug!(from = %src, to = %dst, moved = count, "store directory rename");
        self.observers
            .notify(&StoreEvent::Renamed { from: src, to: dst });
        Ok(count)
    }

    /// Copy a single file.
    pub fn copy(&mut self, from: &str, to: &str) -> Result<(), StoreError> {
        let src = Self::require_path(from)?;
        let dst = Self::require_path(to)?;
        let content = match self.files.get(&src) {
            Some(entry) => entry.content.clone(),
            None if self.has_children(&src) => return Err(StoreError::IsDirectory(src)),
            None => return Err(StoreError::NotFound(src)),
        };
        if self.files.contains_key(&dst) || self.has_children(&dst) {
            return Err(StoreError::AlreadyExists(dst));
        }
        self.check_ancestors(&dst)?;
        self.check_quota(0, content.len())?;

        let now = Utc::now();
        self.files.insert(
            dst.clone(),
            FileEntry {
                path: dst.clone(),
                content,
                created_at: now,
                updated_at: now,
            },
        );
        self.observers
            .notify(&StoreEvent::Copied { from: src, to: dst });
        Ok(())
    }

    /// Line-oriented edit over a 1-indexed, newline-split view of the file.
    ///
    /// `Replace` and `Delete` need both bounds. `Insert` places the body before
    /// `start` (or at the top), `Append` after `start` (or at the end).
    pub fn edit_lines(
        &mut self,
        path: &str,
        start: Option<usize>,
        end: Option<usize>,
        mode: EditMode,
        body: &str,
    ) -> Result<(), StoreError> {
        let p = Self::require_path(path)?;
        let entry = self.read(&p)?;
        let (mut lines, trailing) = split_lines(&entry.content);
        let body_lines: Vec<String> = if body.is_empty() {
            Vec::new()
        } else {
            body.strip_suffix('\n')
                .unwrap_or(body)
                .split('\n')
                .map(str::to_owned)
                .collect()
        };
        let len = lines.len();

        match mode {
            EditMode::Replace | EditMode::Delete => {
                let start = start.ok_or(StoreError::MissingArgument("start"))?;
                let end = end.ok_or(StoreError::MissingArgument("end"))?;
                if start == 0 || start > end || end > len {
                    return Err(StoreError::InvalidRange(format!(
                        "lines {start}-{end} outside 1-{len}"
                    )));
                }
                let replacement = if mode == EditMode::Replace {
                    body_lines
                } else {
                    Vec::new()
                };
                lines.splice(start - 1..end, replacement);
            }
            EditMode::Insert => {
                if body.is_empty() {
                    return Err(StoreError::MissingArgument("body"));
                }
                let at = match start {
                    Some(n) if n == 0 || n > len + 1 => {
                        return Err(StoreError::InvalidRange(format!(
                            "cannot insert before line {n} of {len}"
                        )))
                    }
                    Some(n) => n - 1,
                    None => 0,
                };
                lines.splice(at..at, body_lines);
            }
            EditMode::Append => {
                if body.is_empty() {
                    return Err(StoreError::MissingArgument("body"));
                }
                let at = match start {
                    Some(n) if n == 0 || n > len => {
                        return Err(StoreError::InvalidRange(format!(
                            "cannot append after line {n} of {len}"
                        )))
                    }
                    Some(n) => n,
                    None => len,
                };
                lines.splice(at..at, body_lines);
            }
        }

        let mut content = lines.join("\n");
        if trailing && !content.is_empty() {
            content.push('\n');
        }
        self.write(&p, content)
    }

    /// Sorted paths under `prefix` (everything when `None`). Sentinels are
    /// reported as their directory with a trailing slash.
    pub fn list(&self, prefix: Option<&str>) -> Vec<String> {
        self.list_with_metadata(prefix)
            .into_iter()
            .map(|info| match info.kind {
                EntryKind::File => info.path,
                EntryKind::Directory => format!("{}/", info.path),
            })
            .collect()
    }

    pub fn list_with_metadata(&self, prefix: Option<&str>) -> Vec<EntryInfo> {
        let root = prefix.map(normalize).unwrap_or_default();
        let dir_prefix = format!("{root}/");
        let mut out: Vec<EntryInfo> = self
            .files
            .values()
            .filter(|f| root.is_empty() || f.path == root || f.path.starts_with(&dir_prefix))
            .filter_map(|f| match sentinel_dir(&f.path) {
                Some("") => None,
                Some(dir) if dir == root => None,
                Some(dir) => Some(EntryInfo {
                    path: dir.to_owned(),
                    kind: EntryKind::Directory,
                    size: 0,
                    created_at: f.created_at,
                    updated_at: f.updated_at,
                }),
                None => Some(EntryInfo {
                    path: f.path.clone(),
                    kind: EntryKind::File,
                    size: f.content.len(),
                    created_at: f.created_at,
                    updated_at: f.updated_at,
                }),
            })
            .collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    pub fn snapshot(&self) -> Vec<FileEntry> {
        self.files.values().cloned().collect()
    }

    /// Replace the whole store. Rejected if the snapshot exceeds the quota.
    pub fn restore(&mut self, files: Vec<FileEntry>) -> Result<(), StoreError> {
        self.replace_all(files, true)
    }

    /// Replace the whole store from saved state, accepting a snapshot larger
    /// than the current quota. Until it shrinks below the quota, only writes
    /// that do not grow the store succeed.
    pub fn load_saved(&mut self, files: Vec<FileEntry>) -> Result<(), StoreError> {
        self.replace_all(files, false)
    }

    fn replace_all(&mut self, files: Vec<FileEntry>, enforce_quota: bool) -> Result<(), StoreError> {
        let mut next = BTreeMap::new();
        for mut entry in files {
            let p = Self::require_path(&entry.path)?;
            entry.path = p.clone();
            next.insert(p, entry);
        }
        let required: usize = next.values().map(|f: &FileEntry| f.content.len()).sum();
        if required > self.quota_bytes {
            if enforce_quota {
                return Err(StoreError::QuotaExceeded {
                    required,
                    quota: self.quota_bytes,
                });
            }
            warn!(required, quota = self.quota_bytes, "saved store exceeds quota, growth is blocked");
        }
        self.files = next;
        let count = self.files.len();
        self.observers.notify(&StoreEvent::Loaded { files: count });
        Ok(())
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder(store: &mut ContentStore) -> Arc<Mutex<Vec<StoreEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        store.subscribe(move |e| sink.lock().push(e.clone()));
        events
    }

    #[test]
    fn normalize_segments() {
        assert_eq!(normalize("/a/b.txt"), "a/b.txt");
        assert_eq!(normalize("///a//b/./c"), "a/b/c");
        assert_eq!(normalize("a/../b"), "b");
        assert_eq!(normalize("../../etc/passwd"), "etc/passwd");
        assert_eq!(normalize("notes/a..b.txt"), "notes/a..b.txt");
        assert_eq!(normalize("dir/"), "dir");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn quota_rejects_and_leaves_store_unchanged() {
        let mut store = ContentStore::new(10);
        store.write("a.txt", "12345").unwrap();
        assert_eq!(store.total_bytes(), 5);

        let err = store.write("b.txt", "123456").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { required: 11, quota: 10 }));
        assert_eq!(store.read("a.txt").unwrap().content, "12345");
        assert!(!store.exists("b.txt"));
    }

    #[test]
    fn overwrite_counts_replaced_bytes() {
        let mut store = ContentStore::new(10);
        store.write("a.txt", "1234567890").unwrap();
        store.write("a.txt", "abcdefghij").unwrap();
        assert_eq!(store.read("a.txt").unwrap().content, "abcdefghij");
        assert!(store.write("a.txt", "abcdefghijk").is_err());
    }

    #[test]
    fn write_stamps_timestamps_and_events() {
        let mut store = ContentStore::default();
        let events = recorder(&mut store);

        store.write("a.txt", "one").unwrap();
        let created = store.read("a.txt").unwrap().created_at;
        store.write("/a.txt", "two").unwrap();
        let entry = store.read("a.txt").unwrap();
        assert_eq!(entry.created_at, created);
        assert!(entry.updated_at >= created);

        assert_eq!(
            *events.lock(),
            [
                StoreEvent::Created { path: "a.txt".into() },
                StoreEvent::Modified { path: "a.txt".into() },
            ]
        );
    }

    #[test]
    fn listener_observes_state_after_mutation() {
        let seen = Arc::new(Mutex::new(None::<bool>));
        let mut store = ContentStore::default();
        let flag = seen.clone();
        store.subscribe(move |e| {
            if let StoreEvent::Created { path } = e {
                *flag.lock() = Some(path == "x.txt");
            }
        });
        store.write("x.txt", "x").unwrap();
        assert_eq!(*seen.lock(), Some(true));
    }

    #[test]
    fn write_onto_directory_rejected() {
        let mut store = ContentStore::default();
        store.write("dir/file.txt", "x").unwrap();
        assert!(matches!(store.write("dir", "y"), Err(StoreError::IsDirectory(_))));
        assert!(matches!(store.write("dir/file.txt/sub", "y"), Err(StoreError::NotAFile(_))));
        assert!(matches!(store.write("/", "y"), Err(StoreError::InvalidPath(_))));
    }

    #[test]
    fn directory_detection() {
        let mut store = ContentStore::default();
        store.write("a/b/c.txt", "x").unwrap();
        assert!(store.is_directory("a"));
        assert!(store.is_directory("a/b"));
        assert!(!store.is_directory("a/b/c.txt"));
        assert!(!store.is_directory("a/bc"));
        assert!(store.is_directory("/"));
        assert!(store.exists("a/b/c.txt"));
        assert!(!store.exists("a/b"));
    }

    #[test]
    fn directory_delete_removes_children_and_sentinel() {
        let mut store = ContentStore::default();
        let events = recorder(&mut store);
        assert!(store.create_dir("a/b").unwrap());
        assert!(!store.create_dir("a/b").unwrap());
        store.write("a/b/c.txt", "hi").unwrap();
        assert!(store.is_directory("a/b"));

        let outcome = store.delete("a/b").unwrap();
        assert_eq!(outcome, DeleteOutcome::Directory { removed: 2 });
        assert!(!store.exists("a/b/c.txt"));
        assert!(!store.exists("a/b/.keep"));
        assert!(!store.is_directory("a/b"));

        let last = events.lock().last().cloned();
        assert_eq!(
            last,
            Some(StoreEvent::DirectoryDeleted {
                path: "a/b".into(),
                removed: vec!["a/b/.keep".into(), "a/b/c.txt".into()],
            })
        );
    }

    #[test]
    fn delete_missing_is_reported_not_thrown() {
        let mut store = ContentStore::default();
        let events = recorder(&mut store);
        assert_eq!(store.delete("ghost").unwrap(), DeleteOutcome::NotFound);
        assert!(events.lock().is_empty());
    }

    #[test]
    fn rename_file() {
        let mut store = ContentStore::default();
        store.write("a.txt", "x").unwrap();
        store.write("b.txt", "y").unwrap();
        assert!(matches!(store.rename("a.txt", "b.txt"), Err(StoreError::AlreadyExists(_))));
        assert_eq!(store.rename("a.txt", "docs/a.txt").unwrap(), 1);
        assert!(!store.exists("a.txt"));
        assert_eq!(store.read("docs/a.txt").unwrap().content, "x");
    }

    #[test]
    fn rename_directory_moves_all_keys() {
        let mut store = ContentStore::default();
        store.write("src/a.rs", "a").unwrap();
        store.write("src/nested/b.rs", "b").unwrap();
        store.write("srcx.rs", "untouched").unwrap();

        assert_eq!(store.rename("src", "lib").unwrap(), 2);
        assert_eq!(store.list(None), ["lib/a.rs", "lib/nested/b.rs", "srcx.rs"]);
    }

    #[test]
    fn rename_directory_merges_into_existing_directory() {
        let mut store = ContentStore::default();
        store.write("src/a.rs", "a").unwrap();
        store.write("lib/b.rs", "b").unwrap();
        assert_eq!(store.rename("src", "lib").unwrap(), 1);
        assert_eq!(store.list(None), ["lib/a.rs", "lib/b.rs"]);
    }

    #[test]
    fn rename_directory_into_marked_directory_drops_source_marker() {
        let mut store = ContentStore::default();
        store.create_dir("a").unwrap();
        store.write("a/x.txt", "x").unwrap();
        store.create_dir("b").unwrap();

        assert_eq!(store.rename("a", "b").unwrap(), 1);
        let mut keys: Vec<String> = store.snapshot().into_iter().map(|f| f.path).collect();
        keys.sort();
        assert_eq!(keys, ["b/.keep", "b/x.txt"]);
        assert!(!store.is_directory("a"));
    }

    #[test]
    fn rename_directory_collision_leaves_store_untouched() {
        let mut store = ContentStore::default();
        store.write("src/a.rs", "a").unwrap();
        store.write("src/b.rs", "b").unwrap();
        store.write("lib/b.rs", "existing").unwrap();

        let before = store.snapshot();
        assert!(store.rename("src", "lib").is_err());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn rename_directory_into_itself_rejected() {
        let mut store = ContentStore::default();
        store.write("src/a.rs", "a").unwrap();
        assert!(matches!(store.rename("src", "src/inner"), Err(StoreError::InvalidPath(_))));
        assert!(matches!(store.rename("nothing", "x"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn copy_single_file_only() {
        let mut store = ContentStore::new(6);
        store.write("a.txt", "abc").unwrap();
        store.copy("a.txt", "b.txt").unwrap();
        assert_eq!(store.read("b.txt").unwrap().content, "abc");
        assert!(matches!(store.copy("a.txt", "b.txt"), Err(StoreError::AlreadyExists(_))));
        assert!(matches!(store.copy("a.txt", "c.txt"), Err(StoreError::QuotaExceeded { .. })));

        store.delete("b.txt").unwrap();
        store.write("dir/x", "").unwrap();
        assert!(matches!(store.copy("dir", "dir2"), Err(StoreError::IsDirectory(_))));
    }

    #[test]
    fn edit_lines_replace_and_delete() {
        let mut store = ContentStore::default();
        store.write("f.txt", "one\ntwo\nthree\nfour\n").unwrap();

        store.edit_lines("f.txt", Some(2), Some(3), EditMode::Replace, "TWO").unwrap();
        assert_eq!(store.read("f.txt").unwrap().content, "one\nTWO\nfour\n");

        store.edit_lines("f.txt", Some(1), Some(1), EditMode::Delete, "").unwrap();
        assert_eq!(store.read("f.txt").unwrap().content, "TWO\nfour\n");

        assert!(matches!(
            store.edit_lines("f.txt", Some(1), None, EditMode::Replace, "x"),
            Err(StoreError::MissingArgument("end"))
        ));
        assert!(matches!(
            store.edit_lines("f.txt", Some(2), Some(5), EditMode::Delete, ""),
            Err(StoreError::InvalidRange(_))
        ));
    }

    #[test]
    fn edit_lines_insert_and_append() {
        let mut store = ContentStore::default();
        store.write("f.txt", "a\nb").unwrap();

        store.edit_lines("f.txt", None, None, EditMode::Insert, "top").unwrap();
        assert_eq!(store.read("f.txt").unwrap().content, "top\na\nb");

        store.edit_lines("f.txt", Some(3), None, EditMode::Insert, "before-b").unwrap();
        assert_eq!(store.read("f.txt").unwrap().content, "top\na\nbefore-b\nb");

        store.edit_lines("f.txt", Some(1), None, EditMode::Append, "after-top").unwrap();
        assert_eq!(store.read("f.txt").unwrap().content, "top\nafter-top\na\nbefore-b\nb");

        store.edit_lines("f.txt", None, None, EditMode::Append, "end").unwrap();
        assert!(store.read("f.txt").unwrap().content.ends_with("b\nend"));

        assert!(matches!(
            store.edit_lines("f.txt", None, None, EditMode::Insert, ""),
            Err(StoreError::MissingArgument("body"))
        ));
    }

    #[test]
    fn edit_lines_respects_quota() {
        let mut store = ContentStore::new(4);
        store.write("f.txt", "ab").unwrap();
        let err = store.edit_lines("f.txt", None, None, EditMode::Append, "cdef");
        assert!(matches!(err, Err(StoreError::QuotaExceeded { .. })));
        assert_eq!(store.read("f.txt").unwrap().content, "ab");
    }

    #[test]
    fn edit_mode_parse() {
        assert_eq!("Replace".parse::<EditMode>().unwrap(), EditMode::Replace);
        assert!("upsert".parse::<EditMode>().is_err());
    }

    #[test]
    fn list_reports_sentinels_as_directories() {
        let mut store = ContentStore::default();
        store.create_dir("empty").unwrap();
        store.write("src/main.rs", "fn main() {}").unwrap();
        store.write("README.md", "hi").unwrap();

        assert_eq!(store.list(None), ["README.md", "empty/", "src/main.rs"]);
        assert_eq!(store.list(Some("src")), ["src/main.rs"]);

        let meta = store.list_with_metadata(None);
        let dir = meta.iter().find(|e| e.path == "empty").unwrap();
        assert_eq!(dir.kind, EntryKind::Directory);
        let file = meta.iter().find(|e| e.path == "src/main.rs").unwrap();
        assert_eq!(file.size, 12);
        assert_eq!(file.kind, EntryKind::File);
    }

    #[test]
    fn read_reports_directory() {
        let mut store = ContentStore::default();
        store.write("d/x", "1").unwrap();
        assert!(matches!(store.read("d"), Err(StoreError::IsDirectory(_))));
        assert!(matches!(store.read("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn saved_state_over_quota_loads_but_blocks_growth() {
        let mut big = ContentStore::new(64);
        big.write("a.txt", "0123456789").unwrap();
        big.write("b.txt", "0123456789").unwrap();

        let mut store = ContentStore::new(12);
        assert!(store.restore(big.snapshot()).is_err());
        store.load_saved(big.snapshot()).unwrap();
        assert_eq!(store.total_bytes(), 20);

        assert!(matches!(
            store.write("c.txt", "x"),
            Err(StoreError::QuotaExceeded { required: 21, quota: 12 })
        ));
        store.write("a.txt", "short").unwrap();
        store.delete("b.txt").unwrap();
        store.write("c.txt", "x").unwrap();
        assert_eq!(store.total_bytes(), 6);
    }

    #[test]
    fn snapshot_restore_validates_quota() {
        let mut store = ContentStore::new(8);
        store.write("a", "1234").unwrap();
        let snap = store.snapshot();

        let mut other = ContentStore::new(3);
        assert!(matches!(other.restore(snap.clone()), Err(StoreError::QuotaExceeded { .. })));
        assert!(other.is_empty());

        let mut roomy = ContentStore::new(8);
        let events = recorder(&mut roomy);
        roomy.restore(snap).unwrap();
        assert_eq!(roomy.read("a").unwrap().content, "1234");
        assert_eq!(*events.lock(), [StoreEvent::Loaded { files: 1 }]);
    }

    #[test]
    fn binary_data_uri() {
        let encoded = encode_binary("image/png", &[0u8, 1, 2, 3, 4]);
        assert!(encoded.starts_with("data:image/png;base64,"));
        let summary = describe_binary(&encoded).unwrap();
        assert_eq!(summary.mime_type, "image/png");
        assert_eq!(summary.bytes, 5);
        assert!(describe_binary("plain text").is_none());
    }
}
