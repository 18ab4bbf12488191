use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use quill_core::ids::{CheckpointId, TurnId};
use quill_core::turns::{Turn, TurnContent};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::vfs::FileEntry;

/// Store contents plus history, as saved or checkpointed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub files: Vec<FileEntry>,
    pub history: Vec<Turn>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointInfo {
    pub id: CheckpointId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub file_count: usize,
    pub turn_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub info: CheckpointInfo,
    pub snapshot: Snapshot,
}

/// Durable storage for a session: the live state plus named checkpoints.
pub trait Persistence: Send + Sync {
    fn save(&self, files: &[FileEntry], history: &[Turn]) -> Result<(), StoreError>;

    /// `None` when nothing has ever been saved.
    fn load(&self) -> Result<Option<Snapshot>, StoreError>;

    fn create_checkpoint(
        &self,
        label: &str,
        files: &[FileEntry],
        history: &[Turn],
    ) -> Result<CheckpointId, StoreError>;

    /// Newest first.
    fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, StoreError>;

    fn get_checkpoint(&self, id: &CheckpointId) -> Result<Option<Checkpoint>, StoreError>;

    fn delete_checkpoint(&self, id: &CheckpointId) -> Result<bool, StoreError>;
}

/// SQLite implementation of [`Persistence`].
pub struct SnapshotRepo {
    db: Database,
}

impl SnapshotRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn load_files(conn: &Connection) -> Result<Vec<FileEntry>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT path, content, created_at, updated_at FROM files ORDER BY path")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut files = Vec::new();
    for row in rows {
        let (path, content, created, updated) = row?;
        files.push(FileEntry {
            path,
            content,
            created_at: row_helpers::parse_timestamp(&created, "files", "created_at")?,
            updated_at: row_helpers::parse_timestamp(&updated, "files", "updated_at")?,
        });
    }
    Ok(files)
}

fn load_turns(conn: &Connection) -> Result<Vec<Turn>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT id, timestamp, role, content, meta FROM turns ORDER BY position")?;
    let mut rows = stmt.query([])?;

    let mut turns = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row_helpers::get(row, 0, "turns", "id")?;
        let timestamp: String = row_helpers::get(row, 1, "turns", "timestamp")?;
        let role: String = row_helpers::get(row, 2, "turns", "role")?;
        let content: String = row_helpers::get(row, 3, "turns", "content")?;
        let meta: String = row_helpers::get(row, 4, "turns", "meta")?;
        turns.push(Turn {
            id: TurnId::from_raw(id),
            timestamp: row_helpers::parse_timestamp(&timestamp, "turns", "timestamp")?,
            role: row_helpers::parse_role(&role, "turns", "role")?,
            content: row_helpers::parse_json::<TurnContent>(&content, "turns", "content")?,
            meta: row_helpers::parse_json(&meta, "turns", "meta")?,
        });
    }
    Ok(turns)
}

fn row_to_info(row: &rusqlite::Row<'_>) -> Result<CheckpointInfo, StoreError> {
    let id: String = row_helpers::get(row, 0, "checkpoints", "id")?;
    let label: String = row_helpers::get(row, 1, "checkpoints", "label")?;
    let created: String = row_helpers::get(row, 2, "checkpoints", "created_at")?;
    let file_count: i64 = row_helpers::get(row, 3, "checkpoints", "file_count")?;
    let turn_count: i64 = row_helpers::get(row, 4, "checkpoints", "turn_count")?;
    Ok(CheckpointInfo {
        id: CheckpointId::from_raw(id),
        label,
        created_at: row_helpers::parse_timestamp(&created, "checkpoints", "created_at")?,
        file_count: usize::try_from(file_count).unwrap_or_default(),
        turn_count: usize::try_from(turn_count).unwrap_or_default(),
    })
}

impl Persistence for SnapshotRepo {
    /// Replaces the saved state in one transaction.
    #[instrument(skip_all, fields(files = files.len(), turns = history.len()))]
    fn save(&self, files: &[FileEntry], history: &[Turn]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM files", [])?;
            tx.execute("DELETE FROM turns", [])?;
            {
                let mut insert_file = tx.prepare(
                    "INSERT INTO files (path, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for f in files {
                    insert_file.execute(params![
                        f.path,
                        f.content,
                        f.created_at.to_rfc3339(),
                        f.updated_at.to_rfc3339(),
                    ])?;
                }

                let mut insert_turn = tx.prepare(
                    "INSERT INTO turns (position, id, timestamp, role, content, meta)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (position, t) in history.iter().enumerate() {
                    insert_turn.execute(params![
                        position as i64,
                        t.id.as_str(),
                        t.timestamp.to_rfc3339(),
                        t.role.as_str(),
                        serde_json::to_string(&t.content)?,
                        serde_json::to_string(&t.meta)?,
                    ])?;
                }
            }
            tx.execute(
                "INSERT INTO session_state (id, saved_at) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET saved_at = excluded.saved_at",
                [Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            debug!("session saved");
            Ok(())
        })
    }

    fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        self.db.with_conn(|conn| {
            let saved: Option<String> = conn
                .query_row("SELECT saved_at FROM session_state WHERE id = 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            if saved.is_none() {
                return Ok(None);
            }
            Ok(Some(Snapshot {
                files: load_files(conn)?,
                history: load_turns(conn)?,
            }))
        })
    }

    #[instrument(skip(self, files, history))]
    fn create_checkpoint(
        &self,
        label: &str,
        files: &[FileEntry],
        history: &[Turn],
    ) -> Result<CheckpointId, StoreError> {
        let id = CheckpointId::new();
        let files_json = serde_json::to_string(files)?;
        let history_json = serde_json::to_string(history)?;

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO checkpoints (id, label, created_at, file_count, turn_count, files, history)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    label,
                    Utc::now().to_rfc3339(),
                    files.len() as i64,
                    history.len() as i64,
                    files_json,
                    history_json,
                ],
            )?;
            Ok(())
        })?;
        debug!(checkpoint_id = %id, "checkpoint created");
        Ok(id)
    }

    fn list_checkpoints(&self) -> Result<Vec<CheckpointInfo>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, label, created_at, file_count, turn_count
                 FROM checkpoints ORDER BY created_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_info(row)?);
            }
            Ok(out)
        })
    }

    fn get_checkpoint(&self, id: &CheckpointId) -> Result<Option<Checkpoint>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, label, created_at, file_count, turn_count, files, history
                 FROM checkpoints WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let info = row_to_info(row)?;
            let files: String = row_helpers::get(row, 5, "checkpoints", "files")?;
            let history: String = row_helpers::get(row, 6, "checkpoints", "history")?;
            Ok(Some(Checkpoint {
                info,
                snapshot: Snapshot {
                    files: row_helpers::parse_json(&files, "checkpoints", "files")?,
                    history: row_helpers::parse_json(&history, "checkpoints", "history")?,
                },
            }))
        })
    }

    fn delete_checkpoint(&self, id: &CheckpointId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let n = conn.execute("DELETE FROM checkpoints WHERE id = ?1", [id.as_str()])?;
            Ok(n > 0)
        })
    }
}
