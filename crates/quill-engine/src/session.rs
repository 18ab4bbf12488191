use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use quill_core::ids::{CheckpointId, SessionId};
use quill_store::{ContentStore, HistoryLog, Persistence, StoreError};

/// One agent session: the content store, its history, and optional durable
/// storage. Store and history observers mark the session dirty; `save` only
/// writes when something changed since the last save or load.
pub struct Session {
    id: SessionId,
    store: ContentStore,
    history: HistoryLog,
    persistence: Option<Arc<dyn Persistence>>,
    dirty: Arc<AtomicBool>,
}

impl Session {
    /// In-memory session with no persistence.
    pub fn new(quota_bytes: usize) -> Self {
        Self::assemble(ContentStore::new(quota_bytes), HistoryLog::new(), None)
    }

    /// Session backed by `persistence`, restored from the last save if any.
    /// A save larger than `quota_bytes` still loads; the store then only
    /// accepts changes that do not grow it.
    pub fn open(quota_bytes: usize, persistence: Arc<dyn Persistence>) -> Result<Self, StoreError> {
        let mut session = Self::assemble(
            ContentStore::new(quota_bytes),
            HistoryLog::new(),
            Some(persistence.clone()),
        );
        if let Some(snapshot) = persistence.load()? {
            let files = snapshot.files.len();
            let turns = snapshot.history.len();
            session.store.load_saved(snapshot.files)?;
            session.history.load(snapshot.history);
            info!(files, turns, "session restored");
        }
        session.dirty.store(false, Ordering::Relaxed);
        Ok(session)
    }

    fn assemble(
        mut store: ContentStore,
        mut history: HistoryLog,
        persistence: Option<Arc<dyn Persistence>>,
    ) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let flag = dirty.clone();
        store.subscribe(move |_| flag.store(true, Ordering::Relaxed));
        let flag = dirty.clone();
        history.subscribe(move |_| flag.store(true, Ordering::Relaxed));
        Self {
            id: SessionId::new(),
            store,
            history,
            persistence,
            dirty,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ContentStore {
        &mut self.store
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut HistoryLog {
        &mut self.history
    }

    /// Split borrow for callers that mutate the store while reading the id.
    pub fn parts_mut(&mut self) -> (&SessionId, &mut ContentStore, &mut HistoryLog) {
        (&self.id, &mut self.store, &mut self.history)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }

    /// Write the current state if it changed. Returns whether a save happened.
    pub fn save(&self) -> Result<bool, StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(false);
        }
        let files = self.store.snapshot();
        if let Err(e) = persistence.save(&files, self.history.get()) {
            self.dirty.store(true, Ordering::Relaxed);
            return Err(e);
        }
        debug!(session_id = %self.id, files = files.len(), turns = self.history.len(), "session saved");
        Ok(true)
    }

    /// `None` for in-memory sessions.
    pub fn create_checkpoint(&self, label: &str) -> Result<Option<CheckpointId>, StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(None);
        };
        let id = persistence.create_checkpoint(label, &self.store.snapshot(), self.history.get())?;
        info!(checkpoint_id = %id, label, "checkpoint created");
        Ok(Some(id))
    }

    /// Replace store and history with a checkpoint. Returns false if it does
    /// not exist. The quota is validated before anything is replaced.
    pub fn restore_checkpoint(&mut self, id: &CheckpointId) -> Result<bool, StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        let Some(checkpoint) = persistence.get_checkpoint(id)? else {
            return Ok(false);
        };
        self.store.restore(checkpoint.snapshot.files)?;
        self.history.load(checkpoint.snapshot.history);
        info!(checkpoint_id = %id, "checkpoint restored");
        Ok(true)
    }
}
