use tracing::debug;

use quill_core::events::{HistoryEvent, ObserverId, Observers};
use quill_core::ids::TurnId;
use quill_core::turns::{Role, Turn, TurnContent};

/// Append-only ordered turn list. Turns are only ever appended, deleted by id,
/// replaced wholesale by `load`, or cleared.
#[derive(Debug, Default)]
pub struct HistoryLog {
    turns: Vec<Turn>,
    observers: Observers<HistoryEvent>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl Fn(&HistoryEvent) + Send + Sync + 'static) -> ObserverId {
        self.observers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn append(
        &mut self,
        role: Role,
        content: impl Into<TurnContent>,
        meta: serde_json::Value,
    ) -> Turn {
        let turn = Turn::new(role, content, meta);
        debug!(turn_id = %turn.id, role = role.as_str(), "history append");
        self.turns.push(turn.clone());
        self.observers.notify(&HistoryEvent::Appended {
            id: turn.id.clone(),
            role,
        });
        turn
    }

    pub fn get(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn find(&self, id: &TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| &t.id == id)
    }

    /// Returns false when no turn has that id.
    pub fn delete(&mut self, id: &TurnId) -> bool {
        let Some(idx) = self.turns.iter().position(|t| &t.id == id) else {
            return false;
        };
        self.turns.remove(idx);
        self.observers
            .notify(&HistoryEvent::Deleted { id: id.clone() });
        true
    }

    pub fn load(&mut self, turns: Vec<Turn>) {
        self.turns = turns;
        self.observers.notify(&HistoryEvent::Loaded {
            turns: self.turns.len(),
        });
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.observers.notify(&HistoryEvent::Cleared);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn append_and_get_in_order() {
        let mut log = HistoryLog::new();
        log.append(Role::User, "hello", serde_json::Value::Null);
        log.append(Role::Model, "hi", json!({"actions": 0}));
        let roles: Vec<_> = log.get().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Model]);
        assert_eq!(log.last().unwrap().meta["actions"], 0);
    }

    #[test]
    fn delete_by_id() {
        let mut log = HistoryLog::new();
        let first = log.append(Role::User, "a", serde_json::Value::Null);
        log.append(Role::User, "b", serde_json::Value::Null);

        assert!(log.delete(&first.id));
        assert!(!log.delete(&first.id));
        assert_eq!(log.len(), 1);
        assert_eq!(log.get()[0].text(), "b");
        assert!(log.find(&first.id).is_none());
    }

    #[test]
    fn load_and_clear_notify() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut log = HistoryLog::new();
        log.subscribe(move |e| sink.lock().push(e.clone()));

        let turn = Turn::new(Role::System, "restored", serde_json::Value::Null);
        log.load(vec![turn.clone()]);
        assert_eq!(log.last().unwrap().id, turn.id);
        log.clear();
        assert!(log.is_empty());

        assert_eq!(
            *events.lock(),
            [HistoryEvent::Loaded { turns: 1 }, HistoryEvent::Cleared]
        );
    }

    #[test]
    fn append_event_carries_id() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut log = HistoryLog::new();
        log.subscribe(move |e| sink.lock().push(e.clone()));
        let turn = log.append(Role::Model, "x", serde_json::Value::Null);
        assert_eq!(
            *events.lock(),
            [HistoryEvent::Appended { id: turn.id, role: Role::Model }]
        );
    }
}
