pub mod control;
pub mod create;
pub mod delete;
pub mod edit;
pub mod list;
pub mod read;
pub mod search;
pub mod transfer;

use std::sync::Arc;

use quill_core::actions::{ActionKind, Signal};

use crate::dispatch::ActionDispatcher;

/// Register every built-in handler with its default signal.
pub fn register_builtins(dispatcher: &mut ActionDispatcher) {
    // Queries
    dispatcher.register_kind(ActionKind::Read, Arc::new(read::ReadAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::List, Arc::new(list::ListAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Search, Arc::new(search::SearchAction), Signal::Continue);

    // Mutations
    dispatcher.register_kind(ActionKind::Create, Arc::new(create::CreateAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Edit, Arc::new(edit::EditAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Delete, Arc::new(delete::DeleteAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Move, Arc::new(transfer::MoveAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Copy, Arc::new(transfer::CopyAction), Signal::Continue);

    // Loop control
    dispatcher.register_kind(ActionKind::Report, Arc::new(control::ReportAction), Signal::Continue);
    dispatcher.register_kind(ActionKind::Ask, Arc::new(control::AskAction), Signal::Halt);
    dispatcher.register_kind(ActionKind::Finish, Arc::new(control::FinishAction), Signal::Terminate);
}
