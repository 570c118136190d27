use crate::state::{AppState, ScrollPosition};
use crate::transport::{HistoryResponse, ServerEvent};
use crate::ChatAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    /// Unique ids of entries inserted, updated or removed since the previous
    /// update, so hosts can diff instead of re-rendering the whole thread.
    MessagesChanged {
        rev: u64,
        thread_id: u64,
        unique_ids: Vec<String>,
    },
    ScrollTo {
        rev: u64,
        thread_id: u64,
        unique_id: String,
        position: ScrollPosition,
        animated: bool,
    },
    /// A jump finished its anchor fetches without finding the target.
    JumpTargetMissing {
        rev: u64,
        thread_id: u64,
        message_id: u64,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::MessagesChanged { rev, .. } => *rev,
            AppUpdate::ScrollTo { rev, .. } => *rev,
            AppUpdate::JumpTargetMissing { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(ChatAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    SeenDebounce,
    HighlightExpiry,
    ScrollGuard,
}

#[derive(Debug)]
pub enum InternalEvent {
    // Transport callbacks
    HistoryResponse(HistoryResponse),
    HistoryFailure {
        unique_id: String,
        error: String,
    },
    ServerEvent(ServerEvent),

    // Timers. `generation` identifies the thread session that scheduled it;
    // timers from a closed session are dropped.
    TimerFired {
        generation: u64,
        timer: TimerKind,
        token: u64,
    },
}
