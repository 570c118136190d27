use crate::state::{ScrollDirection, ThreadInfo};

#[derive(uniffi::Enum, Debug, Clone)]
pub enum ChatAction {
    // Thread lifecycle
    OpenThread {
        thread: ThreadInfo,
    },
    CloseThread,
    UpsertThreadSummaries {
        threads: Vec<ThreadInfo>,
    },

    // Viewport
    MessageAppeared {
        unique_id: String,
    },
    MessageDisappeared {
        unique_id: String,
    },
    ScrollDirectionChanged {
        direction: ScrollDirection,
    },
    LoadMoreTop,
    LoadMoreBottom,
    MoveToTime {
        time: u64,
        message_id: u64,
        highlight: bool,
    },

    // Message operations
    DeleteMessages {
        message_ids: Vec<u64>,
        for_all: bool,
    },
    TogglePinMessage {
        message_id: u64,
        notify_all: bool,
    },
    SendMessage {
        /// Client-generated; stays with the message through confirmation.
        unique_id: String,
        text: String,
        metadata: Option<String>,
    },
    UploadProgress {
        unique_id: String,
        progress: u8,
    },

    // Lifecycle
    ConnectionChanged {
        connected: bool,
    },
}

impl ChatAction {
    /// Log-safe action tag (never includes message text).
    pub fn tag(&self) -> &'static str {
        match self {
            ChatAction::OpenThread { .. } => "OpenThread",
            ChatAction::CloseThread => "CloseThread",
            ChatAction::UpsertThreadSummaries { .. } => "UpsertThreadSummaries",
            ChatAction::MessageAppeared { .. } => "MessageAppeared",
            ChatAction::MessageDisappeared { .. } => "MessageDisappeared",
            ChatAction::ScrollDirectionChanged { .. } => "ScrollDirectionChanged",
            ChatAction::LoadMoreTop => "LoadMoreTop",
            ChatAction::LoadMoreBottom => "LoadMoreBottom",
            ChatAction::MoveToTime { .. } => "MoveToTime",
            ChatAction::DeleteMessages { .. } => "DeleteMessages",
            ChatAction::TogglePinMessage { .. } => "TogglePinMessage",
            ChatAction::SendMessage { .. } => "SendMessage",
            ChatAction::UploadProgress { .. } => "UploadProgress",
            ChatAction::ConnectionChanged { .. } => "ConnectionChanged",
        }
    }
}
