//! Contract with the transport collaborator.
//!
//! The core never talks to the network itself. It hands `HistoryRequest`s and
//! acknowledgements to a `ChatTransport` implemented by the host, and receives
//! responses and push events back through `FfiApp::on_history_response`,
//! `FfiApp::on_history_failure` and `FfiApp::on_server_event`.

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Server id; absent until the server acknowledged the message.
    pub id: Option<u64>,
    /// Client-generated id, stable from optimistic send through confirmation.
    pub unique_id: String,
    pub thread_id: u64,
    /// Server timestamp in milliseconds; absent for unsent messages.
    pub time: Option<u64>,
    pub owner_id: u64,
    pub text: String,
    pub seen: bool,
    pub delivered: bool,
    pub pinned: bool,
    pub edited: bool,
    /// Free-form JSON payload (files, locations).
    pub metadata: Option<String>,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Tag-prefixed correlation id, echoed back in the response.
    pub unique_id: String,
    pub thread_id: u64,
    pub count: u32,
    pub offset: u32,
    pub order: SortOrder,
    pub to_time: Option<u64>,
    pub from_time: Option<u64>,
    pub query: Option<String>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct HistoryResponse {
    pub unique_id: String,
    /// Thread id the response belongs to, checked before anything is applied.
    pub subject_id: u64,
    pub result: Option<Vec<Message>>,
    pub has_next: bool,
    /// Served from the local cache. Merged, but never trusted for
    /// pagination-exhaustion flags.
    pub cache: bool,
}

impl HistoryResponse {
    pub fn messages(&self) -> &[Message] {
        self.result.as_deref().unwrap_or_default()
    }
}

/// Push events delivered by the server independently of pagination.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    New {
        message: Message,
    },
    Edited {
        message: Message,
    },
    Deleted {
        thread_id: u64,
        message_id: Option<u64>,
        unique_id: Option<String>,
    },
    Delivered {
        thread_id: u64,
        message_id: u64,
    },
    Seen {
        thread_id: u64,
        message_id: u64,
    },
    Pinned {
        thread_id: u64,
        message_id: u64,
    },
    Unpinned {
        thread_id: u64,
        message_id: u64,
    },
    Reaction {
        thread_id: u64,
        message_id: u64,
        emoji: String,
        count: u32,
        by_me: bool,
    },
    UnreadCount {
        thread_id: u64,
        count: u64,
    },
}

impl ServerEvent {
    pub fn subject_id(&self) -> u64 {
        match self {
            ServerEvent::New { message } | ServerEvent::Edited { message } => message.thread_id,
            ServerEvent::Deleted { thread_id, .. }
            | ServerEvent::Delivered { thread_id, .. }
            | ServerEvent::Seen { thread_id, .. }
            | ServerEvent::Pinned { thread_id, .. }
            | ServerEvent::Unpinned { thread_id, .. }
            | ServerEvent::Reaction { thread_id, .. }
            | ServerEvent::UnreadCount { thread_id, .. } => *thread_id,
        }
    }

    /// Log-safe event tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ServerEvent::New { .. } => "New",
            ServerEvent::Edited { .. } => "Edited",
            ServerEvent::Deleted { .. } => "Deleted",
            ServerEvent::Delivered { .. } => "Delivered",
            ServerEvent::Seen { .. } => "Seen",
            ServerEvent::Pinned { .. } => "Pinned",
            ServerEvent::Unpinned { .. } => "Unpinned",
            ServerEvent::Reaction { .. } => "Reaction",
            ServerEvent::UnreadCount { .. } => "UnreadCount",
        }
    }
}

/// Host-side network layer. Implementations must not block: requests are
/// handed off and answered later through the `FfiApp::on_*` entry points.
#[uniffi::export(callback_interface)]
pub trait ChatTransport: Send + Sync + 'static {
    fn fetch_history(&self, request: HistoryRequest);
    fn send_seen(&self, thread_id: u64, message_id: u64);
    fn pin_message(&self, message_id: u64, notify_all: bool);
    fn unpin_message(&self, message_id: u64);
    fn delete_messages(&self, thread_id: u64, message_ids: Vec<u64>, for_all: bool);
    fn send_message(&self, message: Message);
}
