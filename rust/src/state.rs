use crate::transport::Message;

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub connected: bool,
    pub thread_list: Vec<ThreadInfo>,
    pub current_thread: Option<ThreadViewState>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connected: false,
            thread_list: vec![],
            current_thread: None,
        }
    }
}

/// Thread metadata as known to the client. Used both as the input to open a
/// thread and as the narrow thread-list summary.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u64,
    pub last_message_id: Option<u64>,
    pub last_message_time: Option<u64>,
    /// 0 when the user never saw anything in this thread.
    pub last_seen_message_id: u64,
    pub last_seen_message_time: Option<u64>,
    pub unread_count: u64,
    pub pinned_message_id: Option<u64>,
}

impl ThreadInfo {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            last_message_id: None,
            last_message_time: None,
            last_seen_message_id: 0,
            last_seen_message_time: None,
            unread_count: 0,
            pinned_message_id: None,
        }
    }

    /// Raise the last-seen pointer; never moves backwards.
    pub(crate) fn raise_last_seen(&mut self, message_id: u64, time: Option<u64>) -> bool {
        if message_id <= self.last_seen_message_id {
            return false;
        }
        self.last_seen_message_id = message_id;
        if time.is_some() {
            self.last_seen_message_time = time;
        }
        true
    }

    pub(crate) fn record_last_message(&mut self, message_id: u64, time: Option<u64>) {
        if self.last_message_id.is_some_and(|cur| cur >= message_id) {
            return;
        }
        self.last_message_id = Some(message_id);
        if time.is_some() {
            self.last_message_time = time;
        }
    }

    /// Folds a server-provided summary into what the client already knows.
    /// Pointers only move forward. The unread count may always go down; it
    /// goes up only when the summary's last-seen pointer has caught up with
    /// the local one, so a summary older than local seen progress cannot
    /// undo it.
    pub(crate) fn merge_from_server(&mut self, incoming: &ThreadInfo) {
        let caught_up = incoming.last_seen_message_id >= self.last_seen_message_id;
        if let Some(id) = incoming.last_message_id {
            self.record_last_message(id, incoming.last_message_time);
        }
        self.raise_last_seen(
            incoming.last_seen_message_id,
            incoming.last_seen_message_time,
        );
        if caught_up || incoming.unread_count <= self.unread_count {
            self.unread_count = incoming.unread_count;
        }
        self.pinned_message_id = incoming.pinned_message_id;
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct ThreadViewState {
    pub thread: ThreadInfo,
    /// Most recent day first.
    pub sections: Vec<MessageSectionView>,
    pub top_loading: bool,
    pub bottom_loading: bool,
    pub has_next_top: bool,
    pub has_next_bottom: bool,
    pub highlighted_message_id: Option<u64>,
    pub programmatic_scroll: bool,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct MessageSectionView {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    /// Most recent entry first.
    pub entries: Vec<MessageEntryView>,
}

#[derive(uniffi::Record, Clone, Debug, PartialEq)]
pub struct MessageEntryView {
    pub message: Message,
    pub kind: EntryKind,
    pub reactions: Vec<ReactionSummary>,
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Message,
    /// Synthetic marker between seen and unseen history. Never persisted.
    UnreadBanner,
    /// Local file send that has not been confirmed by the server yet.
    Upload { percent: u8 },
}

#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: u32,
    pub reacted_by_me: bool,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Idle,
}

#[derive(uniffi::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollPosition {
    Top,
    Center,
    Bottom,
}

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
