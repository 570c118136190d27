// Seen bookkeeping: optimistic local unread/last-seen updates plus a debounced
// acknowledgement to the server.
//
// Debounce works with tokens the same way toast dismissal does: every new
// candidate bumps the token and schedules a timer; only the timer carrying
// the latest token may flush.

use crate::state::{ScrollDirection, ThreadInfo};

#[derive(Debug, Default)]
pub(crate) struct SeenTracker {
    pending: Option<u64>,
    last_sent: u64,
    token: u64,
}

impl SeenTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_eligible(
        direction: ScrollDirection,
        thread: &ThreadInfo,
        message_id: Option<u64>,
    ) -> bool {
        if direction == ScrollDirection::Up || thread.unread_count == 0 {
            return false;
        }
        message_id.is_some_and(|id| id > thread.last_seen_message_id)
    }

    /// Handles an appearance. When eligible, updates `thread` in place and
    /// returns the debounce token to schedule a flush for.
    pub(crate) fn observe(
        &mut self,
        direction: ScrollDirection,
        thread: &mut ThreadInfo,
        message_id: Option<u64>,
        message_time: Option<u64>,
    ) -> Option<u64> {
        if !Self::is_eligible(direction, thread, message_id) {
            return None;
        }
        let id = message_id?;
        thread.unread_count = thread.unread_count.saturating_sub(1);
        thread.raise_last_seen(id, message_time);

        self.pending = Some(self.pending.map_or(id, |p| p.max(id)));
        self.token = self.token.wrapping_add(1);
        Some(self.token)
    }

    /// Debounce timer fired. Returns the id to acknowledge when `token` is
    /// still the latest and the id moves the server forward.
    pub(crate) fn flush(&mut self, token: u64) -> Option<u64> {
        if token != self.token {
            return None;
        }
        self.take_pending()
    }

    /// Flushes without waiting for the debounce. Any timer still scheduled
    /// becomes stale.
    pub(crate) fn flush_now(&mut self) -> Option<u64> {
        self.token = self.token.wrapping_add(1);
        self.take_pending()
    }

    fn take_pending(&mut self) -> Option<u64> {
        let id = self.pending.take()?;
        if id <= self.last_sent {
            return None;
        }
        self.last_sent = id;
        Some(id)
    }
}

/// Server-reported unread counts may always lower the local value. A higher
/// count is taken only once the server knows every local seen advance
/// (`server_caught_up`); before that it predates an acknowledgement and
/// would undo it.
pub(crate) fn accept_server_unread(
    local: u64,
    server: u64,
    server_caught_up: bool,
) -> Option<u64> {
    (server <= local || server_caught_up).then_some(server)
}
