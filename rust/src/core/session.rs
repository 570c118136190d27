// Session context + transport side effects.
//
// The host injects who the user is and how to reach the server; the actor
// never reaches for globals.

use std::sync::Arc;

use crate::transport::{ChatTransport, HistoryRequest, Message};

pub(crate) struct SessionContext {
    pub(crate) current_user_id: u64,
    pub(crate) connected: bool,
    transport: Arc<dyn ChatTransport>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("current_user_id", &self.current_user_id)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    pub(crate) fn new(current_user_id: u64, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            current_user_id,
            connected: true,
            transport,
        }
    }

    pub(crate) fn fetch_history(&self, request: HistoryRequest) {
        tracing::debug!(
            unique_id = %request.unique_id,
            thread_id = request.thread_id,
            order = ?request.order,
            to_time = ?request.to_time,
            from_time = ?request.from_time,
            "fetch_history"
        );
        self.transport.fetch_history(request);
    }

    pub(crate) fn send_seen(&self, thread_id: u64, message_id: u64) {
        tracing::debug!(thread_id, message_id, "send_seen");
        self.transport.send_seen(thread_id, message_id);
    }

    pub(crate) fn send_message(&self, message: Message) {
        tracing::info!(
            thread_id = message.thread_id,
            unique_id = %message.unique_id,
            "send_message"
        );
        self.transport.send_message(message);
    }

    pub(crate) fn delete_messages(&self, thread_id: u64, message_ids: Vec<u64>, for_all: bool) {
        tracing::info!(thread_id, count = message_ids.len(), for_all, "delete_messages");
        self.transport.delete_messages(thread_id, message_ids, for_all);
    }

    pub(crate) fn set_pinned(&self, message_id: u64, pinned: bool, notify_all: bool) {
        tracing::info!(message_id, pinned, "set_pinned");
        if pinned {
            self.transport.pin_message(message_id, notify_all);
        } else {
            self.transport.unpin_message(message_id);
        }
    }
}
