// Server push events.
//
// Thread-level bookkeeping (unread count, last message, pin pointer) is shared
// between the open thread and the thread-list summaries; the store side only
// applies to the open thread.

use super::seen::accept_server_unread;
use super::thread::ThreadSync;
use crate::state::{ReactionSummary, ScrollPosition, ThreadInfo};
use crate::transport::{Message, ServerEvent};

/// Applies the thread-level part of `event` to `info`. `server_seen` is the
/// last-seen pointer the server is known to hold. Returns whether anything
/// changed.
pub(crate) fn apply_to_thread_info(
    info: &mut ThreadInfo,
    event: &ServerEvent,
    current_user_id: u64,
    server_seen: u64,
) -> bool {
    match event {
        ServerEvent::New { message } => {
            let Some(id) = message.id else {
                return false;
            };
            let fresh = info.last_message_id.map_or(true, |last| id > last);
            info.record_last_message(id, message.time);
            if message.owner_id == current_user_id {
                info.raise_last_seen(id, message.time);
            } else if fresh && id > info.last_seen_message_id {
                info.unread_count = info.unread_count.saturating_add(1);
            }
            fresh
        }
        ServerEvent::UnreadCount { count, .. } => {
            let caught_up = info.last_seen_message_id <= server_seen;
            match accept_server_unread(info.unread_count, *count, caught_up) {
                Some(count) if count != info.unread_count => {
                    info.unread_count = count;
                    true
                }
                Some(_) => false,
                None => {
                    tracing::debug!(
                        thread_id = info.id,
                        local = info.unread_count,
                        server = count,
                        "server unread count ignored"
                    );
                    false
                }
            }
        }
        ServerEvent::Pinned { message_id, .. } => {
            let changed = info.pinned_message_id != Some(*message_id);
            info.pinned_message_id = Some(*message_id);
            changed
        }
        ServerEvent::Unpinned { message_id, .. } => {
            if info.pinned_message_id != Some(*message_id) {
                return false;
            }
            info.pinned_message_id = None;
            true
        }
        ServerEvent::Deleted { message_id, .. } => {
            if message_id.is_some() && info.pinned_message_id == *message_id {
                info.pinned_message_id = None;
                return true;
            }
            false
        }
        ServerEvent::Edited { .. }
        | ServerEvent::Delivered { .. }
        | ServerEvent::Seen { .. }
        | ServerEvent::Reaction { .. } => false,
    }
}

impl ThreadSync {
    /// Applies a push event for this thread. Returns whether the view changed.
    pub(crate) fn apply_event(&mut self, event: ServerEvent) -> bool {
        if event.subject_id() != self.thread.id {
            return false;
        }
        tracing::debug!(thread_id = self.thread.id, event = event.tag(), "server event");

        let previous_pin = self.thread.pinned_message_id;
        let info_changed = apply_to_thread_info(
            &mut self.thread,
            &event,
            self.current_user_id,
            self.server_seen,
        );

        let store_changed = match event {
            ServerEvent::New { message } => self.on_new(message),
            ServerEvent::Edited { message } => self.on_edited(message),
            ServerEvent::Deleted {
                message_id,
                unique_id,
                ..
            } => {
                let removed = message_id
                    .and_then(|id| self.store.remove_by_id(id))
                    .or_else(|| unique_id.and_then(|uid| self.store.remove_by_unique_id(&uid)));
                if let Some(entry) = &removed {
                    self.scroll.disappeared(&entry.message.unique_id);
                }
                removed.is_some()
            }
            ServerEvent::Delivered { message_id, .. } => self
                .store
                .mutate_by_id(message_id, |e| e.message.delivered = true),
            ServerEvent::Seen { message_id, .. } => {
                // Back-fill belongs to whoever owns the acknowledged message.
                let owner = self
                    .store
                    .get_by_id(message_id)
                    .map_or(self.current_user_id, |e| e.message.owner_id);
                self.store.backfill_seen(owner, message_id) > 0
            }
            ServerEvent::Pinned { message_id, .. } => {
                let mut changed = false;
                if let Some(previous) = previous_pin.filter(|p| *p != message_id) {
                    changed |= self
                        .store
                        .mutate_by_id(previous, |e| e.message.pinned = false);
                }
                changed | self.store.mutate_by_id(message_id, |e| e.message.pinned = true)
            }
            ServerEvent::Unpinned { message_id, .. } => self
                .store
                .mutate_by_id(message_id, |e| e.message.pinned = false),
            ServerEvent::Reaction {
                message_id,
                emoji,
                count,
                by_me,
                ..
            } => self.store.mutate_by_id(message_id, |e| {
                apply_reaction(&mut e.reactions, emoji, count, by_me)
            }),
            ServerEvent::UnreadCount { .. } => false,
        };
        info_changed || store_changed
    }

    fn on_new(&mut self, message: Message) -> bool {
        let known = self.store.get_by_unique_id(&message.unique_id).is_some()
            || message.id.is_some_and(|id| self.store.get_by_id(id).is_some());
        if known {
            // Confirmation of an optimistic send, or a duplicate push.
            let outcome = self.store.insert_or_update(message);
            tracing::debug!(?outcome, "pushed message merged");
            self.reflect_pin();
            return true;
        }
        let Some(message) = self.defer_if_window_pending(message) else {
            return false;
        };
        if self.fetcher.has_next_bottom {
            // The loaded window is not at the live end; the message will
            // arrive through bottom pagination.
            return false;
        }
        let own = message.owner_id == self.current_user_id;
        let was_at_bottom = self.scroll.is_at_bottom(&self.store, false);
        let unique_id = message.unique_id.clone();
        self.store.insert_or_update(message);
        self.reflect_pin();
        if own || was_at_bottom {
            self.scroll_to(unique_id, ScrollPosition::Bottom, true);
        }
        true
    }

    fn on_edited(&mut self, message: Message) -> bool {
        let exists = match message.id {
            Some(id) => self.store.get_by_id(id).is_some(),
            None => self.store.get_by_unique_id(&message.unique_id).is_some(),
        };
        if !exists {
            return false;
        }
        self.store.insert_or_update(Message {
            edited: true,
            ..message
        });
        self.reflect_pin();
        true
    }
}

fn apply_reaction(reactions: &mut Vec<ReactionSummary>, emoji: String, count: u32, by_me: bool) {
    if count == 0 {
        reactions.retain(|r| r.emoji != emoji);
        return;
    }
    match reactions.iter_mut().find(|r| r.emoji == emoji) {
        Some(existing) => {
            existing.count = count;
            existing.reacted_by_me = by_me;
        }
        None => reactions.push(ReactionSummary {
            emoji,
            count,
            reacted_by_me: by_me,
        }),
    }
}
