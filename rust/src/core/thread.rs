// Per-thread synchronization engine.
//
// Owns the message store and everything that mutates it. All methods are
// synchronous; side effects (fetches, acknowledgements, scroll commands,
// timers) are queued as `SyncEffect`s for the actor to carry out.

use std::time::Duration;

use super::config::AppConfig;
use super::correlator::{JumpTarget, PendingOperation, RequestCorrelator};
use super::fetcher::{Direction, HistoryFetcher};
use super::scenario::BootstrapScenario;
use super::scroll::ScrollReconciler;
use super::seen::SeenTracker;
use super::store::{MessageStore, UNREAD_BANNER_ID};
use crate::state::{ScrollDirection, ScrollPosition, ThreadInfo, ThreadViewState};
use crate::transport::{HistoryRequest, HistoryResponse, Message};
use crate::updates::TimerKind;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SyncEffect {
    Fetch(HistoryRequest),
    SendSeen {
        thread_id: u64,
        message_id: u64,
    },
    ScrollTo {
        unique_id: String,
        position: ScrollPosition,
        animated: bool,
    },
    Schedule {
        timer: TimerKind,
        token: u64,
        after: Duration,
    },
    JumpTargetMissing {
        message_id: u64,
    },
}

#[derive(Debug)]
pub(crate) struct ThreadSync {
    pub(crate) thread: ThreadInfo,
    pub(crate) current_user_id: u64,
    pub(crate) store: MessageStore,
    correlator: RequestCorrelator,
    pub(crate) fetcher: HistoryFetcher,
    pub(crate) scroll: ScrollReconciler,
    seen: SeenTracker,
    /// Highest last-seen pointer the server is known to hold, from its own
    /// summaries or from acknowledgements already sent.
    pub(crate) server_seen: u64,
    // Pushes that arrived while a window fetch was in flight.
    deferred: Vec<Message>,
    highlighted: Option<u64>,
    highlight_token: u64,
    seen_debounce: Duration,
    highlight_for: Duration,
    scroll_guard: Duration,
    pagination_threshold: usize,
    effects: Vec<SyncEffect>,
}

impl ThreadSync {
    pub(crate) fn new(thread: ThreadInfo, current_user_id: u64, config: &AppConfig) -> Self {
        Self {
            fetcher: HistoryFetcher::new(thread.id, config.page_size()),
            server_seen: thread.last_seen_message_id,
            thread,
            current_user_id,
            store: MessageStore::new(config.utc_offset()),
            correlator: RequestCorrelator::new(),
            scroll: ScrollReconciler::new(),
            seen: SeenTracker::new(),
            deferred: vec![],
            highlighted: None,
            highlight_token: 0,
            seen_debounce: config.seen_debounce(),
            highlight_for: config.highlight_duration(),
            scroll_guard: config.scroll_guard(),
            pagination_threshold: config.pagination_threshold(),
            effects: vec![],
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.thread.id
    }

    pub(crate) fn take_effects(&mut self) -> Vec<SyncEffect> {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn take_changed(&mut self) -> Vec<String> {
        self.store.take_changed()
    }

    pub(crate) fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    /// Picks and starts the bootstrap plan. No-op once anything is loaded.
    pub(crate) fn bootstrap(&mut self) -> Option<BootstrapScenario> {
        if !self.store.is_empty() {
            return None;
        }
        let scenario = BootstrapScenario::resolve(&self.thread);
        tracing::info!(
            thread_id = self.thread.id,
            scenario = scenario.label(),
            "bootstrap"
        );
        match scenario {
            BootstrapScenario::Unread {
                last_seen_id,
                last_seen_time,
            } => {
                let req = self.fetcher.top_window(
                    &mut self.correlator,
                    last_seen_time.saturating_add(1),
                    PendingOperation::UnreadTop {
                        last_seen_id,
                        last_seen_time,
                    },
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
            BootstrapScenario::CaughtUp { last_seen_time } => {
                let req = self.fetcher.top_window(
                    &mut self.correlator,
                    last_seen_time.saturating_add(1),
                    PendingOperation::CaughtUpTop,
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
            BootstrapScenario::FirstVisit {
                last_message_id,
                last_message_time,
            } => {
                self.move_to_time(last_message_time, last_message_id, false);
            }
            BootstrapScenario::Empty => {
                let req = self.fetcher.offset_window(
                    &mut self.correlator,
                    PendingOperation::Offset { corrupted: false },
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
            BootstrapScenario::Inconsistent => {
                let req = self.fetcher.offset_window(
                    &mut self.correlator,
                    PendingOperation::Offset { corrupted: true },
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
        }
        Some(scenario)
    }

    /// Routes a history response to the operation that asked for it.
    /// Returns false for routing misses.
    pub(crate) fn on_response(&mut self, response: HistoryResponse) -> bool {
        if response.subject_id != self.thread.id {
            tracing::debug!(
                thread_id = self.thread.id,
                subject_id = response.subject_id,
                "response for another thread dropped"
            );
            return false;
        }
        let Some(tag) = self.correlator.tag_of(&response.unique_id) else {
            tracing::debug!(unique_id = %response.unique_id, "response without pending request dropped");
            return false;
        };

        if response.cache {
            // The live answer is still coming; merge what the cache knows and
            // keep the request pending.
            let edge = match self.correlator.peek(&response.unique_id) {
                Some(PendingOperation::MoreTop) => Some(Direction::Top),
                Some(PendingOperation::MoreBottom | PendingOperation::Reconnect) => {
                    Some(Direction::Bottom)
                }
                _ => None,
            };
            self.merge(edge, response.messages());
            return true;
        }

        let Some(operation) = self.correlator.pop(tag, &response.unique_id) else {
            return false;
        };
        tracing::debug!(
            tag,
            count = response.messages().len(),
            has_next = response.has_next,
            loaded = self.store.message_count(),
            "response"
        );

        match operation {
            PendingOperation::MoreTop => {
                self.merge(Some(Direction::Top), response.messages());
                self.fetcher.complete(Direction::Top, &response);
            }
            PendingOperation::MoreBottom | PendingOperation::Reconnect => {
                self.merge(Some(Direction::Bottom), response.messages());
                self.fetcher.complete(Direction::Bottom, &response);
            }
            PendingOperation::UnreadTop {
                last_seen_id,
                last_seen_time,
            } => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Top, &response);
                let anchor_time = self
                    .store
                    .get_by_id(last_seen_id)
                    .and_then(|e| e.message.time)
                    .unwrap_or(last_seen_time);
                let req = self.fetcher.bottom_window(
                    &mut self.correlator,
                    anchor_time.saturating_sub(1),
                    PendingOperation::UnreadBottom { last_seen_id },
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
            PendingOperation::UnreadBottom { last_seen_id } => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Bottom, &response);
                self.fold_deferred();
                let banner_placed = self
                    .store
                    .unique_id_for(last_seen_id)
                    .map(str::to_owned)
                    .is_some_and(|anchor| self.store.insert_unread_banner_after(&anchor));
                if banner_placed {
                    self.scroll_to(UNREAD_BANNER_ID.to_string(), ScrollPosition::Center, false);
                } else {
                    self.scroll_to_newest(false);
                }
            }
            PendingOperation::CaughtUpTop => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Top, &response);
                self.fetcher.has_next_bottom = false;
                self.fold_deferred();
                self.scroll_to_newest(false);
            }
            PendingOperation::Offset { corrupted } => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Top, &response);
                self.fetcher.has_next_bottom = false;
                self.fold_deferred();
                if corrupted {
                    self.adopt_loaded_as_ground_truth();
                }
                self.scroll_to_newest(false);
            }
            PendingOperation::ToTime(target) => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Top, &response);
                let req = self.fetcher.bottom_window(
                    &mut self.correlator,
                    target.time.saturating_sub(1),
                    PendingOperation::FromTime(target),
                );
                self.effects.push(SyncEffect::Fetch(req));
            }
            PendingOperation::FromTime(target) => {
                self.merge(None, response.messages());
                self.fetcher.complete(Direction::Bottom, &response);
                self.fold_deferred();
                self.finish_jump(target);
            }
        }
        true
    }

    /// Transport failure for one request: reset that direction, no retry.
    pub(crate) fn on_failure(&mut self, unique_id: &str, error: &str) -> bool {
        let Some(tag) = self.correlator.tag_of(unique_id) else {
            return false;
        };
        let Some(operation) = self.correlator.pop(tag, unique_id) else {
            return false;
        };
        tracing::warn!(tag, error, "history fetch failed");
        match operation {
            PendingOperation::MoreTop
            | PendingOperation::UnreadTop { .. }
            | PendingOperation::CaughtUpTop
            | PendingOperation::Offset { .. }
            | PendingOperation::ToTime(_) => self.fetcher.fail(Direction::Top),
            PendingOperation::MoreBottom
            | PendingOperation::Reconnect
            | PendingOperation::UnreadBottom { .. }
            | PendingOperation::FromTime(_) => self.fetcher.fail(Direction::Bottom),
        }
        if !self.correlator.window_pending() && !self.deferred.is_empty() {
            tracing::debug!(count = self.deferred.len(), "raced pushes dropped with failed window");
            self.deferred.clear();
        }
        true
    }

    fn merge(&mut self, edge: Option<Direction>, messages: &[Message]) {
        if messages.is_empty() {
            return;
        }
        let anchor = edge.and_then(|edge| self.scroll.anchor_for(edge, &self.store));
        let thread_id = self.thread.id;
        self.store.append_and_sort(
            messages
                .iter()
                .filter(|m| m.thread_id == thread_id)
                .cloned(),
        );
        self.reflect_pin();
        if let (Some(edge), Some(anchor)) = (edge, anchor) {
            let position = match edge {
                Direction::Top => ScrollPosition::Top,
                Direction::Bottom => ScrollPosition::Bottom,
            };
            self.scroll_to(anchor, position, false);
        }
    }

    /// Folds pushes that raced the window fetches once none is in flight.
    /// Outside the live end they are left to bottom pagination.
    fn fold_deferred(&mut self) {
        if self.deferred.is_empty() || self.correlator.window_pending() {
            return;
        }
        let deferred = std::mem::take(&mut self.deferred);
        if self.fetcher.has_next_bottom {
            tracing::debug!(count = deferred.len(), "raced pushes left to bottom pagination");
            return;
        }
        tracing::debug!(count = deferred.len(), "folding raced pushes");
        self.store.append_and_sort(deferred);
        self.reflect_pin();
    }

    /// Holds `message` back while a window fetch is in flight. The window
    /// that lands decides whether it belongs in the store.
    pub(crate) fn defer_if_window_pending(&mut self, message: Message) -> Option<Message> {
        if !self.correlator.window_pending() {
            return Some(message);
        }
        tracing::debug!(unique_id = %message.unique_id, "push raced a window fetch; deferred");
        self.deferred.push(message);
        None
    }

    /// Folds a server summary for this thread into the open session.
    pub(crate) fn merge_summary(&mut self, incoming: &ThreadInfo, server_seen: u64) {
        self.server_seen = self.server_seen.max(server_seen);
        let previous_pin = self.thread.pinned_message_id;
        self.thread.merge_from_server(incoming);
        if let Some(previous) = previous_pin.filter(|p| self.thread.pinned_message_id != Some(*p)) {
            self.store.mutate_by_id(previous, |e| e.message.pinned = false);
        }
        self.reflect_pin();
    }

    /// Pinned flags follow the thread's pin pointer, not whatever a page or
    /// edit happened to carry.
    pub(crate) fn reflect_pin(&mut self) {
        let Some(pinned) = self.thread.pinned_message_id else {
            return;
        };
        if self.store.get_by_id(pinned).is_some_and(|e| !e.message.pinned) {
            self.store.mutate_by_id(pinned, |e| e.message.pinned = true);
        }
    }

    fn adopt_loaded_as_ground_truth(&mut self) {
        let newest = self
            .store
            .entries()
            .filter(|e| e.is_message())
            .find_map(|e| e.message.id.map(|id| (id, e.message.time)));
        if let Some((id, time)) = newest {
            tracing::warn!(
                thread_id = self.thread.id,
                last_message_id = id,
                "thread metadata inconsistent; using loaded history"
            );
            self.thread.last_message_id = Some(id);
            self.thread.last_message_time = time;
        }
    }

    fn finish_jump(&mut self, target: JumpTarget) {
        match self.store.unique_id_for(target.message_id).map(str::to_owned) {
            Some(unique_id) => {
                self.scroll_to(unique_id, ScrollPosition::Center, false);
                if target.highlight {
                    self.highlight(target.message_id);
                }
            }
            None => {
                tracing::warn!(
                    thread_id = self.thread.id,
                    message_id = target.message_id,
                    "jump target not found after anchor fetches"
                );
                self.effects.push(SyncEffect::JumpTargetMissing {
                    message_id: target.message_id,
                });
            }
        }
    }

    /// Jump to a message. Local hits only scroll; misses reload the window
    /// around `time`.
    pub(crate) fn move_to_time(&mut self, time: u64, message_id: u64, highlight: bool) {
        if let Some(unique_id) = self.store.unique_id_for(message_id).map(str::to_owned) {
            self.scroll_to(unique_id, ScrollPosition::Center, true);
            if highlight {
                self.highlight(message_id);
            }
            return;
        }

        tracing::info!(thread_id = self.thread.id, message_id, time, "jump outside loaded window");
        // Responses for the old window must not land in the new one.
        self.store.clear();
        self.correlator.clear();
        self.deferred.clear();
        self.fetcher.reset();
        self.scroll.clear_visible();

        let target = JumpTarget {
            time,
            message_id,
            highlight,
        };
        let req = self.fetcher.top_window(
            &mut self.correlator,
            time.saturating_add(1),
            PendingOperation::ToTime(target),
        );
        self.effects.push(SyncEffect::Fetch(req));
    }

    pub(crate) fn set_scroll_direction(&mut self, direction: ScrollDirection) {
        self.scroll.direction = direction;
    }

    /// Viewport reports an entry as visible.
    pub(crate) fn on_message_appear(&mut self, unique_id: &str) -> bool {
        self.scroll.appeared(unique_id);
        let Some(entry) = self.store.get_by_unique_id(unique_id) else {
            return false;
        };
        if !entry.is_message() {
            return false;
        }
        let (id, time) = (entry.message.id, entry.message.time);

        let mut changed = false;
        if let Some(token) = self
            .seen
            .observe(self.scroll.direction, &mut self.thread, id, time)
        {
            self.effects.push(SyncEffect::Schedule {
                timer: TimerKind::SeenDebounce,
                token,
                after: self.seen_debounce,
            });
            changed = true;
        }
        if let Some(direction) =
            self.scroll
                .pagination_trigger(unique_id, &self.store, self.pagination_threshold)
        {
            changed |= self.load_more(direction);
        }
        changed
    }

    pub(crate) fn on_message_disappear(&mut self, unique_id: &str) {
        self.scroll.disappeared(unique_id);
    }

    pub(crate) fn load_more(&mut self, direction: Direction) -> bool {
        let req = match direction {
            Direction::Top => self
                .store
                .oldest_time()
                .and_then(|t| self.fetcher.more_top(&mut self.correlator, t)),
            Direction::Bottom => self
                .store
                .newest_time()
                .and_then(|t| self.fetcher.more_bottom(&mut self.correlator, t)),
        };
        match req {
            Some(req) => {
                self.effects.push(SyncEffect::Fetch(req));
                true
            }
            None => false,
        }
    }

    /// Connection came back: catch up below the newest loaded message.
    pub(crate) fn on_connection_restored(&mut self) -> bool {
        if self.store.is_empty() {
            if self.pending_requests() == 0 {
                return self.bootstrap().is_some();
            }
            return false;
        }
        if self.fetcher.is_loading(Direction::Bottom) {
            return false;
        }
        let Some(newest) = self.store.newest_time() else {
            return false;
        };
        self.fetcher.has_next_bottom = true;
        let req = self.fetcher.bottom_window(
            &mut self.correlator,
            newest,
            PendingOperation::Reconnect,
        );
        self.effects.push(SyncEffect::Fetch(req));
        true
    }

    /// Optimistic local send; `upload` marks a file placeholder.
    pub(crate) fn insert_local(&mut self, message: Message, upload: bool) {
        let unique_id = message.unique_id.clone();
        if upload {
            self.store.insert_upload(message);
        } else {
            self.store.insert_or_update(message);
        }
        self.scroll_to(unique_id, ScrollPosition::Bottom, true);
    }

    pub(crate) fn upload_progress(&mut self, unique_id: &str, percent: u8) -> bool {
        self.store.set_upload_progress(unique_id, percent)
    }

    pub(crate) fn on_timer(&mut self, timer: TimerKind, token: u64) -> bool {
        match timer {
            TimerKind::SeenDebounce => {
                if let Some(message_id) = self.seen.flush(token) {
                    self.send_seen(message_id);
                }
                false
            }
            TimerKind::HighlightExpiry => {
                if token != self.highlight_token || self.highlighted.is_none() {
                    return false;
                }
                self.highlighted = None;
                true
            }
            TimerKind::ScrollGuard => self.scroll.end_programmatic(token),
        }
    }

    /// Sends an acknowledgement still waiting on its debounce, e.g. when the
    /// thread is closing.
    pub(crate) fn flush_seen(&mut self) {
        if let Some(message_id) = self.seen.flush_now() {
            self.send_seen(message_id);
        }
    }

    fn send_seen(&mut self, message_id: u64) {
        tracing::debug!(thread_id = self.thread.id, message_id, "seen flush");
        self.server_seen = self.server_seen.max(message_id);
        self.effects.push(SyncEffect::SendSeen {
            thread_id: self.thread.id,
            message_id,
        });
    }

    pub(crate) fn scroll_to(&mut self, unique_id: String, position: ScrollPosition, animated: bool) {
        let token = self.scroll.begin_programmatic();
        self.effects.push(SyncEffect::ScrollTo {
            unique_id,
            position,
            animated,
        });
        self.effects.push(SyncEffect::Schedule {
            timer: TimerKind::ScrollGuard,
            token,
            after: self.scroll_guard,
        });
    }

    fn scroll_to_newest(&mut self, animated: bool) {
        if let Some(newest) = self.store.newest_unique_id().map(str::to_owned) {
            self.scroll_to(newest, ScrollPosition::Bottom, animated);
        }
    }

    fn highlight(&mut self, message_id: u64) {
        self.highlighted = Some(message_id);
        self.highlight_token = self.highlight_token.wrapping_add(1);
        self.effects.push(SyncEffect::Schedule {
            timer: TimerKind::HighlightExpiry,
            token: self.highlight_token,
            after: self.highlight_for,
        });
    }

    pub(crate) fn view(&self) -> ThreadViewState {
        ThreadViewState {
            thread: self.thread.clone(),
            sections: self.store.to_view(),
            top_loading: self.fetcher.top_loading,
            bottom_loading: self.fetcher.bottom_loading,
            has_next_top: self.fetcher.has_next_top,
            has_next_bottom: self.fetcher.has_next_bottom,
            highlighted_message_id: self.highlighted,
            programmatic_scroll: self.scroll.is_programmatic(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::correlator::{
        FROM_TIME, MORE_BOTTOM_FIRST_SCENARIO, MORE_BOTTOM_RECONNECT, MORE_TOP,
        MORE_TOP_FIRST_SCENARIO, MORE_TOP_FOURTH_SCENARIO, MORE_TOP_SECOND_SCENARIO, TO_TIME,
        MORE_BOTTOM_FIFTH_SCENARIO,
    };
    use crate::core::store::tests::msg;
    use crate::state::EntryKind;
    use crate::transport::SortOrder;

    pub(crate) const ME: u64 = 1_000;

    pub(crate) fn config() -> AppConfig {
        AppConfig {
            page_size: Some(10),
            ..AppConfig::default()
        }
    }

    pub(crate) fn engine(thread: ThreadInfo) -> ThreadSync {
        ThreadSync::new(thread, ME, &config())
    }

    pub(crate) fn thread_info(
        last_message_id: Option<u64>,
        last_message_time: Option<u64>,
        last_seen_id: u64,
        last_seen_time: Option<u64>,
        unread: u64,
    ) -> ThreadInfo {
        ThreadInfo {
            last_message_id,
            last_message_time,
            last_seen_message_id: last_seen_id,
            last_seen_message_time: last_seen_time,
            unread_count: unread,
            ..ThreadInfo::new(1)
        }
    }

    pub(crate) fn fetches(effects: &[SyncEffect]) -> Vec<HistoryRequest> {
        effects
            .iter()
            .filter_map(|e| match e {
                SyncEffect::Fetch(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn scrolls(effects: &[SyncEffect]) -> Vec<(String, ScrollPosition)> {
        effects
            .iter()
            .filter_map(|e| match e {
                SyncEffect::ScrollTo {
                    unique_id,
                    position,
                    ..
                } => Some((unique_id.clone(), *position)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn live(req: &HistoryRequest, ids: impl IntoIterator<Item = u64>, has_next: bool) -> HistoryResponse {
        HistoryResponse {
            unique_id: req.unique_id.clone(),
            subject_id: req.thread_id,
            result: Some(ids.into_iter().map(|i| msg(i, i * 100)).collect()),
            has_next,
            cache: false,
        }
    }

    fn order(sync: &ThreadSync) -> Vec<String> {
        sync.store
            .entries()
            .map(|e| e.message.unique_id.clone())
            .collect()
    }

    #[test]
    fn scenario_a_fetches_both_windows_and_places_banner() {
        let mut sync = engine(thread_info(Some(100), Some(10_000), 80, Some(8_000), 20));
        assert!(matches!(
            sync.bootstrap(),
            Some(BootstrapScenario::Unread { .. })
        ));
        let first = fetches(&sync.take_effects());
        assert_eq!(first.len(), 1);
        assert!(first[0].unique_id.starts_with(MORE_TOP_FIRST_SCENARIO));
        assert_eq!(first[0].to_time, Some(8_001));
        assert_eq!(first[0].order, SortOrder::Desc);

        assert!(sync.on_response(live(&first[0], 71..=80, true)));
        let second = fetches(&sync.take_effects());
        assert_eq!(second.len(), 1);
        assert!(second[0].unique_id.starts_with(MORE_BOTTOM_FIRST_SCENARIO));
        assert_eq!(second[0].from_time, Some(7_999));
        assert_eq!(second[0].order, SortOrder::Asc);

        assert!(sync.on_response(live(&second[0], 80..=90, true)));
        let effects = sync.take_effects();
        let banners = sync
            .store
            .entries()
            .filter(|e| e.kind == EntryKind::UnreadBanner)
            .count();
        assert_eq!(banners, 1);
        let order = order(&sync);
        let banner_at = order.iter().position(|u| u == UNREAD_BANNER_ID).unwrap();
        assert_eq!(order[banner_at + 1], "u-80");
        assert_eq!(order[banner_at - 1], "u-81");
        assert_eq!(
            scrolls(&effects),
            vec![(UNREAD_BANNER_ID.to_string(), ScrollPosition::Center)]
        );
        assert!(sync.fetcher.has_next_top);
        assert!(sync.fetcher.has_next_bottom);
        assert!(!sync.fetcher.top_loading && !sync.fetcher.bottom_loading);
    }

    #[test]
    fn scenario_b_single_top_window_without_banner() {
        let mut sync = engine(thread_info(Some(80), Some(8_000), 80, Some(8_000), 0));
        sync.bootstrap();
        let reqs = fetches(&sync.take_effects());
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].unique_id.starts_with(MORE_TOP_SECOND_SCENARIO));
        assert_eq!(reqs[0].to_time, Some(8_001));
        sync.on_response(live(&reqs[0], 71..=80, true));
        let effects = sync.take_effects();
        assert!(fetches(&effects).is_empty());
        assert!(!sync.store.has_unread_banner());
        assert!(!sync.fetcher.has_next_bottom);
        assert_eq!(
            scrolls(&effects),
            vec![("u-80".to_string(), ScrollPosition::Bottom)]
        );
    }

    #[test]
    fn scenario_c_jumps_to_last_message_without_highlight() {
        let mut sync = engine(thread_info(Some(30), Some(3_000), 0, None, 5));
        sync.bootstrap();
        let to = fetches(&sync.take_effects());
        assert!(to[0].unique_id.starts_with(TO_TIME));
        assert_eq!(to[0].to_time, Some(3_001));
        sync.on_response(live(&to[0], 21..=30, true));
        let from = fetches(&sync.take_effects());
        assert!(from[0].unique_id.starts_with(FROM_TIME));
        assert_eq!(from[0].from_time, Some(2_999));
        sync.on_response(live(&from[0], [30], false));
        let effects = sync.take_effects();
        assert_eq!(
            scrolls(&effects),
            vec![("u-30".to_string(), ScrollPosition::Center)]
        );
        assert_eq!(sync.view().highlighted_message_id, None);
        assert!(!sync.store.has_unread_banner());
        assert!(!sync.fetcher.has_next_bottom);
    }

    #[test]
    fn scenarios_d_and_e_use_offset_fetch() {
        let mut empty = engine(thread_info(None, None, 0, None, 0));
        empty.bootstrap();
        let reqs = fetches(&empty.take_effects());
        assert!(reqs[0].unique_id.starts_with(MORE_TOP_FOURTH_SCENARIO));
        assert_eq!((reqs[0].to_time, reqs[0].from_time, reqs[0].offset), (None, None, 0));
        empty.on_response(live(&reqs[0], [], false));
        assert!(empty.store.is_empty());
        assert!(!empty.fetcher.has_next_top && !empty.fetcher.has_next_bottom);

        let mut corrupted = engine(thread_info(Some(50), Some(5_000), 80, Some(8_000), 0));
        corrupted.bootstrap();
        let reqs = fetches(&corrupted.take_effects());
        assert!(reqs[0].unique_id.starts_with(MORE_BOTTOM_FIFTH_SCENARIO));
        corrupted.on_response(live(&reqs[0], 85..=90, true));
        assert_eq!(corrupted.thread.last_message_id, Some(90));
        assert_eq!(corrupted.store.message_count(), 6);
    }

    #[test]
    fn bootstrap_runs_once() {
        let mut sync = engine(thread_info(Some(80), Some(8_000), 80, Some(8_000), 0));
        sync.bootstrap();
        let reqs = fetches(&sync.take_effects());
        sync.on_response(live(&reqs[0], 71..=80, true));
        sync.take_effects();
        assert_eq!(sync.bootstrap(), None);
        assert!(sync.take_effects().is_empty());
    }

    fn loaded(ids: std::ops::RangeInclusive<u64>) -> ThreadSync {
        let last = *ids.end();
        let mut sync = engine(thread_info(Some(last), Some(last * 100), last, Some(last * 100), 0));
        sync.bootstrap();
        let reqs = fetches(&sync.take_effects());
        sync.on_response(live(&reqs[0], ids, true));
        sync.take_effects();
        // Let the initial scroll guard lapse.
        let token = sync.scroll.begin_programmatic();
        sync.scroll.end_programmatic(token);
        sync
    }

    #[test]
    fn top_merge_reanchors_on_oldest_visible_entry() {
        let mut sync = loaded(11..=20);
        sync.set_scroll_direction(ScrollDirection::Up);
        sync.on_message_appear("u-12");
        sync.on_message_appear("u-11");
        let effects = sync.take_effects();
        let reqs = fetches(&effects);
        assert_eq!(reqs.len(), 1);
        assert!(reqs[0].unique_id.starts_with(MORE_TOP));
        assert_eq!(reqs[0].to_time, Some(1_100));

        sync.on_response(live(&reqs[0], 1..=10, true));
        let effects = sync.take_effects();
        assert_eq!(
            scrolls(&effects),
            vec![("u-11".to_string(), ScrollPosition::Top)]
        );
        assert_eq!(sync.store.message_count(), 20);
    }

    #[test]
    fn programmatic_scroll_blocks_visibility_pagination() {
        let mut sync = loaded(11..=20);
        sync.scroll_to("u-15".into(), ScrollPosition::Center, true);
        sync.take_effects();
        sync.on_message_appear("u-11");
        assert!(fetches(&sync.take_effects()).is_empty());
    }

    #[test]
    fn cache_response_merges_but_keeps_request_pending() {
        let mut sync = loaded(11..=20);
        sync.load_more(Direction::Top);
        let req = fetches(&sync.take_effects()).remove(0);
        let mut cached = live(&req, 5..=10, false);
        cached.cache = true;
        assert!(sync.on_response(cached));
        assert_eq!(sync.store.message_count(), 16);
        assert!(sync.fetcher.top_loading);
        assert!(sync.fetcher.has_next_top);
        assert_eq!(sync.pending_requests(), 1);

        assert!(sync.on_response(live(&req, 1..=10, false)));
        assert!(!sync.fetcher.top_loading);
        assert!(!sync.fetcher.has_next_top);
        assert_eq!(sync.pending_requests(), 0);
        // Duplicate live delivery is a routing miss.
        assert!(!sync.on_response(live(&req, 1..=10, false)));
    }

    #[test]
    fn response_for_other_thread_is_dropped() {
        let mut sync = loaded(11..=20);
        sync.load_more(Direction::Top);
        let req = fetches(&sync.take_effects()).remove(0);
        let mut foreign = live(&req, 1..=10, true);
        foreign.subject_id = 2;
        assert!(!sync.on_response(foreign));
        assert_eq!(sync.store.message_count(), 10);
        assert!(sync.fetcher.top_loading);
    }

    #[test]
    fn failure_resets_loading_without_retry() {
        let mut sync = loaded(11..=20);
        sync.load_more(Direction::Top);
        let req = fetches(&sync.take_effects()).remove(0);
        assert!(sync.on_failure(&req.unique_id, "timeout"));
        assert!(!sync.fetcher.top_loading);
        assert!(sync.take_effects().is_empty());
        assert!(!sync.on_failure(&req.unique_id, "timeout"));
    }

    #[test]
    fn local_jump_makes_no_request_and_one_scroll() {
        let mut sync = loaded(11..=20);
        sync.move_to_time(1_500, 15, true);
        let effects = sync.take_effects();
        assert!(fetches(&effects).is_empty());
        assert_eq!(
            scrolls(&effects),
            vec![("u-15".to_string(), ScrollPosition::Center)]
        );
        assert_eq!(sync.view().highlighted_message_id, Some(15));

        let token = effects
            .iter()
            .find_map(|e| match e {
                SyncEffect::Schedule {
                    timer: TimerKind::HighlightExpiry,
                    token,
                    ..
                } => Some(*token),
                _ => None,
            })
            .unwrap();
        assert!(sync.on_timer(TimerKind::HighlightExpiry, token));
        assert_eq!(sync.view().highlighted_message_id, None);
    }

    #[test]
    fn remote_jump_reloads_window_and_highlights() {
        let mut sync = loaded(41..=50);
        sync.load_more(Direction::Top);
        let stale = fetches(&sync.take_effects()).remove(0);

        sync.move_to_time(500, 5, true);
        assert!(sync.store.is_empty());
        let to = fetches(&sync.take_effects()).remove(0);
        assert_eq!(to.to_time, Some(501));

        // The pre-jump MORE-TOP answer must not leak into the new window.
        assert!(!sync.on_response(live(&stale, 31..=40, true)));

        sync.on_response(live(&to, 1..=5, false));
        let from = fetches(&sync.take_effects()).remove(0);
        assert_eq!(from.from_time, Some(499));
        sync.on_response(live(&from, 5..=14, true));
        let effects = sync.take_effects();
        assert_eq!(
            scrolls(&effects),
            vec![("u-5".to_string(), ScrollPosition::Center)]
        );
        assert_eq!(sync.view().highlighted_message_id, Some(5));
        assert!(!sync.fetcher.has_next_top);
        assert!(sync.fetcher.has_next_bottom);
    }

    #[test]
    fn jump_miss_surfaces_debug_event() {
        let mut sync = loaded(41..=50);
        sync.move_to_time(500, 5, true);
        let to = fetches(&sync.take_effects()).remove(0);
        sync.on_response(live(&to, 1..=4, false));
        let from = fetches(&sync.take_effects()).remove(0);
        sync.on_response(live(&from, 6..=9, false));
        let effects = sync.take_effects();
        assert!(effects.contains(&SyncEffect::JumpTargetMissing { message_id: 5 }));
        assert!(scrolls(&effects).is_empty());
        assert_eq!(sync.store.message_count(), 8);
    }

    #[test]
    fn appear_marks_seen_locally_and_debounces_ack() {
        let mut sync = engine(thread_info(Some(60), Some(6_000), 49, Some(4_900), 3));
        sync.store
            .append_and_sort((45..=55).map(|i| msg(i, i * 100)));
        sync.set_scroll_direction(ScrollDirection::Down);

        assert!(sync.on_message_appear("u-50"));
        assert_eq!(sync.thread.unread_count, 2);
        assert_eq!(sync.thread.last_seen_message_id, 50);

        let mut tokens = vec![];
        for uid in ["u-51", "u-52", "u-53"] {
            sync.on_message_appear(uid);
        }
        for effect in sync.take_effects() {
            if let SyncEffect::Schedule {
                timer: TimerKind::SeenDebounce,
                token,
                ..
            } = effect
            {
                tokens.push(token);
            }
        }
        assert_eq!(sync.thread.unread_count, 0);
        let mut sent = vec![];
        for token in tokens {
            sync.on_timer(TimerKind::SeenDebounce, token);
            sent.extend(sync.take_effects());
        }
        assert_eq!(
            sent,
            vec![SyncEffect::SendSeen {
                thread_id: 1,
                message_id: 52
            }]
        );
    }

    #[test]
    fn reconnect_refetches_below_newest() {
        let mut sync = loaded(11..=20);
        assert!(!sync.fetcher.has_next_bottom);
        assert!(sync.on_connection_restored());
        let req = fetches(&sync.take_effects()).remove(0);
        assert!(req.unique_id.starts_with(MORE_BOTTOM_RECONNECT));
        assert_eq!(req.from_time, Some(2_000));
        sync.on_response(live(&req, 20..=22, false));
        assert_eq!(sync.store.message_count(), 12);
        assert!(!sync.fetcher.bottom_loading);
    }
    #[test]
    fn push_racing_caught_up_bootstrap_lands_with_the_window() {
        let mut sync = engine(thread_info(Some(10), Some(1_000), 10, Some(1_000), 0));
        sync.bootstrap();
        let req = fetches(&sync.take_effects()).remove(0);
        assert!(req.unique_id.starts_with(MORE_TOP_SECOND_SCENARIO));

        sync.apply_event(crate::transport::ServerEvent::New {
            message: msg(11, 1_100),
        });
        assert!(sync.store.is_empty());
        assert_eq!(sync.thread.last_message_id, Some(11));

        // The page was cut before the push.
        sync.on_response(live(&req, 1..=10, true));
        let effects = sync.take_effects();
        assert!(sync.store.get_by_id(11).is_some());
        assert!(!sync.fetcher.has_next_bottom);
        assert_eq!(
            scrolls(&effects),
            vec![("u-11".to_string(), ScrollPosition::Bottom)]
        );
    }

    #[test]
    fn push_racing_a_jump_waits_for_bottom_pagination_when_not_at_live_end() {
        let mut sync = loaded(11..=20);
        sync.move_to_time(500, 5, false);
        let to = fetches(&sync.take_effects()).remove(0);
        sync.apply_event(crate::transport::ServerEvent::New {
            message: msg(30, 3_000),
        });
        sync.on_response(live(&to, 1..=5, true));
        let from = fetches(&sync.take_effects()).remove(0);
        sync.on_response(live(&from, 5..=9, true));
        assert!(sync.store.get_by_id(30).is_none());
        assert!(sync.fetcher.has_next_bottom);
    }

    #[test]
    fn pages_without_pin_flag_leave_pinned_message_pinned() {
        let mut info = thread_info(Some(5), Some(500), 5, Some(500), 0);
        info.pinned_message_id = Some(3);
        let mut sync = engine(info);
        sync.bootstrap();
        let req = fetches(&sync.take_effects()).remove(0);
        sync.on_response(live(&req, 1..=5, true));
        assert!(sync.store.get_by_id(3).unwrap().message.pinned);
        sync.merge(None, &[msg(3, 300)]);
        assert!(sync.store.get_by_id(3).unwrap().message.pinned);
        assert!(!sync.store.get_by_id(4).unwrap().message.pinned);
    }

    #[test]
    fn flush_seen_sends_pending_ack_without_waiting() {
        let mut sync = engine(thread_info(Some(60), Some(6_000), 49, Some(4_900), 3));
        sync.store
            .append_and_sort((45..=55).map(|i| msg(i, i * 100)));
        sync.set_scroll_direction(ScrollDirection::Down);
        sync.on_message_appear("u-50");
        let token = sync
            .take_effects()
            .into_iter()
            .find_map(|e| match e {
                SyncEffect::Schedule {
                    timer: TimerKind::SeenDebounce,
                    token,
                    ..
                } => Some(token),
                _ => None,
            })
            .unwrap();

        sync.flush_seen();
        assert_eq!(
            sync.take_effects(),
            vec![SyncEffect::SendSeen {
                thread_id: 1,
                message_id: 50
            }]
        );
        assert_eq!(sync.server_seen, 50);
        sync.on_timer(TimerKind::SeenDebounce, token);
        assert!(sync.take_effects().is_empty());
    }
}
