// Viewport bookkeeping: what is visible, where to re-anchor after merges, and
// whether a programmatic scroll is currently in flight.

use std::collections::HashSet;

use super::fetcher::Direction;
use super::store::MessageStore;
use crate::state::ScrollDirection;

#[derive(Debug)]
pub(crate) struct ScrollReconciler {
    visible: HashSet<String>,
    pub(crate) direction: ScrollDirection,
    programmatic: bool,
    guard_token: u64,
}

impl ScrollReconciler {
    pub(crate) fn new() -> Self {
        Self {
            visible: HashSet::new(),
            direction: ScrollDirection::Idle,
            programmatic: false,
            guard_token: 0,
        }
    }

    pub(crate) fn appeared(&mut self, unique_id: &str) {
        self.visible.insert(unique_id.to_string());
    }

    pub(crate) fn disappeared(&mut self, unique_id: &str) {
        self.visible.remove(unique_id);
    }

    pub(crate) fn clear_visible(&mut self) {
        self.visible.clear();
    }

    /// Visible entry closest to the edge that is about to grow. For a top
    /// merge that is the oldest visible entry, for a bottom merge the newest.
    pub(crate) fn anchor_for(&self, edge: Direction, store: &MessageStore) -> Option<String> {
        let mut visible = self
            .visible
            .iter()
            .filter_map(|unique_id| store.position_of(unique_id).map(|pos| (pos, unique_id)));
        let anchor = match edge {
            Direction::Top => visible.max_by_key(|(pos, _)| *pos),
            Direction::Bottom => visible.min_by_key(|(pos, _)| *pos),
        };
        anchor.map(|(_, unique_id)| unique_id.clone())
    }

    /// The newest loaded message is on screen and nothing newer exists.
    pub(crate) fn is_at_bottom(&self, store: &MessageStore, has_next_bottom: bool) -> bool {
        if has_next_bottom {
            return false;
        }
        match store.newest_unique_id() {
            Some(newest) => self.visible.contains(newest),
            None => true,
        }
    }

    /// Starts a guarded programmatic scroll; returns the token that ends it.
    pub(crate) fn begin_programmatic(&mut self) -> u64 {
        self.guard_token = self.guard_token.wrapping_add(1);
        self.programmatic = true;
        self.guard_token
    }

    /// Ends the guard unless a newer programmatic scroll took over.
    pub(crate) fn end_programmatic(&mut self, token: u64) -> bool {
        if token != self.guard_token {
            return false;
        }
        self.programmatic = false;
        true
    }

    pub(crate) fn is_programmatic(&self) -> bool {
        self.programmatic
    }

    /// Which edge, if any, an appearance of `unique_id` should extend.
    pub(crate) fn pagination_trigger(
        &self,
        unique_id: &str,
        store: &MessageStore,
        threshold: usize,
    ) -> Option<Direction> {
        if self.programmatic {
            return None;
        }
        if store.is_near_oldest(unique_id, threshold) {
            return Some(Direction::Top);
        }
        if store.is_near_newest(unique_id, threshold) {
            return Some(Direction::Bottom);
        }
        None
    }
}
