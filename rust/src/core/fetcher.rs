// Top/bottom pagination with one request in flight per direction.

use super::correlator::{PendingOperation, RequestCorrelator};
use crate::transport::{HistoryRequest, HistoryResponse, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Top,
    Bottom,
}

#[derive(Debug)]
pub(crate) struct HistoryFetcher {
    thread_id: u64,
    page_size: u32,
    pub(crate) top_loading: bool,
    pub(crate) bottom_loading: bool,
    pub(crate) has_next_top: bool,
    pub(crate) has_next_bottom: bool,
}

impl HistoryFetcher {
    pub(crate) fn new(thread_id: u64, page_size: u32) -> Self {
        Self {
            thread_id,
            page_size,
            top_loading: false,
            bottom_loading: false,
            has_next_top: true,
            has_next_bottom: true,
        }
    }

    pub(crate) fn is_loading(&self, direction: Direction) -> bool {
        match direction {
            Direction::Top => self.top_loading,
            Direction::Bottom => self.bottom_loading,
        }
    }

    fn set_loading(&mut self, direction: Direction, loading: bool) {
        match direction {
            Direction::Top => self.top_loading = loading,
            Direction::Bottom => self.bottom_loading = loading,
        }
    }

    /// Older history ending at `before_time`, if allowed right now.
    pub(crate) fn more_top(
        &mut self,
        correlator: &mut RequestCorrelator,
        before_time: u64,
    ) -> Option<HistoryRequest> {
        if self.top_loading || !self.has_next_top {
            tracing::debug!(
                loading = self.top_loading,
                has_next = self.has_next_top,
                "more_top skipped"
            );
            return None;
        }
        Some(self.top_window(correlator, before_time, PendingOperation::MoreTop))
    }

    /// Newer history starting at `after_time`, if allowed right now.
    pub(crate) fn more_bottom(
        &mut self,
        correlator: &mut RequestCorrelator,
        after_time: u64,
    ) -> Option<HistoryRequest> {
        if self.bottom_loading || !self.has_next_bottom {
            tracing::debug!(
                loading = self.bottom_loading,
                has_next = self.has_next_bottom,
                "more_bottom skipped"
            );
            return None;
        }
        Some(self.bottom_window(correlator, after_time, PendingOperation::MoreBottom))
    }

    /// Descending window ending at `to_time`. Marks the top direction busy.
    pub(crate) fn top_window(
        &mut self,
        correlator: &mut RequestCorrelator,
        to_time: u64,
        operation: PendingOperation,
    ) -> HistoryRequest {
        self.top_loading = true;
        HistoryRequest {
            unique_id: correlator.append(operation),
            thread_id: self.thread_id,
            count: self.page_size,
            offset: 0,
            order: SortOrder::Desc,
            to_time: Some(to_time),
            from_time: None,
            query: None,
        }
    }

    /// Ascending window starting at `from_time`. Marks the bottom direction busy.
    pub(crate) fn bottom_window(
        &mut self,
        correlator: &mut RequestCorrelator,
        from_time: u64,
        operation: PendingOperation,
    ) -> HistoryRequest {
        self.bottom_loading = true;
        HistoryRequest {
            unique_id: correlator.append(operation),
            thread_id: self.thread_id,
            count: self.page_size,
            offset: 0,
            order: SortOrder::Asc,
            to_time: None,
            from_time: Some(from_time),
            query: None,
        }
    }

    /// Newest page by plain offset, no time anchor.
    pub(crate) fn offset_window(
        &mut self,
        correlator: &mut RequestCorrelator,
        operation: PendingOperation,
    ) -> HistoryRequest {
        self.top_loading = true;
        HistoryRequest {
            unique_id: correlator.append(operation),
            thread_id: self.thread_id,
            count: self.page_size,
            offset: 0,
            order: SortOrder::Desc,
            to_time: None,
            from_time: None,
            query: None,
        }
    }

    /// Applies a consumed response to `direction`. Cache responses never
    /// touch the has-next flags, and an empty live page ends the direction.
    pub(crate) fn complete(&mut self, direction: Direction, response: &HistoryResponse) {
        self.set_loading(direction, false);
        if response.cache {
            return;
        }
        let has_next = response.has_next && !response.messages().is_empty();
        match direction {
            Direction::Top => self.has_next_top = has_next,
            Direction::Bottom => self.has_next_bottom = has_next,
        }
    }

    /// Transport failure: reset the loading state, keep the flags, no retry.
    pub(crate) fn fail(&mut self, direction: Direction) {
        self.set_loading(direction, false);
    }

    pub(crate) fn reset(&mut self) {
        self.top_loading = false;
        self.bottom_loading = false;
        self.has_next_top = true;
        self.has_next_bottom = true;
    }
}
