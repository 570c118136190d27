// Request/response correlation for history fetches.

use std::collections::HashMap;

pub(crate) const MORE_TOP: &str = "MORE-TOP";
pub(crate) const MORE_BOTTOM: &str = "MORE-BOTTOM";
pub(crate) const MORE_BOTTOM_RECONNECT: &str = "MORE-BOTTOM-RECONNECT";
pub(crate) const TO_TIME: &str = "TO-TIME";
pub(crate) const FROM_TIME: &str = "FROM-TIME";
pub(crate) const MORE_TOP_FIRST_SCENARIO: &str = "MORE-TOP-FIRST-SCENARIO";
pub(crate) const MORE_BOTTOM_FIRST_SCENARIO: &str = "MORE-BOTTOM-FIRST-SCENARIO";
pub(crate) const MORE_TOP_SECOND_SCENARIO: &str = "MORE-TOP-SECOND-SCENARIO";
pub(crate) const MORE_TOP_FOURTH_SCENARIO: &str = "MORE-TOP-FOURTH-SCENARIO";
pub(crate) const MORE_BOTTOM_FIFTH_SCENARIO: &str = "MORE-BOTTOM-FIFTH-SCENARIO";

/// Where a jump is headed; carried by both anchor fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct JumpTarget {
    pub(crate) time: u64,
    pub(crate) message_id: u64,
    pub(crate) highlight: bool,
}

/// What the response to a pending request should do once it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingOperation {
    MoreTop,
    MoreBottom,
    Reconnect,
    ToTime(JumpTarget),
    FromTime(JumpTarget),
    /// Scenario A, first leg: window ending at the last-seen message.
    UnreadTop {
        last_seen_id: u64,
        last_seen_time: u64,
    },
    /// Scenario A, second leg: window after the last-seen message.
    UnreadBottom { last_seen_id: u64 },
    /// Scenario B: user already caught up.
    CaughtUpTop,
    /// Scenarios D and E: untimed offset fetch taken as ground truth.
    Offset { corrupted: bool },
}

impl PendingOperation {
    /// Bootstrap and jump legs decide what the loaded window is; paging only
    /// extends it.
    fn shapes_window(&self) -> bool {
        !matches!(
            self,
            PendingOperation::MoreTop | PendingOperation::MoreBottom | PendingOperation::Reconnect
        )
    }

    pub(crate) fn tag(&self) -> &'static str {
        match self {
            PendingOperation::MoreTop => MORE_TOP,
            PendingOperation::MoreBottom => MORE_BOTTOM,
            PendingOperation::Reconnect => MORE_BOTTOM_RECONNECT,
            PendingOperation::ToTime(_) => TO_TIME,
            PendingOperation::FromTime(_) => FROM_TIME,
            PendingOperation::UnreadTop { .. } => MORE_TOP_FIRST_SCENARIO,
            PendingOperation::UnreadBottom { .. } => MORE_BOTTOM_FIRST_SCENARIO,
            PendingOperation::CaughtUpTop => MORE_TOP_SECOND_SCENARIO,
            PendingOperation::Offset { corrupted: false } => MORE_TOP_FOURTH_SCENARIO,
            PendingOperation::Offset { corrupted: true } => MORE_BOTTOM_FIFTH_SCENARIO,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub(crate) tag: &'static str,
    pub(crate) operation: PendingOperation,
}

/// Pending history requests keyed by their correlation id.
///
/// Correlation ids are `"{tag}-{uuid}"`, so a response can only be claimed
/// through the tag it was issued under. The correlator does not police
/// duplicate tags; keeping those unique is the caller's job.
#[derive(Debug, Default)]
pub(crate) struct RequestCorrelator {
    pending: HashMap<String, PendingRequest>,
}

impl RequestCorrelator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `operation` and returns the correlation id to send.
    pub(crate) fn append(&mut self, operation: PendingOperation) -> String {
        let tag = operation.tag();
        let unique_id = format!("{tag}-{}", uuid::Uuid::new_v4());
        tracing::debug!(tag, unique_id = %unique_id, "request pending");
        self.pending
            .insert(unique_id.clone(), PendingRequest { tag, operation });
        unique_id
    }

    /// Tag of the pending request behind `unique_id`, if any.
    pub(crate) fn tag_of(&self, unique_id: &str) -> Option<&'static str> {
        self.pending.get(unique_id).map(|p| p.tag)
    }

    pub(crate) fn peek(&self, unique_id: &str) -> Option<&PendingOperation> {
        self.pending.get(unique_id).map(|p| &p.operation)
    }

    /// Removes and returns the request for `unique_id` when it was issued
    /// under `tag`. Leaves state untouched otherwise.
    pub(crate) fn pop(&mut self, tag: &str, unique_id: &str) -> Option<PendingOperation> {
        let matches = unique_id
            .strip_prefix(tag)
            .is_some_and(|rest| rest.starts_with('-'))
            && self.pending.get(unique_id).is_some_and(|p| p.tag == tag);
        if !matches {
            return None;
        }
        self.pending.remove(unique_id).map(|p| p.operation)
    }

    pub(crate) fn window_pending(&self) -> bool {
        self.pending.values().any(|p| p.operation.shapes_window())
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    /// Abandons everything in flight. Late responses become routing misses.
    pub(crate) fn clear(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(abandoned = self.pending.len(), "abandoning pending requests");
        }
        self.pending.clear();
    }
}
