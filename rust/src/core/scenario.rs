// Bootstrap plan selection on thread open.

use crate::state::ThreadInfo;

/// Exactly one of these runs when a thread is opened with nothing loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BootstrapScenario {
    /// A: unread messages after a known last-seen point. Fetch up to the
    /// last-seen message, then the window after it, then place the banner.
    Unread {
        last_seen_id: u64,
        last_seen_time: u64,
    },
    /// B: already caught up. One window ending at the last-seen message,
    /// anchored on the last message's time when the last-seen time is absent.
    CaughtUp { last_seen_time: u64 },
    /// C: first visit to a thread with history. Jump to the last message.
    FirstVisit {
        last_message_id: u64,
        last_message_time: u64,
    },
    /// D: nothing in the thread yet. Plain offset fetch.
    Empty,
    /// E: metadata is inconsistent (last seen ahead of last message, or no
    /// usable time anchor). Plain offset fetch taken as ground truth.
    Inconsistent,
}

impl BootstrapScenario {
    pub(crate) fn resolve(thread: &ThreadInfo) -> Self {
        let last_message_id = thread.last_message_id.filter(|id| *id > 0);
        let last_seen_id = thread.last_seen_message_id;

        if last_seen_id == 0 {
            return match (last_message_id, thread.last_message_time) {
                (Some(last_message_id), Some(last_message_time)) => {
                    BootstrapScenario::FirstVisit {
                        last_message_id,
                        last_message_time,
                    }
                }
                _ => BootstrapScenario::Empty,
            };
        }

        let Some(last_message_id) = last_message_id else {
            return BootstrapScenario::Inconsistent;
        };
        match (
            last_message_id.cmp(&last_seen_id),
            thread.last_seen_message_time,
        ) {
            (std::cmp::Ordering::Less, _) => BootstrapScenario::Inconsistent,
            // Equal ids name the same message, so its own time anchors the
            // window when the last-seen time was never recorded.
            (std::cmp::Ordering::Equal, last_seen_time) => {
                match last_seen_time.or(thread.last_message_time) {
                    Some(last_seen_time) => BootstrapScenario::CaughtUp { last_seen_time },
                    None => BootstrapScenario::Inconsistent,
                }
            }
            (std::cmp::Ordering::Greater, Some(last_seen_time)) => BootstrapScenario::Unread {
                last_seen_id,
                last_seen_time,
            },
            (_, None) => BootstrapScenario::Inconsistent,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            BootstrapScenario::Unread { .. } => "unread",
            BootstrapScenario::CaughtUp { .. } => "caught_up",
            BootstrapScenario::FirstVisit { .. } => "first_visit",
            BootstrapScenario::Empty => "empty",
            BootstrapScenario::Inconsistent => "inconsistent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(
        last_message_id: Option<u64>,
        last_message_time: Option<u64>,
        last_seen_id: u64,
        last_seen_time: Option<u64>,
    ) -> ThreadInfo {
        ThreadInfo {
            last_message_id,
            last_message_time,
            last_seen_message_id: last_seen_id,
            last_seen_message_time: last_seen_time,
            ..ThreadInfo::new(1)
        }
    }

    #[test]
    fn unread_thread_picks_a() {
        let t = thread(Some(100), Some(9_000), 80, Some(8_000));
        assert_eq!(
            BootstrapScenario::resolve(&t),
            BootstrapScenario::Unread {
                last_seen_id: 80,
                last_seen_time: 8_000
            }
        );
    }

    #[test]
    fn caught_up_thread_picks_b() {
        let t = thread(Some(80), Some(8_000), 80, Some(8_000));
        assert_eq!(
            BootstrapScenario::resolve(&t),
            BootstrapScenario::CaughtUp {
                last_seen_time: 8_000
            }
        );
    }

    #[test]
    fn caught_up_without_seen_time_anchors_on_last_message() {
        let t = thread(Some(80), Some(8_000), 80, None);
        assert_eq!(
            BootstrapScenario::resolve(&t),
            BootstrapScenario::CaughtUp {
                last_seen_time: 8_000
            }
        );
        assert_eq!(
            BootstrapScenario::resolve(&thread(Some(80), None, 80, None)),
            BootstrapScenario::Inconsistent
        );
    }

    #[test]
    fn first_visit_picks_c() {
        let t = thread(Some(12), Some(1_200), 0, None);
        assert_eq!(
            BootstrapScenario::resolve(&t),
            BootstrapScenario::FirstVisit {
                last_message_id: 12,
                last_message_time: 1_200
            }
        );
    }

    #[test]
    fn empty_thread_picks_d() {
        assert_eq!(
            BootstrapScenario::resolve(&thread(None, None, 0, None)),
            BootstrapScenario::Empty
        );
        // A last message without a time cannot be jumped to.
        assert_eq!(
            BootstrapScenario::resolve(&thread(Some(3), None, 0, None)),
            BootstrapScenario::Empty
        );
    }

    #[test]
    fn corrupted_metadata_picks_e() {
        let t = thread(Some(50), Some(5_000), 80, Some(8_000));
        assert_eq!(
            BootstrapScenario::resolve(&t),
            BootstrapScenario::Inconsistent
        );
        let missing_time = thread(Some(90), Some(9_000), 80, None);
        assert_eq!(
            BootstrapScenario::resolve(&missing_time),
            BootstrapScenario::Inconsistent
        );
    }

    #[test]
    fn every_tuple_maps_to_exactly_one_scenario() {
        let ids = [None, Some(0), Some(1), Some(5), Some(9)];
        let times = [None, Some(100)];
        for last_message_id in ids {
            for last_message_time in times {
                for last_seen_id in [0, 1, 5, 9] {
                    for last_seen_time in times {
                        let t = thread(
                            last_message_id,
                            last_message_time,
                            last_seen_id,
                            last_seen_time,
                        );
                        let first = BootstrapScenario::resolve(&t);
                        // Deterministic: same input, same plan.
                        assert_eq!(first, BootstrapScenario::resolve(&t));
                        if let BootstrapScenario::Unread { last_seen_id: id, .. } = first {
                            assert!(last_message_id.unwrap_or(0) > id);
                        }
                    }
                }
            }
        }
    }
}
