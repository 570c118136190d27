// Date-sectioned message store for the open thread.
//
// Sections are ordered most recent day first, entries inside a section most
// recent first. Lookups go through `positions`/`ids`, which are rebuilt after
// every structural change.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::state::{
    now_millis, EntryKind, MessageEntryView, MessageSectionView, ReactionSummary,
};
use crate::transport::Message;

pub(crate) const UNREAD_BANNER_ID: &str = "unread-banner";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MessageEntry {
    pub(crate) message: Message,
    pub(crate) kind: EntryKind,
    pub(crate) reactions: Vec<ReactionSummary>,
    seq: u64,
}

impl MessageEntry {
    /// Descending order key. Unsent messages have no time and sit at the very
    /// bottom; the banner carries its anchor's time and sorts just after it.
    fn sort_key(&self) -> (u64, u8, u64) {
        let rank = match self.kind {
            EntryKind::UnreadBanner => 1,
            _ => 0,
        };
        (self.message.time.unwrap_or(u64::MAX), rank, self.seq)
    }

    pub(crate) fn is_message(&self) -> bool {
        !matches!(self.kind, EntryKind::UnreadBanner)
    }
}

#[derive(Debug, Clone)]
struct MessageSection {
    date: NaiveDate,
    entries: Vec<MessageEntry>,
}

/// Display position; orders like the list does (most recent first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct EntryPosition {
    pub(crate) section: usize,
    pub(crate) item: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpsertOutcome {
    Inserted,
    Updated,
    /// An upload placeholder was swapped for the confirmed message.
    Replaced,
}

#[derive(Debug)]
pub(crate) struct MessageStore {
    sections: Vec<MessageSection>,
    positions: HashMap<String, EntryPosition>,
    ids: HashMap<u64, String>,
    offset: FixedOffset,
    next_seq: u64,
    needs_sort: bool,
    changed: BTreeSet<String>,
}

impl MessageStore {
    pub(crate) fn new(offset: FixedOffset) -> Self {
        Self {
            sections: vec![],
            positions: HashMap::new(),
            ids: HashMap::new(),
            offset,
            next_seq: 0,
            needs_sort: false,
            changed: BTreeSet::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub(crate) fn message_count(&self) -> usize {
        self.entries().filter(|e| e.is_message()).count()
    }

    /// Inserts `message` or merges it into the matching entry, then sorts if
    /// ordering may have changed.
    pub(crate) fn insert_or_update(&mut self, message: Message) -> UpsertOutcome {
        let outcome = self.upsert(message);
        if self.needs_sort {
            self.sort();
        }
        outcome
    }

    /// Batch upsert with a single sort at the end.
    pub(crate) fn append_and_sort(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.upsert(message);
        }
        if self.needs_sort {
            self.sort();
        }
    }

    fn upsert(&mut self, message: Message) -> UpsertOutcome {
        let Some(unique_id) = self.find_logical(&message) else {
            self.push_unsorted(MessageEntry {
                message,
                kind: EntryKind::Message,
                reactions: vec![],
                seq: 0,
            });
            return UpsertOutcome::Inserted;
        };
        let Some(pos) = self.positions.get(&unique_id).copied() else {
            return UpsertOutcome::Updated;
        };

        let entry = &mut self.sections[pos.section].entries[pos.item];
        let before_key = entry.sort_key();
        let before_time = entry.message.time;
        let outcome = if matches!(entry.kind, EntryKind::Upload { .. }) {
            // Upload state belongs to the placeholder, not the confirmed message.
            let unique_id = std::mem::take(&mut entry.message.unique_id);
            entry.message = Message {
                unique_id,
                ..message
            };
            entry.kind = EntryKind::Message;
            entry.reactions.clear();
            UpsertOutcome::Replaced
        } else {
            merge_message(&mut entry.message, message);
            UpsertOutcome::Updated
        };
        if let Some(id) = entry.message.id {
            self.ids.insert(id, unique_id.clone());
        }
        let key_changed = entry.sort_key() != before_key;
        let time_changed = entry.message.time != before_time;
        self.changed.insert(unique_id);

        if time_changed && self.section_date(before_time) != self.section_date_at(pos) {
            // Moved to another day.
            let entry = self.detach(pos);
            self.push_unsorted(entry);
        } else if key_changed {
            self.needs_sort = true;
        }
        outcome
    }

    fn find_logical(&self, message: &Message) -> Option<String> {
        if self.positions.contains_key(&message.unique_id) {
            return Some(message.unique_id.clone());
        }
        message.id.and_then(|id| self.ids.get(&id).cloned())
    }

    fn section_date_at(&self, pos: EntryPosition) -> NaiveDate {
        let time = self.sections[pos.section].entries[pos.item].message.time;
        self.section_date(time)
    }

    fn push_unsorted(&mut self, mut entry: MessageEntry) {
        self.next_seq += 1;
        if entry.seq == 0 {
            entry.seq = self.next_seq;
        }
        let date = self.section_date(entry.message.time);
        let section = match self.sections.iter().position(|s| s.date == date) {
            Some(i) => i,
            None => {
                self.sections.push(MessageSection {
                    date,
                    entries: vec![],
                });
                self.sections.len() - 1
            }
        };
        let unique_id = entry.message.unique_id.clone();
        if let Some(id) = entry.message.id {
            self.ids.insert(id, unique_id.clone());
        }
        self.sections[section].entries.push(entry);
        let item = self.sections[section].entries.len() - 1;
        self.positions
            .insert(unique_id.clone(), EntryPosition { section, item });
        self.changed.insert(unique_id);
        self.needs_sort = true;
    }

    fn detach(&mut self, pos: EntryPosition) -> MessageEntry {
        let entry = self.sections[pos.section].entries.remove(pos.item);
        if self.sections[pos.section].entries.is_empty() {
            self.sections.remove(pos.section);
        }
        self.reindex();
        entry
    }

    fn reindex(&mut self) {
        self.positions.clear();
        self.ids.clear();
        for (s, section) in self.sections.iter().enumerate() {
            for (i, entry) in section.entries.iter().enumerate() {
                self.positions.insert(
                    entry.message.unique_id.clone(),
                    EntryPosition {
                        section: s,
                        item: i,
                    },
                );
                if let Some(id) = entry.message.id {
                    self.ids.insert(id, entry.message.unique_id.clone());
                }
            }
        }
    }

    /// Re-sorts entries and sections, most recent first.
    pub(crate) fn sort(&mut self) {
        self.sections.retain(|s| !s.entries.is_empty());
        for section in &mut self.sections {
            section
                .entries
                .sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
        }
        self.sections.sort_by(|a, b| b.date.cmp(&a.date));
        self.reindex();
        self.needs_sort = false;
    }

    pub(crate) fn remove_by_unique_id(&mut self, unique_id: &str) -> Option<MessageEntry> {
        let pos = self.positions.get(unique_id).copied()?;
        self.changed.insert(unique_id.to_string());
        Some(self.detach(pos))
    }

    pub(crate) fn remove_by_id(&mut self, id: u64) -> Option<MessageEntry> {
        let unique_id = self.ids.get(&id)?.clone();
        self.remove_by_unique_id(&unique_id)
    }

    pub(crate) fn clear(&mut self) {
        self.changed.extend(self.positions.keys().cloned());
        self.sections.clear();
        self.positions.clear();
        self.ids.clear();
        self.needs_sort = false;
    }

    pub(crate) fn get_by_unique_id(&self, unique_id: &str) -> Option<&MessageEntry> {
        let pos = self.positions.get(unique_id)?;
        self.sections
            .get(pos.section)
            .and_then(|s| s.entries.get(pos.item))
    }

    pub(crate) fn get_by_id(&self, id: u64) -> Option<&MessageEntry> {
        self.ids
            .get(&id)
            .and_then(|unique_id| self.get_by_unique_id(unique_id))
    }

    pub(crate) fn unique_id_for(&self, id: u64) -> Option<&str> {
        self.ids.get(&id).map(String::as_str)
    }

    pub(crate) fn position_of(&self, unique_id: &str) -> Option<EntryPosition> {
        self.positions.get(unique_id).copied()
    }

    /// All entries in display order (most recent first).
    pub(crate) fn entries(&self) -> impl DoubleEndedIterator<Item = &MessageEntry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    fn timed_messages(&self) -> impl DoubleEndedIterator<Item = &MessageEntry> {
        self.entries()
            .filter(|e| e.is_message() && e.message.time.is_some())
    }

    pub(crate) fn newest_time(&self) -> Option<u64> {
        self.timed_messages().find_map(|e| e.message.time)
    }

    pub(crate) fn oldest_time(&self) -> Option<u64> {
        self.timed_messages().rev().find_map(|e| e.message.time)
    }

    pub(crate) fn newest_unique_id(&self) -> Option<&str> {
        self.entries()
            .find(|e| e.is_message())
            .map(|e| e.message.unique_id.as_str())
    }

    /// Whether `unique_id` is among the `threshold + 1` oldest timed messages.
    pub(crate) fn is_near_oldest(&self, unique_id: &str, threshold: usize) -> bool {
        self.timed_messages()
            .rev()
            .take(threshold + 1)
            .any(|e| e.message.unique_id == unique_id)
    }

    /// Whether `unique_id` is among the `threshold + 1` newest timed messages.
    pub(crate) fn is_near_newest(&self, unique_id: &str, threshold: usize) -> bool {
        self.timed_messages()
            .take(threshold + 1)
            .any(|e| e.message.unique_id == unique_id)
    }

    /// Applies `f` to the entry and records it as changed.
    pub(crate) fn mutate(&mut self, unique_id: &str, f: impl FnOnce(&mut MessageEntry)) -> bool {
        let Some(pos) = self.positions.get(unique_id).copied() else {
            return false;
        };
        f(&mut self.sections[pos.section].entries[pos.item]);
        self.changed.insert(unique_id.to_string());
        true
    }

    pub(crate) fn mutate_by_id(&mut self, id: u64, f: impl FnOnce(&mut MessageEntry)) -> bool {
        let Some(unique_id) = self.ids.get(&id).cloned() else {
            return false;
        };
        self.mutate(&unique_id, f)
    }

    /// Marks every message from `owner_id` up to and including `up_to_id` as
    /// delivered and seen. Returns how many entries changed.
    pub(crate) fn backfill_seen(&mut self, owner_id: u64, up_to_id: u64) -> usize {
        let mut touched = vec![];
        for section in &mut self.sections {
            for entry in &mut section.entries {
                let eligible = entry.is_message()
                    && entry.message.owner_id == owner_id
                    && entry.message.id.is_some_and(|id| id <= up_to_id);
                if eligible && !(entry.message.seen && entry.message.delivered) {
                    entry.message.seen = true;
                    entry.message.delivered = true;
                    touched.push(entry.message.unique_id.clone());
                }
            }
        }
        let n = touched.len();
        self.changed.extend(touched);
        n
    }

    /// Inserts a placeholder for a local file send.
    pub(crate) fn insert_upload(&mut self, message: Message) {
        if self.find_logical(&message).is_some() {
            return;
        }
        self.push_unsorted(MessageEntry {
            message,
            kind: EntryKind::Upload { percent: 0 },
            reactions: vec![],
            seq: 0,
        });
        self.sort();
    }

    pub(crate) fn set_upload_progress(&mut self, unique_id: &str, percent: u8) -> bool {
        let is_upload = self
            .get_by_unique_id(unique_id)
            .is_some_and(|e| matches!(e.kind, EntryKind::Upload { .. }));
        is_upload
            && self.mutate(unique_id, |e| {
                e.kind = EntryKind::Upload {
                    percent: percent.min(100),
                }
            })
    }

    /// Places the unread banner right after (newer than) the given message.
    /// Any previous banner is dropped.
    pub(crate) fn insert_unread_banner_after(&mut self, unique_id: &str) -> bool {
        let Some(anchor) = self.get_by_unique_id(unique_id) else {
            return false;
        };
        let Some(time) = anchor.message.time else {
            return false;
        };
        let thread_id = anchor.message.thread_id;
        self.remove_by_unique_id(UNREAD_BANNER_ID);
        self.push_unsorted(MessageEntry {
            message: Message {
                id: None,
                unique_id: UNREAD_BANNER_ID.to_string(),
                thread_id,
                time: Some(time),
                owner_id: 0,
                text: String::new(),
                seen: true,
                delivered: true,
                pinned: false,
                edited: false,
                metadata: None,
            },
            kind: EntryKind::UnreadBanner,
            reactions: vec![],
            seq: 0,
        });
        self.sort();
        true
    }

    pub(crate) fn has_unread_banner(&self) -> bool {
        self.positions.contains_key(UNREAD_BANNER_ID)
    }

    pub(crate) fn take_changed(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changed).into_iter().collect()
    }

    fn section_date(&self, time: Option<u64>) -> NaiveDate {
        let millis = time.unwrap_or_else(now_millis);
        i64::try_from(millis)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.with_timezone(&self.offset).date_naive())
            .unwrap_or(NaiveDate::MIN)
    }

    pub(crate) fn to_view(&self) -> Vec<MessageSectionView> {
        self.sections
            .iter()
            .map(|s| MessageSectionView {
                date: s.date.format("%Y-%m-%d").to_string(),
                entries: s
                    .entries
                    .iter()
                    .map(|e| MessageEntryView {
                        message: e.message.clone(),
                        kind: e.kind.clone(),
                        reactions: e.reactions.clone(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Folds `incoming` into `target`. Acknowledgement flags never regress.
fn merge_message(target: &mut Message, incoming: Message) {
    if incoming.id.is_some() {
        target.id = incoming.id;
    }
    if incoming.time.is_some() {
        target.time = incoming.time;
    }
    target.owner_id = incoming.owner_id;
    target.text = incoming.text;
    target.seen |= incoming.seen;
    target.delivered |= incoming.delivered;
    target.edited |= incoming.edited;
    // Pin state only moves through pin events.
    if incoming.metadata.is_some() {
        target.metadata = incoming.metadata;
    }
}
