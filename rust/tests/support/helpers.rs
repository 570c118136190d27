#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use threadline_core::{
    AppReconciler, AppUpdate, ChatTransport, HistoryRequest, HistoryResponse, Message,
};

pub const ME: u64 = 1;
pub const PEER: u64 = 2;

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(10), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

/// Short timers so debounce and guard windows elapse quickly in tests.
pub fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("threadline_config.json");
    let v = serde_json::json!({
        "page_size": 10,
        "seen_debounce_ms": 40,
        "highlight_ms": 150,
        "programmatic_scroll_guard_ms": 20,
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

pub fn message(thread_id: u64, id: u64, owner_id: u64) -> Message {
    Message {
        id: Some(id),
        unique_id: format!("m-{thread_id}-{id}"),
        thread_id,
        time: Some(id * 1_000),
        owner_id,
        text: format!("message {id}"),
        seen: false,
        delivered: true,
        pinned: false,
        edited: false,
        metadata: None,
    }
}

pub fn respond(
    request: &HistoryRequest,
    ids: impl IntoIterator<Item = u64>,
    has_next: bool,
) -> HistoryResponse {
    HistoryResponse {
        unique_id: request.unique_id.clone(),
        subject_id: request.thread_id,
        result: Some(
            ids.into_iter()
                .map(|id| message(request.thread_id, id, PEER))
                .collect(),
        ),
        has_next,
        cache: false,
    }
}

#[derive(Default)]
pub struct Recorded {
    pub fetches: Vec<HistoryRequest>,
    pub seen: Vec<(u64, u64)>,
    pub pins: Vec<(u64, bool)>,
    pub deletes: Vec<(u64, Vec<u64>, bool)>,
    pub sent: Vec<Message>,
}

/// Transport double that records every call and answers nothing on its own.
#[derive(Clone, Default)]
pub struct MockTransport(pub Arc<Mutex<Recorded>>);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> Vec<HistoryRequest> {
        self.0.lock().unwrap().fetches.clone()
    }

    pub fn fetch(&self, index: usize) -> HistoryRequest {
        self.0.lock().unwrap().fetches[index].clone()
    }

    pub fn seen(&self) -> Vec<(u64, u64)> {
        self.0.lock().unwrap().seen.clone()
    }

    pub fn wait_for_fetches(&self, n: usize) {
        wait_until(&format!("{n} fetches"), Duration::from_secs(2), || {
            self.0.lock().unwrap().fetches.len() >= n
        });
    }
}

impl ChatTransport for MockTransport {
    fn fetch_history(&self, request: HistoryRequest) {
        self.0.lock().unwrap().fetches.push(request);
    }

    fn send_seen(&self, thread_id: u64, message_id: u64) {
        self.0.lock().unwrap().seen.push((thread_id, message_id));
    }

    fn pin_message(&self, message_id: u64, _notify_all: bool) {
        self.0.lock().unwrap().pins.push((message_id, true));
    }

    fn unpin_message(&self, message_id: u64) {
        self.0.lock().unwrap().pins.push((message_id, false));
    }

    fn delete_messages(&self, thread_id: u64, message_ids: Vec<u64>, for_all: bool) {
        self.0
            .lock()
            .unwrap()
            .deletes
            .push((thread_id, message_ids, for_all));
    }

    fn send_message(&self, message: Message) {
        self.0.lock().unwrap().sent.push(message);
    }
}

pub struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl TestReconciler {
    pub fn new() -> (Self, Arc<Mutex<Vec<AppUpdate>>>) {
        let updates = Arc::new(Mutex::new(vec![]));
        (
            Self {
                updates: updates.clone(),
            },
            updates,
        )
    }
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
