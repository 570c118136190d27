mod config;
mod correlator;
mod events;
mod fetcher;
mod scenario;
mod scroll;
mod seen;
mod session;
mod store;
mod thread;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use flume::Sender;

use crate::actions::ChatAction;
use crate::error::SyncError;
use crate::state::{AppState, ThreadInfo};
use crate::transport::{ChatTransport, HistoryResponse, Message, ServerEvent};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent, TimerKind};

use fetcher::Direction;
use session::SessionContext;
use thread::{SyncEffect, ThreadSync};

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    session: SessionContext,

    // The open thread, if any. `thread_generation` bumps on every open so
    // timers scheduled for an earlier session are dropped.
    thread: Option<ThreadSync>,
    thread_generation: u64,

    // Last-seen pointer the server is known to hold, per thread. Decides
    // whether a higher server unread count is current or stale.
    server_seen: HashMap<u64, u64>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        current_user_id: u64,
        transport: Arc<dyn ChatTransport>,
        shared_state: Arc<RwLock<AppState>>,
    ) -> Result<Self, SyncError> {
        let config = config::load_app_config(&data_dir);
        tracing::info!(
            page_size = config.page_size(),
            seen_debounce_ms = config.seen_debounce().as_millis() as u64,
            "config loaded"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()?;

        let session = SessionContext::new(current_user_id, transport);
        let mut state = AppState::empty();
        state.connected = session.connected;

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            session,
            thread: None,
            thread_generation: 0,
            server_seen: HashMap::new(),
        };

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        Ok(this)
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    // Side-effect updates still bump rev so hosts can detect gaps.
    fn emit_side_effect(&mut self, build: impl FnOnce(u64) -> AppUpdate) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(build(rev));
    }

    /// Rebuilds the open thread's view, reports changed entries, then emits
    /// the snapshot.
    fn emit_current_thread(&mut self) {
        let Some(thread) = self.thread.as_mut() else {
            self.state.current_thread = None;
            self.emit_state();
            return;
        };
        let thread_id = thread.id();
        let changed = thread.take_changed();
        self.state.current_thread = Some(thread.view());
        let summary = thread.thread.clone();
        self.upsert_summary(summary);

        if !changed.is_empty() {
            self.emit_side_effect(|rev| AppUpdate::MessagesChanged {
                rev,
                thread_id,
                unique_ids: changed,
            });
        }
        self.emit_state();
    }

    fn upsert_summary(&mut self, info: ThreadInfo) {
        match self.state.thread_list.iter_mut().find(|t| t.id == info.id) {
            Some(existing) => *existing = info,
            None => self.state.thread_list.push(info),
        }
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => self.handle_action(action),
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: ChatAction) {
        tracing::info!(action = action.tag(), "dispatch");
        let result = match action {
            ChatAction::OpenThread { thread } => {
                self.open_thread(thread);
                Ok(())
            }
            ChatAction::CloseThread => {
                self.close_thread();
                Ok(())
            }
            ChatAction::UpsertThreadSummaries { threads } => {
                self.upsert_thread_summaries(threads);
                Ok(())
            }
            ChatAction::MessageAppeared { unique_id } => {
                self.with_thread(|t| t.on_message_appear(&unique_id))
            }
            ChatAction::MessageDisappeared { unique_id } => self.with_thread(|t| {
                t.on_message_disappear(&unique_id);
                false
            }),
            ChatAction::ScrollDirectionChanged { direction } => self.with_thread(|t| {
                t.set_scroll_direction(direction);
                false
            }),
            ChatAction::LoadMoreTop => self.with_thread(|t| t.load_more(Direction::Top)),
            ChatAction::LoadMoreBottom => self.with_thread(|t| t.load_more(Direction::Bottom)),
            ChatAction::MoveToTime {
                time,
                message_id,
                highlight,
            } => self.with_thread(|t| {
                t.move_to_time(time, message_id, highlight);
                true
            }),
            ChatAction::DeleteMessages {
                message_ids,
                for_all,
            } => self.delete_messages(message_ids, for_all),
            ChatAction::TogglePinMessage {
                message_id,
                notify_all,
            } => self.toggle_pin(message_id, notify_all),
            ChatAction::SendMessage {
                unique_id,
                text,
                metadata,
            } => self.send_message(unique_id, text, metadata),
            ChatAction::UploadProgress {
                unique_id,
                progress,
            } => self.with_thread(|t| t.upload_progress(&unique_id, progress)),
            ChatAction::ConnectionChanged { connected } => {
                self.connection_changed(connected);
                Ok(())
            }
        };
        if let Err(e) = result {
            tracing::warn!(err = %e, "action ignored");
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::HistoryResponse(response) => self.on_history_response(response),
            InternalEvent::HistoryFailure { unique_id, error } => {
                let err = SyncError::Transport(error);
                let message = err.to_string();
                if let Err(e) = self.with_thread(|t| t.on_failure(&unique_id, &message)) {
                    tracing::debug!(unique_id = %unique_id, err = %e, "failure without open thread");
                }
            }
            InternalEvent::ServerEvent(event) => self.on_server_event(event),
            InternalEvent::TimerFired {
                generation,
                timer,
                token,
            } => {
                if generation != self.thread_generation {
                    return;
                }
                let _ = self.with_thread(|t| t.on_timer(timer, token));
            }
        }
    }

    /// Runs `f` against the open thread, carries out the effects it queued and
    /// publishes the result.
    fn with_thread(&mut self, f: impl FnOnce(&mut ThreadSync) -> bool) -> Result<(), SyncError> {
        let thread = self.thread.as_mut().ok_or(SyncError::NoOpenThread)?;
        let changed = f(thread);
        let effects = thread.take_effects();
        let visible_change = changed
            || effects
                .iter()
                .any(|e| matches!(e, SyncEffect::Fetch(_) | SyncEffect::ScrollTo { .. }));
        // Snapshot first so scroll targets exist in the state hosts hold.
        if visible_change {
            self.emit_current_thread();
        }
        self.run_effects(effects);
        Ok(())
    }

    fn run_effects(&mut self, effects: Vec<SyncEffect>) {
        let Some(thread_id) = self.thread.as_ref().map(ThreadSync::id) else {
            return;
        };
        for effect in effects {
            match effect {
                SyncEffect::Fetch(request) => self.session.fetch_history(request),
                SyncEffect::SendSeen {
                    thread_id,
                    message_id,
                } => self.session.send_seen(thread_id, message_id),
                SyncEffect::ScrollTo {
                    unique_id,
                    position,
                    animated,
                } => self.emit_side_effect(|rev| AppUpdate::ScrollTo {
                    rev,
                    thread_id,
                    unique_id,
                    position,
                    animated,
                }),
                SyncEffect::Schedule {
                    timer,
                    token,
                    after,
                } => self.schedule_timer(timer, token, after),
                SyncEffect::JumpTargetMissing { message_id } => {
                    self.emit_side_effect(|rev| AppUpdate::JumpTargetMissing {
                        rev,
                        thread_id,
                        message_id,
                    })
                }
            }
        }
    }

    fn schedule_timer(&self, timer: TimerKind, token: u64, after: Duration) {
        let tx = self.core_sender.clone();
        let generation = self.thread_generation;
        self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::TimerFired {
                generation,
                timer,
                token,
            })));
        });
    }

    fn record_server_seen(&mut self, thread_id: u64, last_seen: u64) -> u64 {
        let known = self.server_seen.entry(thread_id).or_default();
        *known = (*known).max(last_seen);
        *known
    }

    fn open_thread(&mut self, mut thread: ThreadInfo) {
        let server_seen = self.record_server_seen(thread.id, thread.last_seen_message_id);
        if let Some(known) = self.state.thread_list.iter().find(|t| t.id == thread.id) {
            let mut merged = known.clone();
            merged.merge_from_server(&thread);
            thread = merged;
        }
        tracing::info!(
            thread_id = thread.id,
            last_message_id = ?thread.last_message_id,
            last_seen_message_id = thread.last_seen_message_id,
            unread = thread.unread_count,
            "open_thread"
        );
        self.thread_generation = self.thread_generation.wrapping_add(1);
        let mut sync = ThreadSync::new(thread, self.session.current_user_id, &self.config);
        sync.server_seen = server_seen;
        self.thread = Some(sync);
        let _ = self.with_thread(|t| t.bootstrap().is_some());
    }

    fn close_thread(&mut self) {
        // Local seen progress is already in the summary; the server must not
        // miss it because the debounce outlived the thread.
        let _ = self.with_thread(|t| {
            t.flush_seen();
            false
        });
        let Some(thread) = self.thread.take() else {
            return;
        };
        tracing::info!(thread_id = thread.id(), "close_thread");
        self.record_server_seen(thread.id(), thread.server_seen);
        self.upsert_summary(thread.thread);
        self.state.current_thread = None;
        self.emit_state();
    }

    fn upsert_thread_summaries(&mut self, threads: Vec<ThreadInfo>) {
        for incoming in threads {
            let server_seen = self.record_server_seen(incoming.id, incoming.last_seen_message_id);
            if let Some(open) = self.thread.as_mut().filter(|t| t.id() == incoming.id) {
                open.merge_summary(&incoming, server_seen);
            }
            match self.state.thread_list.iter_mut().find(|t| t.id == incoming.id) {
                Some(existing) => existing.merge_from_server(&incoming),
                None => self.state.thread_list.push(incoming),
            }
        }
        if self.thread.is_some() {
            self.emit_current_thread();
        } else {
            self.emit_state();
        }
    }

    fn on_history_response(&mut self, response: HistoryResponse) {
        let subject_id = response.subject_id;
        if let Err(e) = self.with_thread(|t| t.on_response(response)) {
            tracing::debug!(subject_id, err = %e, "history response dropped");
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        let subject_id = event.subject_id();
        if self.thread.as_ref().is_some_and(|t| t.id() == subject_id) {
            let _ = self.with_thread(|t| t.apply_event(event));
            return;
        }
        let current_user_id = self.session.current_user_id;
        let server_seen = self.server_seen.get(&subject_id).copied().unwrap_or(0);
        let Some(summary) = self.state.thread_list.iter_mut().find(|t| t.id == subject_id) else {
            tracing::debug!(thread_id = subject_id, event = event.tag(), "event for unknown thread");
            return;
        };
        if events::apply_to_thread_info(summary, &event, current_user_id, server_seen) {
            self.emit_state();
        }
    }

    fn delete_messages(&mut self, message_ids: Vec<u64>, for_all: bool) -> Result<(), SyncError> {
        let thread = self.thread.as_ref().ok_or(SyncError::NoOpenThread)?;
        if message_ids.is_empty() {
            return Ok(());
        }
        // Local removal waits for the server's Deleted events.
        self.session
            .delete_messages(thread.id(), message_ids, for_all);
        Ok(())
    }

    fn toggle_pin(&mut self, message_id: u64, notify_all: bool) -> Result<(), SyncError> {
        let thread = self.thread.as_ref().ok_or(SyncError::NoOpenThread)?;
        let entry = thread
            .store
            .get_by_id(message_id)
            .ok_or(SyncError::UnknownMessage(message_id))?;
        let pinned =
            entry.message.pinned || thread.thread.pinned_message_id == Some(message_id);
        self.session.set_pinned(message_id, !pinned, notify_all);
        Ok(())
    }

    fn send_message(
        &mut self,
        unique_id: String,
        text: String,
        metadata: Option<String>,
    ) -> Result<(), SyncError> {
        let thread = self.thread.as_ref().ok_or(SyncError::NoOpenThread)?;
        let upload = metadata.as_deref().is_some_and(is_file_payload);
        let message = Message {
            id: None,
            unique_id,
            thread_id: thread.id(),
            time: None,
            owner_id: self.session.current_user_id,
            text,
            seen: false,
            delivered: false,
            pinned: false,
            edited: false,
            metadata,
        };
        let outgoing = message.clone();
        self.with_thread(|t| {
            t.insert_local(message, upload);
            true
        })?;
        self.session.send_message(outgoing);
        Ok(())
    }

    fn connection_changed(&mut self, connected: bool) {
        let was_connected = self.session.connected;
        self.session.connected = connected;
        self.state.connected = connected;
        tracing::info!(connected, "connection changed");
        if connected && !was_connected && self.thread.is_some() {
            let _ = self.with_thread(|t| {
                t.on_connection_restored();
                true
            });
        } else {
            self.emit_state();
        }
    }
}

/// File sends carry a JSON object with a `file` key in their metadata.
fn is_file_payload(metadata: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(metadata)
        .ok()
        .is_some_and(|v| v.get("file").is_some())
}
