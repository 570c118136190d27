mod actions;
mod core;
mod error;
mod logging;
mod state;
mod transport;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use flume::{Receiver, Sender};

pub use actions::ChatAction;
pub use error::SyncError;
pub use state::*;
pub use transport::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Handle returned by `FfiApp::listen_for_updates`. Dropping it does not stop
/// delivery; call `cancel()`.
#[derive(uniffi::Object, Debug)]
pub struct UpdateSubscription {
    active: Arc<AtomicBool>,
}

#[uniffi::export]
impl UpdateSubscription {
    pub fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

// How often a listener re-checks for cancellation while idle.
const LISTENER_POLL: Duration = Duration::from_millis(50);

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: Arc<AtomicBool>,
    shared_state: Arc<RwLock<AppState>>,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(
        data_dir: String,
        current_user_id: u64,
        transport: Box<dyn ChatTransport>,
    ) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, current_user_id, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let transport: Arc<dyn ChatTransport> = Arc::from(transport);

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        thread::spawn(move || {
            let mut core = match crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                current_user_id,
                transport,
                shared_for_core,
            ) {
                Ok(core) => core,
                Err(e) => {
                    tracing::error!(err = %e, "core failed to start");
                    return;
                }
            };
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: Arc::new(AtomicBool::new(false)),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: ChatAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    /// Streams updates to `reconciler` until the returned subscription is
    /// cancelled. Only one listener is active at a time; a second call while
    /// one is running returns an already-cancelled subscription.
    pub fn listen_for_updates(
        &self,
        reconciler: Box<dyn AppReconciler>,
    ) -> Arc<UpdateSubscription> {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return Arc::new(UpdateSubscription {
                active: Arc::new(AtomicBool::new(false)),
            });
        }

        let active = Arc::new(AtomicBool::new(true));
        let active_for_listener = active.clone();
        let listening = self.listening.clone();
        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while active_for_listener.load(Ordering::SeqCst) {
                match rx.recv_timeout(LISTENER_POLL) {
                    Ok(update) => {
                        if !active_for_listener.load(Ordering::SeqCst) {
                            break;
                        }
                        reconciler.reconcile(update);
                    }
                    Err(flume::RecvTimeoutError::Timeout) => continue,
                    Err(flume::RecvTimeoutError::Disconnected) => break,
                }
            }
            listening.store(false, Ordering::SeqCst);
        });

        Arc::new(UpdateSubscription { active })
    }

    pub fn on_history_response(&self, response: HistoryResponse) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::HistoryResponse(response),
        )));
    }

    pub fn on_history_failure(&self, unique_id: String, error: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::HistoryFailure { unique_id, error },
        )));
    }

    pub fn on_server_event(&self, event: ServerEvent) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::ServerEvent(event),
        )));
    }
}
