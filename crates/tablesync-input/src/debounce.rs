//! Debounced input bridge.
//!
//! The local value follows every keystroke at once; the upstream value only
//! moves when typing has been idle for a full window. Each bridge runs a
//! small actor task holding the state machine:
//!
//! ```text
//!   idle ──typed(v)──▶ pending(v, now + window)
//!   pending ──typed(v')──▶ pending(v', now + window)
//!   pending ──deadline──▶ idle   (commit v if new and still the live input)
//!   any ──external(u)──▶ idle    (u replaces the local value, no commit)
//!   any ──clear──▶ idle          (commit "" immediately)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Receives settled values. Called on the bridge's own task.
pub type CommitFn = Arc<dyn Fn(String) + Send + Sync>;

enum InputEvent {
    Typed(String),
    External(String),
    Clear,
}

struct Pending {
    value: String,
    deadline: Instant,
}

/// A text input whose committed value lags behind the typed value.
pub struct DebouncedInput {
    events: mpsc::UnboundedSender<InputEvent>,
    local: Arc<watch::Sender<String>>,
    handle: JoinHandle<()>,
}

impl DebouncedInput {
    /// Start a bridge showing `initial`, which is also taken as the last
    /// value sent upstream.
    pub fn spawn(initial: impl Into<String>, window: Duration, commit: CommitFn) -> Self {
        let initial = initial.into();
        let (local, _) = watch::channel(initial.clone());
        let local = Arc::new(local);
        let (events, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(run_bridge(rx, local.clone(), initial, window, commit));

        Self {
            events,
            local,
            handle,
        }
    }

    /// A keystroke: the shown value changes now, the commit timer restarts.
    pub fn input(&self, value: impl Into<String>) {
        let value = value.into();
        self.local.send_replace(value.clone());
        let _ = self.events.send(InputEvent::Typed(value));
    }

    /// The upstream value changed on its own (back button, reset, link).
    ///
    /// If it differs from what this bridge last sent, the shown value is
    /// replaced and any pending commit is dropped. Never commits.
    pub fn sync_external(&self, upstream: impl Into<String>) {
        let _ = self.events.send(InputEvent::External(upstream.into()));
    }

    /// Empty the input and commit the empty value without waiting.
    pub fn clear(&self) {
        self.local.send_replace(String::new());
        let _ = self.events.send(InputEvent::Clear);
    }

    /// The value currently shown in the input.
    pub fn value(&self) -> String {
        self.local.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<String> {
        self.local.subscribe()
    }
}

impl Drop for DebouncedInput {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_bridge(
    mut events: mpsc::UnboundedReceiver<InputEvent>,
    local: Arc<watch::Sender<String>>,
    mut last_sent: String,
    window: Duration,
    commit: CommitFn,
) {
    let mut pending: Option<Pending> = None;

    loop {
        let deadline = pending.as_ref().map(|p| p.deadline);

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("input bridge closed");
                    break;
                };
                match event {
                    InputEvent::Typed(value) => {
                        pending = Some(Pending {
                            value,
                            deadline: Instant::now() + window,
                        });
                    }
                    InputEvent::External(upstream) => {
                        if upstream != last_sent {
                            debug!(value = %upstream, "input resynced from upstream");
                            local.send_replace(upstream.clone());
                            pending = None;
                        }
                        last_sent = upstream;
                    }
                    InputEvent::Clear => {
                        pending = None;
                        last_sent = String::new();
                        commit(String::new());
                    }
                }
            }
            _ = wait_until(deadline) => {
                let Some(settled) = pending.take() else { continue };
                let is_new = settled.value != last_sent;
                let is_live = *local.borrow() == settled.value;
                if is_new && is_live {
                    debug!(value = %settled.value, "input committed");
                    last_sent = settled.value.clone();
                    commit(settled.value);
                }
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
