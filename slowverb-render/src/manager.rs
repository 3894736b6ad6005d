//! Codec engine lifecycle
//!
//! The engine is loaded lazily and at most once. Callers that ask for it while
//! a load is in flight wait on that same attempt instead of starting another.
//! A failed or cancelled attempt leaves the manager unloaded so a later call
//! can retry.

use crate::engine::{CodecEngine, EngineError};
use parking_lot::Mutex;
use tokio::sync::watch;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Capability check failed; never leaves this state
    Unavailable,
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Debug, Clone)]
enum Attempt {
    Succeeded,
    Failed(String),
    /// Leader was dropped before finishing
    Abandoned,
}

type AttemptRx = watch::Receiver<Option<Attempt>>;
type AttemptTx = watch::Sender<Option<Attempt>>;

struct Inner {
    state: ProcessorState,
    attempt: Option<AttemptRx>,
}

enum Role {
    Leader(AttemptTx),
    Follower(AttemptRx),
}

/// Owns a codec engine and serializes access to it
pub struct ProcessorManager<E> {
    engine: E,
    inner: Mutex<Inner>,
    exec_lock: tokio::sync::Mutex<()>,
}

impl<E: CodecEngine> ProcessorManager<E> {
    pub fn new(engine: E) -> Self {
        let state = if engine.is_supported() {
            ProcessorState::Unloaded
        } else {
            ProcessorState::Unavailable
        };

        Self {
            engine,
            inner: Mutex::new(Inner {
                state,
                attempt: None,
            }),
            exec_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.inner.lock().state
    }

    /// Whether the engine can run on this system
    pub fn is_available(&self) -> bool {
        self.state() != ProcessorState::Unavailable
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ProcessorState::Loaded
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Exclusive use of the engine for one job
    pub async fn session(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exec_lock.lock().await
    }

    /// Load the engine if needed; idempotent once loaded
    pub async fn load(&self) -> Result<(), EngineError> {
        loop {
            let role = {
                let mut inner = self.inner.lock();
                match inner.state {
                    ProcessorState::Unavailable => return Err(EngineError::Unsupported),
                    ProcessorState::Loaded => return Ok(()),
                    state => match (state, inner.attempt.clone()) {
                        (ProcessorState::Loading, Some(rx)) => Role::Follower(rx),
                        _ => {
                            let (tx, rx) = watch::channel(None);
                            inner.state = ProcessorState::Loading;
                            inner.attempt = Some(rx);
                            Role::Leader(tx)
                        }
                    },
                }
            };

            match role {
                Role::Leader(tx) => return self.lead(tx).await,
                Role::Follower(mut rx) => {
                    let outcome = match rx.wait_for(Option::is_some).await {
                        Ok(attempt) => attempt.clone(),
                        Err(_) => None,
                    };
                    match outcome {
                        Some(Attempt::Succeeded) => return Ok(()),
                        Some(Attempt::Failed(message)) => return Err(EngineError::Load(message)),
                        Some(Attempt::Abandoned) | None => {
                            tracing::debug!("codec engine load abandoned, retrying");
                        }
                    }
                }
            }
        }
    }

    async fn lead(&self, tx: AttemptTx) -> Result<(), EngineError> {
        let mut guard = LoadGuard {
            inner: &self.inner,
            tx: Some(tx),
        };

        tracing::info!("loading codec engine");
        let result = self.engine.load().await;

        match &result {
            Ok(()) => guard.finish(ProcessorState::Loaded, Attempt::Succeeded),
            Err(e) => {
                tracing::warn!(error = %e, "codec engine failed to load");
                let message = match e {
                    EngineError::Load(message) => message.clone(),
                    other => other.to_string(),
                };
                guard.finish(ProcessorState::Unloaded, Attempt::Failed(message));
            }
        }
        result
    }
}

/// Publishes the outcome of a load attempt, or `Abandoned` if dropped first
struct LoadGuard<'a> {
    inner: &'a Mutex<Inner>,
    tx: Option<AttemptTx>,
}

impl LoadGuard<'_> {
    fn finish(&mut self, state: ProcessorState, attempt: Attempt) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        {
            let mut inner = self.inner.lock();
            inner.state = state;
            inner.attempt = None;
        }
        tx.send_replace(Some(attempt));
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        self.finish(ProcessorState::Unloaded, Attempt::Abandoned);
    }
}
