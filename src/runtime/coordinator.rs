use anyhow::Error as AnyError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// How a run came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// End of input was reached and every submitted URL was written.
    Quiescent,
    /// Shutdown was requested from outside (Ctrl-C, closed output) before draining.
    Interrupted,
    /// A fatal pipeline error was captured.
    Failed,
}

/// Single owner of the run's cancellation broadcast.
///
/// The first of [`Coordinator::quiesce`], [`Coordinator::interrupt`] or [`Coordinator::abort`]
/// decides how the run ends and cancels the shared token; every later call is ignored.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    triggered: AtomicBool,
    shutdown: CancellationToken,
    state: Mutex<CoordinatorState>,
}

#[derive(Default)]
struct CoordinatorState {
    termination: Option<Termination>,
    captured_error: Option<CapturedFatalError>,
}

#[derive(Clone)]
struct CapturedFatalError {
    inner: Arc<AnyError>,
}

impl CapturedFatalError {
    fn new(inner: AnyError) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

impl fmt::Debug for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedFatalError")
            .field(&self.inner)
            .finish()
    }
}

impl fmt::Display for CapturedFatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for CapturedFatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("termination", &self.termination())
            .field("cancelled", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

impl Coordinator {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                triggered: AtomicBool::new(false),
                shutdown,
                state: Mutex::new(CoordinatorState::default()),
            }),
        }
    }

    /// Token observed by the ingestor, workers and metrics reporter.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Records a clean finish and stops the worker pool. Returns `false` if the run had
    /// already been terminated.
    pub fn quiesce(&self) -> bool {
        if !self.claim(Termination::Quiescent) {
            return false;
        }

        tracing::debug!("all submitted urls emitted; stopping worker pool");
        self.inner.shutdown.cancel();
        true
    }

    /// Records an external stop request and cancels the run.
    pub fn interrupt(&self, reason: &str) -> bool {
        if !self.claim(Termination::Interrupted) {
            return false;
        }

        tracing::info!(reason, "url checks interrupted; shutting down");
        self.inner.shutdown.cancel();
        true
    }

    /// Captures a fatal pipeline error and cancels the run.
    pub fn abort(&self, context: &str, error: AnyError) -> AnyError {
        if !self.claim(Termination::Failed) {
            return error;
        }

        tracing::error!(
            context,
            error = %error,
            "fatal pipeline error; initiating shutdown"
        );

        let captured = CapturedFatalError::new(error);
        self.lock_state().captured_error = Some(captured.clone());
        self.inner.shutdown.cancel();

        captured.into()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.lock_state().termination
    }

    pub fn error(&self) -> Option<AnyError> {
        self.lock_state()
            .captured_error
            .as_ref()
            .map(|error| error.clone().into())
    }

    fn claim(&self, termination: Termination) -> bool {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            tracing::debug!(
                ?termination,
                previous = ?self.termination(),
                "run already terminated; ignoring"
            );
            return false;
        }

        self.lock_state().termination = Some(termination);
        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CoordinatorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
