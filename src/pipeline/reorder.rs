use crate::probe::{ProbeOutcome, Submission};
use anyhow::{bail, Result};
use futures::stream::{self, Stream};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

/// Default number of submissions that may be read ahead of the oldest unwritten one.
pub const DEFAULT_REORDER_WINDOW: usize = 1_024;

struct ReorderState {
    /// Registered submissions not yet emitted; the front is the cursor.
    sequence: VecDeque<Submission>,
    /// Completions that arrived before their turn, keyed by submission position.
    held: HashMap<u64, ProbeOutcome>,
    submitted: u64,
    emitted: u64,
    input_closed: bool,
    quiescent: bool,
}

impl ReorderState {
    fn new() -> Self {
        Self {
            sequence: VecDeque::new(),
            held: HashMap::new(),
            submitted: 0,
            emitted: 0,
            input_closed: false,
            quiescent: false,
        }
    }

    fn outstanding(&self) -> usize {
        self.submitted.saturating_sub(self.emitted) as usize
    }

    fn emit_front(&mut self, outcome: ProbeOutcome, released: &mut Vec<ProbeOutcome>) {
        self.sequence.pop_front();
        self.emitted += 1;
        released.push(outcome);
    }

    fn release_held_chain(&mut self, released: &mut Vec<ProbeOutcome>) {
        while let Some(seq) = self.sequence.front().map(Submission::seq) {
            let Some(outcome) = self.held.remove(&seq) else {
                break;
            };
            self.emit_front(outcome, released);
        }
    }

    /// Flips the buffer to quiescent once end of input is known and every submission has been
    /// emitted. Returns `true` only for the call that performs the transition.
    fn settle(&mut self) -> bool {
        if self.quiescent || !self.input_closed || self.emitted != self.submitted {
            return false;
        }
        debug_assert!(self.sequence.is_empty() && self.held.is_empty());
        self.quiescent = true;
        true
    }
}

/// Outcomes released by a single completion, in submission order.
#[derive(Debug, Default)]
pub struct Released {
    pub outcomes: Vec<ProbeOutcome>,
    /// Set for exactly one call over the buffer's lifetime: the one whose emission drained the
    /// last outstanding submission after end of input.
    pub became_quiescent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderCounts {
    pub submitted: u64,
    pub emitted: u64,
    pub held: usize,
}

/// Reconciles out-of-order probe completions back into the order URLs were read.
///
/// Submissions are registered by the ingestor before they reach the workers, so a completion
/// always finds its slot. Counters, the held store and the end-of-input flag share one lock, which
/// makes the quiescence check part of the same transition as the emission that satisfies it.
pub struct ReorderBuffer {
    state: Mutex<ReorderState>,
    notify: Notify,
    window: usize,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_REORDER_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        assert!(window > 0, "reorder window must be greater than zero");
        Self {
            state: Mutex::new(ReorderState::new()),
            notify: Notify::new(),
            window,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Appends a URL to the submission sequence and returns its slot.
    ///
    /// Waits while `window` submissions are already outstanding. The oldest of them is always in
    /// the pool, so the wait ends as soon as it is emitted.
    pub async fn register(&self, url: impl Into<String>) -> Result<Submission> {
        let url = url.into();
        loop {
            let notified = self.notify.notified();
            let mut state = self.state.lock().await;
            if state.input_closed {
                bail!("cannot register {url:?} after end of input");
            }
            if state.outstanding() < self.window {
                let submission = Submission::new(state.submitted, url);
                state.submitted += 1;
                state.sequence.push_back(submission.clone());
                return Ok(submission);
            }
            drop(state);
            notified.await;
        }
    }

    /// Submission the buffer is currently waiting on, if any.
    pub async fn next_expected(&self) -> Option<Submission> {
        self.state.lock().await.sequence.front().cloned()
    }

    /// Accepts one completion and releases every outcome that is now in turn.
    pub async fn on_completion(&self, outcome: ProbeOutcome) -> Released {
        let mut state = self.state.lock().await;
        let seq = outcome.seq();

        if seq >= state.submitted || seq < state.emitted || state.held.contains_key(&seq) {
            tracing::error!(
                seq,
                url = outcome.url(),
                submitted = state.submitted,
                emitted = state.emitted,
                "completion does not match an outstanding submission; dropping"
            );
            return Released::default();
        }

        let mut released = Vec::new();
        let is_cursor = state.sequence.front().map(Submission::seq) == Some(seq);
        if is_cursor {
            state.emit_front(outcome, &mut released);
            state.release_held_chain(&mut released);
        } else {
            state.held.insert(seq, outcome);
        }
        let became_quiescent = state.settle();
        drop(state);

        if !released.is_empty() {
            self.notify.notify_waiters();
        }
        if became_quiescent {
            tracing::debug!(seq, "last outstanding submission emitted");
        }

        Released {
            outcomes: released,
            became_quiescent,
        }
    }

    /// Marks end of input. Returns `true` if this call made the buffer quiescent, which happens
    /// when every submission was already emitted (including the empty-input case).
    pub async fn close_input(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.input_closed {
            tracing::debug!("end of input already recorded");
            return false;
        }
        state.input_closed = true;
        let became_quiescent = state.settle();
        let submitted = state.submitted;
        drop(state);

        tracing::debug!(submitted, "end of input recorded");
        self.notify.notify_waiters();
        became_quiescent
    }

    pub async fn is_input_closed(&self) -> bool {
        self.state.lock().await.input_closed
    }

    pub async fn is_quiescent(&self) -> bool {
        self.state.lock().await.quiescent
    }

    pub async fn counts(&self) -> ReorderCounts {
        let state = self.state.lock().await;
        ReorderCounts {
            submitted: state.submitted,
            emitted: state.emitted,
            held: state.held.len(),
        }
    }

    /// Completions waiting for an earlier submission.
    pub async fn held(&self) -> usize {
        self.state.lock().await.held.len()
    }

    /// Submissions registered but not yet emitted.
    pub async fn outstanding(&self) -> usize {
        self.state.lock().await.outstanding()
    }

    /// Lazily yields outcomes in submission order.
    ///
    /// The stream ends once the buffer is quiescent and everything released has been handed out,
    /// or early if the completion channel closes first. Callers tell the two apart with
    /// [`ReorderBuffer::is_quiescent`].
    pub fn drain(
        self: Arc<Self>,
        completions: mpsc::Receiver<ProbeOutcome>,
    ) -> impl Stream<Item = ProbeOutcome> + Send + 'static {
        let drain = DrainState {
            buffer: self,
            completions,
            ready: VecDeque::new(),
            completions_closed: false,
            finished: false,
        };

        stream::unfold(drain, |mut drain| async move {
            loop {
                if let Some(outcome) = drain.ready.pop_front() {
                    return Some((outcome, drain));
                }
                if drain.finished {
                    return None;
                }

                let buffer = Arc::clone(&drain.buffer);
                let notified = buffer.notify.notified();
                if buffer.is_quiescent().await {
                    drain.finished = true;
                    continue;
                }
                if drain.completions_closed {
                    tracing::debug!("completion channel closed before all submissions emitted");
                    drain.finished = true;
                    continue;
                }
                #[cfg(test)]
                {
                    test_hooks::pause_in_gap().await;
                }

                tokio::select! {
                    biased;
                    received = drain.completions.recv() => match received {
                        Some(outcome) => {
                            let released = buffer.on_completion(outcome).await;
                            drain.ready.extend(released.outcomes);
                        }
                        None => drain.completions_closed = true,
                    },
                    _ = notified => {}
                }
            }
        })
    }
}

impl Default for ReorderBuffer {
    fn default() -> Self {
        Self::new()
    }
}

struct DrainState {
    buffer: Arc<ReorderBuffer>,
    completions: mpsc::Receiver<ProbeOutcome>,
    ready: VecDeque<ProbeOutcome>,
    completions_closed: bool,
    finished: bool,
}
