use super::client::ProbeError;

/// A URL read from the input, tagged with its position in the submission sequence.
///
/// The position is what ties a completion back to its output slot, so two identical
/// URLs are still two distinct submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    seq: u64,
    url: String,
}

impl Submission {
    pub fn new(seq: u64, url: impl Into<String>) -> Self {
        Self {
            seq,
            url: url.into(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn into_url(self) -> String {
        self.url
    }
}

/// Status code returned by a probe that received a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusOutcome {
    code: u16,
}

impl StatusOutcome {
    pub fn new(code: u16) -> Self {
        Self { code }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.code)
    }
}

/// Result of probing one submission, carried from a worker to the reorder buffer.
#[derive(Debug)]
pub struct ProbeOutcome {
    submission: Submission,
    result: Result<StatusOutcome, ProbeError>,
}

impl ProbeOutcome {
    pub fn new(submission: Submission, result: Result<StatusOutcome, ProbeError>) -> Self {
        Self { submission, result }
    }

    pub fn succeeded(submission: Submission, code: u16) -> Self {
        Self::new(submission, Ok(StatusOutcome::new(code)))
    }

    pub fn failed(submission: Submission, error: ProbeError) -> Self {
        Self::new(submission, Err(error))
    }

    pub fn seq(&self) -> u64 {
        self.submission.seq()
    }

    pub fn url(&self) -> &str {
        self.submission.url()
    }

    pub fn submission(&self) -> &Submission {
        &self.submission
    }

    pub fn result(&self) -> &Result<StatusOutcome, ProbeError> {
        &self.result
    }

    /// Status code, or `None` when the probe failed before receiving a response.
    pub fn status(&self) -> Option<u16> {
        self.result.as_ref().ok().map(StatusOutcome::code)
    }

    pub fn is_failure(&self) -> bool {
        self.result.is_err()
    }
}
