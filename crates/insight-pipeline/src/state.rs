use std::fmt;

/// Lifecycle of one insight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Requested,
    CacheHit,
    CacheMiss,
    Prompting,
    Inferring,
    Validating,
    Accepted,
    Rejected,
    Retry,
    Exhausted,
    Fallback,
    Completed,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Requested => "REQUESTED",
            RequestState::CacheHit => "CACHE_HIT",
            RequestState::CacheMiss => "CACHE_MISS",
            RequestState::Prompting => "PROMPTING",
            RequestState::Inferring => "INFERRING",
            RequestState::Validating => "VALIDATING",
            RequestState::Accepted => "ACCEPTED",
            RequestState::Rejected => "REJECTED",
            RequestState::Retry => "RETRY",
            RequestState::Exhausted => "EXHAUSTED",
            RequestState::Fallback => "FALLBACK",
            RequestState::Completed => "COMPLETED",
        }
    }

    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Requested, CacheHit)
                | (Requested, CacheMiss)
                | (CacheHit, Completed)
                | (CacheMiss, Prompting)
                | (Prompting, Inferring)
                | (Prompting, Fallback) // budget denied
                | (Inferring, Validating)
                | (Inferring, Fallback) // provider error
                | (Validating, Accepted)
                | (Validating, Rejected)
                | (Accepted, Completed)
                | (Rejected, Retry)
                | (Rejected, Exhausted)
                | (Retry, Inferring)
                | (Retry, Fallback) // budget denied
                | (Exhausted, Fallback)
                | (Fallback, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed)
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: RequestState,
    pub to: RequestState,
}

/// Records the path a request takes through [`RequestState`].
#[derive(Debug, Clone)]
pub struct RequestTrace {
    key: String,
    current: RequestState,
    history: Vec<RequestState>,
}

impl RequestTrace {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            current: RequestState::Requested,
            history: vec![RequestState::Requested],
        }
    }

    pub fn current(&self) -> RequestState {
        self.current
    }

    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    /// Move to `next`. An illegal move leaves the trace unchanged.
    pub fn advance(&mut self, next: RequestState) -> Result<(), IllegalTransition> {
        if !self.current.can_transition_to(next) {
            tracing::warn!(
                "[{}] illegal request transition {} -> {}",
                self.key,
                self.current,
                next
            );
            return Err(IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        tracing::debug!("[{}] {} -> {}", self.key, self.current, next);
        self.current = next;
        self.history.push(next);
        Ok(())
    }

    /// Count of `Retry` states visited.
    pub fn retries(&self) -> usize {
        self.history.iter().filter(|s| **s == RequestState::Retry).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::RequestState::*;

    #[test]
    fn test_happy_path() {
        let mut trace = RequestTrace::new("k");
        for next in [CacheMiss, Prompting, Inferring, Validating, Accepted, Completed] {
            trace.advance(next).unwrap();
        }
        assert!(trace.current().is_terminal());
        assert_eq!(trace.history().len(), 7);
    }

    #[test]
    fn test_retry_then_fallback() {
        let mut trace = RequestTrace::new("k");
        for next in [
            CacheMiss, Prompting, Inferring, Validating, Rejected, Retry, Inferring, Validating, Rejected,
            Exhausted, Fallback, Completed,
        ] {
            trace.advance(next).unwrap();
        }
        assert_eq!(trace.retries(), 1);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut trace = RequestTrace::new("k");
        let err = trace.advance(Validating).unwrap_err();
        assert_eq!(err, IllegalTransition { from: Requested, to: Validating });
        assert_eq!(trace.current(), Requested);

        trace.advance(CacheHit).unwrap();
        assert!(trace.advance(Fallback).is_err());
        assert!(trace.advance(Completed).is_ok());
        assert!(trace.advance(Requested).is_err());
    }
}
