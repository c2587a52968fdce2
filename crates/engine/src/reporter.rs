use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub source: String,
    pub message: String,
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}

#[derive(Default)]
struct ReporterState {
    encountered: AtomicBool,
    errors: Mutex<Vec<ReportedError>>,
}

/// Collects errors from every component of a run. The first error is the
/// signal for the scheduling loop to stop; later ones are kept for the
/// final report. Clones share the same state.
#[derive(Clone, Default)]
pub struct ErrorReporter {
    state: Arc<ReporterState>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn errors_guard(&self) -> MutexGuard<'_, Vec<ReportedError>> {
        self.state
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an error. Returns `true` if it is the first one.
    pub fn report(&self, source: impl Into<String>, message: impl Into<String>) -> bool {
        let reported = ReportedError {
            source: source.into(),
            message: message.into(),
        };
        error!("{reported}");

        let mut errors = self.errors_guard();
        let first = errors.is_empty();
        errors.push(reported);
        self.state.encountered.store(true, Ordering::Release);
        first
    }

    pub fn report_engine_error(&self, err: &EngineError) -> bool {
        self.report(err.component(), err.to_string())
    }

    pub fn error_encountered(&self) -> bool {
        self.state.encountered.load(Ordering::Acquire)
    }

    pub fn first_error(&self) -> Option<ReportedError> {
        self.errors_guard().first().cloned()
    }

    pub fn errors(&self) -> Vec<ReportedError> {
        self.errors_guard().clone()
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("error_encountered", &self.error_encountered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_is_kept_and_later_ones_appended() {
        let reporter = ErrorReporter::new();
        assert!(!reporter.error_encountered());
        assert!(reporter.report("runner", "first"));

        let clone = reporter.clone();
        assert!(!clone.report("metrics", "second"));

        assert!(reporter.error_encountered());
        assert_eq!(
            reporter.first_error().map(|e| e.to_string()),
            Some("runner: first".to_string())
        );
        assert_eq!(reporter.errors().len(), 2);
    }

    #[test]
    fn test_concurrent_reports_record_exactly_one_first() {
        let reporter = ErrorReporter::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reporter = reporter.clone();
                std::thread::spawn(move || reporter.report("worker", format!("error {i}")))
            })
            .collect();
        let firsts = handles
            .into_iter()
            .map(|h| h.join().expect("reporter thread panicked"))
            .filter(|first| *first)
            .count();
        assert_eq!(firsts, 1);
        assert_eq!(reporter.errors().len(), 8);
    }
}
