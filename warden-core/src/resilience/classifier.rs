use crate::error::ServiceError;

/// Decides whether a failed call counts against the circuit breaker.
///
/// Errors that do not count are still returned to the caller unchanged;
/// they simply leave the breaker's statistics untouched.
pub trait ErrorClassifier: Send + Sync + 'static {
    fn is_failure(&self, error: &ServiceError) -> bool;
}

/// Counts only infrastructure faults (unavailable and internal).
///
/// Bad input, unknown records, duplicates, rejected credentials and
/// admission-control rejections say nothing about the health of the
/// service and are excluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn is_failure(&self, error: &ServiceError) -> bool {
        !error.kind().is_client_fault()
    }
}

impl<F> ErrorClassifier for F
where
    F: Fn(&ServiceError) -> bool + Send + Sync + 'static,
{
    fn is_failure(&self, error: &ServiceError) -> bool {
        self(error)
    }
}
