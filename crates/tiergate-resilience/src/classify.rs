//! Mapping backend failures into the engine's error taxonomy.

use tiergate_core::EngineError;
use tiergate_store::StoreError;

/// Classify a backend failure so downstream policy (severity, retry,
/// fallback) keys off one taxonomy.
#[must_use]
pub fn classify(error: &StoreError) -> EngineError {
    match error {
        StoreError::Backend(message) => EngineError::store(message.clone()),
        StoreError::Network(message) => EngineError::network(message.clone()),
        StoreError::Timeout(ms) => EngineError::timeout(format!("store call timed out after {ms}ms")),
        StoreError::Validation(message) => EngineError::validation(message.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiergate_core::Severity;

    #[test]
    fn backend_failures_are_critical_and_retryable() {
        let err = classify(&StoreError::Backend("replica lag".into()));
        assert_eq!(err.class(), "store");
        assert_eq!(err.severity(), Severity::Critical);
        assert!(err.retryable());
    }

    #[test]
    fn validation_failures_are_low_and_not_retryable() {
        let err = classify(&StoreError::Validation("bad row".into()));
        assert_eq!(err.severity(), Severity::Low);
        assert!(!err.retryable());
    }

    #[test]
    fn timeouts_carry_the_deadline() {
        let err = classify(&StoreError::Timeout(250));
        assert_eq!(err.class(), "timeout");
        assert!(err.to_string().contains("250ms"));
    }
}
