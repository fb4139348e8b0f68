//! Tests for error types

use prometheus_job_engine::core::{EngineError, JobId, JobStatus, OperationError};

#[test]
fn test_queue_full_display() {
    let err = EngineError::QueueFull { max: 100 };
    assert_eq!(err.to_string(), "queue full: 100 pending jobs");
    assert!(err.is_backpressure());
}

#[test]
fn test_invalid_transition_display() {
    let id = JobId::new();
    let err = EngineError::InvalidTransition {
        id,
        from: JobStatus::Completed,
        to: JobStatus::Processing,
    };
    let msg = err.to_string();
    assert!(msg.contains(&id.to_string()));
    assert!(msg.contains("completed -> processing"));
    assert!(!err.is_backpressure());
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: EngineError = io.into();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn test_operation_error_classification() {
    assert!(OperationError::Retriable("timeout".into()).is_retriable());
    assert!(!OperationError::NonRetriable("bad url".into()).is_retriable());
    let unexpected: OperationError = anyhow::anyhow!("boom").into();
    assert!(!unexpected.is_retriable());
    assert!(unexpected.to_string().contains("boom"));
}
