//! Background worker: progress queue, cancellation and matcher hand-back.

use em_registration::{
    spawn_registration, spawn_registration_with, CancelToken, CorrelationEngine, IoError, Metric,
    Rect, RegistrationConfig, RegistrationError, RegistrationJob, RunStatus, SliceError,
};

use super::test_utils::{
    file_names, write_drifting_stack, CancelFlag, CancellingMatcher, CenterMatcher,
};

#[tokio::test]
async fn test_worker_reports_every_slice() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let drifts = [(0, 0), (1, 1), (2, 0), (2, -2)];
    let slices = write_drifting_stack(input.path(), 48, 48, &drifts);

    let job = RegistrationJob {
        config: RegistrationConfig::new(output.path(), Rect::new(16, 16, 12, 12))
            .with_max_shift(4, 4),
        slices,
        matcher: CorrelationEngine::open(Metric::Zncc).unwrap(),
    };

    // Capacity 1 forces the worker to wait for the consumer
    let mut handle = spawn_registration(job, 1);
    let mut events = Vec::new();
    while let Some(event) = handle.next_progress().await {
        events.push(event);
    }

    let (outcome, engine) = handle.finish().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(events.len(), 4);
    assert_eq!(
        events.iter().map(|e| e.slice).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(
        events.iter().map(|e| (e.shift_x, e.shift_y)).collect::<Vec<_>>(),
        drifts.to_vec()
    );

    let stats = engine.close();
    assert_eq!(stats.matches, 3);
}

#[tokio::test]
async fn test_cancel_token_stops_worker() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 32, 32, &[(0, 0); 8]);

    let token = CancelToken::new();
    let job = RegistrationJob {
        config: RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8)),
        slices,
        matcher: CancellingMatcher::new(3, CancelFlag::Token(token.clone())),
    };

    let handle = spawn_registration_with(job, 16, token.clone());
    assert!(!handle.cancel_token().is_cancelled());

    let (outcome, matcher) = handle.finish().await.unwrap();
    assert!(token.is_cancelled());
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.processed(), 4);
    assert_eq!(matcher.calls(), 3);
    assert_eq!(file_names(output.path()).len(), 4);
}

#[tokio::test]
async fn test_cancelled_before_start_writes_nothing() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 32, 32, &[(0, 0); 3]);

    let token = CancelToken::new();
    token.cancel();
    let job = RegistrationJob {
        config: RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8)),
        slices,
        matcher: CenterMatcher::default(),
    };

    let (outcome, _) = spawn_registration_with(job, 4, token).finish().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.processed(), 0);
    assert!(file_names(output.path()).is_empty());
}

#[tokio::test]
async fn test_join_returns_matcher_after_abort() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut slices = write_drifting_stack(input.path(), 32, 32, &[(0, 0); 2]);
    slices.push(input.path().join("missing.tif"));

    let job = RegistrationJob {
        config: RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8)),
        slices,
        matcher: CenterMatcher::default(),
    };

    let (result, matcher) = spawn_registration(job, 4).join().await.unwrap();
    assert!(matches!(
        result,
        Err(RegistrationError::Slice {
            index: 3,
            source: SliceError::Io(IoError::Load { .. }),
            ..
        })
    ));
    assert_eq!(matcher.calls, 1);
    assert_eq!(file_names(output.path()).len(), 2);
}

#[tokio::test]
async fn test_finish_without_draining_progress() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let slices = write_drifting_stack(input.path(), 32, 32, &[(0, 0); 5]);

    let job = RegistrationJob {
        config: RegistrationConfig::new(output.path(), Rect::new(8, 8, 8, 8)),
        slices,
        matcher: CenterMatcher::default(),
    };

    // Nobody reads the queue; the worker must still run to completion
    let (outcome, _) = spawn_registration(job, 1).finish().await.unwrap();
    assert_eq!(outcome.processed(), 5);
}
