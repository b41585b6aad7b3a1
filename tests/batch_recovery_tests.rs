//! Operator recovery flows: partial retry, full retry, and manual
//! intervention handling across the service stack.

mod common;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use catalog_batch::application::{JobKind, JobOutcome};
use catalog_batch::domain::batch::{BatchPhase, BatchStatus, PhaseStatus};
use catalog_batch::domain::error::BatchError;
use catalog_batch::domain::repositories::BatchStateRepository;
use common::Harness;

async fn today_state(harness: &Harness) -> catalog_batch::domain::batch::BatchState {
    harness
        .batch_state
        .get_batch_state_by_date(Utc::now().date_naive())
        .await
        .unwrap()
        .expect("batch exists")
}

#[tokio::test]
async fn partial_retry_repairs_a_failed_page() {
    let harness = Harness::new(3, 1).await;
    harness.catalog_client.fail_page(2, 1);
    let token = CancellationToken::new();

    harness
        .driver(JobKind::Registration)
        .run(&token)
        .await
        .unwrap();
    let state = today_state(&harness).await;
    assert_eq!(state.failed_pages, 1);

    // Operator resets pages [2,2]; the error row is gone.
    harness
        .partial_retry
        .reset_page_range(state.id, 2, 2, BatchPhase::Registration)
        .await
        .unwrap();
    assert!(harness
        .partial_retry
        .get_error_pages(state.id, BatchPhase::Registration)
        .await
        .unwrap()
        .is_empty());

    // Reprocess page 2 (the scripted failure was one-shot) and mark it
    // successful; nothing unresolved remains.
    harness.catalog.register_page(2).await.unwrap();
    harness
        .partial_retry
        .mark_pages_successful(state.id, &[2], BatchPhase::Registration)
        .await
        .unwrap();

    let unresolved = harness
        .batch_state
        .get_unresolved_errors(state.id)
        .await
        .unwrap();
    assert!(unresolved.is_empty());
    assert!(harness.items.keys().contains(&"item-2-0".to_string()));
}

#[tokio::test]
async fn reset_error_pages_only_clears_current_failures() {
    let harness = Harness::new(4, 1).await;
    harness.catalog_client.fail_page(2, 1);
    harness.catalog_client.fail_page(4, 1);
    let token = CancellationToken::new();

    harness
        .driver(JobKind::Registration)
        .run(&token)
        .await
        .unwrap();
    let state = today_state(&harness).await;
    assert_eq!(state.failed_pages, 2);

    let error_pages = harness
        .partial_retry
        .get_error_pages(state.id, BatchPhase::Registration)
        .await
        .unwrap();
    assert_eq!(error_pages, vec![2, 4]);

    harness
        .partial_retry
        .reset_error_pages(state.id, BatchPhase::Registration)
        .await
        .unwrap();

    let state = today_state(&harness).await;
    assert_eq!(state.failed_pages, 0);
    assert!(harness
        .partial_retry
        .get_error_pages(state.id, BatchPhase::Registration)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn full_retry_reset_reproduces_a_first_time_clean_run() {
    let harness = Harness::new(3, 2).await;
    harness.catalog_client.fail_page(2, 1);
    let token = CancellationToken::new();

    // A run with a failure leaves a partial batch behind.
    harness
        .driver(JobKind::Registration)
        .run(&token)
        .await
        .unwrap();
    let state = today_state(&harness).await;
    assert_eq!(state.failed_pages, 1);

    harness
        .partial_retry
        .reset_batch_for_full_retry(state.id)
        .await
        .unwrap();

    // The rerun sees a clean slate (the scripted failure is spent) and ends
    // in the same terminal state as a first-time clean run.
    let outcome = harness
        .driver(JobKind::Registration)
        .run(&token)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            processed_pages: 3,
            failed_pages: 0
        }
    );

    let state = today_state(&harness).await;
    assert_eq!(state.status, BatchStatus::Completed);
    assert_eq!(state.registration_phase, PhaseStatus::Completed);
    assert_eq!(state.processed_pages, 3);
    assert_eq!(state.failed_pages, 0);
    assert!(harness
        .batch_state
        .get_unresolved_errors(state.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn clearing_intervention_restores_a_fresh_retry_budget() {
    let harness = Harness::new(2, 1).await;
    harness.catalog_client.set_fail_all(true);
    let token = CancellationToken::new();

    // Exhaust the retry budget.
    for _ in 0..4 {
        harness
            .driver(JobKind::Registration)
            .run(&token)
            .await
            .unwrap();
        let state = today_state(&harness).await;
        harness
            .batches
            .set_delay(
                state.id,
                Utc::now() - chrono::Duration::seconds(1),
                state.retry_attempts,
            )
            .await
            .unwrap();
        // set_delay writes status=delayed, so re-apply the hard stop the
        // escalation produced.
        if state.manual_intervention_required {
            harness
                .batches
                .set_manual_intervention(state.id, true, None)
                .await
                .unwrap();
        }
    }

    let state = today_state(&harness).await;
    assert!(state.manual_intervention_required);

    harness.catalog_client.set_fail_all(false);
    let cleared_id = harness.triggers.reset_intervention(None).await.unwrap();
    assert_eq!(cleared_id, state.id);

    let state = today_state(&harness).await;
    assert!(!state.manual_intervention_required);
    assert_eq!(state.retry_attempts, 0);

    // The batch can run again, and succeeds.
    let outcome = harness
        .driver(JobKind::Registration)
        .run(&token)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        JobOutcome::Completed {
            processed_pages: 2,
            failed_pages: 0
        }
    );
}

#[tokio::test]
async fn trigger_registration_flips_the_batch_to_running() {
    let harness = Harness::new(2, 1).await;

    let outcome = harness.triggers.trigger_registration().await.unwrap();
    assert!(outcome.success);
    let batch_id = outcome.batch_id.unwrap();

    let state = harness
        .batch_state
        .get_batch_state(batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.status, BatchStatus::Running);
    assert_eq!(state.registration_phase, PhaseStatus::Running);
}

#[tokio::test]
async fn trigger_refuses_while_intervention_is_pending() {
    let harness = Harness::new(2, 1).await;

    let batch = harness
        .batch_state
        .get_or_create(Utc::now().date_naive())
        .await
        .unwrap();
    harness
        .scheduling
        .set_manual_intervention(batch.id, "operator hold")
        .await
        .unwrap();

    let outcome = harness.triggers.trigger_registration().await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("Manual intervention required"));

    let outcome = harness.triggers.trigger_image_download().await.unwrap();
    assert!(!outcome.success);
}

#[tokio::test]
async fn trigger_partial_retry_validates_input_and_requires_a_batch() {
    let harness = Harness::new(2, 1).await;

    // No batch exists for today yet.
    let outcome = harness.triggers.trigger_partial_retry(1, 2).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("No batch state found"));

    harness
        .batch_state
        .get_or_create(Utc::now().date_naive())
        .await
        .unwrap();

    let outcome = harness.triggers.trigger_partial_retry(5, 2).await.unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.page_count, 0);

    let outcome = harness.triggers.trigger_partial_retry(2, 5).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.page_count, 4);

    let state = today_state(&harness).await;
    assert_eq!(state.registration_phase, PhaseStatus::Running);
}

#[tokio::test]
async fn reset_intervention_reports_missing_batches_distinctly() {
    let harness = Harness::new(2, 1).await;

    // No batch for today and no explicit id.
    let err = harness.triggers.reset_intervention(None).await.unwrap_err();
    assert!(matches!(err, BatchError::BatchNotFoundForDate(_)));

    let err = harness
        .triggers
        .reset_intervention(Some(12345))
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::BatchNotFound(12345)));
}
