//! Lifecycle semantics: start/stop idempotency, timeout validation,
//! cancellation vs. error distinction.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use common::{init_logging, wait_for_status, FakeDriver, Product};
use tablewatch_core::runtime::DependencyStatus;
use tablewatch_core::{
    SqlServerDialect, TableDependency, TableDependencyOptions, TableWatchError,
};

async fn make_dependency(
    driver: &Arc<FakeDriver>,
    options: TableDependencyOptions,
) -> TableDependency<Product> {
    TableDependency::<Product>::new(
        Arc::clone(driver) as Arc<dyn tablewatch_core::SqlDriver>,
        Arc::new(SqlServerDialect::new()),
        "Server=fake;Database=test",
        options,
    )
    .await
    .expect("construction should succeed against the fake catalog")
}

#[tokio::test]
async fn test_stop_without_start_is_a_noop() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let state = Arc::clone(&driver.state);

    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;
    dependency.stop().await;
    dependency.stop().await;
    dependency.dispose().await;

    // Nothing was provisioned, so nothing may be executed or dropped.
    assert!(state.executed().is_empty());
}

#[tokio::test]
async fn test_start_validates_timeout_relationship() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;
    dependency.on_changed(|_| {});

    let err = dependency.start_with(30, 180).await.unwrap_err();
    assert!(matches!(err, TableWatchError::InvalidTimeout(_)));

    let err = dependency.start_with(120, 150).await.unwrap_err();
    assert!(matches!(err, TableWatchError::InvalidTimeout(_)));

    // The boundary case is allowed.
    dependency.start_with(60, 120).await.unwrap();
    dependency.stop().await;
}

#[tokio::test]
async fn test_start_without_subscriber_fails() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;

    let err = dependency.start().await.unwrap_err();
    assert!(matches!(err, TableWatchError::NoSubscriber));
}

#[tokio::test]
async fn test_reentrant_start_is_a_noop() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let state = Arc::clone(&driver.state);
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;
    dependency.on_changed(|_| {});

    dependency.start_with(60, 120).await.unwrap();
    dependency.start_with(60, 120).await.unwrap();

    assert_eq!(state.executed_count_containing("CREATE QUEUE"), 1);
    dependency.stop().await;
}

#[tokio::test]
async fn test_cancellation_reports_no_error() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let state = Arc::clone(&driver.state);
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;

    let errors = Arc::new(AtomicUsize::new(0));
    let statuses: Arc<Mutex<Vec<DependencyStatus>>> = Arc::new(Mutex::new(Vec::new()));

    dependency.on_changed(|_| {});
    let e = Arc::clone(&errors);
    dependency.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });
    let s = Arc::clone(&statuses);
    dependency.on_status_changed(move |status| s.lock().push(status));

    dependency.start_with(60, 120).await.unwrap();
    wait_for_status(|| dependency.status(), DependencyStatus::WaitingForNotification).await;

    dependency.stop().await;

    assert_eq!(dependency.status(), DependencyStatus::StopDueToCancellation);
    assert_eq!(errors.load(Ordering::SeqCst), 0);
    assert_eq!(
        *statuses.lock(),
        vec![
            DependencyStatus::Started,
            DependencyStatus::WaitingForNotification,
            DependencyStatus::StopDueToCancellation,
        ]
    );

    // Teardown ran and is scoped to this instance's token.
    let token = dependency.naming_token().to_string();
    assert!(state.executed_count_containing("DROP QUEUE") >= 1);
    assert!(state
        .executed()
        .iter()
        .filter(|s| s.contains("DROP QUEUE"))
        .all(|s| s.contains(&token)));
}

#[tokio::test]
async fn test_transport_fault_reports_exactly_one_error() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let state = Arc::clone(&driver.state);
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;

    let errors = Arc::new(AtomicUsize::new(0));
    dependency.on_changed(|_| {});
    let e = Arc::clone(&errors);
    dependency.on_error(move |_| {
        e.fetch_add(1, Ordering::SeqCst);
    });

    dependency.start_with(60, 120).await.unwrap();
    wait_for_status(|| dependency.status(), DependencyStatus::WaitingForNotification).await;

    state.inject_dequeue_fault("connection reset by peer");
    wait_for_status(|| dependency.status(), DependencyStatus::StopDueToError).await;
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Teardown happens on the subsequent stop, not on the fault itself.
    assert_eq!(state.executed_count_containing("DROP QUEUE"), 0);
    dependency.stop().await;
    assert_eq!(state.executed_count_containing("DROP QUEUE"), 1);
}

#[tokio::test]
async fn test_start_after_error_recovers() {
    init_logging();
    let driver = Arc::new(FakeDriver::new());
    let state = Arc::clone(&driver.state);
    let dependency = make_dependency(&driver, TableDependencyOptions::default()).await;
    dependency.on_changed(|_| {});

    dependency.start_with(60, 120).await.unwrap();
    wait_for_status(|| dependency.status(), DependencyStatus::WaitingForNotification).await;
    state.inject_dequeue_fault("simulated outage");
    wait_for_status(|| dependency.status(), DependencyStatus::StopDueToError).await;

    // The caller's retry policy: observe the error status and start again.
    dependency.start_with(60, 120).await.unwrap();
    wait_for_status(|| dependency.status(), DependencyStatus::WaitingForNotification).await;
    assert_eq!(state.executed_count_containing("CREATE QUEUE"), 2);

    dependency.stop().await;
}
