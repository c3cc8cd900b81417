mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{post, FakeClassifier, FakeConnector, Harness, RecordingSink, RunSpec};
use leadhound_core::{Platform, RunStatus};
use leadhound_pipeline::RunDispatcher;

#[tokio::test]
async fn executes_in_background_and_rejects_duplicates() {
    let connector =
        FakeConnector::new(Platform::Reddit).with_results("crm for agencies", vec![post("t3_a")]);
    let Harness {
        store,
        orchestrator,
        sink,
        ..
    } = Harness::new(connector, FakeClassifier::default(), RecordingSink::default());
    let first = store.add_run(RunSpec::default());
    let second = store.add_run(RunSpec::default());
    let dispatcher = RunDispatcher::new(Arc::new(orchestrator), 1);

    assert!(dispatcher.dispatch(first));
    assert!(!dispatcher.dispatch(first));
    assert!(dispatcher.dispatch(second));

    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(store.run(first).status, RunStatus::Completed);
    assert_eq!(store.run(second).status, RunStatus::Completed);
    assert!(!dispatcher.is_in_flight(first));
    assert_eq!(sink.sent().len(), 2);
}

#[tokio::test]
async fn waits_for_a_free_slot_and_then_executes() {
    let connector =
        FakeConnector::new(Platform::Reddit).with_results("crm for agencies", vec![post("t3_a")]);
    let Harness {
        store,
        orchestrator,
        connector,
        ..
    } = Harness::new(connector, FakeClassifier::default(), RecordingSink::default());
    let run = store.add_run(RunSpec::default());
    store.set_at_capacity(true);
    let dispatcher = RunDispatcher::new(Arc::new(orchestrator), 1)
        .with_capacity_retry(Duration::from_millis(10));

    assert!(dispatcher.dispatch(run));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(dispatcher.is_in_flight(run));
    assert!(connector.calls().is_empty());
    assert_eq!(store.run(run).status, RunStatus::Queued);

    store.set_at_capacity(false);
    tokio::time::timeout(Duration::from_secs(5), async {
        while dispatcher.in_flight() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(store.run(run).status, RunStatus::Completed);
    assert_eq!(connector.calls().len(), 1);
}
