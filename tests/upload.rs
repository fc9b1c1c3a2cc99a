//! Chunked contact uploads against a mocked merge service

mod common;

use std::sync::Arc;
use std::time::Duration;

use davlink::config::{ContactLimits, Settings};
use davlink::contacts::{GroupMethod, LocalContactCache};
use davlink::mock_behaviour::MockBehaviour;
use davlink::upload::{ContactUploadCoordinator, UploadEvent, UploadState};
use davlink::DavError;

use common::{init_logs, MemoryContactStore, MockMergeService};

fn coordinator(n_contacts: i64, chunk_size: usize, service: Arc<MockMergeService>) -> ContactUploadCoordinator {
    let cache = Arc::new(LocalContactCache::new(
        Arc::new(MemoryContactStore::numbered(n_contacts)),
        ContactLimits::default(),
        GroupMethod::Structured,
    ));
    let settings = Settings { upload_chunk_size: chunk_size, ..Settings::default() };
    ContactUploadCoordinator::new("alice", cache, service, &settings)
}

fn ids(contacts: &[davlink::contacts::Contact]) -> Vec<i64> {
    contacts.iter().map(|c| c.id).collect()
}

#[tokio::test]
async fn a_failed_chunk_is_retried_alone() {
    init_logs();
    let behaviour = MockBehaviour { duplicate_check_behaviour: (1, 1), ..MockBehaviour::default() };
    let service = Arc::new(MockMergeService::new(behaviour));
    let coordinator = coordinator(6, 2, service.clone());
    let mut events = coordinator.take_events().unwrap();
    assert!(coordinator.take_events().is_none());

    let state = coordinator.upload_contacts(None).await.unwrap();
    assert_eq!(state, UploadState::AwaitingRetry);
    assert_eq!(coordinator.state(), UploadState::AwaitingRetry);
    assert!(matches!(events.try_recv().unwrap(), UploadEvent::RetryableFailure(DavError::Network(_))));
    assert_eq!(service.checked_chunks(), vec![vec![0, 1]]);
    assert_eq!(ids(&coordinator.pending_contacts()), vec![2, 3, 4, 5]);
    let batch = coordinator.batch_id();
    assert!(batch.is_some());

    let state = coordinator.retry_upload().await.unwrap();
    assert_eq!(state, UploadState::Success { has_duplicates: false });
    assert_eq!(events.try_recv().unwrap(), UploadEvent::Success);
    assert_eq!(service.checked_chunks(), vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    assert!(coordinator.pending_contacts().is_empty());
    assert_eq!(coordinator.batch_id(), None);

    // Nothing left to retry
    assert!(matches!(coordinator.retry_upload().await, Err(DavError::InvalidState(_))));
}

#[tokio::test]
async fn a_retry_that_fails_again_keeps_what_went_through() {
    init_logs();
    let behaviour = MockBehaviour { duplicate_check_behaviour: (1, 1), ..MockBehaviour::default() };
    let service = Arc::new(MockMergeService::new(behaviour));
    let coordinator = coordinator(7, 3, service.clone());

    assert_eq!(coordinator.upload_contacts(None).await.unwrap(), UploadState::AwaitingRetry);
    service.behaviour.lock().unwrap().duplicate_check_behaviour = (1, 1);
    assert_eq!(coordinator.retry_upload().await.unwrap(), UploadState::AwaitingRetry);
    assert_eq!(ids(&coordinator.pending_contacts()), vec![6]);

    assert_eq!(coordinator.retry_upload().await.unwrap(), UploadState::Success { has_duplicates: false });
    assert_eq!(service.checked_chunks(), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
}

#[tokio::test]
async fn too_many_contacts_cannot_be_retried() {
    init_logs();
    let behaviour = MockBehaviour::fail_now(1).failing_with(DavError::TooManyContacts);
    let service = Arc::new(MockMergeService::new(behaviour));
    let coordinator = coordinator(4, 2, service.clone());
    let mut events = coordinator.take_events().unwrap();

    let state = coordinator.upload_contacts(None).await.unwrap();
    assert_eq!(state, UploadState::LimitExceeded);
    assert_eq!(events.try_recv().unwrap(), UploadEvent::TooManyContacts);
    assert!(coordinator.pending_contacts().is_empty());
    assert!(matches!(coordinator.retry_upload().await, Err(DavError::InvalidState(_))));
}

#[tokio::test]
async fn duplicates_are_resolved_then_imported() {
    init_logs();
    let service = Arc::new(MockMergeService::new(MockBehaviour::new()).with_known(vec![1, 4]));
    let coordinator = coordinator(5, 2, service.clone());
    let mut events = coordinator.take_events().unwrap();

    let state = coordinator.upload_contacts(None).await.unwrap();
    assert_eq!(state, UploadState::Success { has_duplicates: true });
    match events.try_recv().unwrap() {
        UploadEvent::ShowDuplicates(duplicates) => {
            let ids: Vec<i64> = duplicates.iter().map(|d| d.contact_id).collect();
            assert_eq!(ids, vec![1, 4]);
        },
        other => panic!("Unexpected event {:?}", other),
    }
    assert_eq!(coordinator.duplicates().len(), 2);

    assert!(coordinator.pending_contacts().is_empty());

    // The user keeps contact 1 only
    let mut kept = davlink::contacts::Contact::new(1);
    kept.last_name = Some("0001".to_string());
    let identifiers = coordinator.import_contacts(&[kept]).await.unwrap();
    assert_eq!(identifiers, vec!["remote-1".to_string()]);
    assert_eq!(service.imported(), vec![1]);
    assert!(coordinator.duplicates().is_empty());
}

#[tokio::test]
async fn selected_groups_only() {
    init_logs();
    let service = Arc::new(MockMergeService::new(MockBehaviour::new()));
    let coordinator = coordinator(6, 10, service.clone());

    coordinator.upload_contacts(Some(&[1])).await.unwrap();
    assert_eq!(service.checked_chunks(), vec![vec![1, 3, 5]]);
}

#[tokio::test]
async fn cancellation_stops_before_the_next_chunk() {
    init_logs();
    let service = Arc::new(MockMergeService::new(MockBehaviour::new()).with_delay(Duration::from_millis(100)));
    let coordinator = coordinator(6, 2, service.clone());
    let mut events = coordinator.take_events().unwrap();

    let (state, _) = tokio::join!(
        coordinator.upload_contacts(None),
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            coordinator.cancel_upload();
        }
    );

    assert_eq!(state.unwrap(), UploadState::Cancelled);
    // The chunk in flight went through, the last one was never sent
    assert_eq!(service.checked_chunks(), vec![vec![0, 1], vec![2, 3]]);
    assert_eq!(events.try_recv().unwrap(), UploadEvent::Cancelled);
    assert!(events.try_recv().is_err());
    assert_eq!(coordinator.batch_id(), None);
}

#[tokio::test]
async fn one_upload_at_a_time() {
    init_logs();
    let service = Arc::new(MockMergeService::new(MockBehaviour::new()).with_delay(Duration::from_millis(20)));
    let coordinator = coordinator(2, 2, service);

    let (first, second) = tokio::join!(coordinator.upload_contacts(None), coordinator.upload_contacts(None));
    assert_eq!(first.unwrap(), UploadState::Success { has_duplicates: false });
    assert!(matches!(second, Err(DavError::InvalidState(_))));
}

#[tokio::test]
async fn skipping_is_terminal() {
    init_logs();
    let service = Arc::new(MockMergeService::new(MockBehaviour::new()));
    let coordinator = coordinator(3, 2, service.clone());
    let mut events = coordinator.take_events().unwrap();
    let state = coordinator.subscribe();

    coordinator.skip_upload();
    assert_eq!(*state.borrow(), UploadState::Skipped);
    assert!(state.borrow().is_terminal());
    assert_eq!(events.try_recv().unwrap(), UploadEvent::Skipped);
    assert!(service.checked_chunks().is_empty());
}

#[tokio::test]
async fn a_failed_import_resumes_where_it_stopped() {
    init_logs();
    let behaviour = MockBehaviour { import_behaviour: (1, 1), ..MockBehaviour::default() };
    let service = Arc::new(MockMergeService::new(behaviour).with_known(vec![0, 1]));
    let coordinator = coordinator(2, 1, service.clone());

    assert_eq!(coordinator.upload_contacts(None).await.unwrap(), UploadState::Success { has_duplicates: true });
    let kept: Vec<davlink::contacts::Contact> = (0..2).map(davlink::contacts::Contact::new).collect();

    // The first chunk goes through, the second one fails
    let err = coordinator.import_contacts(&kept).await.unwrap_err();
    assert!(matches!(err, DavError::Network(_)));
    assert_eq!(service.imported(), vec![0]);
    assert_eq!(coordinator.duplicates().len(), 2);

    // Contact 0 is not sent twice
    let identifiers = coordinator.import_contacts(&kept).await.unwrap();
    assert_eq!(service.imported(), vec![0, 1]);
    assert_eq!(identifiers, vec!["remote-0".to_string(), "remote-1".to_string()]);
    assert!(coordinator.duplicates().is_empty());
}
