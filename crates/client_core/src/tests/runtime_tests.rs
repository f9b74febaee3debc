use std::collections::HashMap;

use async_trait::async_trait;
use shared::domain::{MatchItem, SearchOutcome};
use tokio::sync::{oneshot, Mutex};

use super::*;
use crate::{
    error::SearchError,
    lifecycle::{LifecycleState, NETWORK_FAILURE_MESSAGE},
    preview::MemoryPreviewStore,
    search_client::ImageUpload,
    selection::{CandidateFile, SelectionManager, SelectionPolicy},
};

type Reply = Result<SearchOutcome, SearchError>;

/// Holds every request until the test releases the reply for that file.
#[derive(Default)]
struct ScriptedSearch {
    calls: Mutex<Vec<ImageUpload>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<Reply>>>,
}

impl ScriptedSearch {
    async fn gate(&self, file_name: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.insert(file_name.to_string(), rx);
        tx
    }

    async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl SearchService for ScriptedSearch {
    async fn search(&self, upload: ImageUpload) -> Result<SearchOutcome, SearchError> {
        let gate = self.gates.lock().await.remove(&upload.file_name);
        self.calls.lock().await.push(upload);
        match gate {
            Some(gate) => gate.await.unwrap_or_else(|_| {
                Err(SearchError::Status {
                    status: 599,
                    detail: Some("gate dropped".to_string()),
                })
            }),
            None => Ok(SearchOutcome::default()),
        }
    }
}

fn spawn_runtime(service: Arc<ScriptedSearch>) -> (SearchRuntime, Arc<MemoryPreviewStore>) {
    let store = Arc::new(MemoryPreviewStore::new());
    let lifecycle =
        SearchLifecycle::new(SelectionManager::new(store.clone(), SelectionPolicy::default()));
    (SearchRuntime::spawn(lifecycle, service), store)
}

fn png(name: &str) -> CandidateFile {
    CandidateFile::new(name, Some("image/png".to_string()), name.as_bytes().to_vec())
}

fn outcome_titled(title: &str) -> SearchOutcome {
    SearchOutcome {
        matches: vec![MatchItem {
            title: Some(title.to_string()),
            image_ref: format!("https://img.example/{title}.jpg"),
            price: Some("$5".to_string()),
            source_link: None,
        }],
        latency: Some("0.10s".to_string()),
        status_messages: Vec::new(),
    }
}

#[tokio::test]
async fn rapid_double_submit_issues_one_request() {
    let service = Arc::new(ScriptedSearch::default());
    let gate = service.gate("a.png").await;
    let (runtime, _store) = spawn_runtime(service.clone());
    let handle = runtime.handle();

    handle
        .send(LifecycleEvent::PickerSelected(png("a.png")))
        .await
        .expect("select");
    handle
        .dispatch(LifecycleEvent::SubmitRequested)
        .expect("first submit");
    let after_second = handle
        .send(LifecycleEvent::SubmitRequested)
        .await
        .expect("second submit");
    assert_eq!(after_second.state, LifecycleState::InFlight);

    gate.send(Ok(outcome_titled("A"))).expect("release");
    let settled = handle.wait_for_terminal().await.expect("terminal");
    assert_eq!(settled.state, LifecycleState::Succeeded(outcome_titled("A")));
    assert_eq!(service.call_count().await, 1);

    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn superseded_response_never_overwrites_newer_chain() {
    let service = Arc::new(ScriptedSearch::default());
    let old_gate = service.gate("old.png").await;
    let new_gate = service.gate("new.png").await;
    let (runtime, _store) = spawn_runtime(service.clone());
    let handle = runtime.handle();

    handle
        .send(LifecycleEvent::PickerSelected(png("old.png")))
        .await
        .expect("select old");
    handle
        .send(LifecycleEvent::SubmitRequested)
        .await
        .expect("submit old");
    let reselected = handle
        .send(LifecycleEvent::PickerSelected(png("new.png")))
        .await
        .expect("select new");
    assert_eq!(reselected.state, LifecycleState::Ready);
    handle
        .send(LifecycleEvent::SubmitRequested)
        .await
        .expect("submit new");

    let mut updates = handle.subscribe();
    updates.borrow_and_update();
    old_gate
        .send(Ok(outcome_titled("stale")))
        .expect("release stale");
    updates.changed().await.expect("stale completion processed");
    assert_eq!(updates.borrow().state, LifecycleState::InFlight);

    new_gate
        .send(Ok(outcome_titled("fresh")))
        .expect("release fresh");
    let settled = handle.wait_for_terminal().await.expect("terminal");
    assert_eq!(
        settled.state,
        LifecycleState::Succeeded(outcome_titled("fresh"))
    );
    assert_eq!(service.call_count().await, 2);

    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn reset_while_in_flight_discards_late_resolution() {
    let service = Arc::new(ScriptedSearch::default());
    let gate = service.gate("a.png").await;
    let (runtime, store) = spawn_runtime(service.clone());
    let handle = runtime.handle();

    handle
        .send(LifecycleEvent::PickerSelected(png("a.png")))
        .await
        .expect("select");
    handle
        .send(LifecycleEvent::SubmitRequested)
        .await
        .expect("submit");
    let reset = handle
        .send(LifecycleEvent::ResetRequested)
        .await
        .expect("reset");
    assert_eq!(reset.state, LifecycleState::Idle);
    assert!(reset.preview.is_none());
    assert!(store.live().is_empty());

    let mut updates = handle.subscribe();
    updates.borrow_and_update();
    gate.send(Ok(outcome_titled("late"))).expect("release");
    updates.changed().await.expect("late completion processed");
    assert_eq!(updates.borrow().state, LifecycleState::Idle);

    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn service_error_maps_to_generic_failure() {
    let service = Arc::new(ScriptedSearch::default());
    let gate = service.gate("a.png").await;
    let (runtime, _store) = spawn_runtime(service.clone());
    let handle = runtime.handle();

    handle
        .send(LifecycleEvent::PickerSelected(png("a.png")))
        .await
        .expect("select");
    handle
        .send(LifecycleEvent::SubmitRequested)
        .await
        .expect("submit");
    gate.send(Err(SearchError::Status {
        status: 500,
        detail: Some("Internal Server Error".to_string()),
    }))
    .expect("release");

    let settled = handle.wait_for_terminal().await.expect("terminal");
    let failure = settled.state.failure().expect("failed");
    assert_eq!(failure.message(), NETWORK_FAILURE_MESSAGE);
    assert!(settled.preview.is_some(), "preview kept after failure");

    runtime.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn shutdown_returns_lifecycle_and_closes_handle() {
    let service = Arc::new(ScriptedSearch::default());
    let (runtime, store) = spawn_runtime(service);
    let handle = runtime.handle();

    handle
        .send(LifecycleEvent::PickerSelected(png("a.png")))
        .await
        .expect("select");

    let mut lifecycle = runtime.shutdown().await.expect("shutdown");
    assert_eq!(lifecycle.state(), &LifecycleState::Ready);
    lifecycle.reset();
    assert!(store.live().is_empty());

    assert!(handle.send(LifecycleEvent::DragEnter).await.is_err());
    assert!(handle.dispatch(LifecycleEvent::DragLeave).is_err());
}
