//! Drives a [`SearchLifecycle`] on a single task.
//!
//! UI events and request completions are funnelled through one channel, so
//! transitions never race each other. Requests run on their own tasks and
//! report back tagged with the generation they were issued for; the
//! lifecycle drops completions that no longer match.

use std::sync::Arc;

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    lifecycle::{
        LifecycleEvent, LifecycleSnapshot, SearchLifecycle, SubmitTicket, NETWORK_FAILURE_MESSAGE,
    },
    search_client::SearchService,
};

#[derive(Debug, Error)]
#[error("search runtime has shut down")]
pub struct RuntimeClosed;

enum RuntimeMessage {
    Event {
        event: LifecycleEvent,
        ack: Option<oneshot::Sender<LifecycleSnapshot>>,
    },
    Shutdown,
}

/// Cloneable sender side for UI code.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<RuntimeMessage>,
    state: watch::Receiver<LifecycleSnapshot>,
}

impl RuntimeHandle {
    /// Queues an event without waiting for it to be applied.
    pub fn dispatch(&self, event: LifecycleEvent) -> Result<(), RuntimeClosed> {
        self.tx
            .send(RuntimeMessage::Event { event, ack: None })
            .map_err(|_| RuntimeClosed)
    }

    /// Queues an event and returns the snapshot right after it was applied.
    pub async fn send(&self, event: LifecycleEvent) -> Result<LifecycleSnapshot, RuntimeClosed> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(RuntimeMessage::Event {
                event,
                ack: Some(ack_tx),
            })
            .map_err(|_| RuntimeClosed)?;
        ack_rx.await.map_err(|_| RuntimeClosed)
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.state.clone()
    }

    /// Waits until the state is `Succeeded` or `Failed`.
    pub async fn wait_for_terminal(&self) -> Result<LifecycleSnapshot, RuntimeClosed> {
        let mut state = self.state.clone();
        let snapshot = state
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map_err(|_| RuntimeClosed)?;
        Ok(snapshot.clone())
    }
}

pub struct SearchRuntime {
    handle: RuntimeHandle,
    task: JoinHandle<SearchLifecycle>,
}

impl SearchRuntime {
    pub fn spawn(lifecycle: SearchLifecycle, service: Arc<dyn SearchService>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(lifecycle.snapshot());
        let task = tokio::spawn(run(lifecycle, service, tx.clone(), rx, state_tx));
        Self {
            handle: RuntimeHandle { tx, state: state_rx },
            task,
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    /// Stops the loop and hands back the lifecycle. Requests still running
    /// are left to finish; their completions go nowhere.
    pub async fn shutdown(self) -> Result<SearchLifecycle, RuntimeClosed> {
        let _ = self.handle.tx.send(RuntimeMessage::Shutdown);
        self.task.await.map_err(|_| RuntimeClosed)
    }
}

async fn run(
    mut lifecycle: SearchLifecycle,
    service: Arc<dyn SearchService>,
    tx: mpsc::UnboundedSender<RuntimeMessage>,
    mut rx: mpsc::UnboundedReceiver<RuntimeMessage>,
    state_tx: watch::Sender<LifecycleSnapshot>,
) -> SearchLifecycle {
    while let Some(message) = rx.recv().await {
        let (event, ack) = match message {
            RuntimeMessage::Event { event, ack } => (event, ack),
            RuntimeMessage::Shutdown => break,
        };

        if let Some(ticket) = lifecycle.apply(event) {
            spawn_request(ticket, Arc::clone(&service), tx.clone());
        }

        let snapshot = lifecycle.snapshot();
        state_tx.send_replace(snapshot.clone());
        if let Some(ack) = ack {
            let _ = ack.send(snapshot);
        }
    }
    debug!("runtime: event loop stopped");
    lifecycle
}

fn spawn_request(
    ticket: SubmitTicket,
    service: Arc<dyn SearchService>,
    tx: mpsc::UnboundedSender<RuntimeMessage>,
) {
    let SubmitTicket { generation, upload } = ticket;
    debug!(generation = generation.0, "runtime: issuing search request");
    tokio::spawn(async move {
        let event = match service.search(upload).await {
            Ok(outcome) => LifecycleEvent::RequestResolved {
                generation,
                outcome,
            },
            Err(err) => {
                warn!(generation = generation.0, "runtime: search failed: {err}");
                LifecycleEvent::RequestFailed {
                    generation,
                    reason: NETWORK_FAILURE_MESSAGE.to_string(),
                }
            }
        };
        if tx
            .send(RuntimeMessage::Event { event, ack: None })
            .is_err()
        {
            debug!(
                generation = generation.0,
                "runtime: completion dropped after shutdown"
            );
        }
    });
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
