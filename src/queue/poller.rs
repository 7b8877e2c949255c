//! Background poll loop driving the submission queue

use super::submission::{Broadcaster, SubmissionQueue, SubmissionState};
use crate::registry::Registry;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub struct QueuePoller<B: Broadcaster> {
    queue: Arc<Mutex<SubmissionQueue>>,
    registry: Arc<Registry>,
    broadcaster: Arc<B>,
}

impl<B: Broadcaster + 'static> QueuePoller<B> {
    pub fn new(
        queue: Arc<Mutex<SubmissionQueue>>,
        registry: Arc<Registry>,
        broadcaster: Arc<B>,
    ) -> Self {
        Self {
            queue,
            registry,
            broadcaster,
        }
    }

    /// Run a single pass over the queue
    pub async fn poll_once(&self) {
        let snapshot = self.registry.snapshot();
        let mut queue = self.queue.lock().await;
        queue.tick(&snapshot, self.broadcaster.as_ref(), Utc::now());

        for done in queue.take_finished() {
            match (done.state, &done.last_error) {
                (SubmissionState::Failed, Some(err)) => {
                    log::warn!("Entry {} ({}) failed: {}", done.id, done.operation.kind(), err)
                }
                (state, _) => log::info!("Entry {} ({}) {}", done.id, done.operation.kind(), state),
            }
        }
    }

    /// Poll until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.queue.lock().await.config().poll_interval;
        let mut interval = tokio::time::interval(period);
        log::info!("Submission queue poller started ({}ms interval)", period.as_millis());

        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Submission queue poller stopped");
    }
}
