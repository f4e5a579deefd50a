use std::sync::Arc;
use tokio::select;
use tokio::sync::{Mutex, Notify};
use tokio::time::Duration;
use tracing::info;

use crate::processing::{Pipeline, RunReport};
use crate::publisher::Publisher;
use crate::storage::SubscriberRegistry;

/// Drives the pipeline on a fixed interval.
///
/// Scheduled ticks and manual "refresh now" runs go through [`Worker::run_once`],
/// which holds a lock for the whole tick, so at most one run is ever in flight.
pub struct Worker {
    pipeline: Pipeline,
    publisher: Arc<dyn Publisher>,
    registry: Arc<dyn SubscriberRegistry>,
    guard: Mutex<()>,
    initial_delay: Duration,
    interval: Duration,
}

impl Worker {
    pub fn new(
        pipeline: Pipeline,
        publisher: Arc<dyn Publisher>,
        registry: Arc<dyn SubscriberRegistry>,
        initial_delay: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            publisher,
            registry,
            guard: Mutex::new(()),
            initial_delay,
            interval,
        }
    }

    /// One tick; waits for any run already in progress to finish first.
    pub async fn run_once(&self) -> RunReport {
        let _running = self.guard.lock().await;
        info!("worker: processing feed");
        self.pipeline
            .run(self.publisher.as_ref(), self.registry.as_ref())
            .await
    }

    /// Loop until `shutdown` is notified. A tick in progress always completes.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(
            "worker: first run in {:?}, then every {:?}",
            self.initial_delay, self.interval
        );

        let mut wait = self.initial_delay;
        loop {
            select! {
                _ = tokio::time::sleep(wait) => {},
                _ = shutdown.notified() => {
                    info!("worker: shutdown requested, exiting loop");
                    break;
                }
            }

            self.run_once().await;
            wait = self.interval;
        }

        info!("worker: stopped");
    }
}
