//! Control and observation scheduling
//!
//! Two independent timers drive the load points. Every control tick spawns
//! one `update()` task per load point and does not wait for it, so a slow
//! device never delays the next tick and ticks of one load point may overlap.
//! Observation ticks snapshot all load points concurrently and wait for them.

use crate::loadpoint::LoadPoint;
use crate::logging::StructuredLogger;
use crate::observer::{LoadPointSnapshot, Observer};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};

/// Drives a set of load points until shutdown
pub struct Runtime {
    loadpoints: Vec<Arc<LoadPoint>>,
    observer: Arc<Observer>,
    update_interval: Duration,
    observe_interval: Duration,
    logger: StructuredLogger,
}

impl Runtime {
    pub fn new(
        loadpoints: Vec<Arc<LoadPoint>>,
        observer: Arc<Observer>,
        update_interval: Duration,
        observe_interval: Duration,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            loadpoints,
            observer,
            update_interval,
            observe_interval,
            logger,
        }
    }

    pub fn loadpoints(&self) -> &[Arc<LoadPoint>] {
        &self.loadpoints
    }

    pub fn observer(&self) -> &Arc<Observer> {
        &self.observer
    }

    /// Spawn one control tick per load point; the handles may be dropped
    pub fn update_loadpoints(&self) -> Vec<JoinHandle<()>> {
        self.loadpoints
            .iter()
            .map(|lp| {
                let lp = lp.clone();
                tokio::spawn(async move { lp.update().await })
            })
            .collect()
    }

    /// Observe all load points concurrently and publish their snapshots
    pub async fn observe_loadpoints(&self) -> Vec<LoadPointSnapshot> {
        let mut set = JoinSet::new();
        for lp in &self.loadpoints {
            let lp = lp.clone();
            let observer = self.observer.clone();
            set.spawn(async move { observer.observe(&lp).await });
        }

        let mut snapshots = Vec::with_capacity(self.loadpoints.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => self.logger.error(&format!("Observation task failed: {}", e)),
            }
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    async fn control_loop(&self) {
        let mut ticker = interval(self.update_interval);
        loop {
            ticker.tick().await;
            self.logger.trace("control tick");
            self.update_loadpoints();
        }
    }

    async fn observe_loop(&self) {
        let mut ticker = interval(self.observe_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.observe_loadpoints().await;
        }
    }

    /// Tick until `shutdown` completes
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.logger.info(&format!(
            "Controlling {} load point(s), update every {:?}, observe every {:?}",
            self.loadpoints.len(),
            self.update_interval,
            self.observe_interval
        ));

        tokio::select! {
            _ = self.control_loop() => {}
            _ = self.observe_loop() => {}
            _ = shutdown => {
                self.logger.info("Shutdown signal received");
            }
        }
    }
}
