//! Staleness-bounded value cache for subscription backends
//!
//! The subscription callback writes, provider reads consume. Both meet only
//! inside the mutex-guarded cell, which is never held across an await.

use super::{CallContext, Provider, provider};
use crate::error::{HeliosError, Result};
use crate::logging::StructuredLogger;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Values older than this are reported stale
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(10);

/// Contents of a cache cell
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    /// Last well-formed value, kept after it went stale
    pub value: Option<T>,
    /// Parse failure of the most recent publish, if it was malformed
    pub last_error: Option<String>,
    /// Time of the last well-formed publish
    pub updated: Option<Instant>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            value: None,
            last_error: None,
            updated: None,
        }
    }
}

/// Last value received on a subscription topic
pub struct SubscriptionCache<T> {
    topic: String,
    window: Duration,
    cell: Mutex<Snapshot<T>>,
    logger: StructuredLogger,
}

impl<T> SubscriptionCache<T>
where
    T: FromStr + Clone + Send + 'static,
    T::Err: std::fmt::Display,
{
    pub fn new(topic: impl Into<String>, window: Duration, logger: StructuredLogger) -> Self {
        Self {
            topic: topic.into(),
            window,
            cell: Mutex::new(Snapshot::default()),
            logger,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Feed a received payload into the cell. Empty payloads are ignored.
    pub fn update(&self, payload: &str) {
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }

        let parsed = payload.parse::<T>();
        let mut cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        match parsed {
            Ok(value) => {
                cell.value = Some(value);
                cell.last_error = None;
                cell.updated = Some(Instant::now());
            }
            Err(e) => {
                let message = format!("invalid value '{}' on {}: {}", payload, self.topic, e);
                self.logger.warn(&message);
                cell.last_error = Some(message);
            }
        }
    }

    /// Current value if inside the staleness window
    pub fn read(&self) -> Result<T> {
        let cell = self.cell.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = cell
            .updated
            .is_some_and(|updated| updated.elapsed() < self.window);
        if !fresh {
            return Err(HeliosError::stale(format!("value outdated for {}", self.topic)));
        }
        if let Some(err) = &cell.last_error {
            return Err(HeliosError::parse(err.clone()));
        }
        cell.value
            .clone()
            .ok_or_else(|| HeliosError::stale(format!("no value for {}", self.topic)))
    }

    /// Cell contents regardless of age
    pub fn snapshot(&self) -> Snapshot<T> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Provider reading this cache
    pub fn provider(self: &Arc<Self>) -> Provider<T> {
        let cache = self.clone();
        provider(move |_ctx: CallContext| {
            let value = cache.read();
            async move { value }
        })
    }
}
