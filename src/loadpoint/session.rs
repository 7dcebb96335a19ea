//! Charging session tracking for a load point
//!
//! A session spans one connect+enabled period. The tracker is plain data; the
//! owning load point keeps it behind its state lock, so starting or ending a
//! session is a check-and-set.

use crate::logging::StructuredLogger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Charging session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSession {
    /// Unique session ID
    pub id: String,

    /// Start time of the session
    pub start_time: DateTime<Utc>,

    /// End time of the session (if completed)
    pub end_time: Option<DateTime<Utc>>,

    /// Cumulative charge meter reading at start (kWh), when the meter reports energy
    pub start_energy_kwh: Option<f64>,

    /// Energy delivered so far, from the latest meter reading
    pub energy_delivered_kwh: f64,

    /// Session status
    pub status: SessionStatus,
}

/// Session status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Session is currently active
    Active,

    /// Session completed
    Completed,
}

impl ChargingSession {
    fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            end_time: None,
            start_energy_kwh: None,
            energy_delivered_kwh: 0.0,
            status: SessionStatus::Active,
        }
    }

    /// Elapsed time of an active session, or total time of a completed one
    pub fn duration(&self) -> Duration {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).to_std().unwrap_or_default()
    }
}

/// Active and last completed session of one load point
#[derive(Debug)]
pub struct SessionTracker {
    current: Option<ChargingSession>,
    last: Option<ChargingSession>,
    logger: StructuredLogger,
}

impl SessionTracker {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            current: None,
            last: None,
            logger,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&ChargingSession> {
        self.current.as_ref()
    }

    pub fn last(&self) -> Option<&ChargingSession> {
        self.last.as_ref()
    }

    /// Start a session unless one is active; returns the new session's id
    pub fn start(&mut self) -> Option<String> {
        if self.current.is_some() {
            return None;
        }
        let session = ChargingSession::new();
        let id = session.id.clone();
        self.logger.info(&format!("Started charging session {}", session.id));
        self.current = Some(session);
        Some(id)
    }

    /// Record the starting meter reading of session `id` if it is still active
    pub fn set_baseline(&mut self, id: &str, total_energy_kwh: f64) -> bool {
        match self.current.as_mut() {
            Some(session) if session.id == id && session.start_energy_kwh.is_none() => {
                session.start_energy_kwh = Some(total_energy_kwh);
                true
            }
            _ => false,
        }
    }

    /// Update delivered energy of the active session from a meter reading.
    ///
    /// A session whose starting reading was missed takes this reading as its
    /// baseline.
    pub fn record_energy(&mut self, total_energy_kwh: f64) -> Option<f64> {
        let session = self.current.as_mut()?;
        let start = *session.start_energy_kwh.get_or_insert(total_energy_kwh);
        session.energy_delivered_kwh = (total_energy_kwh - start).max(0.0);
        Some(session.energy_delivered_kwh)
    }

    /// End the active session, if any, and keep it as the last one
    pub fn end(&mut self) -> Option<&ChargingSession> {
        let mut session = self.current.take()?;
        session.end_time = Some(Utc::now());
        session.status = SessionStatus::Completed;
        self.logger.info(&format!(
            "Ended charging session {}, delivered {:.3} kWh",
            session.id, session.energy_delivered_kwh
        ));
        self.last = Some(session);
        self.last.as_ref()
    }

    /// Energy of the active session, or of the last completed one when idle
    pub fn charged_energy(&self) -> f64 {
        self.current
            .as_ref()
            .or(self.last.as_ref())
            .map(|s| s.energy_delivered_kwh)
            .unwrap_or(0.0)
    }

    /// Duration of the active session, or of the last completed one when idle
    pub fn charge_duration(&self) -> Duration {
        self.current
            .as_ref()
            .or(self.last.as_ref())
            .map(ChargingSession::duration)
            .unwrap_or_default()
    }
}
