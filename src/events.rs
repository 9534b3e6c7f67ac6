//! Fire-and-forget domain event fan-out.
//!
//! The engine hands events to an [`EventSink`] with a non-blocking enqueue;
//! a background writer task persists them to the `license_events` table.
//! Delivery is best-effort: events may be dropped on crash, and a failed
//! write never fails the request that produced the event.

use tokio::sync::mpsc;

use crate::db::{DbPool, queries};
use crate::models::NewLicenseEvent;

/// Handle the engine uses to publish domain events.
///
/// Cheaply cloneable. A disabled sink (no subscriber) silently drops events,
/// which keeps the engine callable from CLI commands and tests that do not
/// care about the audit trail.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<NewLicenseEvent>>,
}

impl EventSink {
    /// Create a sink and the receiving end for a writer (or a test observer).
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NewLicenseEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink with no subscriber; every event is dropped.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Enqueue an event. Never blocks and never fails the caller.
    pub fn emit(&self, event: NewLicenseEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).is_err()
        {
            tracing::debug!("Event sink subscriber is gone; dropping event");
        }
    }
}

/// Spawn the audit subscriber: drains the sink and appends rows to
/// `license_events`. Write failures are logged and swallowed.
pub fn spawn_event_writer(pool: DbPool, mut rx: mpsc::UnboundedReceiver<NewLicenseEvent>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match pool.get() {
                Ok(conn) => {
                    if let Err(e) = queries::insert_license_event(&conn, &event) {
                        tracing::warn!(
                            license_id = %event.license_id,
                            event_type = event.event_type.as_str(),
                            "Failed to write license event: {}",
                            e
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for event writer: {}", e);
                }
            }
        }
        tracing::debug!("Event writer stopped: sink closed");
    });
}
