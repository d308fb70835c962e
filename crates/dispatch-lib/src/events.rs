//! Outbound state-change events.
//!
//! The coordinator hands events to an [`EventNotifier`], which queues them on
//! a bounded channel and publishes them to an [`EventSink`] from a worker
//! thread. Publishing never blocks the caller: a full queue drops the event
//! with a warning, and sink failures are logged. Neither rolls back state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EventConfig;
use crate::error::Result;
use crate::geo::GeoPoint;
use crate::model::{Incident, IncidentId, IncidentStatus, VehicleId, VehicleStatus};

pub const VEHICLE_STATUS_CHANGED: &str = "vehicle.status-changed";
pub const VEHICLE_POSITION_CHANGED: &str = "vehicle.position-changed";
pub const INCIDENT_CREATED: &str = "incident.created";
pub const INCIDENT_DISPATCHED: &str = "incident.dispatched";
pub const INCIDENT_STATUS_CHANGED: &str = "incident.status-changed";

/// A state change worth telling the outside world about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchEvent {
    VehicleStatusChanged {
        vehicle_id: VehicleId,
        from: VehicleStatus,
        to: VehicleStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        incident_id: Option<IncidentId>,
    },
    VehiclePositionChanged {
        vehicle_id: VehicleId,
        position: GeoPoint,
    },
    IncidentCreated {
        incident: Incident,
    },
    IncidentDispatched {
        incident_id: IncidentId,
        vehicle_id: VehicleId,
        distance_meters: f64,
        eta_seconds: f64,
    },
    IncidentStatusChanged {
        incident_id: IncidentId,
        from: IncidentStatus,
        to: IncidentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        released_vehicle: Option<VehicleId>,
    },
}

impl DispatchEvent {
    /// Name the event is published under.
    pub fn name(&self) -> &'static str {
        match self {
            DispatchEvent::VehicleStatusChanged { .. } => VEHICLE_STATUS_CHANGED,
            DispatchEvent::VehiclePositionChanged { .. } => VEHICLE_POSITION_CHANGED,
            DispatchEvent::IncidentCreated { .. } => INCIDENT_CREATED,
            DispatchEvent::IncidentDispatched { .. } => INCIDENT_DISPATCHED,
            DispatchEvent::IncidentStatusChanged { .. } => INCIDENT_STATUS_CHANGED,
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> std::result::Result<Value, EventError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Failure to hand an event to the bus.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event bus rejected {name}: {message}")]
    Rejected { name: String, message: String },

    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination of published events (a message bus, a websocket fan-out).
pub trait EventSink: Send + Sync {
    fn publish(&self, name: &str, payload: &Value) -> std::result::Result<(), EventError>;
}

/// Sink that writes every event to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, name: &str, payload: &Value) -> std::result::Result<(), EventError> {
        info!(target: "dispatch::events", event = name, %payload, "event published");
        Ok(())
    }
}

/// A published event as recorded by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub name: String,
    pub payload: Value,
}

/// Sink that keeps events in memory, for tests and tooling.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<PublishedEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }
}

impl EventSink for MemorySink {
    fn publish(&self, name: &str, payload: &Value) -> std::result::Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(PublishedEvent {
                name: name.to_string(),
                payload: payload.clone(),
            });
        Ok(())
    }
}

/// Bounded, non-blocking event publisher.
pub struct EventNotifier {
    sender: Mutex<Option<SyncSender<DispatchEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl EventNotifier {
    /// Start the worker thread draining into `sink`.
    pub fn new(sink: Arc<dyn EventSink>, config: &EventConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel(config.queue_capacity.max(1));
        let worker = thread::Builder::new()
            .name("dispatch-events".to_string())
            .spawn(move || Self::worker_loop(sink, receiver))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        })
    }

    /// Notifier that logs events through [`TracingSink`].
    pub fn tracing(config: &EventConfig) -> Result<Self> {
        Self::new(Arc::new(TracingSink), config)
    }

    fn worker_loop(sink: Arc<dyn EventSink>, receiver: Receiver<DispatchEvent>) {
        // Ends once every sender is gone and the queue is drained.
        for event in receiver {
            let name = event.name();
            let outcome = event
                .payload()
                .and_then(|payload| sink.publish(name, &payload));
            if let Err(e) = outcome {
                warn!(event = name, error = %e, "failed to publish event");
            }
        }
        debug!("event worker stopped");
    }

    /// Queue an event. Never blocks.
    pub fn publish(&self, event: DispatchEvent) {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            warn!(event = event.name(), "event notifier is shut down, dropping event");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = event.name(), "event queue full, dropping event");
            }
            Err(TrySendError::Disconnected(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(event = event.name(), "event worker gone, dropping event");
            }
        }
    }

    /// Number of events dropped since start.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events, publish what is queued and join the worker.
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("event worker panicked");
            }
        }
    }
}

impl Drop for EventNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventNotifier")
            .field("dropped", &self.dropped())
            .finish()
    }
}
