//! Per-backend capacity gate
//!
//! A counting semaphore that bounds how many tracked calls run against one
//! backend at a time. Waiters are granted slots in arrival order. A slot is
//! held by a [`GatePermit`] and released when the permit drops, on every exit
//! path.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("gate '{0}' is closed")]
    Closed(String),
}

/// Admission gate for one backend.
#[derive(Debug, Clone)]
pub struct CapacityGate {
    name: Arc<str>,
    capacity: usize,
    semaphore: Arc<Semaphore>,
}

impl CapacityGate {
    /// Create a gate with `capacity` slots. Zero is raised to one.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let gate = Self {
            name: Arc::from(name.into()),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        };
        gate.report();
        gate
    }

    /// Wait for a free slot.
    ///
    /// Only the calling task waits. Dropping the future gives up the place in
    /// line without taking a slot.
    pub async fn acquire(&self) -> Result<GatePermit, GateError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed(self.name.to_string()))?;
        Ok(self.granted(permit))
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.granted(permit))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn granted(&self, permit: OwnedSemaphorePermit) -> GatePermit {
        tracing::trace!(gate = %self.name, available = self.available(), "Gate slot granted");
        self.report();
        GatePermit {
            gate: self.clone(),
            permit: Some(permit),
        }
    }

    fn report(&self) {
        metrics::gauge!("turnstile_gate_available", "backend" => self.name.to_string())
            .set(self.available() as f64);
    }
}

/// One held gate slot.
#[derive(Debug)]
pub struct GatePermit {
    gate: CapacityGate,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        tracing::trace!(gate = %self.gate.name, "Gate slot released");
        self.gate.report();
    }
}
