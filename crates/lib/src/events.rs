//! Human-readable events attached to resources.
//!
//! Events are the only place content and policy outcomes (skipped manifests,
//! tags that would not be overwritten, missing prerequisites) become visible
//! outside the logs.

use std::fmt;
use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use crate::resource::ObjectKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
  Normal,
  Warning,
}

impl fmt::Display for EventType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventType::Normal => f.write_str("Normal"),
      EventType::Warning => f.write_str("Warning"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
  pub target: ObjectKey,
  pub event_type: EventType,
  pub reason: String,
  pub message: String,
}

pub trait EventRecorder: Send + Sync {
  fn record(&self, event: Event);

  fn normal(&self, target: &ObjectKey, reason: &str, message: String) {
    self.record(Event {
      target: target.clone(),
      event_type: EventType::Normal,
      reason: reason.to_string(),
      message,
    });
  }

  fn warning(&self, target: &ObjectKey, reason: &str, message: String) {
    self.record(Event {
      target: target.clone(),
      event_type: EventType::Warning,
      reason: reason.to_string(),
      message,
    });
  }
}

/// Emits events as log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
  fn record(&self, event: Event) {
    match event.event_type {
      EventType::Normal => info!(target_object = %event.target, reason = %event.reason, "{}", event.message),
      EventType::Warning => warn!(target_object = %event.target, reason = %event.reason, "{}", event.message),
    }
  }
}

/// Keeps events in memory and also logs them.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
  events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<Event> {
    self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
  }

  /// Remove and return everything recorded so far.
  pub fn drain(&self) -> Vec<Event> {
    std::mem::take(&mut *self.events.lock().unwrap_or_else(|p| p.into_inner()))
  }

  pub fn reasons(&self) -> Vec<String> {
    self.events().into_iter().map(|e| e.reason).collect()
  }
}

impl EventRecorder for MemoryRecorder {
  fn record(&self, event: Event) {
    LogRecorder.record(event.clone());
    self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
  }
}
