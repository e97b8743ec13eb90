//! The external deployment control plane.
//!
//! Deployments are started by POSTing a trigger event; the response carries
//! the correlation context that groups every stage of one rollout.

mod client;
mod types;

pub use client::{ControlPlane, ControlPlaneError, Endpoint, HttpControlPlane};
pub use types::{ConfigurationChange, CreateEventResponse, EventData, TriggerEvent, event_type};
