//! Engine event types
//!
//! Broadcast by the lifecycle coordinator so a presentation layer can
//! follow state and score changes without polling. Sends are
//! fire-and-forget; having no subscriber is not an error.

use serde::Serialize;

use crate::control::ControlState;

/// Events emitted by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Lifecycle state changed
    StateChanged {
        residence_id: String,
        state: ControlState,
    },

    /// The control was written to the offline queue
    ControlSecured { residence_id: String },

    /// A criterion mutation changed the overall aggregate
    ScoreUpdated {
        residence_id: String,
        percentage: Option<u8>,
    },
}
