//! # Grille Engine
//!
//! Offline-first engine for residence inspection controls:
//! - sqlite-backed offline queue holding unsynced inspection state
//! - remote control-service client (submission, resume, batch sync)
//! - synchronization orchestrator draining the queue in one batch
//! - control lifecycle coordinator tying start, fill-in and close together

pub mod control;
pub mod db;
pub mod error;
pub mod events;
pub mod remote;
pub mod sync;

pub use error::{Error, Result};
