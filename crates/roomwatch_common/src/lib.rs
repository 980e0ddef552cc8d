//! RoomWatch Common - Shared types for the room hazard monitor
//!
//! Holds the sensor/alert data model and the error taxonomy used by
//! both the daemon and its tests.

pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
