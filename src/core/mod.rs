// src/core/mod.rs

//! Core data structures and types

pub mod cell;
pub mod constants;
pub mod error;
pub mod state;

// Re-export public types for convenient access via `drqram::core::TypeName`
pub use cell::{CellReading, DualRailCell, LogicalBit, Rail};
pub use error::{NodeId, QramError, QubitId, TransportFailureCause};
pub use state::AmplitudeState;
