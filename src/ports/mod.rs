//! # Ports Module
//!
//! Outbound dependency traits and their mock implementations.

pub mod outbound;

pub use outbound::*;
