//! # Domain Module
//!
//! Core domain types for the confidential ledger client.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use value_objects::*;
