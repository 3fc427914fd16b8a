//! Pyxis Core
//!
//! Core library for an infrastructure provider that maps declarative
//! configuration onto cloud management API operations

pub mod lock;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod waiter;
