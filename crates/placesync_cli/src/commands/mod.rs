//! CLI command implementations.

pub mod compact;
pub mod demo;
pub mod inspect;
pub mod stage;
pub mod sweep;
