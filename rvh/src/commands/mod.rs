//! Subcommand implementations.
//!
//! Each command is generic over the transport so the same code runs against
//! SSH and the mock.

pub mod exec;
pub mod push;
pub mod ready;
pub mod steps;
