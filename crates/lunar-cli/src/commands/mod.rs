//! Subcommand implementations.

pub mod check;
pub mod modules;
pub mod type_of;
