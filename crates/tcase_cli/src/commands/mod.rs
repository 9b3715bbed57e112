//! CLI commands.

pub mod config;
pub mod order;
pub mod seed;
pub mod selfcheck;
