//! Vellum: a Make-like build tool driven by `.vel` recipes.
//!
//! A recipe declares options, imports, target dependencies and target
//! bodies. The loader merges imported recipes and command modules into one
//! spec, the resolver turns it into a build order, and the engine runs each
//! target's commands in turn.

pub mod cli;
pub mod commands;
pub mod core;
pub mod transport;
