//! Core engine: recipe parsing, loading, resolution, and execution.

pub mod error;
pub mod eventlog;
pub mod expr;
pub mod parser;
pub mod press;
pub mod script;
pub mod scribe;
pub mod settings;
pub mod template;
pub mod types;
