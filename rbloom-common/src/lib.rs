// rbloom-common - Shared error taxonomy and command table for rbloom
//
// This crate defines what the client sends (keywords and reply shapes) and
// how failures are classified, independent of any transport.

pub mod commands;
pub mod error;

// Re-export for convenience
pub use commands::*;
pub use error::*;
