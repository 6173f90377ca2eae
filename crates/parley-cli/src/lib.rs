//! Terminal front end for Parley.
//!
//! Input parsing and output formatting live here so they can be tested
//! without a terminal; `main.rs` wires them to a [`parley_app::ChatSession`].

#![forbid(unsafe_code)]

pub mod command;
pub mod render;

pub use command::{Command, CommandError, HELP, parse};
