//! Action model and proposal parser.
//!
//! The decision service replies with free text that should contain a JSON
//! action object. This crate recovers a typed [`Action`] from that text and
//! never panics or bubbles an error into the step loop: the worst outcome of
//! parsing is a terminal `error` action carrying a diagnostic.

pub mod parse;
pub mod types;

pub use parse::{parse_action, try_parse, ProtocolError};
pub use types::{Action, ActionKind, Bounds};
