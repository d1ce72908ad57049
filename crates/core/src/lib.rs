// crates/core/src/lib.rs
//! Core domain logic for chattail.
//!
//! This crate owns the pieces of the pipeline that are independent of any
//! HTTP or filesystem-watching framework:
//!
//! - [`reader`]: incremental parsing of append-only session log files
//! - [`grouper`]: grouping a project's messages into stable conversation threads
//! - [`types`]: the shared data model and the push-channel event union
//! - [`error`]: parse error classification

pub mod error;
pub mod grouper;
pub mod reader;
pub mod types;

pub use error::ParseError;
pub use grouper::ThreadGrouper;
pub use reader::{read_messages, LogReader};
pub use types::{
    LogRecord, Message, Notification, NotificationKind, Role, Thread, UpdateEvent,
};
