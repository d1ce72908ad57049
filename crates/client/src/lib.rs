// crates/client/src/lib.rs
//! Client-side view-state machines for chattail.
//!
//! Everything in this crate is a plain single-threaded value driven by
//! explicit inputs (fetched message sets, visibility callbacks, clock
//! readings). No locks and no I/O: a frontend embedding
//! calls the transition functions from its own event loop and renders from
//! the resulting state.

pub mod auto_read;
pub mod thread_view;

pub use auto_read::{AutoReadTracker, DwellState, PollOutcome};
pub use thread_view::{ThreadView, ThreadViews};
