//! Durable artifacts of a Lockstep run.
//!
//! Nothing here takes part in a frame. Saves are taken between frames,
//! the replay log is appended after each applied frame, and replays are
//! verified by driving a fresh [`FrameDriver`](lockstep_core::FrameDriver)
//! over the recorded buffers.
//!
//! ```text
//! tick-0 save --+                         +--> verify_replay --> Verified | Diverged
//!               |                         |
//!    FrameDriver --step--> FrameReport ---+--> ReplayWriter (JSON lines)
//!               |
//!               +--> save_state (JSON, atomic) / export_causal_log (JSON lines)
//! ```
//!
//! # Modules
//!
//! - [`save`] -- the persistence unit: write and validated load
//! - [`replay`] -- per-frame replay log and divergence detection
//! - [`export`] -- causal log as JSON lines
//! - [`atomic`] -- temp file + rename writes
//! - [`error`] -- shared error type

pub mod atomic;
pub mod error;
pub mod export;
pub mod replay;
pub mod save;

pub use atomic::atomic_write;
pub use error::PersistError;
pub use export::{export_causal_log, read_causal_log};
pub use replay::{Divergence, ReplayRecord, ReplayVerdict, ReplayWriter, read_replay, verify_replay};
pub use save::{Restored, SaveFile, load_state, save_state};
