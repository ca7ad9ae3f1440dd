//! Spindle Core - client-side synchronization for the spindle library backend
//!
//! Mirrors backend state (audio decks, worker queue tasks, tags, filtered
//! library entries) into local collections kept current by push
//! notifications, and turns user intent into backend commands.

pub mod types;
pub mod models;
pub mod events;
pub mod error;
pub mod commands;
pub mod ipc;
pub mod subscription;
pub mod sync;
pub mod deck;
pub mod filter;
pub mod directory;
pub mod color;
pub mod config;
pub mod session;

pub use types::*;
pub use error::{SyncError, SyncResult};
pub use session::{Session, SessionMessage, TagSection};
