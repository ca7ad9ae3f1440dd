//! Transport between the core and the backend process

mod connection;
pub mod framing;

pub use connection::{ClientFrame, InboundNotification, IpcConnection, ServerFrame};
