//! Wire protocol for Panovault.
//!
//! Defines the JSON envelope and payload types exchanged over the
//! browser-daemon WebSocket: batch triggers, cancellation, single-photo
//! downloads, and the progress notification stream.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

pub use constants::MessageType;
pub use envelope::Message;
