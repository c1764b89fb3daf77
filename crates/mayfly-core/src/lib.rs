//! mayfly-core — Pure domain logic, no UI.
//!
//! Everything a chat session is made of: the countdown timer, the timeout
//! advisor, the message-store boundary, and the session engine tying them
//! together. Frontends (TUI, relay server) subscribe to events via
//! tokio::broadcast and drive the engine through its command channel.

pub mod activity;
pub mod advisor;
pub mod code;
pub mod config;
pub mod events;
pub mod handle;
pub mod prompts;
pub mod session;
pub mod store;
pub mod timer;
pub mod types;
