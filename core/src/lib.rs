/// Chatlink - real-time presence and messaging core
///
/// The live subsystem of a social-chat backend: presence tracking over
/// persistent connections, the friend-request lifecycle, direct
/// conversation identity and message logs, and best-effort event
/// fan-out to connected clients.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod friends;
pub mod hub;
pub mod media;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{ChatError, Result};
pub use hub::Hub;
