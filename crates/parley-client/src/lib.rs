//! Production I/O for Parley sessions.
//!
//! - [`WsDriver`]: [`parley_app::Driver`] over tokio-tungstenite
//! - [`SystemEnv`]: [`parley_core::Environment`] over the system clocks

#![forbid(unsafe_code)]

mod error;
mod system_env;
mod websocket;

pub use error::TransportError;
pub use system_env::SystemEnv;
pub use websocket::WsDriver;
