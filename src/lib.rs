//! Signaling core of a selective-forwarding media server.
//!
//! Clients speak JSON over a websocket to form rooms and publish media. Each
//! publish negotiates one inbound media session whose remote tracks are read
//! into per-track packet channels.

pub mod config;
pub mod error;
pub mod media;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod signaling;
pub mod stream;
pub mod user;

pub use config::Config;
pub use error::{Result, SfuError};
pub use registry::{Hub, RoomRegistry, UserRegistry};
pub use room::Room;
pub use session::UserSession;
pub use stream::IncomingStream;
pub use user::User;
