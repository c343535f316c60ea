mod rooms;
mod server;

pub use crate::rooms::{Config, Registry};
pub use crate::server::Server;
