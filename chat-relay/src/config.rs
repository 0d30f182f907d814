//! Relay configuration.

use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use crate::cli::ServeArgs;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9999";
pub const DEFAULT_HISTORY_PATH: &str = "messages.txt";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the listener binds to
    pub listen: SocketAddr,

    /// File every broadcast message is appended to
    pub history: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, 9999)),
            history: PathBuf::from(DEFAULT_HISTORY_PATH),
        }
    }
}

impl From<ServeArgs> for RelayConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen: args.listen,
            history: args.history,
        }
    }
}
