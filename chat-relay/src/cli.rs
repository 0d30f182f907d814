use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::{DEFAULT_HISTORY_PATH, DEFAULT_LISTEN_ADDR};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat relay, accepting TCP connections.
    Serve(ServeArgs),
    /// Connect to a relay and chat from the terminal.
    Connect(ConnectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address the relay should bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// File that keeps every broadcast message, replayed on request.
    #[arg(long, default_value = DEFAULT_HISTORY_PATH)]
    pub history: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Address of the relay to connect to.
    #[arg(long, default_value = DEFAULT_LISTEN_ADDR)]
    pub server: SocketAddr,
}
