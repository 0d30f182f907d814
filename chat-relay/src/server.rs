use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
    sync::watch,
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::RelayConfig,
    history::{FileLog, MessageLog},
    session::Session,
    state::RelayState,
};

/// Accepts TCP clients and runs one session task per connection.
pub struct Server {
    listener: TcpListener,
    relay: Arc<RelayState>,
    handle: ServerHandle,
}

/// Stops a running [`Server`] from any task.
#[derive(Clone)]
pub struct ServerHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop: Arc::new(stop),
        }
    }

    /// Requests shutdown. Returns `true` only for the call that actually
    /// flipped the flag; later calls are no-ops.
    pub fn shutdown(&self) -> bool {
        let already_stopping = self.stop.send_replace(true);
        if !already_stopping {
            info!("relay shutting down");
        }
        !already_stopping
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.stop.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }
}

impl Server {
    /// Binds the listener and opens the history file named in `config`.
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, Arc::new(FileLog::new(&config.history))))
    }

    pub fn new(listener: TcpListener, log: Arc<dyn MessageLog>) -> Self {
        Self {
            listener,
            relay: Arc::new(RelayState::new(log)),
            handle: ServerHandle::new(),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn relay(&self) -> Arc<RelayState> {
        Arc::clone(&self.relay)
    }

    /// Accepts connections until [`ServerHandle::shutdown`] is called or the
    /// listener fails, then waits for every session to close.
    ///
    /// A listener fault shuts the whole relay down and is returned.
    pub async fn run(self) -> Result<()> {
        let Server {
            listener,
            relay,
            handle,
        } = self;
        let mut stop = handle.subscribe();
        let mut sessions = JoinSet::new();

        let result = loop {
            if *stop.borrow_and_update() {
                break Ok(());
            }

            select! {
                _ = stop.changed() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        spawn_session(&mut sessions, stream, peer, &relay, handle.subscribe());
                    }
                    Err(err) => {
                        error!(error = ?err, "failed to accept connection");
                        break Err(anyhow::Error::new(err).context("listener failed"));
                    }
                },
                Some(finished) = sessions.join_next() => reap_session(finished),
            }
        };

        drop(listener);
        handle.shutdown();
        while let Some(finished) = sessions.join_next().await {
            reap_session(finished);
        }
        info!("relay stopped");

        result
    }

    /// Runs until `signal` resolves, then shuts down gracefully.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let handle = self.handle();
        let run = self.run();
        tokio::pin!(run);
        tokio::pin!(signal);

        select! {
            result = &mut run => return result,
            _ = &mut signal => {
                handle.shutdown();
            }
        }

        run.await
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                // Without a handler, keep serving instead of stopping at once.
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn spawn_session(
    sessions: &mut JoinSet<()>,
    stream: TcpStream,
    peer: SocketAddr,
    relay: &Arc<RelayState>,
    stop: watch::Receiver<bool>,
) {
    let id = relay.next_session_id();
    debug!(session = id, %peer, "accepted connection");

    let (reader, writer) = stream.into_split();
    let mut session = Session::new(id, BufReader::new(reader), writer, Arc::clone(relay), stop);
    sessions.spawn(async move {
        if let Err(err) = session.run().await {
            warn!(session = id, %peer, error = ?err, "client connection closed with error");
        }
        debug!(session = id, %peer, "connection closed");
    });
}

fn reap_session(result: Result<(), JoinError>) {
    if let Err(err) = result {
        warn!(error = ?err, "session task failed");
    }
}
