//! Per-client state machine.
//!
//! A [`Session`] is generic over its transport so the whole lifecycle can be
//! driven through in-memory pipes. It moves through
//! `Connecting -> Registering -> Active -> Closing -> Closed`:
//!
//! - greets the client and negotiates a unique nickname, optionally replaying
//!   the message history first;
//! - joins the broadcast set and relays chat lines and commands;
//! - on quit, disconnect, transport fault or server shutdown releases its
//!   nickname, leaves the broadcast set and closes the transport once.
//!
//! Broadcast deliveries arrive on the session's own outbound queue and are
//! written by this task only, interleaved with reads via `select!`. Every
//! write also races the relay's shutdown flag, so a client that stops reading
//! cannot hold up shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    select,
    sync::{mpsc, watch},
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{Outbound, SessionId},
    protocol::{self, Command, LineReader, Registration},
    state::RelayState,
};

/// How long a shutting-down session may spend on its farewell writes.
const FAREWELL_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registering,
    Active,
    Closing,
    Closed,
}

/// Why a session stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// `/quit`.
    Quit,
    /// EOF or transport fault.
    Disconnected,
    /// The relay is shutting down.
    Shutdown,
}

enum Input {
    Line(String),
    Closed,
    Shutdown,
}

pub struct Session<R, W> {
    id: SessionId,
    state: SessionState,
    nickname: Option<String>,
    lines: LineReader<R>,
    writer: W,
    /// A write was abandoned halfway because the relay stopped.
    stalled: bool,
    outbound_tx: Outbound,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    relay: Arc<RelayState>,
    shutdown: watch::Receiver<bool>,
}

impl<R, W> Session<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// `shutdown` flips to `true` when the whole relay stops.
    pub fn new(
        id: SessionId,
        reader: R,
        writer: W,
        relay: Arc<RelayState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            id,
            state: SessionState::Connecting,
            nickname: None,
            lines: LineReader::new(reader),
            writer,
            stalled: false,
            outbound_tx,
            outbound_rx,
            relay,
            shutdown,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// Drives the session until the client leaves or the relay shuts down.
    ///
    /// The session is always `Closed` when this returns. Transport errors are
    /// returned after teardown so the caller can log them; errors caused by
    /// the relay stopping are not.
    pub async fn run(&mut self) -> Result<()> {
        let outcome = self.drive().await;
        let departure = match &outcome {
            Ok(departure) => *departure,
            Err(_) if *self.shutdown.borrow() => Departure::Shutdown,
            Err(_) => Departure::Disconnected,
        };
        self.teardown(departure).await;

        match outcome {
            Err(err) if departure == Departure::Shutdown => {
                debug!(session = self.id, error = ?err, "session interrupted by shutdown");
                Ok(())
            }
            outcome => outcome.map(|_| ()),
        }
    }

    /// Closes the session as if the relay were shutting down. No-op once closed.
    pub async fn close(&mut self) {
        self.teardown(Departure::Shutdown).await;
    }

    async fn drive(&mut self) -> Result<Departure> {
        self.send(protocol::WELCOME_BANNER).await?;
        self.state = SessionState::Registering;

        let nickname = match self.register().await? {
            Ok(nickname) => nickname,
            Err(departure) => return Ok(departure),
        };
        self.activate(nickname);
        self.chat().await
    }

    async fn register(&mut self) -> Result<Result<String, Departure>> {
        loop {
            self.send(protocol::NICKNAME_PROMPT).await?;
            let line = match self.next_input().await? {
                Input::Line(line) => line,
                Input::Closed => return Ok(Err(Departure::Disconnected)),
                Input::Shutdown => return Ok(Err(Departure::Shutdown)),
            };

            let Some(registration) = Registration::parse(&line) else {
                self.send(protocol::EMPTY_NICKNAME).await?;
                continue;
            };

            // History goes out before the claim, even if the name turns out to be taken.
            if registration.replay {
                self.replay_history().await?;
            }

            if self.relay.registry.try_claim(registration.nickname) {
                return Ok(Ok(registration.nickname.to_string()));
            }
            debug!(session = self.id, nickname = registration.nickname, "nickname taken");
            self.send(&protocol::nickname_taken(registration.nickname))
                .await?;
        }
    }

    fn activate(&mut self, nickname: String) {
        self.state = SessionState::Active;
        self.relay
            .broadcaster
            .join(self.id, self.outbound_tx.clone());
        info!(session = self.id, %nickname, "client joined");
        self.relay.broadcaster.broadcast(&protocol::joined(&nickname));
        self.nickname = Some(nickname);
    }

    async fn chat(&mut self) -> Result<Departure> {
        loop {
            select! {
                line = self.lines.next_line() => {
                    let Some(line) = line.context("failed to read from client")? else {
                        return Ok(Departure::Disconnected);
                    };
                    if let Some(departure) = self.handle_line(&line).await? {
                        return Ok(departure);
                    }
                }
                Some(message) = self.outbound_rx.recv() => {
                    self.write_line(&message).await?;
                }
                _ = relay_stopped(&mut self.shutdown) => return Ok(Departure::Shutdown),
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<Option<Departure>> {
        let Some(current) = self.nickname.clone() else {
            return Ok(Some(Departure::Disconnected));
        };

        match Command::parse(line) {
            Command::Rename(new) => self.rename(&current, new).await?,
            Command::MissingNickname => self.send(protocol::MISSING_NICKNAME).await?,
            Command::InvalidNickname(name) => {
                self.send(&protocol::invalid_nickname(name)).await?
            }
            Command::Quit => return Ok(Some(Departure::Quit)),
            Command::Chat(text) => {
                self.relay
                    .broadcaster
                    .broadcast(&protocol::chat(&current, text));
            }
            Command::Empty => {}
        }
        Ok(None)
    }

    async fn rename(&mut self, current: &str, new: &str) -> Result<()> {
        if current == new {
            return self.send(&protocol::already_named(new)).await;
        }
        if !self.relay.registry.rename(current, new) {
            return self.send(protocol::NICKNAME_UNAVAILABLE).await;
        }

        info!(session = self.id, old = current, new, "client renamed");
        self.relay
            .broadcaster
            .broadcast(&protocol::renamed(current, new));
        self.nickname = Some(new.to_string());
        self.send(&protocol::rename_succeeded(new)).await
    }

    async fn replay_history(&mut self) -> Result<()> {
        match self.relay.broadcaster.history() {
            Ok(history) => {
                self.send(protocol::REPLAY_BANNER).await?;
                for line in history {
                    self.write_line(&line).await?;
                }
            }
            Err(err) => {
                warn!(session = self.id, error = ?err, "failed to read message history");
                self.send(protocol::HISTORY_UNAVAILABLE).await?;
            }
        }
        Ok(())
    }

    async fn next_input(&mut self) -> Result<Input> {
        select! {
            line = self.lines.next_line() => {
                Ok(match line.context("failed to read from client")? {
                    Some(line) => Input::Line(line),
                    None => Input::Closed,
                })
            }
            _ = relay_stopped(&mut self.shutdown) => Ok(Input::Shutdown),
        }
    }

    async fn teardown(&mut self, departure: Departure) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closing;

        // The leave notice is logged before the name can be claimed again.
        // It still reaches this session's own queue.
        if let Some(nickname) = self.nickname.take() {
            if departure != Departure::Shutdown {
                self.relay.broadcaster.broadcast(&protocol::left(&nickname));
            }
            self.relay.broadcaster.leave(self.id);
            self.relay.registry.release(&nickname);
            info!(session = self.id, %nickname, ?departure, "client left");
        }

        // Best effort: the peer may already be gone or have stopped reading.
        match departure {
            Departure::Shutdown if self.stalled => {
                debug!(session = self.id, "client stopped reading, skipping farewell");
            }
            Departure::Shutdown => {
                if timeout(FAREWELL_TIMEOUT, self.farewell()).await.is_err() {
                    debug!(session = self.id, "client stopped reading, farewell abandoned");
                }
            }
            Departure::Quit | Departure::Disconnected => {
                if let Err(err) = self.flush_outbound().await {
                    debug!(session = self.id, error = ?err, "dropping undelivered messages");
                }
            }
        }
        if let Err(err) = self.writer.shutdown().await {
            debug!(session = self.id, error = ?err, "failed to close transport cleanly");
        }

        self.state = SessionState::Closed;
    }

    /// Writes a direct reply after any broadcasts already queued, so replies
    /// never overtake them.
    async fn send(&mut self, line: &str) -> Result<()> {
        self.flush_outbound().await?;
        self.write_line(line).await
    }

    async fn flush_outbound(&mut self) -> Result<()> {
        while let Ok(message) = self.outbound_rx.try_recv() {
            self.write_line(&message).await?;
        }
        Ok(())
    }

    /// Queued broadcasts plus the shutdown notice, written without racing the
    /// shutdown flag that triggered them. Callers bound this with a timeout.
    async fn farewell(&mut self) -> Result<()> {
        while let Ok(message) = self.outbound_rx.try_recv() {
            write_encoded(&mut self.writer, &encode(&message)).await?;
        }
        write_encoded(&mut self.writer, &encode(protocol::SERVER_SHUTTING_DOWN)).await
    }

    /// Writes one line, giving up if the relay stops while the client is not
    /// reading.
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let encoded = encode(line);
        let writer = &mut self.writer;
        let shutdown = &mut self.shutdown;

        select! {
            written = write_encoded(writer, &encoded) => written,
            _ = relay_stopped(shutdown) => {
                self.stalled = true;
                Err(anyhow!("relay stopped while writing to client"))
            }
        }
    }
}

fn encode(line: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    encoded
}

async fn write_encoded<W>(writer: &mut W, encoded: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(encoded)
        .await
        .context("failed to write to client")?;
    writer
        .flush()
        .await
        .context("failed to flush client transport")
}

/// Resolves once the relay is shutting down, immediately if it already is.
async fn relay_stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means the relay is gone.
    let _ = shutdown.wait_for(|stopping| *stopping).await;
}
