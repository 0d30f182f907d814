//! Line protocol spoken between the relay and its clients.
//!
//! Everything is plain newline-terminated text so `nc` or `telnet` work as
//! clients. This module frames inbound bytes into lines with [`LineReader`],
//! parses them into [`Registration`] and [`Command`] values and renders every
//! line the relay sends back.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const WELCOME_BANNER: &str = "Hello!
Welcome to the chat relay!
------------------------ INFO ------------------------
When you join you have to enter your nickname and
optionally a Y to read the previous messages, e.g. `alice Y`
Commands:
   /nick <newname>:  change your nickname
   /quit:  leave the chat
";

pub const NICKNAME_PROMPT: &str = "Please enter a nickname : ";
pub const REPLAY_BANNER: &str =
    "------------------ These are the previous messages ------------------";
pub const EMPTY_NICKNAME: &str = "Nickname cannot be empty!";
pub const MISSING_NICKNAME: &str = "No nickname provided!";
pub const NICKNAME_UNAVAILABLE: &str = "User not available, it's already in use";
pub const HISTORY_UNAVAILABLE: &str = "Previous messages are not available right now";
pub const SERVER_SHUTTING_DOWN: &str = "Server is shutting down";

const REPLAY_FLAG: &str = "Y";
const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// Splits a byte stream into newline-terminated lines.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// client on a legacy encoding stays connected. Partially read lines are kept
/// across calls, which makes [`LineReader::next_line`] safe to use in
/// `select!`.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, or `None` once the peer is done.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.inner.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(&self.buf)
            .trim_end_matches(LINE_ENDINGS)
            .to_string();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// The answer to the nickname prompt: `name [Y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration<'a> {
    pub nickname: &'a str,
    /// Client asked for the full history before joining.
    pub replay: bool,
}

impl<'a> Registration<'a> {
    /// Returns `None` for a blank line.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let nickname = parts.next()?;
        let replay = parts
            .next()
            .is_some_and(|flag| flag.eq_ignore_ascii_case(REPLAY_FLAG));
        Some(Self { nickname, replay })
    }
}

/// A line received from a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Rename(&'a str),
    /// `/nick` without an argument.
    MissingNickname,
    /// `/nick` with an argument that contains whitespace.
    InvalidNickname(&'a str),
    Quit,
    Chat(&'a str),
    Empty,
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        if let Some(rest) = line.strip_prefix("/nick") {
            // `/nickname` is ordinary chat, only `/nick` followed by a space is a command.
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                let argument = rest.trim();
                return if argument.is_empty() {
                    Command::MissingNickname
                } else if argument.contains(char::is_whitespace) {
                    Command::InvalidNickname(argument)
                } else {
                    Command::Rename(argument)
                };
            }
        }

        if line.starts_with("/quit") {
            return Command::Quit;
        }

        if line.is_empty() {
            Command::Empty
        } else {
            Command::Chat(line)
        }
    }
}

pub fn joined(nickname: &str) -> String {
    format!("{nickname} joined the chat!")
}

pub fn left(nickname: &str) -> String {
    format!("{nickname} left the chat!")
}

pub fn renamed(old: &str, new: &str) -> String {
    format!("{old} renamed themselves to {new}")
}

pub fn chat(nickname: &str, text: &str) -> String {
    format!("{nickname}: {text}")
}

pub fn nickname_taken(nickname: &str) -> String {
    format!("{nickname} is not an available username as it is already in use!")
}

pub fn rename_succeeded(nickname: &str) -> String {
    format!("Successfully changed nickname to {nickname}")
}

pub fn already_named(nickname: &str) -> String {
    format!("You are already known as {nickname}")
}

pub fn invalid_nickname(nickname: &str) -> String {
    format!("'{nickname}' is not a valid nickname, it cannot contain spaces")
}
