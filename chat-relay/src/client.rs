//! Terminal client: pipes stdin lines to the relay and relay lines to stdout.
//!
//! The relay speaks plain text, so this only shuttles lines; nickname
//! negotiation and commands are typed by the user as-is. When stdin ends the
//! client half-closes its side and keeps printing until the relay hangs up.

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{cli::ConnectArgs, protocol::LineReader};

type ServerLines = LineReader<BufReader<OwnedReadHalf>>;

pub async fn run(args: ConnectArgs) -> Result<()> {
    let (mut server_lines, mut writer) = establish_connection(&args).await?;
    let mut stdin_lines = BufReader::new(tokio::io::stdin()).lines();

    let stdin_open = run_client_loop(&mut server_lines, &mut writer, &mut stdin_lines).await?;
    if stdin_open {
        shutdown_connection(&mut writer).await;
    }

    Ok(())
}

async fn establish_connection(args: &ConnectArgs) -> Result<(ServerLines, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((LineReader::new(BufReader::new(reader)), writer))
}

/// Returns whether stdin was still open, i.e. whether the writer still needs
/// to be shut down.
async fn run_client_loop(
    server_lines: &mut ServerLines,
    writer: &mut OwnedWriteHalf,
    stdin_lines: &mut Lines<BufReader<io::Stdin>>,
) -> Result<bool> {
    let mut stdin_open = true;
    loop {
        select! {
            server_line = server_lines.next_line() => {
                if !handle_server_line(server_line).await? {
                    break;
                }
            }
            input = stdin_lines.next_line(), if stdin_open => {
                if !handle_stdin_line(input, writer).await? {
                    stdin_open = false;
                    shutdown_connection(writer).await;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                handle_ctrl_c(ctrl_c);
                break;
            }
        }
    }
    Ok(stdin_open)
}

async fn handle_server_line(line: io::Result<Option<String>>) -> Result<bool> {
    match line.context("failed to read from relay")? {
        Some(line) => {
            write_stdout(&line).await?;
            Ok(true)
        }
        None => {
            write_stdout("*** relay closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_line(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(line) = input? else {
        return Ok(false);
    };

    let mut encoded = line.into_bytes();
    encoded.push(b'\n');
    writer
        .write_all(&encoded)
        .await
        .context("failed to send line to relay")?;
    writer.flush().await?;
    Ok(true)
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
