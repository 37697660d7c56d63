mod commands;
mod framing;
mod render;
mod tokenizer;

use std::env;
use std::io::Write as _;
use std::process::ExitCode;

use clap::{Arg, Command as ClapCommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use chat_protocol::encode;
use commands::{Command, CommandError};
use framing::{FrameReader, FrameWriter};

fn validate_port_value(value: &str) -> Result<u16, String> {
    value.parse::<u16>().map_err(|_| "invalid port number".to_owned())
}

/// Terminal client for the chat service (§4.5, §6). Builder-style `clap`
/// (`Command::new(...).arg(Arg::new(...))`), matching
/// `services/streamer/src/main.rs` and `services/emulator/src/main.rs` —
/// the teacher never uses `#[derive(Parser)]`. Argument parsing failures
/// exit with clap's own status code 2, matching §6's usage-error contract.
fn cli() -> ClapCommand {
    ClapCommand::new("chat-client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal client for the chat service")
        .arg(Arg::new("host").help("Server host to connect to").required(true))
        .arg(
            Arg::new("port")
                .help("Server port to connect to")
                .value_parser(validate_port_value)
                .required(true),
        )
        .arg(
            Arg::new("log_level")
                .help("Tracing env-filter syntax; does not affect wire behavior")
                .long("log-level")
                .default_value("info"),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    let host = matches.get_one::<String>("host").expect("host is required").clone();
    let port = *matches.get_one::<u16>("port").expect("port is required");
    let log_level = env::var("CHAT_CLIENT_LOG")
        .unwrap_or_else(|_| matches.get_one::<String>("log_level").expect("has a default").clone());
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(log_level)).init();

    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(err) => {
            eprintln!("could not connect to {host}:{port}: {err}");
            return ExitCode::from(1);
        }
    };

    match run(stream).await {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("fatal: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run(stream: TcpStream) -> std::io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut frames = FrameReader::new(read_half);
    let mut out = FrameWriter::new(write_half);
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    // Explicitly false at startup: a reference-client bug (§9 open question a)
    // left this uninitialized and produced an inconsistent startup prompt.
    let mut is_identified = false;
    let mut username: Option<String> = None;

    print_prompt(is_identified, username.as_deref());

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                match line? {
                    None => {
                        // stdin EOF behaves as /quit (§4.5): best-effort DISCONNECT then exit.
                        let _ = out.write_frame(&encode(&chat_protocol::ClientMessage::Disconnect)).await;
                        break;
                    }
                    Some(line) => {
                        if handle_line(&line, &mut out, is_identified).await? {
                            break;
                        }
                        print_prompt(is_identified, username.as_deref());
                    }
                }
            }
            frame = frames.read_frame() => {
                match frame? {
                    None => break, // server closed the socket
                    Some(frame) => {
                        if render::render(&frame) {
                            is_identified = true;
                        }
                        if let Some(name) = extract_identify_username(&frame) {
                            username = Some(name);
                        }
                        print_prompt(is_identified, username.as_deref());
                    }
                }
            }
        }
    }

    Ok(())
}

/// Returns `true` when the client should exit (a local `/quit`).
async fn handle_line<W: tokio::io::AsyncWrite + Unpin>(
    line: &str,
    out: &mut FrameWriter<W>,
    is_identified: bool,
) -> std::io::Result<bool> {
    let tokens = match tokenizer::tokenize(line) {
        Ok(tokens) => tokens,
        Err(err) => {
            eprintln!("syntax error: {err}");
            return Ok(false);
        }
    };

    if tokens.is_empty() {
        return Ok(false);
    }

    if !tokens[0].starts_with('/') {
        let message = chat_protocol::ClientMessage::PublicText { text: line.to_owned() };
        out.write_frame(&encode(&message)).await?;
        return Ok(false);
    }

    let command = match commands::parse(&tokens) {
        Ok(command) => command,
        Err(CommandError::Unknown(name)) => {
            eprintln!("unknown command: /{name}");
            return Ok(false);
        }
        Err(err) => {
            eprintln!("{err}");
            return Ok(false);
        }
    };

    if !is_identified && !command.allowed_before_identify() {
        eprintln!("you must /identify before using that command");
        return Ok(false);
    }

    if matches!(command, Command::Quit) {
        out.write_frame(&encode(&chat_protocol::ClientMessage::Disconnect)).await?;
        return Ok(true);
    }

    if let Some(message) = command.into_message() {
        out.write_frame(&encode(&message)).await?;
    }
    Ok(false)
}

fn extract_identify_username(frame: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(frame).ok()?;
    if value.get("type")?.as_str()? != "RESPONSE" {
        return None;
    }
    if value.get("operation")?.as_str()? != "IDENTIFY" || value.get("result")?.as_str()? != "SUCCESS" {
        return None;
    }
    value.get("extra")?.as_str().map(str::to_owned)
}

fn print_prompt(is_identified: bool, username: Option<&str>) {
    match (is_identified, username) {
        (true, Some(name)) => print!("@{name}: "),
        _ => print!("> "),
    }
    let _ = std::io::stdout().flush();
}
