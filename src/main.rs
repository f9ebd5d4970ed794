use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use teensy_link::{BoardResponse, Command, Config, Session, SessionError};

#[derive(Parser)]
#[command(name = "teensy-link")]
#[command(about = "Drive a multi-board LED display over serial links", long_about = None)]
struct Cli {
    /// Path to configuration file (JSON)
    config: String,

    /// Enable debug logging (packets and acks)
    #[arg(long)]
    debug: bool,

    /// Enable detailed debug (hex dumps every frame)
    #[arg(long)]
    ddebug: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Connect, list the boards found and disconnect
    Identify,
    /// Turn every LED off
    Clear,
    /// Set one LED by global index
    Set { index: u32, r: u8, g: u8, b: u8 },
    /// Set every LED to one colour
    Fill { r: u8, g: u8, b: u8 },
    /// Read JSON commands from stdin, one per line, until EOF or Ctrl-C
    Stream,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ddebug implies debug
    let level = if cli.ddebug {
        "trace"
    } else if cli.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = Config::load(&cli.config)
        .context(format!("Failed to load configuration {}", cli.config))?;

    let mut session = Session::connect(&config).context("Failed to connect to boards")?;

    match cli.command {
        Action::Identify => {
            for (k, name) in session.board_names().iter().enumerate() {
                let range = session.board_map().range(k);
                println!("✓ {} drives LEDs {}..{}", name, range.start, range.end);
            }
        }
        Action::Clear => {
            run(&mut session, &Command::ClearAll)?;
            run(&mut session, &Command::ShowNow)?;
        }
        Action::Set { index, r, g, b } => {
            run(&mut session, &Command::SetLed { index, rgb: [r, g, b] })?;
            run(&mut session, &Command::ShowNow)?;
        }
        Action::Fill { r, g, b } => {
            run(&mut session, &Command::SetAllLedsOneColour { rgb: [r, g, b] })?;
            run(&mut session, &Command::ShowNow)?;
        }
        Action::Stream => stream(&mut session)?,
    }

    session.disconnect();
    Ok(())
}

/// Dispatch one command, reporting boards that did not acknowledge it.
fn run(session: &mut Session, command: &Command) -> Result<()> {
    let responses = session
        .dispatch(command)
        .context(format!("Failed to send {}", command.name()))?;
    report(&responses);
    Ok(())
}

fn report(responses: &[BoardResponse]) {
    for response in responses {
        if !response.status.is_ack() {
            eprintln!("✗ {}: {:?}", response.board, response.status);
        }
    }
}

fn stream(session: &mut Session) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(false, Ordering::Relaxed);
    }) {
        eprintln!("Warning: Could not set Ctrl-C handler: {}", e);
    }

    // Stdin blocks, so read it on its own thread and poll here for shutdown
    let (sender, receiver) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    while running.load(Ordering::Relaxed) {
        let line = match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("✗ Ignoring bad command {:?}: {}", line, e);
                continue;
            }
        };
        // Bad indices or shapes only reject that one line
        match session.dispatch(&command) {
            Ok(responses) => report(&responses),
            Err(e @ (SessionError::Route(_) | SessionError::Command(_))) => {
                eprintln!("✗ Rejected {}: {}", command.name(), e);
            }
            Err(e) => return Err(e).context(format!("Failed to send {}", command.name())),
        }
    }

    // Turn LEDs off on the way out
    run(session, &Command::ClearAll)?;
    run(session, &Command::ShowNow)?;
    Ok(())
}
