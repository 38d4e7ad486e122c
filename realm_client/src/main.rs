//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p realm_client -- [--addr 127.0.0.1:8080] [--config client.json]
//!                                [--character gotchi:4242]
//!
//! The client connects, optionally sends a spawn intent, then keeps the world
//! state in sync and streams input until the session ends.
//!
//! Console commands:
//!   status              - Show session status
//!   keys <up left ...>  - Set held keys (up/left/down/right/action or wasd/space)
//!   spawn <type> <id>   - Send the spawn intent
//!   disconnect          - Drop the connection
//!   quit                - Exit client

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use realm_client::client::GameClient;
use realm_shared::{
    config::ClientConfig,
    event::PresentationEvent,
    net::CharacterSelection,
};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    addr: Option<String>,
    config: Option<PathBuf>,
    character: Option<CharacterSelection>,
}

fn parse_character(s: &str) -> Option<CharacterSelection> {
    let (kind, id) = s.split_once(':').unwrap_or(("gotchi", s));
    Some(CharacterSelection {
        character_type: kind.to_string(),
        character_id: id.parse().ok()?,
    })
}

fn parse_args() -> Args {
    let mut out = Args {
        addr: None,
        config: None,
        character: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                out.addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--config" if i + 1 < args.len() => {
                out.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--character" if i + 1 < args.len() => {
                out.character = parse_character(&args[i + 1]);
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

/// Reads console lines on a plain thread, since stdin blocks.
fn spawn_console() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let prompt = || {
            print!("] ");
            io::stdout().flush().ok();
        };
        prompt();
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if !line.is_empty() && tx.blocking_send(line.to_owned()).is_err() {
                break;
            }
            prompt();
        }
    });
    rx
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(addr) = args.addr {
        cfg.server_addr = addr;
    }
    info!(server = %cfg.server_addr, frame_hz = cfg.frame_hz, "Starting client");

    let mut client = GameClient::connect(&cfg).await.context("connect")?;
    if let Some(selection) = args.character {
        client.request_spawn(selection).await.context("spawn intent")?;
    }

    let mut console_rx = spawn_console();
    println!("Connected to {}. Type 'status' for info, 'quit' to exit.", client.server_peer());

    'run: loop {
        while let Ok(line) = console_rx.try_recv() {
            if matches!(line.as_str(), "quit" | "exit") {
                client.close();
                break 'run;
            }
            match client.exec_console(&line).await {
                Ok(output) => {
                    for line in output {
                        println!("{}", line);
                    }
                }
                Err(e) => {
                    println!("Error: {}", e);
                }
            }
        }

        if let Err(e) = client.step().await {
            println!("Frame error: {:#}", e);
        }

        for event in client.session.drain_events() {
            match event {
                PresentationEvent::SessionEnded { reason } => {
                    println!("Session ended ({reason:?}).");
                }
                PresentationEvent::LevelUp { new_level, new_atk, .. } => {
                    println!("Level up! Now level {new_level}, ATK {new_atk}.");
                }
                PresentationEvent::ZoneCulled { zone_id, removed } => {
                    info!(zone = zone_id, removed, "Zone culled");
                }
            }
        }

        if !client.is_connected() {
            println!("Disconnected from server.");
            break;
        }
    }

    Ok(())
}
