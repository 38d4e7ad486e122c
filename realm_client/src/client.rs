//! Client implementation.
//!
//! The client maintains:
//! - One framed TCP stream to the server
//! - A reader task forwarding inbound frames over a channel
//! - A [`SessionController`] holding all world state
//! - A frame clock driving interpolation, effects and the input cadence
//!
//! All world state is touched from the task that owns the `GameClient`; the
//! reader task only moves bytes.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use realm_shared::{
    config::ClientConfig,
    net::{CharacterSelection, FrameWriter, FramedConn, Keys, Outbound},
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    input::parse_keys,
    session::{SessionController, SessionError, SessionState},
};

/// Wall clock in unix milliseconds, the timebase of server timestamps.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

enum Inbound {
    Frame(Bytes),
    Closed(String),
}

/// High-level game client.
pub struct GameClient {
    pub session: SessionController,
    writer: FrameWriter,
    inbound: mpsc::Receiver<Inbound>,
    reader: JoinHandle<()>,
    frames: Interval,
    last_frame_ms: i64,
    held: Keys,
    server: SocketAddr,
}

impl GameClient {
    /// Connects to the server and starts reading.
    pub async fn connect(cfg: &ClientConfig) -> anyhow::Result<Self> {
        let server: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let mut session = SessionController::new(cfg.clone());
        session.begin_connect()?;

        let conn = match FramedConn::connect(server).await {
            Ok(c) => c,
            Err(e) => {
                session.on_disconnected();
                return Err(e);
            }
        };
        let (mut reader_half, writer) = conn.into_split();

        let (tx, inbound) = mpsc::channel(256);
        let reader = tokio::spawn(async move {
            loop {
                match reader_half.recv_frame().await {
                    Ok(frame) => {
                        if tx.send(Inbound::Frame(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Inbound::Closed(format!("{e:#}"))).await;
                        break;
                    }
                }
            }
        });

        session.on_connected()?;
        info!(server = %server, "Connected to server");

        let hz = cfg.frame_hz.max(1);
        let mut frames = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(hz)));
        frames.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            session,
            writer,
            inbound,
            reader,
            frames,
            last_frame_ms: now_ms(),
            held: Keys::empty(),
            server,
        })
    }

    pub fn server_peer(&self) -> SocketAddr {
        self.server
    }

    pub fn is_connected(&self) -> bool {
        self.session.state() == SessionState::Connected
    }

    /// Keys reported on every input step from now on.
    pub fn set_keys(&mut self, keys: Keys) {
        self.held = keys;
    }

    pub fn keys(&self) -> Keys {
        self.held
    }

    /// Sends the spawn intent for `selection`.
    pub async fn request_spawn(&mut self, selection: CharacterSelection) -> anyhow::Result<()> {
        let msg = self.session.request_spawn(selection)?;
        self.send(&msg).await
    }

    async fn send(&mut self, msg: &Outbound) -> anyhow::Result<()> {
        if let Err(e) = self.writer.send(msg).await {
            warn!(error = %e, "Send failed");
            self.session.on_disconnected();
            return Err(e);
        }
        Ok(())
    }

    /// Waits for whichever comes first, the next inbound frame or the next
    /// frame tick, and handles it.
    pub async fn step(&mut self) -> anyhow::Result<()> {
        tokio::select! {
            msg = self.inbound.recv() => {
                self.handle_inbound(msg);
                Ok(())
            }
            _ = self.frames.tick() => self.frame().await,
        }
    }

    /// Applies every inbound frame already queued, without waiting.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(msg) = self.inbound.try_recv() {
            self.handle_inbound(Some(msg));
            n += 1;
        }
        n
    }

    fn handle_inbound(&mut self, msg: Option<Inbound>) {
        match msg {
            Some(Inbound::Frame(frame)) => match self.session.on_payload(&frame, now_ms()) {
                Ok(report) => debug!(?report, "Batch applied"),
                Err(SessionError::NotConnected(state)) => {
                    debug!(state = ?state, "Frame after disconnect");
                }
                // Already logged by the controller.
                Err(_) => {}
            },
            Some(Inbound::Closed(reason)) => {
                info!(reason = %reason, "Connection closed");
                self.session.on_disconnected();
            }
            None => {
                self.session.on_disconnected();
            }
        }
    }

    /// One render frame: apply queued batches, tick the controller and send
    /// due input.
    pub async fn frame(&mut self) -> anyhow::Result<()> {
        let applied = self.pump();
        if applied > 1 {
            debug!(applied, "Caught up on queued batches");
        }
        let now = now_ms();
        let dt = (now - self.last_frame_ms).max(0) as f64;
        self.last_frame_ms = now;

        let outbound = self.session.tick(now, dt, self.held);
        for msg in &outbound {
            self.send(msg).await?;
        }
        Ok(())
    }

    /// Executes a console command.
    pub async fn exec_console(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            return Ok(Vec::new());
        };

        match cmd {
            "status" => {
                let s = &self.session;
                let mut out = vec![
                    format!("State: {:?}", s.state()),
                    format!("Server: {}", self.server),
                    format!("Local player: {}", s.local_id().unwrap_or("-")),
                    format!("Players: {}  Enemies: {}", s.players().len(), s.enemies().len()),
                    format!("Effects: {}", s.active_effects()),
                    format!("Keys: {:?}", self.held),
                ];
                if let Some(set) = s.zones().active() {
                    out.push(format!(
                        "Zones: {} {} {} {}",
                        set.current, set.x_axis, set.y_axis, set.diagonal
                    ));
                }
                if let Some(p) = s.follow_target() {
                    out.push(format!("Camera: ({:.0}, {:.0})", p.x, p.y));
                }
                Ok(out)
            }
            "keys" => {
                self.held = parse_keys(&tokens[1..].join(" "));
                Ok(vec![format!("Holding {:?}", self.held)])
            }
            "spawn" => {
                let (Some(kind), Some(id)) = (tokens.get(1), tokens.get(2)) else {
                    return Ok(vec!["Usage: spawn <type> <id>".to_string()]);
                };
                let Ok(character_id) = id.parse::<u64>() else {
                    return Ok(vec![format!("Bad character id '{id}'")]);
                };
                let selection = CharacterSelection {
                    character_type: kind.to_string(),
                    character_id,
                };
                match self.request_spawn(selection).await {
                    Ok(()) => Ok(vec!["Spawn requested".to_string()]),
                    Err(e) => Ok(vec![format!("Spawn failed: {e}")]),
                }
            }
            "disconnect" => {
                self.close();
                Ok(vec!["Disconnected".to_string()])
            }
            other => Ok(vec![format!("Unknown command '{other}'")]),
        }
    }

    /// Stops reading and tears down all session state.
    pub fn close(&mut self) {
        self.reader.abort();
        self.session.on_disconnected();
        self.session.shutdown();
    }
}

impl Drop for GameClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
