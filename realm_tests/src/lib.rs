//! Test harness.
//!
//! [`ScriptedServer`] speaks the client's wire protocol over a real socket
//! and sends exactly the batches a test hands it, so integration tests can
//! drive a [`GameClient`] through scripted sessions.

pub mod replay;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use realm_client::GameClient;
use realm_shared::{
    config::ClientConfig,
    net::{
        ActiveZoneSet, EnemyUpdate, FrameListener, FramedConn, Outbound, PlayerUpdate, Record,
        Welcome, ZoneDescriptor, ZoneId,
    },
};

/// One-connection server that replays scripted batches.
pub struct ScriptedServer {
    listener: FrameListener,
    conn: Option<FramedConn>,
}

/// Binds a scripted server on an ephemeral localhost port and returns a
/// client config pointing at it.
pub async fn bind_ephemeral() -> anyhow::Result<(ScriptedServer, ClientConfig)> {
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let listener = FrameListener::bind(addr).await?;
    let cfg = ClientConfig {
        server_addr: listener.local_addr()?.to_string(),
        ..ClientConfig::default()
    };
    Ok((
        ScriptedServer {
            listener,
            conn: None,
        },
        cfg,
    ))
}

impl ScriptedServer {
    pub async fn accept_one(&mut self) -> anyhow::Result<SocketAddr> {
        let (conn, addr) = self.listener.accept().await?;
        self.conn = Some(conn);
        Ok(addr)
    }

    fn conn(&mut self) -> anyhow::Result<&mut FramedConn> {
        self.conn.as_mut().context("no client accepted")
    }

    pub async fn send(&mut self, records: &[Record]) -> anyhow::Result<()> {
        self.conn()?.send_batch(records).await
    }

    /// Sends bytes as one frame, whatever they contain.
    pub async fn send_raw(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        self.conn()?.send_frame(payload).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<Outbound> {
        self.conn()?.recv_outbound().await
    }

    /// Next outbound message, or `None` if nothing arrives within `limit`.
    pub async fn recv_timeout(&mut self, limit: Duration) -> anyhow::Result<Option<Outbound>> {
        match tokio::time::timeout(limit, self.recv()).await {
            Ok(msg) => msg.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Drops the connection.
    pub fn hang_up(&mut self) {
        self.conn = None;
    }
}

/// Steps the client until `pred` holds or `limit` runs out.
pub async fn drive_until<F>(client: &mut GameClient, limit: Duration, pred: F) -> anyhow::Result<()>
where
    F: Fn(&GameClient) -> bool,
{
    tokio::time::timeout(limit, async {
        while !pred(&*client) {
            // A failed send disconnects the session; let the predicate see it.
            if let Err(e) = client.step().await {
                if client.is_connected() {
                    return Err(e);
                }
            }
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("condition not reached in time")?
}

/// Installs a test-friendly subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

pub fn unix_ms() -> i64 {
    realm_client::client::now_ms()
}

// ─── Record builders ───

pub fn welcome(local_id: &str, zones: Vec<ZoneDescriptor>) -> Record {
    Record::Welcome(Welcome {
        local_id: local_id.to_string(),
        zones,
    })
}

pub fn zone(id: i64, map_ref: &str, world_x: f32, world_y: f32) -> ZoneDescriptor {
    ZoneDescriptor {
        zone_id: ZoneId(id),
        map_ref: map_ref.to_string(),
        world_x,
        world_y,
    }
}

pub fn zone_set(current: i64, x_axis: i64, y_axis: i64, diagonal: i64) -> Record {
    Record::ActiveZoneSet(ActiveZoneSet::new(current, x_axis, y_axis, diagonal))
}

pub fn player(id: &str, x: f32, y: f32, zone: i64, timestamp: i64, hp: i64) -> Record {
    Record::PlayerUpdate(PlayerUpdate {
        id: id.to_string(),
        x,
        y,
        zone_id: ZoneId(zone),
        timestamp,
        max_hp: 100,
        hp,
        max_ap: 10,
        ap: 10,
        game_xp: 0,
        game_level: 1,
        game_xp_on_current_level: 0,
        game_xp_total_for_next_level: 100,
        direction: None,
    })
}

pub fn enemy(id: &str, x: f32, y: f32, zone: i64, timestamp: i64, hp: i64) -> Record {
    Record::EnemyUpdate(EnemyUpdate {
        id: id.to_string(),
        x,
        y,
        zone_id: ZoneId(zone),
        timestamp,
        kind: "easy".to_string(),
        max_hp: 100,
        hp,
        direction: None,
    })
}
