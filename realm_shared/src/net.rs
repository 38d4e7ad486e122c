//! Networking primitives.
//!
//! Goals:
//! - Decode inbound server batches into a closed set of typed records.
//! - Encode the two outbound messages (input and spawn intent).
//! - Provide a persistent duplex channel (TCP, length-prefixed frames).
//!
//! Every inbound frame carries one batch: a JSON list of `{kind, data}`
//! records. Older servers spell the tag `type` and use a few
//! different field names; both spellings are accepted.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

/// Frames larger than this are rejected instead of allocated.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Server-defined spatial partition id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── Inbound payloads ───

/// One zone of the world map, as announced in the welcome handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneDescriptor {
    #[serde(alias = "id")]
    pub zone_id: ZoneId,
    #[serde(alias = "tilemapRef", default)]
    pub map_ref: String,
    pub world_x: f32,
    pub world_y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    #[serde(alias = "playerId")]
    pub local_id: String,
    #[serde(default)]
    pub zones: Vec<ZoneDescriptor>,
}

/// The four zones the server currently considers relevant to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveZoneSet {
    #[serde(alias = "currentZoneId")]
    pub current: ZoneId,
    #[serde(alias = "xAxisZoneId")]
    pub x_axis: ZoneId,
    #[serde(alias = "yAxisZoneId")]
    pub y_axis: ZoneId,
    #[serde(alias = "diagonalZoneId")]
    pub diagonal: ZoneId,
}

impl ActiveZoneSet {
    pub fn new(current: i64, x_axis: i64, y_axis: i64, diagonal: i64) -> Self {
        Self {
            current: ZoneId(current),
            x_axis: ZoneId(x_axis),
            y_axis: ZoneId(y_axis),
            diagonal: ZoneId(diagonal),
        }
    }

    pub fn slots(&self) -> [ZoneId; 4] {
        [self.current, self.x_axis, self.y_axis, self.diagonal]
    }

    /// True when `zone` occupies any of the four slots.
    pub fn contains(&self, zone: ZoneId) -> bool {
        self.slots().contains(&zone)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(alias = "playerId")]
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub zone_id: ZoneId,
    pub timestamp: i64,
    pub max_hp: i64,
    pub hp: i64,
    #[serde(default)]
    pub max_ap: i64,
    #[serde(default)]
    pub ap: i64,
    #[serde(default)]
    pub game_xp: i64,
    #[serde(default)]
    pub game_level: u32,
    #[serde(default)]
    pub game_xp_on_current_level: i64,
    #[serde(default)]
    pub game_xp_total_for_next_level: i64,
    #[serde(default)]
    pub direction: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyUpdate {
    #[serde(alias = "enemyId")]
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub zone_id: ZoneId,
    pub timestamp: i64,
    #[serde(alias = "type", default)]
    pub kind: String,
    pub max_hp: i64,
    pub hp: i64,
    #[serde(default)]
    pub direction: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbilityEffect {
    #[serde(alias = "ability")]
    pub ability_name: String,
    pub caster_id: String,
    pub impact_x: f32,
    pub impact_y: f32,
    #[serde(default)]
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegraphWarning {
    pub caster_id: String,
    pub impact_x: f32,
    pub impact_y: f32,
    pub radius: f32,
    #[serde(alias = "duration")]
    pub duration_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelUp {
    pub new_level: u32,
    #[serde(rename = "newATK", alias = "newAtk", default)]
    pub new_atk: i64,
    #[serde(default)]
    pub game_xp_on_current_level: i64,
    #[serde(default)]
    pub game_xp_total_for_next_level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDisconnected {
    #[serde(alias = "playerId")]
    pub id: String,
}

/// One decoded inbound record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Welcome(Welcome),
    ActiveZoneSet(ActiveZoneSet),
    PlayerUpdate(PlayerUpdate),
    EnemyUpdate(EnemyUpdate),
    AbilityEffect(AbilityEffect),
    TelegraphWarning(TelegraphWarning),
    LevelUp(LevelUp),
    PlayerDisconnected(PlayerDisconnected),
    /// A tag this client has no handler for.
    Unrecognized { kind: String },
}

impl Record {
    /// The canonical tag for this record.
    pub fn kind(&self) -> &str {
        match self {
            Record::Welcome(_) => "welcome",
            Record::ActiveZoneSet(_) => "activeZoneSet",
            Record::PlayerUpdate(_) => "playerUpdate",
            Record::EnemyUpdate(_) => "enemyUpdate",
            Record::AbilityEffect(_) => "abilityEffect",
            Record::TelegraphWarning(_) => "telegraphWarning",
            Record::LevelUp(_) => "levelUp",
            Record::PlayerDisconnected(_) => "playerDisconnected",
            Record::Unrecognized { kind } => kind,
        }
    }

    /// Encodes as a `{kind, data}` object.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        let data = match self {
            Record::Welcome(d) => serde_json::to_value(d)?,
            Record::ActiveZoneSet(d) => serde_json::to_value(d)?,
            Record::PlayerUpdate(d) => serde_json::to_value(d)?,
            Record::EnemyUpdate(d) => serde_json::to_value(d)?,
            Record::AbilityEffect(d) => serde_json::to_value(d)?,
            Record::TelegraphWarning(d) => serde_json::to_value(d)?,
            Record::LevelUp(d) => serde_json::to_value(d)?,
            Record::PlayerDisconnected(d) => serde_json::to_value(d)?,
            Record::Unrecognized { .. } => Value::Null,
        };
        Ok(serde_json::json!({ "kind": self.kind(), "data": data }))
    }

    fn from_value(v: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut obj) = v else {
            return Err(ProtocolError::MissingKind);
        };
        let kind = match obj.get("kind").or_else(|| obj.get("type")) {
            Some(Value::String(k)) => k.clone(),
            _ => return Err(ProtocolError::MissingKind),
        };
        let data = obj.remove("data").unwrap_or(Value::Null);

        fn payload<T: serde::de::DeserializeOwned>(
            kind: &str,
            data: Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(data).map_err(|source| ProtocolError::BadPayload {
                kind: kind.to_string(),
                source,
            })
        }

        let record = match kind.as_str() {
            "welcome" => Record::Welcome(payload(&kind, data)?),
            "activeZoneSet" | "activeZones" => Record::ActiveZoneSet(payload(&kind, data)?),
            "playerUpdate" => Record::PlayerUpdate(payload(&kind, data)?),
            "enemyUpdate" => Record::EnemyUpdate(payload(&kind, data)?),
            "abilityEffect" => Record::AbilityEffect(payload(&kind, data)?),
            "telegraphWarning" => Record::TelegraphWarning(payload(&kind, data)?),
            "levelUp" => Record::LevelUp(payload(&kind, data)?),
            "playerDisconnected" => Record::PlayerDisconnected(payload(&kind, data)?),
            other => Record::Unrecognized {
                kind: other.to_string(),
            },
        };
        Ok(record)
    }
}

/// Inbound decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("batch is not a list (got {0})")]
    NotAList(&'static str),
    #[error("record has no kind tag")]
    MissingKind,
    #[error("bad {kind} payload: {source}")]
    BadPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decodes one inbound batch.
///
/// The outer `Err` means the whole payload is unusable (not JSON, or not a
/// list). Inner errors belong to single records; the caller skips those and
/// keeps applying the rest in order.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<Result<Record, ProtocolError>>, ProtocolError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Array(items) = value else {
        return Err(ProtocolError::NotAList(json_type_name(&value)));
    };
    Ok(items.into_iter().map(Record::from_value).collect())
}

/// Encodes records as a batch payload.
pub fn encode_batch(records: &[Record]) -> serde_json::Result<Vec<u8>> {
    let items = records
        .iter()
        .map(Record::to_json)
        .collect::<serde_json::Result<Vec<_>>>()?;
    serde_json::to_vec(&Value::Array(items))
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─── Outbound ───

bitflags::bitflags! {
    /// Movement and action keys held during one input step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Keys: u8 {
        const UP = 1 << 0;
        const LEFT = 1 << 1;
        const DOWN = 1 << 2;
        const RIGHT = 1 << 3;
        const ACTION = 1 << 4;
    }
}

/// Wire form of [`Keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyState {
    pub up: bool,
    pub left: bool,
    pub down: bool,
    pub right: bool,
    pub action: bool,
}

impl From<Keys> for KeyState {
    fn from(k: Keys) -> Self {
        Self {
            up: k.contains(Keys::UP),
            left: k.contains(Keys::LEFT),
            down: k.contains(Keys::DOWN),
            right: k.contains(Keys::RIGHT),
            action: k.contains(Keys::ACTION),
        }
    }
}

/// Character the player chose to enter the world with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterSelection {
    pub character_type: String,
    pub character_id: u64,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum Outbound {
    Input { keys: KeyState },
    SpawnIntent(CharacterSelection),
}

impl Outbound {
    pub fn encode(&self) -> anyhow::Result<Bytes> {
        let payload = serde_json::to_vec(self).context("serialize outbound msg")?;
        Ok(Bytes::from(payload))
    }
}

// ─── Transport ───

async fn write_frame<W: AsyncWriteExt + Unpin>(w: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    anyhow::ensure!(payload.len() <= MAX_FRAME_LEN, "frame too large: {} bytes", payload.len());
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    w.write_all(&buf).await.context("tcp write")?;
    Ok(())
}

async fn read_frame<R: AsyncReadExt + Unpin>(r: &mut R) -> anyhow::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame too large: {len} bytes");
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await.context("tcp read payload")?;
    Ok(Bytes::from(payload))
}

/// Reliable duplex connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct FramedConn {
    stream: TcpStream,
}

impl FramedConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await.context("tcp connect")?;
        stream.set_nodelay(true).context("tcp nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.stream, payload).await
    }

    pub async fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.stream).await
    }

    /// Sends a batch of records as one frame.
    pub async fn send_batch(&mut self, records: &[Record]) -> anyhow::Result<()> {
        let payload = encode_batch(records).context("serialize batch")?;
        self.send_frame(&payload).await
    }

    /// Receives one frame and decodes it as an outbound client message.
    pub async fn recv_outbound(&mut self) -> anyhow::Result<Outbound> {
        let frame = self.recv_frame().await?;
        serde_json::from_slice(&frame).context("deserialize outbound msg")
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned halves so reads can run in their
    /// own task while the owner keeps writing.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (r, w) = self.stream.into_split();
        (FrameReader { half: r }, FrameWriter { half: w })
    }
}

/// Read half of a [`FramedConn`].
#[derive(Debug)]
pub struct FrameReader {
    half: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv_frame(&mut self) -> anyhow::Result<Bytes> {
        read_frame(&mut self.half).await
    }
}

/// Write half of a [`FramedConn`].
#[derive(Debug)]
pub struct FrameWriter {
    half: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        write_frame(&mut self.half, payload).await
    }

    pub async fn send(&mut self, msg: &Outbound) -> anyhow::Result<()> {
        let payload = msg.encode()?;
        self.send_frame(&payload).await
    }
}

/// TCP listener producing [`FramedConn`]s.
pub struct FrameListener {
    listener: TcpListener,
}

impl FrameListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(FramedConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((FramedConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_one(json: &str) -> Result<Record, ProtocolError> {
        let mut batch = decode_batch(json.as_bytes()).unwrap();
        assert_eq!(batch.len(), 1);
        batch.remove(0)
    }

    #[test]
    fn non_list_batch_is_rejected_whole() {
        let err = decode_batch(br#"{"kind":"welcome","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAList("object")));
        assert!(matches!(decode_batch(b"not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn unknown_kind_is_unrecognized() {
        let rec = decode_one(r#"[{"kind":"weather","data":{"rain":true}}]"#).unwrap();
        assert_eq!(rec, Record::Unrecognized { kind: "weather".into() });
    }

    #[test]
    fn legacy_type_tag_and_field_names() {
        let rec = decode_one(
            r#"[{"type":"enemyUpdate","data":{"enemyId":"e1","x":1,"y":2,"zoneId":7,
                "timestamp":1000,"type":"easy","maxHp":10,"hp":10}}]"#,
        )
        .unwrap();
        let Record::EnemyUpdate(u) = rec else {
            panic!("expected enemy update, got {rec:?}");
        };
        assert_eq!(u.id, "e1");
        assert_eq!(u.kind, "easy");
        assert_eq!(u.zone_id, ZoneId(7));
        assert_eq!(u.direction, None);
    }

    #[test]
    fn legacy_active_zones_names() {
        let rec = decode_one(
            r#"[{"type":"activeZones","data":{"currentZoneId":5,"xAxisZoneId":6,
                "yAxisZoneId":7,"diagonalZoneId":8}}]"#,
        )
        .unwrap();
        assert_eq!(rec, Record::ActiveZoneSet(ActiveZoneSet::new(5, 6, 7, 8)));
    }

    #[test]
    fn bad_payload_only_fails_that_record() {
        let batch = decode_batch(
            br#"[{"kind":"activeZoneSet","data":{"current":"x"}},
                 {"kind":"playerDisconnected","data":{"id":"p1"}},
                 {"data":{}}]"#,
        )
        .unwrap();
        assert!(matches!(&batch[0], Err(ProtocolError::BadPayload { kind, .. }) if kind == "activeZoneSet"));
        assert!(matches!(&batch[1], Ok(Record::PlayerDisconnected(_))));
        assert!(matches!(&batch[2], Err(ProtocolError::MissingKind)));
    }

    #[test]
    fn welcome_accepts_tilemap_names() {
        let rec = decode_one(
            r#"[{"kind":"welcome","data":{"playerId":"p9","zones":[
                {"id":1,"tilemapRef":"yield_fields_1","worldX":0,"worldY":8192}]}}]"#,
        )
        .unwrap();
        let Record::Welcome(w) = rec else {
            panic!("expected welcome");
        };
        assert_eq!(w.local_id, "p9");
        assert_eq!(w.zones[0].map_ref, "yield_fields_1");
        assert_eq!(w.zones[0].world_y, 8192.0);
    }

    #[test]
    fn encoded_batch_decodes_with_same_records() {
        let records = vec![
            Record::ActiveZoneSet(ActiveZoneSet::new(1, 2, 3, 4)),
            Record::LevelUp(LevelUp {
                new_level: 3,
                new_atk: 12,
                game_xp_on_current_level: 5,
                game_xp_total_for_next_level: 40,
            }),
        ];
        let bytes = encode_batch(&records).unwrap();
        let back: Vec<Record> = decode_batch(&bytes)
            .unwrap()
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(back, records);
    }

    #[test]
    fn input_wire_shape() {
        let msg = Outbound::Input {
            keys: (Keys::UP | Keys::ACTION).into(),
        };
        let v: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(v["kind"], "input");
        assert_eq!(v["data"]["keys"]["up"], true);
        assert_eq!(v["data"]["keys"]["left"], false);
        assert_eq!(v["data"]["keys"]["action"], true);
    }

    #[test]
    fn spawn_intent_wire_shape() {
        let msg = Outbound::SpawnIntent(CharacterSelection {
            character_type: "gotchi".into(),
            character_id: 4242,
        });
        let v: Value = serde_json::from_slice(&msg.encode().unwrap()).unwrap();
        assert_eq!(v["kind"], "spawnIntent");
        assert_eq!(v["data"]["characterId"], 4242);
    }

    #[tokio::test]
    async fn framed_conn_carries_batches_and_outbound() -> anyhow::Result<()> {
        let listener = FrameListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        let (client, accepted) = tokio::join!(FramedConn::connect(addr), listener.accept());
        let (mut server, _) = accepted?;
        let (mut reader, mut writer) = client?.into_split();

        server
            .send_batch(&[Record::PlayerDisconnected(PlayerDisconnected { id: "p1".into() })])
            .await?;
        let frame = reader.recv_frame().await?;
        let batch = decode_batch(&frame)?;
        assert!(matches!(&batch[0], Ok(Record::PlayerDisconnected(p)) if p.id == "p1"));

        let input = Outbound::Input {
            keys: Keys::LEFT.into(),
        };
        writer.send(&input).await?;
        assert_eq!(server.recv_outbound().await?, input);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() -> anyhow::Result<()> {
        let listener = FrameListener::bind("127.0.0.1:0".parse()?).await?;
        let addr = listener.local_addr()?;
        let (client, accepted) = tokio::join!(FramedConn::connect(addr), listener.accept());
        let _server = accepted?;
        let mut client = client?;
        let big = vec![b' '; MAX_FRAME_LEN + 1];
        assert!(client.send_frame(&big).await.is_err());
        Ok(())
    }

    #[test]
    fn active_set_membership_ignores_slot() {
        let set = ActiveZoneSet::new(6, 7, 8, 9);
        assert!(set.contains(ZoneId(9)));
        assert!(!set.contains(ZoneId(5)));
    }
}
