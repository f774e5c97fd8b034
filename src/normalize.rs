//! Raw status payloads to [`StatusSnapshot`].
//!
//! Firmware variants spell the same value differently (`vol`, `volume`,
//! `vol_level`), use different units (milliseconds vs seconds) and sometimes
//! hex-encode text. The mapping is split in two parts:
//!
//! - [`KEY_TABLE`]: raw key to canonical field. A field may have several raw
//!   spellings; they are tried in table order and the first one that converts
//!   cleanly wins.
//! - [`DERIVED`]: an ordered list of rules that fill the snapshot, each one
//!   reading canonical fields through the table.
//!
//! Supporting another firmware dialect is normally a new row in the table.
//! Raw keys that are not in the table are ignored.

use crate::transport::RawPayload;
use crate::types::{PlayMode, PlaybackState, StatusSnapshot, TrackMetadata};
use serde_json::{Map, Value};
use std::time::Instant;

/// Canonical fields a raw key can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PlayStatus,
    ApolloState,
    Volume,
    Mute,
    Power,
    Standby,
    LoopMode,
    PositionMs,
    PositionSecs,
    DurationMs,
    DurationSecs,
    NowPlaying,
    TitleHex,
    ArtistHex,
    AlbumHex,
    Title,
    Artist,
    Album,
    Artwork,
    Source,
    Sources,
    DeviceName,
    DeviceId,
    Model,
    Firmware,
    Mac,
    Preset,
    EqPreset,
    WifiRssi,
    WifiChannel,
}

/// Raw key to canonical field, in precedence order
pub const KEY_TABLE: &[(&str, Field)] = &[
    ("status", Field::PlayStatus),
    ("play_status", Field::PlayStatus),
    ("playstatus", Field::PlayStatus),
    ("apollo_state", Field::ApolloState),
    ("vol", Field::Volume),
    ("volume", Field::Volume),
    ("vol_level", Field::Volume),
    ("mute", Field::Mute),
    ("power", Field::Power),
    ("standby", Field::Standby),
    ("loop", Field::LoopMode),
    ("loop_mode", Field::LoopMode),
    ("curpos", Field::PositionMs),
    ("position", Field::PositionSecs),
    ("totlen", Field::DurationMs),
    ("duration", Field::DurationSecs),
    ("durpos", Field::DurationSecs),
    ("nowplaying", Field::NowPlaying),
    ("Title", Field::TitleHex),
    ("Artist", Field::ArtistHex),
    ("Album", Field::AlbumHex),
    ("title", Field::Title),
    ("artist", Field::Artist),
    ("album", Field::Album),
    ("cover", Field::Artwork),
    ("cover_url", Field::Artwork),
    ("albumart", Field::Artwork),
    ("pic_url", Field::Artwork),
    ("stream_type", Field::Source),
    ("source", Field::Source),
    ("sources", Field::Sources),
    ("DeviceName", Field::DeviceName),
    ("friendly_name", Field::DeviceName),
    ("device_name", Field::DeviceName),
    ("uuid", Field::DeviceId),
    ("device_id", Field::DeviceId),
    ("project", Field::Model),
    ("model_name", Field::Model),
    ("device_model", Field::Model),
    ("firmware", Field::Firmware),
    ("version", Field::Firmware),
    ("MAC", Field::Mac),
    ("mac", Field::Mac),
    ("preset_key", Field::Preset),
    ("preset", Field::Preset),
    ("eq_mode", Field::EqPreset),
    ("eq_preset", Field::EqPreset),
    ("eq", Field::EqPreset),
    ("RSSI", Field::WifiRssi),
    ("wifi_rssi", Field::WifiRssi),
    ("wifi_signal", Field::WifiRssi),
    ("rssi", Field::WifiRssi),
    ("WifiChannel", Field::WifiChannel),
    ("wifi_channel", Field::WifiChannel),
    ("wifichannel", Field::WifiChannel),
];

type Rule = fn(&Raw<'_>, &mut StatusSnapshot);

/// Rules applied in order to build a snapshot
pub const DERIVED: &[(&str, Rule)] = &[
    ("volume", derive_volume),
    ("mute", derive_mute),
    ("playback", derive_playback),
    ("power", derive_power),
    ("play_mode", derive_play_mode),
    ("track", derive_track),
    ("position", derive_position),
    ("identity", derive_identity),
    ("wifi", derive_wifi),
    ("source", derive_source),
];

/// Text values some firmware uses for "nothing"
const PLACEHOLDERS: &[&str] = &["unknow", "unknown", "un_known", "none", "null"];

/// A raw payload viewed through [`KEY_TABLE`]
pub struct Raw<'a> {
    map: &'a Map<String, Value>,
    captured_at: Instant,
}

impl<'a> Raw<'a> {
    /// Raw values for a field, in precedence order
    fn values(&self, field: Field) -> impl Iterator<Item = &'a Value> + '_ {
        KEY_TABLE
            .iter()
            .filter(move |(_, f)| *f == field)
            .filter_map(move |(key, _)| self.map.get(*key))
            .filter(|v| !v.is_null())
    }

    /// First raw value of a field that converts
    fn get<T>(&self, field: Field, convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
        self.values(field).find_map(convert)
    }

    fn has(&self, field: Field) -> bool {
        self.values(field).next().is_some()
    }

    fn int(&self, field: Field) -> Option<i64> {
        self.get(field, as_int)
    }

    fn text(&self, field: Field) -> Option<String> {
        self.get(field, as_text)
    }

    fn flag(&self, field: Field) -> Option<bool> {
        self.get(field, as_bool)
    }
}

/// Normalize one raw status object.
///
/// Pure: the same input and capture time always give an equal snapshot.
pub fn normalize(raw: &Map<String, Value>, captured_at: Instant) -> StatusSnapshot {
    let raw = Raw { map: raw, captured_at };
    let mut snapshot = StatusSnapshot::default();
    for (_, rule) in DERIVED {
        rule(&raw, &mut snapshot);
    }
    snapshot
}

/// Normalize a payload; non-object payloads give an empty snapshot
pub fn normalize_payload(payload: &RawPayload, captured_at: Instant) -> StatusSnapshot {
    match payload.as_object() {
        Some(map) => normalize(map, captured_at),
        None => StatusSnapshot::default(),
    }
}

/// Track metadata from a `getMetaInfo` response
pub fn parse_meta_info(raw: &Map<String, Value>) -> TrackMetadata {
    let meta = match raw.get("metaData").and_then(Value::as_object) {
        Some(meta) => meta,
        None => raw,
    };
    let field = |key: &str| meta.get(key).and_then(as_track_text);
    TrackMetadata {
        title: field("title"),
        artist: field("artist"),
        album: field("album"),
        artwork_url: field("albumArtURI").or_else(|| field("albumart")),
    }
}

/// Source names from a source list response
pub fn parse_sources(raw: &Map<String, Value>) -> Vec<String> {
    raw.get("sources").and_then(as_string_list).unwrap_or_default()
}

fn derive_volume(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.volume = raw.int(Field::Volume).map(|v| v.clamp(0, 100) as u8);
}

fn derive_mute(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.muted = raw.flag(Field::Mute);
}

fn derive_playback(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.playback = raw
        .text(Field::PlayStatus)
        .map(|word| PlaybackState::from_word(&word))
        .or_else(|| {
            raw.text(Field::ApolloState)
                .map(|state| PlaybackState::from_apollo_state(&state))
        });
}

fn derive_power(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.power = raw
        .flag(Field::Power)
        .or_else(|| raw.flag(Field::Standby).map(|standby| !standby));
}

fn derive_play_mode(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    if raw.has(Field::LoopMode) {
        let code = raw.int(Field::LoopMode).unwrap_or(4);
        s.play_mode = Some(PlayMode::from_loop_code(code));
    }
}

fn derive_track(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    let caret: Vec<Option<String>> = raw
        .text(Field::NowPlaying)
        .map(|line| line.splitn(3, '^').map(clean_track_text).collect())
        .unwrap_or_default();
    let part = |i: usize| caret.get(i).cloned().flatten();

    let pick = |hex: Field, index: usize, plain: Field| {
        raw.get(hex, as_hex_or_plain_text)
            .or_else(|| part(index))
            .or_else(|| if caret.is_empty() { raw.get(plain, as_track_text) } else { None })
    };

    s.track = TrackMetadata {
        title: pick(Field::TitleHex, 0, Field::Title),
        artist: pick(Field::ArtistHex, 1, Field::Artist),
        album: pick(Field::AlbumHex, 2, Field::Album),
        artwork_url: raw.get(Field::Artwork, as_track_text),
    };
}

fn derive_position(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.position = seconds(raw, Field::PositionMs, Field::PositionSecs);
    s.duration = seconds(raw, Field::DurationMs, Field::DurationSecs);
    if s.position.is_some() {
        s.position_captured_at = Some(raw.captured_at);
    }
}

fn seconds(raw: &Raw<'_>, millis: Field, secs: Field) -> Option<u64> {
    raw.int(millis)
        .map(|ms| ms.max(0) as u64 / 1000)
        .or_else(|| raw.int(secs).map(|s| s.max(0) as u64))
}

fn derive_identity(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.device_name = raw.text(Field::DeviceName);
    s.device_id = raw.text(Field::DeviceId);
    s.model = raw.text(Field::Model);
    s.firmware = raw.text(Field::Firmware);
    s.mac_address = raw.text(Field::Mac);
    s.preset = raw
        .int(Field::Preset)
        .and_then(|p| u32::try_from(p).ok());
    s.eq_preset = raw.text(Field::EqPreset);
}

fn derive_wifi(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.wifi_rssi = raw.int(Field::WifiRssi);
    s.wifi_channel = raw
        .int(Field::WifiChannel)
        .and_then(|c| u32::try_from(c).ok());
}

fn derive_source(raw: &Raw<'_>, s: &mut StatusSnapshot) {
    s.source = raw.text(Field::Source);
    s.sources = raw.get(Field::Sources, as_string_list);
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_track_text(value: &Value) -> Option<String> {
    value.as_str().and_then(clean_track_text)
}

/// Hex-encoded text, or the value itself when it is not hex at all
fn as_hex_or_plain_text(value: &Value) -> Option<String> {
    let text = value.as_str()?;
    match hex_bytes(text) {
        Some(bytes) => clean_track_text(&String::from_utf8_lossy(&bytes)),
        None => clean_track_text(text),
    }
}

fn as_string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    Some(items.iter().filter_map(as_text).collect())
}

fn clean_track_text(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || PLACEHOLDERS.contains(&text.to_ascii_lowercase().as_str()) {
        None
    } else {
        Some(text.to_string())
    }
}

/// Decode hex-encoded UTF-8, replacing invalid sequences.
///
/// Returns `None` for strings that are not hex at all.
pub fn decode_hex_text(hex: &str) -> Option<String> {
    let bytes = hex_bytes(hex)?;
    clean_track_text(&String::from_utf8_lossy(&bytes))
}

fn hex_bytes(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}
