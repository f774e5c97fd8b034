use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Device address (IP or hostname)
pub type Address = String;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Map a raw state word: `play`/`playing` and `pause`/`paused` are
    /// recognised, everything else is stopped.
    pub fn from_word(word: &str) -> Self {
        match word.trim().to_ascii_lowercase().as_str() {
            "play" | "playing" => PlaybackState::Playing,
            "pause" | "paused" => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    /// Derive a state from the vendor "apollo state" string by substring
    pub fn from_apollo_state(state: &str) -> Self {
        let state = state.to_ascii_lowercase();
        if state.contains("playing") {
            PlaybackState::Playing
        } else if state.contains("pause") {
            PlaybackState::Paused
        } else {
            PlaybackState::Stopped
        }
    }
}

/// Combined repeat/shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    RepeatAll,
    RepeatOne,
    ShuffleRepeatAll,
    Shuffle,
    Normal,
}

impl PlayMode {
    /// Map the vendor loop code. Codes outside 0-3 are `Normal`.
    pub fn from_loop_code(code: i64) -> Self {
        match code {
            0 => PlayMode::RepeatAll,
            1 => PlayMode::RepeatOne,
            2 => PlayMode::ShuffleRepeatAll,
            3 => PlayMode::Shuffle,
            _ => PlayMode::Normal,
        }
    }

    /// Vendor loop code for this mode
    pub fn loop_code(&self) -> u8 {
        match self {
            PlayMode::RepeatAll => 0,
            PlayMode::RepeatOne => 1,
            PlayMode::ShuffleRepeatAll => 2,
            PlayMode::Shuffle => 3,
            PlayMode::Normal => 4,
        }
    }

    pub fn shuffle(&self) -> bool {
        matches!(self, PlayMode::Shuffle | PlayMode::ShuffleRepeatAll)
    }

    pub fn repeat(&self) -> Repeat {
        match self {
            PlayMode::RepeatOne => Repeat::One,
            PlayMode::RepeatAll | PlayMode::ShuffleRepeatAll => Repeat::All,
            PlayMode::Shuffle | PlayMode::Normal => Repeat::Off,
        }
    }

    /// Recombine a repeat setting with a shuffle flag.
    ///
    /// The device has no code for shuffle with repeat-one; shuffle wins there.
    pub fn compose(repeat: Repeat, shuffle: bool) -> Self {
        match (repeat, shuffle) {
            (Repeat::All, true) => PlayMode::ShuffleRepeatAll,
            (Repeat::All, false) => PlayMode::RepeatAll,
            (Repeat::One, false) => PlayMode::RepeatOne,
            (Repeat::One, true) | (Repeat::Off, true) => PlayMode::Shuffle,
            (Repeat::Off, false) => PlayMode::Normal,
        }
    }
}

/// Repeat axis of [`PlayMode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Off,
    One,
    All,
}

/// Role of a device in a multiroom topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Solo,
    Master,
    /// Slave of another device's group
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Solo => "solo",
            Role::Master => "master",
            Role::Guest => "guest",
        };
        f.write_str(name)
    }
}

/// Title, artist, album and artwork of the current track
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
}

impl TrackMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.artist.is_none() && self.album.is_none() && self.artwork_url.is_none()
    }
}

/// Canonical device status
///
/// Every firmware dialect produces this record. Fields the device did not
/// report are `None`. Snapshots are never edited in place; a new one is built
/// each poll cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub playback: Option<PlaybackState>,
    /// Volume 0-100
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub power: Option<bool>,
    pub source: Option<String>,
    pub play_mode: Option<PlayMode>,
    /// Position in seconds
    pub position: Option<u64>,
    /// Duration in seconds
    pub duration: Option<u64>,
    /// When `position` was read
    #[serde(skip)]
    pub position_captured_at: Option<Instant>,
    pub track: TrackMetadata,
    pub device_name: Option<String>,
    pub device_id: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub mac_address: Option<String>,
    pub preset: Option<u32>,
    pub eq_preset: Option<String>,
    /// Wi-Fi signal in dBm
    pub wifi_rssi: Option<i64>,
    pub wifi_channel: Option<u32>,
    pub sources: Option<Vec<String>>,
}

impl StatusSnapshot {
    /// Volume in the 0.0-1.0 display range
    pub fn volume_level(&self) -> Option<f32> {
        self.volume.map(|v| f32::from(v) / 100.0)
    }

    /// Combine two snapshots field by field; `self` wins where it has a value
    pub fn merged_over(&self, base: &StatusSnapshot) -> StatusSnapshot {
        // position and its capture time travel together
        let (position, position_captured_at) = if self.position.is_some() {
            (self.position, self.position_captured_at)
        } else {
            (base.position, base.position_captured_at)
        };

        StatusSnapshot {
            playback: self.playback.or(base.playback),
            volume: self.volume.or(base.volume),
            muted: self.muted.or(base.muted),
            power: self.power.or(base.power),
            source: self.source.clone().or_else(|| base.source.clone()),
            play_mode: self.play_mode.or(base.play_mode),
            position,
            duration: self.duration.or(base.duration),
            position_captured_at,
            track: TrackMetadata {
                title: self.track.title.clone().or_else(|| base.track.title.clone()),
                artist: self.track.artist.clone().or_else(|| base.track.artist.clone()),
                album: self.track.album.clone().or_else(|| base.track.album.clone()),
                artwork_url: self
                    .track
                    .artwork_url
                    .clone()
                    .or_else(|| base.track.artwork_url.clone()),
            },
            device_name: self.device_name.clone().or_else(|| base.device_name.clone()),
            device_id: self.device_id.clone().or_else(|| base.device_id.clone()),
            model: self.model.clone().or_else(|| base.model.clone()),
            firmware: self.firmware.clone().or_else(|| base.firmware.clone()),
            mac_address: self.mac_address.clone().or_else(|| base.mac_address.clone()),
            preset: self.preset.or(base.preset),
            eq_preset: self.eq_preset.clone().or_else(|| base.eq_preset.clone()),
            wifi_rssi: self.wifi_rssi.or(base.wifi_rssi),
            wifi_channel: self.wifi_channel.or(base.wifi_channel),
            sources: self.sources.clone().or_else(|| base.sources.clone()),
        }
    }

    /// Copy with the given track metadata filled in where this snapshot has none
    pub fn with_metadata(&self, meta: &TrackMetadata) -> StatusSnapshot {
        let mut next = self.clone();
        next.track = TrackMetadata {
            title: meta.title.clone().or_else(|| self.track.title.clone()),
            artist: meta.artist.clone().or_else(|| self.track.artist.clone()),
            album: meta.album.clone().or_else(|| self.track.album.clone()),
            artwork_url: meta.artwork_url.clone().or_else(|| self.track.artwork_url.clone()),
        };
        next
    }

    /// Copy with a source list attached
    pub fn with_sources(&self, sources: Vec<String>) -> StatusSnapshot {
        let mut next = self.clone();
        next.sources = Some(sources);
        next
    }

    /// Extrapolated playback position at `now`, clamped to the duration
    pub fn position_at(&self, now: Instant) -> Option<u64> {
        let position = self.position?;
        if self.playback != Some(PlaybackState::Playing) {
            return Some(position);
        }
        let elapsed = self
            .position_captured_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::ZERO);
        let estimate = position + elapsed.as_secs();
        Some(match self.duration {
            Some(duration) if duration > 0 => estimate.min(duration),
            _ => estimate,
        })
    }
}

/// One slave as reported by the master's slave list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveEntry {
    pub address: Address,
    pub name: Option<String>,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
}

/// Multiroom membership as reported by one device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MultiroomInfo {
    pub slave_count: usize,
    pub slaves: Vec<SlaveEntry>,
    /// Present when the device reports that it is itself a slave
    pub master_uuid: Option<String>,
    pub master_address: Option<Address>,
}

impl MultiroomInfo {
    pub fn is_slave(&self) -> bool {
        self.master_uuid.is_some() || self.master_address.is_some()
    }

    /// Role derived from the response shape
    pub fn role(&self) -> Role {
        if self.is_slave() {
            Role::Guest
        } else if self.slave_count > 0 {
            Role::Master
        } else {
            Role::Solo
        }
    }
}
