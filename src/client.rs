use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{LinkplayError, Result};
use crate::group::GroupCache;
use crate::normalize::{normalize_payload, parse_meta_info, parse_sources};
use crate::protocol::Command;
use crate::tls::{build_clients, TlsClients};
use crate::transport::{AttemptError, HttpSender, RawPayload, ReqwestSender};
use crate::types::{MultiroomInfo, PlayMode, StatusSnapshot, TrackMetadata};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Client for one LinkPlay/WiiM speaker
///
/// The `LinkplayClient` owns the device [`Endpoint`] and sends every command
/// through its port/TLS fallback matrix. It knows nothing about polling; see
/// [`crate::Coordinator`] for that.
pub struct LinkplayClient {
    endpoint: Endpoint,
    sender: Arc<dyn HttpSender>,
    pub(crate) group: Mutex<GroupCache>,
}

impl LinkplayClient {
    /// Create a client for the device at `host`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use linkplay_multiroom::{ClientConfig, LinkplayClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = LinkplayClient::new("192.168.1.100", &ClientConfig::default())?;
    ///     client.set_volume(0.3).await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn new(host: impl Into<String>, config: &ClientConfig) -> Result<Self> {
        Ok(Self::from_clients(host, config, build_clients(config)?))
    }

    /// A client without a verifying TLS client starts out downgraded
    pub(crate) fn from_clients(host: impl Into<String>, config: &ClientConfig, clients: TlsClients) -> Self {
        let sender = ReqwestSender::new(clients);
        let can_verify = sender.can_verify();
        let client = Self::with_sender(host, config, Arc::new(sender));
        if !can_verify {
            client.endpoint.mark_verified_tls_failed();
        }
        client
    }

    /// Create a client that sends through the given [`HttpSender`]
    pub fn with_sender(host: impl Into<String>, config: &ClientConfig, sender: Arc<dyn HttpSender>) -> Self {
        let endpoint = Endpoint::new(host, config);
        let group = GroupCache::new(endpoint.host());
        Self {
            endpoint,
            sender,
            group: Mutex::new(group),
        }
    }

    /// Get the device host
    pub fn host(&self) -> &str {
        self.endpoint.host()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send a command, walking the fallback matrix until one attempt answers.
    ///
    /// A timeout or connection failure moves on to the next candidate. When
    /// every candidate fails the error reflects the last failure.
    pub async fn request(&self, command: &Command) -> Result<RawPayload> {
        let wire = command.wire();
        let host = self.endpoint.host();
        let mut last_err: Option<AttemptError> = None;
        let mut tried = Vec::new();

        for attempt in self.endpoint.attempts() {
            if attempt.verify_tls && self.endpoint.verified_tls_failed() {
                continue;
            }

            let url = self.endpoint.url(attempt.port, &wire);
            tracing::debug!(host = %host, "GET {} (verify_tls={})", url, attempt.verify_tls);

            match self.sender.get(&url, attempt.verify_tls).await {
                Ok(body) => {
                    tracing::debug!(host = %host, "{} -> {} bytes", url, body.len());
                    return RawPayload::parse(&body);
                }
                Err(e) => {
                    if attempt.verify_tls
                        && matches!(e, AttemptError::TlsVerification(_))
                        && self.endpoint.mark_verified_tls_failed()
                    {
                        tracing::warn!(
                            host = %host,
                            "TLS verification failed ({}); using unverified TLS from now on",
                            e
                        );
                    }
                    tracing::debug!(host = %host, "Request to {} failed: {}", url, e);
                    tried.push(format!("{} (verify_tls={})", url, attempt.verify_tls));
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(AttemptError::Timeout(e)) => Err(LinkplayError::Timeout(format!(
                "after trying {}: {}",
                tried.join(", "),
                e
            ))),
            Some(e) => Err(LinkplayError::Connection(format!(
                "after trying {}: {}",
                tried.join(", "),
                e
            ))),
            None => Err(LinkplayError::Connection(format!("no candidate ports for {}", host))),
        }
    }

    /// Send a command and return the JSON object it answered with
    pub(crate) async fn request_object(&self, command: &Command) -> Result<Map<String, Value>> {
        Ok(self.request(command).await?.into_object())
    }

    // ========== Status ==========

    /// Basic status (identity, Wi-Fi, firmware), normalized
    pub async fn get_status(&self) -> Result<StatusSnapshot> {
        let payload = self.request(&Command::GetStatus).await?;
        Ok(normalize_payload(&payload, Instant::now()))
    }

    /// Extended player status (playback, volume, position), normalized
    pub async fn get_player_status(&self) -> Result<StatusSnapshot> {
        let payload = self.request(&Command::GetPlayerStatus).await?;
        Ok(normalize_payload(&payload, Instant::now()))
    }

    /// Current track metadata including artwork
    pub async fn get_meta_info(&self) -> Result<TrackMetadata> {
        let raw = self.request_object(&Command::GetMetaInfo).await?;
        Ok(parse_meta_info(&raw))
    }

    /// Available input sources
    pub async fn get_sources(&self) -> Result<Vec<String>> {
        let raw = self.request_object(&Command::GetSources).await?;
        Ok(parse_sources(&raw))
    }

    /// Raw static device information
    pub async fn get_device_info(&self) -> Result<Map<String, Value>> {
        self.request_object(&Command::GetDeviceInfo).await
    }

    /// Multiroom membership as reported by the device
    pub async fn get_multiroom_info(&self) -> Result<MultiroomInfo> {
        let raw = self.request_object(&Command::GetSlaveList).await?;
        Ok(crate::group::parse_multiroom(&raw))
    }

    // ========== Playback ==========

    pub async fn play(&self) -> Result<()> {
        self.send(Command::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Command::Pause).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Command::Stop).await
    }

    pub async fn next_track(&self) -> Result<()> {
        self.send(Command::Next).await
    }

    pub async fn previous_track(&self) -> Result<()> {
        self.send(Command::Previous).await
    }

    /// Seek to a position in seconds
    pub async fn seek(&self, position: u32) -> Result<()> {
        self.send(Command::Seek(position)).await
    }

    pub async fn clear_playlist(&self) -> Result<()> {
        self.send(Command::ClearPlaylist).await
    }

    /// Set the combined repeat/shuffle mode
    pub async fn set_play_mode(&self, mode: PlayMode) -> Result<()> {
        self.send(Command::SetLoopMode(mode.loop_code())).await
    }

    /// Play preset slot 1-6
    pub async fn play_preset(&self, preset: u8) -> Result<()> {
        if !(1..=6).contains(&preset) {
            return Err(LinkplayError::InvalidArgument(format!(
                "preset must be between 1 and 6, got {}",
                preset
            )));
        }
        self.send(Command::PlayPreset(preset)).await
    }

    // ========== Volume ==========

    /// Set the volume in the 0.0-1.0 range
    pub async fn set_volume(&self, level: f32) -> Result<()> {
        self.send(Command::SetVolume(volume_percent(level)?)).await
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.send(Command::SetMute(mute)).await
    }

    // ========== Input ==========

    /// Switch to a named input source
    pub async fn select_source(&self, source: impl Into<String>) -> Result<()> {
        self.send(Command::SwitchSource(source.into())).await
    }

    // ========== Power / EQ / LED ==========

    /// Wake (`true`) or put into standby (`false`)
    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.send(Command::SetPower(on)).await
    }

    /// Flip the power state reported by the device.
    ///
    /// A device that reports no power field is treated as on, since it
    /// answered the status call.
    pub async fn toggle_power(&self) -> Result<()> {
        let power = match self.get_player_status().await?.power {
            Some(power) => Some(power),
            None => self.get_status().await?.power,
        };
        self.set_power(!power.unwrap_or(true)).await
    }

    pub async fn set_eq_preset(&self, preset: &str) -> Result<()> {
        if preset.trim().is_empty() {
            return Err(LinkplayError::InvalidArgument("EQ preset name is empty".into()));
        }
        self.send(Command::SetEqPreset(preset.trim().to_string())).await
    }

    /// Load a custom equalizer curve of exactly ten bands
    pub async fn set_eq_custom(&self, bands: &[i32]) -> Result<()> {
        if bands.len() != EQ_BANDS {
            return Err(LinkplayError::InvalidArgument(format!(
                "custom EQ needs {} bands, got {}",
                EQ_BANDS,
                bands.len()
            )));
        }
        self.send(Command::SetEqCustom(bands.to_vec())).await
    }

    /// Current equalizer settings as reported by the device
    pub async fn get_eq(&self) -> Result<Map<String, Value>> {
        self.request_object(&Command::GetEq).await
    }

    pub async fn set_led(&self, on: bool) -> Result<()> {
        self.send(Command::SetLed(on)).await
    }

    /// Status light brightness 0-100
    pub async fn set_led_brightness(&self, brightness: u8) -> Result<()> {
        if brightness > 100 {
            return Err(LinkplayError::InvalidArgument(format!(
                "LED brightness must be between 0 and 100, got {}",
                brightness
            )));
        }
        self.send(Command::SetLedBrightness(brightness)).await
    }

    // ========== Maintenance ==========

    pub async fn reboot(&self) -> Result<()> {
        self.send(Command::Reboot).await
    }

    /// Set the device clock; defaults to the current time
    pub async fn sync_time(&self, timestamp: Option<u64>) -> Result<()> {
        let ts = match timestamp {
            Some(ts) => ts,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };
        self.send(Command::TimeSync(ts)).await
    }

    pub(crate) async fn send(&self, command: Command) -> Result<()> {
        self.request(&command).await?;
        Ok(())
    }
}

const EQ_BANDS: usize = 10;

/// Convert a 0.0-1.0 level to the device's 0-100 scale
pub(crate) fn volume_percent(level: f32) -> Result<u8> {
    if !level.is_finite() || !(0.0..=1.0).contains(&level) {
        return Err(LinkplayError::InvalidArgument(format!(
            "volume must be between 0.0 and 1.0, got {}",
            level
        )));
    }
    Ok((level * 100.0).round() as u8)
}
