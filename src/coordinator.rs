use crate::client::LinkplayClient;
use crate::config::{ClientConfig, PollConfig};
use crate::error::{LinkplayError, Result};
use crate::poll::PollState;
use crate::registry::{GroupRegistry, GroupState};
use crate::types::{MultiroomInfo, PlayMode, Repeat, Role, StatusSnapshot, TrackMetadata};
use futures_util::future::try_join3;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::time::sleep;

/// Everything published after one successful poll cycle
///
/// A new value is built every cycle; consumers never see a partially updated
/// state.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceState {
    pub snapshot: StatusSnapshot,
    pub role: Role,
    pub multiroom: MultiroomInfo,
    pub sources: Vec<String>,
    /// This device's entry in the group registry, when it masters a group
    pub group: Option<Arc<GroupState>>,
    #[serde(skip)]
    pub updated_at: Instant,
}

/// Values carried from one cycle to the next
#[derive(Default)]
struct CycleCache {
    /// Title seen by the cycle that last fetched metadata
    metadata_title: Option<String>,
    metadata: Option<TrackMetadata>,
    sources: Option<Vec<String>>,
}

struct LoopHandle {
    stop_tx: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

/// Poll coordinator for one device
///
/// Runs poll cycles against a [`LinkplayClient`], publishes [`DeviceState`]
/// to subscribers, keeps the [`GroupRegistry`] entry of this device current
/// and backs off while the device is unreachable. Commands issued through
/// the coordinator force a refresh once they complete.
///
/// # Example
///
/// ```no_run
/// use linkplay_multiroom::{ClientConfig, Coordinator, GroupRegistry, PollConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let groups = GroupRegistry::new();
///     let coordinator = Arc::new(Coordinator::connect(
///         "192.168.1.100",
///         &ClientConfig::default(),
///         PollConfig::default(),
///         groups,
///     )?);
///
///     let mut updates = coordinator.subscribe();
///     coordinator.start();
///
///     while updates.changed().await.is_ok() {
///         if let Some(state) = updates.borrow().clone() {
///             println!("{} is {}", coordinator.host(), state.role);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Coordinator {
    client: Arc<LinkplayClient>,
    config: PollConfig,
    groups: GroupRegistry,
    poll: parking_lot::Mutex<PollState>,
    // one cycle at a time per device
    cycle: tokio::sync::Mutex<CycleCache>,
    state_tx: watch::Sender<Option<Arc<DeviceState>>>,
    handle: parking_lot::Mutex<Option<LoopHandle>>,
}

impl Coordinator {
    pub fn new(client: LinkplayClient, config: PollConfig, groups: GroupRegistry) -> Self {
        let (state_tx, _) = watch::channel(None);
        Self {
            client: Arc::new(client),
            poll: parking_lot::Mutex::new(PollState::new(&config)),
            config,
            groups,
            cycle: tokio::sync::Mutex::new(CycleCache::default()),
            state_tx,
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Build a client for `host` and wrap it in a coordinator
    pub fn connect(
        host: impl Into<String>,
        client_config: &ClientConfig,
        config: PollConfig,
        groups: GroupRegistry,
    ) -> Result<Self> {
        let client = LinkplayClient::new(host, client_config)?;
        Ok(Self::new(client, config, groups))
    }

    pub fn host(&self) -> &str {
        self.client.host()
    }

    pub fn client(&self) -> &LinkplayClient {
        &self.client
    }

    pub fn groups(&self) -> &GroupRegistry {
        &self.groups
    }

    /// Latest published state, if any cycle has succeeded yet
    pub fn state(&self) -> Option<Arc<DeviceState>> {
        self.state_tx.borrow().clone()
    }

    /// Receive every newly published state
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<DeviceState>>> {
        self.state_tx.subscribe()
    }

    pub fn poll_state(&self) -> PollState {
        self.poll.lock().clone()
    }

    /// Delay before the next scheduled cycle
    pub fn poll_interval(&self) -> Duration {
        self.poll.lock().current_interval
    }

    /// Run one poll cycle now.
    ///
    /// Waits for any cycle already in flight, then runs a fresh one. Failure
    /// is reported as [`LinkplayError::UpdateFailed`] and moves the backoff;
    /// the cycle itself never retries.
    pub async fn refresh(&self) -> Result<Arc<DeviceState>> {
        let mut cache = self.cycle.lock().await;
        match self.run_cycle(&mut cache).await {
            Ok(state) => {
                self.poll.lock().record_success();
                self.state_tx.send_replace(Some(state.clone()));
                Ok(state)
            }
            Err(e) => {
                let next = self.poll.lock().record_failure();
                tracing::warn!(host = %self.host(), "Update failed: {} (next poll in {:?})", e, next);
                Err(LinkplayError::UpdateFailed(e.to_string()))
            }
        }
    }

    async fn run_cycle(&self, cache: &mut CycleCache) -> Result<Arc<DeviceState>> {
        let generation = self.client.group_generation();
        let (basic, extended, multiroom) = try_join3(
            self.client.get_status(),
            self.client.get_player_status(),
            self.client.get_multiroom_info(),
        )
        .await?;

        let mut snapshot = extended.merged_over(&basic);

        let title = snapshot.track.title.clone();
        if cache.metadata.is_none() || cache.metadata_title != title {
            cache.metadata = match self.client.get_meta_info().await {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::debug!(host = %self.host(), "Failed to fetch metadata: {}", e);
                    None
                }
            };
            cache.metadata_title = title;
        }
        if let Some(meta) = &cache.metadata {
            snapshot = snapshot.with_metadata(meta);
        }

        if snapshot.sources.is_none() {
            if cache.sources.is_none() {
                match self.client.get_sources().await {
                    Ok(sources) => cache.sources = Some(sources),
                    Err(e) => {
                        tracing::debug!(host = %self.host(), "Failed to fetch source list: {}", e)
                    }
                }
            }
            if let Some(sources) = &cache.sources {
                snapshot = snapshot.with_sources(sources.clone());
            }
        }

        let role = multiroom.role();
        self.client.sync_from_observation(&multiroom, generation);
        let group = self.groups.update(self.host(), &snapshot, &multiroom);

        tracing::debug!(
            host = %self.host(),
            "Cycle ok: role={} playback={:?} volume={:?}",
            role,
            snapshot.playback,
            snapshot.volume
        );

        Ok(Arc::new(DeviceState {
            sources: snapshot.sources.clone().unwrap_or_default(),
            snapshot,
            role,
            multiroom,
            group,
            updated_at: Instant::now(),
        }))
    }

    /// Start the background poll loop.
    ///
    /// A running loop is replaced. The loop holds only a weak reference, so
    /// dropping the last `Arc` ends it after the current cycle.
    pub fn start(self: &Arc<Self>) {
        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let weak = Arc::downgrade(self);
        let host = self.host().to_string();

        let task = tokio::spawn(async move {
            loop {
                let Some(this) = weak.upgrade() else {
                    break;
                };
                // failures are already logged and counted by refresh
                let _ = this.refresh().await;
                let wait = this.poll_interval();
                drop(this);

                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!(host = %host, "Polling stopped");
                        break;
                    }
                    _ = sleep(wait) => {}
                }
            }
        });

        let previous = self.handle.lock().replace(LoopHandle { stop_tx, task });
        if let Some(previous) = previous {
            let _ = previous.stop_tx.send(());
        }
        tracing::info!(host = %self.host(), "Polling started");
    }

    /// Stop the background poll loop.
    ///
    /// An in-flight cycle is allowed to finish; this waits briefly for it.
    pub async fn stop(&self) {
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(());
            let _ = tokio::time::timeout(Duration::from_millis(500), handle.task).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.task.is_finished())
            .unwrap_or(false)
    }

    /// Log a command failure, or refresh after a success
    async fn finish(&self, action: &str, result: Result<()>) -> Result<()> {
        if let Err(e) = result {
            if e.is_transport() {
                tracing::error!(host = %self.host(), "Failed to {}: {}", action, e);
            } else {
                tracing::warn!(host = %self.host(), "Refused to {}: {}", action, e);
            }
            return Err(e);
        }
        if let Err(e) = self.refresh().await {
            tracing::warn!(host = %self.host(), "Refresh after {} failed: {}", action, e);
        }
        Ok(())
    }

    // ========== Playback ==========

    pub async fn play(&self) -> Result<()> {
        self.finish("play", self.client.play().await).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.finish("pause", self.client.pause().await).await
    }

    pub async fn stop_playback(&self) -> Result<()> {
        self.finish("stop", self.client.stop().await).await
    }

    pub async fn next_track(&self) -> Result<()> {
        self.finish("skip to next track", self.client.next_track().await)
            .await
    }

    pub async fn previous_track(&self) -> Result<()> {
        self.finish("skip to previous track", self.client.previous_track().await)
            .await
    }

    pub async fn seek(&self, position: u32) -> Result<()> {
        self.finish("seek", self.client.seek(position).await).await
    }

    pub async fn play_preset(&self, preset: u8) -> Result<()> {
        self.finish("play preset", self.client.play_preset(preset).await)
            .await
    }

    pub async fn select_source(&self, source: impl Into<String>) -> Result<()> {
        self.finish("select source", self.client.select_source(source).await)
            .await
    }

    pub async fn set_play_mode(&self, mode: PlayMode) -> Result<()> {
        self.finish("set play mode", self.client.set_play_mode(mode).await)
            .await
    }

    /// Change repeat, keeping the current shuffle setting
    pub async fn set_repeat(&self, repeat: Repeat) -> Result<()> {
        let current = self.current_play_mode();
        self.set_play_mode(PlayMode::compose(repeat, current.shuffle()))
            .await
    }

    /// Change shuffle, keeping the current repeat setting
    pub async fn set_shuffle(&self, shuffle: bool) -> Result<()> {
        let current = self.current_play_mode();
        self.set_play_mode(PlayMode::compose(current.repeat(), shuffle))
            .await
    }

    fn current_play_mode(&self) -> PlayMode {
        self.state()
            .and_then(|s| s.snapshot.play_mode)
            .unwrap_or(PlayMode::Normal)
    }

    // ========== Volume ==========

    pub async fn set_volume(&self, level: f32) -> Result<()> {
        self.finish("set volume", self.client.set_volume(level).await)
            .await
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        self.finish("set mute", self.client.set_mute(mute).await).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.step_volume(self.config.volume_step).await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.step_volume(-self.config.volume_step).await
    }

    async fn step_volume(&self, delta: f32) -> Result<()> {
        let current = match self.state().and_then(|s| s.snapshot.volume_level()) {
            Some(level) => level,
            None => self
                .client
                .get_player_status()
                .await?
                .volume_level()
                .unwrap_or(0.0),
        };
        self.set_volume((current + delta).clamp(0.0, 1.0)).await
    }

    // ========== Power / EQ / LED ==========

    pub async fn set_power(&self, on: bool) -> Result<()> {
        self.finish("set power", self.client.set_power(on).await).await
    }

    pub async fn toggle_power(&self) -> Result<()> {
        self.finish("toggle power", self.client.toggle_power().await)
            .await
    }

    pub async fn set_eq_preset(&self, preset: &str) -> Result<()> {
        self.finish("set EQ preset", self.client.set_eq_preset(preset).await)
            .await
    }

    pub async fn set_eq_custom(&self, bands: &[i32]) -> Result<()> {
        self.finish("set custom EQ", self.client.set_eq_custom(bands).await)
            .await
    }

    pub async fn set_led(&self, on: bool) -> Result<()> {
        self.finish("set LED", self.client.set_led(on).await).await
    }

    pub async fn set_led_brightness(&self, brightness: u8) -> Result<()> {
        self.finish(
            "set LED brightness",
            self.client.set_led_brightness(brightness).await,
        )
        .await
    }

    // ========== Maintenance ==========

    pub async fn reboot(&self) -> Result<()> {
        let result = self.client.reboot().await;
        if let Err(e) = &result {
            tracing::error!(host = %self.host(), "Failed to reboot: {}", e);
        }
        result
    }

    pub async fn sync_time(&self, timestamp: Option<u64>) -> Result<()> {
        self.finish("sync time", self.client.sync_time(timestamp).await)
            .await
    }

    // ========== Grouping ==========

    pub async fn create_group(&self) -> Result<()> {
        self.finish("create group", self.client.create_group().await)
            .await
    }

    pub async fn delete_group(&self) -> Result<()> {
        self.finish("delete group", self.client.delete_group().await)
            .await
    }

    pub async fn join_group(&self, master: &str) -> Result<()> {
        self.finish("join group", self.client.join_group(master).await)
            .await
    }

    pub async fn leave_group(&self) -> Result<()> {
        self.finish("leave group", self.client.leave_group().await)
            .await
    }

    pub async fn kick_member(&self, address: &str) -> Result<()> {
        self.finish("kick member", self.client.kick_member(address).await)
            .await
    }

    pub async fn mute_member(&self, address: &str, mute: bool) -> Result<()> {
        self.finish("mute member", self.client.mute_member(address, mute).await)
            .await
    }

    pub async fn slave_volume(&self, address: &str, level: f32) -> Result<()> {
        self.finish(
            "set member volume",
            self.client.slave_volume(address, level).await,
        )
        .await
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            let _ = handle.stop_tx.send(());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Scheme;
    use crate::transport::{AttemptError, HttpSender};
    use crate::types::PlaybackState;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::{HashMap, VecDeque};

    type Reply = std::result::Result<String, AttemptError>;

    /// Sender answering by command; the last queued reply for a command repeats
    #[derive(Default)]
    pub(crate) struct RoutedSender {
        routes: Mutex<HashMap<String, VecDeque<Reply>>>,
        calls: Mutex<Vec<String>>,
    }

    impl RoutedSender {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn on(&self, command: &str, reply: Value) {
            self.push(command, Ok(reply.to_string()));
        }

        pub fn push(&self, command: &str, reply: Reply) {
            self.routes
                .lock()
                .entry(command.to_string())
                .or_default()
                .push_back(reply);
        }

        /// Replace every queued reply for a command
        pub fn set(&self, command: &str, reply: Reply) {
            self.routes
                .lock()
                .insert(command.to_string(), VecDeque::from([reply]));
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        pub fn count(&self, command: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.as_str() == command).count()
        }
    }

    #[async_trait]
    impl HttpSender for RoutedSender {
        async fn get(&self, url: &str, _verify_tls: bool) -> Reply {
            let command = url.split("command=").nth(1).unwrap_or_default().to_string();
            self.calls.lock().push(command.clone());
            let mut routes = self.routes.lock();
            match routes.get_mut(&command) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) if !queue.is_empty() => queue[0].clone(),
                _ => Err(AttemptError::Connect(format!("no route for {}", command))),
            }
        }
    }

    pub(crate) fn plain_config() -> ClientConfig {
        ClientConfig {
            scheme: Scheme::Http,
            ports: vec![80],
            ..ClientConfig::default()
        }
    }

    pub(crate) fn coordinator(host: &str, sender: Arc<RoutedSender>, groups: GroupRegistry) -> Coordinator {
        let client = LinkplayClient::with_sender(host, &plain_config(), sender);
        Coordinator::new(client, PollConfig::default(), groups)
    }

    pub(crate) fn solo_device(sender: &RoutedSender) {
        sender.on("getStatusEx", json!({"DeviceName": "Den", "uuid": "FF98F09C"}));
        sender.on("getPlayerStatusEx", json!({"status": "play", "vol": "30", "mute": "0"}));
        sender.on("multiroom:getSlaveList", json!({"slaves": 0}));
        sender.on("getMetaInfo", json!({"metaData": {"title": "Song", "artist": "Band"}}));
        sender.on("getSourceList", json!({"sources": ["wifi", "bluetooth"]}));
    }

    #[tokio::test]
    async fn cycle_merges_and_publishes() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());
        let mut updates = coordinator.subscribe();

        let state = coordinator.refresh().await.unwrap();
        assert_eq!(state.role, Role::Solo);
        assert_eq!(state.snapshot.device_name.as_deref(), Some("Den"));
        assert_eq!(state.snapshot.volume, Some(30));
        assert_eq!(state.snapshot.playback, Some(PlaybackState::Playing));
        assert_eq!(state.snapshot.track.artist.as_deref(), Some("Band"));
        assert_eq!(state.sources, vec!["wifi", "bluetooth"]);

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().as_ref().unwrap().snapshot.volume, Some(30));
    }

    #[tokio::test]
    async fn one_failed_call_fails_the_whole_cycle() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set("multiroom:getSlaveList", Err(AttemptError::Timeout("slow".into())));
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, LinkplayError::UpdateFailed(_)));
        assert!(coordinator.state().is_none());
        assert_eq!(sender.count("getMetaInfo"), 0);
        assert_eq!(coordinator.poll_state().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn metadata_is_refetched_only_when_title_changes() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());

        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();
        assert_eq!(sender.count("getMetaInfo"), 1);

        sender.set("getPlayerStatusEx", Ok(json!({"status": "play", "title": "Other"}).to_string()));
        coordinator.refresh().await.unwrap();
        assert_eq!(sender.count("getMetaInfo"), 2);
    }

    #[tokio::test]
    async fn source_list_failure_is_not_fatal_and_success_is_cached() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set("getSourceList", Err(AttemptError::Connect("refused".into())));
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());

        let state = coordinator.refresh().await.unwrap();
        assert!(state.sources.is_empty());

        sender.set("getSourceList", Ok(json!({"sources": ["line-in"]}).to_string()));
        coordinator.refresh().await.unwrap();
        coordinator.refresh().await.unwrap();
        assert_eq!(sender.count("getSourceList"), 2);
        assert_eq!(coordinator.state().unwrap().sources, vec!["line-in"]);
    }

    #[tokio::test]
    async fn master_cycle_fills_group_registry() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set(
            "multiroom:getSlaveList",
            Ok(json!({"slaves": 1, "slave_list": [{"ip": "192.168.1.31", "volume": 12, "mute": 1}]}).to_string()),
        );
        let groups = GroupRegistry::new();
        let coordinator = coordinator("192.168.1.20", sender, groups.clone());

        let state = coordinator.refresh().await.unwrap();
        assert_eq!(state.role, Role::Master);
        assert_eq!(coordinator.client().group_slaves(), vec!["192.168.1.31".to_string()]);

        let group = groups.get_group_by_master("192.168.1.20").unwrap();
        assert_eq!(group.member_addresses(), vec!["192.168.1.20", "192.168.1.31"]);
        assert_eq!(group.members["192.168.1.31"].muted, Some(true));
        assert_eq!(state.group.as_deref(), Some(&*group));
    }

    #[tokio::test]
    async fn join_while_slave_of_other_master() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set(
            "multiroom:getSlaveList",
            Ok(json!({"slaves": 0, "master_uuid": "AA01", "master_ip": "192.168.1.10"}).to_string()),
        );
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.client().group_master().as_deref(), Some("192.168.1.10"));

        sender.set("multiroom:LeaveGroup", Err(AttemptError::Connect("refused".into())));
        sender.on("ConnectMasterAp:JoinGroupMaster:eth192.168.1.11:wifi0.0.0.0", json!("OK"));
        sender.set(
            "multiroom:getSlaveList",
            Ok(json!({"slaves": 0, "master_uuid": "BB02", "master_ip": "192.168.1.11"}).to_string()),
        );

        coordinator.join_group("192.168.1.11").await.unwrap();

        let calls = sender.calls();
        let leave = calls.iter().position(|c| c == "multiroom:LeaveGroup").unwrap();
        let join = calls
            .iter()
            .position(|c| c.starts_with("ConnectMasterAp:JoinGroupMaster"))
            .unwrap();
        assert!(leave < join);
        assert_eq!(coordinator.state().unwrap().role, Role::Guest);
        assert_eq!(coordinator.client().role(), Role::Guest);
        assert_eq!(coordinator.client().group_master().as_deref(), Some("192.168.1.11"));
    }

    #[tokio::test]
    async fn solo_reading_after_guest_clears_cached_group() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set(
            "multiroom:getSlaveList",
            Ok(json!({"slaves": 0, "master_uuid": "AA", "master_ip": "192.168.1.10"}).to_string()),
        );
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.client().role(), Role::Guest);

        // ungrouped from elsewhere
        sender.set("multiroom:getSlaveList", Ok(json!({"slaves": 0}).to_string()));
        let state = coordinator.refresh().await.unwrap();
        assert_eq!(state.role, Role::Solo);
        assert_eq!(coordinator.client().role(), Role::Solo);

        let err = coordinator.delete_group().await.unwrap_err();
        assert!(matches!(err, LinkplayError::Domain(_)));
        assert_eq!(sender.count("multiroom:LeaveGroup"), 0);
    }

    #[tokio::test]
    async fn published_state_serializes_without_instants() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.set(
            "getPlayerStatusEx",
            Ok(json!({"status": "play", "vol": "30", "curpos": "4000"}).to_string()),
        );
        let coordinator = coordinator("192.168.1.20", sender, GroupRegistry::new());
        let state = coordinator.refresh().await.unwrap();

        let value = serde_json::to_value(&*state).unwrap();
        assert_eq!(value["role"], json!("solo"));
        assert_eq!(value["snapshot"]["volume"], json!(30));
        assert_eq!(value["snapshot"]["position"], json!(4));
        assert!(value["snapshot"].get("position_captured_at").is_none());
        assert!(value.get("updated_at").is_none());
    }

    #[tokio::test]
    async fn led_brightness_is_checked_before_sending() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.on("setLEDBrightness:60", json!("OK"));
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());

        assert!(matches!(
            coordinator.set_led_brightness(101).await,
            Err(LinkplayError::InvalidArgument(_))
        ));
        coordinator.set_led_brightness(60).await.unwrap();
        assert_eq!(sender.count("setLEDBrightness:60"), 1);
        assert_eq!(sender.count("getStatusEx"), 1);
    }

    #[tokio::test]
    async fn failed_command_is_returned_without_refresh() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());

        assert!(matches!(coordinator.play().await, Err(LinkplayError::Connection(_))));
        assert_eq!(sender.count("getStatusEx"), 0);

        sender.on("setPlayerCmd:pause", json!("OK"));
        coordinator.pause().await.unwrap();
        assert_eq!(sender.count("getStatusEx"), 1);
    }

    #[tokio::test]
    async fn volume_up_steps_from_last_state() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        sender.on("setPlayerCmd:vol:35", json!("OK"));
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());
        coordinator.refresh().await.unwrap();

        coordinator.volume_up().await.unwrap();
        assert!(sender.calls().contains(&"setPlayerCmd:vol:35".to_string()));
    }

    #[tokio::test]
    async fn backoff_grows_and_resets() {
        let sender = RoutedSender::new();
        let coordinator = coordinator("192.168.1.20", sender.clone(), GroupRegistry::new());
        for _ in 0..3 {
            assert!(coordinator.refresh().await.is_err());
        }
        assert_eq!(coordinator.poll_interval(), Duration::from_secs(10));

        solo_device(&sender);
        coordinator.refresh().await.unwrap();
        assert_eq!(coordinator.poll_interval(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_polls_on_interval_until_stopped() {
        let sender = RoutedSender::new();
        solo_device(&sender);
        let coordinator = Arc::new(coordinator("192.168.1.20", sender.clone(), GroupRegistry::new()));

        coordinator.start();
        assert!(coordinator.is_running());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sender.count("getStatusEx"), 3);

        coordinator.stop().await;
        assert!(!coordinator.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sender.count("getStatusEx"), 3);
    }
}
