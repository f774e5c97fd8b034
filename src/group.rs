//! Multiroom group protocol.
//!
//! The client keeps a small cache of who it believes the group master is and,
//! when it is the master, which slaves it has. Role is derived from that cache
//! alone. The cache is updated by the group commands themselves and by the
//! membership readings of the poll cycle. Every group command bumps a
//! generation counter; a reading taken before the latest command is stale and
//! is not applied.

use crate::client::{volume_percent, LinkplayClient};
use crate::error::{LinkplayError, Result};
use crate::protocol::Command;
use crate::types::{Address, MultiroomInfo, Role, SlaveEntry};
use serde_json::{Map, Value};

/// Locally cached view of this device's group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupCache {
    local: Address,
    master: Option<Address>,
    slaves: Vec<Address>,
    generation: u64,
}

impl GroupCache {
    pub fn new(local: impl Into<Address>) -> Self {
        Self {
            local: local.into(),
            master: None,
            slaves: Vec::new(),
            generation: 0,
        }
    }

    pub fn role(&self) -> Role {
        match &self.master {
            Some(master) if *master == self.local => Role::Master,
            Some(_) => Role::Guest,
            None => Role::Solo,
        }
    }

    /// Bumped by every group command
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn become_master(&mut self) {
        self.master = Some(self.local.clone());
        self.slaves.clear();
        self.generation += 1;
    }

    fn follow(&mut self, master: &str) {
        self.master = Some(master.to_string());
        self.slaves.clear();
        self.generation += 1;
    }

    fn clear(&mut self) {
        self.master = None;
        self.slaves.clear();
        self.generation += 1;
    }
}

impl LinkplayClient {
    /// Role derived from the cached group view
    pub fn role(&self) -> Role {
        self.group.lock().role()
    }

    /// Cached master address, if any
    pub fn group_master(&self) -> Option<Address> {
        self.group.lock().master.clone()
    }

    /// Cached slave addresses; empty unless this device is the master
    pub fn group_slaves(&self) -> Vec<Address> {
        let cache = self.group.lock();
        if cache.role() == Role::Master {
            cache.slaves.clone()
        } else {
            Vec::new()
        }
    }

    /// Make this device a master with no slaves
    pub async fn create_group(&self) -> Result<()> {
        self.send(Command::CreateGroup).await?;
        self.group.lock().become_master();
        tracing::info!(host = %self.host(), "Created group");
        Ok(())
    }

    /// Dissolve the group, or leave it when this device is a slave
    pub async fn delete_group(&self) -> Result<()> {
        let role = self.role();
        match role {
            Role::Solo => {
                return Err(LinkplayError::Domain(format!(
                    "{} is not part of a multiroom group",
                    self.host()
                )))
            }
            Role::Master => self.send(Command::Ungroup).await?,
            Role::Guest => self.send(Command::LeaveGroup).await?,
        }
        self.group.lock().clear();
        tracing::info!(host = %self.host(), "Deleted group (was {})", role);
        Ok(())
    }

    /// Join the group mastered by `master`, leaving any current group first
    pub async fn join_group(&self, master: &str) -> Result<()> {
        if self.role() != Role::Solo {
            // forced rejoin; a failed leave does not block the join
            if let Err(e) = self.leave_group().await {
                tracing::debug!(host = %self.host(), "Ignoring leave failure before join: {}", e);
            }
        }

        self.send(Command::JoinGroup(master.to_string())).await?;
        self.group.lock().follow(master);
        tracing::info!(host = %self.host(), "Joined group of {}", master);
        Ok(())
    }

    /// Leave the current group
    ///
    /// The local cache is cleared even when the device call fails.
    pub async fn leave_group(&self) -> Result<()> {
        let result = self.send(Command::LeaveGroup).await;
        self.group.lock().clear();
        result
    }

    /// Remove a slave from this device's group
    pub async fn kick_member(&self, address: &str) -> Result<()> {
        self.require_master("kick a member")?;
        self.send(Command::KickSlave(address.to_string())).await?;
        let mut cache = self.group.lock();
        cache.slaves.retain(|s| s != address);
        cache.generation += 1;
        Ok(())
    }

    /// Mute or unmute one slave of this device's group
    pub async fn mute_member(&self, address: &str, mute: bool) -> Result<()> {
        self.require_master("mute a member")?;
        self.send(Command::SlaveMute(address.to_string(), mute)).await
    }

    /// Set one slave's volume, 0.0-1.0
    pub async fn slave_volume(&self, address: &str, level: f32) -> Result<()> {
        self.require_master("set a member's volume")?;
        let volume = volume_percent(level)?;
        self.send(Command::SlaveVolume(address.to_string(), volume)).await
    }

    /// Current group cache generation
    pub fn group_generation(&self) -> u64 {
        self.group.lock().generation
    }

    /// Fold a membership reading from the poll cycle into the cache.
    ///
    /// `generation` is the cache generation from before the reading was
    /// requested. If a group command has run since, the reading is dropped and
    /// `false` is returned.
    pub(crate) fn sync_from_observation(&self, info: &MultiroomInfo, generation: u64) -> bool {
        let mut cache = self.group.lock();
        if cache.generation != generation {
            tracing::debug!(host = %self.host(), "Ignoring membership reading older than the last group command");
            return false;
        }
        match info.role() {
            Role::Master => {
                cache.master = Some(cache.local.clone());
                cache.slaves = info.slaves.iter().map(|s| s.address.clone()).collect();
            }
            Role::Guest => {
                if let Some(master) = &info.master_address {
                    cache.master = Some(master.clone());
                }
                cache.slaves.clear();
            }
            Role::Solo => {
                cache.master = None;
                cache.slaves.clear();
            }
        }
        true
    }

    fn require_master(&self, action: &str) -> Result<()> {
        if self.role() == Role::Master {
            Ok(())
        } else {
            Err(LinkplayError::Domain(format!(
                "{} must be the group master to {}",
                self.host(),
                action
            )))
        }
    }
}

/// Parse a `multiroom:getSlaveList` response
pub fn parse_multiroom(raw: &Map<String, Value>) -> MultiroomInfo {
    let slaves: Vec<SlaveEntry> = raw
        .get("slave_list")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(parse_slave).collect())
        .unwrap_or_default();

    let reported = raw.get("slaves").and_then(count);
    let slave_count = reported.unwrap_or(slaves.len());

    MultiroomInfo {
        slave_count,
        slaves,
        master_uuid: non_empty(raw.get("master_uuid")),
        master_address: non_empty(raw.get("master_ip")),
    }
}

fn parse_slave(entry: &Value) -> Option<SlaveEntry> {
    let obj = entry.as_object()?;
    let address = non_empty(obj.get("ip"))?;
    Some(SlaveEntry {
        address,
        name: non_empty(obj.get("name")),
        volume: obj
            .get("volume")
            .and_then(count)
            .map(|v| v.min(100) as u8),
        muted: obj.get("mute").and_then(count).map(|m| m != 0),
    })
}

/// Non-negative integer from a number or numeric string
fn count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::ScriptedSender;
    use crate::config::ClientConfig;
    use crate::transport::AttemptError;
    use serde_json::json;

    const LOCAL: &str = "192.168.1.20";

    fn client(sender: std::sync::Arc<ScriptedSender>) -> LinkplayClient {
        let config = ClientConfig {
            ports: vec![443],
            ..ClientConfig::default()
        };
        LinkplayClient::with_sender(LOCAL, &config, sender)
    }

    fn commands(sender: &ScriptedSender) -> Vec<String> {
        sender
            .calls()
            .into_iter()
            .map(|(url, _)| url.split("command=").nth(1).unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn role_follows_cached_master() {
        let mut cache = GroupCache::new(LOCAL);
        assert_eq!(cache.role(), Role::Solo);
        cache.become_master();
        assert_eq!(cache.role(), Role::Master);
        cache.master = Some("192.168.1.30".into());
        assert_eq!(cache.role(), Role::Guest);
    }

    #[test]
    fn parses_slave_list() {
        let raw = json!({
            "slaves": 2,
            "slave_list": [
                {"name": "Kitchen", "ip": "192.168.1.31", "volume": 30, "mute": 0},
                {"name": "Den", "ip": "192.168.1.32", "volume": "55", "mute": "1"},
                {"name": "broken"}
            ]
        });
        let info = parse_multiroom(raw.as_object().unwrap());
        assert_eq!(info.slave_count, 2);
        assert_eq!(info.slaves.len(), 2);
        assert_eq!(info.slaves[1].volume, Some(55));
        assert_eq!(info.slaves[1].muted, Some(true));
        assert_eq!(info.role(), Role::Master);
    }

    #[test]
    fn slave_marker_means_guest() {
        let raw = json!({"slaves": "0", "master_uuid": "FF31F09E", "master_ip": "192.168.1.10"});
        let info = parse_multiroom(raw.as_object().unwrap());
        assert_eq!(info.role(), Role::Guest);
        assert_eq!(info.master_address.as_deref(), Some("192.168.1.10"));

        let info = parse_multiroom(json!({"slaves": 0}).as_object().unwrap());
        assert_eq!(info.role(), Role::Solo);
    }

    #[tokio::test]
    async fn delete_group_when_solo_is_a_domain_error() {
        let sender = ScriptedSender::new(vec![]);
        let err = client(sender.clone()).delete_group().await.unwrap_err();
        assert!(matches!(err, LinkplayError::Domain(_)));
        assert!(sender.calls().is_empty());
    }

    #[tokio::test]
    async fn kick_and_mute_require_master() {
        let sender = ScriptedSender::new(vec![Ok("OK".into()), Ok("OK".into()), Ok("OK".into())]);
        let client = client(sender.clone());

        assert!(matches!(client.kick_member("192.168.1.31").await, Err(LinkplayError::Domain(_))));
        assert!(matches!(client.mute_member("192.168.1.31", true).await, Err(LinkplayError::Domain(_))));

        client.create_group().await.unwrap();
        client.mute_member("192.168.1.31", true).await.unwrap();
        client.slave_volume("192.168.1.31", 0.25).await.unwrap();
        assert_eq!(
            commands(&sender),
            vec![
                "setMultiroom:Master",
                "multiroom:SlaveMute:192.168.1.31:1",
                "multiroom:SlaveVolume:192.168.1.31:25",
            ]
        );
    }

    #[tokio::test]
    async fn join_while_slave_leaves_first_and_swallows_failure() {
        // leave fails on both attempts of port 443, join succeeds
        let sender = ScriptedSender::new(vec![
            Err(AttemptError::Connect("refused".into())),
            Err(AttemptError::Connect("refused".into())),
            Ok("OK".into()),
        ]);
        let client = client(sender.clone());
        client.group.lock().master = Some("192.168.1.10".into());

        client.join_group("192.168.1.11").await.unwrap();

        assert_eq!(
            commands(&sender),
            vec![
                "multiroom:LeaveGroup",
                "multiroom:LeaveGroup",
                "ConnectMasterAp:JoinGroupMaster:eth192.168.1.11:wifi0.0.0.0",
            ]
        );
        assert_eq!(client.role(), Role::Guest);
        assert_eq!(client.group_master().as_deref(), Some("192.168.1.11"));
    }

    #[tokio::test]
    async fn leave_clears_cache_even_on_failure() {
        let sender = ScriptedSender::new(vec![]);
        let client = client(sender);
        client.group.lock().become_master();

        assert!(client.leave_group().await.is_err());
        assert_eq!(client.role(), Role::Solo);
        assert!(client.group_master().is_none());
    }

    #[test]
    fn solo_reading_clears_cache() {
        let client = client(ScriptedSender::new(vec![]));
        let master = parse_multiroom(
            json!({"slaves": 1, "slave_list": [{"ip": "192.168.1.31"}]})
                .as_object()
                .unwrap(),
        );
        assert!(client.sync_from_observation(&master, client.group_generation()));
        assert_eq!(client.group_slaves(), vec!["192.168.1.31".to_string()]);

        assert!(client.sync_from_observation(&MultiroomInfo::default(), client.group_generation()));
        assert_eq!(client.role(), Role::Solo);
        assert!(client.group_slaves().is_empty());
    }

    #[tokio::test]
    async fn reading_older_than_a_group_command_is_dropped() {
        let sender = ScriptedSender::new(vec![Ok("OK".into())]);
        let client = client(sender);
        let before = client.group_generation();

        client.create_group().await.unwrap();
        assert!(!client.sync_from_observation(&MultiroomInfo::default(), before));
        assert_eq!(client.role(), Role::Master);
    }
}
