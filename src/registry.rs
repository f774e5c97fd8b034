//! Shared lookups across device coordinators.
//!
//! [`GroupRegistry`] maps a master address to the latest roster it reported.
//! Each master's entry is written only by that master's own poll cycle and is
//! replaced wholesale, so readers always see one consistent cycle.
//!
//! [`DeviceRegistry`] maps an address to its [`Coordinator`] so group-level
//! operations can reach peer devices.

use crate::coordinator::Coordinator;
use crate::types::{Address, MultiroomInfo, PlaybackState, StatusSnapshot};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Group names the firmware reports when none was set
const PLACEHOLDER_NAMES: &[&str] = &["", "wiim group", "none", "null"];

/// Per-member attributes from the latest cycle
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MemberState {
    pub name: Option<String>,
    /// Volume 0-100
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub playback: Option<PlaybackState>,
}

/// Roster of one group, keyed by member address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupState {
    pub master: Address,
    pub name: Option<String>,
    /// Always contains the master itself
    pub members: BTreeMap<Address, MemberState>,
}

impl GroupState {
    pub fn member_addresses(&self) -> Vec<Address> {
        self.members.keys().cloned().collect()
    }

    /// Group name, or `"<prefix> <master>"` when the device reported a placeholder
    pub fn display_name(&self, prefix: &str) -> String {
        match &self.name {
            Some(name) if !PLACEHOLDER_NAMES.contains(&name.trim().to_ascii_lowercase().as_str()) => {
                name.trim().to_string()
            }
            _ => format!("{} {}", prefix, self.master),
        }
    }
}

/// Master address → latest group roster
#[derive(Clone, Default)]
pub struct GroupRegistry {
    groups: Arc<DashMap<Address, Arc<GroupState>>>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_group_by_master(&self, master: &str) -> Option<Arc<GroupState>> {
        self.groups.get(master).map(|entry| entry.value().clone())
    }

    pub fn groups(&self) -> Vec<Arc<GroupState>> {
        self.groups.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Record one cycle's view from the device at `master`.
    ///
    /// An entry is created the first time the device reports slaves. After
    /// that the roster is replaced every cycle: the master plus whatever
    /// slaves were reported, so members that left are pruned. Returns the
    /// stored entry, if any.
    pub fn update(
        &self,
        master: &str,
        snapshot: &StatusSnapshot,
        info: &MultiroomInfo,
    ) -> Option<Arc<GroupState>> {
        let reports_slaves = !info.is_slave() && (info.slave_count > 0 || !info.slaves.is_empty());
        if !reports_slaves && !self.groups.contains_key(master) {
            return None;
        }

        let mut members = BTreeMap::new();
        members.insert(
            master.to_string(),
            MemberState {
                name: snapshot.device_name.clone(),
                volume: snapshot.volume,
                muted: snapshot.muted,
                playback: snapshot.playback,
            },
        );
        if reports_slaves {
            for slave in &info.slaves {
                members.insert(
                    slave.address.clone(),
                    MemberState {
                        name: slave.name.clone(),
                        volume: slave.volume,
                        muted: slave.muted,
                        // slaves play whatever the master plays
                        playback: snapshot.playback,
                    },
                );
            }
        }

        let state = Arc::new(GroupState {
            master: master.to_string(),
            name: snapshot.device_name.clone(),
            members,
        });
        tracing::debug!(
            master = %master,
            "Group roster: {:?}",
            state.members.keys().collect::<Vec<_>>()
        );
        self.groups.insert(master.to_string(), state.clone());
        Some(state)
    }
}

/// Address → coordinator, for resolving group peers
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<DashMap<Address, Arc<Coordinator>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, coordinator: Arc<Coordinator>) {
        self.devices.insert(coordinator.host().to_string(), coordinator);
    }

    pub fn remove(&self, address: &str) -> Option<Arc<Coordinator>> {
        self.devices.remove(address).map(|(_, coordinator)| coordinator)
    }

    pub fn get(&self, address: &str) -> Option<Arc<Coordinator>> {
        self.devices.get(address).map(|entry| entry.value().clone())
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.devices.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlaveEntry;

    const MASTER: &str = "192.168.1.10";

    fn slave(address: &str, volume: u8) -> SlaveEntry {
        SlaveEntry {
            address: address.to_string(),
            name: None,
            volume: Some(volume),
            muted: Some(false),
        }
    }

    fn reporting(slaves: Vec<SlaveEntry>) -> MultiroomInfo {
        MultiroomInfo {
            slave_count: slaves.len(),
            slaves,
            ..MultiroomInfo::default()
        }
    }

    #[test]
    fn solo_device_creates_no_entry() {
        let registry = GroupRegistry::new();
        assert!(registry
            .update(MASTER, &StatusSnapshot::default(), &MultiroomInfo::default())
            .is_none());
        assert!(registry.get_group_by_master(MASTER).is_none());
    }

    #[test]
    fn members_no_longer_reported_are_pruned() {
        let registry = GroupRegistry::new();
        let snapshot = StatusSnapshot {
            playback: Some(PlaybackState::Playing),
            volume: Some(40),
            ..StatusSnapshot::default()
        };

        registry.update(MASTER, &snapshot, &reporting(vec![slave("A", 10), slave("B", 20)]));
        let group = registry.get_group_by_master(MASTER).unwrap();
        assert_eq!(group.member_addresses(), vec!["192.168.1.10", "A", "B"]);
        assert_eq!(group.members["A"].playback, Some(PlaybackState::Playing));

        registry.update(MASTER, &snapshot, &reporting(vec![slave("A", 15)]));
        let group = registry.get_group_by_master(MASTER).unwrap();
        assert_eq!(group.member_addresses(), vec!["192.168.1.10", "A"]);
        assert_eq!(group.members["A"].volume, Some(15));
        assert_eq!(group.members[MASTER].volume, Some(40));
    }

    #[test]
    fn stale_group_keeps_only_master() {
        let registry = GroupRegistry::new();
        registry.update(MASTER, &StatusSnapshot::default(), &reporting(vec![slave("A", 10)]));
        registry.update(MASTER, &StatusSnapshot::default(), &MultiroomInfo::default());

        let group = registry.get_group_by_master(MASTER).unwrap();
        assert_eq!(group.member_addresses(), vec![MASTER]);
    }

    #[test]
    fn placeholder_names_fall_back_to_master() {
        let mut group = GroupState {
            master: MASTER.to_string(),
            name: Some("WiiM Group".into()),
            members: BTreeMap::new(),
        };
        assert_eq!(group.display_name("WiiM Group"), "WiiM Group 192.168.1.10");
        group.name = Some(" Living Room ".into());
        assert_eq!(group.display_name("WiiM Group"), "Living Room");
    }
}
