//! One logical player for a whole multiroom group.
//!
//! State is read from the master's [`GroupRegistry`] entry; commands are sent
//! to every member whose coordinator is present in the [`DeviceRegistry`].

use crate::client::volume_percent;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::registry::{DeviceRegistry, GroupRegistry, GroupState};
use crate::types::{Address, PlaybackState};
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;

/// Prefix used when the group has no usable name
pub const DEFAULT_GROUP_PREFIX: &str = "WiiM Group";

pub struct GroupPlayer {
    master: Address,
    groups: GroupRegistry,
    devices: DeviceRegistry,
}

impl GroupPlayer {
    pub fn new(master: impl Into<Address>, groups: GroupRegistry, devices: DeviceRegistry) -> Self {
        Self {
            master: master.into(),
            groups,
            devices,
        }
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    /// Latest roster, if the master has reported one
    pub fn group(&self) -> Option<Arc<GroupState>> {
        self.groups.get_group_by_master(&self.master)
    }

    pub fn members(&self) -> Vec<Address> {
        self.group().map(|g| g.member_addresses()).unwrap_or_default()
    }

    pub fn name(&self) -> String {
        let base = match self.group() {
            Some(group) => group.display_name(DEFAULT_GROUP_PREFIX),
            None => format!("{} {}", DEFAULT_GROUP_PREFIX, self.master),
        };
        format!("{} (Group)", base)
    }

    /// Playing if any member plays, paused if all are paused, else stopped
    pub fn playback(&self) -> PlaybackState {
        let Some(group) = self.group() else {
            return PlaybackState::Stopped;
        };
        let states: Vec<PlaybackState> = group.members.values().filter_map(|m| m.playback).collect();
        if states.contains(&PlaybackState::Playing) {
            PlaybackState::Playing
        } else if !states.is_empty() && states.iter().all(|s| *s == PlaybackState::Paused) {
            PlaybackState::Paused
        } else {
            PlaybackState::Stopped
        }
    }

    /// Loudest member volume, 0.0-1.0
    pub fn volume_level(&self) -> f32 {
        self.group()
            .and_then(|g| g.members.values().map(|m| m.volume.unwrap_or(0)).max())
            .map(|v| f32::from(v) / 100.0)
            .unwrap_or(0.0)
    }

    /// True only when every member is muted; `None` without members
    pub fn is_muted(&self) -> Option<bool> {
        let group = self.group()?;
        if group.members.is_empty() {
            return None;
        }
        Some(group.members.values().all(|m| m.muted == Some(true)))
    }

    /// Set the group volume.
    ///
    /// The loudest member moves to `level` and every other member moves by the
    /// same amount, clamped to 0-100.
    pub async fn set_volume(&self, level: f32) -> Result<()> {
        let target = i32::from(volume_percent(level)?);
        let Some(group) = self.group() else {
            return Ok(());
        };
        let Some(loudest) = group.members.values().map(|m| m.volume.unwrap_or(0)).max() else {
            return Ok(());
        };
        let delta = target - i32::from(loudest);

        let changes: Vec<(Address, f32)> = group
            .members
            .iter()
            .map(|(address, member)| {
                let next = (i32::from(member.volume.unwrap_or(0)) + delta).clamp(0, 100);
                (address.clone(), next as f32 / 100.0)
            })
            .collect();

        self.fan_out("set volume", changes, |coordinator, level| async move {
            coordinator.set_volume(level).await
        })
        .await
    }

    pub async fn set_mute(&self, mute: bool) -> Result<()> {
        let targets = self.members().into_iter().map(|a| (a, mute)).collect();
        self.fan_out("set mute", targets, |coordinator, mute| async move {
            coordinator.set_mute(mute).await
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        let targets = self.members().into_iter().map(|a| (a, ())).collect();
        self.fan_out("play", targets, |coordinator, _| async move { coordinator.play().await })
            .await
    }

    pub async fn pause(&self) -> Result<()> {
        let targets = self.members().into_iter().map(|a| (a, ())).collect();
        self.fan_out("pause", targets, |coordinator, _| async move { coordinator.pause().await })
            .await
    }

    /// Run `op` on every member with a known coordinator; the first error wins
    async fn fan_out<T, F, Fut>(&self, action: &str, targets: Vec<(Address, T)>, op: F) -> Result<()>
    where
        F: Fn(Arc<Coordinator>, T) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut calls = Vec::new();
        for (address, arg) in targets {
            match self.devices.get(&address) {
                Some(coordinator) => calls.push(op(coordinator, arg)),
                None => tracing::debug!(master = %self.master, "No coordinator for member {}; skipping {}", address, action),
            }
        }
        join_all(calls).await.into_iter().collect()
    }
}
