//! Device command vocabulary.
//!
//! Every request is a GET of `<control path>?command=<verb>[:<args>]`; no body
//! is ever sent.

use std::fmt;

/// Path every command is sent to
pub const CONTROL_PATH: &str = "/httpapi.asp";

/// Commands understood by the device HTTP API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Basic status: identity, Wi-Fi, firmware
    GetStatus,
    /// Extended player status: playback, volume, position, hex metadata
    GetPlayerStatus,
    /// Multiroom membership as seen by this device
    GetSlaveList,
    /// Track metadata with artwork
    GetMetaInfo,
    /// Available input sources
    GetSources,
    /// Static device information
    GetDeviceInfo,

    Play,
    Pause,
    Stop,
    Next,
    Previous,
    /// Volume 0-100
    SetVolume(u8),
    SetMute(bool),
    /// Vendor loop code, see [`crate::PlayMode`]
    SetLoopMode(u8),
    /// Seek to a position in seconds
    Seek(u32),
    SwitchSource(String),
    /// Preset slot 1-6
    PlayPreset(u8),
    ClearPlaylist,
    Reboot,
    /// Set the device clock to a Unix timestamp
    TimeSync(u64),

    /// Standby (`false`) or wake (`true`)
    SetPower(bool),
    /// Named equalizer preset, e.g. `Flat` or `Rock`
    SetEqPreset(String),
    /// Ten custom equalizer bands
    SetEqCustom(Vec<i32>),
    GetEq,
    /// Front panel status light
    SetLed(bool),
    /// Status light brightness 0-100
    SetLedBrightness(u8),

    /// Become a master with no slaves
    CreateGroup,
    /// Dissolve the group this device is master of
    Ungroup,
    /// Leave the group this device is a slave of
    LeaveGroup,
    /// Join the group mastered by the given address
    JoinGroup(String),
    /// Remove a slave from the group (master only)
    KickSlave(String),
    /// Mute or unmute a slave (master only)
    SlaveMute(String, bool),
    /// Set a slave's volume 0-100 (master only)
    SlaveVolume(String, u8),
}

impl Command {
    /// Wire form, the value of the `command` query parameter
    pub fn wire(&self) -> String {
        match self {
            Command::GetStatus => "getStatusEx".to_string(),
            Command::GetPlayerStatus => "getPlayerStatusEx".to_string(),
            Command::GetSlaveList => "multiroom:getSlaveList".to_string(),
            Command::GetMetaInfo => "getMetaInfo".to_string(),
            Command::GetSources => "getSourceList".to_string(),
            Command::GetDeviceInfo => "getDeviceInfo".to_string(),
            Command::Play => "setPlayerCmd:resume".to_string(),
            Command::Pause => "setPlayerCmd:pause".to_string(),
            Command::Stop => "setPlayerCmd:stop".to_string(),
            Command::Next => "setPlayerCmd:next".to_string(),
            Command::Previous => "setPlayerCmd:prev".to_string(),
            Command::SetVolume(v) => format!("setPlayerCmd:vol:{}", v),
            Command::SetMute(m) => format!("setPlayerCmd:mute:{}", flag(*m)),
            Command::SetLoopMode(code) => format!("setPlayerCmd:loopmode:{}", code),
            Command::Seek(secs) => format!("setPlayerCmd:seek:{}", secs),
            Command::SwitchSource(source) => format!("setPlayerCmd:switchmode:{}", source),
            Command::PlayPreset(n) => format!("MCUKeyShortClick:{}", n),
            Command::ClearPlaylist => "setPlayerCmd:clear_playlist".to_string(),
            Command::Reboot => "reboot".to_string(),
            Command::TimeSync(ts) => format!("timeSync:{}", ts),
            Command::SetPower(on) => format!("setShutdown:{}", flag(*on)),
            Command::SetEqPreset(name) => format!("EQLoad:{}", name),
            Command::SetEqCustom(bands) => {
                let bands: Vec<String> = bands.iter().map(|b| b.to_string()).collect();
                format!("setEQ:custom:{}", bands.join(","))
            }
            Command::GetEq => "getEQ".to_string(),
            Command::SetLed(on) => format!("setLED:{}", flag(*on)),
            Command::SetLedBrightness(level) => format!("setLEDBrightness:{}", level),
            Command::CreateGroup => "setMultiroom:Master".to_string(),
            Command::Ungroup => "multiroom:Ungroup".to_string(),
            Command::LeaveGroup => "multiroom:LeaveGroup".to_string(),
            Command::JoinGroup(master) => {
                format!("ConnectMasterAp:JoinGroupMaster:eth{}:wifi0.0.0.0", master)
            }
            Command::KickSlave(ip) => format!("multiroom:SlaveKickout:{}", ip),
            Command::SlaveMute(ip, m) => format!("multiroom:SlaveMute:{}:{}", ip, flag(*m)),
            Command::SlaveVolume(ip, v) => format!("multiroom:SlaveVolume:{}:{}", ip, v),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire())
    }
}

fn flag(on: bool) -> u8 {
    if on {
        1
    } else {
        0
    }
}
