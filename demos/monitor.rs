//! Poll one or more speakers and print every published state.
//!
//! ```text
//! RUST_LOG=linkplay_multiroom=debug cargo run --example monitor -- 192.168.1.100 192.168.1.101
//! ```

use linkplay_multiroom::{
    ClientConfig, Coordinator, DeviceRegistry, DeviceState, GroupPlayer, GroupRegistry, PollConfig,
    Role,
};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn describe(host: &str, state: &DeviceState) -> String {
    let snapshot = &state.snapshot;
    let track = match (&snapshot.track.title, &snapshot.track.artist) {
        (Some(title), Some(artist)) => format!("{} - {}", artist, title),
        (Some(title), None) => title.clone(),
        _ => "-".to_string(),
    };
    let position = snapshot
        .position_at(Instant::now())
        .map(|p| format!("{}:{:02}", p / 60, p % 60))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{:<15} {:<20} {:<7} {:?} vol={:?} muted={:?} source={} pos={} track={}",
        host,
        snapshot.device_name.as_deref().unwrap_or("?"),
        state.role.to_string(),
        snapshot.playback,
        snapshot.volume,
        snapshot.muted,
        snapshot.source.as_deref().unwrap_or("-"),
        position,
        track
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let hosts: Vec<String> = std::env::args().skip(1).collect();
    if hosts.is_empty() {
        eprintln!("usage: monitor <host> [host...]");
        std::process::exit(2);
    }

    let groups = GroupRegistry::new();
    let devices = DeviceRegistry::new();
    let client_config = ClientConfig::default();

    for host in &hosts {
        let coordinator = Arc::new(Coordinator::connect(
            host.clone(),
            &client_config,
            PollConfig::default(),
            groups.clone(),
        )?);
        devices.insert(coordinator.clone());

        let mut updates = coordinator.subscribe();
        let groups = groups.clone();
        let devices = devices.clone();
        let host = host.clone();
        coordinator.start();

        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let state = updates.borrow_and_update().clone();
                let Some(state) = state else {
                    continue;
                };
                println!("{}", describe(&host, &state));

                if state.role == Role::Master {
                    let player = GroupPlayer::new(host.clone(), groups.clone(), devices.clone());
                    println!(
                        "  {} members={:?} playback={:?} volume={:.2} muted={:?}",
                        player.name(),
                        player.members(),
                        player.playback(),
                        player.volume_level(),
                        player.is_muted()
                    );
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    for host in devices.addresses() {
        if let Some(coordinator) = devices.get(&host) {
            coordinator.stop().await;
        }
    }
    Ok(())
}
