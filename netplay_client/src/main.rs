//! Headless client binary.
//!
//! Usage:
//!   cargo run -p netplay_client -- [--config client.json] [--addr 127.0.0.1:2567]
//!       [--room my_room] [--width 800] [--height 600] [--frame-hz 60]
//!       [--hold right,up] [--frames 600]
//!
//! The client joins the room, then runs the frame loop: it applies room
//! changes, steps the fixed-timestep simulation with the held keys and logs
//! where the local player is. `--frames 0` runs until interrupted.

use std::env;
use std::time::Duration;

use anyhow::Context;
use netplay_client::input::CursorKeys;
use netplay_client::scene::{GameScene, SceneState};
use netplay_client::TcpConnector;
use netplay_shared::config::ClientConfig;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

struct Args {
    cfg: ClientConfig,
    hold: CursorKeys,
    frames: u64,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    // Config file first so flags can override it.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let path = &args[i + 1];
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {path}"))?;
            ClientConfig::from_json_str(&text).with_context(|| format!("parse config {path}"))?
        }
        _ => ClientConfig::default(),
    };
    let mut hold = CursorKeys::default();
    let mut frames = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--room" if i + 1 < args.len() => {
                cfg.room_name = args[i + 1].clone();
                i += 2;
            }
            "--width" if i + 1 < args.len() => {
                cfg.screen_width = args[i + 1].parse().context("parse --width")?;
                i += 2;
            }
            "--height" if i + 1 < args.len() => {
                cfg.screen_height = args[i + 1].parse().context("parse --height")?;
                i += 2;
            }
            "--frame-hz" if i + 1 < args.len() => {
                cfg.frame_hz = args[i + 1].parse().context("parse --frame-hz")?;
                i += 2;
            }
            "--hold" if i + 1 < args.len() => {
                hold = CursorKeys::parse_list(&args[i + 1]).context("parse --hold")?;
                i += 2;
            }
            "--frames" if i + 1 < args.len() => {
                frames = args[i + 1].parse().context("parse --frames")?;
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, hold, frames })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let Args { cfg, hold, frames } = parse_args(&args)?;
    info!(server = %cfg.server_addr, room = %cfg.room_name, "Starting client");

    let mut scene = GameScene::new(&cfg);
    println!("{}", scene.status_text());

    let connector = TcpConnector::new(cfg.server_addr.clone());
    if scene.create(&connector).await != SceneState::Connected {
        println!("{}", scene.status_text());
        return Ok(());
    }
    println!("{}", scene.status_text());

    let frame_interval = Duration::from_secs_f64(1.0 / cfg.frame_hz.max(1) as f64);
    let mut interval = tokio::time::interval(frame_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_frame = Instant::now();
    let mut frame: u64 = 0;
    loop {
        interval.tick().await;
        let now = Instant::now();
        let delta = now - last_frame;
        last_frame = now;

        scene.poll_room();
        scene.update(delta, &hold);

        frame += 1;
        if frame % 120 == 0 {
            info!(
                tick = scene.current_tick(),
                players = scene.entity_count(),
                local = ?scene.local_entity().map(|e| e.position),
                "Frame"
            );
        }
        if frames != 0 && frame >= frames {
            break;
        }
    }

    Ok(())
}
