use clap::Parser;
use client::game::ClientGame;
use client::network::Client;
use log::{info, LevelFilter};
use shared::protocol::{EnterRequest, Team};
use shared::{GameTime, GameVars, PlayerId, ShotSlot};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

const TICK_RATE: u32 = 60;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:5150")]
    server: String,

    /// Callsign announced in the handshake
    #[arg(short, long, default_value = "anonymous")]
    callsign: String,

    /// Affiliation tag announced in the handshake
    #[arg(long, default_value = "")]
    tag: String,

    /// Team number (0 automatic, 1 rogue, 2 red, 3 green, 4 blue, 5 purple, 6 observer)
    #[arg(short, long, default_value = "0")]
    team: u8,

    /// Milliseconds between fire attempts
    #[arg(long, default_value = "250")]
    fire_interval_ms: u64,

    /// How long to simulate before disconnecting
    #[arg(short, long, default_value = "10")]
    duration_secs: u64,

    /// Side length of the square walled arena
    #[arg(long, default_value = "400")]
    arena_size: f32,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn verbosity(count: u8) -> LevelFilter {
    match count {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(verbosity(args.verbose))
        .parse_default_env()
        .init();

    let team = Team::from_u8(args.team)?;

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(&args.server).await?;
    client
        .connect(&EnterRequest::new(team, args.callsign, args.tag))
        .await?;

    let world = client.fetch_world().await?;
    info!("World downloaded: {} bytes", world.len());

    let mut game = ClientGame::new(
        PlayerId(0),
        team,
        ClientGame::walled_arena(args.arena_size),
        GameVars::default(),
    );

    let step = Duration::from_secs(1) / TICK_RATE;
    let fire_every = Duration::from_millis(args.fire_interval_ms.max(1));
    let run_for = Duration::from_secs(args.duration_secs);

    let mut ticker = interval(step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut time = GameTime::default();
    let mut since_fire = fire_every;
    let mut since_heartbeat = Duration::ZERO;
    let (mut fired, mut denied) = (0u32, 0u32);

    while time.total < run_for {
        ticker.tick().await;
        time = time.advance(step);

        if since_fire >= fire_every {
            since_fire = Duration::ZERO;
            match game.fire() {
                ShotSlot::Slot(_) => fired += 1,
                ShotSlot::Dummy => denied += 1,
            }
        }
        since_fire += step;

        for slot in game.update(&time) {
            info!("Shot slot {} reloaded", slot);
        }
        let sprites = game.sprites();
        log::trace!("{} sprites this frame", sprites.len());

        since_heartbeat += step;
        if since_heartbeat >= HEARTBEAT_INTERVAL {
            since_heartbeat = Duration::ZERO;
            client.heartbeat().await?;
            client.service().await?;
        }
    }

    let summary = format!("fired {} shots, {} denied while reloading", fired, denied);
    info!("{}", summary);
    client.send_debug(&summary).await?;
    client.disconnect().await?;

    Ok(())
}
