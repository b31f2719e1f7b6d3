use clap::Parser;
use log::{error, info, LevelFilter};
use server::network::Server;
use server::world::World;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// UDP port to listen on
    #[arg(short, long, default_value = "5150")]
    port: u16,

    /// World file served to every client
    #[arg(short, long)]
    world: PathBuf,

    /// Maximum number of approved connections
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

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

    // The world must be in place before the socket is bound
    let world = match World::load(&args.world) {
        Ok(world) => world,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let address = format!("{}:{}", args.host, args.port);
    info!("Starting server on {}", address);

    let mut server = Server::new(&address, world, args.max_clients).await?;
    server.run().await?;

    Ok(())
}
