use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use swarm_seeder::SeederConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the chunks of one file to swarm downloaders", long_about = None)]
struct Args {
    /// File to serve
    file: PathBuf,

    /// TCP port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Stop accepting connections after this many seconds (0 = never)
    #[arg(long, default_value_t = 60)]
    deadline_secs: u64,

    /// Chunk size in bytes used for the descriptor
    #[arg(long, default_value_t = swarm_core::DEFAULT_CHUNK_SIZE)]
    chunk_size: u64,

    /// Directory the descriptor is written to
    #[arg(long, default_value = "torrents")]
    torrents_dir: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    swarm_core::logging::init_tracing(&args.log_level);

    let config = SeederConfig {
        port: args.port,
        shutdown_after: (args.deadline_secs > 0).then(|| Duration::from_secs(args.deadline_secs)),
        ..SeederConfig::default()
    };
    swarm_seeder::seed(&args.file, args.chunk_size, &args.torrents_dir, config).await?;
    Ok(())
}
