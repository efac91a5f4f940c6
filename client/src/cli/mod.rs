use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetch a file from a swarm of peers in verified chunks", long_about = None)]
pub struct Args {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Hash a file and write its descriptor
    Create {
        /// Source file
        file: PathBuf,

        /// Chunk size in bytes
        #[arg(long, default_value_t = swarm_core::DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Peer address written into the descriptor (repeatable)
        #[arg(long = "peer", default_value = swarm_core::DEFAULT_PEER)]
        peers: Vec<String>,

        /// Directory the descriptor is written to
        #[arg(long, default_value = "torrents")]
        torrents_dir: PathBuf,
    },

    /// Write a file's descriptor and serve its chunks
    Seed {
        /// Source file
        file: PathBuf,

        /// TCP port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Stop accepting connections after this many seconds (0 = never)
        #[arg(long, default_value_t = 60)]
        deadline_secs: u64,

        /// Chunk size in bytes
        #[arg(long, default_value_t = swarm_core::DEFAULT_CHUNK_SIZE)]
        chunk_size: u64,

        /// Directory the descriptor is written to
        #[arg(long, default_value = "torrents")]
        torrents_dir: PathBuf,
    },

    /// Download the file described by a descriptor
    Download {
        /// Path to the descriptor file
        descriptor: PathBuf,

        /// Output directory for downloaded files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of concurrent chunk workers
        #[arg(long, default_value_t = 5)]
        workers: usize,

        /// Maximum number of passes over the missing chunks
        #[arg(long, default_value_t = 3)]
        passes: usize,

        /// Seconds allowed to establish a peer connection
        #[arg(long, default_value_t = 10)]
        connect_timeout_secs: u64,

        /// Seconds allowed for one whole chunk exchange
        #[arg(long, default_value_t = 30)]
        read_timeout_secs: u64,

        /// Seconds between progress lines
        #[arg(long, default_value_t = 3)]
        report_interval_secs: u64,
    },
}
