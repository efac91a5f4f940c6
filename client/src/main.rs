use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use swarm_client::cli::{Args, Command};
use swarm_client::{DownloadConfig, Downloader};
use swarm_seeder::SeederConfig;

/// Exit status when the run finished but some chunks never arrived.
const EXIT_INCOMPLETE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    swarm_core::logging::init_tracing(&args.log_level);

    match run(args.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> anyhow::Result<ExitCode> {
    match command {
        Command::Create {
            file,
            chunk_size,
            peers,
            torrents_dir,
        } => {
            let (descriptor, path) =
                swarm_seeder::create_descriptor(file, chunk_size, peers, torrents_dir)
                    .await
                    .context("creating descriptor")?;
            println!(
                "Created {} ({} chunks, {} bytes)",
                path.display(),
                descriptor.total_chunks,
                descriptor.file_size
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Seed {
            file,
            port,
            deadline_secs,
            chunk_size,
            torrents_dir,
        } => {
            let config = SeederConfig {
                port,
                shutdown_after: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
                ..SeederConfig::default()
            };
            swarm_seeder::seed(&file, chunk_size, &torrents_dir, config)
                .await
                .context("seeding")?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Download {
            descriptor,
            output,
            workers,
            passes,
            connect_timeout_secs,
            read_timeout_secs,
            report_interval_secs,
        } => {
            let config = DownloadConfig {
                workers,
                max_passes: passes,
                connect_timeout: Duration::from_secs(connect_timeout_secs),
                read_timeout: Duration::from_secs(read_timeout_secs),
                report_interval: Duration::from_secs(report_interval_secs.max(1)),
                ..DownloadConfig::default()
            };
            let downloader = Downloader::new(&descriptor, output, config).await?;

            let d = &downloader.descriptor;
            println!(
                "Starting download: {} ({} bytes, {} chunks, {} peers)",
                d.file_name,
                d.file_size,
                d.total_chunks,
                d.peers.len()
            );

            let report = downloader.run().await;
            println!("{}", report);
            if report.is_complete() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_INCOMPLETE))
            }
        }
    }
}
