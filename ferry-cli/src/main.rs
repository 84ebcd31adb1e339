mod api;
mod cli;
mod commands;
mod config;
mod cookies;
mod error;
mod logging;

use std::process;

use anyhow::Context;
use clap::Parser;
use ferry_engine::{Anime, Episode};
use tracing::error;

use crate::cli::{Args, Commands};
use crate::commands::{CommandExecutor, DownloadArgs};
use crate::config::AppConfig;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match logging::init_logging(args.verbose, args.quiet, args.log_dir.as_deref())
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: failed to initialise logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(args).await {
        error!("Application error: {:#}", e);
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;
    config.apply_args(&args);

    match args.command {
        Commands::Playlist {
            url,
            cookies,
            output,
        } => {
            CommandExecutor::new(config)
                .playlist(&url, &cookies, output.as_deref())
                .await?;
        }

        Commands::Relay {
            url,
            range,
            cookies,
            output,
        } => {
            CommandExecutor::new(config)
                .relay(&url, range.as_deref(), &cookies, output.as_deref())
                .await?;
        }

        Commands::Download {
            source_url,
            anime,
            anime_id,
            episode_id,
            episode_title,
            number,
            cookies,
            output_dir,
        } => {
            if let Some(dir) = output_dir {
                config.downloads.output_dir = dir;
            }
            let download = DownloadArgs {
                source_url,
                anime: Anime {
                    id: anime_id.unwrap_or_else(|| anime.clone()),
                    title: anime,
                },
                episode: Episode {
                    title: episode_title.unwrap_or_else(|| episode_id.clone()),
                    id: episode_id,
                    url: String::new(),
                    number,
                },
                cookies,
            };
            CommandExecutor::new(config).download(download).await?;
        }

        Commands::Serve {
            bind,
            max_concurrent,
            output_dir,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(max) = max_concurrent {
                config.downloads.max_concurrent = max;
            }
            if let Some(dir) = output_dir {
                config.downloads.output_dir = dir;
            }
            CommandExecutor::new(config).serve().await?;
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("Configuration reset to defaults at {}", path.display());
            } else if show {
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}
