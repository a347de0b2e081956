//! Synergy node entry point.

mod app;
mod config;
mod progress;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use synergy_transfer::SizePreset;
use tracing_subscriber::EnvFilter;

use config::Config;

/// Receive, send and generate checksum-verified file transfers
#[derive(Debug, Parser)]
#[command(name = "synergy-node")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to ~/.config/synergy/node.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Receive files until interrupted
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// TCP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for received files
        #[arg(long)]
        receive_dir: Option<PathBuf>,
    },

    /// Send one file to a listening node
    Send {
        host: String,
        port: u16,

        /// File to send
        #[arg(required_unless_present = "generate")]
        file: Option<PathBuf>,

        /// Generate a test file of this preset and send it instead
        #[arg(long, conflicts_with = "file")]
        generate: Option<SizePreset>,

        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Write a test file of random patterns
    Generate {
        /// Output file, or directory when used with --preset
        path: PathBuf,

        /// Size in MiB
        #[arg(required_unless_present = "preset", conflicts_with = "preset")]
        size_mb: Option<u64>,

        /// small | medium | large | extra-large
        #[arg(long)]
        preset: Option<SizePreset>,
    },

    /// Print the SHA-256 of a file
    Checksum {
        file: PathBuf,

        /// Fail unless the digest matches
        #[arg(long)]
        expect: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting synergy-node");

    let config = Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        match cli.command {
            Commands::Serve {
                bind,
                port,
                receive_dir,
            } => {
                let mut config = config;
                if let Some(bind) = bind {
                    config.bind_address = bind;
                }
                if let Some(port) = port {
                    config.port = port;
                }
                if let Some(dir) = receive_dir {
                    config.receive_dir = dir;
                }
                app::serve(&config).await
            }
            Commands::Send {
                host,
                port,
                file,
                generate,
                chunk_size,
            } => {
                let source = match (file, generate) {
                    (Some(file), _) => app::Source::File(file),
                    (None, Some(preset)) => app::Source::Generated(preset),
                    (None, None) => anyhow::bail!("a file or --generate preset is required"),
                };
                let chunk_size = chunk_size.unwrap_or(config.chunk_size);
                app::send(&config, &host, port, source, chunk_size).await
            }
            Commands::Generate {
                path,
                size_mb,
                preset,
            } => app::generate(&path, size_mb, preset).await,
            Commands::Checksum { file, expect } => app::checksum(&file, expect.as_deref()).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send_with_file() {
        let cli = Cli::try_parse_from([
            "synergy-node",
            "send",
            "192.168.43.1",
            "8888",
            "data.bin",
            "--chunk-size",
            "65536",
        ])
        .unwrap();
        match cli.command {
            Commands::Send {
                host,
                port,
                file,
                generate,
                chunk_size,
            } => {
                assert_eq!(host, "192.168.43.1");
                assert_eq!(port, 8888);
                assert_eq!(file, Some(PathBuf::from("data.bin")));
                assert_eq!(generate, None);
                assert_eq!(chunk_size, Some(65536));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn send_requires_file_or_preset() {
        assert!(Cli::try_parse_from(["synergy-node", "send", "host", "8888"]).is_err());
        let cli =
            Cli::try_parse_from(["synergy-node", "send", "host", "8888", "--generate", "small"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send {
                generate: Some(SizePreset::Small),
                ..
            }
        ));
    }

    #[test]
    fn generate_takes_size_or_preset() {
        let cli = Cli::try_parse_from(["synergy-node", "generate", "out.bin", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Generate {
                size_mb: Some(5),
                preset: None,
                ..
            }
        ));

        let cli = Cli::try_parse_from([
            "synergy-node",
            "generate",
            "out",
            "--preset",
            "extra-large",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Generate {
                preset: Some(SizePreset::ExtraLarge),
                ..
            }
        ));

        assert!(Cli::try_parse_from(["synergy-node", "generate", "out.bin"]).is_err());
    }

    #[test]
    fn global_flags() {
        let cli = Cli::try_parse_from([
            "synergy-node",
            "-v",
            "--config",
            "/etc/synergy.toml",
            "checksum",
            "f",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/synergy.toml")));
    }
}
