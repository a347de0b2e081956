//! Command implementations.

use std::path::{Path, PathBuf};

use anyhow::Context;
use synergy_data_channel::SenderSession;
use synergy_protocol::TransferResult;
use synergy_protocol::constants::CONNECT_TIMEOUT;
use synergy_transfer::format::format_file_size;
use synergy_transfer::{
    GeneratedFile, GenerationProgress, SizePreset, checksums_match, create_test_file, file_info,
    generate_file,
};
use synergy_transfer_server::{TransferEvent, TransferServer};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::progress::TransferBar;

/// What `send` transmits.
#[derive(Debug)]
pub enum Source {
    File(PathBuf),
    /// A fresh test file created in the scratch directory first.
    Generated(SizePreset),
}

/// Runs the transfer server until Ctrl-C.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let mut server = TransferServer::new(config.server_config());
    let mut events = server.subscribe().await;
    let addr = server
        .start(&config.bind_address, config.port)
        .await
        .with_context(|| format!("binding {}:{}", config.bind_address, config.port))?;

    println!("Listening on {addr}");
    println!("Receive directory: {}", config.receive_dir.display());
    println!("Press Ctrl+C to stop");

    let mut bar: Option<TransferBar> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
            event = events.recv() => match event {
                Some(TransferEvent::Progress(snapshot)) => match &bar {
                    Some(bar) => bar.apply(&snapshot),
                    None => {
                        let new_bar = TransferBar::new(snapshot.total_size, "receiving")?;
                        new_bar.apply(&snapshot);
                        bar = Some(new_bar);
                    }
                },
                Some(TransferEvent::Completed(result)) => {
                    if let Some(bar) = bar.take() {
                        if result.is_complete() {
                            bar.finish("transfer complete");
                        } else {
                            bar.abandon("transfer failed");
                        }
                    }
                    print_result(&result)?;
                }
                None => break,
            }
        }
    }

    server.stop().await?;
    let status = server.status().await;
    info!(
        completed = status.transfers_completed,
        failed = status.transfers_failed,
        "server stopped"
    );
    Ok(())
}

/// Sends one file and prints the merged result.
pub async fn send(
    config: &Config,
    host: &str,
    port: u16,
    source: Source,
    chunk_size: usize,
) -> anyhow::Result<()> {
    let path = match source {
        Source::File(path) => path,
        Source::Generated(preset) => {
            let dir = std::env::temp_dir().join("synergy_files").join("generated");
            let generated = generate_with_bar(&dir, preset.size_bytes(), Some(preset)).await?;
            println!("Generated {}", generated.path.display());
            generated.path
        }
    };

    let size = tokio::fs::metadata(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?
        .len();
    let label = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file")
        .to_string();

    println!("File: {} ({})", path.display(), format_file_size(size));
    println!("Destination: {host}:{port}");

    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port)))
        .await
        .map_err(|_| anyhow::anyhow!("timed out connecting to {host}:{port}"))?
        .with_context(|| format!("connecting to {host}:{port}"))?;
    stream.set_nodelay(true)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let (progress_tx, mut progress_rx) = mpsc::channel(32);
    let bar = TransferBar::new(size, label)?;
    let ui = tokio::spawn(async move {
        while let Some(snapshot) = progress_rx.recv().await {
            bar.apply(&snapshot);
        }
        bar
    });

    let mut session = SenderSession::new(stream, cancel)
        .with_chunk_size(chunk_size)
        .with_progress(progress_tx)
        .with_progress_interval(config.progress_interval());
    if let Some(timeout) = config.idle_timeout() {
        session = session.with_idle_timeout(timeout);
    }

    let outcome = session.send_file(&path).await;
    drop(session);
    let bar = ui.await?;

    match outcome {
        Ok(result) => {
            if result.is_complete() {
                bar.finish("transfer complete");
            } else {
                bar.abandon("transfer failed");
            }
            print_result(&result)?;
            if !result.is_complete() {
                anyhow::bail!(
                    "transfer failed: {}",
                    result.error().unwrap_or("unknown error")
                );
            }
            Ok(())
        }
        Err(e) => {
            bar.abandon("transfer failed");
            print_result(&e.to_result())?;
            Err(e.into())
        }
    }
}

/// Writes a test file of `size_mb` MiB, or of a preset size.
///
/// With a preset, an existing directory `path` receives a file with the
/// preset's default name.
pub async fn generate(
    path: &Path,
    size_mb: Option<u64>,
    preset: Option<SizePreset>,
) -> anyhow::Result<()> {
    let total = match (preset, size_mb) {
        (Some(preset), _) => preset.size_bytes(),
        (None, Some(mb)) => mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| anyhow::anyhow!("size of {mb} MiB is too large"))?,
        (None, None) => anyhow::bail!("a size or --preset is required"),
    };
    let preset_dir = preset.filter(|_| path.is_dir());
    let generated = generate_with_bar(path, total, preset_dir).await?;
    println!("{}", serde_json::to_string_pretty(&generated)?);
    Ok(())
}

/// Prints a file's SHA-256, optionally checking it.
pub async fn checksum(path: &Path, expect: Option<&str>) -> anyhow::Result<()> {
    let info = file_info(path)
        .await
        .with_context(|| format!("hashing {}", path.display()))?;
    println!(
        "{}  {} ({})",
        info.checksum,
        path.display(),
        format_file_size(info.size_bytes)
    );

    if let Some(expected) = expect {
        if !checksums_match(&info.checksum, expected) {
            anyhow::bail!(
                "checksum mismatch: expected {expected}, got {}",
                info.checksum
            );
        }
        println!("OK");
    }
    Ok(())
}

/// Generates into `target` with a progress bar.
///
/// `preset_dir` means `target` is a directory and the preset's default
/// file name is used.
async fn generate_with_bar(
    target: &Path,
    total: u64,
    preset_dir: Option<SizePreset>,
) -> anyhow::Result<GeneratedFile> {
    let bar = TransferBar::new(total, format!("generating {}", target.display()))?;
    let (tx, mut rx) = mpsc::channel::<GenerationProgress>(16);
    let ui = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            bar.set_position(p.bytes_written);
        }
        bar
    });

    let generated = match preset_dir {
        Some(preset) => create_test_file(target, preset, None, Some(&tx)).await,
        None => generate_file(target, total, Some(&tx)).await,
    };
    drop(tx);
    let bar = ui.await?;

    match generated {
        Ok(generated) => {
            bar.finish(format!(
                "generated {} in {:.2}s",
                format_file_size(generated.size_bytes),
                generated.generation_time.as_secs_f64()
            ));
            Ok(generated)
        }
        Err(e) => {
            bar.abandon("generation failed");
            Err(e.into())
        }
    }
}

fn print_result(result: &TransferResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
