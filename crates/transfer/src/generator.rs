use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::TransferError;
use crate::checksum::{ChecksumEngine, calculate_file_checksum};
use crate::chunked::PartialFile;

/// Bytes generated and written per iteration.
pub const GENERATOR_BLOCK_SIZE: usize = 1024 * 1024;

const TEXT_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789 \n\t";

/// Content of one generated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    /// Uniformly random bytes.
    Random,
    /// Bytes drawn from a printable alphabet.
    Text,
    /// A random 256-byte base repeated, with ~5% of bytes perturbed.
    Repeating,
    /// Interleaved random, counter, letter and digit bytes.
    Mixed,
}

impl FillPattern {
    pub const ALL: [FillPattern; 4] = [Self::Random, Self::Text, Self::Repeating, Self::Mixed];

    pub fn choose(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Produces `len` bytes of this pattern.
    pub fn fill(self, rng: &mut impl Rng, len: usize) -> Vec<u8> {
        match self {
            Self::Random => {
                let mut block = vec![0u8; len];
                rng.fill(block.as_mut_slice());
                block
            }
            Self::Text => (0..len)
                .map(|_| TEXT_ALPHABET[rng.gen_range(0..TEXT_ALPHABET.len())])
                .collect(),
            Self::Repeating => {
                let mut base = [0u8; 256];
                rng.fill(&mut base[..]);
                (0..len)
                    .map(|i| {
                        if rng.gen_ratio(5, 100) {
                            rng.r#gen()
                        } else {
                            base[i % 256]
                        }
                    })
                    .collect()
            }
            Self::Mixed => (0..len)
                .map(|i| match i % 4 {
                    0 => rng.r#gen(),
                    1 => ((i / 4) % 256) as u8,
                    2 => b'A' + (i % 26) as u8,
                    _ => b'0' + (i % 10) as u8,
                })
                .collect(),
        }
    }
}

/// Progress of a running generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationProgress {
    pub bytes_written: u64,
    pub total_bytes: u64,
}

/// Outcome of [`generate_file`].
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
    pub generation_time: Duration,
}

/// Size and digest of an existing file.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub checksum: String,
}

/// Writes `size_bytes` of pseudo-random content to `path`.
///
/// Parent directories are created. On any error the partially written
/// file is removed. Progress is published after each block with
/// `try_send`, so a full channel only drops updates.
pub async fn generate_file(
    path: &Path,
    size_bytes: u64,
    progress: Option<&mpsc::Sender<GenerationProgress>>,
) -> Result<GeneratedFile, TransferError> {
    let started = Instant::now();
    let mut out = PartialFile::create(path).await?;
    let mut checksum = ChecksumEngine::new();
    let mut rng = StdRng::from_entropy();

    while out.written() < size_bytes {
        let len = (size_bytes - out.written()).min(GENERATOR_BLOCK_SIZE as u64) as usize;
        let block = FillPattern::choose(&mut rng).fill(&mut rng, len);
        out.append(&block).await?;
        checksum.update(&block);

        if let Some(tx) = progress {
            let _ = tx.try_send(GenerationProgress {
                bytes_written: out.written(),
                total_bytes: size_bytes,
            });
        }
    }

    let path = out.commit().await?;
    let generated = GeneratedFile {
        path,
        size_bytes,
        checksum: checksum.finalize(),
        generation_time: started.elapsed(),
    };
    tracing::info!(
        path = %generated.path.display(),
        size = generated.size_bytes,
        elapsed_ms = generated.generation_time.as_millis() as u64,
        "generated test file"
    );
    Ok(generated)
}

/// Reads the size and SHA-256 of an existing file.
pub async fn file_info(path: &Path) -> Result<FileInfo, TransferError> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(TransferError::InvalidPath(format!(
            "not a regular file: {}",
            path.display()
        )));
    }
    Ok(FileInfo {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        checksum: calculate_file_checksum(path).await?,
    })
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

/// Predefined test-file sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizePreset {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

impl SizePreset {
    pub const ALL: [SizePreset; 4] = [Self::Small, Self::Medium, Self::Large, Self::ExtraLarge];

    pub fn size_mb(self) -> u64 {
        match self {
            Self::Small => 10,
            Self::Medium => 25,
            Self::Large => 50,
            Self::ExtraLarge => 100,
        }
    }

    pub fn size_bytes(self) -> u64 {
        self.size_mb() * 1024 * 1024
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::ExtraLarge => "extra-large",
        }
    }

    /// File name used when the caller does not pick one.
    pub fn default_file_name(self) -> String {
        format!("test_file_{}MB.bin", self.size_mb())
    }
}

impl fmt::Display for SizePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizePreset {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "extra-large" | "extra_large" | "xl" => Ok(Self::ExtraLarge),
            other => Err(TransferError::InvalidSize(format!(
                "unknown size preset {other:?} (expected small, medium, large or extra-large)"
            ))),
        }
    }
}

/// Generates a preset-sized file in `dir`, named `name` or
/// [`SizePreset::default_file_name`].
pub async fn create_test_file(
    dir: &Path,
    preset: SizePreset,
    name: Option<&str>,
    progress: Option<&mpsc::Sender<GenerationProgress>>,
) -> Result<GeneratedFile, TransferError> {
    let name = match name {
        Some(name) => name.to_string(),
        None => preset.default_file_name(),
    };
    let path = crate::validation::resolve_receive_path(dir, &name)?;
    generate_file(&path, preset.size_bytes(), progress).await
}
