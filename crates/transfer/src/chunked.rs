use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::TransferError;
use crate::checksum::ChecksumEngine;

/// One chunk read from the source file.
#[derive(Debug, Clone)]
pub struct FileChunk {
    /// 1-based sequence number.
    pub chunk_id: u64,
    pub data: Vec<u8>,
    /// SHA-256 hex digest of `data`.
    pub checksum: String,
    /// `true` once this chunk brings the byte count to the file size.
    pub is_last: bool,
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file sequentially in chunks of at most `chunk_size` bytes.
///
/// The last chunk may be shorter. Every chunk also feeds a whole-file
/// digest, available from [`finalize`](Self::finalize) once the file has
/// been read.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    file_size: u64,
    offset: u64,
    next_id: u64,
    checksum: ChecksumEngine,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidSize("chunk size must be non-zero".into()));
        }
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self {
            file,
            chunk_size,
            file_size,
            offset: 0,
            next_id: 1,
            checksum: ChecksumEngine::new(),
        })
    }

    /// Reads the next chunk. Returns `None` once `file_size` bytes were read.
    ///
    /// A file that shrinks while being read surfaces as an `UnexpectedEof`
    /// I/O error rather than a short final chunk.
    pub async fn next_chunk(&mut self) -> Result<Option<FileChunk>, TransferError> {
        let remaining = self.file_size - self.offset;
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut data = vec![0u8; read_size];
        self.file.read_exact(&mut data).await?;

        let checksum = self.checksum.update(&data);
        self.offset += read_size as u64;
        let chunk = FileChunk {
            chunk_id: self.next_id,
            data,
            checksum,
            is_last: self.offset >= self.file_size,
        };
        self.next_id += 1;
        Ok(Some(chunk))
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes handed out so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }

    /// Number of chunks handed out so far.
    pub fn chunks_read(&self) -> u64 {
        self.next_id - 1
    }

    /// Whole-file digest of everything read.
    pub fn finalize(self) -> String {
        self.checksum.finalize()
    }
}

// ---------------------------------------------------------------------------
// PartialFile
// ---------------------------------------------------------------------------

/// Destination file that is removed unless explicitly committed.
///
/// Dropping a `PartialFile` (error path, panic, or cancelled future)
/// deletes whatever was written.
pub struct PartialFile {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    written: u64,
    committed: bool,
}

impl PartialFile {
    /// Creates (or truncates) `path`, creating parent directories.
    ///
    /// An existing file at `path` is overwritten in place. If the new
    /// content is then dropped uncommitted, the old file is gone too: a
    /// failed repeat transfer removes the copy an earlier one left behind.
    pub async fn create(path: &Path) -> Result<Self, TransferError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            written: 0,
            committed: false,
        })
    }

    /// Appends `data` at the current end of the file.
    pub async fn append(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| std::io::Error::other("partial file already closed"))?;
        file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the file, keeping it on disk.
    pub async fn commit(mut self) -> Result<PathBuf, TransferError> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.committed = true;
        Ok(self.path.clone())
    }

    /// Closes and removes the file.
    pub async fn discard(mut self) {
        drop(self.file.take());
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), "failed to remove partial file: {e}");
        }
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.file.take());
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), "failed to remove partial file: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::checksum_bytes;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn uncommitted_overwrite_removes_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "kept.bin", b"earlier transfer");

        let mut partial = PartialFile::create(&path).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        partial.append(b"half").await.unwrap();
        drop(partial);

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn chunk_reader_reads_all() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c1.chunk_id, 1);
        assert_eq!(&c1.data, b"AABB");
        assert_eq!(c1.checksum, checksum_bytes(b"AABB"));
        assert!(!c1.is_last);

        let c2 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c2.chunk_id, 2);
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().await.unwrap().unwrap();
        assert_eq!(c3.chunk_id, 3);
        assert_eq!(&c3.data, b"EE");
        assert!(c3.is_last);

        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.chunks_read(), 3);
        assert_eq!(reader.finalize(), checksum_bytes(b"AABBCCDDEE"));
    }

    #[tokio::test]
    async fn chunk_reader_exact_multiple_marks_last() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "even.bin", &[7u8; 8]);

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert!(!reader.next_chunk().await.unwrap().unwrap().is_last);
        assert!(reader.next_chunk().await.unwrap().unwrap().is_last);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunk_reader_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.finalize(), crate::EMPTY_SHA256);
    }

    #[tokio::test]
    async fn chunk_reader_rejects_zero_chunk_size() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "x.bin", b"x");
        let result = ChunkReader::open(&path, 0).await;
        assert!(matches!(result, Err(TransferError::InvalidSize(_))));
    }

    #[tokio::test]
    async fn partial_file_commit_keeps_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub/dir/out.bin");

        let mut out = PartialFile::create(&path).await.unwrap();
        out.append(b"Hello").await.unwrap();
        out.append(b" World").await.unwrap();
        assert_eq!(out.written(), 11);

        let committed = out.commit().await.unwrap();
        assert_eq!(committed, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"Hello World");
    }

    #[tokio::test]
    async fn partial_file_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dropped.bin");

        {
            let mut out = PartialFile::create(&path).await.unwrap();
            out.append(b"partial").await.unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn partial_file_discard_removes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discarded.bin");

        let mut out = PartialFile::create(&path).await.unwrap();
        out.append(b"data").await.unwrap();
        out.discard().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reader_writer_roundtrip() {
        let dir = TempDir::new().unwrap();
        let original = b"The quick brown fox jumps over the lazy dog";
        let src = create_test_file(dir.path(), "src.txt", original);
        let dst = dir.path().join("dst.txt");

        let mut reader = ChunkReader::open(&src, 10).await.unwrap();
        let mut writer = PartialFile::create(&dst).await.unwrap();
        while let Some(chunk) = reader.next_chunk().await.unwrap() {
            writer.append(&chunk.data).await.unwrap();
        }
        writer.commit().await.unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), original);
    }
}
