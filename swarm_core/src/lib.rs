//! Core library for the swarm file transfer tools.
//!
//! This library provides the transfer descriptor shared by the seeder and the
//! downloader: its on-disk JSON form, validation, chunk layout arithmetic and
//! the SHA-256 digests used to verify chunks. It also owns the shared
//! `tracing` setup used by both binaries.

pub mod error;
pub mod hashing;
pub mod logging;

pub use error::DescriptorError;
pub use hashing::digest_hex;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Chunk size used when none is given: 64 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 64 * 1024;

/// Peer list written into descriptors when none is given.
pub const DEFAULT_PEER: &str = "127.0.0.1:8080";

/// Extension appended to the source file name when a descriptor is saved.
pub const DESCRIPTOR_EXTENSION: &str = "torrent";

/// Describes how a file is split into chunks and where to fetch them from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    /// Base name of the source file; also the name of the downloaded file.
    pub file_name: String,
    /// Total length of the file in bytes.
    pub file_size: u64,
    /// Length of every chunk except possibly the last one.
    pub chunk_size: u64,
    /// Lowercase hex SHA-256 digest of every chunk, in chunk order.
    pub hashes: Vec<String>,
    /// `host:port` addresses of peers serving the file.
    pub peers: Vec<String>,
    /// Creation time in seconds since the Unix epoch.
    pub created_at: i64,
    /// Number of chunks, `ceil(file_size / chunk_size)`.
    pub total_chunks: usize,
}

impl TransferDescriptor {
    /// Parses and validates a descriptor from the bytes of a descriptor file.
    pub fn from_json(buf: &[u8]) -> Result<Self, DescriptorError> {
        let descriptor: Self = serde_json::from_slice(buf)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Writes the descriptor as indented JSON to `<dir>/<file_name>.torrent`,
    /// creating `dir` if needed. Returns the path written.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf, DescriptorError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| DescriptorError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(format!("{}.{}", self.file_name, DESCRIPTOR_EXTENSION));
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(&path, json).map_err(|source| DescriptorError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Number of chunks implied by `file_size` and `chunk_size`.
    pub fn expected_chunk_count(&self) -> usize {
        if self.chunk_size == 0 {
            return 0;
        }
        self.file_size.div_ceil(self.chunk_size) as usize
    }

    /// Byte offset of chunk `index` in the file.
    pub fn chunk_offset(&self, index: usize) -> u64 {
        index as u64 * self.chunk_size
    }

    /// Length of chunk `index`; the final chunk may be shorter than
    /// `chunk_size`. Indices past the end have length zero.
    pub fn chunk_len(&self, index: usize) -> u64 {
        if index >= self.total_chunks {
            return 0;
        }
        let offset = self.chunk_offset(index);
        self.chunk_size.min(self.file_size.saturating_sub(offset))
    }

    /// Checks the layout invariants a downloader relies on.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if Path::new(&self.file_name).file_name().and_then(|n| n.to_str())
            != Some(self.file_name.as_str())
        {
            return Err(DescriptorError::Invalid(format!(
                "file name {:?} is not a plain file name",
                self.file_name
            )));
        }
        if self.chunk_size == 0 {
            return Err(DescriptorError::Invalid("chunk size is zero".into()));
        }

        let expected = self.expected_chunk_count();
        if self.total_chunks != expected {
            return Err(DescriptorError::Invalid(format!(
                "total_chunks is {} but {} bytes in {}-byte chunks needs {}",
                self.total_chunks, self.file_size, self.chunk_size, expected
            )));
        }
        if self.hashes.len() != self.total_chunks {
            return Err(DescriptorError::Invalid(format!(
                "{} hashes for {} chunks",
                self.hashes.len(),
                self.total_chunks
            )));
        }

        for (index, hash) in self.hashes.iter().enumerate() {
            let well_formed = hash.len() == 64
                && hash
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
            if !well_formed {
                return Err(DescriptorError::Invalid(format!(
                    "hash for chunk {} is not a lowercase hex SHA-256 digest",
                    index
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ten_byte_descriptor() -> TransferDescriptor {
        TransferDescriptor {
            file_name: "data.bin".to_string(),
            file_size: 10,
            chunk_size: 4,
            hashes: vec![
                digest_hex(b"abcd"),
                digest_hex(b"efgh"),
                digest_hex(b"ij"),
            ],
            peers: vec![DEFAULT_PEER.to_string()],
            created_at: 1_700_000_000,
            total_chunks: 3,
        }
    }

    #[test]
    fn test_chunk_layout() {
        let d = ten_byte_descriptor();
        assert_eq!(d.expected_chunk_count(), 3);
        assert_eq!(d.chunk_offset(2), 8);
        assert_eq!(d.chunk_len(0), 4);
        assert_eq!(d.chunk_len(1), 4);
        assert_eq!(d.chunk_len(2), 2);
        assert_eq!(d.chunk_len(3), 0);
    }

    #[test]
    fn test_exact_multiple_has_full_last_chunk() {
        let mut d = ten_byte_descriptor();
        d.file_size = 12;
        assert_eq!(d.expected_chunk_count(), 3);
        assert_eq!(d.chunk_len(2), 4);
    }

    #[test]
    fn test_save_then_parse() {
        let dir = tempdir().unwrap();
        let d = ten_byte_descriptor();

        let path = d.save(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("data.bin.torrent"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"file_name\": \"data.bin\""));

        let loaded = TransferDescriptor::from_json(text.as_bytes()).unwrap();
        assert_eq!(loaded, d);
    }

    #[test]
    fn test_parse_invalid_json() {
        let res = TransferDescriptor::from_json(b"invalid");
        assert!(matches!(res, Err(DescriptorError::Json(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_hash_count() {
        let mut d = ten_byte_descriptor();
        d.hashes.pop();
        assert!(matches!(d.validate(), Err(DescriptorError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_wrong_total() {
        let mut d = ten_byte_descriptor();
        d.total_chunks = 4;
        d.hashes.push(digest_hex(b""));
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_uppercase_hash() {
        let mut d = ten_byte_descriptor();
        d.hashes[0] = d.hashes[0].to_uppercase();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_path_in_file_name() {
        let mut d = ten_byte_descriptor();
        d.file_name = "../escape.bin".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let mut d = ten_byte_descriptor();
        d.chunk_size = 0;
        assert!(d.validate().is_err());
    }
}
