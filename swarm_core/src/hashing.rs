//! Chunk hashing: the single linear pass that builds a descriptor from a
//! source file, and the digest helper both sides use to verify chunks.

use crate::{DescriptorError, TransferDescriptor};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Returns the lowercase hex SHA-256 digest of `data`.
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Fills `buf` from `reader`, stopping early only at end of input.
/// Returns the number of bytes read.
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl TransferDescriptor {
    /// Builds a descriptor for the file at `path` by hashing it in
    /// `chunk_size` blocks.
    ///
    /// # Arguments
    ///
    /// * `path` - The source file.
    /// * `chunk_size` - Length of every chunk except possibly the last.
    /// * `peers` - Addresses written into the descriptor.
    pub fn create(
        path: impl AsRef<Path>,
        chunk_size: u64,
        peers: Vec<String>,
    ) -> Result<Self, DescriptorError> {
        let path = path.as_ref();
        if chunk_size == 0 {
            return Err(DescriptorError::Invalid("chunk size is zero".into()));
        }
        let io_err = |source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                DescriptorError::Invalid(format!("{} has no usable file name", path.display()))
            })?
            .to_string();

        let mut file = File::open(path).map_err(io_err)?;
        let file_size = file.metadata().map_err(io_err)?.len();

        let mut hashes = Vec::with_capacity(file_size.div_ceil(chunk_size) as usize);
        // a chunk never holds more than the whole file
        let mut buf = vec![0u8; chunk_size.min(file_size) as usize];
        loop {
            let n = read_full(&mut file, &mut buf).map_err(io_err)?;
            if n == 0 {
                break;
            }
            hashes.push(digest_hex(&buf[..n]));
        }

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let descriptor = TransferDescriptor {
            file_name,
            file_size,
            chunk_size,
            total_chunks: hashes.len(),
            hashes,
            peers,
            created_at,
        };
        descriptor.validate()?;
        debug!(
            file = %descriptor.file_name,
            size = descriptor.file_size,
            chunks = descriptor.total_chunks,
            "hashed source file"
        );
        Ok(descriptor)
    }
}
