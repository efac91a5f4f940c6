use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

/// Directory used for downloads when none is given.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Owns the directory downloaded files are written into.
pub struct Storage {
    /// The root directory where files will be stored.
    pub download_dir: PathBuf,
}

impl Storage {
    /// Creates a new `Storage` instance.
    ///
    /// If `path` is `None`, a `downloads` directory in the current working
    /// directory is used. The directory is created if it does not exist; a
    /// path that exists but is not a directory is an error.
    pub async fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let download_dir = match path {
            Some(p) => p,
            None => std::env::current_dir()?.join(DEFAULT_DOWNLOAD_DIR),
        };

        match fs::metadata(&download_dir).await {
            Ok(metadata) => {
                if !metadata.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "Path exists but is not a directory",
                    ));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&download_dir).await?;
            }
            Err(e) => return Err(e),
        }

        Ok(Self { download_dir })
    }

    /// Resolves `file_name` inside the download directory.
    pub fn get_file_path(&self, file_name: &str) -> PathBuf {
        self.download_dir.join(file_name)
    }

    /// Creates (or truncates) `file_name` and sizes it to exactly `len` bytes,
    /// so chunks can later be written at any offset.
    pub async fn create_output(&self, file_name: &str, len: u64) -> io::Result<(PathBuf, File)> {
        let path = self.get_file_path(file_name);
        let file = presized_file(&path, len).await?;
        Ok((path, file))
    }
}

async fn presized_file(path: &Path, len: u64) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await?;
    file.set_len(len).await?;
    Ok(file)
}
