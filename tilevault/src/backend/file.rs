//! Local file backend.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use super::{check_bounds, BoxFuture, RangeError, RangeReader};

/// Reads byte ranges from a local file.
///
/// The file is opened once. Reads are positioned (no shared cursor), so
/// concurrent reads run in parallel on blocking workers.
pub struct FileReader {
    path: PathBuf,
    file: Arc<File>,
    length: u64,
}

impl FileReader {
    /// Opens `path` and records its length.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RangeError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();

        let (file, length) = tokio::task::spawn_blocking(move || {
            let file = File::open(&open_path)?;
            let length = file.metadata()?.len();
            Ok::<_, io::Error>((file, length))
        })
        .await
        .map_err(|e| RangeError::Transport(format!("blocking task failed: {}", e)))?
        .map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), length, "Opened archive file");

        Ok(Self {
            path,
            file: Arc::new(file),
            length,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RangeReader for FileReader {
    fn total_length(&self) -> BoxFuture<'_, Result<u64, RangeError>> {
        let length = self.length;
        Box::pin(async move { Ok(length) })
    }

    fn read_range(&self, offset: u64, length: u64) -> BoxFuture<'_, Result<Bytes, RangeError>> {
        Box::pin(async move {
            check_bounds(offset, length, self.length)?;
            if length == 0 {
                return Ok(Bytes::new());
            }

            let file = Arc::clone(&self.file);
            let size = usize::try_from(length).map_err(|_| RangeError::OutOfBounds {
                offset,
                length,
                total: self.length,
            })?;

            let result = tokio::task::spawn_blocking(move || {
                let mut buf = vec![0u8; size];
                read_exact_at(&file, &mut buf, offset)?;
                Ok::<_, io::Error>(buf)
            })
            .await
            .map_err(|e| RangeError::Transport(format!("blocking task failed: {}", e)))?;

            match result {
                Ok(buf) => Ok(Bytes::from(buf)),
                // The file shrank underneath us.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(RangeError::ShortRead {
                    offset,
                    expected: length,
                    actual: 0,
                }),
                Err(e) => Err(io_error(&self.path, e)),
            }
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn io_error(path: &Path, e: io::Error) -> RangeError {
    if e.kind() == io::ErrorKind::NotFound {
        RangeError::NotFound(path.display().to_string())
    } else {
        RangeError::Transport(format!("{}: {}", path.display(), e))
    }
}
