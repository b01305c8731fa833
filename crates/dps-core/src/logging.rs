//! Logging init: rotating file under the XDG state dir, or stderr fallback.
//!
//! The scheduler logs a progress line per task transition, so a long-lived
//! process accretes log volume steadily; the file is rotated once on init
//! when it outgrows `MAX_LOG_BYTES` (previous file kept as `dps.log.1`).

use anyhow::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Rotation threshold for the log file.
const MAX_LOG_BYTES: u64 = 8 * 1024 * 1024;

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,dps_core=debug"))
}

/// Moves `path` aside to `<path>.1` when it exceeds `max_bytes`, replacing
/// any earlier rotated file. Missing file is fine; rename errors are not
/// fatal (logging proceeds appending to the oversized file).
fn rotate_if_large(path: &Path, max_bytes: u64) {
    let Ok(meta) = fs::metadata(path) else { return };
    if meta.len() <= max_bytes {
        return;
    }
    let mut rotated = path.as_os_str().to_owned();
    rotated.push(".1");
    if let Err(e) = fs::rename(path, PathBuf::from(rotated)) {
        eprintln!("dps: log rotation failed: {e}");
    }
}

/// Writer that is either a file or stderr (used when file clone fails).
enum FileOrStderr {
    File(std::fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct FileMakeWriter(std::fs::File);

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileOrStderr;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(FileOrStderr::File)
            .unwrap_or(FileOrStderr::Stderr)
    }
}

/// Initialize structured logging to `~/.local/state/dps/dps.log`, rotating
/// the previous file once when oversized. On failure (e.g. log dir
/// unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dps")?;
    let log_dir = xdg_dirs.get_state_home();

    fs::create_dir_all(&log_dir)?;
    let log_file_path: PathBuf = log_dir.join("dps.log");
    rotate_if_large(&log_file_path, MAX_LOG_BYTES);

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    let writer: BoxMakeWriter = BoxMakeWriter::new(FileMakeWriter(file));

    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();

    tracing::info!("dps logging initialized at {}", log_file_path.display());

    Ok(())
}

/// Initialize logging to stderr only (no file). Use when init_logging() fails.
pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotate_skips_small_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dps.log");

        // missing file: no-op
        rotate_if_large(&path, 16);
        assert!(!path.exists());

        fs::write(&path, b"short").unwrap();
        rotate_if_large(&path, 16);
        assert!(path.exists());
        assert!(!dir.path().join("dps.log.1").exists());
    }

    #[test]
    fn rotate_moves_oversized_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dps.log");
        fs::write(&path, vec![b'x'; 64]).unwrap();

        rotate_if_large(&path, 16);
        assert!(!path.exists());
        let rotated = dir.path().join("dps.log.1");
        assert_eq!(fs::read(&rotated).unwrap().len(), 64);

        // a second oversized file replaces the old rotation
        fs::write(&path, vec![b'y'; 64]).unwrap();
        rotate_if_large(&path, 16);
        assert_eq!(fs::read(&rotated).unwrap(), vec![b'y'; 64]);
    }
}
