use anyhow::{anyhow, Result};
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

/// Returns a file's modification time as whole seconds since the epoch.
pub fn mtime(path: &Path) -> io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    match modified.duration_since(UNIX_EPOCH) {
        Ok(duration) => Ok(duration.as_secs() as i64),
        // Pre-epoch mtimes shouldn't happen for post sources; treat them as
        // invalid input rather than wrapping around.
        Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    }
}
