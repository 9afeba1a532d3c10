use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Creates `base/label-{v}` for the first version `v` not yet present and returns its path.
///
/// `base` is created if it does not exist. Versions start at zero.
///
/// # Errors
///
/// Returns any I/O error raised while creating `base` or the versioned directory.
pub fn versioned_dir(base: &Path, label: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let mut version = 0usize;
    loop {
        let candidate = base.join(format!("{label}-{version}"));
        match fs::create_dir(&candidate) {
            Ok(()) => {
                debug!(path = %candidate.display(), "Created run directory.");
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => version += 1,
            Err(e) => return Err(e),
        }
    }
}
