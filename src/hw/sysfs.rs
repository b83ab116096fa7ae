//! Small filesystem helpers for the sysfs attribute surface.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

pub fn write_file(path: impl AsRef<Path>, data: &str) -> io::Result<()> {
    trace!(path = %path.as_ref().display(), data, "sysfs write");
    fs::write(path, data)
}

pub fn append_file(path: impl AsRef<Path>, data: &str) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_ref())?;
    file.write_all(data.as_bytes())
}

pub fn read_file(path: impl AsRef<Path>) -> io::Result<String> {
    fs::read_to_string(path)
}

pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

/// Scan the IIO device directories under `base` for one whose `id_file`
/// content matches `target` (trailing newline ignored) and return its path.
pub fn find_device_path_by_name(
    base: impl AsRef<Path>,
    id_file: &str,
    target: &str,
) -> io::Result<PathBuf> {
    let base = base.as_ref();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with("iio:device") {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path().join(id_file)) else {
            continue;
        };
        if content.trim_end() == target {
            return Ok(entry.path());
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("device '{target}' not found under {}", base.display()),
    ))
}
