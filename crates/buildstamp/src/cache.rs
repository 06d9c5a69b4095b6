//! Plaintext cache files for operator-supplied values. The endpoint cache
//! file doubles as the certificate cache marker.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Read a cached value. `None` when the file is missing or blank.
pub fn load(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn store(path: &Path, value: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", parent.display())))?;
    }
    fs::write(path, value)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_trims() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("endpoint.txt");

        assert_eq!(load(&path), None);
        store(&path, "203.0.113.5").unwrap();
        assert_eq!(load(&path).as_deref(), Some("203.0.113.5"));

        fs::write(&path, "  10.0.0.1\n").unwrap();
        assert_eq!(load(&path).as_deref(), Some("10.0.0.1"));

        fs::write(&path, "   \n").unwrap();
        assert_eq!(load(&path), None);
    }
}
