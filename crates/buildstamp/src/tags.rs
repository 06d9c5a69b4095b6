//! Tag substitution: literal placeholder/value replacement across the source
//! tree, paired with guaranteed restoration.
//!
//! Injection rewrites files in place with no backup copy, so the injected
//! state must never outlive a build. [`inject`] returns a [`TagGuard`] that
//! restores every applied substitution either explicitly on the success path
//! or from `Drop` on any other exit path.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One placeholder literal and the source files (relative to the tree root)
/// that declare it.
#[derive(Debug, Clone)]
pub struct TagSpec {
    pub placeholder: String,
    pub files: Vec<String>,
}

impl TagSpec {
    pub fn new(placeholder: &str, files: &[&str]) -> Self {
        Self {
            placeholder: placeholder.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// The four tag slots of a build, in injection order.
#[derive(Debug, Clone)]
pub struct TagLayout {
    pub ca: TagSpec,
    pub endpoint: TagSpec,
    pub indicator: TagSpec,
    pub build_id: TagSpec,
}

impl TagLayout {
    // The endpoint placeholder is deliberately a plausible address: the
    // compiled-in fallback when no endpoint is injected.
    pub fn standard() -> Self {
        Self {
            ca: TagSpec::new("[buildstamp_ca]", &["internal/transport/tls.go"]),
            endpoint: TagSpec::new("192.0.2.1", &["internal/agent/def.go"]),
            indicator: TagSpec::new("[buildstamp_indicator]", &["internal/agent/def.go"]),
            build_id: TagSpec::new("[buildstamp_build_id]", &["internal/agent/def.go"]),
        }
    }
}

impl Default for TagLayout {
    fn default() -> Self {
        Self::standard()
    }
}

/// Concrete values for one build. `indicator` is `None` for server builds,
/// which leave that placeholder untouched.
#[derive(Debug, Clone)]
pub struct TagValues {
    pub ca_certificate: String,
    pub endpoint: String,
    pub indicator: Option<String>,
    pub build_id: String,
}

#[derive(Debug)]
struct Applied {
    path: PathBuf,
    placeholder: String,
    value: String,
}

/// Restoration obligation for a set of applied substitutions.
///
/// Records are undone in reverse order of application, so a value that
/// happens to contain another slot's placeholder as a substring still
/// round-trips to byte-identical file content.
#[derive(Debug, Default)]
pub struct TagGuard {
    applied: Vec<Applied>,
    restored: bool,
}

/// Substitute real values for placeholders across the layout's file lists.
///
/// Order: CA certificate, endpoint address, liveness indicator, build
/// identifier. A failure part-way through returns the error; the guard built
/// so far restores whatever was already applied when it drops.
pub fn inject(root: &Path, layout: &TagLayout, values: &TagValues) -> Result<TagGuard> {
    let mut guard = TagGuard::default();
    guard.apply(root, &layout.ca, &values.ca_certificate)?;
    guard.apply(root, &layout.endpoint, &values.endpoint)?;
    if let Some(indicator) = values.indicator.as_deref() {
        guard.apply(root, &layout.indicator, indicator)?;
    }
    guard.apply(root, &layout.build_id, &values.build_id)?;
    Ok(guard)
}

impl TagGuard {
    fn apply(&mut self, root: &Path, spec: &TagSpec, value: &str) -> Result<()> {
        // An empty placeholder or value has no invertible substitution.
        if spec.placeholder.is_empty() || value.is_empty() {
            debug!("skipping tag '{}' (empty placeholder or value)", spec.placeholder);
            return Ok(());
        }
        for rel in &spec.files {
            let path = root.join(rel);
            if replace_in_file(&path, &spec.placeholder, value)? {
                self.applied.push(Applied {
                    path,
                    placeholder: spec.placeholder.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Put every placeholder back, failing on the first file that cannot be
    /// rewritten. Remaining records are still attempted from `Drop`.
    pub fn restore(mut self) -> Result<()> {
        while let Some(rec) = self.applied.pop() {
            replace_in_file(&rec.path, &rec.value, &rec.placeholder)?;
        }
        self.restored = true;
        Ok(())
    }
}

impl Drop for TagGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        while let Some(rec) = self.applied.pop() {
            if let Err(e) = replace_in_file(&rec.path, &rec.value, &rec.placeholder) {
                warn!("failed to restore tag in {}: {e}", rec.path.display());
            }
        }
    }
}

/// Literal (non-pattern) global replacement, rewriting the file in place.
/// Returns whether the file changed. No write happens when `from == to` or
/// the file contains no occurrence; restoration keys off the same result.
pub fn replace_in_file(path: &Path, from: &str, to: &str) -> Result<bool> {
    if from == to {
        return Ok(false);
    }
    let text = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;
    if !text.contains(from) {
        return Ok(false);
    }
    let rewritten = text.replace(from, to);
    fs::write(path, rewritten)
        .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_literal_not_pattern() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        fs::write(&file, "addr = \"1.2.3.4\"").unwrap();

        // A regex engine would treat the dots as wildcards.
        let changed = replace_in_file(&file, "1x2x3x4", "other").unwrap();
        assert!(!changed);
        let changed = replace_in_file(&file, "1.2.3.4", "10.0.0.1").unwrap();
        assert!(changed);
        assert_eq!(fs::read_to_string(&file).unwrap(), "addr = \"10.0.0.1\"");
    }

    #[test]
    fn identical_from_and_to_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        fs::write(&file, "token token").unwrap();

        let changed = replace_in_file(&file, "token", "token").unwrap();
        assert!(!changed);
    }

    #[test]
    fn replaces_every_occurrence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.txt");
        fs::write(&file, "x [tag] y [tag] z").unwrap();

        replace_in_file(&file, "[tag]", "v").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "x v y v z");
    }
}
