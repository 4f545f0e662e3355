// Copyright 2025-2026 CloudSnooze Contributors
// SPDX-License-Identifier: Apache-2.0

//! Input activity source.
//!
//! Reports seconds since the last keyboard/mouse/tty activity by scanning
//! device node timestamps: pseudo-terminals for SSH sessions, consoles and
//! input event nodes for local activity. Hosts with no such nodes report
//! zero, which the input criterion reads as "not idle".

use std::path::Path;
use std::time::SystemTime;

use super::{MetricSource, ProbeError};

/// Seconds since last observed input event. Higher is more idle; the
/// engine's input predicate is inverted relative to the other criteria.
pub struct InputSource {
    scan_dirs: Vec<&'static str>,
}

impl InputSource {
    pub fn new() -> Self {
        Self {
            scan_dirs: vec!["/dev/pts", "/dev/input"],
        }
    }

    /// Newest activity timestamp across all scanned device nodes.
    fn last_activity(&self) -> Option<SystemTime> {
        let mut newest: Option<SystemTime> = None;

        for dir in &self.scan_dirs {
            scan_dir(Path::new(dir), &mut newest);
        }

        // Virtual consoles live directly under /dev.
        if let Ok(entries) = std::fs::read_dir("/dev") {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with("tty") && name.len() > 3 {
                    consider(entry.path().as_path(), &mut newest);
                }
            }
        }

        newest
    }
}

fn scan_dir(dir: &Path, newest: &mut Option<SystemTime>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        consider(entry.path().as_path(), newest);
    }
}

fn consider(path: &Path, newest: &mut Option<SystemTime>) {
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    // atime is suppressed on noatime mounts; take whichever is fresher.
    let stamp = match (meta.accessed(), meta.modified()) {
        (Ok(a), Ok(m)) => a.max(m),
        (Ok(a), Err(_)) => a,
        (Err(_), Ok(m)) => m,
        (Err(_), Err(_)) => return,
    };
    match newest {
        Some(current) if *current >= stamp => {}
        _ => *newest = Some(stamp),
    }
}

impl Default for InputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for InputSource {
    fn name(&self) -> &'static str {
        "input"
    }

    #[cfg(unix)]
    fn probe(&mut self) -> Result<f64, ProbeError> {
        let Some(last) = self.last_activity() else {
            return Ok(0.0);
        };
        let idle = SystemTime::now()
            .duration_since(last)
            .unwrap_or_default()
            .as_secs();
        Ok(idle as f64)
    }

    #[cfg(not(unix))]
    fn probe(&mut self) -> Result<f64, ProbeError> {
        Ok(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_nonnegative() {
        let mut source = InputSource::new();
        let idle = source.probe().unwrap();
        assert!(idle >= 0.0);
    }

    #[test]
    fn test_consider_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        std::fs::write(&old, b"x").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(&new, b"x").unwrap();

        let mut newest = None;
        consider(&old, &mut newest);
        let after_old = newest;
        consider(&new, &mut newest);
        assert!(newest >= after_old);
    }

    #[test]
    fn test_scan_missing_dir_is_noop() {
        let mut newest = None;
        scan_dir(Path::new("/definitely/not/here"), &mut newest);
        assert!(newest.is_none());
    }

    #[test]
    fn test_name() {
        assert_eq!(InputSource::new().name(), "input");
    }
}
