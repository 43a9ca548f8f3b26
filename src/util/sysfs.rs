//! Low-level sysfs access plus the buffered write scheduler.
//!
//! Profile application stages every tunable into a [`WriteBuffer`] first and
//! flushes once. Staging coalesces duplicate paths (later values win, as
//! inheritance requires) while the flush order stays the order in which each
//! path was first staged, since some controls only become writable after an
//! earlier write in the same batch (a governor before its tunables).

use crate::util::error::ControlError;
use log::{debug, error, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::{fs, io};

/// Staged payload that clears a control file by writing the empty string.
/// The empty string itself means "do not write" and never enters the buffer.
pub const CLEAR: &str = "-";

/// Boolean spellings accepted by kernel drivers, in detection order.
const BOOL_SPELLINGS: &[(&str, &str)] = &[
    ("1", "0"),
    ("t", "f"),
    ("T", "F"),
    ("true", "false"),
    ("True", "False"),
    ("TRUE", "FALSE"),
    ("y", "n"),
    ("Y", "N"),
    ("yes", "no"),
    ("Yes", "No"),
    ("YES", "NO"),
];

/// Read a control file, stripping a single trailing newline.
pub fn read_value(path: &str) -> Result<String, ControlError> {
    let mut contents = fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => {
            ControlError::PermissionDenied(format!("cannot read {path}"))
        }
        _ => ControlError::Read {
            path: path.to_string(),
            source: e,
        },
    })?;
    if contents.ends_with('\n') {
        contents.pop();
    }
    Ok(contents)
}

/// Write a control file, skipping the syscall when the current contents
/// already equal the payload. Kernel notifiers fire on every write, so
/// redundant writes are worth avoiding. Returns whether a write was issued.
///
/// The file is created 0644 when it does not exist yet (the profile cache
/// file relies on this); no trailing newline is appended.
pub fn write_value(path: &str, value: &str) -> Result<bool, ControlError> {
    let payload = if value == CLEAR { "" } else { value };
    match read_value(path) {
        Ok(current) if current == payload => return Ok(false),
        Ok(_) => {}
        Err(e) => warn!("{e}"),
    }
    debug!("writing '{payload}' > {path}");
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .and_then(|mut file| file.write_all(payload.as_bytes()))
        .map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                ControlError::PermissionDenied(format!("cannot write {path}"))
            }
            _ => ControlError::Write {
                path: path.to_string(),
                source: e,
            },
        })?;
    Ok(true)
}

/// Ordered, coalescing map of pending sysfs writes.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    entries: Vec<(String, String)>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Stage a raw string write. Empty paths and empty values are ignored;
    /// a path staged twice keeps its first position with the newer value.
    pub fn stage(&mut self, path: &str, value: &str) {
        if path.is_empty() || value.is_empty() {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| p == path) {
            entry.1 = value.to_string();
        } else {
            self.entries.push((path.to_string(), value.to_string()));
        }
    }

    /// Stage a boolean, spelled the way the target file currently spells it.
    /// Drivers disagree on what a boolean looks like (`1`, `Y`, `true`, ...),
    /// and mirroring the current vocabulary is the only safe default. When
    /// the file already holds the desired value nothing is staged.
    pub fn stage_bool(&mut self, path: &str, value: bool) {
        if path.is_empty() {
            return;
        }
        let current = match read_value(path) {
            Ok(contents) => Some(contents),
            Err(e) => {
                debug!("{e}");
                None
            }
        };
        let (one, zero) = match current.as_deref().and_then(spelling_of) {
            Some(pair) => pair,
            None => {
                if current.is_some() {
                    warn!("no boolean vocabulary recognized at {path}, defaulting to 1/0");
                }
                ("1", "0")
            }
        };
        let desired = if value { one } else { zero };
        if current.as_deref() == Some(desired) {
            return;
        }
        self.stage(path, desired);
    }

    /// Stage a numeric value. Integers are written verbatim; floats are
    /// formatted with no fractional digits, which is what frequency and
    /// duration controls expect.
    pub fn stage_number(&mut self, path: &str, value: &serde_json::Number) {
        let text = if value.is_f64() {
            format!("{:.0}", value.as_f64().unwrap_or_default())
        } else {
            value.to_string()
        };
        self.stage(path, &text);
    }

    /// Flush every staged write to the filesystem in staging order, then
    /// clear the buffer. Write failures are logged and skipped. Returns the
    /// number of writes actually issued.
    pub fn flush(&mut self) -> usize {
        let mut written = 0;
        for (path, value) in self.entries.drain(..) {
            match write_value(&path, &value) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => error!("{e}"),
            }
        }
        written
    }
}

fn spelling_of(current: &str) -> Option<(&'static str, &'static str)> {
    BOOL_SPELLINGS
        .iter()
        .copied()
        .find(|(one, zero)| current == *one || current == *zero)
}
