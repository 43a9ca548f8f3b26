//! Three-phase cpuset application.
//!
//! The kernel rejects overlapping exclusive cpusets, so a transition cannot
//! simply write the new masks in place: first every declared set drops its
//! exclusive bit, then the new cpu lists go in, and only then are the new
//! exclusive bits raised. Each pass is flushed before the next starts.
//!
//! With `flush` off the three passes coalesce in the buffer instead, which
//! is what a caller layering further overrides on top wants before its own
//! single flush.

use crate::config::types::{Paths, Profile};
use crate::util::sysfs::WriteBuffer;
use log::debug;

/// Stage (and with `flush` set, write) the profile's cpusets. Returns the
/// number of writes issued.
pub fn apply_cpusets(
    paths: &Paths,
    profile: &Profile,
    buffer: &mut WriteBuffer,
    flush: bool,
) -> usize {
    if profile.cpusets.is_empty() {
        return 0;
    }
    let Some(cpuset_paths) = &paths.cpusets else {
        debug!("no cpuset paths resolved, skipping");
        return 0;
    };
    let mut written = 0;

    // Pass 1: clear every exclusive bit so the new masks cannot collide
    // with masks still owned by the outgoing profile.
    for name in profile.cpusets.keys() {
        if let Some(set_paths) = cpuset_paths.sets.get(name) {
            buffer.stage_bool(&set_paths.cpu_exclusive, false);
        }
    }
    if flush {
        written += buffer.flush();
    }

    // Pass 2: the new cpu lists.
    for (name, set) in &profile.cpusets {
        let Some(set_paths) = cpuset_paths.sets.get(name) else {
            debug!("no paths resolved for cpuset {name}, skipping");
            continue;
        };
        if let Some(cpus) = &set.cpus {
            buffer.stage(&set_paths.cpus, cpus);
        }
    }
    if flush {
        written += buffer.flush();
    }

    // Pass 3: raise the exclusive bits the profile asks for.
    for (name, set) in &profile.cpusets {
        let (Some(set_paths), Some(exclusive)) = (cpuset_paths.sets.get(name), set.cpu_exclusive)
        else {
            continue;
        };
        buffer.stage_bool(&set_paths.cpu_exclusive, exclusive);
    }
    if flush {
        written += buffer.flush();
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::{Registry, resolve};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture(dir: &TempDir) -> (Paths, String) {
        let root = dir.path().join("dev/cpuset");
        touch(&root.join("foreground/cpus"), "0-3\n");
        touch(&root.join("foreground/cpu_exclusive"), "0\n");
        touch(&root.join("background/cpus"), "0-7\n");
        touch(&root.join("background/cpu_exclusive"), "1\n");
        let root = root.to_string_lossy().into_owned();
        let declared = serde_json::from_str(&format!(
            r#"{{"cpusets": {{"path": "{root}", "sets": {{"foreground": {{}}, "background": {{}}}}}}}}"#
        ))
        .unwrap();
        let paths = resolve(Some(declared), &mut Registry::default()).unwrap();
        (paths, root)
    }

    fn read(root: &str, fragment: &str) -> String {
        fs::read_to_string(format!("{root}/{fragment}")).unwrap()
    }

    #[test]
    fn exclusive_transition_lands_in_three_passes() {
        let dir = TempDir::new().unwrap();
        let (paths, root) = fixture(&dir);
        // background was exclusive; the new profile hands 0-7 to foreground
        // exclusively and shrinks background.
        let profile: Profile = serde_json::from_str(
            r#"{"cpusets": {
                "foreground": {"cpus": "0-7", "cpu_exclusive": true},
                "background": {"cpus": "0-3"}
            }}"#,
        )
        .unwrap();

        let mut buffer = WriteBuffer::new();
        let written = apply_cpusets(&paths, &profile, &mut buffer, true);
        assert!(buffer.is_empty());
        // background exclusive cleared, foreground raised, both cpu lists set.
        assert_eq!(written, 4);
        assert_eq!(read(&root, "background/cpu_exclusive"), "0");
        assert_eq!(read(&root, "foreground/cpu_exclusive"), "1");
        assert_eq!(read(&root, "foreground/cpus"), "0-7");
        assert_eq!(read(&root, "background/cpus"), "0-3");
    }

    #[test]
    fn unflushed_passes_coalesce_in_the_buffer() {
        let dir = TempDir::new().unwrap();
        let (paths, root) = fixture(&dir);
        let profile: Profile = serde_json::from_str(
            r#"{"cpusets": {
                "foreground": {"cpus": "0-7", "cpu_exclusive": true},
                "background": {"cpus": "0-3"}
            }}"#,
        )
        .unwrap();

        let mut buffer = WriteBuffer::new();
        let written = apply_cpusets(&paths, &profile, &mut buffer, false);
        assert_eq!(written, 0);
        // foreground's clear and raise collapsed into one final write;
        // background keeps only its clear.
        let entries: Vec<(&str, &str)> = buffer
            .entries()
            .iter()
            .map(|(p, v)| (p.strip_prefix(&format!("{root}/")).unwrap(), v.as_str()))
            .collect();
        assert_eq!(
            entries,
            [
                ("background/cpu_exclusive", "0"),
                ("background/cpus", "0-3"),
                ("foreground/cpus", "0-7"),
                ("foreground/cpu_exclusive", "1"),
            ]
        );
    }

    #[test]
    fn missing_cpuset_paths_are_tolerated() {
        let dir = TempDir::new().unwrap();
        let (paths, _) = fixture(&dir);
        let profile: Profile =
            serde_json::from_str(r#"{"cpusets": {"top_app": {"cpus": "4-7"}}}"#).unwrap();
        let mut buffer = WriteBuffer::new();
        assert_eq!(apply_cpusets(&paths, &profile, &mut buffer, true), 0);
    }
}
