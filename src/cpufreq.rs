//! CPU bursting through the cpufreq governor's boostpulse interface.
//!
//! `boostpulse_duration` takes microseconds, so so does everything here.
//! The caller snapshots wall time before taking its boost lock; whatever
//! was lost waiting for the lock is subtracted from the pulse, keeping the
//! burst window anchored to the event that requested it.

use crate::config::types::{CpuFreq, Paths, Profile};
use crate::paths::{exists, join};
use crate::util::sysfs::write_value;
use log::{debug, error};
use std::time::Instant;

/// Write a boost pulse to every cluster of the effective profile. With a
/// non-positive `duration_us` each cluster falls back to the
/// `boostpulse_duration` tunable of its active governor and is skipped when
/// it has none. Per-cluster failures are logged and the walk continues.
pub fn pulse_clusters(paths: &Paths, profile: &Profile, duration_us: i64, start: Instant) {
    for (cluster_name, cluster) in &profile.clusters {
        let Some(freq) = &cluster.cpufreq else {
            continue;
        };
        let governor = freq.governor.as_deref().unwrap_or_default();
        if governor.is_empty() {
            error!("failed to boost {cluster_name}: could not identify governor");
            continue;
        }

        let mut pulse_us = duration_us;
        if pulse_us <= 0 {
            pulse_us = match governor_pulse_duration(freq, governor) {
                Some(value) if value > 0 => value,
                _ => continue,
            };
        }
        pulse_us -= (start.elapsed().as_millis() as i64) * 1000;
        if pulse_us <= 0 {
            continue;
        }

        let Some(freq_paths) = paths.clusters.get(cluster_name).and_then(|c| c.cpufreq.as_ref())
        else {
            continue;
        };
        let governor_dir = join(&freq_paths.path, governor);
        let duration_path = join(&governor_dir, "boostpulse_duration");
        if !exists(&duration_path) {
            error!(
                "failed to time boost on {cluster_name} for {pulse_us}us: \
                 no control at {duration_path}"
            );
            continue;
        }
        if let Err(e) = write_value(&duration_path, &pulse_us.to_string()) {
            error!("failed to time boost on {cluster_name} for {pulse_us}us: {e}");
            continue;
        }
        if let Err(e) = write_value(&join(&governor_dir, "boostpulse"), "1") {
            error!("failed to boost {cluster_name}: {e}");
            continue;
        }
        debug!("boosting {cluster_name} for {pulse_us}us");
    }
}

fn governor_pulse_duration(freq: &CpuFreq, governor: &str) -> Option<i64> {
    freq.governors
        .get(governor)?
        .get("boostpulse_duration")?
        .as_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Paths;
    use crate::paths::{Registry, resolve};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fixture(dir: &TempDir) -> (Paths, String) {
        let root = dir.path().join("sys/devices/system/cpu");
        let freq = root.join("cpu0/cpufreq");
        touch(&freq.join("scaling_governor"), "interactive\n");
        touch(&freq.join("interactive/boostpulse_duration"), "0\n");
        touch(&freq.join("interactive/boostpulse"), "0\n");
        let root = root.to_string_lossy().into_owned();
        let declared = serde_json::from_str(&format!(
            r#"{{"clusters": {{"apollo": {{"path": "{root}"}}}}}}"#
        ))
        .unwrap();
        let paths = resolve(Some(declared), &mut Registry::with_cluster_roots(vec![])).unwrap();
        (paths, format!("{root}/cpu0/cpufreq/interactive"))
    }

    fn profile(json: &str) -> Profile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn explicit_duration_pulses_the_governor() {
        let dir = TempDir::new().unwrap();
        let (paths, governor_dir) = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {"governor": "interactive"}}}}"#,
        );

        pulse_clusters(&paths, &profile, 16_666, Instant::now());
        let staged: i64 = fs::read_to_string(format!("{governor_dir}/boostpulse_duration"))
            .unwrap()
            .parse()
            .unwrap();
        assert!(staged > 0 && staged <= 16_666);
        assert_eq!(
            fs::read_to_string(format!("{governor_dir}/boostpulse")).unwrap(),
            "1"
        );
    }

    #[test]
    fn zero_duration_falls_back_to_the_governor_tunable() {
        let dir = TempDir::new().unwrap();
        let (paths, governor_dir) = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {
                "governor": "interactive",
                "governors": {"interactive": {"boostpulse_duration": 50000}}
            }}}}"#,
        );

        pulse_clusters(&paths, &profile, 0, Instant::now());
        let staged: i64 = fs::read_to_string(format!("{governor_dir}/boostpulse_duration"))
            .unwrap()
            .parse()
            .unwrap();
        assert!(staged > 0 && staged <= 50_000);
    }

    #[test]
    fn zero_duration_without_a_tunable_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let (paths, governor_dir) = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {"governor": "interactive"}}}}"#,
        );

        pulse_clusters(&paths, &profile, 0, Instant::now());
        assert_eq!(
            fs::read_to_string(format!("{governor_dir}/boostpulse")).unwrap(),
            "0"
        );
    }

    #[test]
    fn contention_time_is_subtracted() {
        let dir = TempDir::new().unwrap();
        let (paths, governor_dir) = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {"governor": "interactive"}}}}"#,
        );

        // A snapshot far in the past swallows the whole pulse.
        let start = Instant::now() - std::time::Duration::from_millis(100);
        pulse_clusters(&paths, &profile, 16_666, start);
        assert_eq!(
            fs::read_to_string(format!("{governor_dir}/boostpulse")).unwrap(),
            "0"
        );
    }
}
