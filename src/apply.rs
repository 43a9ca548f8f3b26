//! The tunable applier: walks an effective profile and stages typed writes
//! into the buffer.
//!
//! Staging order is part of the contract. A governor must be written before
//! its per-governor tunables become writable, and GPU and kernel limits may
//! depend on the thermal (IPA) state, so the walk is: clusters, GPU, kernel
//! and HMP, IPA, input booster, sec_slow. Cpusets are not staged here; they
//! need the three-phase treatment in the cpusets module.

use crate::config::types::{Paths, Profile, Scalar};
use crate::paths::join;
use crate::util::error::ControlError;
use crate::util::sysfs::{WriteBuffer, read_value};
use log::{debug, error, warn};

pub fn stage_profile(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    stage_clusters(paths, profile, buffer);
    stage_gpu(paths, profile, buffer);
    stage_kernel(paths, profile, buffer);
    stage_ipa(paths, profile, buffer);
    stage_input_booster(paths, profile, buffer);
    stage_sec_slow(paths, profile, buffer);
}

/// Stage one governor tunable with type dispatch. A value that is neither
/// bool, number nor string is reported and skipped; the rest of the profile
/// still applies.
pub fn stage_scalar(buffer: &mut WriteBuffer, path: &str, value: &Scalar) {
    match value {
        Scalar::Bool(v) => buffer.stage_bool(path, *v),
        Scalar::Number(n) => buffer.stage_number(path, n),
        Scalar::Text(s) => buffer.stage(path, s),
        Scalar::Other(_) => error!(
            "{}",
            ControlError::UnsupportedValue {
                path: path.to_string(),
                found: value.kind().to_string(),
            }
        ),
    }
}

fn stage_clusters(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    for (name, cluster) in &profile.clusters {
        let Some(freq) = &cluster.cpufreq else {
            continue;
        };
        let Some(freq_paths) = paths.clusters.get(name).and_then(|c| c.cpufreq.as_ref()) else {
            debug!("no cpufreq paths resolved for cluster {name}, skipping");
            continue;
        };
        if let Some(governor) = &freq.governor {
            if !governor.is_empty() {
                warn_if_governor_unknown(&freq_paths.governors, governor);
                buffer.stage(&freq_paths.governor, governor);
            }
        }
        if let Some(max) = &freq.max {
            buffer.stage(&freq_paths.max, max.as_str());
        }
        if let Some(min) = &freq.min {
            buffer.stage(&freq_paths.min, min.as_str());
        }
        if let Some(speed) = &freq.speed {
            buffer.stage(&freq_paths.speed, speed.as_str());
        }
        for (governor_name, tunables) in &freq.governors {
            let governor_dir = join(&freq_paths.path, governor_name);
            for (tunable, value) in tunables {
                stage_scalar(buffer, &join(&governor_dir, tunable), value);
            }
        }
    }
}

/// The kernel silently ignores governors it does not advertise; surface
/// that before the write instead of leaving the user puzzled.
fn warn_if_governor_unknown(available_path: &str, governor: &str) {
    if available_path.is_empty() {
        return;
    }
    if let Ok(available) = read_value(available_path) {
        if !available.split_whitespace().any(|name| name == governor) {
            warn!("governor {governor} is not advertised in {available_path}");
        }
    }
}

fn stage_gpu(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    let (Some(gpu), Some(gpu_paths)) = (&profile.gpu, &paths.gpu) else {
        return;
    };
    if let (Some(dvfs), Some(dvfs_paths)) = (&gpu.dvfs, &gpu_paths.dvfs) {
        if let Some(max) = &dvfs.max {
            buffer.stage(&dvfs_paths.max, max.as_str());
        }
        if let Some(min) = &dvfs.min {
            buffer.stage(&dvfs_paths.min, min.as_str());
        }
    }
    if let (Some(highspeed), Some(highspeed_paths)) = (&gpu.highspeed, &gpu_paths.highspeed) {
        if let Some(clock) = &highspeed.clock {
            buffer.stage(&highspeed_paths.clock, clock.as_str());
        }
        if let Some(load) = &highspeed.load {
            buffer.stage(&highspeed_paths.load, load.as_str());
        }
    }
}

fn stage_kernel(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    let (Some(kernel), Some(kernel_paths)) = (&profile.kernel, &paths.kernel) else {
        return;
    };
    if let Some(value) = kernel.dynamic_hotplug {
        buffer.stage_bool(&kernel_paths.dynamic_hotplug, value);
    }
    if let Some(value) = kernel.power_efficient {
        buffer.stage_bool(&kernel_paths.power_efficient, value);
    }
    let (Some(hmp), Some(hmp_paths)) = (&kernel.hmp, &kernel_paths.hmp) else {
        return;
    };
    if let Some(value) = hmp.boost {
        buffer.stage_bool(&hmp_paths.boost, value);
    }
    if let Some(value) = hmp.semiboost {
        buffer.stage_bool(&hmp_paths.semiboost, value);
    }
    if let Some(value) = hmp.active_down_migration {
        buffer.stage_bool(&hmp_paths.active_down_migration, value);
    }
    if let Some(value) = hmp.aggressive_up_migration {
        buffer.stage_bool(&hmp_paths.aggressive_up_migration, value);
    }
    if let (Some(threshold), Some(threshold_paths)) = (&hmp.threshold, &hmp_paths.threshold) {
        if let Some(down) = &threshold.down {
            buffer.stage(&threshold_paths.down, down.as_str());
        }
        if let Some(up) = &threshold.up {
            buffer.stage(&threshold_paths.up, up.as_str());
        }
    }
    if let (Some(threshold), Some(threshold_paths)) = (&hmp.sb_threshold, &hmp_paths.sb_threshold) {
        if let Some(down) = &threshold.down {
            buffer.stage(&threshold_paths.down, down.as_str());
        }
        if let Some(up) = &threshold.up {
            buffer.stage(&threshold_paths.up, up.as_str());
        }
    }
}

fn stage_ipa(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    let (Some(ipa), Some(ipa_paths)) = (&profile.ipa, &paths.ipa) else {
        return;
    };
    let Some(enabled) = ipa.enabled else {
        return;
    };
    buffer.stage_bool(&ipa_paths.enabled, enabled);
    // The control temperature only means anything while IPA is on.
    if enabled {
        if let Some(control_temp) = &ipa.control_temp {
            buffer.stage(&ipa_paths.control_temp, control_temp.as_str());
        }
    }
}

fn stage_input_booster(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    let (Some(booster), Some(booster_paths)) = (&profile.input_booster, &paths.input_booster)
    else {
        return;
    };
    if let Some(head) = &booster.head {
        buffer.stage(&booster_paths.head, head);
    }
    if let Some(tail) = &booster.tail {
        buffer.stage(&booster_paths.tail, tail);
    }
}

fn stage_sec_slow(paths: &Paths, profile: &Profile, buffer: &mut WriteBuffer) {
    let (Some(slow), Some(slow_paths)) = (&profile.sec_slow, &paths.sec_slow) else {
        return;
    };
    let Some(enabled) = slow.enabled else {
        return;
    };
    buffer.stage_bool(&slow_paths.enabled, enabled);
    if enabled {
        if let Some(enforced) = slow.enforced {
            buffer.stage_bool(&slow_paths.enforced, enforced);
        }
        if let Some(timer_rate) = &slow.timer_rate {
            buffer.stage(&slow_paths.timer_rate, timer_rate.as_str());
        }
    }
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

    /// A cluster fixture with an interactive governor directory.
    fn fixture(dir: &TempDir) -> Paths {
        let root = dir.path().join("sys/devices/system/cpu");
        let freq = root.join("cpu0/cpufreq");
        touch(&freq.join("scaling_governor"), "performance\n");
        touch(
            &freq.join("scaling_available_governors"),
            "interactive performance powersave\n",
        );
        touch(&freq.join("scaling_max_freq"), "2100000\n");
        touch(&freq.join("scaling_min_freq"), "200000\n");
        touch(&freq.join("interactive/hispeed_freq"), "0\n");
        touch(&freq.join("interactive/io_is_busy"), "0\n");
        let ipa = dir.path().join("sys/power/ipa");
        touch(&ipa.join("enabled"), "N\n");
        touch(&ipa.join("control_temp"), "0\n");
        let root = root.to_string_lossy().into_owned();
        let ipa = ipa.to_string_lossy().into_owned();
        let declared: Paths = serde_json::from_str(&format!(
            r#"{{"clusters": {{"apollo": {{"path": "{root}"}}}}, "ipa": {{"path": "{ipa}"}}}}"#
        ))
        .unwrap();
        resolve(Some(declared), &mut Registry::with_cluster_roots(vec![])).unwrap()
    }

    fn profile(json: &str) -> Profile {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn cluster_staging_order_is_governor_then_limits_then_tunables() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {
                "governor": "interactive",
                "max": 1200000,
                "min": 400000,
                "governors": {"interactive": {"hispeed_freq": 800000, "io_is_busy": true}}
            }}}}"#,
        );

        let mut buffer = WriteBuffer::new();
        stage_profile(&paths, &profile, &mut buffer);
        let staged: Vec<&str> = buffer
            .entries()
            .iter()
            .map(|(path, _)| path.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(
            staged,
            [
                "scaling_governor",
                "scaling_max_freq",
                "scaling_min_freq",
                "hispeed_freq",
                "io_is_busy",
            ]
        );
        let values: Vec<&str> = buffer.entries().iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["interactive", "1200000", "400000", "800000", "1"]);
    }

    #[test]
    fn control_temp_is_gated_on_ipa_enabled() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let enabled_path = paths.ipa.as_ref().unwrap().enabled.clone();

        fs::write(&enabled_path, "Y\n").unwrap();
        let mut buffer = WriteBuffer::new();
        let off = profile(r#"{"ipa": {"enabled": false, "control_temp": 45000}}"#);
        stage_profile(&paths, &off, &mut buffer);
        assert_eq!(buffer.entries().len(), 1);
        assert_eq!(buffer.entries()[0].1, "N");

        fs::write(&enabled_path, "N\n").unwrap();
        let mut buffer = WriteBuffer::new();
        let on = profile(r#"{"ipa": {"enabled": true, "control_temp": 45000}}"#);
        stage_profile(&paths, &on, &mut buffer);
        let values: Vec<&str> = buffer.entries().iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(values, ["Y", "45000"]);
    }

    #[test]
    fn clusters_without_resolved_paths_are_skipped() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"atlas": {"cpufreq": {"max": 1700000}}}}"#,
        );
        let mut buffer = WriteBuffer::new();
        stage_profile(&paths, &profile, &mut buffer);
        assert!(buffer.is_empty());
    }

    #[test]
    fn non_scalar_tunables_are_reported_and_skipped() {
        let dir = TempDir::new().unwrap();
        let paths = fixture(&dir);
        let profile = profile(
            r#"{"clusters": {"apollo": {"cpufreq": {
                "governors": {"interactive": {"hispeed_freq": [1, 2]}}
            }}}}"#,
        );
        let mut buffer = WriteBuffer::new();
        stage_profile(&paths, &profile, &mut buffer);
        assert!(buffer.is_empty());
    }
}
