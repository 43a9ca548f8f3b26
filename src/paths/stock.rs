//! Stock sysfs locations for every logical tunable, and the scan primitive
//! that picks the first candidate actually present on the running kernel.
//! The tables carry one entry per known SoC variant; resolution order is
//! the order written here.

use std::path::Path;

pub const CLUSTER_ROOT: &[&str] = &["/sys/devices/system/cpu"];
pub const CPUFREQ: &[&str] = &["cpu0/cpufreq"];
pub const CPUFREQ_GOVERNOR: &[&str] = &["scaling_governor"];
pub const CPUFREQ_AVAILABLE_GOVERNORS: &[&str] = &["scaling_available_governors"];
pub const CPUFREQ_MAX: &[&str] = &["scaling_max_freq"];
pub const CPUFREQ_MIN: &[&str] = &["scaling_min_freq"];
pub const CPUFREQ_SPEED: &[&str] = &["scaling_setspeed"];

pub const CPUSET_ROOT: &[&str] = &["/dev/cpuset"];
pub const CPUSET_CPUS: &[&str] = &["cpus"];
pub const CPUSET_CPU_EXCLUSIVE: &[&str] = &["cpu_exclusive"];

pub const IPA_ROOT: &[&str] = &["/sys/power/ipa"];
pub const IPA_ENABLED: &[&str] = &["enabled"];
pub const IPA_CONTROL_TEMP: &[&str] = &["control_temp"];

pub const GPU_ROOT: &[&str] = &["/sys/devices/14ac0000.mali"];
pub const GPU_DVFS_MAX: &[&str] = &["dvfs_max_lock"];
pub const GPU_DVFS_MIN: &[&str] = &["dvfs_min_lock"];
pub const GPU_HIGHSPEED_CLOCK: &[&str] = &["highspeed_clock"];
pub const GPU_HIGHSPEED_LOAD: &[&str] = &["highspeed_load"];

pub const KERNEL_DYNAMIC_HOTPLUG: &[&str] = &["/sys/power/enable_dm_hotplug"];
pub const KERNEL_POWER_EFFICIENT: &[&str] = &["/sys/module/workqueue/parameters/power_efficient"];

pub const HMP_ROOT: &[&str] = &["/sys/kernel/hmp"];
pub const HMP_BOOST: &[&str] = &["boost"];
pub const HMP_SEMIBOOST: &[&str] = &["semiboost"];
pub const HMP_ACTIVE_DOWN_MIGRATION: &[&str] = &["active_down_migration"];
pub const HMP_AGGRESSIVE_UP_MIGRATION: &[&str] = &["aggressive_up_migration"];
pub const HMP_THRESHOLD_DOWN: &[&str] = &["down_threshold"];
pub const HMP_THRESHOLD_UP: &[&str] = &["up_threshold"];
pub const HMP_SB_THRESHOLD_DOWN: &[&str] = &["sb_down_threshold"];
pub const HMP_SB_THRESHOLD_UP: &[&str] = &["sb_up_threshold"];

pub const INPUT_BOOSTER_ROOT: &[&str] = &["/sys/class/input_booster"];
pub const INPUT_BOOSTER_HEAD: &[&str] = &["head"];
pub const INPUT_BOOSTER_TAIL: &[&str] = &["tail"];

pub const SEC_SLOW_ROOT: &[&str] = &["/sys/devices/virtual/sec/sec_slow"];
pub const SEC_SLOW_ENABLED: &[&str] = &["slow_mode"];
pub const SEC_SLOW_ENFORCED: &[&str] = &["enforced_slow_mode"];
pub const SEC_SLOW_TIMER_RATE: &[&str] = &["timer_rate"];

pub const INPUT_TOUCHKEY: &[&str] = &["/sys/class/sec/sec_touchkey/input/enabled"];
pub const INPUT_TOUCHSCREEN: &[&str] = &["/sys/class/sec/tsp/input/enabled"];
pub const INPUT_DT2W: &[&str] = &[
    "/sys/class/sec/tsp/dt2w_enable",
    "/sys/android_touch/doubletap2wake",
];

pub fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

/// Join a prefix and a fragment with a single separator. Either side may be
/// empty, in which case the other is returned as-is; fragments must not be
/// rooted or the concatenation would produce a `//` path.
pub fn join(prefix: &str, fragment: &str) -> String {
    if prefix.is_empty() {
        fragment.to_string()
    } else if fragment.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{fragment}")
    }
}

/// Walk candidate fragments against an ordered prefix list and return the
/// first `(fragment, prefix)` pair whose concatenation exists on disk.
/// Without prefixes the candidates are treated as absolute paths and the
/// returned prefix is empty.
pub fn scan(candidates: &[&str], prefixes: &[&str]) -> Option<(String, String)> {
    if prefixes.is_empty() {
        return candidates
            .iter()
            .find(|candidate| exists(candidate))
            .map(|candidate| ((*candidate).to_string(), String::new()));
    }
    for prefix in prefixes {
        if !exists(prefix) {
            continue;
        }
        for candidate in candidates {
            if exists(&join(prefix, candidate)) {
                return Some(((*candidate).to_string(), (*prefix).to_string()));
            }
        }
    }
    None
}

/// Runtime view of the cluster-root table. Unlike the other tables this one
/// grows: a manifest may declare a custom cluster root, which then becomes a
/// valid candidate for every cluster resolved after it.
#[derive(Debug, Clone)]
pub struct Registry {
    cluster_roots: Vec<String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            cluster_roots: CLUSTER_ROOT.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Registry {
    /// A registry with a caller-supplied cluster-root table instead of the
    /// stock one.
    pub fn with_cluster_roots(cluster_roots: Vec<String>) -> Self {
        Self { cluster_roots }
    }

    pub fn cluster_roots(&self) -> Vec<&str> {
        self.cluster_roots.iter().map(String::as_str).collect()
    }

    pub fn cache_cluster_root(&mut self, root: &str) {
        if !self.cluster_roots.iter().any(|known| known == root) {
            self.cluster_roots.push(root.to_string());
        }
    }
}
