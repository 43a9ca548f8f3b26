//! Device manifest schema: profiles, tunables and the path declarations
//! they resolve against. Everything a profile can carry is optional, since
//! absence means "inherit from the profile chain or leave the kernel alone".

use serde::{Deserialize, Deserializer, de};
use std::collections::BTreeMap;
use std::fmt;

/// A decimal kept in its lexical form. Frequency and temperature values
/// must round-trip exactly, so numbers are never parsed into floats unless
/// a consumer explicitly asks for one. Deserializes from a JSON number or
/// a JSON string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Decimal {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DecimalVisitor;

        impl de::Visitor<'_> for DecimalVisitor {
            type Value = Decimal;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Decimal, E> {
                Ok(Decimal(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Decimal, E> {
                Ok(Decimal(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Decimal, E> {
                Ok(Decimal(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Decimal, E> {
                Ok(Decimal(v.to_string()))
            }
        }

        deserializer.deserialize_any(DecimalVisitor)
    }
}

/// A governor tunable value. Governors accept booleans, numbers and plain
/// strings; anything else the manifest author managed to write is kept
/// around so the applier can report it instead of failing the whole parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl Scalar {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Other(serde_json::Value::Null) => "null",
            Self::Other(serde_json::Value::Array(_)) => "array",
            Self::Other(_) => "object",
        }
    }

    /// Numeric view, for tunables consumed by the engine itself
    /// (`boostpulse_duration`).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Top level of the JSON device manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    pub profile_boot: Option<String>,
    /// Seconds to hold the boot profile before honoring profile requests.
    pub profile_boot_duration: Option<Decimal>,
    #[serde(default)]
    pub profile_inheritance: Vec<String>,
    #[serde(default)]
    pub profile_order: Vec<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
    pub paths: Option<Paths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub clusters: BTreeMap<String, Cluster>,
    #[serde(default)]
    pub cpusets: BTreeMap<String, Cpuset>,
    pub gpu: Option<Gpu>,
    pub kernel: Option<Kernel>,
    pub ipa: Option<Ipa>,
    pub input_booster: Option<InputBooster>,
    pub sec_slow: Option<SecSlow>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Cluster {
    pub cpufreq: Option<CpuFreq>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CpuFreq {
    pub governor: Option<String>,
    pub max: Option<Decimal>,
    pub min: Option<Decimal>,
    pub speed: Option<Decimal>,
    /// Per-governor tunables, written under the governor's own
    /// subdirectory of the cpufreq directory.
    #[serde(default)]
    pub governors: BTreeMap<String, BTreeMap<String, Scalar>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Cpuset {
    /// Comma-range list, e.g. "0-3" or "0-1,4".
    pub cpus: Option<String>,
    pub cpu_exclusive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Gpu {
    pub dvfs: Option<GpuDvfs>,
    pub highspeed: Option<GpuHighspeed>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpuDvfs {
    pub max: Option<Decimal>,
    pub min: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpuHighspeed {
    pub clock: Option<Decimal>,
    pub load: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Kernel {
    pub dynamic_hotplug: Option<bool>,
    pub power_efficient: Option<bool>,
    pub hmp: Option<Hmp>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Hmp {
    pub boost: Option<bool>,
    pub semiboost: Option<bool>,
    pub active_down_migration: Option<bool>,
    pub aggressive_up_migration: Option<bool>,
    pub threshold: Option<HmpThreshold>,
    pub sb_threshold: Option<HmpThreshold>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HmpThreshold {
    pub down: Option<Decimal>,
    pub up: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Ipa {
    pub enabled: Option<bool>,
    pub control_temp: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputBooster {
    pub head: Option<String>,
    pub tail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SecSlow {
    pub enabled: Option<bool>,
    pub enforced: Option<bool>,
    pub timer_rate: Option<Decimal>,
}

// Path declarations mirror the profile shape. In the manifest each string is
// either an absolute path, a fragment joined under its parent, or empty for
// "discover a stock location". After resolution (paths module) every leaf is
// a full filesystem path, or empty when the control is absent on this device
// and writes to it should be skipped.

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Paths {
    pub powerpulse: Option<PowerPulsePaths>,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterPaths>,
    pub cpusets: Option<CpusetsPaths>,
    pub ipa: Option<IpaPaths>,
    pub gpu: Option<GpuPaths>,
    pub kernel: Option<KernelPaths>,
    pub input_booster: Option<InputBoosterPaths>,
    pub sec_slow: Option<SecSlowPaths>,
    pub input: Option<InputPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PowerPulsePaths {
    /// Cache file holding the last applied profile name across reboots.
    #[serde(default)]
    pub profile: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClusterPaths {
    /// Cluster root, e.g. /sys/devices/system/cpu.
    #[serde(default)]
    pub path: String,
    pub cpufreq: Option<CpuFreqPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CpuFreqPaths {
    /// cpufreq directory under the cluster root, e.g. cpu0/cpufreq.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub governor: String,
    /// scaling_available_governors, used to sanity-check profile governors.
    #[serde(default)]
    pub governors: String,
    #[serde(default)]
    pub max: String,
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub speed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CpusetsPaths {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub sets: BTreeMap<String, CpusetPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CpusetPaths {
    #[serde(default)]
    pub cpus: String,
    #[serde(default)]
    pub cpu_exclusive: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IpaPaths {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub enabled: String,
    #[serde(default)]
    pub control_temp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpuPaths {
    #[serde(default)]
    pub path: String,
    pub dvfs: Option<GpuDvfsPaths>,
    pub highspeed: Option<GpuHighspeedPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpuDvfsPaths {
    #[serde(default)]
    pub max: String,
    #[serde(default)]
    pub min: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GpuHighspeedPaths {
    #[serde(default)]
    pub clock: String,
    #[serde(default)]
    pub load: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct KernelPaths {
    #[serde(default)]
    pub dynamic_hotplug: String,
    #[serde(default)]
    pub power_efficient: String,
    pub hmp: Option<HmpPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HmpPaths {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub boost: String,
    #[serde(default)]
    pub semiboost: String,
    #[serde(default)]
    pub active_down_migration: String,
    #[serde(default)]
    pub aggressive_up_migration: String,
    pub threshold: Option<HmpThresholdPaths>,
    pub sb_threshold: Option<HmpThresholdPaths>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HmpThresholdPaths {
    #[serde(default)]
    pub down: String,
    #[serde(default)]
    pub up: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputBoosterPaths {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub head: String,
    #[serde(default)]
    pub tail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SecSlowPaths {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub enabled: String,
    #[serde(default)]
    pub enforced: String,
    #[serde(default)]
    pub timer_rate: String,
}

/// Input device toggles driven by interactivity and feature requests
/// rather than by profiles.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InputPaths {
    #[serde(default)]
    pub touchkey: String,
    #[serde(default)]
    pub touchscreen: String,
    #[serde(default)]
    pub dt2w: String,
}
