//! Profile inheritance.
//!
//! The manifest's `profile_inheritance` list is a total order of base
//! layers: requesting the profile at index `i` first merges every profile
//! at indices `0..i`, then the requested profile on top. Merging is
//! field-wise and presence-based, so a child can override a parent's `true`
//! with `false` while leaving an unset field inherited.

use crate::config::types::{
    Cluster, CpuFreq, Cpuset, Gpu, GpuDvfs, GpuHighspeed, Hmp, HmpThreshold, InputBooster, Ipa,
    Kernel, Profile, SecSlow,
};
use crate::config::types::Decimal;
use log::warn;
use std::collections::BTreeMap;

/// Compute the effective profile for `name`, or `None` when it is not
/// loaded. The result is what the applier walks; the stored profiles are
/// never mutated.
pub fn resolve_effective(
    profiles: &BTreeMap<String, Profile>,
    inheritance: &[String],
    name: &str,
) -> Option<Profile> {
    let target = profiles.get(name)?;
    let mut effective = Profile::default();
    if let Some(index) = inheritance.iter().position(|entry| entry == name) {
        for parent in &inheritance[..index] {
            match profiles.get(parent) {
                Some(profile) => effective.merge_from(profile),
                None => warn!("inherited profile {parent} is not loaded, skipping"),
            }
        }
    }
    effective.merge_from(target);
    Some(effective)
}

/// Field-wise overlay of `other` onto `self`: present fields win, absent
/// fields inherit.
pub trait Merge {
    fn merge_from(&mut self, other: &Self);
}

fn override_bool(dst: &mut Option<bool>, src: Option<bool>) {
    if src.is_some() {
        *dst = src;
    }
}

fn override_string(dst: &mut Option<String>, src: &Option<String>) {
    if let Some(value) = src {
        if !value.is_empty() {
            *dst = Some(value.clone());
        }
    }
}

fn override_decimal(dst: &mut Option<Decimal>, src: &Option<Decimal>) {
    if let Some(value) = src {
        if !value.is_empty() {
            *dst = Some(value.clone());
        }
    }
}

fn merge_nested<T: Merge + Clone>(dst: &mut Option<T>, src: &Option<T>) {
    match (dst.as_mut(), src) {
        (Some(d), Some(s)) => d.merge_from(s),
        (None, Some(s)) => *dst = Some(s.clone()),
        _ => {}
    }
}

fn merge_map<T: Merge + Clone>(dst: &mut BTreeMap<String, T>, src: &BTreeMap<String, T>) {
    for (key, value) in src {
        match dst.get_mut(key) {
            Some(existing) => existing.merge_from(value),
            None => {
                dst.insert(key.clone(), value.clone());
            }
        }
    }
}

impl Merge for Profile {
    fn merge_from(&mut self, other: &Self) {
        merge_map(&mut self.clusters, &other.clusters);
        merge_map(&mut self.cpusets, &other.cpusets);
        merge_nested(&mut self.gpu, &other.gpu);
        merge_nested(&mut self.kernel, &other.kernel);
        merge_nested(&mut self.ipa, &other.ipa);
        merge_nested(&mut self.input_booster, &other.input_booster);
        merge_nested(&mut self.sec_slow, &other.sec_slow);
    }
}

impl Merge for Cluster {
    fn merge_from(&mut self, other: &Self) {
        merge_nested(&mut self.cpufreq, &other.cpufreq);
    }
}

impl Merge for CpuFreq {
    fn merge_from(&mut self, other: &Self) {
        override_string(&mut self.governor, &other.governor);
        override_decimal(&mut self.max, &other.max);
        override_decimal(&mut self.min, &other.min);
        override_decimal(&mut self.speed, &other.speed);
        // Governor maps union by governor, then by tunable.
        for (governor, tunables) in &other.governors {
            let merged = self.governors.entry(governor.clone()).or_default();
            for (tunable, value) in tunables {
                merged.insert(tunable.clone(), value.clone());
            }
        }
    }
}

impl Merge for Cpuset {
    fn merge_from(&mut self, other: &Self) {
        override_string(&mut self.cpus, &other.cpus);
        override_bool(&mut self.cpu_exclusive, other.cpu_exclusive);
    }
}

impl Merge for Gpu {
    fn merge_from(&mut self, other: &Self) {
        merge_nested(&mut self.dvfs, &other.dvfs);
        merge_nested(&mut self.highspeed, &other.highspeed);
    }
}

impl Merge for GpuDvfs {
    fn merge_from(&mut self, other: &Self) {
        override_decimal(&mut self.max, &other.max);
        override_decimal(&mut self.min, &other.min);
    }
}

impl Merge for GpuHighspeed {
    fn merge_from(&mut self, other: &Self) {
        override_decimal(&mut self.clock, &other.clock);
        override_decimal(&mut self.load, &other.load);
    }
}

impl Merge for Kernel {
    fn merge_from(&mut self, other: &Self) {
        override_bool(&mut self.dynamic_hotplug, other.dynamic_hotplug);
        override_bool(&mut self.power_efficient, other.power_efficient);
        merge_nested(&mut self.hmp, &other.hmp);
    }
}

impl Merge for Hmp {
    fn merge_from(&mut self, other: &Self) {
        override_bool(&mut self.boost, other.boost);
        override_bool(&mut self.semiboost, other.semiboost);
        override_bool(&mut self.active_down_migration, other.active_down_migration);
        override_bool(
            &mut self.aggressive_up_migration,
            other.aggressive_up_migration,
        );
        merge_nested(&mut self.threshold, &other.threshold);
        merge_nested(&mut self.sb_threshold, &other.sb_threshold);
    }
}

impl Merge for HmpThreshold {
    fn merge_from(&mut self, other: &Self) {
        override_decimal(&mut self.down, &other.down);
        override_decimal(&mut self.up, &other.up);
    }
}

impl Merge for Ipa {
    fn merge_from(&mut self, other: &Self) {
        override_bool(&mut self.enabled, other.enabled);
        override_decimal(&mut self.control_temp, &other.control_temp);
    }
}

impl Merge for InputBooster {
    fn merge_from(&mut self, other: &Self) {
        override_string(&mut self.head, &other.head);
        override_string(&mut self.tail, &other.tail);
    }
}

impl Merge for SecSlow {
    fn merge_from(&mut self, other: &Self) {
        override_bool(&mut self.enabled, other.enabled);
        override_bool(&mut self.enforced, other.enforced);
        override_decimal(&mut self.timer_rate, &other.timer_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiles(json: &str) -> BTreeMap<String, Profile> {
        serde_json::from_str(json).unwrap()
    }

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn chain_merges_every_earlier_layer() {
        let profiles = profiles(
            r#"{
                "screen_off": {"ipa": {"enabled": true, "control_temp": 45000}},
                "battery_saver": {"kernel": {"power_efficient": true}},
                "balanced": {
                    "clusters": {"apollo": {"cpufreq": {"min": 400000, "max": 1200000}}},
                    "ipa": {"control_temp": 65000}
                }
            }"#,
        );
        let inheritance = chain(&["screen_off", "battery_saver", "balanced"]);

        let effective = resolve_effective(&profiles, &inheritance, "balanced").unwrap();
        // Inherited from screen_off, overridden by balanced.
        let ipa = effective.ipa.unwrap();
        assert_eq!(ipa.enabled, Some(true));
        assert_eq!(ipa.control_temp.unwrap().as_str(), "65000");
        // Inherited untouched from battery_saver.
        assert_eq!(effective.kernel.unwrap().power_efficient, Some(true));
        let freq = effective.clusters["apollo"].cpufreq.as_ref().unwrap();
        assert_eq!(freq.min.as_ref().unwrap().as_str(), "400000");
    }

    #[test]
    fn present_false_overrides_inherited_true() {
        let profiles = profiles(
            r#"{
                "base": {"kernel": {"dynamic_hotplug": true, "power_efficient": true}},
                "child": {"kernel": {"dynamic_hotplug": false}}
            }"#,
        );
        let inheritance = chain(&["base", "child"]);
        let kernel = resolve_effective(&profiles, &inheritance, "child")
            .unwrap()
            .kernel
            .unwrap();
        assert_eq!(kernel.dynamic_hotplug, Some(false));
        assert_eq!(kernel.power_efficient, Some(true));
    }

    #[test]
    fn governor_tunables_union_per_key() {
        let profiles = profiles(
            r#"{
                "base": {"clusters": {"apollo": {"cpufreq": {
                    "governor": "interactive",
                    "governors": {"interactive": {"hispeed_freq": 800000, "go_hispeed_load": 85}}
                }}}},
                "child": {"clusters": {"apollo": {"cpufreq": {
                    "governors": {"interactive": {"hispeed_freq": 1000000}}
                }}}}
            }"#,
        );
        let inheritance = chain(&["base", "child"]);
        let effective = resolve_effective(&profiles, &inheritance, "child").unwrap();
        let freq = effective.clusters["apollo"].cpufreq.as_ref().unwrap();
        assert_eq!(freq.governor.as_deref(), Some("interactive"));
        let tunables = &freq.governors["interactive"];
        assert_eq!(tunables["hispeed_freq"].as_i64(), Some(1000000));
        assert_eq!(tunables["go_hispeed_load"].as_i64(), Some(85));
    }

    #[test]
    fn profile_outside_the_chain_is_used_verbatim() {
        let profiles = profiles(
            r#"{
                "base": {"kernel": {"power_efficient": true}},
                "standalone": {"kernel": {"dynamic_hotplug": false}}
            }"#,
        );
        let inheritance = chain(&["base"]);
        let kernel = resolve_effective(&profiles, &inheritance, "standalone")
            .unwrap()
            .kernel
            .unwrap();
        assert_eq!(kernel.power_efficient, None);
        assert_eq!(kernel.dynamic_hotplug, Some(false));
    }

    #[test]
    fn first_chain_entry_has_no_parents() {
        let profiles = profiles(
            r#"{
                "screen_off": {"kernel": {"dynamic_hotplug": true}},
                "balanced": {"kernel": {"power_efficient": true}}
            }"#,
        );
        let inheritance = chain(&["screen_off", "balanced"]);
        let kernel = resolve_effective(&profiles, &inheritance, "screen_off")
            .unwrap()
            .kernel
            .unwrap();
        assert_eq!(kernel.power_efficient, None);
    }

    #[test]
    fn unknown_profile_resolves_to_none() {
        let profiles = profiles(r#"{"balanced": {}}"#);
        assert!(resolve_effective(&profiles, &[], "quick").is_none());
    }
}
