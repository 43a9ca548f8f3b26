//! The profile engine: owns the resolved device description and serializes
//! every profile transition.
//!
//! One controller mutex covers a whole application (inheritance resolution,
//! staging, flush, cpuset passes), so concurrent requests see a total
//! order. The boot-profile hold is a flag under that mutex: while it is
//! raised, requests only record the most recently wanted profile, and the
//! release task applies whatever name is recorded when the window closes.
//! Boosts take their own lock and interleave freely with transitions.

use crate::config::types::{Manifest, Paths, Profile};
use crate::config::{load_manifest, normalize_name};
use crate::paths::Registry;
use crate::util::error::{ConfigError, ControlError};
use crate::util::sysfs::{WriteBuffer, read_value, write_value};
use crate::{apply, cpufreq, cpusets, paths, profile};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Immutable description of the device: resolved paths plus the loaded
/// profiles. Replaced wholesale by `reload_config`.
#[derive(Debug)]
pub struct Device {
    pub paths: Paths,
    pub profiles: BTreeMap<String, Profile>,
    pub profile_boot: Option<String>,
    pub profile_boot_duration: Option<u64>,
    pub profile_inheritance: Vec<String>,
    pub profile_order: Vec<String>,
}

impl Device {
    pub fn from_manifest(manifest: Manifest) -> Result<Self, ConfigError> {
        if manifest.profiles.is_empty() {
            return Err(ConfigError::NoProfiles);
        }
        let mut registry = Registry::default();
        let paths = paths::resolve(manifest.paths, &mut registry)?;
        let profile_boot_duration = match &manifest.profile_boot_duration {
            None => None,
            Some(decimal) => match decimal.as_u64() {
                Some(seconds) => Some(seconds),
                None => {
                    warn!("ignoring non-numeric profile_boot_duration '{decimal}'");
                    None
                }
            },
        };
        Ok(Self {
            paths,
            profiles: manifest.profiles,
            profile_boot: manifest.profile_boot,
            profile_boot_duration,
            profile_inheritance: manifest.profile_inheritance,
            profile_order: manifest.profile_order,
        })
    }

    /// Fallback profile order when the manifest does not declare one: the
    /// well-known names that are actually loaded, weakest first, with the
    /// current profile prepended in case it carries special settings.
    fn default_profile_order(&self, current: &str) -> Vec<String> {
        let mut order: Vec<String> = [
            "battery_saver",
            "efficiency",
            "balanced",
            "quick",
            "performance",
        ]
        .iter()
        .filter(|name| self.profiles.contains_key(**name))
        .map(ToString::to_string)
        .collect();
        if !current.is_empty() && !order.iter().any(|name| name == current) {
            order.insert(0, current.to_string());
        }
        order
    }

    fn profile_cache_path(&self) -> &str {
        self.paths
            .powerpulse
            .as_ref()
            .map(|pp| pp.profile.as_str())
            .unwrap_or_default()
    }
}

struct ControllerState {
    current: String,
    /// Profile actually written to disk. `current` runs ahead of it while
    /// the boot hold is up, so `last` must derive from this, not `current`.
    applied: String,
    last: String,
    hold: bool,
    boot_pending: bool,
}

pub struct Engine {
    manifest_paths: Vec<String>,
    device: RwLock<Arc<Device>>,
    state: Mutex<ControllerState>,
    settled: Condvar,
    boost_gate: Mutex<()>,
}

impl Engine {
    /// Load the manifest, resolve paths and restore the last profile name.
    /// Nothing is applied yet; that happens on the first profile request.
    pub fn new(
        manifest_paths: Vec<String>,
        profile_override: Option<String>,
    ) -> Result<Arc<Self>, ConfigError> {
        let manifest = load_manifest(&manifest_paths)?;
        let mut device = Device::from_manifest(manifest)?;

        let mut current = profile_override
            .as_deref()
            .map(normalize_name)
            .unwrap_or_default();
        if current.is_empty() {
            current = restore_profile_name(&device);
        }
        if device.profile_order.is_empty() {
            debug!("no profile order was specified");
            device.profile_order = device.default_profile_order(&current);
            if device.profile_order.is_empty() {
                warn!("no identifiable profiles, please set a profile order or a boot profile");
            }
        }
        debug!("profile order: {:?}", device.profile_order);

        let boot_pending =
            device.profile_boot.is_some() && device.profile_boot_duration.unwrap_or(0) > 0;
        Ok(Arc::new(Self {
            manifest_paths,
            device: RwLock::new(Arc::new(device)),
            state: Mutex::new(ControllerState {
                current,
                applied: String::new(),
                last: String::new(),
                hold: false,
                boot_pending,
            }),
            settled: Condvar::new(),
            boost_gate: Mutex::new(()),
        }))
    }

    /// Snapshot of the current device description.
    pub fn device(&self) -> Arc<Device> {
        self.device.read().unwrap().clone()
    }

    pub fn current_profile(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    pub fn last_profile(&self) -> String {
        self.state.lock().unwrap().last.clone()
    }

    /// Re-run the manifest loader and path resolver and swap the device.
    /// Runtime state survives; a failed reload keeps the old device.
    pub fn reload_config(self: &Arc<Self>) {
        match load_manifest(&self.manifest_paths).and_then(Device::from_manifest) {
            Ok(mut device) => {
                let mut state = self.state.lock().unwrap();
                if state.current.is_empty() {
                    state.current = restore_profile_name(&device);
                }
                if device.profile_order.is_empty() {
                    device.profile_order = device.default_profile_order(&state.current);
                }
                *self.device.write().unwrap() = Arc::new(device);
                info!("configuration reloaded");
            }
            Err(e) => error!("error reloading configuration: {e}"),
        }
    }

    /// Apply a profile by name. The first request after startup honors the
    /// boot profile: it is applied immediately and the requested profile is
    /// deferred until the hold window expires, with later requests during
    /// the window replacing the deferred name (last writer wins).
    pub fn set_profile(self: &Arc<Self>, name: &str) {
        let name = normalize_name(name);
        let device = self.device();
        let mut state = self.state.lock().unwrap();
        if !device.profiles.contains_key(&name) {
            error!("{}", ControlError::UnknownProfile(name));
            return;
        }
        if state.hold {
            debug!("boot profile hold active, deferring {name}");
            state.current = name;
            return;
        }
        if state.boot_pending {
            state.boot_pending = false;
            let boot = device.profile_boot.clone().unwrap_or_default();
            let seconds = device.profile_boot_duration.unwrap_or(0);
            if seconds > 0 && device.profiles.contains_key(&boot) {
                info!("holding boot profile {boot} for {seconds}s");
                self.apply_locked(&device, &mut state, &boot);
                state.hold = true;
                state.current = name;
                let engine = Arc::clone(self);
                thread::spawn(move || {
                    thread::sleep(Duration::from_secs(seconds));
                    engine.release_hold();
                });
                return;
            }
        }
        self.apply_locked(&device, &mut state, &name);
    }

    /// Swap back to the previously applied profile. No-op until something
    /// has been applied.
    pub fn reset_profile(self: &Arc<Self>) {
        let device = self.device();
        let mut state = self.state.lock().unwrap();
        if state.last.is_empty() {
            return;
        }
        let name = state.last.clone();
        if !device.profiles.contains_key(&name) {
            error!("{}", ControlError::UnknownProfile(name));
            return;
        }
        if state.hold {
            debug!("boot profile hold active, deferring reset to {name}");
            state.current = name;
            return;
        }
        // apply_locked records the outgoing profile as `last`, which is
        // exactly the swap reset wants.
        self.apply_locked(&device, &mut state, &name);
    }

    /// Screen state. With a `screen_off` profile loaded the profile follows
    /// the screen; the input device toggles follow it always.
    pub fn set_interactive(self: &Arc<Self>, interactive: bool) {
        debug!("interactive: {interactive}");
        let device = self.device();
        if device.profiles.contains_key("screen_off") {
            if interactive {
                self.reset_profile();
            } else {
                self.set_profile("screen_off");
            }
        }
        let Some(input) = &device.paths.input else {
            return;
        };
        let _state = self.state.lock().unwrap();
        let mut buffer = WriteBuffer::new();
        buffer.stage_bool(&input.touchkey, interactive);
        buffer.stage_bool(&input.touchscreen, interactive);
        buffer.flush();
    }

    pub fn set_feature(self: &Arc<Self>, feature: i32, activate: bool) {
        match feature {
            crate::hints::FEATURE_DOUBLE_TAP_TO_WAKE => {
                let device = self.device();
                let dt2w = device
                    .paths
                    .input
                    .as_ref()
                    .map(|input| input.dt2w.as_str())
                    .unwrap_or_default();
                if dt2w.is_empty() {
                    debug!("double tap to wake is not available on this device");
                    return;
                }
                let _state = self.state.lock().unwrap();
                let mut buffer = WriteBuffer::new();
                buffer.stage_bool(dt2w, activate);
                buffer.flush();
            }
            _ => debug!("set_feature: unhandled feature {feature}"),
        }
    }

    pub fn get_feature(&self, feature: i32) -> u32 {
        match feature {
            crate::hints::FEATURE_SUPPORTED_PROFILES => self.device().profile_order.len() as u32,
            _ => 0,
        }
    }

    /// Burst every cluster of the effective profile, via the governor's
    /// boostpulse interface. The wall-clock snapshot is taken before the
    /// boost lock so time lost to contention shortens the pulse instead of
    /// stretching it.
    pub fn boost(&self, duration_us: i64) {
        let start = Instant::now();
        let _gate = self.boost_gate.lock().unwrap();
        let device = self.device();
        let current = self.current_profile();
        let Some(effective) =
            profile::resolve_effective(&device.profiles, &device.profile_inheritance, &current)
        else {
            debug!("no current profile to boost");
            return;
        };
        cpufreq::pulse_clusters(&device.paths, &effective, duration_us, start);
    }

    /// Figure out which profile the device should be running and apply it:
    /// the restored/configured current profile when it is loaded, otherwise
    /// the strongest entry of the profile order.
    pub fn stargaze(self: &Arc<Self>) {
        info!("stargazing for desired profile");
        let device = self.device();
        let mut pick = self.current_profile();
        if !device.profiles.contains_key(&pick) {
            pick = device.profile_order.last().cloned().unwrap_or_default();
        }
        if pick.is_empty() {
            error!("no identifiable boot profile, please set a profile order or a boot profile");
            return;
        }
        info!("applying profile {pick}");
        self.set_profile(&pick);
    }

    /// Block until no boot-profile hold window is pending. The one-shot
    /// driver uses this so the process outlives the deferred application.
    pub fn wait_until_settled(&self) {
        let mut state = self.state.lock().unwrap();
        while state.hold {
            state = self.settled.wait(state).unwrap();
        }
    }

    fn release_hold(self: &Arc<Self>) {
        let device = self.device();
        let mut state = self.state.lock().unwrap();
        state.hold = false;
        let name = state.current.clone();
        debug!("boot profile hold expired, applying {name}");
        self.apply_locked(&device, &mut state, &name);
        drop(state);
        self.settled.notify_all();
    }

    fn apply_locked(&self, device: &Device, state: &mut ControllerState, name: &str) {
        let start = Instant::now();
        let Some(effective) =
            profile::resolve_effective(&device.profiles, &device.profile_inheritance, name)
        else {
            error!("{}", ControlError::UnknownProfile(name.to_string()));
            return;
        };
        let mut buffer = WriteBuffer::new();
        apply::stage_profile(&device.paths, &effective, &mut buffer);
        let mut writes = buffer.flush();
        writes += cpusets::apply_cpusets(&device.paths, &effective, &mut buffer, true);
        state.last = std::mem::replace(&mut state.applied, name.to_string());
        state.current = name.to_string();
        self.save_profile_cache(device, name);
        info!(
            "finished applying {name} in {}ms ({writes} writes)",
            start.elapsed().as_millis()
        );
    }

    /// Persist the applied profile name so the next boot can restore it.
    fn save_profile_cache(&self, device: &Device, name: &str) {
        let cache = device.profile_cache_path();
        if cache.is_empty() || !device.profile_order.iter().any(|entry| entry == name) {
            return;
        }
        if let Err(e) = write_value(cache, name) {
            error!("failed to save profile cache: {e}");
        }
    }
}

/// The profile to restore at startup: the configured boot profile,
/// overridden by the cache file's content when one is readable.
fn restore_profile_name(device: &Device) -> String {
    let mut current = device.profile_boot.clone().unwrap_or_default();
    let cache = device.profile_cache_path();
    if !cache.is_empty() {
        if let Ok(saved) = read_value(cache) {
            if !saved.is_empty() {
                current = normalize_name(&saved);
            }
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    /// Two-cluster fixture tree plus a manifest referencing it.
    fn write_fixture(dir: &TempDir, manifest_extra: &str) -> Vec<String> {
        let root = dir.path().join("sys/devices/system/cpu");
        for cpu in ["cpu0", "cpu4"] {
            let freq = root.join(cpu).join("cpufreq");
            touch(&freq.join("scaling_governor"), "performance\n");
            touch(
                &freq.join("scaling_available_governors"),
                "interactive performance powersave\n",
            );
            touch(&freq.join("scaling_max_freq"), "2100000\n");
            touch(&freq.join("scaling_min_freq"), "200000\n");
        }
        let root = root.to_string_lossy().into_owned();
        let cache = dir.path().join("powerpulse.profile");
        let cache = cache.to_string_lossy().into_owned();

        let manifest = format!(
            r#"{{
                {manifest_extra}
                "profiles": {{
                    "efficiency": {{"clusters": {{"apollo": {{"cpufreq": {{"min": 300000}}}}}}}},
                    "balanced": {{"clusters": {{
                        "apollo": {{"cpufreq": {{"min": 400000, "max": 1200000}}}},
                        "atlas": {{"cpufreq": {{"min": 800000, "max": 1800000}}}}
                    }}}},
                    "quick": {{"clusters": {{"apollo": {{"cpufreq": {{"min": 600000}}}}}}}},
                    "performance": {{"clusters": {{"apollo": {{"cpufreq": {{"min": 700000}}}}}}}}
                }},
                "paths": {{
                    "powerpulse": {{"profile": "{cache}"}},
                    "clusters": {{
                        "apollo": {{"path": "{root}", "cpufreq": {{"path": "cpu0/cpufreq"}}}},
                        "atlas": {{"path": "{root}", "cpufreq": {{"path": "cpu4/cpufreq"}}}}
                    }}
                }}
            }}"#
        );
        let manifest_path = dir.path().join("powerpulse.json");
        fs::write(&manifest_path, manifest).unwrap();
        vec![manifest_path.to_string_lossy().into_owned()]
    }

    fn freq_value(dir: &TempDir, cpu: &str, leaf: &str) -> String {
        fs::read_to_string(
            dir.path()
                .join("sys/devices/system/cpu")
                .join(cpu)
                .join("cpufreq")
                .join(leaf),
        )
        .unwrap()
    }

    #[test]
    fn set_profile_writes_both_clusters() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();

        engine.set_profile("balanced");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "400000");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_max_freq"), "1200000");
        assert_eq!(freq_value(&dir, "cpu4", "scaling_min_freq"), "800000");
        assert_eq!(freq_value(&dir, "cpu4", "scaling_max_freq"), "1800000");
        assert_eq!(engine.current_profile(), "balanced");
        // The applied name is persisted for the next boot.
        assert_eq!(
            fs::read_to_string(dir.path().join("powerpulse.profile")).unwrap(),
            "balanced"
        );
    }

    #[test]
    fn second_application_issues_no_writes() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();
        engine.set_profile("balanced");

        // Re-stage the same profile by hand; everything should be skipped
        // at flush time because the files already hold the values.
        let device = engine.device();
        let effective = profile::resolve_effective(
            &device.profiles,
            &device.profile_inheritance,
            "balanced",
        )
        .unwrap();
        let mut buffer = WriteBuffer::new();
        apply::stage_profile(&device.paths, &effective, &mut buffer);
        assert_eq!(buffer.flush(), 0);
    }

    #[test]
    fn reset_swaps_current_and_last() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();

        engine.set_profile("balanced");
        engine.set_profile("performance");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "700000");

        engine.reset_profile();
        assert_eq!(engine.current_profile(), "balanced");
        assert_eq!(engine.last_profile(), "performance");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "400000");

        engine.reset_profile();
        assert_eq!(engine.current_profile(), "performance");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "700000");
    }

    #[test]
    fn unknown_profile_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();
        engine.set_profile("balanced");
        engine.set_profile("gaming");
        assert_eq!(engine.current_profile(), "balanced");
    }

    #[test]
    fn boot_hold_defers_requests_and_honors_the_last_writer() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(
            &dir,
            r#""profile_boot": "efficiency", "profile_boot_duration": "1","#,
        );
        let engine = Engine::new(manifests, None).unwrap();

        engine.set_profile("performance");
        // The boot profile went in immediately; the request is parked.
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "300000");
        assert_eq!(engine.current_profile(), "performance");

        engine.set_profile("quick");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "300000");

        engine.wait_until_settled();
        assert_eq!(engine.current_profile(), "quick");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "600000");
        // The boot profile is what was actually on disk before the hold
        // released, so it is what reset must return to.
        assert_eq!(engine.last_profile(), "efficiency");

        engine.reset_profile();
        assert_eq!(engine.current_profile(), "efficiency");
        assert_eq!(engine.last_profile(), "quick");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "300000");
    }

    #[test]
    fn supported_profiles_counts_the_order() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();
        // No order declared: defaulted from the well-known names present.
        assert_eq!(
            engine.get_feature(crate::hints::FEATURE_SUPPORTED_PROFILES),
            4
        );
        assert_eq!(engine.get_feature(0x7fffffff), 0);
    }

    #[test]
    fn restored_profile_comes_from_the_cache_content() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, r#""profile_boot": "efficiency","#);
        fs::write(dir.path().join("powerpulse.profile"), "Quick").unwrap();
        let engine = Engine::new(manifests, None).unwrap();
        assert_eq!(engine.current_profile(), "quick");

        // An explicit override beats both the boot profile and the cache.
        let dir2 = TempDir::new().unwrap();
        let manifests = write_fixture(&dir2, r#""profile_boot": "efficiency","#);
        let engine = Engine::new(manifests, Some("Balanced".to_string())).unwrap();
        assert_eq!(engine.current_profile(), "balanced");
    }

    #[test]
    fn stargaze_falls_back_to_the_strongest_profile() {
        let dir = TempDir::new().unwrap();
        let manifests = write_fixture(&dir, "");
        let engine = Engine::new(manifests, None).unwrap();
        // No boot profile, no cache: nothing restored, so stargazing picks
        // the last entry of the defaulted order.
        engine.stargaze();
        assert_eq!(engine.current_profile(), "performance");
        assert_eq!(freq_value(&dir, "cpu0", "scaling_min_freq"), "700000");
    }
}
