//! Manifest discovery and loading.

use crate::config::types::Manifest;
use crate::util::error::ConfigError;
use log::{debug, info};
use std::fs;

/// Locations probed for the device manifest, most specific first. A
/// `--manifest` override replaces the whole list.
pub const MANIFEST_SEARCH: &[&str] = &[
    "./powerpulse.json",
    "/data/local/tmp/powerpulse.json",
    "/vendor/etc/powerpulse.json",
    "/system/vendor/etc/powerpulse.json",
    "/system/etc/powerpulse.json",
    "/etc/powerpulse.json",
];

/// Canonical profile-name form: lowercase, spaces replaced by underscores.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Read the first readable manifest from the search list (or the override
/// list) and decode it. Profile names are normalized on the way in.
pub fn load_manifest(overrides: &[String]) -> Result<Manifest, ConfigError> {
    let candidates: Vec<&str> = if overrides.is_empty() {
        MANIFEST_SEARCH.to_vec()
    } else {
        overrides.iter().map(String::as_str).collect()
    };

    for path in candidates {
        match fs::read_to_string(path) {
            Ok(text) if !text.is_empty() => {
                info!("found manifest at {path}");
                let manifest: Manifest = serde_json::from_str(&text)?;
                return Ok(normalize(manifest));
            }
            _ => {}
        }
    }
    Err(ConfigError::ManifestNotFound)
}

fn normalize(mut manifest: Manifest) -> Manifest {
    manifest.profiles = manifest
        .profiles
        .into_iter()
        .map(|(name, profile)| {
            let adjusted = normalize_name(&name);
            if adjusted != name {
                debug!("found profile {name} as {adjusted}");
            } else {
                debug!("found profile {adjusted}");
            }
            (adjusted, profile)
        })
        .collect();
    manifest.profile_boot = manifest.profile_boot.map(|name| normalize_name(&name));
    for name in manifest
        .profile_inheritance
        .iter_mut()
        .chain(manifest.profile_order.iter_mut())
    {
        *name = normalize_name(name);
    }
    manifest
}
