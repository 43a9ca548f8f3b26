//! Resolution of the path manifest against the stock registry.
//!
//! Every subsystem follows the same contract: when the manifest declares it,
//! the declared locations must validate and resolution fails loudly when
//! they do not; when the manifest omits it, stock locations are probed and
//! the subsystem is silently dropped when nothing is found. That split is
//! what lets one binary adapt across SoCs while a broken manifest still
//! refuses to start.

pub mod stock;

pub use stock::{Registry, exists, join, scan};

use crate::config::types::{
    ClusterPaths, CpuFreqPaths, CpusetPaths, CpusetsPaths, GpuDvfsPaths, GpuHighspeedPaths,
    GpuPaths, HmpPaths, HmpThresholdPaths, InputBoosterPaths, InputPaths, IpaPaths, KernelPaths,
    Paths, SecSlowPaths,
};
use crate::util::error::ConfigError;
use std::collections::BTreeMap;
use std::fs;

/// Resolve a declared (possibly absent) path manifest into full filesystem
/// paths. Empty leaves in the result mean "control absent, skip writes".
pub fn resolve(declared: Option<Paths>, registry: &mut Registry) -> Result<Paths, ConfigError> {
    let declared = declared.unwrap_or_default();
    Ok(Paths {
        powerpulse: declared.powerpulse.clone(),
        clusters: resolve_clusters(&declared, registry)?,
        cpusets: resolve_cpusets(&declared)?,
        ipa: resolve_ipa(&declared)?,
        gpu: resolve_gpu(&declared)?,
        kernel: resolve_kernel(&declared)?,
        input_booster: resolve_input_booster(&declared)?,
        sec_slow: resolve_sec_slow(&declared)?,
        input: resolve_input(&declared)?,
    })
}

/// A declared path must validate (joined under the prefixes when given);
/// with no declaration the stock table must produce a hit. `None` means
/// neither worked.
fn require(declared: &str, candidates: &[&str], prefixes: &[&str]) -> Option<String> {
    if declared.is_empty() {
        scan(candidates, prefixes).map(|(fragment, prefix)| join(&prefix, &fragment))
    } else if !prefixes.is_empty() {
        prefixes
            .iter()
            .map(|prefix| join(prefix, declared))
            .find(|full| exists(full))
    } else if exists(declared) {
        Some(declared.to_string())
    } else {
        None
    }
}

/// A declared path must validate; with no declaration the stock table is
/// best effort and an empty string marks the control absent. `Err` means
/// the declaration itself did not validate.
fn prefer(declared: &str, candidates: &[&str], prefixes: &[&str]) -> Result<String, ()> {
    if declared.is_empty() {
        Ok(discover(candidates, prefixes))
    } else if !prefixes.is_empty() {
        prefixes
            .iter()
            .map(|prefix| join(prefix, declared))
            .find(|full| exists(full))
            .ok_or(())
    } else if exists(declared) {
        Ok(declared.to_string())
    } else {
        Err(())
    }
}

/// Best-effort stock discovery.
fn discover(candidates: &[&str], prefixes: &[&str]) -> String {
    scan(candidates, prefixes)
        .map(|(fragment, prefix)| join(&prefix, &fragment))
        .unwrap_or_default()
}

fn definition(name: String) -> ConfigError {
    ConfigError::PathDefinition(name)
}

fn invalid(name: String, path: &str) -> ConfigError {
    ConfigError::PathInvalid {
        name,
        path: path.to_string(),
    }
}

fn resolve_clusters(
    declared: &Paths,
    registry: &mut Registry,
) -> Result<BTreeMap<String, ClusterPaths>, ConfigError> {
    let mut clusters = BTreeMap::new();
    for (name, cluster) in &declared.clusters {
        let roots = registry.cluster_roots();
        let root = require(&cluster.path, &roots, &[])
            .ok_or_else(|| definition(format!("clusters/{name}")))?;
        registry.cache_cluster_root(&root);

        let cpufreq = match &cluster.cpufreq {
            None => {
                // Probe under the root itself and under a per-cluster
                // subdirectory of it.
                let sub = join(&root, name);
                let dir = discover(stock::CPUFREQ, &[&root, &sub]);
                if dir.is_empty() {
                    None
                } else {
                    Some(CpuFreqPaths {
                        governor: discover(stock::CPUFREQ_GOVERNOR, &[&dir]),
                        governors: discover(stock::CPUFREQ_AVAILABLE_GOVERNORS, &[&dir]),
                        max: discover(stock::CPUFREQ_MAX, &[&dir]),
                        min: discover(stock::CPUFREQ_MIN, &[&dir]),
                        speed: discover(stock::CPUFREQ_SPEED, &[&dir]),
                        path: dir,
                    })
                }
            }
            Some(freq) => {
                let dir = require(&freq.path, stock::CPUFREQ, &[&root]).ok_or_else(|| {
                    definition(format!("clusters/{name}/cpufreq relative to path {root}"))
                })?;
                let governor = prefer(&freq.governor, stock::CPUFREQ_GOVERNOR, &[&dir])
                    .map_err(|()| invalid(format!("clusters/{name}/cpufreq/governor"), &freq.governor))?;
                let governors =
                    prefer(&freq.governors, stock::CPUFREQ_AVAILABLE_GOVERNORS, &[&dir]).map_err(
                        |()| invalid(format!("clusters/{name}/cpufreq/governors"), &freq.governors),
                    )?;
                let max = prefer(&freq.max, stock::CPUFREQ_MAX, &[&dir])
                    .map_err(|()| invalid(format!("clusters/{name}/cpufreq/max"), &freq.max))?;
                let min = prefer(&freq.min, stock::CPUFREQ_MIN, &[&dir])
                    .map_err(|()| invalid(format!("clusters/{name}/cpufreq/min"), &freq.min))?;
                let speed = prefer(&freq.speed, stock::CPUFREQ_SPEED, &[&dir])
                    .map_err(|()| invalid(format!("clusters/{name}/cpufreq/speed"), &freq.speed))?;
                Some(CpuFreqPaths {
                    path: dir,
                    governor,
                    governors,
                    max,
                    min,
                    speed,
                })
            }
        };

        clusters.insert(
            name.clone(),
            ClusterPaths {
                path: root,
                cpufreq,
            },
        );
    }
    Ok(clusters)
}

fn resolve_cpusets(declared: &Paths) -> Result<Option<CpusetsPaths>, ConfigError> {
    match &declared.cpusets {
        None => {
            let root = discover(stock::CPUSET_ROOT, &[]);
            if root.is_empty() {
                return Ok(None);
            }
            let mut sets = BTreeMap::new();
            let entries =
                fs::read_dir(&root).map_err(|_| definition("cpusets/path".to_string()))?;
            for entry in entries.flatten() {
                if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                    continue;
                }
                let set_name = entry.file_name().to_string_lossy().into_owned();
                let dir = join(&root, &set_name);
                sets.insert(
                    set_name,
                    CpusetPaths {
                        cpus: discover(stock::CPUSET_CPUS, &[&dir]),
                        cpu_exclusive: discover(stock::CPUSET_CPU_EXCLUSIVE, &[&dir]),
                    },
                );
            }
            Ok(Some(CpusetsPaths { path: root, sets }))
        }
        Some(cpusets) => {
            let root = require(&cpusets.path, stock::CPUSET_ROOT, &[])
                .ok_or_else(|| definition("cpusets".to_string()))?;
            let mut sets = BTreeMap::new();
            for (set_name, set) in &cpusets.sets {
                let dir = join(&root, set_name);
                let cpus = prefer(&set.cpus, stock::CPUSET_CPUS, &[&dir])
                    .map_err(|()| invalid(format!("cpusets/{set_name}/cpus"), &set.cpus))?;
                let cpu_exclusive = prefer(&set.cpu_exclusive, stock::CPUSET_CPU_EXCLUSIVE, &[&dir])
                    .map_err(|()| {
                        invalid(
                            format!("cpusets/{set_name}/cpu_exclusive"),
                            &set.cpu_exclusive,
                        )
                    })?;
                sets.insert(
                    set_name.clone(),
                    CpusetPaths {
                        cpus,
                        cpu_exclusive,
                    },
                );
            }
            Ok(Some(CpusetsPaths { path: root, sets }))
        }
    }
}

fn resolve_ipa(declared: &Paths) -> Result<Option<IpaPaths>, ConfigError> {
    match &declared.ipa {
        None => {
            let root = discover(stock::IPA_ROOT, &[]);
            if root.is_empty() {
                return Ok(None);
            }
            Ok(Some(IpaPaths {
                enabled: discover(stock::IPA_ENABLED, &[&root]),
                control_temp: discover(stock::IPA_CONTROL_TEMP, &[&root]),
                path: root,
            }))
        }
        Some(ipa) => {
            let root = require(&ipa.path, stock::IPA_ROOT, &[])
                .ok_or_else(|| definition("ipa".to_string()))?;
            let enabled = prefer(&ipa.enabled, stock::IPA_ENABLED, &[&root])
                .map_err(|()| invalid("ipa/enabled".to_string(), &ipa.enabled))?;
            let control_temp = prefer(&ipa.control_temp, stock::IPA_CONTROL_TEMP, &[&root])
                .map_err(|()| invalid("ipa/control_temp".to_string(), &ipa.control_temp))?;
            Ok(Some(IpaPaths {
                path: root,
                enabled,
                control_temp,
            }))
        }
    }
}

fn resolve_gpu(declared: &Paths) -> Result<Option<GpuPaths>, ConfigError> {
    match &declared.gpu {
        None => {
            let root = discover(stock::GPU_ROOT, &[]);
            if root.is_empty() {
                return Ok(None);
            }
            Ok(Some(GpuPaths {
                dvfs: Some(GpuDvfsPaths {
                    max: discover(stock::GPU_DVFS_MAX, &[&root]),
                    min: discover(stock::GPU_DVFS_MIN, &[&root]),
                }),
                highspeed: Some(GpuHighspeedPaths {
                    clock: discover(stock::GPU_HIGHSPEED_CLOCK, &[&root]),
                    load: discover(stock::GPU_HIGHSPEED_LOAD, &[&root]),
                }),
                path: root,
            }))
        }
        Some(gpu) => {
            let root = require(&gpu.path, stock::GPU_ROOT, &[])
                .ok_or_else(|| definition("gpu".to_string()))?;
            let dvfs = match &gpu.dvfs {
                None => None,
                Some(dvfs) => Some(GpuDvfsPaths {
                    max: prefer(&dvfs.max, stock::GPU_DVFS_MAX, &[&root])
                        .map_err(|()| invalid("gpu/dvfs/max".to_string(), &dvfs.max))?,
                    min: prefer(&dvfs.min, stock::GPU_DVFS_MIN, &[&root])
                        .map_err(|()| invalid("gpu/dvfs/min".to_string(), &dvfs.min))?,
                }),
            };
            let highspeed = match &gpu.highspeed {
                None => None,
                Some(highspeed) => Some(GpuHighspeedPaths {
                    clock: prefer(&highspeed.clock, stock::GPU_HIGHSPEED_CLOCK, &[&root])
                        .map_err(|()| invalid("gpu/highspeed/clock".to_string(), &highspeed.clock))?,
                    load: prefer(&highspeed.load, stock::GPU_HIGHSPEED_LOAD, &[&root])
                        .map_err(|()| invalid("gpu/highspeed/load".to_string(), &highspeed.load))?,
                }),
            };
            Ok(Some(GpuPaths {
                path: root,
                dvfs,
                highspeed,
            }))
        }
    }
}

fn resolve_kernel(declared: &Paths) -> Result<Option<KernelPaths>, ConfigError> {
    match &declared.kernel {
        None => {
            let dynamic_hotplug = discover(stock::KERNEL_DYNAMIC_HOTPLUG, &[]);
            let power_efficient = discover(stock::KERNEL_POWER_EFFICIENT, &[]);
            let hmp_root = discover(stock::HMP_ROOT, &[]);
            let hmp = if hmp_root.is_empty() {
                None
            } else {
                Some(HmpPaths {
                    boost: discover(stock::HMP_BOOST, &[&hmp_root]),
                    semiboost: discover(stock::HMP_SEMIBOOST, &[&hmp_root]),
                    active_down_migration: discover(
                        stock::HMP_ACTIVE_DOWN_MIGRATION,
                        &[&hmp_root],
                    ),
                    aggressive_up_migration: discover(
                        stock::HMP_AGGRESSIVE_UP_MIGRATION,
                        &[&hmp_root],
                    ),
                    threshold: discover_threshold(
                        stock::HMP_THRESHOLD_DOWN,
                        stock::HMP_THRESHOLD_UP,
                        &hmp_root,
                    ),
                    sb_threshold: discover_threshold(
                        stock::HMP_SB_THRESHOLD_DOWN,
                        stock::HMP_SB_THRESHOLD_UP,
                        &hmp_root,
                    ),
                    path: hmp_root,
                })
            };
            Ok(Some(KernelPaths {
                dynamic_hotplug,
                power_efficient,
                hmp,
            }))
        }
        Some(kernel) => {
            let dynamic_hotplug = prefer(&kernel.dynamic_hotplug, stock::KERNEL_DYNAMIC_HOTPLUG, &[])
                .map_err(|()| {
                    invalid("kernel/dynamic_hotplug".to_string(), &kernel.dynamic_hotplug)
                })?;
            let power_efficient = prefer(&kernel.power_efficient, stock::KERNEL_POWER_EFFICIENT, &[])
                .map_err(|()| {
                    invalid("kernel/power_efficient".to_string(), &kernel.power_efficient)
                })?;
            let hmp = match &kernel.hmp {
                None => None,
                Some(hmp) => {
                    let root = require(&hmp.path, stock::HMP_ROOT, &[])
                        .ok_or_else(|| definition("kernel/hmp".to_string()))?;
                    let boost = prefer(&hmp.boost, stock::HMP_BOOST, &[&root])
                        .map_err(|()| invalid("kernel/hmp/boost".to_string(), &hmp.boost))?;
                    let semiboost = prefer(&hmp.semiboost, stock::HMP_SEMIBOOST, &[&root])
                        .map_err(|()| invalid("kernel/hmp/semiboost".to_string(), &hmp.semiboost))?;
                    let active_down_migration =
                        prefer(&hmp.active_down_migration, stock::HMP_ACTIVE_DOWN_MIGRATION, &[&root])
                            .map_err(|()| {
                                invalid(
                                    "kernel/hmp/active_down_migration".to_string(),
                                    &hmp.active_down_migration,
                                )
                            })?;
                    let aggressive_up_migration = prefer(
                        &hmp.aggressive_up_migration,
                        stock::HMP_AGGRESSIVE_UP_MIGRATION,
                        &[&root],
                    )
                    .map_err(|()| {
                        invalid(
                            "kernel/hmp/aggressive_up_migration".to_string(),
                            &hmp.aggressive_up_migration,
                        )
                    })?;
                    let threshold = match &hmp.threshold {
                        None => None,
                        Some(threshold) => Some(HmpThresholdPaths {
                            down: prefer(&threshold.down, stock::HMP_THRESHOLD_DOWN, &[&root])
                                .map_err(|()| {
                                    invalid("kernel/hmp/threshold/down".to_string(), &threshold.down)
                                })?,
                            up: prefer(&threshold.up, stock::HMP_THRESHOLD_UP, &[&root]).map_err(
                                |()| invalid("kernel/hmp/threshold/up".to_string(), &threshold.up),
                            )?,
                        }),
                    };
                    let sb_threshold = match &hmp.sb_threshold {
                        None => None,
                        Some(threshold) => Some(HmpThresholdPaths {
                            down: prefer(&threshold.down, stock::HMP_SB_THRESHOLD_DOWN, &[&root])
                                .map_err(|()| {
                                    invalid(
                                        "kernel/hmp/sb_threshold/down".to_string(),
                                        &threshold.down,
                                    )
                                })?,
                            up: prefer(&threshold.up, stock::HMP_SB_THRESHOLD_UP, &[&root])
                                .map_err(|()| {
                                    invalid("kernel/hmp/sb_threshold/up".to_string(), &threshold.up)
                                })?,
                        }),
                    };
                    Some(HmpPaths {
                        path: root,
                        boost,
                        semiboost,
                        active_down_migration,
                        aggressive_up_migration,
                        threshold,
                        sb_threshold,
                    })
                }
            };
            Ok(Some(KernelPaths {
                dynamic_hotplug,
                power_efficient,
                hmp,
            }))
        }
    }
}

fn discover_threshold(
    down: &[&str],
    up: &[&str],
    root: &str,
) -> Option<HmpThresholdPaths> {
    let down = discover(down, &[root]);
    let up = discover(up, &[root]);
    // The pair is only useful whole.
    if down.is_empty() || up.is_empty() {
        None
    } else {
        Some(HmpThresholdPaths { down, up })
    }
}

fn resolve_input_booster(declared: &Paths) -> Result<Option<InputBoosterPaths>, ConfigError> {
    match &declared.input_booster {
        None => {
            let root = discover(stock::INPUT_BOOSTER_ROOT, &[]);
            if root.is_empty() {
                return Ok(None);
            }
            Ok(Some(InputBoosterPaths {
                head: discover(stock::INPUT_BOOSTER_HEAD, &[&root]),
                tail: discover(stock::INPUT_BOOSTER_TAIL, &[&root]),
                path: root,
            }))
        }
        Some(booster) => {
            let root = require(&booster.path, stock::INPUT_BOOSTER_ROOT, &[])
                .ok_or_else(|| definition("input_booster".to_string()))?;
            let head = prefer(&booster.head, stock::INPUT_BOOSTER_HEAD, &[&root])
                .map_err(|()| invalid("input_booster/head".to_string(), &booster.head))?;
            let tail = prefer(&booster.tail, stock::INPUT_BOOSTER_TAIL, &[&root])
                .map_err(|()| invalid("input_booster/tail".to_string(), &booster.tail))?;
            Ok(Some(InputBoosterPaths {
                path: root,
                head,
                tail,
            }))
        }
    }
}

fn resolve_sec_slow(declared: &Paths) -> Result<Option<SecSlowPaths>, ConfigError> {
    match &declared.sec_slow {
        None => {
            let root = discover(stock::SEC_SLOW_ROOT, &[]);
            if root.is_empty() {
                return Ok(None);
            }
            Ok(Some(SecSlowPaths {
                enabled: discover(stock::SEC_SLOW_ENABLED, &[&root]),
                enforced: discover(stock::SEC_SLOW_ENFORCED, &[&root]),
                timer_rate: discover(stock::SEC_SLOW_TIMER_RATE, &[&root]),
                path: root,
            }))
        }
        Some(slow) => {
            let root = require(&slow.path, stock::SEC_SLOW_ROOT, &[])
                .ok_or_else(|| definition("sec_slow".to_string()))?;
            let enabled = prefer(&slow.enabled, stock::SEC_SLOW_ENABLED, &[&root])
                .map_err(|()| invalid("sec_slow/enabled".to_string(), &slow.enabled))?;
            let enforced = prefer(&slow.enforced, stock::SEC_SLOW_ENFORCED, &[&root])
                .map_err(|()| invalid("sec_slow/enforced".to_string(), &slow.enforced))?;
            let timer_rate = prefer(&slow.timer_rate, stock::SEC_SLOW_TIMER_RATE, &[&root])
                .map_err(|()| invalid("sec_slow/timer_rate".to_string(), &slow.timer_rate))?;
            Ok(Some(SecSlowPaths {
                path: root,
                enabled,
                enforced,
                timer_rate,
            }))
        }
    }
}

fn resolve_input(declared: &Paths) -> Result<Option<InputPaths>, ConfigError> {
    match &declared.input {
        None => {
            let resolved = InputPaths {
                touchkey: discover(stock::INPUT_TOUCHKEY, &[]),
                touchscreen: discover(stock::INPUT_TOUCHSCREEN, &[]),
                dt2w: discover(stock::INPUT_DT2W, &[]),
            };
            if resolved.touchkey.is_empty()
                && resolved.touchscreen.is_empty()
                && resolved.dt2w.is_empty()
            {
                Ok(None)
            } else {
                Ok(Some(resolved))
            }
        }
        Some(input) => Ok(Some(InputPaths {
            touchkey: prefer(&input.touchkey, stock::INPUT_TOUCHKEY, &[])
                .map_err(|()| invalid("input/touchkey".to_string(), &input.touchkey))?,
            touchscreen: prefer(&input.touchscreen, stock::INPUT_TOUCHSCREEN, &[])
                .map_err(|()| invalid("input/touchscreen".to_string(), &input.touchscreen))?,
            dt2w: prefer(&input.dt2w, stock::INPUT_DT2W, &[])
                .map_err(|()| invalid("input/dt2w".to_string(), &input.dt2w))?,
        })),
    }
}
