//! C ABI consumed by the Android power HAL shim.
//!
//! Every entry point initializes the engine on first use and dispatches the
//! real work onto a background thread so the HAL never blocks in-call;
//! `PowerPulse_GetFeature` is the one synchronous exception. When
//! initialization fails the failure is logged once and every later call is
//! ignored rather than served from a half-configured engine.

use crate::engine::Engine;
use crate::hints;
use crate::util::logging;
use log::{error, info};
use std::ffi::{CStr, c_char};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Instant;

static ENGINE: OnceLock<Option<Arc<Engine>>> = OnceLock::new();

fn engine() -> Option<Arc<Engine>> {
    ENGINE
        .get_or_init(|| {
            logging::init(&std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));
            let start = Instant::now();
            info!("need to boot PowerPulse first, just a blip...");
            match Engine::new(Vec::new(), None) {
                Ok(engine) => {
                    info!("finished init in {}ms", start.elapsed().as_millis());
                    Some(engine)
                }
                Err(e) => {
                    error!("error initializing PowerPulse: {e}");
                    None
                }
            }
        })
        .clone()
}

fn owned(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_Init() {
    let _ = engine();
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_ReloadConfig() {
    thread::spawn(|| {
        if let Some(engine) = engine() {
            engine.reload_config();
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_SetProfile(profile: *const c_char) {
    let Some(name) = owned(profile) else {
        return;
    };
    thread::spawn(move || {
        if let Some(engine) = engine() {
            engine.set_profile(&name);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_ResetProfile() {
    thread::spawn(|| {
        if let Some(engine) = engine() {
            engine.reset_profile();
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_SetInteractive(interactive: bool) {
    thread::spawn(move || {
        if let Some(engine) = engine() {
            engine.set_interactive(interactive);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_SetPowerHint(hint: i32, data: i32) {
    thread::spawn(move || {
        if let Some(engine) = engine() {
            hints::dispatch(&engine, hint, data);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_SetFeature(feature: i32, activate: bool) {
    thread::spawn(move || {
        if let Some(engine) = engine() {
            engine.set_feature(feature, activate);
        }
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_GetFeature(feature: i32) -> u32 {
    match engine() {
        Some(engine) => engine.get_feature(feature),
        None => 0,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn PowerPulse_Stargaze() {
    thread::spawn(|| {
        if let Some(engine) = engine() {
            engine.stargaze();
        }
    });
}
