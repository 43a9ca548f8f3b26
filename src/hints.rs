//! Power-hint and feature dispatch.
//!
//! Hint identifiers follow the Android power HAL (PowerHint 1.0 through
//! 1.3) plus the Lineage extensions; the numeric values are fixed by those
//! interfaces and must not change.

use crate::engine::Engine;
use log::{debug, warn};
use std::sync::Arc;

pub const HINT_VSYNC: i32 = 0x00000001;
pub const HINT_INTERACTION: i32 = 0x00000002;
pub const HINT_VIDEO_ENCODE: i32 = 0x00000003;
pub const HINT_VIDEO_DECODE: i32 = 0x00000004;
pub const HINT_LOW_POWER: i32 = 0x00000005;
pub const HINT_SUSTAINED_PERFORMANCE: i32 = 0x00000006;
pub const HINT_VR_MODE: i32 = 0x00000007;
pub const HINT_LAUNCH: i32 = 0x00000008;
pub const HINT_AUDIO_STREAMING: i32 = 0x00000009;
pub const HINT_AUDIO_LOW_LATENCY: i32 = 0x0000000a;
pub const HINT_CAMERA_LAUNCH: i32 = 0x0000000b;
pub const HINT_CAMERA_STREAMING: i32 = 0x0000000c;
pub const HINT_CAMERA_SHOT: i32 = 0x0000000d;
pub const HINT_EXPENSIVE_RENDERING: i32 = 0x0000000e;
pub const HINT_CPU_BOOST: i32 = 0x00000110;
pub const HINT_SET_PROFILE: i32 = 0x00000111;

pub const FEATURE_DOUBLE_TAP_TO_WAKE: i32 = 0x00000001;
pub const FEATURE_SUPPORTED_PROFILES: i32 = 0x00001000;

/// One vsync period at 60 Hz.
pub const VSYNC_PULSE_US: i64 = 16_666;
/// Activity launches get a long burst.
pub const LAUNCH_PULSE_US: i64 = 3_000_000;

/// Map a power hint onto a profile transition or a boost.
pub fn dispatch(engine: &Arc<Engine>, hint: i32, data: i32) {
    debug!("power hint {hint} (data {data})");
    match hint {
        HINT_VSYNC => {
            if data > 0 {
                engine.boost(VSYNC_PULSE_US);
            }
        }
        HINT_INTERACTION => {
            if data > 0 {
                engine.boost(i64::from(data) * 1000);
            }
        }
        HINT_LAUNCH => {
            if data > 0 {
                engine.boost(LAUNCH_PULSE_US);
            }
        }
        HINT_LOW_POWER => {
            if data > 0 {
                set_if_loaded(engine, "battery_saver");
            } else {
                engine.reset_profile();
            }
        }
        HINT_SUSTAINED_PERFORMANCE
        | HINT_VR_MODE
        | HINT_AUDIO_STREAMING
        | HINT_AUDIO_LOW_LATENCY
        | HINT_CAMERA_LAUNCH
        | HINT_CAMERA_STREAMING
        | HINT_CAMERA_SHOT
        | HINT_EXPENSIVE_RENDERING
        | HINT_CPU_BOOST => {
            if data > 0 {
                set_if_loaded(engine, "performance");
            } else {
                engine.reset_profile();
            }
        }
        HINT_SET_PROFILE => {
            let Some(name) = profile_for_id(data) else {
                warn!("unknown profile id {data}");
                return;
            };
            set_if_loaded(engine, name);
        }
        HINT_VIDEO_ENCODE | HINT_VIDEO_DECODE => {
            debug!("ignoring deprecated video hint {hint}");
        }
        _ => debug!("unhandled power hint {hint}"),
    }
}

/// The Lineage profile ids carried in the SET_PROFILE payload.
fn profile_for_id(id: i32) -> Option<&'static str> {
    match id {
        -1 => Some("screen_off"),
        0 => Some("battery_saver"),
        1 => Some("balanced"),
        2 => Some("performance"),
        3 => Some("efficiency"),
        4 => Some("quick"),
        _ => None,
    }
}

fn set_if_loaded(engine: &Arc<Engine>, name: &str) {
    if engine.device().profiles.contains_key(name) {
        engine.set_profile(name);
    } else {
        debug!("profile {name} is not loaded, ignoring hint");
    }
}
