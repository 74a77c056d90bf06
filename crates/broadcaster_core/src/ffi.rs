/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::SessionConfig;
use crate::engine::{MediaKind, SessionDescription};
use crate::registry;
use crate::role::Role;
use std::ffi::{c_char, c_int, CStr, CString};

fn set_err(out_err: *mut *mut c_char, msg: String) {
    set_string(out_err, msg, "ffi error");
}

fn set_string(out: *mut *mut c_char, value: String, fallback: &str) {
    if out.is_null() {
        return;
    }
    let c = CString::new(value)
        .or_else(|_| CString::new(fallback))
        .unwrap_or_default();
    unsafe {
        *out = c.into_raw();
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .try_init()
        .ok();
}

/// `role`: 0 = publish, 1 = play. `config_json` may be null for defaults.
#[no_mangle]
pub extern "C" fn broadcaster_agent_create(
    role: c_int,
    config_json: *const c_char,
    out_handle: *mut u64,
    out_err: *mut *mut c_char,
) -> c_int {
    init_logging();
    if out_handle.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    let role = match role {
        0 => Role::Publish,
        1 => Role::Play,
        other => {
            set_err(out_err, format!("unknown role {other}"));
            return 1;
        }
    };
    let cfg: SessionConfig = if config_json.is_null() {
        SessionConfig::default()
    } else {
        let cfg_str = unsafe { CStr::from_ptr(config_json) }.to_string_lossy().to_string();
        match serde_json::from_str(&cfg_str) {
            Ok(v) => v,
            Err(e) => {
                set_err(out_err, format!("invalid config json: {e}"));
                return 2;
            }
        }
    };
    match registry::create(role, cfg) {
        Ok(handle) => {
            unsafe {
                *out_handle = handle;
            }
            0
        }
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            3
        }
    }
}

/// On success `*out_sdp` holds the merged offer; free it with `broadcaster_string_free`.
#[no_mangle]
pub extern "C" fn broadcaster_agent_create_offer(handle: u64, out_sdp: *mut *mut c_char, out_err: *mut *mut c_char) -> c_int {
    if out_sdp.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    let offer = registry::get(handle).and_then(|agent| agent.create_offer().map_err(Into::into));
    match offer {
        Ok(offer) => {
            set_string(out_sdp, offer.sdp, "");
            0
        }
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            3
        }
    }
}

/// Applies the server's answer text.
#[no_mangle]
pub extern "C" fn broadcaster_agent_start_stream(handle: u64, remote_sdp: *const c_char, out_err: *mut *mut c_char) -> c_int {
    if remote_sdp.is_null() {
        set_err(out_err, "null argument".to_string());
        return 1;
    }
    let sdp = unsafe { CStr::from_ptr(remote_sdp) }.to_string_lossy().to_string();
    let started = registry::get(handle)
        .and_then(|agent| agent.start_stream(&SessionDescription::answer(sdp)).map_err(Into::into));
    match started {
        Ok(()) => 0,
        Err(e) => {
            set_err(out_err, format!("{e:#}"));
            3
        }
    }
}

/// `kind`: 0 = audio, 1 = video, 2 = data. Returns 1 if a stream was toggled,
/// 0 if none matched, -1 on a bad handle or kind.
#[no_mangle]
pub extern "C" fn broadcaster_agent_enable_stream(handle: u64, kind: c_int, enabled: c_int) -> c_int {
    let kind = match kind {
        0 => MediaKind::Audio,
        1 => MediaKind::Video,
        2 => MediaKind::Data,
        _ => return -1,
    };
    let Ok(agent) = registry::get(handle) else {
        return -1;
    };
    match agent.enable_stream(kind, enabled != 0) {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn broadcaster_agent_destroy(handle: u64) -> c_int {
    match registry::destroy(handle) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}
