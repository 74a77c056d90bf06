/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::ffi::{c_char, CString};

pub mod candidates;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
mod ffi;
pub mod http_retry;
pub mod media;
pub mod merge;
pub mod registry;
pub mod role;
pub mod signal;
pub mod signaling;
pub mod webrtc_engine;

pub use coordinator::Coordinator;
pub use error::{Error, Result};

#[no_mangle]
pub extern "C" fn broadcaster_core_version() -> *mut c_char {
    CString::new(env!("CARGO_PKG_VERSION"))
        .unwrap_or_default()
        .into_raw()
}

#[no_mangle]
pub extern "C" fn broadcaster_string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr));
    }
}
