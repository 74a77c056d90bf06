/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Factory, runtime or background thread could not be constructed.
    #[error("session init failed: {0}")]
    Init(String),

    #[error("can't parse session description: {0}")]
    InvalidDescription(String),

    /// The local description lacks an expected media section, or the audio bucket is empty.
    #[error("merge failed: {0}")]
    MissingSection(&'static str),

    #[error("engine: {0}")]
    Engine(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),

    /// The producer side of a one-shot signal went away without fulfilling it.
    #[error("signal abandoned before it was fulfilled")]
    Abandoned,

    #[error("blocking call made from the session context or an async runtime")]
    WrongContext,

    #[error("offer already created on this session; build a new one to renegotiate")]
    AlreadyNegotiated,

    #[error("session is closed")]
    Closed,
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Engine(format!("{e:#}"))
    }
}
