/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::engine::{Direction, MediaKind, MediaSink, SampleSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Publish,
    Play,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Publish => "publish",
            Role::Play => "play",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publish" | "0" => Ok(Role::Publish),
            "play" | "1" => Ok(Role::Play),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Codec paths the engine is built with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// Local tracks can be encoded and sent.
    pub encode: bool,
    /// Remote tracks are read and delivered to sinks.
    pub decode: bool,
}

/// What a role asks of the session for one media kind.
#[derive(Clone)]
pub enum MediaSetup {
    /// Local send track, fed from `source` when one is given.
    SendTrack { source: Option<Arc<dyn SampleSource>> },
    /// Transceiver with no local media.
    Transceiver { direction: Direction },
}

/// Publish/play variation expressed as configuration over the same coordinator.
#[derive(Clone)]
pub struct RoleProfile {
    pub role: Role,
    pub capabilities: Capabilities,
    pub media: Vec<(MediaKind, MediaSetup)>,
    pub sink: Option<Arc<dyn MediaSink>>,
}

impl RoleProfile {
    /// Audio and video send tracks backed by the given capture sources.
    pub fn publish(audio: Option<Arc<dyn SampleSource>>, video: Option<Arc<dyn SampleSource>>) -> Self {
        Self {
            role: Role::Publish,
            capabilities: Capabilities {
                encode: true,
                decode: false,
            },
            media: vec![
                (MediaKind::Audio, MediaSetup::SendTrack { source: audio }),
                (MediaKind::Video, MediaSetup::SendTrack { source: video }),
            ],
            sink: None,
        }
    }

    /// Receive-only audio and video transceivers; decoded media goes to `sink`.
    pub fn play(sink: Option<Arc<dyn MediaSink>>) -> Self {
        Self {
            role: Role::Play,
            capabilities: Capabilities {
                encode: false,
                decode: true,
            },
            media: vec![
                (
                    MediaKind::Audio,
                    MediaSetup::Transceiver {
                        direction: Direction::RecvOnly,
                    },
                ),
                (
                    MediaKind::Video,
                    MediaSetup::Transceiver {
                        direction: Direction::RecvOnly,
                    },
                ),
            ],
            sink,
        }
    }
}

impl fmt::Debug for RoleProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleProfile")
            .field("role", &self.role)
            .field("capabilities", &self.capabilities)
            .field("media", &self.media.iter().map(|(k, _)| *k).collect::<Vec<_>>())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
