/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Contract between the session coordinator and the connection engine that does the
//! actual transport work (ICE, DTLS, SRTP, codecs).
//!
//! Engine notifications are split into single-purpose listeners instead of one
//! observer object: candidates, gathering state and remote tracks are each wired
//! to the coordinator on their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::candidates::Candidate;
use crate::error::Result;
use crate::role::Capabilities;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Audio,
    Video,
    Data,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Data => "data",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatheringState {
    Idle,
    Discovering,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
}

/// A sender or receiver as seen by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    /// Engine-scoped id used to address the receiver in later calls.
    pub id: String,
    pub kind: MediaKind,
    pub has_track: bool,
}

/// One encoded media sample handed to a local send track.
#[derive(Clone, Debug)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

/// Media delivered from a remote track.
#[derive(Clone, Debug)]
pub struct MediaFrame {
    pub kind: MediaKind,
    pub track_id: String,
    pub timestamp: u32,
    pub payload: Bytes,
}

/// Capture-backed producer feeding a local send track.
#[async_trait]
pub trait SampleSource: Send + Sync {
    /// `None` ends the track's feed.
    async fn next_sample(&self) -> Option<MediaSample>;
}

/// Receives media from remote tracks it is attached to.
pub trait MediaSink: Send + Sync {
    fn on_frame(&self, frame: &MediaFrame);
}

pub trait CandidateListener: Send + Sync {
    fn on_candidate(&self, candidate: Candidate);
}

pub trait GatheringListener: Send + Sync {
    fn on_gathering_change(&self, state: GatheringState);
}

pub trait TrackListener: Send + Sync {
    fn on_track_added(&self, receiver: TrackInfo);
}

#[derive(Clone)]
pub struct EngineListeners {
    pub candidates: Arc<dyn CandidateListener>,
    pub gathering: Arc<dyn GatheringListener>,
    pub tracks: Arc<dyn TrackListener>,
}

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub ice_servers: Vec<String>,
    pub capabilities: Capabilities,
}

/// Builds one engine session. Called on the session context.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, options: EngineOptions, listeners: EngineListeners) -> Result<Box<dyn ConnectionEngine>>;
}

/// One engine-level connection. Only ever touched from the session context.
#[async_trait]
pub trait ConnectionEngine: Send + Sync {
    async fn add_track(&mut self, kind: MediaKind, source: Option<Arc<dyn SampleSource>>) -> Result<()>;

    /// Returns false if no local track of that kind was present.
    async fn remove_track(&mut self, kind: MediaKind) -> Result<bool>;

    async fn add_transceiver(&mut self, kind: MediaKind, direction: Direction) -> Result<()>;

    async fn create_offer(&mut self) -> Result<SessionDescription>;

    async fn create_answer(&mut self) -> Result<SessionDescription>;

    /// Applying a local description starts candidate discovery.
    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<()>;

    async fn set_remote_description(&mut self, desc: SessionDescription) -> Result<()>;

    /// Syntax check of description text; `Error::InvalidDescription` on failure.
    fn parse_description(&self, kind: SdpType, sdp: &str) -> Result<SessionDescription>;

    async fn senders(&self) -> Vec<TrackInfo>;

    async fn receivers(&self) -> Vec<TrackInfo>;

    async fn set_receiver_sink(&mut self, receiver_id: &str, sink: Option<Arc<dyn MediaSink>>) -> Result<()>;

    async fn set_receiver_enabled(&mut self, receiver_id: &str, enabled: bool) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
