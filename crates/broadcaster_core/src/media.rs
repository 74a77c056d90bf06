/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

use crate::engine::{MediaFrame, MediaKind, MediaSample, MediaSink, SampleSource};

/// Opus TOC + payload for one 20 ms frame of silence.
const OPUS_SILENCE: [u8; 3] = [0xf8, 0xff, 0xfe];
const OPUS_FRAME: Duration = Duration::from_millis(20);

const VIDEO_LOG_EVERY: u64 = 25;
const AUDIO_LOG_EVERY: u64 = 50;

/// Stand-in audio capture: emits Opus silence at the real frame rate.
pub struct SilenceSource {
    ticker: Mutex<Option<Interval>>,
    remaining: Option<AtomicU64>,
}

impl SilenceSource {
    pub fn new() -> Self {
        Self {
            ticker: Mutex::new(None),
            remaining: None,
        }
    }

    /// Stops after `frames` samples.
    pub fn limited(frames: u64) -> Self {
        Self {
            ticker: Mutex::new(None),
            remaining: Some(AtomicU64::new(frames)),
        }
    }
}

impl Default for SilenceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleSource for SilenceSource {
    async fn next_sample(&self) -> Option<MediaSample> {
        if let Some(remaining) = &self.remaining {
            let left = remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if left.is_err() {
                return None;
            }
        }
        let mut ticker = self.ticker.lock().await;
        let ticker = ticker.get_or_insert_with(|| {
            let mut t = interval(OPUS_FRAME);
            t.set_missed_tick_behavior(MissedTickBehavior::Delay);
            t
        });
        ticker.tick().await;
        Some(MediaSample {
            data: Bytes::from_static(&OPUS_SILENCE),
            duration: OPUS_FRAME,
        })
    }
}

/// Sink that counts delivered frames and logs progress periodically.
#[derive(Default)]
pub struct FrameLogger {
    audio: AtomicU64,
    video: AtomicU64,
}

impl FrameLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Audio => self.audio.load(Ordering::Relaxed),
            MediaKind::Video => self.video.load(Ordering::Relaxed),
            MediaKind::Data => 0,
        }
    }
}

impl MediaSink for FrameLogger {
    fn on_frame(&self, frame: &MediaFrame) {
        let (counter, every) = match frame.kind {
            MediaKind::Audio => (&self.audio, AUDIO_LOG_EVERY),
            MediaKind::Video => (&self.video, VIDEO_LOG_EVERY),
            MediaKind::Data => return,
        };
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if n % every == 0 {
            info!(
                kind = frame.kind.as_str(),
                track = %frame.track_id,
                frames = n,
                bytes = frame.payload.len(),
                "media received"
            );
        }
    }
}
