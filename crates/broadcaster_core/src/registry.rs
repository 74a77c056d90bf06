/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Process-wide table of live coordinators addressed by `u64` handles.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use crate::config::SessionConfig;
use crate::coordinator::Coordinator;
use crate::engine::{EngineFactory, MediaSink, SampleSource};
use crate::media::{FrameLogger, SilenceSource};
use crate::role::{Role, RoleProfile};
use crate::webrtc_engine::WebrtcEngineFactory;

static HANDLE_SEQ: AtomicU64 = AtomicU64::new(1);
static REGISTRY: Mutex<Vec<(u64, Arc<Coordinator>)>> = Mutex::new(Vec::new());

fn registry() -> MutexGuard<'static, Vec<(u64, Arc<Coordinator>)>> {
    REGISTRY.lock().unwrap_or_else(|e| e.into_inner())
}

/// Default media wiring per role: silence for publishing, a frame logger for playing.
pub fn default_profile(role: Role) -> RoleProfile {
    match role {
        Role::Publish => {
            let audio: Arc<dyn SampleSource> = Arc::new(SilenceSource::new());
            RoleProfile::publish(Some(audio), None)
        }
        Role::Play => {
            let sink: Arc<dyn MediaSink> = Arc::new(FrameLogger::new());
            RoleProfile::play(Some(sink))
        }
    }
}

/// Creates a coordinator on the `webrtc` engine and registers it.
pub fn create(role: Role, cfg: SessionConfig) -> Result<u64> {
    create_with(Arc::new(WebrtcEngineFactory), default_profile(role), cfg)
}

pub fn create_with(factory: Arc<dyn EngineFactory>, profile: RoleProfile, cfg: SessionConfig) -> Result<u64> {
    let role = profile.role;
    let coordinator = Coordinator::initialize(factory, profile, cfg).context("create agent")?;
    let handle = HANDLE_SEQ.fetch_add(1, Ordering::Relaxed);
    registry().push((handle, Arc::new(coordinator)));
    info!(handle, role = role.as_str(), "agent registered");
    Ok(handle)
}

pub fn get(handle: u64) -> Result<Arc<Coordinator>> {
    registry()
        .iter()
        .find(|(h, _)| *h == handle)
        .map(|(_, c)| c.clone())
        .context("invalid handle")
}

/// Unregisters the handle. The session is torn down once no call is still using it.
pub fn destroy(handle: u64) -> Result<()> {
    let coordinator = {
        let mut reg = registry();
        let idx = reg.iter().position(|(h, _)| *h == handle).context("invalid handle")?;
        reg.swap_remove(idx).1
    };
    drop(coordinator);
    info!(handle, "agent destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        ConnectionEngine, Direction, EngineListeners, EngineOptions, MediaKind, SdpType, SessionDescription, TrackInfo,
    };
    use crate::error::{Error, Result as CoreResult};
    use crate::role::MediaSetup;
    use async_trait::async_trait;

    struct NullEngine;

    #[async_trait]
    impl ConnectionEngine for NullEngine {
        async fn add_track(&mut self, _: MediaKind, _: Option<Arc<dyn SampleSource>>) -> CoreResult<()> {
            Ok(())
        }
        async fn remove_track(&mut self, _: MediaKind) -> CoreResult<bool> {
            Ok(false)
        }
        async fn add_transceiver(&mut self, _: MediaKind, _: Direction) -> CoreResult<()> {
            Ok(())
        }
        async fn create_offer(&mut self) -> CoreResult<SessionDescription> {
            Ok(SessionDescription::offer("v=0\r\n"))
        }
        async fn create_answer(&mut self) -> CoreResult<SessionDescription> {
            Ok(SessionDescription::answer("v=0\r\n"))
        }
        async fn set_local_description(&mut self, _: SessionDescription) -> CoreResult<()> {
            Ok(())
        }
        async fn set_remote_description(&mut self, _: SessionDescription) -> CoreResult<()> {
            Ok(())
        }
        fn parse_description(&self, kind: SdpType, sdp: &str) -> CoreResult<SessionDescription> {
            Ok(SessionDescription { kind, sdp: sdp.to_string() })
        }
        async fn senders(&self) -> Vec<TrackInfo> {
            Vec::new()
        }
        async fn receivers(&self) -> Vec<TrackInfo> {
            Vec::new()
        }
        async fn set_receiver_sink(&mut self, _: &str, _: Option<Arc<dyn MediaSink>>) -> CoreResult<()> {
            Ok(())
        }
        async fn set_receiver_enabled(&mut self, _: &str, _: bool) -> CoreResult<()> {
            Ok(())
        }
        async fn close(&mut self) -> CoreResult<()> {
            Ok(())
        }
    }

    struct NullFactory {
        fail: bool,
    }

    #[async_trait]
    impl EngineFactory for NullFactory {
        async fn create(&self, _: EngineOptions, _: EngineListeners) -> CoreResult<Box<dyn ConnectionEngine>> {
            if self.fail {
                return Err(Error::Engine("no codecs".to_string()));
            }
            Ok(Box::new(NullEngine))
        }
    }

    #[test]
    fn handles_are_unique_and_destroy_once() {
        let a = create_with(Arc::new(NullFactory { fail: false }), RoleProfile::play(None), SessionConfig::default())
            .unwrap();
        let b = create_with(Arc::new(NullFactory { fail: false }), RoleProfile::play(None), SessionConfig::default())
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(get(a).unwrap().role(), Role::Play);

        destroy(a).unwrap();
        assert!(get(a).is_err());
        assert!(destroy(a).is_err());
        assert!(get(b).is_ok());
        destroy(b).unwrap();
    }

    #[test]
    fn failed_init_registers_nothing() {
        let err = create_with(Arc::new(NullFactory { fail: true }), RoleProfile::publish(None, None), SessionConfig::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("no codecs"));
    }

    #[test]
    fn default_profiles_follow_role() {
        let publish = default_profile(Role::Publish);
        assert_eq!(publish.role, Role::Publish);
        assert!(publish.sink.is_none());
        // video is negotiated but has nothing to send until a capture source is supplied
        let sources: Vec<(MediaKind, bool)> = publish
            .media
            .iter()
            .map(|(kind, setup)| match setup {
                MediaSetup::SendTrack { source } => (*kind, source.is_some()),
                MediaSetup::Transceiver { .. } => (*kind, false),
            })
            .collect();
        assert_eq!(sources, vec![(MediaKind::Audio, true), (MediaKind::Video, false)]);
        let play = default_profile(Role::Play);
        assert!(play.sink.is_some());
    }
}
