/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use broadcaster_core::config::SessionConfig;
use broadcaster_core::registry::default_profile;
use broadcaster_core::role::Role;
use broadcaster_core::webrtc_engine::WebrtcEngineFactory;
use broadcaster_core::Coordinator;
use std::env;
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let role = match env::args().nth(1) {
        Some(r) => r.parse::<Role>().map_err(anyhow::Error::msg)?,
        None => Role::Publish,
    };

    let coordinator = Coordinator::initialize(Arc::new(WebrtcEngineFactory), default_profile(role), SessionConfig::default())?;
    let offer = coordinator.create_offer()?;
    print!("{}", offer.sdp);
    Ok(())
}
