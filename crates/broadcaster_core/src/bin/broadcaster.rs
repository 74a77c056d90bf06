/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use broadcaster_core::config::ClientConfig;
use broadcaster_core::engine::SessionDescription;
use broadcaster_core::registry::default_profile;
use broadcaster_core::signaling::exchange_offer;
use broadcaster_core::webrtc_engine::WebrtcEngineFactory;
use broadcaster_core::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

// Blocking coordinator calls must not run inside a runtime, so main stays synchronous
// and only the HTTP exchange and the quit wait are driven by tokio.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cfg = ClientConfig::resolve()?;
    info!(role = cfg.role.as_str(), server = %cfg.server_url, stream = %cfg.stream_url(), "broadcaster starting");

    let coordinator = Coordinator::initialize(Arc::new(WebrtcEngineFactory), default_profile(cfg.role), cfg.session.clone())
        .context("initialize session")?;
    let offer = coordinator.create_offer().context("create offer")?;
    println!("{}", offer.sdp);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("build http client")?;

    let answer = rt.block_on(exchange_offer(&http, &cfg, &offer.sdp))?;
    coordinator
        .start_stream(&SessionDescription::answer(answer))
        .context("apply answer")?;
    info!("streaming; press q or Ctrl+C to stop");

    rt.block_on(wait_for_quit());
    rt.shutdown_background();

    drop(coordinator);
    info!("bye");
    Ok(())
}

async fn wait_for_quit() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("shutdown requested");
                return;
            }
            line = lines.next_line() => match line {
                Ok(Some(l)) if l.trim().eq_ignore_ascii_case("q") => return,
                Ok(Some(_)) => {}
                // stdin closed: keep streaming until Ctrl+C
                Ok(None) | Err(_) => {
                    let _ = (&mut ctrl_c).await;
                    info!("shutdown requested");
                    return;
                }
            },
        }
    }
}
