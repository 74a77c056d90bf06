/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{anyhow, Result};
use rand::{thread_rng, Rng};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sends the request built by `build`, retrying transport errors, 429 and 5xx.
///
/// `attempts` is clamped to 1..=5. The last response is returned as-is even when
/// its status would have been retried.
pub async fn send_with_retry<F>(mut build: F, attempts: u32) -> Result<Response>
where
    F: FnMut() -> RequestBuilder,
{
    let max_attempts = attempts.clamp(1, 5);
    let mut backoff = Duration::from_millis(200);
    let mut last_err = None;
    for attempt in 0..max_attempts {
        let last = attempt + 1 >= max_attempts;
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();
                if !should_retry_status(status) || last {
                    return Ok(resp);
                }
                warn!(attempt = attempt + 1, %status, "signaling request retry");
            }
            Err(e) => {
                if last {
                    return Err(e.into());
                }
                warn!(attempt = attempt + 1, "signaling request failed: {e}");
                last_err = Some(e);
            }
        }
        sleep_with_jitter(backoff).await;
        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
    }
    Err(last_err.map(Into::into).unwrap_or_else(|| anyhow!("retry loop exhausted")))
}

fn should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

async fn sleep_with_jitter(base: Duration) {
    let jitter_ms: u64 = thread_rng().gen_range(0..=200);
    tokio::time::sleep(base + Duration::from_millis(jitter_ms)).await;
}
