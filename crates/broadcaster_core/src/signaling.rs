/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Offer/answer exchange with the media server's HTTP API.

use anyhow::{anyhow, Context, Result};
use broadcaster_protocol::{AnswerResponse, OfferRequest};
use rand::RngCore as _;
use reqwest::StatusCode;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::http_retry::send_with_retry;

const SIGNALING_ATTEMPTS: u32 = 3;

/// Posts the local offer and returns the server's answer text.
pub async fn exchange_offer(http: &reqwest::Client, cfg: &ClientConfig, offer_sdp: &str) -> Result<String> {
    let req = build_request(cfg, offer_sdp);
    info!(url = %cfg.server_url, tid = %req.tid, streamurl = %req.streamurl, "posting offer");

    let resp = send_with_retry(|| http.post(&cfg.server_url).json(&req), SIGNALING_ATTEMPTS)
        .await
        .with_context(|| format!("post offer to {}", cfg.server_url))?;
    let status = resp.status();
    let body = resp.text().await.context("read signaling response")?;
    debug!(%status, "signaling response: {body}");
    answer_from_response(status, &body)
}

pub fn build_request(cfg: &ClientConfig, offer_sdp: &str) -> OfferRequest {
    OfferRequest {
        api: cfg.server_url.clone(),
        sdp: offer_sdp.to_string(),
        tid: random_tid(),
        streamurl: cfg.stream_url(),
    }
}

/// Extracts the answer from a signaling reply, rejecting non-200 statuses and server-side errors.
pub fn answer_from_response(status: StatusCode, body: &str) -> Result<String> {
    if status != StatusCode::OK {
        return Err(anyhow!("signaling failed: {status} {}", body.trim()));
    }
    let resp: AnswerResponse = serde_json::from_str(body).context("decode signaling response")?;
    if !resp.is_ok() {
        return Err(anyhow!("signaling rejected: code {}", resp.code.unwrap_or_default()));
    }
    match resp.sdp {
        Some(sdp) if !sdp.trim().is_empty() => {
            if let Some(session) = resp.sessionid.as_deref() {
                info!(session, server = resp.server.as_deref().unwrap_or(""), "answer received");
            }
            Ok(sdp)
        }
        _ => Err(anyhow!("'sdp' missing in response")),
    }
}

/// Seven hex digits, the transaction id format the server expects.
fn random_tid() -> String {
    let v = rand::rngs::OsRng.next_u32() & 0x0fff_ffff;
    format!("{v:07x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    fn cfg() -> ClientConfig {
        serde_json::from_value(serde_json::json!({
            "role": "publish",
            "server_url": "http://127.0.0.1:1985/rtc/v1/publish/",
            "stream_id": "demo",
        }))
        .unwrap()
    }

    #[test]
    fn request_carries_api_and_stream_url() {
        let cfg = cfg();
        assert_eq!(cfg.role, Role::Publish);
        let req = build_request(&cfg, "v=0\r\n");
        assert_eq!(req.api, "http://127.0.0.1:1985/rtc/v1/publish/");
        assert_eq!(req.streamurl, "webrtc://d.ossrs.net/live/demo");
        assert_eq!(req.sdp, "v=0\r\n");
        assert_eq!(req.tid.len(), 7);
        assert!(req.tid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn answer_is_taken_from_sdp_field() {
        let answer = answer_from_response(StatusCode::OK, r#"{"code":0,"server":"vid-1","sdp":"v=0\r\n","sessionid":"a:b"}"#)
            .unwrap();
        assert_eq!(answer, "v=0\r\n");
    }

    #[test]
    fn missing_sdp_is_an_error() {
        let err = answer_from_response(StatusCode::OK, r#"{"code":0}"#).unwrap_err();
        assert_eq!(err.to_string(), "'sdp' missing in response");
    }

    #[test]
    fn non_200_is_an_error() {
        let err = answer_from_response(StatusCode::BAD_REQUEST, "stream busy").unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("stream busy"));
    }

    #[test]
    fn server_error_code_is_an_error() {
        let err = answer_from_response(StatusCode::OK, r#"{"code":400,"sdp":"v=0\r\n"}"#).unwrap_err();
        assert!(err.to_string().contains("code 400"));
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(answer_from_response(StatusCode::OK, "<html>").is_err());
    }
}
