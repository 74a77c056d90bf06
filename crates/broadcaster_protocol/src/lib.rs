/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};

/// Body posted to the media server's `rtc/v1/publish/` or `rtc/v1/play/` API.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OfferRequest {
    pub api: String,
    pub sdp: String,
    pub tid: String,
    pub streamurl: String,
}

/// Server reply. Only `sdp` is required for a usable answer; the rest is informational.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AnswerResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub sdp: Option<String>,
    #[serde(default)]
    pub sessionid: Option<String>,
}

impl AnswerResponse {
    pub fn is_ok(&self) -> bool {
        self.code.unwrap_or(0) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_request_uses_server_field_names() {
        let req = OfferRequest {
            api: "http://127.0.0.1:1985/rtc/v1/publish/".to_string(),
            sdp: "v=0\r\n".to_string(),
            tid: "40b4c8e".to_string(),
            streamurl: "webrtc://127.0.0.1/live/demo".to_string(),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["api"], "http://127.0.0.1:1985/rtc/v1/publish/");
        assert_eq!(v["tid"], "40b4c8e");
        assert_eq!(v["streamurl"], "webrtc://127.0.0.1/live/demo");
        assert_eq!(v["sdp"], "v=0\r\n");
    }

    #[test]
    fn answer_response_tolerates_missing_fields() {
        let resp: AnswerResponse = serde_json::from_str(r#"{"code":0,"sdp":"v=0\r\n"}"#).unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.sdp.as_deref(), Some("v=0\r\n"));
        assert!(resp.sessionid.is_none());

        let failed: AnswerResponse = serde_json::from_str(r#"{"code":400}"#).unwrap();
        assert!(!failed.is_ok());
        assert!(failed.sdp.is_none());
    }
}
