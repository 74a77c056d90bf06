/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::role::Role;

pub const DEFAULT_STUN: &str = "stun:stun.l.google.com:19302";
const DEFAULT_SERVER_BASE: &str = "http://d.ossrs.net:1985/rtc/v1/";
const DEFAULT_STREAM_URL_BASE: &str = "webrtc://d.ossrs.net/live/";
const DEFAULT_STREAM_ID: &str = "broadcaster";

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct SessionConfig {
    pub ice_servers: Option<Vec<String>>,
    pub init_timeout_secs: Option<u64>,
    pub offer_timeout_secs: Option<u64>,
    pub gathering_timeout_secs: Option<u64>,
    pub close_timeout_secs: Option<u64>,
}

impl SessionConfig {
    pub fn ice_servers(&self) -> Vec<String> {
        let urls = self
            .ice_servers
            .clone()
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if self.ice_servers.is_none() {
            return vec![DEFAULT_STUN.to_string()];
        }
        urls
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs.unwrap_or(10).max(1).min(120))
    }

    pub fn offer_timeout(&self) -> Duration {
        Duration::from_secs(self.offer_timeout_secs.unwrap_or(10).max(1).min(120))
    }

    pub fn gathering_timeout(&self) -> Duration {
        Duration::from_secs(self.gathering_timeout_secs.unwrap_or(30).max(1).min(300))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs.unwrap_or(5).max(1).min(60))
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct ClientConfig {
    pub role: Role,
    pub server_url: String,
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
    #[serde(default = "default_stream_url_base")]
    pub stream_url_base: String,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_stream_id() -> String {
    DEFAULT_STREAM_ID.to_string()
}

fn default_stream_url_base() -> String {
    DEFAULT_STREAM_URL_BASE.to_string()
}

fn default_server_url(role: Role) -> String {
    format!("{DEFAULT_SERVER_BASE}{}/", role.as_str())
}

impl ClientConfig {
    pub fn stream_url(&self) -> String {
        format!(
            "{}{}",
            self.stream_url_base,
            urlencoding::encode(self.stream_id.trim())
        )
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, with an injectable variable source.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // MODE=1 plays, anything else publishes
        let role = match var("MODE").as_deref() {
            Some("1") => Role::Play,
            Some(other) => other.parse::<Role>().unwrap_or(Role::Publish),
            None => Role::Publish,
        };
        let parse_secs = |k: &str| -> Result<Option<u64>> {
            var(k)
                .map(|v| v.parse::<u64>().with_context(|| format!("{k} must be a number of seconds")))
                .transpose()
        };

        Ok(Self {
            role,
            server_url: var("SERVER_URL").unwrap_or_else(|| default_server_url(role)),
            stream_id: var("STREAM_ID").unwrap_or_else(default_stream_id),
            stream_url_base: var("STREAM_URL_BASE").unwrap_or_else(default_stream_url_base),
            session: SessionConfig {
                ice_servers: var("ICE_SERVERS").map(|v| v.split(',').map(str::to_string).collect()),
                init_timeout_secs: parse_secs("INIT_TIMEOUT_SECS")?,
                offer_timeout_secs: parse_secs("OFFER_TIMEOUT_SECS")?,
                gathering_timeout_secs: parse_secs("GATHERING_TIMEOUT_SECS")?,
                close_timeout_secs: None,
            },
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        serde_json::from_str(&text).context("decode ClientConfig")
    }

    /// `--config <path>` wins, then `BROADCASTER_CONFIG`, then the environment.
    pub fn resolve() -> Result<Self> {
        match parse_config_path()? {
            Some(path) => Self::load(&path),
            None => Self::from_env(),
        }
    }
}

fn parse_config_path() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return Ok(Some(PathBuf::from(path)));
            }
            return Err(anyhow::anyhow!("--config requires a path"));
        }
    }
    if let Ok(path) = std::env::var("BROADCASTER_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(Some(PathBuf::from(path)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_follow_mode() {
        let publish = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(publish.role, Role::Publish);
        assert_eq!(publish.server_url, "http://d.ossrs.net:1985/rtc/v1/publish/");
        assert_eq!(publish.stream_url(), "webrtc://d.ossrs.net/live/broadcaster");

        let play = ClientConfig::from_lookup(lookup(&[("MODE", "1")])).unwrap();
        assert_eq!(play.role, Role::Play);
        assert_eq!(play.server_url, "http://d.ossrs.net:1985/rtc/v1/play/");
    }

    #[test]
    fn unknown_mode_publishes() {
        let cfg = ClientConfig::from_lookup(lookup(&[("MODE", "7")])).unwrap();
        assert_eq!(cfg.role, Role::Publish);
    }

    #[test]
    fn env_overrides_and_ice_list() {
        let cfg = ClientConfig::from_lookup(lookup(&[
            ("SERVER_URL", "http://127.0.0.1:1985/rtc/v1/publish/"),
            ("STREAM_ID", "cam 1"),
            ("ICE_SERVERS", "stun:a.example:3478, ,stun:b.example:3478"),
            ("GATHERING_TIMEOUT_SECS", "900"),
        ]))
        .unwrap();
        assert_eq!(cfg.server_url, "http://127.0.0.1:1985/rtc/v1/publish/");
        assert_eq!(cfg.stream_url(), "webrtc://d.ossrs.net/live/cam%201");
        assert_eq!(
            cfg.session.ice_servers(),
            vec!["stun:a.example:3478".to_string(), "stun:b.example:3478".to_string()]
        );
        assert_eq!(cfg.session.gathering_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("OFFER_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(format!("{err:#}").contains("OFFER_TIMEOUT_SECS"));
    }

    #[test]
    fn session_defaults() {
        let s = SessionConfig::default();
        assert_eq!(s.ice_servers(), vec![DEFAULT_STUN.to_string()]);
        assert_eq!(s.offer_timeout(), Duration::from_secs(10));
        assert_eq!(s.gathering_timeout(), Duration::from_secs(30));

        let none = SessionConfig {
            ice_servers: Some(vec![]),
            ..Default::default()
        };
        assert!(none.ice_servers().is_empty());
    }

    #[test]
    fn json_config_uses_defaults_for_missing_fields() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"role":"play","server_url":"http://127.0.0.1/rtc/v1/play/"}"#).unwrap();
        assert_eq!(cfg.role, Role::Play);
        assert_eq!(cfg.stream_id, "broadcaster");
        assert_eq!(cfg.session.close_timeout(), Duration::from_secs(5));
    }
}
