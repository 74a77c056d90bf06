/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::io::sample_builder::SampleBuilder;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::codecs::opus::OpusPacket;
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::codecs::vp9::Vp9Packet;
use webrtc::rtp::packet::Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::candidates::{Candidate, CandidateKind};
use crate::engine::{
    ConnectionEngine, Direction, EngineFactory, EngineListeners, EngineOptions, GatheringState, MediaFrame, MediaKind,
    MediaSink, SampleSource, SdpType, SessionDescription, TrackInfo,
};
use crate::error::{Error, Result};
use crate::role::Capabilities;

const STREAM_ID: &str = "broadcaster";
// reorder window for incoming RTP, in sequence numbers
const MAX_LATE_PACKETS: u16 = 256;

static RECEIVER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Builds engines on top of the `webrtc` crate's peer connection.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebrtcEngineFactory;

#[async_trait]
impl EngineFactory for WebrtcEngineFactory {
    async fn create(&self, options: EngineOptions, listeners: EngineListeners) -> Result<Box<dyn ConnectionEngine>> {
        let pc = new_peer_connection(&options.ice_servers).await?;
        let receivers = Arc::new(Mutex::new(Vec::<ReceiverSlot>::new()));
        wire_listeners(&pc, &listeners, receivers.clone(), options.capabilities);
        info!(ice_servers = options.ice_servers.len(), "peer connection created");
        Ok(Box::new(WebrtcEngine {
            pc,
            capabilities: options.capabilities,
            senders: Vec::new(),
            receivers,
        }))
    }
}

async fn new_peer_connection(ice_urls: &[String]) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().context("register codecs")?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine).context("register interceptors")?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();
    let pc = api
        .new_peer_connection(RTCConfiguration {
            ice_servers: build_ice_servers(ice_urls),
            ..Default::default()
        })
        .await
        .context("new peer connection")?;
    Ok(Arc::new(pc))
}

fn build_ice_servers(ice_urls: &[String]) -> Vec<RTCIceServer> {
    ice_urls
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .collect()
}

/// Per-receiver switch consulted by the RTP read loop.
#[derive(Default)]
struct ReceiveGate {
    disabled: AtomicBool,
    sink: Mutex<Option<Arc<dyn MediaSink>>>,
}

struct ReceiverSlot {
    id: String,
    kind: MediaKind,
    /// Set once the remote track for this slot has arrived.
    bound: bool,
    gate: Arc<ReceiveGate>,
}

impl ReceiverSlot {
    fn new(kind: MediaKind) -> Self {
        Self {
            id: format!("{}-{}", kind.as_str(), RECEIVER_SEQ.fetch_add(1, Ordering::Relaxed)),
            kind,
            bound: false,
            gate: Arc::new(ReceiveGate::default()),
        }
    }
}

struct LocalTrack {
    kind: MediaKind,
    sender: Arc<RTCRtpSender>,
    pump: Option<JoinHandle<()>>,
}

pub struct WebrtcEngine {
    pc: Arc<RTCPeerConnection>,
    capabilities: Capabilities,
    senders: Vec<LocalTrack>,
    receivers: Arc<Mutex<Vec<ReceiverSlot>>>,
}

fn wire_listeners(
    pc: &Arc<RTCPeerConnection>,
    listeners: &EngineListeners,
    receivers: Arc<Mutex<Vec<ReceiverSlot>>>,
    capabilities: Capabilities,
) {
    let candidates = listeners.candidates.clone();
    pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
        let candidates = candidates.clone();
        Box::pin(async move {
            let Some(cand) = cand else { return };
            match cand.to_json() {
                Ok(init) => {
                    let section = init.sdp_mline_index.unwrap_or(0) as usize;
                    candidates.on_candidate(Candidate::new(section, &init.candidate, candidate_kind(cand.typ)));
                }
                Err(e) => warn!("candidate to_json failed: {e}"),
            }
        })
    }));

    let gathering = listeners.gathering.clone();
    pc.on_ice_gathering_state_change(Box::new(move |st: RTCIceGathererState| {
        let state = match st {
            RTCIceGathererState::Gathering => Some(GatheringState::Discovering),
            RTCIceGathererState::Complete => Some(GatheringState::Complete),
            RTCIceGathererState::New => Some(GatheringState::Idle),
            _ => None,
        };
        if let Some(state) = state {
            gathering.on_gathering_change(state);
        }
        Box::pin(async {})
    }));

    let tracks = listeners.tracks.clone();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        let tracks = tracks.clone();
        let receivers = receivers.clone();
        Box::pin(async move {
            let Some(kind) = media_kind(track.kind()) else {
                return;
            };
            let (id, gate) = {
                let mut slots = receivers.lock().unwrap_or_else(|e| e.into_inner());
                let idx = match slots.iter().position(|s| s.kind == kind && !s.bound) {
                    Some(idx) => idx,
                    None => {
                        slots.push(ReceiverSlot::new(kind));
                        slots.len() - 1
                    }
                };
                let slot = &mut slots[idx];
                slot.bound = true;
                (slot.id.clone(), slot.gate.clone())
            };
            info!(kind = kind.as_str(), id = %id, ssrc = track.ssrc(), "remote track");
            spawn_reader(track, kind, id.clone(), gate, capabilities.decode);
            tracks.on_track_added(TrackInfo {
                id,
                kind,
                has_track: true,
            });
        })
    }));
}

/// Rebuilds whole media frames out of a remote track's RTP packets.
struct FrameAssembler<D: Depacketizer> {
    builder: SampleBuilder<D>,
    kind: MediaKind,
    track_id: String,
}

impl<D: Depacketizer> FrameAssembler<D> {
    fn new(kind: MediaKind, track_id: String, depacketizer: D, clock_rate: u32) -> Self {
        Self {
            builder: SampleBuilder::new(MAX_LATE_PACKETS, depacketizer, clock_rate),
            kind,
            track_id,
        }
    }

    /// Feeds one packet and hands every frame it completes to `deliver`.
    fn push(&mut self, pkt: Packet, mut deliver: impl FnMut(MediaFrame)) {
        self.builder.push(pkt);
        while let Some(sample) = self.builder.pop() {
            deliver(MediaFrame {
                kind: self.kind,
                track_id: self.track_id.clone(),
                timestamp: sample.packet_timestamp,
                payload: sample.data,
            });
        }
    }
}

fn spawn_reader(track: Arc<TrackRemote>, kind: MediaKind, id: String, gate: Arc<ReceiveGate>, decode: bool) {
    if !decode {
        tokio::spawn(drain_remote(track, kind, id));
        return;
    }
    let codec = track.codec().capability;
    let clock_rate = codec.clock_rate;
    match codec.mime_type.to_ascii_lowercase().as_str() {
        "audio/opus" => {
            let frames = FrameAssembler::new(kind, id, OpusPacket, clock_rate);
            tokio::spawn(read_remote(track, frames, gate));
        }
        "video/vp8" => {
            let frames = FrameAssembler::new(kind, id, Vp8Packet::default(), clock_rate);
            tokio::spawn(read_remote(track, frames, gate));
        }
        "video/vp9" => {
            let frames = FrameAssembler::new(kind, id, Vp9Packet::default(), clock_rate);
            tokio::spawn(read_remote(track, frames, gate));
        }
        "video/h264" => {
            let frames = FrameAssembler::new(kind, id, H264Packet::default(), clock_rate);
            tokio::spawn(read_remote(track, frames, gate));
        }
        other => {
            warn!(kind = kind.as_str(), id = %id, mime = other, "no depacketizer for remote codec");
            tokio::spawn(drain_remote(track, kind, id));
        }
    }
}

async fn read_remote<D>(track: Arc<TrackRemote>, mut frames: FrameAssembler<D>, gate: Arc<ReceiveGate>)
where
    D: Depacketizer + Send + 'static,
{
    while let Ok((pkt, _)) = track.read_rtp().await {
        let disabled = gate.disabled.load(Ordering::Relaxed);
        let sink = gate.sink.lock().unwrap_or_else(|e| e.into_inner()).clone();
        frames.push(pkt, |frame| {
            if let Some(sink) = sink.as_ref().filter(|_| !disabled) {
                sink.on_frame(&frame);
            }
        });
    }
    debug!(kind = frames.kind.as_str(), id = %frames.track_id, "remote track ended");
}

async fn drain_remote(track: Arc<TrackRemote>, kind: MediaKind, id: String) {
    while track.read_rtp().await.is_ok() {}
    debug!(kind = kind.as_str(), id = %id, "remote track ended");
}

fn candidate_kind(typ: RTCIceCandidateType) -> CandidateKind {
    match typ {
        RTCIceCandidateType::Srflx => CandidateKind::ServerReflexive,
        RTCIceCandidateType::Prflx => CandidateKind::PeerReflexive,
        RTCIceCandidateType::Relay => CandidateKind::Relayed,
        _ => CandidateKind::Host,
    }
}

fn media_kind(kind: RTPCodecType) -> Option<MediaKind> {
    match kind {
        RTPCodecType::Audio => Some(MediaKind::Audio),
        RTPCodecType::Video => Some(MediaKind::Video),
        _ => None,
    }
}

fn codec_type(kind: MediaKind) -> Result<RTPCodecType> {
    match kind {
        MediaKind::Audio => Ok(RTPCodecType::Audio),
        MediaKind::Video => Ok(RTPCodecType::Video),
        MediaKind::Data => Err(Error::Engine("data has no media track".to_string())),
    }
}

fn codec_capability(kind: MediaKind) -> Result<RTCRtpCodecCapability> {
    match kind {
        MediaKind::Audio => Ok(RTCRtpCodecCapability {
            mime_type: "audio/opus".to_owned(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "".to_owned(),
            rtcp_feedback: vec![],
        }),
        MediaKind::Video => Ok(RTCRtpCodecCapability {
            mime_type: "video/VP8".to_owned(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: "".to_owned(),
            rtcp_feedback: vec![],
        }),
        MediaKind::Data => Err(Error::Engine("data has no media track".to_string())),
    }
}

fn to_description(desc: &RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp.clone())),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp.clone())),
        other => Err(Error::Engine(format!("unexpected description type {other:?}"))),
    }
}

fn to_rtc(desc: &SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match desc.kind {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp.clone()),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp.clone()),
    };
    parsed.map_err(|e| Error::InvalidDescription(e.to_string()))
}

impl WebrtcEngine {
    fn gate(&self, receiver_id: &str) -> Result<Arc<ReceiveGate>> {
        let slots = self.receivers.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .iter()
            .find(|s| s.id == receiver_id)
            .map(|s| s.gate.clone())
            .ok_or_else(|| Error::Engine(format!("unknown receiver {receiver_id}")))
    }
}

#[async_trait]
impl ConnectionEngine for WebrtcEngine {
    async fn add_track(&mut self, kind: MediaKind, source: Option<Arc<dyn SampleSource>>) -> Result<()> {
        if !self.capabilities.encode {
            return Err(Error::Engine("engine built without encoders".to_string()));
        }
        let track = Arc::new(TrackLocalStaticSample::new(
            codec_capability(kind)?,
            kind.as_str().to_owned(),
            STREAM_ID.to_owned(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .with_context(|| format!("add {} track", kind.as_str()))?;

        let pump = source.map(|source| {
            tokio::spawn(async move {
                while let Some(s) = source.next_sample().await {
                    let sample = Sample {
                        data: s.data,
                        duration: s.duration,
                        ..Default::default()
                    };
                    if let Err(e) = track.write_sample(&sample).await {
                        debug!(kind = kind.as_str(), "write sample: {e}");
                        break;
                    }
                }
            })
        });
        self.senders.push(LocalTrack { kind, sender, pump });
        debug!(kind = kind.as_str(), "local track added");
        Ok(())
    }

    async fn remove_track(&mut self, kind: MediaKind) -> Result<bool> {
        let Some(idx) = self.senders.iter().position(|t| t.kind == kind) else {
            return Ok(false);
        };
        let local = self.senders.remove(idx);
        if let Some(pump) = local.pump {
            pump.abort();
        }
        self.pc
            .remove_track(&local.sender)
            .await
            .with_context(|| format!("remove {} track", kind.as_str()))?;
        Ok(true)
    }

    async fn add_transceiver(&mut self, kind: MediaKind, direction: Direction) -> Result<()> {
        let direction = match direction {
            Direction::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            Direction::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            Direction::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
        };
        self.pc
            .add_transceiver_from_kind(
                codec_type(kind)?,
                Some(RTCRtpTransceiverInit {
                    direction,
                    send_encodings: vec![],
                }),
            )
            .await
            .with_context(|| format!("add {} transceiver", kind.as_str()))?;
        if direction != RTCRtpTransceiverDirection::Sendonly {
            self.receivers.lock().unwrap_or_else(|e| e.into_inner()).push(ReceiverSlot::new(kind));
        }
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.context("create offer")?;
        to_description(&offer)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await.context("create answer")?;
        to_description(&answer)
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(&desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .context("set local description")?;
        Ok(())
    }

    async fn set_remote_description(&mut self, desc: SessionDescription) -> Result<()> {
        let desc = to_rtc(&desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .context("set remote description")?;
        Ok(())
    }

    fn parse_description(&self, kind: SdpType, sdp: &str) -> Result<SessionDescription> {
        let desc = SessionDescription { kind, sdp: sdp.to_string() };
        to_rtc(&desc)?;
        Ok(desc)
    }

    async fn senders(&self) -> Vec<TrackInfo> {
        self.senders
            .iter()
            .map(|t| TrackInfo {
                id: t.kind.as_str().to_string(),
                kind: t.kind,
                has_track: true,
            })
            .collect()
    }

    async fn receivers(&self) -> Vec<TrackInfo> {
        self.receivers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| TrackInfo {
                id: s.id.clone(),
                kind: s.kind,
                has_track: true,
            })
            .collect()
    }

    async fn set_receiver_sink(&mut self, receiver_id: &str, sink: Option<Arc<dyn MediaSink>>) -> Result<()> {
        let gate = self.gate(receiver_id)?;
        *gate.sink.lock().unwrap_or_else(|e| e.into_inner()) = sink;
        Ok(())
    }

    async fn set_receiver_enabled(&mut self, receiver_id: &str, enabled: bool) -> Result<()> {
        self.gate(receiver_id)?.disabled.store(!enabled, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        for local in self.senders.drain(..) {
            if let Some(pump) = local.pump {
                pump.abort();
            }
        }
        self.pc.close().await.context("close peer connection")?;
        Ok(())
    }
}
