/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Session coordinator: a synchronous facade over an actor that owns the engine.
//!
//! The engine lives on a dedicated `signaling_thread` running a current-thread
//! runtime. Public methods enqueue a [`Command`] and block the calling thread on
//! one-shot signals; engine notifications come back as [`Event`]s on a second
//! channel. Both channels are drained by the same loop, so engine state is never
//! touched from two threads.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::candidates::{Candidate, CandidateAggregator, CandidateBuckets};
use crate::config::SessionConfig;
use crate::engine::{
    CandidateListener, ConnectionEngine, EngineFactory, EngineListeners, EngineOptions, GatheringListener,
    GatheringState, MediaKind, SdpType, SessionDescription, TrackInfo, TrackListener,
};
use crate::error::{Error, Result};
use crate::merge::merge_candidates;
use crate::role::{MediaSetup, Role, RoleProfile};
use crate::signal::{self, Promise, Waiter};

const CONTEXT_THREAD_NAME: &str = "signaling_thread";

enum Command {
    CreateOffer {
        description: Promise<Result<SessionDescription>>,
        gathered: Promise<CandidateBuckets>,
    },
    StartStream {
        remote: SessionDescription,
        done: Promise<Result<()>>,
    },
    EnableStream {
        kind: MediaKind,
        enabled: bool,
        done: Promise<bool>,
    },
    Close {
        done: Promise<()>,
    },
}

enum Event {
    Candidate(Candidate),
    Gathering(GatheringState),
    TrackAdded(TrackInfo),
}

struct EventForwarder {
    tx: mpsc::UnboundedSender<Event>,
}

impl CandidateListener for EventForwarder {
    fn on_candidate(&self, candidate: Candidate) {
        let _ = self.tx.send(Event::Candidate(candidate));
    }
}

impl GatheringListener for EventForwarder {
    fn on_gathering_change(&self, state: GatheringState) {
        let _ = self.tx.send(Event::Gathering(state));
    }
}

impl TrackListener for EventForwarder {
    fn on_track_added(&self, receiver: TrackInfo) {
        let _ = self.tx.send(Event::TrackAdded(receiver));
    }
}

pub struct Coordinator {
    role: Role,
    config: SessionConfig,
    commands: mpsc::UnboundedSender<Command>,
    shutdown_tx: watch::Sender<bool>,
    runtime: tokio::runtime::Handle,
    context: Option<thread::JoinHandle<()>>,
    context_id: thread::ThreadId,
    offered: AtomicBool,
}

impl Coordinator {
    /// Starts the session thread and builds the engine on it.
    ///
    /// Blocks until the engine exists. Fails if the runtime, the thread or the
    /// engine cannot be constructed; nothing is usable in that case.
    pub fn initialize(factory: Arc<dyn EngineFactory>, profile: RoleProfile, config: SessionConfig) -> Result<Self> {
        ensure_not_async()?;
        info!(role = profile.role.as_str(), "initializing session");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Init(format!("build session runtime: {e}")))?;
        let handle = runtime.handle().clone();

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready, ready_waiter) = signal::channel();
        let options = EngineOptions {
            ice_servers: config.ice_servers(),
            capabilities: profile.capabilities,
        };
        let role = profile.role;

        let join = thread::Builder::new()
            .name(CONTEXT_THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(run_session(factory, options, profile, command_rx, shutdown_rx, ready));
            })
            .map_err(|e| Error::Init(format!("spawn {CONTEXT_THREAD_NAME}: {e}")))?;

        let coordinator = Self {
            role,
            context_id: join.thread().id(),
            context: Some(join),
            config,
            commands,
            shutdown_tx,
            runtime: handle,
            offered: AtomicBool::new(false),
        };

        let init_timeout = coordinator.config.init_timeout();
        match coordinator.wait(ready_waiter, init_timeout, "engine init") {
            Ok(Ok(())) => Ok(coordinator),
            Ok(Err(e)) | Err(e) => {
                error!("create session failed: {e}");
                Err(match e {
                    Error::Init(_) => e,
                    other => Error::Init(other.to_string()),
                })
            }
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Adds the role's media, generates the offer and waits for candidate
    /// discovery, then returns the offer with every candidate embedded.
    ///
    /// One offer per coordinator: a second call fails with `AlreadyNegotiated`.
    pub fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_blocking_allowed()?;
        if self.offered.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyNegotiated);
        }
        info!(role = self.role.as_str(), "create offer");

        let (description, description_waiter) = signal::channel();
        let (gathered, gathered_waiter) = signal::channel();
        self.send(Command::CreateOffer { description, gathered })?;

        let offer = self.wait(description_waiter, self.config.offer_timeout(), "local description")??;
        debug!("offer sdp: {}", offer.sdp);
        let buckets = self.wait(gathered_waiter, self.config.gathering_timeout(), "candidate discovery")?;

        let merged = merge_candidates(&offer.sdp, &buckets)
            .ok_or(Error::MissingSection("need m=audio, then m=video, and audio candidates"))?;
        info!(candidates = buckets.len(), "offer ready");
        Ok(SessionDescription::offer(merged))
    }

    /// Applies the remote description. A remote offer gets a local answer generated.
    pub fn start_stream(&self, remote: &SessionDescription) -> Result<()> {
        self.ensure_blocking_allowed()?;
        let (done, waiter) = signal::channel();
        self.send(Command::StartStream {
            remote: remote.clone(),
            done,
        })?;
        self.wait(waiter, self.config.offer_timeout(), "remote description")?
    }

    /// Toggles the first receiving track of `kind`. `Ok(false)` if none matched.
    ///
    /// Only the first match is touched even when several receivers share a kind.
    pub fn enable_stream(&self, kind: MediaKind, enabled: bool) -> Result<bool> {
        self.ensure_blocking_allowed()?;
        let (done, waiter) = signal::channel();
        self.send(Command::EnableStream { kind, enabled, done })?;
        self.wait(waiter, self.config.offer_timeout(), "enable stream")
    }

    /// True when called from the session thread itself.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.context_id
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.commands.send(cmd).map_err(|_| Error::Closed)
    }

    fn ensure_blocking_allowed(&self) -> Result<()> {
        if self.is_current() {
            return Err(Error::WrongContext);
        }
        ensure_not_async()
    }

    fn wait<T>(&self, waiter: Waiter<T>, timeout: Duration, what: &'static str) -> Result<T> {
        self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, waiter).await {
                Ok(v) => v,
                Err(_) => Err(Error::Timeout(timeout, what)),
            }
        })
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        info!(role = self.role.as_str(), "closing session");
        let (done, done_waiter) = signal::channel();
        let queued = self.commands.send(Command::Close { done }).is_ok();

        if self.is_current() {
            // The loop we are running inside closes the engine once this returns.
            let _ = self.shutdown_tx.send(true);
            drop(self.context.take());
            return;
        }

        let closed = queued
            && ensure_not_async().is_ok()
            && match self.wait(done_waiter, self.config.close_timeout(), "session close") {
                // the loop already exited and dropped the command
                Ok(()) | Err(Error::Abandoned) => true,
                Err(e) => {
                    warn!("session close: {e}");
                    false
                }
            };

        let _ = self.shutdown_tx.send(true);
        if let Some(join) = self.context.take() {
            if closed || !queued {
                if join.join().is_err() {
                    error!("{CONTEXT_THREAD_NAME} panicked");
                }
            } else {
                warn!("session close unfinished, detaching {CONTEXT_THREAD_NAME}");
            }
        }
        info!(role = self.role.as_str(), "session closed");
    }
}

fn ensure_not_async() -> Result<()> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::WrongContext);
    }
    Ok(())
}

async fn run_session(
    factory: Arc<dyn EngineFactory>,
    options: EngineOptions,
    profile: RoleProfile,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut shutdown: watch::Receiver<bool>,
    ready: Promise<Result<()>>,
) {
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let forwarder = Arc::new(EventForwarder { tx: event_tx });
    let listeners = EngineListeners {
        candidates: forwarder.clone(),
        gathering: forwarder.clone(),
        tracks: forwarder,
    };

    let engine = match factory.create(options, listeners).await {
        Ok(engine) => engine,
        Err(e) => {
            error!("create engine failed: {e}");
            ready.fulfill(Err(e));
            return;
        }
    };
    ready.fulfill(Ok(()));

    let mut session = Session {
        engine: Some(engine),
        profile,
        aggregator: CandidateAggregator::new(),
    };

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            Some(cmd) = commands.recv() => session.handle_command(cmd).await,
            Some(ev) = events.recv() => session.handle_event(ev).await,
            else => break,
        }
    }
    session.close().await;
}

struct Session {
    engine: Option<Box<dyn ConnectionEngine>>,
    profile: RoleProfile,
    aggregator: CandidateAggregator,
}

impl Session {
    fn engine(&mut self) -> Result<&mut Box<dyn ConnectionEngine>> {
        self.engine.as_mut().ok_or(Error::Closed)
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::CreateOffer { description, gathered } => {
                let result = self.create_offer(gathered).await;
                if let Err(e) = &result {
                    warn!("create offer failed: {e}");
                }
                description.fulfill(result);
            }
            Command::StartStream { remote, done } => {
                let result = self.apply_remote(remote).await;
                if let Err(e) = &result {
                    warn!("start stream failed: {e}");
                }
                done.fulfill(result);
            }
            Command::EnableStream { kind, enabled, done } => {
                let matched = match self.enable_stream(kind, enabled).await {
                    Ok(matched) => matched,
                    Err(e) => {
                        warn!(kind = kind.as_str(), "enable stream failed: {e}");
                        false
                    }
                };
                done.fulfill(matched);
            }
            Command::Close { done } => {
                self.close().await;
                done.fulfill(());
            }
        }
    }

    async fn handle_event(&mut self, ev: Event) {
        match ev {
            Event::Candidate(c) => {
                debug!(index = c.section, kind = ?c.kind, "candidate {}", c.text);
                self.aggregator.on_candidate(&c);
            }
            Event::Gathering(state) => {
                info!(state = ?state, "gathering state");
                match state {
                    GatheringState::Discovering => self.aggregator.on_discovery_started(),
                    GatheringState::Complete => {
                        self.aggregator.on_discovery_complete();
                    }
                    GatheringState::Idle => {}
                }
            }
            Event::TrackAdded(receiver) => {
                info!(kind = receiver.kind.as_str(), id = %receiver.id, "remote track added");
                let Some(sink) = self.profile.sink.clone() else {
                    return;
                };
                if !self.profile.capabilities.decode {
                    return;
                }
                let attached = match self.engine() {
                    Ok(engine) => engine.set_receiver_sink(&receiver.id, Some(sink)).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = attached {
                    warn!(id = %receiver.id, "attach sink failed: {e}");
                }
            }
        }
    }

    async fn create_offer(&mut self, gathered: Promise<CandidateBuckets>) -> Result<SessionDescription> {
        let media = self.profile.media.clone();
        let engine = self.engine()?;
        for (kind, setup) in media {
            match setup {
                MediaSetup::SendTrack { source } => engine.add_track(kind, source).await?,
                MediaSetup::Transceiver { direction } => engine.add_transceiver(kind, direction).await?,
            }
        }
        let media_lines = local_media_lines(&**engine).await;
        let offer = engine.create_offer().await?;

        self.aggregator.arm(media_lines, gathered);
        self.engine()?.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn apply_remote(&mut self, remote: SessionDescription) -> Result<()> {
        let engine = self.engine()?;
        let parsed = engine.parse_description(remote.kind, &remote.sdp)?;
        info!(kind = ?parsed.kind, "set remote description");
        engine.set_remote_description(parsed.clone()).await?;
        if parsed.kind == SdpType::Offer {
            info!("remote sent an offer, creating answer");
            let answer = engine.create_answer().await?;
            debug!("answer sdp: {}", answer.sdp);
            engine.set_local_description(answer).await?;
        }
        Ok(())
    }

    async fn enable_stream(&mut self, kind: MediaKind, enabled: bool) -> Result<bool> {
        if kind == MediaKind::Data {
            return Ok(false);
        }
        let sink = self.profile.sink.clone();
        let engine = self.engine()?;
        let receivers = engine.receivers().await;
        let Some(receiver) = receivers.into_iter().find(|r| r.has_track && r.kind == kind) else {
            return Ok(false);
        };

        engine.set_receiver_sink(&receiver.id, None).await?;
        if enabled {
            if let Some(sink) = sink {
                engine.set_receiver_sink(&receiver.id, Some(sink)).await?;
            }
        }
        engine.set_receiver_enabled(&receiver.id, enabled).await?;
        info!(kind = kind.as_str(), id = %receiver.id, enabled, "stream toggled");
        Ok(true)
    }

    async fn close(&mut self) {
        let Some(mut engine) = self.engine.take() else {
            return;
        };
        for (kind, setup) in &self.profile.media {
            if let MediaSetup::SendTrack { .. } = setup {
                if let Err(e) = engine.remove_track(*kind).await {
                    debug!(kind = kind.as_str(), "remove track: {e}");
                }
            }
        }
        if let Err(e) = engine.close().await {
            warn!("engine close: {e}");
        }
        drop(engine);
        debug!("engine released");
    }
}

/// Distinct media kinds carried by local senders and receivers that have a track.
async fn local_media_lines(engine: &dyn ConnectionEngine) -> usize {
    let mut kinds = BTreeSet::new();
    for t in engine.senders().await.into_iter().chain(engine.receivers().await) {
        if t.has_track {
            kinds.insert(t.kind);
        }
    }
    kinds.len()
}
