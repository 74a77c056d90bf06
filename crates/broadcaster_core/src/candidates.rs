/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::signal::Promise;

/// Discovery origin of a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relayed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Media-section index (`sdpMLineIndex`).
    pub section: usize,
    /// Attribute value, e.g. `candidate:1 1 UDP 2122260223 10.0.0.2 54321 typ host`.
    pub text: String,
    pub kind: CandidateKind,
}

impl Candidate {
    /// Accepts either the bare attribute value or a full `a=...` line.
    pub fn new(section: usize, text: &str, kind: CandidateKind) -> Self {
        let text = text.trim_end_matches(['\r', '\n']);
        let text = text.strip_prefix("a=").unwrap_or(text);
        Self {
            section,
            text: text.to_string(),
            kind,
        }
    }
}

/// Candidate attribute values grouped by media-section index, in discovery order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateBuckets {
    sections: BTreeMap<usize, Vec<String>>,
}

impl CandidateBuckets {
    pub fn push(&mut self, section: usize, text: String) {
        self.sections.entry(section).or_default().push(text);
    }

    pub fn get(&self, section: usize) -> Option<&[String]> {
        self.sections.get(&section).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.sections.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryState {
    Idle,
    Discovering { reflexive_seen: usize },
    CompletedByHeuristic,
    CompletedByAuthority,
}

impl DiscoveryState {
    pub fn is_completed(self) -> bool {
        matches!(self, DiscoveryState::CompletedByHeuristic | DiscoveryState::CompletedByAuthority)
    }
}

/// Collects candidates for one discovery cycle and decides when discovery is done enough.
///
/// Early completion fires once at least one server-reflexive candidate per published
/// media line has been seen. The engine's own "gathering complete" event is the
/// fallback; whichever comes first wins and the other is ignored.
pub struct CandidateAggregator {
    buckets: CandidateBuckets,
    state: DiscoveryState,
    media_lines: usize,
    completion: Option<Promise<CandidateBuckets>>,
}

impl Default for CandidateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateAggregator {
    pub fn new() -> Self {
        Self {
            buckets: CandidateBuckets::default(),
            state: DiscoveryState::Idle,
            media_lines: 0,
            completion: None,
        }
    }

    /// Starts a new cycle waiting on `completion`, with `media_lines` as the early-exit threshold.
    pub fn arm(&mut self, media_lines: usize, completion: Promise<CandidateBuckets>) {
        self.media_lines = media_lines;
        self.completion = Some(completion);
        self.buckets.clear();
        self.state = DiscoveryState::Discovering { reflexive_seen: 0 };
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    pub fn buckets(&self) -> &CandidateBuckets {
        &self.buckets
    }

    pub fn on_discovery_started(&mut self) {
        debug!(media_lines = self.media_lines, "candidate discovery started");
        self.buckets.clear();
        self.state = DiscoveryState::Discovering { reflexive_seen: 0 };
    }

    /// Returns true if this candidate completed the cycle.
    pub fn on_candidate(&mut self, candidate: &Candidate) -> bool {
        self.buckets.push(candidate.section, candidate.text.clone());

        let DiscoveryState::Discovering { reflexive_seen } = self.state else {
            return false;
        };
        if candidate.kind != CandidateKind::ServerReflexive {
            return false;
        }
        let reflexive_seen = reflexive_seen + 1;
        info!(reflexive_seen, media_lines = self.media_lines, "server-reflexive candidate");
        if reflexive_seen < self.media_lines {
            self.state = DiscoveryState::Discovering { reflexive_seen };
            return false;
        }
        self.state = DiscoveryState::CompletedByHeuristic;
        self.fire(self.buckets.clone());
        true
    }

    /// Returns true if the authoritative event completed the cycle (heuristic had not fired yet).
    pub fn on_discovery_complete(&mut self) -> bool {
        let fired = !self.state.is_completed();
        if fired {
            self.state = DiscoveryState::CompletedByAuthority;
            let snapshot = std::mem::take(&mut self.buckets);
            self.fire(snapshot);
        }
        self.buckets.clear();
        fired
    }

    fn fire(&mut self, snapshot: CandidateBuckets) {
        let Some(completion) = self.completion.take() else {
            debug!(state = ?self.state, "discovery completed with nobody waiting");
            return;
        };
        info!(state = ?self.state, candidates = snapshot.len(), "candidate discovery completed");
        if !completion.fulfill(snapshot) {
            debug!("completion waiter already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal;

    fn host(section: usize, n: u32) -> Candidate {
        Candidate::new(section, &format!("candidate:{n} 1 UDP 2122260223 10.0.0.2 5432{n} typ host"), CandidateKind::Host)
    }

    fn srflx(section: usize, n: u32) -> Candidate {
        Candidate::new(
            section,
            &format!("candidate:{n} 1 UDP 1686052607 203.0.113.7 6000{n} typ srflx raddr 10.0.0.2 rport 5432{n}"),
            CandidateKind::ServerReflexive,
        )
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
    }

    #[test]
    fn candidate_strips_attribute_prefix_and_terminator() {
        let c = Candidate::new(0, "a=candidate:1 1 UDP 1 10.0.0.2 1 typ host\r\n", CandidateKind::Host);
        assert_eq!(c.text, "candidate:1 1 UDP 1 10.0.0.2 1 typ host");
    }

    #[test]
    fn heuristic_fires_on_nth_reflexive_candidate() {
        let (promise, waiter) = signal::channel();
        let mut agg = CandidateAggregator::new();
        agg.arm(2, promise);
        agg.on_discovery_started();

        assert!(!agg.on_candidate(&host(0, 1)));
        assert!(!agg.on_candidate(&srflx(0, 2)));
        assert!(!agg.on_candidate(&host(1, 3)));
        assert!(agg.on_candidate(&srflx(1, 4)));
        assert_eq!(agg.state(), DiscoveryState::CompletedByHeuristic);

        // later candidates and the authoritative event are no-ops for the signal
        assert!(!agg.on_candidate(&srflx(1, 5)));
        assert!(!agg.on_discovery_complete());

        let buckets = block_on(waiter).unwrap();
        assert_eq!(buckets.get(0).unwrap().len(), 2);
        assert_eq!(buckets.get(1).unwrap().len(), 2);
        assert_eq!(buckets.len(), 4);
    }

    #[test]
    fn authoritative_completion_is_the_fallback() {
        let (promise, waiter) = signal::channel();
        let mut agg = CandidateAggregator::new();
        agg.arm(2, promise);
        agg.on_discovery_started();
        agg.on_candidate(&host(0, 1));
        agg.on_candidate(&host(1, 2));
        agg.on_candidate(&srflx(0, 3));

        assert!(agg.on_discovery_complete());
        assert_eq!(agg.state(), DiscoveryState::CompletedByAuthority);
        assert!(agg.buckets().is_empty());

        let buckets = block_on(waiter).unwrap();
        assert_eq!(buckets.get(0).unwrap()[0], host(0, 1).text);
        assert_eq!(buckets.get(0).unwrap()[1], srflx(0, 3).text);
        assert_eq!(buckets.get(1).unwrap(), &[host(1, 2).text][..]);
    }

    #[test]
    fn zero_media_lines_completes_on_first_reflexive() {
        let (promise, waiter) = signal::channel();
        let mut agg = CandidateAggregator::new();
        agg.arm(0, promise);
        agg.on_discovery_started();
        assert!(!agg.on_candidate(&host(0, 1)));
        assert!(agg.on_candidate(&srflx(0, 2)));
        assert!(block_on(waiter).is_ok());
    }

    #[test]
    fn zero_media_lines_without_reflexive_waits_for_authority() {
        let (promise, waiter) = signal::channel();
        let mut agg = CandidateAggregator::new();
        agg.arm(0, promise);
        agg.on_discovery_started();
        agg.on_candidate(&host(0, 1));
        assert!(!agg.state().is_completed());
        assert!(agg.on_discovery_complete());
        assert_eq!(block_on(waiter).unwrap().len(), 1);
    }

    #[test]
    fn discovery_start_clears_previous_buckets() {
        let (promise, _waiter) = signal::channel();
        let mut agg = CandidateAggregator::new();
        agg.arm(1, promise);
        agg.on_candidate(&host(0, 1));
        agg.on_discovery_started();
        assert!(agg.buckets().is_empty());
        assert_eq!(agg.state(), DiscoveryState::Discovering { reflexive_seen: 0 });
    }

    #[test]
    fn unarmed_aggregator_completes_without_signal() {
        let mut agg = CandidateAggregator::new();
        agg.on_discovery_started();
        agg.on_candidate(&srflx(0, 1));
        assert_eq!(agg.state(), DiscoveryState::CompletedByHeuristic);
        assert!(!agg.on_discovery_complete());
    }

    #[test]
    fn completion_fires_exactly_once_for_any_sequence() {
        let sequences: Vec<Vec<Candidate>> = vec![
            vec![],
            vec![host(0, 1), host(1, 2)],
            vec![srflx(0, 1), srflx(1, 2), srflx(0, 3)],
            vec![host(0, 1), srflx(0, 2), host(1, 3), srflx(1, 4), srflx(1, 5)],
        ];
        for seq in sequences {
            let (promise, waiter) = signal::channel();
            let mut agg = CandidateAggregator::new();
            agg.arm(2, promise);
            agg.on_discovery_started();
            let mut fired = 0;
            for c in &seq {
                if agg.on_candidate(c) {
                    fired += 1;
                }
            }
            if agg.on_discovery_complete() {
                fired += 1;
            }
            assert_eq!(fired, 1, "sequence of {} candidates", seq.len());
            assert!(block_on(waiter).is_ok());
        }
    }
}
