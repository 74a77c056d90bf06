/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Splices gathered candidates into a local description so the remote side never
//! needs trickled candidates.
//!
//! Only the fixed two-section layout is supported: one `m=audio` section followed by
//! one `m=video` section. Candidates of section 0 go at the end of the audio section
//! (right before `m=video`), candidates of section 1 at the end of the description.

use crate::candidates::CandidateBuckets;

const AUDIO_MARKER: &str = "m=audio";
const VIDEO_MARKER: &str = "m=video";

pub const AUDIO_SECTION: usize = 0;
pub const VIDEO_SECTION: usize = 1;

/// Returns `None` when a section marker is missing, out of order, or there are no
/// audio candidates. Callers treat `None` as a failed negotiation.
pub fn merge_candidates(sdp: &str, buckets: &CandidateBuckets) -> Option<String> {
    let audio = find_section(sdp, AUDIO_MARKER, 0)?;
    let video = find_section(sdp, VIDEO_MARKER, audio)?;
    let audio_candidates = buckets.get(AUDIO_SECTION)?;
    let eol = line_terminator(sdp);

    let mut out = String::with_capacity(sdp.len() + 128 * buckets.len());
    out.push_str(&sdp[..audio]);
    out.push_str(&sdp[audio..video]);
    push_candidates(&mut out, audio_candidates, eol);

    out.push_str(&sdp[video..]);
    if let Some(video_candidates) = buckets.get(VIDEO_SECTION) {
        if !out.ends_with('\n') && !video_candidates.is_empty() {
            out.push_str(eol);
        }
        push_candidates(&mut out, video_candidates, eol);
    }
    Some(out)
}

fn push_candidates(out: &mut String, candidates: &[String], eol: &str) {
    for c in candidates {
        out.push_str("a=");
        out.push_str(c);
        out.push_str(eol);
    }
}

/// Byte offset of the first line starting with `marker`, searching from `from`.
fn find_section(sdp: &str, marker: &str, from: usize) -> Option<usize> {
    let mut pos = from;
    while let Some(rel) = sdp[pos..].find(marker) {
        let at = pos + rel;
        if at == 0 || sdp.as_bytes()[at - 1] == b'\n' {
            return Some(at);
        }
        pos = at + marker.len();
    }
    None
}

fn line_terminator(sdp: &str) -> &'static str {
    if sdp.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=rtpmap:96 VP8/90000\r\n";

    const AUDIO_CAND: &str = "candidate:1 1 UDP 2122260223 10.0.0.2 54321 typ host";
    const VIDEO_CAND: &str = "candidate:2 1 UDP 2122260223 10.0.0.2 54322 typ host";

    fn buckets() -> CandidateBuckets {
        let mut b = CandidateBuckets::default();
        b.push(AUDIO_SECTION, AUDIO_CAND.to_string());
        b.push(VIDEO_SECTION, VIDEO_CAND.to_string());
        b
    }

    #[test]
    fn audio_candidates_land_right_before_video_section() {
        let merged = merge_candidates(OFFER, &buckets()).unwrap();
        let expected_audio = format!("a={AUDIO_CAND}\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
        assert!(merged.contains(&expected_audio), "{merged}");
        assert!(merged.ends_with(&format!("a=rtpmap:96 VP8/90000\r\na={VIDEO_CAND}\r\n")));
        assert!(merged.starts_with("v=0\r\n"));
        assert_eq!(merged.len(), OFFER.len() + AUDIO_CAND.len() + VIDEO_CAND.len() + 8);
    }

    #[test]
    fn merge_is_deterministic() {
        let b = buckets();
        assert_eq!(merge_candidates(OFFER, &b), merge_candidates(OFFER, &b));
    }

    #[test]
    fn candidates_keep_discovery_order_within_section() {
        let mut b = CandidateBuckets::default();
        b.push(AUDIO_SECTION, "candidate:3 1 UDP 3 10.0.0.3 3 typ host".to_string());
        b.push(AUDIO_SECTION, "candidate:1 1 UDP 1 10.0.0.1 1 typ host".to_string());
        let merged = merge_candidates(OFFER, &b).unwrap();
        let first = merged.find("candidate:3").unwrap();
        let second = merged.find("candidate:1").unwrap();
        assert!(first < second);
    }

    #[test]
    fn missing_video_section_fails() {
        let audio_only = &OFFER[..OFFER.find("m=video").unwrap()];
        assert_eq!(merge_candidates(audio_only, &buckets()), None);
    }

    #[test]
    fn missing_audio_section_fails() {
        let video_only = OFFER.replace("m=audio", "m=application");
        assert_eq!(merge_candidates(&video_only, &buckets()), None);
    }

    #[test]
    fn missing_audio_bucket_fails() {
        let mut b = CandidateBuckets::default();
        b.push(VIDEO_SECTION, VIDEO_CAND.to_string());
        assert_eq!(merge_candidates(OFFER, &b), None);
    }

    #[test]
    fn missing_video_bucket_still_merges() {
        let mut b = CandidateBuckets::default();
        b.push(AUDIO_SECTION, AUDIO_CAND.to_string());
        let merged = merge_candidates(OFFER, &b).unwrap();
        assert!(merged.ends_with("a=rtpmap:96 VP8/90000\r\n"));
        assert!(merged.contains(AUDIO_CAND));
    }

    #[test]
    fn video_before_audio_fails() {
        let swapped = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=mid:0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:1\r\n";
        assert_eq!(merge_candidates(swapped, &buckets()), None);
    }

    #[test]
    fn lf_descriptions_get_lf_candidate_lines() {
        let lf = OFFER.replace("\r\n", "\n");
        let merged = merge_candidates(&lf, &buckets()).unwrap();
        assert!(merged.contains(&format!("a={AUDIO_CAND}\nm=video")));
        assert!(!merged.contains('\r'));
    }

    #[test]
    fn marker_inside_attribute_is_not_a_section() {
        let tricky = OFFER.replace("a=mid:0\r\n", "a=x-note:m=video later\r\na=mid:0\r\n");
        let merged = merge_candidates(&tricky, &buckets()).unwrap();
        assert!(merged.contains(&format!("a={AUDIO_CAND}\r\nm=video 9")));
    }
}
