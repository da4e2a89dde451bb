// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HLS media playlist rendering for VOD sessions.

use serde::{Deserialize, Serialize};

/// One recorded segment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VodSegment {
    /// Monotonic index parsed from `segment_NNN.ts`.
    pub index: u32,
    pub filename: String,
    /// Duration in seconds, carried unrounded from the live playlist.
    pub duration: f64,
    pub uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_key: Option<String>,
}

/// Collects segments in order and renders the media playlist.
#[derive(Debug, Clone)]
pub struct PlaylistBuilder {
    target_duration: u32,
    segments: Vec<VodSegment>,
}

impl PlaylistBuilder {
    pub fn new(target_duration: u32) -> Self {
        Self { target_duration, segments: Vec::new() }
    }

    /// Append a segment; re-announcing a known index updates it in place.
    pub fn add_segment(&mut self, segment: VodSegment) {
        if let Some(existing) = self.segments.iter_mut().find(|s| s.index == segment.index) {
            *existing = segment;
            return;
        }
        self.segments.push(segment);
        self.segments.sort_by_key(|s| s.index);
    }

    pub fn mark_uploaded(&mut self, index: u32, remote_key: &str) {
        if let Some(segment) = self.segments.iter_mut().find(|s| s.index == index) {
            segment.uploaded = true;
            segment.remote_key = Some(remote_key.to_owned());
        }
    }

    pub fn segments(&self) -> &[VodSegment] {
        &self.segments
    }

    pub fn pending_uploads(&self) -> usize {
        self.segments.iter().filter(|s| !s.uploaded).count()
    }

    /// Render the playlist. `ENDLIST` appears only on the finalized variant.
    pub fn generate_m3u8(&self, finalized: bool) -> String {
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", self.target_duration));
        out.push_str("#EXT-X-MEDIA-SEQUENCE:0\n");
        for segment in &self.segments {
            out.push_str(&format!("#EXTINF:{:.3},\n", segment.duration));
            out.push_str(&segment.filename);
            out.push('\n');
        }
        if finalized {
            out.push_str("#EXT-X-ENDLIST\n");
        }
        out
    }
}

#[cfg(test)]
#[path = "playlist_tests.rs"]
mod tests;
