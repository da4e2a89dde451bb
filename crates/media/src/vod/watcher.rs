// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Segment watcher: discovers completed `.ts` segments in a session's HLS
//! output directory.
//!
//! Uses `notify` filesystem events with a 500 ms polling backstop. Segment
//! names and durations come from the encoder's live `stream.m3u8`; a segment
//! counts as complete only once its file size is stable across a short
//! recheck, since the encoder appends to the newest segment in place.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use notify::Watcher;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling backstop when filesystem events are missed.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A segment's size must hold steady at least this long to count as done.
const STABLE_WINDOW: Duration = Duration::from_millis(50);

/// A completed segment discovered on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub index: u32,
    pub filename: String,
    pub duration: f64,
    pub path: PathBuf,
}

/// Parse `#EXTINF:<d>,` + trailing `*.ts` pairs out of a live playlist.
pub fn parse_playlist(text: &str) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    let mut pending: Option<f64> = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("#EXTINF:") {
            pending = rest.trim_end_matches(',').parse::<f64>().ok();
        } else if line.ends_with(".ts") && !line.starts_with('#') {
            if let Some(duration) = pending.take() {
                out.push((line.to_owned(), duration));
            }
        }
    }
    out
}

/// Extract the numeric index from `segment_NNN.ts`.
pub fn segment_index(filename: &str) -> Option<u32> {
    let digits = filename.strip_prefix("segment_")?.strip_suffix(".ts")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Watches one session directory until cancelled.
pub struct SegmentWatcher {
    dir: PathBuf,
}

impl SegmentWatcher {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Run the watch loop, sending each completed segment exactly once.
    pub async fn run(self, segment_tx: mpsc::Sender<SegmentInfo>, cancel: CancellationToken) {
        // notify only wakes the scan; the scan itself re-reads the playlist.
        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher = self.setup_notify(wake_tx);

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut seen: HashSet<String> = HashSet::new();
        let mut sizes: HashMap<String, (u64, Instant)> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll.tick() => {}
                _ = wake_rx.recv() => {}
            }

            for info in self.scan(&mut seen, &mut sizes).await {
                if segment_tx.send(info).await.is_err() {
                    return;
                }
            }
        }
    }

    fn setup_notify(&self, wake_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                let _ = wake_tx.try_send(());
            }
        })
        .ok()?;
        if let Err(e) = watcher.watch(&self.dir, notify::RecursiveMode::NonRecursive) {
            warn!(dir = %self.dir.display(), err = %e, "segment watch failed, polling only");
            return None;
        }
        Some(watcher)
    }

    /// One pass: parse the playlist, then report every new size-stable segment.
    async fn scan(
        &self,
        seen: &mut HashSet<String>,
        sizes: &mut HashMap<String, (u64, Instant)>,
    ) -> Vec<SegmentInfo> {
        let playlist = match tokio::fs::read_to_string(self.dir.join("stream.m3u8")).await {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };

        let mut completed = Vec::new();
        for (filename, duration) in parse_playlist(&playlist) {
            if seen.contains(&filename) {
                continue;
            }
            let Some(index) = segment_index(&filename) else {
                debug!(filename, "ignoring non-segment playlist entry");
                continue;
            };
            let path = self.dir.join(&filename);
            let Ok(meta) = tokio::fs::metadata(&path).await else { continue };
            let size = meta.len();

            match sizes.get(&filename) {
                Some((prev, at)) if *prev == size && at.elapsed() >= STABLE_WINDOW => {
                    seen.insert(filename.clone());
                    sizes.remove(&filename);
                    completed.push(SegmentInfo { index, filename, duration, path });
                }
                Some((prev, _)) if *prev == size => {}
                _ => {
                    sizes.insert(filename, (size, Instant::now()));
                }
            }
        }
        completed
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
