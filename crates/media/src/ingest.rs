// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RTP ingest: depacketizes remote tracks and frames them for the encoder.
//!
//! VP8/VP9 frames are wrapped in IVF, H264 NAL units go out as an Annex-B
//! byte stream (the depacketizer emits `00 00 00 01` start codes), and Opus
//! packets are paged into an OGG stream at 48 kHz stereo. The container
//! framing is done here because the encoder reads from pipes, which cannot
//! seek; byte buffers stream straight into the pipe writer.
//!
//! When both tracks feed named pipes, the worker holds the two writer tasks
//! at a barrier and releases them together just before they open their FIFOs,
//! so the encoder sees coherent wall-clock PTS at open. The rendezvous lives
//! in the worker; these loops receive writers that are ready to go.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::rtp::codecs::h264::H264Packet;
use webrtc::rtp::codecs::vp8::Vp8Packet;
use webrtc::rtp::codecs::vp9::Vp9Packet;
use webrtc::rtp::packetizer::Depacketizer;
use webrtc::track::track_remote::TrackRemote;

// ── IVF framing ───────────────────────────────────────────────────────────

/// Stateless IVF byte framer; 90 kHz timebase matching RTP video clocks.
pub struct IvfFramer {
    fourcc: [u8; 4],
    width: u16,
    height: u16,
    first_ts: Option<u32>,
}

impl IvfFramer {
    pub fn new(mime_type: &str, width: u16, height: u16) -> Self {
        let fourcc = if mime_type.eq_ignore_ascii_case("video/vp9") { *b"VP90" } else { *b"VP80" };
        Self { fourcc, width, height, first_ts: None }
    }

    /// The 32-byte stream header, written once before any frame.
    pub fn header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(32);
        out.extend_from_slice(b"DKIF");
        out.extend_from_slice(&0u16.to_le_bytes()); // version
        out.extend_from_slice(&32u16.to_le_bytes()); // header length
        out.extend_from_slice(&self.fourcc);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&90000u32.to_le_bytes()); // timebase denominator
        out.extend_from_slice(&1u32.to_le_bytes()); // timebase numerator
        out.extend_from_slice(&0u32.to_le_bytes()); // frame count (unknown)
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out
    }

    /// One frame: 12-byte header + payload, timestamped relative to the
    /// first frame in RTP clock units.
    pub fn frame(&mut self, rtp_ts: u32, payload: &[u8]) -> Vec<u8> {
        let base = *self.first_ts.get_or_insert(rtp_ts);
        let pts = u64::from(rtp_ts.wrapping_sub(base));
        let mut out = Vec::with_capacity(12 + payload.len());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&pts.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }
}

// ── OGG Opus framing ──────────────────────────────────────────────────────

/// Samples per Opus packet at 48 kHz, derived from the TOC byte.
pub fn opus_packet_samples(payload: &[u8]) -> u64 {
    let Some(&toc) = payload.first() else { return 0 };
    let config = toc >> 3;
    // Frame duration by configuration: SILK 10/20/40/60 ms, hybrid 10/20 ms,
    // CELT 2.5/5/10/20 ms.
    let frame_samples: u64 = match config {
        0..=11 => [480, 960, 1920, 2880][usize::from(config % 4)],
        12..=15 => [480, 960][usize::from(config % 2)],
        _ => [120, 240, 480, 960][usize::from(config % 4)],
    };
    let frames: u64 = match toc & 0b11 {
        0 => 1,
        1 | 2 => 2,
        _ => payload.get(1).map(|&b| u64::from(b & 0x3F)).unwrap_or(0),
    };
    frame_samples * frames
}

/// Pages Opus packets into an OGG stream (one packet per page).
pub struct OggOpusFramer {
    serial: u32,
    page_seq: u32,
    granule: u64,
}

impl OggOpusFramer {
    pub fn new(serial: u32) -> Self {
        Self { serial, page_seq: 0, granule: 0 }
    }

    /// The two header pages: `OpusHead` (BOS) and `OpusTags`.
    pub fn headers(&mut self) -> Vec<u8> {
        let mut head = Vec::with_capacity(19);
        head.extend_from_slice(b"OpusHead");
        head.push(1); // version
        head.push(2); // channel count
        head.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
        head.extend_from_slice(&48000u32.to_le_bytes());
        head.extend_from_slice(&0i16.to_le_bytes()); // output gain
        head.push(0); // channel mapping family

        let vendor = b"skein";
        let mut tags = Vec::with_capacity(8 + 4 + vendor.len() + 4);
        tags.extend_from_slice(b"OpusTags");
        tags.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        tags.extend_from_slice(vendor);
        tags.extend_from_slice(&0u32.to_le_bytes()); // comment count

        let mut out = self.page(&head, 0x02, 0);
        out.extend_from_slice(&self.page(&tags, 0x00, 0));
        out
    }

    /// Page one Opus packet; the granule advances by its sample count.
    pub fn packet(&mut self, payload: &[u8]) -> Vec<u8> {
        self.granule += opus_packet_samples(payload);
        self.page(payload, 0x00, self.granule)
    }

    fn page(&mut self, packet: &[u8], header_type: u8, granule: u64) -> Vec<u8> {
        // Lacing: 255-byte runs with a sub-255 terminator (0 when the length
        // is an exact multiple).
        let full = packet.len() / 255;
        let rem = (packet.len() % 255) as u8;
        let seg_count = full + 1;

        let mut out = Vec::with_capacity(27 + seg_count + packet.len());
        out.extend_from_slice(b"OggS");
        out.push(0); // stream structure version
        out.push(header_type);
        out.extend_from_slice(&granule.to_le_bytes());
        out.extend_from_slice(&self.serial.to_le_bytes());
        out.extend_from_slice(&self.page_seq.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // crc placeholder
        out.push(seg_count as u8);
        out.extend(std::iter::repeat_n(255u8, full));
        out.push(rem);
        out.extend_from_slice(packet);

        let crc = ogg_crc(&out);
        out[22..26].copy_from_slice(&crc.to_le_bytes());
        self.page_seq += 1;
        out
    }
}

/// OGG page checksum: CRC-32, polynomial 0x04C11DB7, no reflection, zero
/// initial value and final XOR.
fn ogg_crc(data: &[u8]) -> u32 {
    static TABLE: std::sync::OnceLock<[u32; 256]> = std::sync::OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = (i as u32) << 24;
            for _ in 0..8 {
                crc = if crc & 0x8000_0000 != 0 { (crc << 1) ^ 0x04C1_1DB7 } else { crc << 1 };
            }
            *entry = crc;
        }
        table
    });
    data.iter().fold(0u32, |crc, &b| (crc << 8) ^ table[usize::from((crc >> 24) as u8 ^ b)])
}

// ── Track ingest loops ────────────────────────────────────────────────────

enum VideoDepacketizer {
    Vp8(Vp8Packet),
    Vp9(Vp9Packet),
    H264(H264Packet),
}

impl VideoDepacketizer {
    fn for_mime(mime_type: &str) -> Self {
        let lower = mime_type.to_ascii_lowercase();
        if lower == "video/vp9" {
            Self::Vp9(Vp9Packet::default())
        } else if lower == "video/h264" {
            Self::H264(H264Packet::default())
        } else {
            Self::Vp8(Vp8Packet::default())
        }
    }

    fn depacketize(&mut self, payload: &bytes::Bytes) -> Option<bytes::Bytes> {
        let result = match self {
            Self::Vp8(d) => d.depacketize(payload),
            Self::Vp9(d) => d.depacketize(payload),
            Self::H264(d) => d.depacketize(payload),
        };
        result.ok().filter(|b| !b.is_empty())
    }

    fn is_annex_b(&self) -> bool {
        matches!(self, Self::H264(_))
    }
}

/// Read a remote video track and stream encoder input until the track ends
/// or `cancel` fires.
pub async fn run_video_ingest<W>(
    track: Arc<TrackRemote>,
    mime_type: String,
    width: u16,
    height: u16,
    mut out: W,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut depacketizer = VideoDepacketizer::for_mime(&mime_type);
    let mut framer = IvfFramer::new(&mime_type, width, height);
    if !depacketizer.is_annex_b() {
        out.write_all(&framer.header()).await?;
    }

    // Frame assembly: packets of one frame share a timestamp; the marker bit
    // closes the frame.
    let mut frame: Vec<u8> = Vec::new();
    let mut frame_ts: u32 = 0;

    loop {
        let (packet, _) = tokio::select! {
            _ = cancel.cancelled() => break,
            read = track.read_rtp() => match read {
                Ok(r) => r,
                Err(e) => {
                    debug!(err = %e, "video track ended");
                    break;
                }
            },
        };

        let Some(chunk) = depacketizer.depacketize(&packet.payload) else { continue };

        if depacketizer.is_annex_b() {
            out.write_all(&chunk).await?;
            continue;
        }

        if frame.is_empty() {
            frame_ts = packet.header.timestamp;
        }
        frame.extend_from_slice(&chunk);
        if packet.header.marker {
            out.write_all(&framer.frame(frame_ts, &frame)).await?;
            frame.clear();
        }
    }

    out.flush().await?;
    Ok(())
}

/// Read a remote Opus track and stream OGG pages until the track ends or
/// `cancel` fires.
pub async fn run_audio_ingest<W>(
    track: Arc<TrackRemote>,
    mut out: W,
    cancel: CancellationToken,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut framer = OggOpusFramer::new(track.ssrc());
    out.write_all(&framer.headers()).await?;

    loop {
        let (packet, _) = tokio::select! {
            _ = cancel.cancelled() => break,
            read = track.read_rtp() => match read {
                Ok(r) => r,
                Err(e) => {
                    debug!(err = %e, "audio track ended");
                    break;
                }
            },
        };
        if packet.payload.is_empty() {
            continue;
        }
        if let Err(e) = out.write_all(&framer.packet(&packet.payload)).await {
            warn!(err = %e, "audio pipe write failed");
            return Err(e.into());
        }
    }

    out.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
