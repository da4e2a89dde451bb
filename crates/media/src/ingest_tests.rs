// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{opus_packet_samples, IvfFramer, OggOpusFramer};

#[test]
fn ivf_header_layout() {
    let framer = IvfFramer::new("video/VP8", 1280, 720);
    let header = framer.header();
    assert_eq!(header.len(), 32);
    assert_eq!(&header[0..4], b"DKIF");
    assert_eq!(&header[8..12], b"VP80");
    assert_eq!(u16::from_le_bytes([header[12], header[13]]), 1280);
    assert_eq!(u16::from_le_bytes([header[14], header[15]]), 720);
    assert_eq!(u32::from_le_bytes([header[16], header[17], header[18], header[19]]), 90000);

    let vp9 = IvfFramer::new("video/VP9", 640, 360).header();
    assert_eq!(&vp9[8..12], b"VP90");
}

#[test]
fn ivf_frame_pts_is_relative_to_first_frame() {
    let mut framer = IvfFramer::new("video/VP8", 640, 360);
    let first = framer.frame(90000, b"abc");
    assert_eq!(u32::from_le_bytes([first[0], first[1], first[2], first[3]]), 3);
    let pts0 = u64::from_le_bytes([
        first[4], first[5], first[6], first[7], first[8], first[9], first[10], first[11],
    ]);
    assert_eq!(pts0, 0);
    assert_eq!(&first[12..], b"abc");

    let second = framer.frame(93000, b"defg");
    let pts1 = u64::from_le_bytes([
        second[4], second[5], second[6], second[7], second[8], second[9], second[10], second[11],
    ]);
    assert_eq!(pts1, 3000);
}

#[test]
fn opus_sample_counts_from_toc() {
    // Config 1 (SILK 20 ms), code 0: one frame of 960 samples.
    assert_eq!(opus_packet_samples(&[0b0000_1000, 0xAA]), 960);
    // Code 1: two equal frames.
    assert_eq!(opus_packet_samples(&[0b0000_1001, 0xAA]), 1920);
    // Config 31 (CELT 20 ms), code 3 with 3 frames.
    assert_eq!(opus_packet_samples(&[0b1111_1011, 3]), 2880);
    assert_eq!(opus_packet_samples(&[]), 0);
}

#[test]
fn ogg_headers_form_two_pages() {
    let mut framer = OggOpusFramer::new(0x1234_5678);
    let headers = framer.headers();
    assert_eq!(&headers[0..4], b"OggS");
    assert_eq!(headers[5], 0x02, "first page carries BOS");

    // The second page begins right after the first: 27 + 1 lacing + 19 body.
    let second = 27 + 1 + 19;
    assert_eq!(&headers[second..second + 4], b"OggS");
    assert_eq!(headers[second + 5], 0x00);
    assert_eq!(&headers[second + 28..second + 36], b"OpusTags");
}

#[test]
fn ogg_granule_advances_per_packet() {
    let mut framer = OggOpusFramer::new(1);
    let _ = framer.headers();

    // 20 ms SILK packet: granule should land at 960 after the first page.
    let page = framer.packet(&[0b0000_1000, 0, 0, 0]);
    let granule = u64::from_le_bytes([
        page[6], page[7], page[8], page[9], page[10], page[11], page[12], page[13],
    ]);
    assert_eq!(granule, 960);

    let page = framer.packet(&[0b0000_1000, 0, 0, 0]);
    let granule = u64::from_le_bytes([
        page[6], page[7], page[8], page[9], page[10], page[11], page[12], page[13],
    ]);
    assert_eq!(granule, 1920);
}

#[test]
fn ogg_lacing_handles_exact_multiples_of_255() {
    let mut framer = OggOpusFramer::new(1);
    let payload = vec![0b0000_1000; 255];
    let page = framer.packet(&payload);
    let seg_count = page[26];
    assert_eq!(seg_count, 2, "255-byte packet needs a zero terminator segment");
    assert_eq!(page[27], 255);
    assert_eq!(page[28], 0);
    assert_eq!(page.len(), 27 + 2 + 255);
}

#[test]
fn ogg_crc_is_set_and_payload_sensitive() {
    let mut a = OggOpusFramer::new(1);
    let mut b = OggOpusFramer::new(1);
    let page_a = a.packet(&[0b0000_1000, 1, 2, 3]);
    let page_b = b.packet(&[0b0000_1000, 1, 2, 4]);

    let crc_a = u32::from_le_bytes([page_a[22], page_a[23], page_a[24], page_a[25]]);
    let crc_b = u32::from_le_bytes([page_b[22], page_b[23], page_b[24], page_b[25]]);
    assert_ne!(crc_a, 0);
    assert_ne!(crc_a, crc_b);
}
