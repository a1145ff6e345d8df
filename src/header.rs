//! JPEG marker scanning for DCT passthrough.
//!
//! The image crate reports CMYK JPEGs as RGB after conversion, so the frame
//! header is read directly to learn the real component count.

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum HeaderError {
    #[error("Not a JPEG file")]
    NotJpeg,
    #[error("Invalid JPEG marker at offset {0}")]
    InvalidMarker(usize),
    #[error("Truncated {0} segment")]
    Truncated(&'static str),
    #[error("No frame header before scan data")]
    NoFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegHeader {
    pub width: u32,
    pub height: u32,
    pub components: u8,
    /// color transform flag of an Adobe APP14 segment
    pub adobe_transform: Option<u8>,
    /// ICC profile reassembled from APP2 chunks
    pub icc_profile: Option<Vec<u8>>,
}

impl JpegHeader {
    /// CMYK data written inverted (Adobe YCCK, or no Adobe segment at all)
    pub fn inverted_cmyk(&self) -> bool {
        self.components == 4 && self.adobe_transform != Some(0)
    }
}

const SOI: u8 = 0xD8;
const SOS: u8 = 0xDA;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const ICC_TAG: &[u8] = b"ICC_PROFILE\0";

/// join APP2 chunks by sequence number; `None` if any chunk is missing
fn assemble_icc(mut chunks: Vec<(u8, &[u8])>) -> Option<Vec<u8>> {
    if chunks.is_empty() {
        return None;
    }
    chunks.sort_by_key(|(seq, _)| *seq);
    let complete = chunks.iter().enumerate().all(|(i, (seq, _))| *seq as usize == i + 1);
    complete.then(|| chunks.iter().flat_map(|(_, data)| data.iter().copied()).collect())
}

pub fn parse_jpeg_header(data: &[u8]) -> Result<JpegHeader, HeaderError> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(HeaderError::NotJpeg);
    }
    let mut adobe_transform = None;
    let mut icc_chunks = Vec::new();
    let mut pos = 2;
    while pos + 4 < data.len() {
        if data[pos] != 0xFF {
            return Err(HeaderError::InvalidMarker(pos));
        }
        let marker = data[pos + 1];
        // fill bytes
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        // standalone markers carry no length
        if marker == 0x00 || (0xD0..=0xD9).contains(&marker) {
            pos += 2;
            continue;
        }
        if marker == SOS {
            break;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let end = pos + 2 + len;

        // SOF0-3, SOF5-7, SOF9-11, SOF13-15 (0xC4 DHT, 0xC8 JPG, 0xCC DAC are not frames)
        if matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF) {
            if end > data.len() || len < 8 {
                return Err(HeaderError::Truncated("frame"));
            }
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Ok(JpegHeader {
                width,
                height,
                components: data[pos + 9],
                adobe_transform,
                icc_profile: assemble_icc(icc_chunks),
            });
        }

        if marker == APP2 && len >= 2 + ICC_TAG.len() + 2 {
            if end > data.len() {
                return Err(HeaderError::Truncated("APP2"));
            }
            let body = &data[pos + 4..end];
            if body.starts_with(ICC_TAG) {
                let seq = body[ICC_TAG.len()];
                icc_chunks.push((seq, &body[ICC_TAG.len() + 2..]));
            }
        }

        if marker == APP14 && len >= 14 {
            if end > data.len() {
                return Err(HeaderError::Truncated("APP14"));
            }
            if &data[pos + 4..pos + 9] == b"Adobe" {
                adobe_transform = Some(data[pos + 15]);
            }
        }
        pos = end;
    }
    Err(HeaderError::NoFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_frame(buf: &mut Vec<u8>, marker: u8, width: u16, height: u16, components: u8) {
        let len: u16 = 8 + 3 * components as u16;
        buf.extend_from_slice(&[0xFF, marker]);
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(8);
        buf.extend_from_slice(&height.to_be_bytes());
        buf.extend_from_slice(&width.to_be_bytes());
        buf.push(components);
        for id in 1..=components {
            buf.extend_from_slice(&[id, 0x11, 0]);
        }
    }

    fn push_adobe(buf: &mut Vec<u8>, transform: u8) {
        let mut payload = b"Adobe".to_vec();
        payload.extend_from_slice(&[0, 100, 0, 0, 0, 0, transform]);
        buf.extend_from_slice(&[0xFF, APP14]);
        buf.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        buf.extend_from_slice(&payload);
    }

    fn jpeg(frame_marker: u8, width: u16, height: u16, components: u8) -> Vec<u8> {
        let mut buf = vec![0xFF, SOI];
        push_frame(&mut buf, frame_marker, width, height, components);
        buf.extend_from_slice(&[0xFF, 0xD9]);
        buf
    }

    #[test]
    fn baseline_rgb() {
        let h = parse_jpeg_header(&jpeg(0xC0, 1200, 1800, 3)).unwrap();
        assert_eq!((h.width, h.height, h.components), (1200, 1800, 3));
        assert_eq!(h.adobe_transform, None);
        assert!(!h.inverted_cmyk());
    }

    #[test]
    fn progressive_gray() {
        let h = parse_jpeg_header(&jpeg(0xC2, 64, 32, 1)).unwrap();
        assert_eq!((h.width, h.height, h.components), (64, 32, 1));
    }

    #[test]
    fn skips_app_segments_and_fill_bytes() {
        let mut buf = vec![0xFF, SOI];
        buf.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        buf.extend_from_slice(&[0u8; 14]);
        buf.push(0xFF);
        push_frame(&mut buf, 0xC0, 640, 480, 3);
        let h = parse_jpeg_header(&buf).unwrap();
        assert_eq!((h.width, h.height), (640, 480));
    }

    #[test]
    fn adobe_transform_controls_cmyk_inversion() {
        let mut plain = vec![0xFF, SOI];
        push_adobe(&mut plain, 0);
        push_frame(&mut plain, 0xC0, 10, 10, 4);
        let h = parse_jpeg_header(&plain).unwrap();
        assert_eq!(h.adobe_transform, Some(0));
        assert!(!h.inverted_cmyk());

        let mut ycck = vec![0xFF, SOI];
        push_adobe(&mut ycck, 2);
        push_frame(&mut ycck, 0xC0, 10, 10, 4);
        assert!(parse_jpeg_header(&ycck).unwrap().inverted_cmyk());

        // no Adobe segment: treat CMYK as inverted
        assert!(parse_jpeg_header(&jpeg(0xC0, 10, 10, 4)).unwrap().inverted_cmyk());
    }

    fn push_icc(buf: &mut Vec<u8>, seq: u8, count: u8, chunk: &[u8]) {
        let mut payload = ICC_TAG.to_vec();
        payload.extend_from_slice(&[seq, count]);
        payload.extend_from_slice(chunk);
        buf.extend_from_slice(&[0xFF, APP2]);
        buf.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        buf.extend_from_slice(&payload);
    }

    #[test]
    fn icc_chunks_joined_in_sequence_order() {
        let mut buf = vec![0xFF, SOI];
        push_icc(&mut buf, 2, 2, b"tail");
        push_icc(&mut buf, 1, 2, b"head-");
        push_frame(&mut buf, 0xC0, 10, 10, 3);
        let h = parse_jpeg_header(&buf).unwrap();
        assert_eq!(h.icc_profile.as_deref(), Some(&b"head-tail"[..]));
    }

    #[test]
    fn incomplete_icc_is_ignored() {
        let mut buf = vec![0xFF, SOI];
        push_icc(&mut buf, 2, 2, b"tail");
        push_frame(&mut buf, 0xC0, 10, 10, 3);
        assert_eq!(parse_jpeg_header(&buf).unwrap().icc_profile, None);
        assert_eq!(parse_jpeg_header(&jpeg(0xC0, 10, 10, 3)).unwrap().icc_profile, None);
    }

    #[test]
    fn rejects_non_jpeg() {
        assert_eq!(parse_jpeg_header(&[0x89, b'P', b'N', b'G']), Err(HeaderError::NotJpeg));
        assert_eq!(parse_jpeg_header(&[0xFF]), Err(HeaderError::NotJpeg));
    }

    #[test]
    fn scan_without_frame() {
        let buf = vec![0xFF, SOI, 0xFF, SOS, 0x00, 0x08, 1, 2, 3, 4, 5, 6];
        assert_eq!(parse_jpeg_header(&buf), Err(HeaderError::NoFrame));
    }

    #[test]
    fn truncated_frame() {
        let mut buf = jpeg(0xC0, 10, 10, 3);
        buf.truncate(10);
        assert_eq!(parse_jpeg_header(&buf), Err(HeaderError::Truncated("frame")));
    }

    #[test]
    fn garbage_between_segments() {
        let buf = vec![0xFF, SOI, 0x12, 0x34, 0x56, 0x78, 0x9A];
        assert_eq!(parse_jpeg_header(&buf), Err(HeaderError::InvalidMarker(2)));
    }
}
