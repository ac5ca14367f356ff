//! Incremental frame decoder
//!
//! Turns a subscription byte stream back into [`UpdateFrame`]s. Bytes can
//! arrive in arbitrary chunks; a frame is only consumed once it is
//! complete.

use bytes::{Buf, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

use super::frame::{FramePayload, UpdateFrame, FRAME_TERMINATOR, PATCH_SEPARATOR};
use crate::patch::{OpType, PatchOp};
use crate::version::{ParseVersionError, Version};

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Malformed header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    InvalidVersion(#[from] ParseVersionError),

    #[error("Unknown patch operation: {0}")]
    UnknownOp(String),

    #[error("Invalid patch value: {0}")]
    InvalidValue(#[from] serde_json::Error),

    #[error("Expected separator after frame content")]
    MissingSeparator,
}

/// Buffered decoder for a subscription stream
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Bytes received but not yet consumed by a complete frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<UpdateFrame>, FrameError> {
        let mut cursor = Cursor::new(&self.buf);
        match parse_frame(&mut cursor)? {
            Some(frame) => {
                let consumed = cursor.pos;
                self.buf.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Header lines up to the next blank line, or `None` if incomplete
    fn header_block(&mut self) -> Result<Option<Vec<&'a str>>, FrameError> {
        let rest = self.rest();
        let Some(end) = rest.windows(HEADER_END.len()).position(|w| w == HEADER_END) else {
            return Ok(None);
        };
        let block = std::str::from_utf8(&rest[..end]).map_err(|e| {
            FrameError::InvalidHeader(format!("header block is not UTF-8: {}", e))
        })?;
        self.pos += end + HEADER_END.len();
        Ok(Some(block.split("\r\n").collect()))
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let rest = self.rest();
        if rest.len() < len {
            return None;
        }
        self.pos += len;
        Some(&rest[..len])
    }

    /// Consume `expected`; `Ok(None)` when more bytes are needed
    fn expect(&mut self, expected: &[u8]) -> Result<Option<()>, FrameError> {
        let rest = self.rest();
        let available = rest.len().min(expected.len());
        if rest[..available] != expected[..available] {
            return Err(FrameError::MissingSeparator);
        }
        if available < expected.len() {
            return Ok(None);
        }
        self.pos += expected.len();
        Ok(Some(()))
    }
}

#[derive(Default)]
struct Headers<'a> {
    version: Option<&'a str>,
    parents: Option<&'a str>,
    content_length: Option<&'a str>,
    content_range: Option<&'a str>,
    patches: Option<&'a str>,
}

impl<'a> Headers<'a> {
    fn parse(lines: &[&'a str]) -> Result<Self, FrameError> {
        let mut headers = Headers::default();
        for line in lines.iter().filter(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::InvalidHeader(line.to_string()))?;
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "version" => headers.version = Some(value),
                "parents" => headers.parents = Some(value),
                "content-length" => headers.content_length = Some(value),
                "content-range" => headers.content_range = Some(value),
                "patches" => headers.patches = Some(value),
                _ => {}
            }
        }
        Ok(headers)
    }

    fn content_length(&self) -> Result<usize, FrameError> {
        let raw = self
            .content_length
            .ok_or(FrameError::MissingHeader("Content-Length"))?;
        raw.parse()
            .map_err(|_| FrameError::InvalidHeader(format!("Content-Length: {}", raw)))
    }
}

fn parse_frame(cursor: &mut Cursor<'_>) -> Result<Option<UpdateFrame>, FrameError> {
    while cursor.rest().starts_with(b"\r\n") {
        cursor.pos += 2;
    }

    let Some(lines) = cursor.header_block()? else {
        return Ok(None);
    };
    let headers = Headers::parse(&lines)?;

    let version: Version = headers
        .version
        .ok_or(FrameError::MissingHeader("Version"))?
        .parse()?;
    let parents = headers
        .parents
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::parse)
        .collect::<Result<Vec<Version>, _>>()?;

    let payload = if let Some(count) = headers.patches {
        let count: usize = count
            .parse()
            .map_err(|_| FrameError::InvalidHeader(format!("Patches: {}", count)))?;
        let mut patches = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 && cursor.expect(PATCH_SEPARATOR)?.is_none() {
                return Ok(None);
            }
            let Some(lines) = cursor.header_block()? else {
                return Ok(None);
            };
            let Some(patch) = parse_patch(cursor, &Headers::parse(&lines)?)? else {
                return Ok(None);
            };
            patches.push(patch);
        }
        FramePayload::Patches(patches)
    } else if headers.content_range.is_some() {
        let Some(patch) = parse_patch(cursor, &headers)? else {
            return Ok(None);
        };
        FramePayload::Patches(vec![patch])
    } else {
        let Some(body) = cursor.take(headers.content_length()?) else {
            return Ok(None);
        };
        FramePayload::Body(Bytes::copy_from_slice(body))
    };

    if cursor.expect(FRAME_TERMINATOR)?.is_none() {
        return Ok(None);
    }

    Ok(Some(UpdateFrame {
        version,
        parents,
        payload,
    }))
}

fn parse_patch(cursor: &mut Cursor<'_>, headers: &Headers<'_>) -> Result<Option<PatchOp>, FrameError> {
    let range = headers
        .content_range
        .ok_or(FrameError::MissingHeader("Content-Range"))?;
    let (op, path) = range.split_once(' ').unwrap_or((range, ""));
    let op = OpType::parse(op).ok_or_else(|| FrameError::UnknownOp(op.to_string()))?;

    let Some(raw) = cursor.take(headers.content_length()?) else {
        return Ok(None);
    };
    let value: Value = serde_json::from_slice(raw)?;

    Ok(Some(PatchOp {
        op,
        path: path.to_string(),
        value: if op == OpType::Remove { None } else { Some(value) },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;
    use serde_json::json;

    #[test]
    fn test_decodes_full_and_patch_frames_in_sequence() {
        let full = UpdateFrame::full(Version::of(br#"{"a":1}"#), Bytes::from_static(br#"{"a":1}"#));
        let patch = UpdateFrame::patch(
            Version::of(br#"{"a":2,"b":[]}"#),
            Version::of(br#"{"a":1}"#),
            vec![PatchOp::replace("/a", json!(2)), PatchOp::add("/b", json!([]))],
        );

        let mut decoder = FrameDecoder::new();
        decoder.push(&encode(&full));
        decoder.push(&encode(&patch));

        assert_eq!(decoder.next_frame().unwrap(), Some(full));
        assert_eq!(decoder.next_frame().unwrap(), Some(patch));
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_waits_for_split_chunks() {
        let frame = UpdateFrame::patch(
            Version::from(2u32),
            Version::from(1u32),
            vec![PatchOp::remove("/gone")],
        );
        let bytes = encode(&frame);

        let mut decoder = FrameDecoder::new();
        for byte in bytes.iter().take(bytes.len() - 1) {
            decoder.push(&[*byte]);
            assert_eq!(decoder.next_frame().unwrap(), None);
        }
        decoder.push(&bytes[bytes.len() - 1..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(frame));
    }

    #[test]
    fn test_rejects_garbage_between_frames() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Version: \"00000001\"\r\nParents: \r\nContent-Length: 2\r\n\r\n{}XXXXXXXXXX");
        assert!(matches!(decoder.next_frame(), Err(FrameError::MissingSeparator)));
    }

    #[test]
    fn test_missing_version_is_an_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Parents: \r\nContent-Length: 2\r\n\r\n{}\r\n\r\n\r\n\r\n\r\n");
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::MissingHeader("Version"))
        ));
    }

    #[test]
    fn test_non_utf8_headers_are_an_error() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Version: \"0000\xff\xfe01\"\r\nParents: \r\nContent-Length: 2\r\n\r\n{}\r\n\r\n\r\n\r\n\r\n");
        assert!(matches!(
            decoder.next_frame(),
            Err(FrameError::InvalidHeader(_))
        ));
    }
}
