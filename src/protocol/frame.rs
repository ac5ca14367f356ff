//! Frame model and encoder

use bytes::{BufMut, Bytes, BytesMut};

use crate::patch::PatchOp;
use crate::version::Version;

/// Written after every frame
pub const FRAME_TERMINATOR: &[u8] = b"\r\n\r\n\r\n\r\n\r\n";

/// Separates patch blocks inside a multi-patch frame
pub(crate) const PATCH_SEPARATOR: &[u8] = b"\r\n\r\n";

/// Body of an update frame
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Whole new resource body
    Body(Bytes),
    /// Non-empty ordered edit script
    Patches(Vec<PatchOp>),
}

/// One update delivered to a subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateFrame {
    pub version: Version,
    pub parents: Vec<Version>,
    pub payload: FramePayload,
}

impl UpdateFrame {
    /// Full snapshot frame; snapshots have no parents
    pub fn full(version: Version, body: Bytes) -> Self {
        Self {
            version,
            parents: Vec::new(),
            payload: FramePayload::Body(body),
        }
    }

    /// Patch frame expressed relative to `parent`
    pub fn patch(version: Version, parent: Version, patches: Vec<PatchOp>) -> Self {
        Self {
            version,
            parents: vec![parent],
            payload: FramePayload::Patches(patches),
        }
    }

    pub fn is_patch(&self) -> bool {
        matches!(self.payload, FramePayload::Patches(_))
    }
}

/// Serialize a frame into its exact wire bytes
pub fn encode(frame: &UpdateFrame) -> Bytes {
    let mut out = BytesMut::new();

    put_header(&mut out, "Version", &frame.version.to_string());
    let parents = frame
        .parents
        .iter()
        .map(|parent| parent.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    put_header(&mut out, "Parents", &parents);

    match &frame.payload {
        FramePayload::Body(body) => {
            put_header(&mut out, "Content-Length", &body.len().to_string());
            out.put_slice(b"\r\n");
            out.put_slice(body);
        }
        FramePayload::Patches(patches) if patches.len() == 1 => {
            put_patch(&mut out, &patches[0]);
        }
        FramePayload::Patches(patches) => {
            put_header(&mut out, "Patches", &patches.len().to_string());
            out.put_slice(b"\r\n");
            for (i, patch) in patches.iter().enumerate() {
                if i > 0 {
                    out.put_slice(PATCH_SEPARATOR);
                }
                put_patch(&mut out, patch);
            }
        }
    }

    out.put_slice(FRAME_TERMINATOR);
    out.freeze()
}

fn put_patch(out: &mut BytesMut, patch: &PatchOp) {
    let value = patch.value_bytes();
    put_header(out, "Content-Length", &value.len().to_string());
    put_header(out, "Content-Range", &format!("{} {}", patch.op, patch.path));
    out.put_slice(b"\r\n");
    out.put_slice(&value);
}

fn put_header(out: &mut BytesMut, name: &str, value: &str) {
    out.put_slice(name.as_bytes());
    out.put_slice(b": ");
    out.put_slice(value.as_bytes());
    out.put_slice(b"\r\n");
}
