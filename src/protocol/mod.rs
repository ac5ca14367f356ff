//! Braid update frames
//!
//! Subscription bodies are a sequence of frames. Each frame carries a
//! version, the version it is based on, and either a full body or a list
//! of patches:
//!
//! ```text
//! Version: "561bacaf"\r\n
//! Parents: \r\n
//! Content-Length: 7\r\n
//! \r\n
//! {"a":1}\r\n\r\n\r\n\r\n\r\n
//! ```
//!
//! A patch frame names its parent and replaces `Content-Length` with one
//! `Content-Range: <op> <path>` block per operation. More than one
//! operation adds a `Patches: <count>` header.

mod decode;
mod frame;

pub use decode::{FrameDecoder, FrameError};
pub use frame::{encode, FramePayload, UpdateFrame, FRAME_TERMINATOR};
