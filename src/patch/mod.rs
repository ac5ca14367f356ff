//! JSON patch engine
//!
//! Diffing and application are RFC 6902 operations from `json_patch`.
//! [`PatchOp`] is the wire form: only `add`, `remove` and `replace` are
//! carried in frames.
//!
//! # Contract
//!
//! For any two valid JSON documents `old` and `new`, applying
//! `diff(old, new)` in order to `old` yields a document equal to `new`.
//! Numbers keep their literal digits, so patch values reproduce the
//! source text of each number.
//!
//! Paths are JSON pointers (RFC 6901): `""` is the whole document,
//! `~0` escapes `~` and `~1` escapes `/`.

mod apply;
mod diff;
mod types;

pub use apply::{apply, apply_bytes};
pub use diff::{diff, diff_values};
pub use types::{OpType, PatchError, PatchOp};
