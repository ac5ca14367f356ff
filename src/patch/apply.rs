//! Patch application

use json_patch::PatchOperation;
use serde_json::Value;

use super::types::{PatchError, PatchOp};

/// Apply operations in order to a parsed document
///
/// The document is left untouched if any operation fails.
pub fn apply(doc: &mut Value, ops: &[PatchOp]) -> Result<(), PatchError> {
    let operations = ops
        .iter()
        .map(PatchOperation::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    json_patch::patch(doc, &operations)?;
    Ok(())
}

/// Parse `body`, apply `ops`, and return the resulting document
pub fn apply_bytes(body: &[u8], ops: &[PatchOp]) -> Result<Value, PatchError> {
    let mut doc: Value = serde_json::from_slice(body)
        .map_err(|source| PatchError::InvalidJson { side: "old", source })?;
    apply(&mut doc, ops)?;
    Ok(doc)
}
