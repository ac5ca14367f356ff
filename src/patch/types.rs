//! Patch operation types

use std::fmt;

use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Structural edit verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Add,
    Remove,
    Replace,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Add => "add",
            OpType::Remove => "remove",
            OpType::Replace => "replace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(OpType::Add),
            "remove" => Some(OpType::Remove),
            "replace" => Some(OpType::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single edit at a JSON pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOp {
    pub op: OpType,
    pub path: String,
    /// New fragment; absent for `remove`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOp {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpType::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: OpType::Remove,
            path: path.into(),
            value: None,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: OpType::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    /// Serialized value bytes as they appear on the wire
    ///
    /// A missing value is written as `null`.
    pub fn value_bytes(&self) -> Vec<u8> {
        match &self.value {
            Some(value) => value.to_string().into_bytes(),
            None => b"null".to_vec(),
        }
    }
}

/// Patch engine errors
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Invalid JSON in {side} document: {source}")]
    InvalidJson {
        side: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Operation {0} has no wire form")]
    UnsupportedOp(&'static str),

    #[error("Operation {0} at {1} requires a value")]
    MissingValue(OpType, String),

    #[error("Failed to apply patch: {0}")]
    Apply(#[from] json_patch::PatchError),
}

impl TryFrom<PatchOperation> for PatchOp {
    type Error = PatchError;

    fn try_from(operation: PatchOperation) -> Result<Self, Self::Error> {
        match operation {
            PatchOperation::Add(AddOperation { path, value }) => Ok(PatchOp::add(path, value)),
            PatchOperation::Remove(RemoveOperation { path }) => Ok(PatchOp::remove(path)),
            PatchOperation::Replace(ReplaceOperation { path, value }) => {
                Ok(PatchOp::replace(path, value))
            }
            PatchOperation::Move(_) => Err(PatchError::UnsupportedOp("move")),
            PatchOperation::Copy(_) => Err(PatchError::UnsupportedOp("copy")),
            PatchOperation::Test(_) => Err(PatchError::UnsupportedOp("test")),
        }
    }
}

impl TryFrom<&PatchOp> for PatchOperation {
    type Error = PatchError;

    fn try_from(op: &PatchOp) -> Result<Self, Self::Error> {
        let path = op.path.clone();
        let value = || {
            op.value
                .clone()
                .ok_or_else(|| PatchError::MissingValue(op.op, op.path.clone()))
        };

        Ok(match op.op {
            OpType::Add => PatchOperation::Add(AddOperation { path, value: value()? }),
            OpType::Remove => PatchOperation::Remove(RemoveOperation { path }),
            OpType::Replace => PatchOperation::Replace(ReplaceOperation {
                path,
                value: value()?,
            }),
        })
    }
}
