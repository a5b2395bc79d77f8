//! Wire frames exchanged between the control plane and execution units.
//!
//! Every request carries the task id as its correlation id and every response
//! echoes it back, so the control plane can tell a live reply from a late one.
//! Frames are MessagePack-encoded; units never share memory with the pool.

use carepool_core::PoolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;

/// Control plane -> unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation id (the task id).
    pub id: TaskId,
    /// Which computation `data` represents.
    pub task_type: String,
    pub data: Value,
}

/// Unit -> control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation id copied from the request.
    pub id: TaskId,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl Request {
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl Response {
    pub fn success(id: TaskId, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: TaskId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Build a response from the outcome of an execution target.
    pub fn from_outcome(id: TaskId, outcome: Result<Value, String>) -> Self {
        match outcome {
            Ok(value) => Self::success(id, value),
            Err(message) => Self::failure(id, message),
        }
    }

    /// Convert into the value delivered to the submitting caller.
    ///
    /// A `null` result decodes as `None`, so a missing result on success is `Value::Null`.
    pub fn into_outcome(self) -> Result<Value, PoolError> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(PoolError::TaskFailed(
                self.error.unwrap_or_else(|| "unit reported failure without a message".into()),
            ))
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}
