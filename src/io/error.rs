use std::fmt;

use thiserror::Error;

use crate::domain::OperationId;
use crate::storage::StoreError;

/// The three export stages, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Marshal,
    Write,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Marshal => "marshal",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("read stage failed: {0}")]
    Read(#[source] StoreError),

    #[error("marshal stage failed on operation {id}: {reason}")]
    Marshal { id: OperationId, reason: String },

    #[error("write stage failed on operation {id}: {source}")]
    Write {
        id: OperationId,
        #[source]
        source: std::io::Error,
    },

    #[error("{marshaler} marshaler cannot write a {payload} payload")]
    PayloadMismatch {
        marshaler: &'static str,
        payload: &'static str,
    },

    #[error("failed to flush export output: {0}")]
    Flush(#[source] std::io::Error),

    #[error("export output lock poisoned")]
    Poisoned,

    #[error("{stage} stage crashed: {reason}")]
    StageCrashed { stage: Stage, reason: String },
}

impl PipelineError {
    /// Stage the failure belongs to, when it came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Read(_) => Some(Stage::Read),
            PipelineError::Marshal { .. } => Some(Stage::Marshal),
            PipelineError::Write { .. } | PipelineError::PayloadMismatch { .. } => {
                Some(Stage::Write)
            }
            PipelineError::StageCrashed { stage, .. } => Some(*stage),
            PipelineError::Flush(_) | PipelineError::Poisoned => None,
        }
    }
}
