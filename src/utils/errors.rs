//! Error types for the pipelining framework.
//!
//! This module defines all error types used throughout the framework,
//! organized by the phase that produces them. Internal-consistency
//! failures (a malformed partition, a component owned by zero or two
//! stages) are distinguished from rejections of unsupported loop shapes:
//! the former indicate a defect in the upstream analysis, the latter a
//! loop this transformation cannot handle and must leave sequential.

use thiserror::Error;
use std::fmt;

/// Top-level error type for the pipeliner.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error validating the component partition
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// Error building stages from the partition
    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    /// Error building the shared environment
    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    /// Error allocating inter-stage queues
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Error emitting the pipeline dispatch
    #[error("Codegen error: {0}")]
    Codegen(#[from] CodegenError),

    /// Failure reported by the external stage dispatcher
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether this error signals a defect in the upstream analyses
    /// rather than an unsupported input. Internal errors mean the
    /// partition or graph handed to the pipeliner violated its own
    /// contract; callers that prefer the abort-on-defect policy can
    /// assert on this.
    pub fn is_internal(&self) -> bool {
        match self {
            PipelineError::Partition(e) => e.kind.is_internal(),
            PipelineError::Stage(_) => true,
            PipelineError::Environment(e) => e.kind.is_internal(),
            PipelineError::Codegen(e) => e.kind.is_internal(),
            PipelineError::Internal(_) => true,
            _ => false,
        }
    }
}

/// Error validating an externally supplied partition.
#[derive(Error, Debug, Clone)]
pub struct PartitionError {
    /// The error message
    pub message: String,
    /// The kind of partition error
    pub kind: PartitionErrorKind,
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionErrorKind {
    /// A component appears in no subset
    MissingComponent,
    /// A component appears in more than one subset
    DuplicateComponent,
    /// A subset references a component the graph does not contain
    UnknownComponent,
    /// A subset is empty
    EmptySubset,
    /// Subset order contradicts the component DAG
    OrderViolation,
    /// The partition has no subsets at all
    Empty,
}

impl PartitionErrorKind {
    fn is_internal(&self) -> bool {
        // An empty partition means no viable staging was found upstream;
        // everything else is a broken invariant of the partitioner.
        !matches!(self, PartitionErrorKind::Empty)
    }
}

/// Error building stages from the partition.
#[derive(Error, Debug, Clone)]
pub struct StageError {
    /// The error message
    pub message: String,
    /// The kind of stage error
    pub kind: StageErrorKind,
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageErrorKind {
    /// Stage count does not match partition subset count
    CountMismatch,
    /// A component ended up owned by no stage
    Unassigned,
    /// A component ended up owned by more than one stage
    DoubleAssigned,
    /// The partition named a component the loop does not contain
    UnknownComponent,
}

/// Error building the shared live-value environment.
#[derive(Error, Debug, Clone)]
pub struct EnvironmentError {
    /// The error message
    pub message: String,
    /// The kind of environment error
    pub kind: EnvironmentErrorKind,
}

impl fmt::Display for EnvironmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentErrorKind {
    /// The same value registered for two slots
    DuplicateSlot,
    /// A slot index or value with no registration
    UnknownValue,
}

impl EnvironmentErrorKind {
    fn is_internal(&self) -> bool {
        matches!(self, EnvironmentErrorKind::DuplicateSlot)
    }
}

/// Error allocating inter-stage communication queues.
#[derive(Error, Debug, Clone)]
pub struct QueueError {
    /// The error message
    pub message: String,
    /// The kind of queue error
    pub kind: QueueErrorKind,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueErrorKind {
    /// The value's bit-width exceeds what queues support
    UnsupportedWidth,
    /// The width resolver produced no width for a communicated value
    UnresolvedWidth,
    /// A data dependence edge carries no value to communicate
    MissingValue,
}

/// Error emitting the final pipeline.
#[derive(Error, Debug, Clone)]
pub struct CodegenError {
    /// The error message
    pub message: String,
    /// The kind of codegen error
    pub kind: CodegenErrorKind,
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenErrorKind {
    /// Stage table length disagrees with the stage count
    StageTableMismatch,
    /// Queue table length disagrees with the queue count
    QueueTableMismatch,
    /// The pipeline has no stages to dispatch
    EmptyPipeline,
}

impl CodegenErrorKind {
    fn is_internal(&self) -> bool {
        !matches!(self, CodegenErrorKind::EmptyPipeline)
    }
}

/// Result type using PipelineError.
pub type PipeResult<T> = Result<T, PipelineError>;
