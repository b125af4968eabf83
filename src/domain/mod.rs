//! Shared domain layer models
//!
//! Tool-independent records that every connector converts into. Only the
//! areas needed by the bundled connectors are modelled.

pub mod devops;

pub use devops::{
    duration_sec, CicdEnvironment, CicdPipeline, CicdPipelineCommit, CicdResult, CicdStatus,
    CicdTask, CicdType,
};
