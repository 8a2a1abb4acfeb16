//! `mixtape-core`: types shared by every playlist-automation crate.
//!
//! The scheduler, the job executor, the snapshot store and the source
//! resolver all depend on this crate and never on each other's internals.
//! It owns the persisted record shapes, the remote-API boundary
//! ([`gateway::PlaylistGateway`]) and the job outcome taxonomy.

pub mod config;
pub mod error;
pub mod gateway;
pub mod job;
pub mod types;

pub use error::{MixtapeError, Result};
pub use gateway::{ArchiveLookup, GatewayError, Item, PlaylistGateway};
pub use job::{JobError, JobOutcome, JobParams, JobReport, JobRunner, RotationMode};
pub use types::*;
