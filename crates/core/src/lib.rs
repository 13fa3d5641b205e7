//! Core domain for the animation job service.
//!
//! Holds the job record and its state machine, the in-memory job store,
//! the artifact lifecycle manager, and the collaborator contracts the
//! pipeline drives. Nothing here knows about HTTP or subprocesses.

pub mod artifact;
pub mod collaborators;
pub mod error;
pub mod job;
pub mod source_check;
pub mod store;
pub mod types;
