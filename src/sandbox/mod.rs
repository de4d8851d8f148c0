//! Sandbox service gateway.
//!
//! [`SandboxClient`] speaks the service's HTTP API; engines depend only on the
//! [`SandboxService`] trait and own each sandbox through a [`SandboxLease`].

pub mod client;
pub mod lease;
pub mod types;

pub use client::{SandboxClient, SandboxService, HEALTH_TIMEOUT, REQUEST_TIMEOUT};
pub use lease::SandboxLease;
pub use types::{
    CommandEntry, CommandEntryResult, CommandHistory, ExecOutcome, SandboxInfo,
    SandboxTrajectory, TrajectoryFormat, DEFAULT_IMAGE, EXEC_FAILURE_EXIT_CODE,
};
