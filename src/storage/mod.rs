//! Local file storage.
//!
//! Generated tasks, solver rollouts and collected trajectories are written as
//! append-only JSON Lines files through [`JsonlLog`].

pub mod jsonl;

pub use jsonl::JsonlLog;
