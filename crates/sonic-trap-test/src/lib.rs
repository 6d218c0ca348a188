//! Integration test infrastructure for the SONiC trap manager
//!
//! Provides:
//! - Scripted device query and playbook executors
//! - A lab topology with matching trap payloads
//! - A ready-wired dispatcher over the fakes

pub mod fakes;
pub mod fixtures;

pub use fakes::{FakePlaybookExecutor, FakeQueryExecutor, PlaybookRun, QueryCall, QueryFailure};
pub use fixtures::*;
