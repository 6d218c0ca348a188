//! Operator tooling for trapmgrd
//!
//! Reads the state trapmgrd leaves behind between invocations (cache
//! snapshot, log file) and exercises the MAC resolver directly.

pub mod commands;
pub mod report;
