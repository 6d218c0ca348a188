//! Common infrastructure for the SONiC trap-driven access control daemons.
//!
//! This crate provides shared functionality for `trapmgrd`, `trapmon` and the
//! MAC resolution library:
//!
//! - [`exec`]: Bounded execution of external programs (argument vectors, hard timeouts)
//! - [`error`]: Error taxonomy for queries, playbooks and configuration
//! - [`MacAddress`], [`VlanId`]: Validated network primitives
//!
//! # Example
//!
//! ```ignore
//! use sonic_trap_common::{exec, TrapResult};
//! use std::time::Duration;
//!
//! async fn walk(device: &str) -> TrapResult<()> {
//!     let args = vec!["-v2c".to_string(), "-On".to_string(), device.to_string()];
//!     exec::run("/usr/bin/snmpwalk", &args, None, Duration::from_secs(10)).await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod exec;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{TrapError, TrapResult};
pub use exec::{ExecOutcome, ExecResult};
pub use types::{MacAddress, ParseError, VlanId};
