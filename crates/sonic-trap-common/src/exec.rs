//! Bounded execution of external programs.
//!
//! Both external collaborators of the trap pipeline (`snmpwalk` for device
//! queries, `ansible-playbook` for configuration) are plain programs. They are
//! run here with an argument vector, never through a shell, so values that
//! come from trap payloads cannot be interpreted as shell syntax.
//!
//! # Example
//!
//! ```ignore
//! use sonic_trap_common::exec::{self, ExecOutcome};
//! use std::time::Duration;
//!
//! let outcome = exec::run("/usr/bin/snmpwalk", &["-v2c", "-On", "10.0.0.1"], None,
//!     Duration::from_secs(10)).await?;
//! if let ExecOutcome::Finished(result) = outcome {
//!     println!("{}", result.stdout);
//! }
//! ```

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{TrapError, TrapResult};

/// Result of a finished program execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the program (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// The captured stdout output.
    pub stdout: String,
    /// The captured stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the program succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for diagnostics.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// How a bounded execution ended.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// The program exited on its own.
    Finished(ExecResult),
    /// The timeout elapsed; the child was killed.
    TimedOut,
}

/// Runs `program` with `args`, killing it if it outlives `timeout`.
///
/// # Returns
///
/// * `Ok(ExecOutcome::Finished)` - The program exited (any status)
/// * `Ok(ExecOutcome::TimedOut)` - The program was killed at the deadline
/// * `Err(TrapError::ProcessSpawn)` - The program could not be started
pub async fn run(
    program: &str,
    args: &[String],
    cwd: Option<&Path>,
    timeout: Duration,
) -> TrapResult<ExecOutcome> {
    tracing::debug!(program = %program, args = ?args, timeout = ?timeout, "Executing program");

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let child = command.spawn().map_err(|e| TrapError::ProcessSpawn {
        program: program.to_string(),
        source: e,
    })?;

    // Dropping the output future drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            tracing::warn!(program = %program, timeout = ?timeout, "Program timed out, killed");
            return Ok(ExecOutcome::TimedOut);
        }
    };

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(program = %program, "Program succeeded");
    } else {
        tracing::warn!(
            program = %program,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Program failed"
        );
    }

    Ok(ExecOutcome::Finished(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_exec_result_success() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "output".to_string(),
            stderr: "".to_string(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "output");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 4,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert!(!result.success());
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[tokio::test]
    async fn test_run_echo() {
        let outcome = run("/bin/sh", &sh("echo hello"), None, Duration::from_secs(5))
            .await
            .unwrap();
        match outcome {
            ExecOutcome::Finished(result) => {
                assert!(result.success());
                assert_eq!(result.stdout, "hello");
            }
            ExecOutcome::TimedOut => panic!("echo should not time out"),
        }
    }

    #[tokio::test]
    async fn test_run_exit_code() {
        let outcome = run("/bin/sh", &sh("exit 42"), None, Duration::from_secs(5))
            .await
            .unwrap();
        match outcome {
            ExecOutcome::Finished(result) => assert_eq!(result.exit_code, 42),
            ExecOutcome::TimedOut => panic!("exit should not time out"),
        }
    }

    #[tokio::test]
    async fn test_run_timeout_kills_child() {
        let outcome = run("/bin/sh", &sh("sleep 5"), None, Duration::from_millis(100))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let result = run(
            "/nonexistent/snmpwalk",
            &[],
            None,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(TrapError::ProcessSpawn { .. })));
    }

    #[tokio::test]
    async fn test_args_are_not_shell_interpreted() {
        let args = vec!["$HOME; rm -rf /".to_string()];
        let outcome = run("/bin/echo", &args, None, Duration::from_secs(5))
            .await
            .unwrap();
        match outcome {
            ExecOutcome::Finished(result) => assert_eq!(result.stdout, "$HOME; rm -rf /"),
            ExecOutcome::TimedOut => panic!("echo should not time out"),
        }
    }
}
