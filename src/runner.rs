use anyhow::{Context, Result};
use std::process::{Command, Output};

/// Run a command and return its raw output; only a failure to spawn is an error
pub fn run_output(cmd: &str, args: &[&str]) -> Result<Output> {
    Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))
}

/// Error for a command that exited non-zero
pub fn failure(cmd: &str, args: &[&str], output: &Output) -> anyhow::Error {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::anyhow!(
        "{} {} failed ({}): {}",
        cmd,
        args.join(" "),
        output.status,
        stderr.trim()
    )
}

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = run_output(cmd, args)?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(failure(cmd, args, &output))
    }
}

/// Run a command, failing on a non-zero exit; output is logged, not shown
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    let out = run_capture(cmd, args)?;
    if !out.is_empty() {
        log::debug!("{cmd}: {out}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_run_capture_trims_stdout() {
        assert_eq!(run_capture("echo", &["  hello  "]).unwrap(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_an_error() {
        let err = run_capture("false", &[]).unwrap_err();
        assert!(err.to_string().starts_with("false  failed"));
        assert!(run_checked("false", &[]).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_output_keeps_exit_status() {
        let output = run_output("sh", &["-c", "echo oops >&2; exit 3"]).unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "oops");
        let err = failure("sh", &["-c"], &output);
        assert!(err.to_string().contains("oops"));
    }

    #[test]
    fn test_missing_binary() {
        assert!(run_output("definitely-not-a-real-binary-xyz", &[]).is_err());
        assert!(run_capture("definitely-not-a-real-binary-xyz", &[]).is_err());
    }
}
