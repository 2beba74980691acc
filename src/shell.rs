use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::debug;
use crate::error::{ErrorKind, Result, WandError};

/// Runs external commands and captures their combined output.
///
/// Used for build steps, post-install hooks, `git` and `hdiutil`.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor {
    env: BTreeMap<String, String>,
}

impl ShellExecutor {
    /// An executor that adds `env` to the inherited environment of every command.
    pub fn with_env(env: BTreeMap<String, String>) -> Self {
        Self { env }
    }

    pub fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let mut command = Command::new(program);
        command.args(args);
        self.output(command, program)
    }

    pub fn run_in(&self, program: &str, args: &[&str], dir: &Path) -> Result<String> {
        let mut command = Command::new(program);
        command.args(args).current_dir(dir);
        self.output(command, program)
    }

    /// Runs `script` through `sh -c` inside `dir`.
    pub fn run_script(&self, script: &str, dir: &Path) -> Result<String> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script).current_dir(dir);
        self.output(command, script)
    }

    fn output(&self, mut command: Command, label: &str) -> Result<String> {
        command.envs(&self.env);
        debug!(command = label, "Running command");
        let output = command.output().map_err(|e| {
            WandError::wrap(
                ErrorKind::InstallationFailed,
                format!("Failed to run {label:?}"),
                e,
            )
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        if !output.status.success() {
            return Err(WandError::with_details(
                ErrorKind::InstallationFailed,
                format!("Command {label:?} failed with {}", output.status),
                combined,
            ));
        }
        Ok(combined)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_script_in_dir_with_env() {
        let dir = tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("WAND_TEST_VALUE".to_string(), "hello".to_string());
        let shell = ShellExecutor::with_env(env);

        let out = shell
            .run_script("echo $WAND_TEST_VALUE > out.txt && cat out.txt", dir.path())
            .unwrap();
        assert_eq!(out, "hello");
        assert!(dir.path().join("out.txt").exists());
    }

    #[test]
    fn test_failing_command_reports_output() {
        let dir = tempdir().unwrap();
        let err = ShellExecutor::default()
            .run_script("echo broken >&2; exit 3", dir.path())
            .unwrap_err();
        assert!(err.is(ErrorKind::InstallationFailed));
        assert_eq!(err.details(), Some("broken"));
    }

    #[test]
    fn test_missing_program() {
        let err = ShellExecutor::default()
            .run("wand-definitely-not-a-program", &[])
            .unwrap_err();
        assert!(err.is(ErrorKind::InstallationFailed));
    }
}
