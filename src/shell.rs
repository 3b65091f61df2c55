use crate::tenant::traits::CommandExecutor;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Runs commands on the local host through `bash -c`.
pub struct LocalCommandExecutor {
    shell: String,
}

impl LocalCommandExecutor {
    pub fn new() -> Self {
        Self {
            shell: "/bin/bash".into(),
        }
    }

    pub(crate) async fn run(&self, command: &str, working_dir: Option<&str>) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.shell))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        })
    }
}

impl Default for LocalCommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandExecutor for LocalCommandExecutor {
    async fn execute(&self, command: &str, working_dir: Option<&str>) -> Result<String> {
        tracing::debug!("exec: {}", command);
        let out = self.run(command, working_dir).await?;
        if !out.stderr.trim().is_empty() {
            tracing::debug!("exec stderr: {}", out.stderr.trim());
        }
        if !out.success {
            bail!("command `{}` failed: {}", command, out.stderr.trim());
        }
        Ok(out.stdout)
    }
}

/// Quote a value for safe interpolation into a `bash -c` string.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let exec = LocalCommandExecutor::new();
        let out = exec.execute("echo hello", None).await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let exec = LocalCommandExecutor::new();
        let err = exec.execute("echo boom >&2; exit 3", None).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn honours_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exec = LocalCommandExecutor::new();
        let out = exec
            .execute("pwd", Some(dir.path().to_str().unwrap()))
            .await
            .unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(std::path::Path::new(out.trim()).canonicalize().unwrap(), expected);
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }
}
