//! Shell agent - runs the input as a shell command with log streaming
//!
//! stdout lines are logged at INFO and collected into the result, stderr
//! lines are logged at WARN. A non-zero exit status fails the run.

use super::{Agent, RunContext};
use anyhow::{bail, Context as _};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

pub struct ShellAgent {
    shell: &'static str,
    shell_arg: &'static str,
}

impl ShellAgent {
    pub fn new() -> Self {
        let (shell, shell_arg) = if cfg!(windows) {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };
        Self { shell, shell_arg }
    }
}

impl Default for ShellAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ShellAgent {
    fn name(&self) -> &str {
        "shell"
    }

    async fn execute(&self, input: &str, ctx: &RunContext) -> anyhow::Result<String> {
        let mut child = Command::new(self.shell)
            .arg(self.shell_arg)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn process")?;

        debug!("Spawned shell for request {}", ctx.request_id().short());

        let stdout = child.stdout.take().context("stdout not captured")?;
        let stderr = child.stderr.take().context("stderr not captured")?;

        // Both pipes are drained here on the run's own task; the collector
        // keeps the interleaving in arrival order.
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let mut output = Vec::new();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(line) => {
                        ctx.info(line.clone());
                        output.push(line);
                    }
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(line) => ctx.warn(line),
                    None => err_done = true,
                },
            }
        }

        let status = child.wait().await.context("failed to wait for process")?;
        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!("command exited with status {}", code);
        }

        Ok(output.join("\n"))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::log::LogCollector;
    use crate::task::RequestId;

    fn context() -> (RunContext, LogCollector) {
        let collector = LogCollector::attach("shell");
        (
            RunContext::new(RequestId::new(), "shell", collector.clone()),
            collector,
        )
    }

    #[tokio::test]
    async fn test_shell_collects_stdout() {
        let (ctx, collector) = context();
        let result = ShellAgent::new()
            .execute("echo one; echo two; echo oops 1>&2", &ctx)
            .await
            .unwrap();

        assert_eq!(result, "one\ntwo");
        let logs = collector.snapshot();
        assert!(logs.contains(" - one"));
        assert!(logs.contains("WARN"));
        assert!(logs.contains(" - oops"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_fails() {
        let (ctx, _collector) = context();
        let err = ShellAgent::new().execute("exit 3", &ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "command exited with status 3");
    }
}
