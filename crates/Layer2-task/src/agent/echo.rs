//! Echo agent - reports a few progress steps and returns its input

use super::{Agent, RunContext};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub struct EchoAgent {
    step_delay: Duration,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self {
            step_delay: Duration::from_millis(200),
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }
}

impl Default for EchoAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "echo"
    }

    #[tracing::instrument(name = "echo_execute", skip_all)]
    async fn execute(&self, input: &str, ctx: &RunContext) -> anyhow::Result<String> {
        info!("Received {} bytes of input", input.len());
        tokio::time::sleep(self.step_delay).await;

        ctx.info("Thinking about the request");
        tokio::time::sleep(self.step_delay).await;

        info!("Done");
        Ok(input.to_string())
    }
}
