//! Non-interactive and interactive CLI modes
//!
//! Both submit through an in-process gateway and stream each run's log lines
//! to stdout as they are published.

use std::time::Duration;
use taskrelay_foundation::{Error, RelayConfig};
use taskrelay_gateway::RequestGateway;
use taskrelay_task::{builtin_factory, StatusView, EXECUTION_ERROR_PREFIX};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

const PROMPT: &str = "Enter your prompt (or 'exit' to quit): ";

fn gateway_for(config: &RelayConfig) -> anyhow::Result<RequestGateway> {
    let factory = builtin_factory(&config.agent)?;
    Ok(RequestGateway::from_config(config, factory))
}

/// Submit one input, stream its log lines to stdout, then print the result
pub async fn run_once(config: &RelayConfig, input: &str) -> anyhow::Result<()> {
    let gateway = gateway_for(config)?;
    eprintln!("taskrelay - {} agent\n", config.agent);

    let view = stream_request(&gateway, input, config.max_wait()).await?;
    let result = into_result(view)?;
    println!("\n{}", result);
    Ok(())
}

/// Read prompts from stdin until `exit`, end of input or Ctrl+C
pub async fn run_interactive(config: &RelayConfig) -> anyhow::Result<()> {
    let gateway = gateway_for(config)?;
    eprintln!("taskrelay - {} agent, interactive\n", config.agent);

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        session = run_session(&gateway, stdin, config.max_wait()) => {
            session?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    eprintln!("Goodbye!");
    Ok(())
}

/// Run every non-blank line of `reader` as a prompt, stopping at `exit`.
/// A failed run is reported and the session continues. Returns how many
/// prompts were executed.
async fn run_session<R>(gateway: &RequestGateway, reader: R, max_wait: Duration) -> anyhow::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut executed = 0;

    loop {
        eprint!("{}", PROMPT);
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let prompt = line.trim();
        if prompt.eq_ignore_ascii_case("exit") {
            break;
        }
        if prompt.is_empty() {
            continue;
        }

        let view = stream_request(gateway, prompt, max_wait).await?;
        executed += 1;
        match into_result(view) {
            Ok(result) => println!("\n{}\n", result),
            Err(e) => eprintln!("\n{}\n", e),
        }
    }

    Ok(executed)
}

/// Submit `input` and print new log lines until the run completes
async fn stream_request(
    gateway: &RequestGateway,
    input: &str,
    max_wait: Duration,
) -> anyhow::Result<StatusView> {
    let id = gateway.submit(input)?;
    eprintln!("request {}", id);

    let mut printed = 0;
    let mut since = None;
    loop {
        let view = gateway.poll_wait(id, since, max_wait).await?;
        printed += print_new_lines(&view, printed);
        if view.completed {
            return Ok(view);
        }
        since = Some(view.version);
    }
}

/// Completed view to its result, with failures as `Error::Execution`
fn into_result(view: StatusView) -> taskrelay_foundation::Result<String> {
    let result = view.result.unwrap_or_default();
    match result.strip_prefix(EXECUTION_ERROR_PREFIX) {
        Some(message) => Err(Error::Execution(message.to_string())),
        None => Ok(result),
    }
}

/// Print lines past the first `already` and return how many were printed
fn print_new_lines(view: &StatusView, already: usize) -> usize {
    let fresh = new_lines(&view.logs, already);
    for line in &fresh {
        println!("{}", line);
    }
    fresh.len()
}

fn new_lines(logs: &str, already: usize) -> Vec<&str> {
    logs.lines().skip(already).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shell_gateway() -> RequestGateway {
        let config = RelayConfig {
            agent: "shell".to_string(),
            publish_interval_ms: 10,
            ..RelayConfig::default()
        };
        gateway_for(&config).unwrap()
    }

    #[test]
    fn test_new_lines() {
        let logs = "a\nb\nc";
        assert_eq!(new_lines(logs, 0), vec!["a", "b", "c"]);
        assert_eq!(new_lines(logs, 2), vec!["c"]);
        assert!(new_lines(logs, 3).is_empty());
        assert!(new_lines("", 0).is_empty());
    }

    #[test]
    fn test_into_result() {
        let view = |result: &str| StatusView {
            completed: true,
            logs: String::new(),
            result: Some(result.to_string()),
            version: 1,
        };
        assert_eq!(into_result(view("world")).unwrap(), "world");
        assert!(matches!(
            into_result(view("execution error: boom")),
            Err(Error::Execution(message)) if message == "boom"
        ));
    }

    #[tokio::test]
    async fn test_run_once_unknown_agent() {
        let config = RelayConfig {
            agent: "nope".to_string(),
            ..RelayConfig::default()
        };
        assert!(run_once(&config, "hi").await.is_err());
    }

    #[tokio::test]
    async fn test_run_once_blank_input() {
        assert!(run_once(&RelayConfig::default(), " ").await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_stops_at_exit() {
        let gateway = shell_gateway();
        let input: &[u8] = b"echo first\n\n   \nEXIT\necho never\n";

        let executed = run_session(&gateway, input, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(executed, 1);
        assert_eq!(gateway.stats().total, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_survives_failed_run() {
        let gateway = shell_gateway();
        let input: &[u8] = b"exit 3\necho ok";

        let executed = run_session(&gateway, input, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(executed, 2);
        let stats = gateway.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 1);
    }
}
