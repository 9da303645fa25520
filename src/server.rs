//! The local upload server: optionally start it, then wait until it answers.
//!
//! Uploads need the page at [`RouteConfig::server_url`] to be up. The server
//! is normally started by hand; when [`RouteConfig::server_command`] is set
//! the run starts it instead and stops it again when the handle is dropped.

use crate::config::RouteConfig;
use crate::error::ScanRouteError;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A server process started by this run. Killed on drop.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
}

impl ServerProcess {
    /// Start `command` (program followed by its arguments).
    pub fn spawn(command: &[String]) -> Result<Self, ScanRouteError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| ScanRouteError::InvalidConfig("Server command is empty".into()))?;

        let child = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ScanRouteError::ServerUnreachable {
                url: program.clone(),
                reason: format!("could not start server: {e}"),
            })?;
        info!(
            "Started upload server: {} (pid {})",
            command.join(" "),
            child.id().map_or_else(|| "?".to_string(), |p| p.to_string())
        );
        Ok(Self { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Poll `url` with GET until it answers with any status, or `timeout` elapses.
pub async fn wait_until_reachable(url: &str, timeout: Duration) -> Result<(), ScanRouteError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| ScanRouteError::Internal(format!("HTTP client: {e}")))?;

    let deadline = Instant::now() + timeout;
    loop {
        match client.get(url).send().await {
            Ok(resp) => {
                debug!("{} answered {}", url, resp.status());
                return Ok(());
            }
            Err(e) if Instant::now() >= deadline => {
                return Err(ScanRouteError::ServerUnreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(e) => debug!("{} not reachable yet: {}", url, e),
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Start the configured server if any, then wait for the upload page.
///
/// The returned handle must be kept alive for as long as uploads run.
pub async fn ensure_server(
    config: &RouteConfig,
) -> Result<Option<ServerProcess>, ScanRouteError> {
    let process = match config.server_command {
        Some(ref command) => Some(ServerProcess::spawn(command)?),
        None => None,
    };
    wait_until_reachable(
        &config.server_url,
        Duration::from_secs(config.server_wait_secs),
    )
    .await?;
    info!("Upload server reachable at {}", config.server_url);
    Ok(process)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_times_out() {
        // Port 9 (discard) is closed on any sane test machine.
        let err = wait_until_reachable("http://127.0.0.1:9/", Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanRouteError::ServerUnreachable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn answering_server_is_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = sock.read(&mut buf).await;
                let _ = sock
                    .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        wait_until_reachable(&format!("http://{addr}/"), Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[test]
    fn empty_command_is_invalid() {
        let err = ServerProcess::spawn(&[]).unwrap_err();
        assert!(matches!(err, ScanRouteError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let err = ServerProcess::spawn(&["scanroute-no-such-server-binary".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("could not start server"));
    }
}
