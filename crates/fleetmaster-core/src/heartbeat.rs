//! TCP listener for game-server heartbeats
//!
//! Each connection carries one JSON report, terminated by a newline or by
//! the client closing its side. Reports are applied to the registry; bad
//! input only ever affects its own connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use fleetmaster_api::heartbeat::{HeartbeatParseError, HeartbeatReport, MAX_MESSAGE_BYTES};

use crate::actor::RegistryHandle;
use crate::config::HeartbeatConfig;
use crate::error::CoreError;
use crate::state::OccupancySource;

/// Time in-flight connections get to finish once shutdown starts
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened to one heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Report applied to a live server
    Applied,
    /// No live server has the reported id
    UnknownServer(String),
    /// Payload was not a valid report
    Rejected(String),
    /// Connection failed or timed out before a report arrived
    ReadFailed(String),
}

/// Apply one report to the registry
pub async fn apply_report(registry: &RegistryHandle, report: &HeartbeatReport) -> HeartbeatOutcome {
    match registry
        .apply_occupancy(&report.server_id, report.player_count, OccupancySource::Heartbeat)
        .await
    {
        Ok(instance) => {
            debug!(
                server_id = %instance.server_id,
                player_count = instance.player_count,
                state = %instance.state,
                "heartbeat applied"
            );
            HeartbeatOutcome::Applied
        }
        Err(e) if e.is_not_found() => {
            warn!(server_id = %report.server_id, "heartbeat from unknown server ignored");
            HeartbeatOutcome::UnknownServer(report.server_id.clone())
        }
        Err(e) => {
            error!(server_id = %report.server_id, error = %e, "failed to apply heartbeat");
            HeartbeatOutcome::Rejected(e.to_string())
        }
    }
}

/// Parse and apply a raw payload
pub async fn process_payload(registry: &RegistryHandle, payload: &[u8]) -> HeartbeatOutcome {
    match HeartbeatReport::parse(payload) {
        Ok(report) => apply_report(registry, &report).await,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "malformed heartbeat dropped");
            HeartbeatOutcome::Rejected(e.to_string())
        }
    }
}

/// Read one report: up to a newline, EOF, or the size limit
///
/// Anything after the first newline is discarded.
async fn read_report<R>(stream: &mut R) -> Result<Vec<u8>, HeartbeatParseError>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::with_capacity(256);
    let mut chunk = [0u8; 512];

    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| HeartbeatParseError::Malformed(e.to_string()))?;
        if n == 0 {
            break;
        }
        payload.extend_from_slice(&chunk[..n]);
        if let Some(end) = payload.iter().position(|&b| b == b'\n') {
            payload.truncate(end);
            break;
        }
        if payload.len() > MAX_MESSAGE_BYTES {
            break;
        }
    }

    if payload.len() > MAX_MESSAGE_BYTES {
        return Err(HeartbeatParseError::TooLarge {
            limit: MAX_MESSAGE_BYTES,
        });
    }
    Ok(payload)
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: RegistryHandle,
    read_timeout: Duration,
) -> HeartbeatOutcome {
    let payload = match tokio::time::timeout(read_timeout, read_report(&mut stream)).await {
        Ok(Ok(payload)) => payload,
        Ok(Err(e)) => {
            warn!(%peer, error = %e, "heartbeat connection dropped");
            return HeartbeatOutcome::ReadFailed(e.to_string());
        }
        Err(_) => {
            warn!(%peer, timeout_ms = read_timeout.as_millis(), "heartbeat read timed out");
            return HeartbeatOutcome::ReadFailed("timed out".to_string());
        }
    };

    process_payload(&registry, &payload).await
}

/// Accepts heartbeat connections until shutdown
pub struct HeartbeatListener {
    listener: TcpListener,
    registry: RegistryHandle,
    read_timeout: Duration,
}

impl HeartbeatListener {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` if the address cannot be bound
    pub async fn bind(
        config: &HeartbeatConfig,
        registry: RegistryHandle,
    ) -> Result<Self, CoreError> {
        let listener = TcpListener::bind(&config.bind).await?;
        Ok(Self {
            listener,
            registry,
            read_timeout: config.read_timeout(),
        })
    }

    /// Address actually bound
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Io` if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr, CoreError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let addr = self.listener.local_addr().ok();
        info!(addr = ?addr, "heartbeat listener started");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            self.registry.clone(),
                            self.read_timeout,
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept heartbeat connection");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "heartbeat connection task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        drop(self.listener);
        let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending = connections.len(), "aborting unfinished heartbeat connections");
            connections.abort_all();
        }

        info!("heartbeat listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::NewInstance;
    use crate::store::MemoryStore;
    use tokio::io::AsyncWriteExt;

    async fn registry_with_server() -> (RegistryHandle, String) {
        let registry = RegistryHandle::spawn(Box::new(MemoryStore::new()), Vec::new(), 16);
        let instance = registry
            .insert(
                NewInstance {
                    server_id: "hb-test".to_string(),
                    public_address: "127.0.0.1".to_string(),
                    private_address: "127.0.0.1".to_string(),
                    port: 5100,
                    max_capacity: 10,
                    is_standby: false,
                },
                None,
            )
            .await
            .unwrap();
        registry
            .mark_provisioned(instance.id, "ctr".to_string())
            .await
            .unwrap();
        (registry, instance.server_id)
    }

    async fn wait_for_count(registry: &RegistryHandle, server_id: &str, count: u32) -> bool {
        for _ in 0..50 {
            if registry.by_server_id(server_id).await.unwrap().player_count == count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_process_payload_outcomes() {
        let (registry, server_id) = registry_with_server().await;

        let outcome =
            process_payload(&registry, br#"{"ServerId":"hb-test","PlayerCount":4}"#).await;
        assert_eq!(outcome, HeartbeatOutcome::Applied);
        assert_eq!(registry.by_server_id(&server_id).await.unwrap().player_count, 4);

        let outcome = process_payload(&registry, br#"{"ServerId":"ghost","PlayerCount":1}"#).await;
        assert_eq!(outcome, HeartbeatOutcome::UnknownServer("ghost".to_string()));

        let outcome = process_payload(&registry, b"not json").await;
        assert!(matches!(outcome, HeartbeatOutcome::Rejected(_)));
        assert_eq!(registry.by_server_id(&server_id).await.unwrap().player_count, 4);
    }

    #[tokio::test]
    async fn test_read_report_stops_at_first_line() {
        let mut bytes = HeartbeatReport::new("hb-test", 2).to_line().into_bytes();
        bytes.extend(std::iter::repeat_n(b'x', MAX_MESSAGE_BYTES * 2));

        let payload = read_report(&mut bytes.as_slice()).await.unwrap();
        let report = HeartbeatReport::parse(&payload).unwrap();
        assert_eq!(report.player_count, 2);

        let oversized = vec![b'x'; MAX_MESSAGE_BYTES + 1];
        let err = read_report(&mut oversized.as_slice()).await.unwrap_err();
        assert!(matches!(err, HeartbeatParseError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn test_listener_applies_reports_over_tcp() {
        let (registry, server_id) = registry_with_server().await;
        let config = HeartbeatConfig {
            bind: "127.0.0.1:0".to_string(),
            ..HeartbeatConfig::default()
        };
        let listener = HeartbeatListener::bind(&config, registry.clone()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listener.run(shutdown_rx));

        // Garbage on one connection does not disturb the next
        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(b"{{{{\n").await.unwrap();
        drop(bad);

        // Report terminated by EOF rather than newline
        let line = HeartbeatReport::new("hb-test", 6).to_line();
        let mut good = TcpStream::connect(addr).await.unwrap();
        good.write_all(line.trim_end().as_bytes()).await.unwrap();
        good.shutdown().await.unwrap();
        drop(good);
        assert!(
            wait_for_count(&registry, &server_id, 6).await,
            "heartbeat was not applied"
        );

        // Trailing bytes past the newline do not count against the limit
        let mut trailing = HeartbeatReport::new("hb-test", 7).to_line().into_bytes();
        trailing.extend(std::iter::repeat_n(b' ', MAX_MESSAGE_BYTES + 100));
        let mut chatty = TcpStream::connect(addr).await.unwrap();
        chatty.write_all(&trailing).await.unwrap();
        drop(chatty);
        assert!(
            wait_for_count(&registry, &server_id, 7).await,
            "report followed by extra bytes was not applied"
        );

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
