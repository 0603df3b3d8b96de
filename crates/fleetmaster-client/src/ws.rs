//! WebSocket client for the fleetmaster daemon

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use fleetmaster_api::events::FleetEvent;

use crate::error::{ClientError, Result};

/// WebSocket client for receiving live events from the fleetmaster daemon
#[derive(Debug)]
pub struct WsClient {
    url: Url,
    receiver: mpsc::Receiver<FleetEvent>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl WsClient {
    /// Connect to the WebSocket endpoint
    ///
    /// Automatically reconnects on connection loss with exponential backoff.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetmaster_client::WsClient;
    /// use fleetmaster_api::events::FleetEvent;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut client = WsClient::connect("ws://localhost:8080/ws/events").await?;
    ///
    /// while let Some(event) = client.recv().await {
    ///     println!("{}: {event:?}", event.server_id());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[allow(clippy::unused_async)]
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        let (tx, rx) = mpsc::channel(100);

        let task_url = url.clone();
        let task_handle = tokio::spawn(async move {
            Self::connection_loop(task_url, tx).await;
        });

        Ok(Self {
            url,
            receiver: rx,
            _task_handle: task_handle,
        })
    }

    /// Endpoint this client is attached to
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Receive the next event from the stream
    ///
    /// Returns `None` when the connection is closed and cannot be reconnected.
    pub async fn recv(&mut self) -> Option<FleetEvent> {
        self.receiver.recv().await
    }

    /// Connection loop with auto-reconnection
    async fn connection_loop(url: Url, tx: mpsc::Sender<FleetEvent>) {
        let mut backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(60);

        loop {
            match Self::connect_and_receive(&url, &tx).await {
                Ok(()) => {
                    tracing::info!("event receiver dropped, closing stream");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, ?backoff, "event stream lost, reconnecting");
                    sleep(backoff).await;

                    // Exponential backoff
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    }

    /// Connect and receive messages
    async fn connect_and_receive(url: &Url, tx: &mpsc::Sender<FleetEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(url.as_str()).await?;

        tracing::info!(%url, "event stream connected");

        let (_write, mut read) = ws_stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg?;

            match msg {
                Message::Text(text) => match parse_event(&text) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse fleet event");
                    }
                },
                Message::Close(_) => {
                    return Err(ClientError::StreamClosed("daemon sent close frame"));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }

        Err(ClientError::StreamClosed("stream ended"))
    }
}

fn parse_event(text: &str) -> Result<FleetEvent> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event() {
        let event = parse_event(
            r#"{"type":"OccupancyChanged","serverId":"abc","playerCount":3,"maxCapacity":8,"source":"heartbeat"}"#,
        )
        .unwrap();
        assert_eq!(event.server_id(), "abc");
        assert!(matches!(
            event,
            FleetEvent::OccupancyChanged { player_count: 3, .. }
        ));
        assert!(matches!(
            parse_event(r#"{"type":"HostRebooted"}"#),
            Err(ClientError::BadEvent(_))
        ));
    }

    #[test]
    fn test_url_parsing() {
        let url = Url::parse("ws://localhost:8080/ws/events");
        assert!(url.is_ok());
    }
}
