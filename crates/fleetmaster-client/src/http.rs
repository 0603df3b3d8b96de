//! HTTP client for the fleetmaster daemon

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use fleetmaster_api::{
    requests::{AllocateRequest, CreateServerRequest, PlayerCountRequest},
    responses::{
        AllocateResponse, FleetActionResponse, HealthResponse, ReconcileSummary,
        ServerHistoryResponse, ServerSummary,
    },
};

use crate::error::{ClientError, Result};

/// HTTP client for communicating with the fleetmaster daemon
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a new HTTP client
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    ///
    /// # Example
    /// ```no_run
    /// use fleetmaster_client::HttpClient;
    ///
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    /// Create a new HTTP client with custom `reqwest::Client`
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid.
    pub fn with_client(base_url: impl AsRef<str>, client: Client) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;
        Ok(Self { client, base_url })
    }

    /// Build a full URL from a path
    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(ClientError::Url)
    }

    /// Turn a non-success status into `ClientError::Rejected`
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClientError::rejected(status, &body))
    }

    /// Perform a GET request and deserialize the response
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Perform a POST request with JSON body
    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: impl serde::Serialize,
    ) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.post(url).json(&body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Perform a PUT request with JSON body
    async fn put<T: DeserializeOwned>(&self, path: &str, body: impl serde::Serialize) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.put(url).json(&body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Perform a DELETE request
    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        let response = self.client.delete(url).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // System endpoints

    /// Get daemon health status
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    // Server endpoints

    /// List live servers
    ///
    /// # Example
    /// ```no_run
    /// # use fleetmaster_client::HttpClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = HttpClient::new("http://localhost:8080")?;
    /// let full = client.list_servers().full().send().await?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn list_servers(&self) -> ListServersBuilder {
        ListServersBuilder::new(self.clone())
    }

    /// Get the live server on a port
    ///
    /// # Errors
    /// Returns an error if the request fails or no server uses the port.
    pub async fn get_server(&self, port: u16) -> Result<ServerSummary> {
        self.get(&format!("/servers/{port}")).await
    }

    /// Get a live server by id
    ///
    /// # Errors
    /// Returns an error if the request fails or no live server has the id.
    pub async fn get_server_by_id(&self, server_id: &str) -> Result<ServerSummary> {
        self.get(&format!("/servers/by-id/{server_id}")).await
    }

    /// A server's occupancy log, removed servers included
    ///
    /// # Errors
    /// Returns an error if the request fails or no server ever had the id.
    pub async fn server_history(&self, server_id: &str) -> Result<ServerHistoryResponse> {
        self.get(&format!("/servers/by-id/{server_id}/history"))
            .await
    }

    /// Provision a server
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon refuses to create
    /// a server.
    pub async fn create_server(&self, standby: bool, port: Option<u16>) -> Result<ServerSummary> {
        self.post("/servers", CreateServerRequest { standby, port })
            .await
    }

    /// Tear down the server on a port
    ///
    /// # Errors
    /// Returns an error if the request fails or no server uses the port.
    pub async fn remove_server(&self, port: u16) -> Result<ServerSummary> {
        self.delete(&format!("/servers/{port}")).await
    }

    /// Overwrite a server's player count
    ///
    /// # Errors
    /// Returns an error if the request fails or no server uses the port.
    pub async fn override_player_count(
        &self,
        port: u16,
        player_count: u32,
    ) -> Result<ServerSummary> {
        self.put(
            &format!("/servers/{port}/player-count"),
            PlayerCountRequest { player_count },
        )
        .await
    }

    /// Report a player count for a server over HTTP
    ///
    /// # Errors
    /// Returns an error if the request fails or the server is unknown.
    pub async fn report_player_count(&self, server_id: &str, player_count: u32) -> Result<()> {
        let url = self.url(&format!("/servers/{server_id}/player-count"))?;
        let response = self
            .client
            .post(url)
            .json(&PlayerCountRequest { player_count })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Allocation

    /// Ask for a seat for a party
    ///
    /// Capacity and policy rejections come back as `AllocateResponse`
    /// variants rather than errors.
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an
    /// unexpected error.
    pub async fn allocate(
        &self,
        party_size: u32,
        identity: Option<String>,
    ) -> Result<AllocateResponse> {
        let url = self.url("/allocate")?;
        let response = self
            .client
            .post(url)
            .json(&AllocateRequest {
                party_size,
                identity,
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::FORBIDDEN | StatusCode::SERVICE_UNAVAILABLE => Ok(response.json().await?),
            _ => Ok(Self::check(response).await?.json().await?),
        }
    }

    // Fleet endpoints

    /// Run a reconciliation pass
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        self.post("/fleet/reconcile", serde_json::json!({})).await
    }

    /// Start every server's container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn start_all(&self) -> Result<FleetActionResponse> {
        self.post("/fleet/start-all", serde_json::json!({})).await
    }

    /// Stop every managed container
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn stop_all(&self) -> Result<FleetActionResponse> {
        self.post("/fleet/stop-all", serde_json::json!({})).await
    }
}

/// Builder for listing servers with filters
#[derive(Debug, Clone)]
pub struct ListServersBuilder {
    client: HttpClient,
    full: bool,
}

impl ListServersBuilder {
    fn new(client: HttpClient) -> Self {
        Self {
            client,
            full: false,
        }
    }

    /// Only servers at or over capacity
    #[must_use]
    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }

    fn request_url(&self) -> Result<Url> {
        let mut url = self.client.url("/servers")?;
        if self.full {
            url.query_pairs_mut().append_pair("full", "true");
        }
        Ok(url)
    }

    /// Execute the request
    ///
    /// # Errors
    /// Returns an error if the request fails or the daemon returns an error.
    pub async fn send(self) -> Result<Vec<ServerSummary>> {
        let url = self.request_url()?;
        let response = self.client.client.get(url).send().await?;
        Ok(HttpClient::check(response).await?.json().await?)
    }
}
