use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, Endpoint};
use crate::model::{AdjustmentRecord, ClickResponse, PointsConfig, RawPointsAccount};

/// The points service. Every method is an independent failure domain.
#[async_trait]
pub trait PointsApi: Send + Sync {
    async fn leaderboard(&self) -> EngineResult<Vec<RawPointsAccount>>;
    async fn config(&self) -> EngineResult<PointsConfig>;
    async fn account(&self, wallet: &str) -> EngineResult<RawPointsAccount>;
    async fn adjustments(&self, wallet: &str) -> EngineResult<Vec<AdjustmentRecord>>;
    async fn click(&self, wallet: &str) -> EngineResult<ClickResponse>;
}

#[derive(Clone)]
pub struct HttpPointsApi {
    base_url: String,
    client: Client,
}

impl HttpPointsApi {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let client = ClientBuilder::new()
            .timeout(config.api_timeout())
            .connect_timeout(config.api_connect_timeout())
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| EngineError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(config.api.base_url.clone(), client))
    }

    pub fn with_client(base_url: String, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        wallet: Option<&str>,
    ) -> EngineResult<T> {
        debug_assert_eq!(endpoint.takes_wallet(), wallet.is_some());
        let mut request = self.client.get(self.url(endpoint));
        if let Some(wallet) = wallet {
            request = request.query(&[("wallet", wallet)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::network(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::network(endpoint, format!("HTTP error: {}", status)));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| EngineError::network(endpoint, format!("invalid body: {}", e)))?;

        debug!(%endpoint, "fetched");
        Ok(body)
    }
}

#[async_trait]
impl PointsApi for HttpPointsApi {
    #[instrument(skip(self))]
    async fn leaderboard(&self) -> EngineResult<Vec<RawPointsAccount>> {
        self.get_json(Endpoint::Leaderboard, None).await
    }

    #[instrument(skip(self))]
    async fn config(&self) -> EngineResult<PointsConfig> {
        self.get_json(Endpoint::Config, None).await
    }

    #[instrument(skip(self))]
    async fn account(&self, wallet: &str) -> EngineResult<RawPointsAccount> {
        self.get_json(Endpoint::Account, Some(wallet)).await
    }

    #[instrument(skip(self))]
    async fn adjustments(&self, wallet: &str) -> EngineResult<Vec<AdjustmentRecord>> {
        self.get_json(Endpoint::Adjustments, Some(wallet)).await
    }

    #[instrument(skip(self))]
    async fn click(&self, wallet: &str) -> EngineResult<ClickResponse> {
        self.get_json(Endpoint::Click, Some(wallet)).await
    }
}
