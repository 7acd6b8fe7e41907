use super::{http_client, MarketData, OrderGateway};
use crate::models::{OrderRequest, OrderResult, SymbolInfo, Tick, Timeframe};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw rate row as the terminal reports it (epoch seconds, terminal field names)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RawRate {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub tick_volume: f64,
    #[serde(default)]
    pub spread: i64,
    #[serde(default)]
    pub real_volume: f64,
}

/// Terminal login details
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub account: u64,
    pub password: String,
    pub server: String,
}

#[derive(Debug, Deserialize)]
struct InitializeResponse {
    initialized: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    authorized: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    selected: bool,
}

/// Client for the trading-terminal HTTP bridge
///
/// The bridge fronts a single terminal session: initialize/login before use,
/// shutdown when done.
#[derive(Clone)]
pub struct BridgeClient {
    client: Client,
    base_url: String,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Initialize the terminal and, when credentials are given, log in
    pub async fn connect(&self, credentials: Option<&Credentials>) -> Result<()> {
        let url = format!("{}/session/initialize", self.base_url);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "terminal initialize failed ({}): {}",
                status, body
            )));
        }

        let init: InitializeResponse = response.json().await?;
        if !init.initialized {
            return Err(Error::Authentication(format!(
                "terminal initialize failed: {}",
                init.error.unwrap_or_else(|| "unknown reason".to_string())
            )));
        }

        let Some(credentials) = credentials else {
            tracing::info!("✅ Terminal initialized (no login requested)");
            return Ok(());
        };

        let url = format!("{}/session/login", self.base_url);
        let login: LoginResponse = self
            .client
            .post(&url)
            .json(credentials)
            .send()
            .await?
            .json()
            .await?;

        if !login.authorized {
            return Err(Error::Authentication(format!(
                "login rejected for account {} on {}: {}",
                credentials.account,
                credentials.server,
                login.error.unwrap_or_else(|| "check account/password/server".to_string())
            )));
        }

        tracing::info!(
            account = credentials.account,
            server = %credentials.server,
            "✅ Logged in to terminal"
        );
        Ok(())
    }

    /// Release the terminal session
    pub async fn shutdown(&self) -> Result<()> {
        let url = format!("{}/session/shutdown", self.base_url);
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            tracing::warn!("Terminal shutdown returned {}", response.status());
        }
        Ok(())
    }
}

#[async_trait]
impl MarketData for BridgeClient {
    async fn rates(&self, symbol: &str, timeframe: Timeframe, count: usize) -> Result<Vec<RawRate>> {
        let url = format!("{}/rates", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol.to_string()),
                ("timeframe", timeframe.to_string()),
                ("count", count.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::NoData {
                symbol: symbol.to_string(),
                detail: format!("bridge error {}: {}", status, body),
            });
        }

        let rates: Option<Vec<RawRate>> = response.json().await?;
        Ok(rates.unwrap_or_default())
    }

    async fn tick(&self, symbol: &str) -> Result<Option<Tick>> {
        let url = format!("{}/symbols/{}/tick", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(response.error_for_status()?.json().await?)
    }

    async fn symbol_info(&self, symbol: &str) -> Result<SymbolInfo> {
        let url = format!("{}/symbols/{}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::SymbolUnavailable(symbol.to_string()));
        }

        Ok(response.error_for_status()?.json().await?)
    }

    async fn select_symbol(&self, symbol: &str) -> Result<bool> {
        let url = format!("{}/symbols/{}/select", self.base_url, symbol);
        let response: SelectResponse = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "enable": true }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.selected)
    }
}

#[async_trait]
impl OrderGateway for BridgeClient {
    async fn send_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let url = format!("{}/orders", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        let raw = serde_json::from_str::<serde_json::Value>(&body)
            .unwrap_or_else(|_| serde_json::Value::String(body.clone()));

        if !status.is_success() {
            tracing::warn!(%status, "Order endpoint returned non-success status");
        }

        Ok(OrderResult::from_response(raw))
    }
}
