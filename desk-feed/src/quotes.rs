//! REST quote client
//!
//! Price lookups for ledger initialization and reconciliation. The endpoint
//! answers `GET {base}/quote?symbol=SYM` with the provider's short field
//! names: `c` for the current price, `pc` for the previous close.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use desk_core::{DeskError, DeskResult, PriceSource, Quote};

/// Env var holding the quote endpoint base URL
const QUOTE_URL_ENV: &str = "DESK_QUOTE_URL";

/// Request timeout for quote lookups
const QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Decimal,
    /// Previous close
    #[serde(default)]
    pc: Option<Decimal>,
}

/// Quote endpoint client
#[derive(Debug, Clone)]
pub struct QuoteClient {
    client: Client,
    base_url: String,
}

impl QuoteClient {
    /// Create a client against an explicit base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(QUOTE_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Create a client from the `DESK_QUOTE_URL` environment variable
    pub fn from_env() -> DeskResult<Self> {
        let base_url = std::env::var(QUOTE_URL_ENV)
            .map_err(|_| DeskError::internal(format!("{} not set", QUOTE_URL_ENV)))?;
        Ok(Self::new(base_url))
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PriceSource for QuoteClient {
    #[instrument(skip(self))]
    async fn quote(&self, symbol: &str) -> anyhow::Result<Quote> {
        let url = format!("{}/quote?symbol={}", self.base_url, symbol);
        debug!("Fetching quote from: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Quote request for {} failed: {}", symbol, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Quote endpoint returned {} for {}: {}", status, symbol, body);
        }

        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse quote for {}: {}", symbol, e))?;

        Ok(Quote {
            price: quote.c,
            prev_close: quote.pc,
        })
    }
}
