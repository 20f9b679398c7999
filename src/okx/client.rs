//! OKX v5 REST client
//!
//! Public endpoints are sent unsigned. Private endpoints carry the
//! `OK-ACCESS-*` headers and, in demo mode, `x-simulated-trading: 1`.
//! Connect and timeout failures are retried twice before giving up.

use super::auth::{self, Credentials};
use super::types::*;
use crate::config::ExchangeConfig;
use crate::feed::Candle;
use crate::telemetry::{record_latency, LatencyMetric};
use chrono::Utc;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Extra attempts after a transient transport failure
const MAX_RETRIES: u32 = 2;
/// Pause between attempts
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Client for the OKX v5 REST API
#[derive(Clone)]
pub struct OkxClient {
    base_url: String,
    simulated: bool,
    credentials: Option<Credentials>,
    http: Client,
}

impl OkxClient {
    /// Create a client; `credentials` may be `None` for public data only
    pub fn new(config: &ExchangeConfig, credentials: Option<Credentials>) -> Result<Self, OkxError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.rest_base.trim_end_matches('/').to_string(),
            simulated: config.simulated,
            credentials,
            http,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    // ---- public market data ----

    /// List instruments of a type, optionally a single one
    pub async fn instruments(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<Vec<Instrument>, OkxError> {
        let mut query = vec![("instType", inst_type.to_string())];
        if let Some(id) = inst_id {
            query.push(("instId", id.to_string()));
        }
        self.execute(Method::GET, "/api/v5/public/instruments", &query, None, false)
            .await
    }

    /// Fetch a single swap instrument
    pub async fn swap_instrument(&self, inst_id: &str) -> Result<Instrument, OkxError> {
        self.instruments("SWAP", Some(inst_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OkxError::InstrumentNotFound(inst_id.to_string()))
    }

    /// Latest traded price
    pub async fn ticker(&self, inst_id: &str) -> Result<Ticker, OkxError> {
        let query = [("instId", inst_id.to_string())];
        let tickers: Vec<Ticker> = self
            .execute(Method::GET, "/api/v5/market/ticker", &query, None, false)
            .await?;
        tickers
            .into_iter()
            .next()
            .ok_or_else(|| OkxError::EmptyResponse("/api/v5/market/ticker".into()))
    }

    /// Recent candles, newest first
    pub async fn candles(
        &self,
        inst_id: &str,
        bar: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, OkxError> {
        let query = [
            ("instId", inst_id.to_string()),
            ("bar", bar.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<String>> = self
            .execute(Method::GET, "/api/v5/market/candles", &query, None, false)
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| Candle::from_row(inst_id, row.as_slice()))
            .collect())
    }

    // ---- private account / trade ----

    pub async fn balance(&self) -> Result<AccountBalance, OkxError> {
        let balances: Vec<AccountBalance> = self
            .execute(Method::GET, "/api/v5/account/balance", &[], None, true)
            .await?;
        balances
            .into_iter()
            .next()
            .ok_or_else(|| OkxError::EmptyResponse("/api/v5/account/balance".into()))
    }

    /// Open swap positions, optionally for one instrument
    pub async fn positions(&self, inst_id: Option<&str>) -> Result<Vec<RawPosition>, OkxError> {
        let mut query = vec![("instType", "SWAP".to_string())];
        if let Some(id) = inst_id {
            query.push(("instId", id.to_string()));
        }
        self.execute(Method::GET, "/api/v5/account/positions", &query, None, true)
            .await
    }

    pub async fn set_leverage(&self, req: &SetLeverageRequest) -> Result<(), OkxError> {
        let _: Vec<serde_json::Value> = self
            .post("/api/v5/account/set-leverage", req)
            .await?;
        Ok(())
    }

    pub async fn place_order(&self, req: &OrderRequest) -> Result<OrderAck, OkxError> {
        let acks: Vec<OrderAck> = self.post("/api/v5/trade/order", req).await?;
        let ack = acks
            .into_iter()
            .next()
            .ok_or_else(|| OkxError::EmptyResponse("/api/v5/trade/order".into()))?;
        check_item(&ack.s_code, &ack.s_msg)?;
        Ok(ack)
    }

    pub async fn place_trailing_stop(&self, req: &TrailingStopRequest) -> Result<AlgoAck, OkxError> {
        self.place_algo(req).await
    }

    pub async fn place_stop_loss(&self, req: &StopLossRequest) -> Result<AlgoAck, OkxError> {
        self.place_algo(req).await
    }

    async fn place_algo<B: Serialize>(&self, req: &B) -> Result<AlgoAck, OkxError> {
        let acks: Vec<AlgoAck> = self.post("/api/v5/trade/order-algo", req).await?;
        let ack = acks
            .into_iter()
            .next()
            .ok_or_else(|| OkxError::EmptyResponse("/api/v5/trade/order-algo".into()))?;
        check_item(&ack.s_code, &ack.s_msg)?;
        Ok(ack)
    }

    pub async fn cancel_algos(&self, reqs: &[CancelAlgoRequest]) -> Result<(), OkxError> {
        let acks: Vec<AlgoAck> = self.post("/api/v5/trade/cancel-algos", reqs).await?;
        for ack in &acks {
            check_item(&ack.s_code, &ack.s_msg)?;
        }
        Ok(())
    }

    // ---- plumbing ----

    async fn post<T, B>(&self, path: &str, body: &B) -> Result<Vec<T>, OkxError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_string(body)?;
        self.execute(Method::POST, path, &[], Some(body), true).await
    }

    /// Send a request, retrying transient transport failures
    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<String>,
        signed: bool,
    ) -> Result<Vec<T>, OkxError> {
        let mut attempt = 0;
        loop {
            match self
                .execute_once(method.clone(), path, query, body.as_deref(), signed)
                .await
            {
                Err(OkxError::Http(e)) if is_transient(&e) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        path,
                        attempt,
                        max = MAX_RETRIES + 1,
                        "OKX request failed, retrying"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                other => return other,
            }
        }
    }

    async fn execute_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&str>,
        signed: bool,
    ) -> Result<Vec<T>, OkxError> {
        let (url, request_path) = self.build_url(path, query)?;
        let mut request = self.http.request(method.clone(), url);

        if signed {
            let creds = self
                .credentials
                .as_ref()
                .ok_or(OkxError::MissingCredentials)?;
            let ts = auth::timestamp(Utc::now());
            let signature = creds.sign(&ts, method.as_str(), &request_path, body.unwrap_or(""))?;
            request = request
                .header("OK-ACCESS-KEY", &creds.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", ts)
                .header("OK-ACCESS-PASSPHRASE", creds.passphrase());
        }
        if self.simulated {
            request = request.header("x-simulated-trading", "1");
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json")
                .body(body.to_string());
        }

        let started = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        record_latency(LatencyMetric::RestRequest, started.elapsed());

        tracing::debug!(%method, path = %request_path, status = status.as_u16(), "OKX response");
        decode_envelope(status.as_u16(), &text)
    }

    /// Full URL plus the path-and-query string that gets signed
    fn build_url(&self, path: &str, query: &[(&str, String)]) -> Result<(Url, String), OkxError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| OkxError::InvalidUrl(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        let request_path = match url.query() {
            Some(q) if !q.is_empty() => format!("{}?{}", url.path(), q),
            _ => url.path().to_string(),
        };
        Ok((url, request_path))
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

/// Decode the `{code, msg, data}` envelope into typed items
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: u16,
    text: &str,
) -> Result<Vec<T>, OkxError> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            if (200..300).contains(&status) {
                return Err(OkxError::Decode(e));
            }
            return Err(OkxError::Status {
                status,
                body: text.chars().take(512).collect(),
            });
        }
    };

    if envelope.code != "0" {
        // Batch endpoints put the real reason in the first item
        let item_msg = envelope
            .data
            .first()
            .and_then(|v| v.get("sMsg"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty());
        return Err(OkxError::Api {
            code: envelope.code,
            msg: item_msg.map(str::to_string).unwrap_or(envelope.msg),
        });
    }

    envelope
        .data
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(OkxError::from))
        .collect()
}
