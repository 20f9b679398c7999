//! Live order management against the OKX REST API

use super::{
    scale_in_contracts, stop_loss_price, trailing_activation_price, AlgoId, ContractSpec,
    ExchangePosition, Fill, OrderManager, Side,
};
use crate::okx::{
    CancelAlgoRequest, OkxClient, OrderRequest, SetLeverageRequest, StopLossRequest,
    TrailingStopRequest,
};
use crate::telemetry::{increment_counter, CounterMetric};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Places real (or demo, when the client is simulated) orders
pub struct LiveOrderManager {
    client: OkxClient,
    td_mode: String,
    specs: RwLock<HashMap<String, ContractSpec>>,
}

/// 32-char alphanumeric id accepted by `clOrdId` / `algoClOrdId`
fn client_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Market order on the short side of a hedge-mode account
fn market_order_request(symbol: &str, side: Side, contracts: Decimal, td_mode: &str) -> OrderRequest {
    OrderRequest {
        inst_id: symbol.to_string(),
        td_mode: td_mode.to_string(),
        side: side.as_str().to_string(),
        pos_side: "short".to_string(),
        ord_type: "market".to_string(),
        sz: contracts.normalize().to_string(),
        px: None,
        cl_ord_id: Some(client_order_id()),
    }
}

/// `move_order_stop` buying back the whole short
fn trailing_stop_request(
    symbol: &str,
    pos: &ExchangePosition,
    spec: &ContractSpec,
    activation: Decimal,
    callback: Decimal,
    td_mode: &str,
) -> TrailingStopRequest {
    let active_px = spec.round_price(trailing_activation_price(pos.avg_price, activation));
    TrailingStopRequest {
        inst_id: symbol.to_string(),
        td_mode: td_mode.to_string(),
        side: Side::Buy.as_str().to_string(),
        pos_side: "short".to_string(),
        ord_type: "move_order_stop".to_string(),
        sz: pos.contracts.normalize().to_string(),
        callback_ratio: callback.normalize().to_string(),
        active_px: active_px.normalize().to_string(),
        algo_cl_ord_id: Some(client_order_id()),
    }
}

/// Conditional market buy of the whole short once last price reaches the stop
fn stop_loss_request(
    symbol: &str,
    pos: &ExchangePosition,
    spec: &ContractSpec,
    stop_loss_pct: Decimal,
    td_mode: &str,
) -> StopLossRequest {
    let trigger = spec.round_price(stop_loss_price(pos.avg_price, stop_loss_pct));
    StopLossRequest {
        inst_id: symbol.to_string(),
        td_mode: td_mode.to_string(),
        side: Side::Buy.as_str().to_string(),
        pos_side: "short".to_string(),
        ord_type: "conditional".to_string(),
        sz: pos.contracts.normalize().to_string(),
        sl_trigger_px: trigger.normalize().to_string(),
        sl_ord_px: "-1".to_string(),
        sl_trigger_px_type: "last".to_string(),
        algo_cl_ord_id: Some(client_order_id()),
    }
}

impl LiveOrderManager {
    pub fn new(client: OkxClient, td_mode: impl Into<String>) -> Self {
        Self {
            client,
            td_mode: td_mode.into(),
            specs: RwLock::new(HashMap::new()),
        }
    }

    /// Contract parameters, fetched once per symbol
    async fn spec(&self, symbol: &str) -> anyhow::Result<ContractSpec> {
        if let Some(spec) = self.specs.read().await.get(symbol) {
            return Ok(*spec);
        }
        let inst = self.client.swap_instrument(symbol).await?;
        let spec = ContractSpec::from(&inst);
        self.specs.write().await.insert(symbol.to_string(), spec);
        Ok(spec)
    }

    async fn cancel_algo(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()> {
        self.client
            .cancel_algos(&[CancelAlgoRequest {
                inst_id: symbol.to_string(),
                algo_id: algo_id.to_string(),
            }])
            .await
            .with_context(|| format!("cancel algo {} on {}", algo_id, symbol))
    }

    /// Submit a market order and build a fill at the last traded price
    async fn market_order(
        &self,
        symbol: &str,
        side: Side,
        contracts: Decimal,
        spec: &ContractSpec,
    ) -> anyhow::Result<Fill> {
        let price = self.client.ticker(symbol).await?.last;
        let req = market_order_request(symbol, side, contracts, &self.td_mode);

        let ack = match self.client.place_order(&req).await {
            Ok(ack) => ack,
            Err(e) => {
                increment_counter(CounterMetric::OrderFailures);
                return Err(e).with_context(|| format!("{} {} {}", side.as_str(), contracts, symbol));
            }
        };

        tracing::info!(
            symbol,
            side = side.as_str(),
            contracts = %contracts,
            price = %price,
            ord_id = %ack.ord_id,
            cl_ord_id = %ack.cl_ord_id,
            "Order placed"
        );

        Ok(Fill {
            order_id: ack.ord_id,
            symbol: symbol.to_string(),
            side,
            price,
            contracts,
            quantity: spec.quantity(contracts),
            fees: Decimal::ZERO,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl OrderManager for LiveOrderManager {
    async fn open_short(
        &self,
        symbol: &str,
        usdt_size: Decimal,
        leverage: u32,
    ) -> anyhow::Result<Fill> {
        let spec = self.spec(symbol).await?;

        self.client
            .set_leverage(&SetLeverageRequest {
                inst_id: symbol.to_string(),
                lever: leverage.to_string(),
                mgn_mode: self.td_mode.clone(),
                pos_side: "short".to_string(),
            })
            .await
            .with_context(|| format!("set leverage {}x on {}", leverage, symbol))?;

        let price = self.client.ticker(symbol).await?.last;
        let contracts = spec
            .contracts_for(usdt_size, price)
            .with_context(|| format!("cannot size {} USDT of {} at {}", usdt_size, symbol, price))?;

        self.market_order(symbol, Side::Sell, contracts, &spec).await
    }

    async fn add_position(&self, symbol: &str, factor: Decimal) -> anyhow::Result<Fill> {
        let spec = self.spec(symbol).await?;
        let current = self
            .position(symbol)
            .await?
            .with_context(|| format!("no open short on {}", symbol))?;
        let contracts = scale_in_contracts(current.contracts, factor, &spec)
            .with_context(|| format!("invalid scale-in factor {} for {}", factor, symbol))?;

        self.market_order(symbol, Side::Sell, contracts, &spec).await
    }

    async fn set_trailing_tp(
        &self,
        symbol: &str,
        activation: Decimal,
        callback: Decimal,
    ) -> anyhow::Result<AlgoId> {
        let spec = self.spec(symbol).await?;
        let pos = self
            .position(symbol)
            .await?
            .with_context(|| format!("no open short on {}", symbol))?;
        let req = trailing_stop_request(symbol, &pos, &spec, activation, callback, &self.td_mode);

        let ack = match self.client.place_trailing_stop(&req).await {
            Ok(ack) => ack,
            Err(e) => {
                increment_counter(CounterMetric::OrderFailures);
                return Err(e).with_context(|| format!("trailing stop on {}", symbol));
            }
        };

        tracing::info!(
            symbol,
            algo_id = %ack.algo_id,
            active_px = %req.active_px,
            callback = %callback,
            contracts = %pos.contracts,
            "Trailing take-profit armed"
        );
        Ok(ack.algo_id)
    }

    async fn cancel_trailing_tp(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()> {
        self.cancel_algo(symbol, algo_id).await?;
        tracing::info!(symbol, algo_id, "Trailing take-profit cancelled");
        Ok(())
    }

    async fn set_stop_loss(&self, symbol: &str, stop_loss_pct: Decimal) -> anyhow::Result<AlgoId> {
        let spec = self.spec(symbol).await?;
        let pos = self
            .position(symbol)
            .await?
            .with_context(|| format!("no open short on {}", symbol))?;
        let req = stop_loss_request(symbol, &pos, &spec, stop_loss_pct, &self.td_mode);

        let ack = match self.client.place_stop_loss(&req).await {
            Ok(ack) => ack,
            Err(e) => {
                increment_counter(CounterMetric::OrderFailures);
                return Err(e).with_context(|| format!("stop-loss on {}", symbol));
            }
        };

        tracing::info!(
            symbol,
            algo_id = %ack.algo_id,
            trigger = %req.sl_trigger_px,
            contracts = %pos.contracts,
            "Stop-loss armed"
        );
        Ok(ack.algo_id)
    }

    async fn cancel_stop_loss(&self, symbol: &str, algo_id: &str) -> anyhow::Result<()> {
        self.cancel_algo(symbol, algo_id).await?;
        tracing::info!(symbol, algo_id, "Stop-loss cancelled");
        Ok(())
    }

    async fn position(&self, symbol: &str) -> anyhow::Result<Option<ExchangePosition>> {
        let raw = self.client.positions(Some(symbol)).await?;
        Ok(raw
            .iter()
            .find(|p| p.inst_id == symbol && p.is_short())
            .map(ExchangePosition::from))
    }

    async fn positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
        let raw = self.client.positions(None).await?;
        Ok(raw
            .iter()
            .filter(|p| p.is_short())
            .map(ExchangePosition::from)
            .collect())
    }

    async fn account_equity(&self) -> anyhow::Result<Decimal> {
        Ok(self.client.balance().await?.total_eq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn position() -> ExchangePosition {
        ExchangePosition {
            symbol: "DOGE-USDT-SWAP".into(),
            contracts: dec!(15.0),
            avg_price: dec!(0.123456),
            unrealized_pnl: dec!(0),
        }
    }

    fn spec() -> ContractSpec {
        ContractSpec {
            ct_val: dec!(1000),
            lot_sz: dec!(1),
            min_sz: dec!(1),
            tick_sz: dec!(0.00001),
        }
    }

    /// Serialize and drop the random client id after checking its shape
    fn body<T: serde::Serialize>(req: &T, id_key: &str) -> serde_json::Value {
        let mut value = serde_json::to_value(req).unwrap();
        let id = value.as_object_mut().unwrap().remove(id_key).unwrap();
        assert_eq!(id.as_str().unwrap().len(), 32);
        value
    }

    #[test]
    fn test_market_sell_request_body() {
        let req = market_order_request("DOGE-USDT-SWAP", Side::Sell, dec!(12.50), "isolated");
        assert_eq!(
            body(&req, "clOrdId"),
            json!({
                "instId": "DOGE-USDT-SWAP",
                "tdMode": "isolated",
                "side": "sell",
                "posSide": "short",
                "ordType": "market",
                "sz": "12.5"
            })
        );
    }

    #[test]
    fn test_trailing_stop_request_body() {
        let req = trailing_stop_request(
            "DOGE-USDT-SWAP",
            &position(),
            &spec(),
            dec!(0.01),
            dec!(0.002),
            "isolated",
        );
        // 0.123456 * 0.99 = 0.12222144, rounded to the 0.00001 tick
        assert_eq!(
            body(&req, "algoClOrdId"),
            json!({
                "instId": "DOGE-USDT-SWAP",
                "tdMode": "isolated",
                "side": "buy",
                "posSide": "short",
                "ordType": "move_order_stop",
                "sz": "15",
                "callbackRatio": "0.002",
                "activePx": "0.12222"
            })
        );
    }

    #[test]
    fn test_stop_loss_request_body() {
        let req = stop_loss_request("DOGE-USDT-SWAP", &position(), &spec(), dec!(30), "cross");
        // 0.123456 * 1.3 = 0.1604928
        assert_eq!(
            body(&req, "algoClOrdId"),
            json!({
                "instId": "DOGE-USDT-SWAP",
                "tdMode": "cross",
                "side": "buy",
                "posSide": "short",
                "ordType": "conditional",
                "sz": "15",
                "slTriggerPx": "0.16049",
                "slOrdPx": "-1",
                "slTriggerPxType": "last"
            })
        );
    }

    #[test]
    fn test_client_order_id_format() {
        let id = client_order_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, client_order_id());
    }

    #[tokio::test]
    async fn test_private_calls_require_credentials() {
        let client = OkxClient::new(&ExchangeConfig::default(), None).unwrap();
        let manager = LiveOrderManager::new(client, "isolated");
        let err = manager.account_equity().await.unwrap_err();
        assert!(err.to_string().contains("missing OKX API credentials"));
    }
}
