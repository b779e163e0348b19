//! EVM JSON-RPC client for the `web3` domain.
//!
//! Each configured network is polled independently. A network whose RPC
//! endpoint fails is reported offline; the domain itself only fails when
//! no network is configured at all.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use opsboard_core::{
    Domain, GasPrice, HealthStatus, Snapshot, SnapshotData, Trend, Web3Network,
};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{SourceError, SourceResult};
use crate::source::{BoxFuture, MetricSource};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const WEI_PER_GWEI: f64 = 1_000_000_000.0;

/// Priority fee assumed when the node does not support `eth_maxPriorityFeePerGas`.
const FALLBACK_PRIORITY_FEE_WEI: u128 = 1_500_000_000;

/// Relative change in average gas price that counts as a trend.
const GAS_TREND_BAND: f64 = 0.05;

/// One EVM network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Web3NetworkConfig {
    pub id: String,
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    /// Block time used when the two latest blocks cannot be compared.
    #[serde(default = "default_block_time_secs")]
    pub default_block_time_secs: f64,
}

fn default_block_time_secs() -> f64 {
    12.0
}

impl Web3NetworkConfig {
    pub fn ethereum(rpc_url: impl Into<String>) -> Self {
        Self {
            id: "ethereum".to_string(),
            name: "Ethereum".to_string(),
            chain_id: 1,
            rpc_url: rpc_url.into(),
            default_block_time_secs: 12.0,
        }
    }

    pub fn polygon(rpc_url: impl Into<String>) -> Self {
        Self {
            id: "polygon".to_string(),
            name: "Polygon".to_string(),
            chain_id: 137,
            rpc_url: rpc_url.into(),
            default_block_time_secs: 2.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    timestamp: String,
    #[serde(default)]
    base_fee_per_gas: Option<String>,
    #[serde(default)]
    transactions: Vec<Value>,
}

/// Blockchain network source.
pub struct Web3Source {
    client: Client,
    networks: Vec<Web3NetworkConfig>,
    /// Last average gas price per network id.
    last_gas: Mutex<HashMap<String, f64>>,
}

impl Web3Source {
    pub fn new(networks: Vec<Web3NetworkConfig>) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            networks,
            last_gas: Mutex::new(HashMap::new()),
        })
    }

    async fn call(&self, url: &str, method: &str, params: Value) -> SourceResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let rpc: RpcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("{method}: {e}")))?;

        if let Some(err) = rpc.error {
            return Err(SourceError::Rpc(format!(
                "{method}: {} (code {})",
                err.message, err.code
            )));
        }
        rpc.result
            .filter(|v| !v.is_null())
            .ok_or_else(|| SourceError::Rpc(format!("{method}: empty result")))
    }

    async fn call_quantity(&self, url: &str, method: &str) -> SourceResult<u128> {
        let value = self.call(url, method, json!([])).await?;
        parse_quantity(value.as_str().unwrap_or_default())
    }

    async fn block(&self, url: &str, number: u64) -> SourceResult<RawBlock> {
        let value = self
            .call(
                url,
                "eth_getBlockByNumber",
                json!([format!("{number:#x}"), false]),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn network(&self, config: &Web3NetworkConfig) -> SourceResult<Web3Network> {
        let url = config.rpc_url.as_str();
        let block_number = self.call_quantity(url, "eth_blockNumber").await? as u64;

        let (latest, previous, gas_price, priority_fee) = tokio::join!(
            self.block(url, block_number),
            self.block(url, block_number.saturating_sub(1)),
            self.call_quantity(url, "eth_gasPrice"),
            self.call_quantity(url, "eth_maxPriorityFeePerGas"),
        );
        let latest = latest?;
        let gas_price = gas_price?;
        let priority_fee = priority_fee.unwrap_or(FALLBACK_PRIORITY_FEE_WEI);

        let block_time = match previous {
            Ok(previous) => {
                let delta = parse_quantity(&latest.timestamp)?
                    .saturating_sub(parse_quantity(&previous.timestamp)?);
                if delta == 0 {
                    config.default_block_time_secs
                } else {
                    delta as f64
                }
            }
            Err(_) => config.default_block_time_secs,
        };

        let base_fee = latest
            .base_fee_per_gas
            .as_deref()
            .map(parse_quantity)
            .transpose()?;
        let gas = gas_tiers(gas_price, base_fee, priority_fee);
        let gas_trend = self.gas_trend(&config.id, gas.average);

        Ok(Web3Network {
            id: config.id.clone(),
            name: config.name.clone(),
            chain_id: config.chain_id,
            status: HealthStatus::Healthy,
            block_number,
            block_time,
            tps: tps(latest.transactions.len(), block_time),
            gas_price: gas,
            gas_trend,
        })
    }

    fn gas_trend(&self, network_id: &str, average: f64) -> Trend {
        let mut last = self.last_gas.lock();
        let trend = match last.get(network_id) {
            Some(&prev) if prev > 0.0 && average > prev * (1.0 + GAS_TREND_BAND) => Trend::Up,
            Some(&prev) if prev > 0.0 && average < prev * (1.0 - GAS_TREND_BAND) => Trend::Down,
            _ => Trend::Stable,
        };
        last.insert(network_id.to_string(), average);
        trend
    }
}

impl MetricSource for Web3Source {
    fn domain(&self) -> Domain {
        Domain::Web3
    }

    fn fetch(&self) -> BoxFuture<'_, SourceResult<Snapshot>> {
        Box::pin(async move {
            if self.networks.is_empty() {
                return Err(SourceError::Rpc("no networks configured".to_string()));
            }

            let results = join_all(self.networks.iter().map(|config| async move {
                match self.network(config).await {
                    Ok(network) => {
                        debug!(
                            network = %network.id,
                            block = network.block_number,
                            gas_gwei = network.gas_price.average,
                            "Fetched network status"
                        );
                        network
                    }
                    Err(e) => {
                        warn!(network = %config.id, error = %e, "Network RPC unavailable");
                        Web3Network::offline(&config.id, &config.name, config.chain_id)
                    }
                }
            }))
            .await;

            Ok(Snapshot::now(SnapshotData::Web3(results)))
        })
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(hex: &str) -> SourceResult<u128> {
    let digits = hex
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Parse(format!("not a hex quantity: {hex:?}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Parse(format!("bad hex quantity {hex:?}: {e}")))
}

/// Slow/average/fast tiers in Gwei.
///
/// Fast follows the EIP-1559 max fee (twice the base fee plus the priority
/// fee); pre-London chains without a base fee use a flat 1.2x.
pub fn gas_tiers(gas_price_wei: u128, base_fee_wei: Option<u128>, priority_fee_wei: u128) -> GasPrice {
    let average = gas_price_wei as f64 / WEI_PER_GWEI;
    let fast = match base_fee_wei {
        // f64 sum; hex quantities from the node are unbounded u128s
        Some(base) => (base as f64 * 2.0 + priority_fee_wei as f64) / WEI_PER_GWEI,
        None => average * 1.2,
    };

    GasPrice {
        slow: round2(average * 0.8),
        average: round2(average),
        fast: round2(fast),
    }
}

/// Transactions per second for one block. Zero when the block time is not
/// positive.
pub fn tps(transactions: usize, block_time_secs: f64) -> f64 {
    if block_time_secs.is_nan() || block_time_secs <= 0.0 {
        return 0.0;
    }
    round2(transactions as f64 / block_time_secs)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_gas_tiers_with_base_fee() {
        let gas = gas_tiers(30_000_000_000, Some(20_000_000_000), 2_000_000_000);
        assert_eq!(gas.average, 30.0);
        assert_eq!(gas.slow, 24.0);
        assert_eq!(gas.fast, 42.0);
    }

    #[test]
    fn test_gas_tiers_huge_base_fee_does_not_overflow() {
        let gas = gas_tiers(1_000_000_000, Some(u128::MAX / 2 + 1), 0);
        assert_eq!(gas.average, 1.0);
        assert!(gas.fast.is_finite());
        assert!(gas.fast > 1e29);

        let gas = gas_tiers(u128::MAX, Some(u128::MAX), u128::MAX);
        assert!(gas.fast.is_finite());
    }

    #[test]
    fn test_tps_with_zero_block_time() {
        assert_eq!(tps(150, 12.0), 12.5);
        assert_eq!(tps(150, 0.0), 0.0);
        assert_eq!(tps(150, -1.0), 0.0);
        assert_eq!(tps(0, 2.0), 0.0);
    }

    #[test]
    fn test_gas_tiers_legacy_chain() {
        let gas = gas_tiers(50_000_000_000, None, FALLBACK_PRIORITY_FEE_WEI);
        assert_eq!(gas.average, 50.0);
        assert_eq!(gas.fast, 60.0);
    }

    #[test]
    fn test_gas_trend_tracks_previous_average() {
        let source = Web3Source::new(vec![]).unwrap();
        assert_eq!(source.gas_trend("ethereum", 20.0), Trend::Stable);
        assert_eq!(source.gas_trend("ethereum", 30.0), Trend::Up);
        assert_eq!(source.gas_trend("ethereum", 30.5), Trend::Stable);
        assert_eq!(source.gas_trend("ethereum", 10.0), Trend::Down);
        assert_eq!(source.gas_trend("polygon", 10.0), Trend::Stable);
    }

    #[test]
    fn test_block_tolerates_missing_base_fee() {
        let block: RawBlock = serde_json::from_value(json!({
            "timestamp": "0x65",
            "transactions": ["0x01", "0x02"]
        }))
        .unwrap();
        assert!(block.base_fee_per_gas.is_none());
        assert_eq!(block.transactions.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_network_is_offline() {
        let source = Web3Source::new(vec![Web3NetworkConfig::polygon("http://127.0.0.1:9")]).unwrap();
        let snapshot = source.fetch().await.unwrap();

        match snapshot.data {
            SnapshotData::Web3(networks) => {
                assert_eq!(networks.len(), 1);
                assert_eq!(networks[0].status, HealthStatus::Offline);
                assert_eq!(networks[0].chain_id, 137);
            }
            other => panic!("unexpected snapshot data: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_networks_is_an_error() {
        let source = Web3Source::new(vec![]).unwrap();
        tokio_test::assert_err!(source.fetch().await);
    }
}
