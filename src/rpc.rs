//! Minimal JSON-RPC client for balance queries.
//!
//! The chat view shows the agent wallet's ETH balance next to its address.
//! That is the only chain read this client performs itself; everything else
//! goes through the backend.

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::config::RpcConfig;
use crate::error::RpcError;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Client bound to one JSON-RPC endpoint.
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
}

impl RpcClient {
    /// Build a client from config; errors when no endpoint is configured.
    pub fn new(config: &RpcConfig) -> Result<Self, RpcError> {
        let url = config.url.clone().ok_or(RpcError::NotConfigured)?;
        Ok(Self {
            url,
            client: reqwest::Client::new(),
        })
    }

    /// Latest-block balance of an address, in wei.
    pub async fn get_balance(&self, address: &str) -> Result<u128, RpcError> {
        let response: JsonRpcResponse = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_getBalance",
                "params": [address, "latest"],
            }))
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }

        let raw = response
            .result
            .as_ref()
            .and_then(|value| value.as_str())
            .ok_or_else(|| RpcError::InvalidQuantity("<missing result>".to_string()))?;
        parse_hex_quantity(raw)
    }
}

/// Parse an Ethereum hex quantity (`0x`-prefixed or bare) into wei.
pub fn parse_hex_quantity(raw: &str) -> Result<u128, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Err(RpcError::InvalidQuantity(raw.to_string()));
    }
    u128::from_str_radix(digits, 16).map_err(|_| RpcError::InvalidQuantity(raw.to_string()))
}

/// Wei per ETH: 10^18.
const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// Format a wei amount as ETH with up to four decimal places.
pub fn format_eth(wei: u128) -> String {
    // Decimal's 96-bit mantissa covers any plausible balance; fall back to
    // whole ETH for values beyond it.
    const MANTISSA_LIMIT: u128 = 1 << 96;
    if wei < MANTISSA_LIMIT {
        let value = Decimal::from_i128_with_scale(wei as i128, 18);
        value.round_dp(4).normalize().to_string()
    } else {
        (wei / WEI_PER_ETH).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x14").unwrap(), 20);
        assert_eq!(
            parse_hex_quantity("0x14d1120d7b160000").unwrap(),
            1_500_000_000_000_000_000
        );
        assert_eq!(parse_hex_quantity("ff").unwrap(), 255);
        assert!(parse_hex_quantity("0x").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn formats_wei_as_eth() {
        assert_eq!(format_eth(0), "0");
        assert_eq!(format_eth(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_eth(WEI_PER_ETH), "1");
        // rounds to four decimal places
        assert_eq!(format_eth(1_234_567_890_000_000_000), "1.2346");
        // dust below the display precision rounds away
        assert_eq!(format_eth(1), "0");
    }

    #[test]
    fn huge_balances_degrade_to_whole_eth() {
        let wei = (1u128 << 96) + WEI_PER_ETH;
        let formatted = format_eth(wei);
        assert_eq!(formatted, (wei / WEI_PER_ETH).to_string());
    }
}
