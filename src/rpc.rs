//! JSON-RPC connections and anvil fork administration

use crate::config::RpcConfig;
use crate::error::{PegError, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use ethers::utils::parse_ether;
use std::sync::Arc;
use tracing::{debug, info};

pub type HttpProvider = Provider<Http>;

/// Connect to the local anvil fork and check it answers
pub async fn connect_local(config: &RpcConfig) -> Result<Arc<HttpProvider>> {
    connect(&config.fork_url).await.map_err(|e| {
        PegError::Connection(format!(
            "Could not connect to local fork at {}. Is anvil running? ({})",
            config.fork_url, e
        ))
    })
}

/// Connect to the upstream mainnet RPC
pub async fn connect_mainnet(config: &RpcConfig) -> Result<Arc<HttpProvider>> {
    let url = config.mainnet_url.as_deref().ok_or_else(|| {
        PegError::Config("ALCHEMY_MAINNET_URL is not set. Add it to your .env file.".to_string())
    })?;
    connect(url)
        .await
        .map_err(|e| PegError::Connection(format!("Could not connect to mainnet RPC: {}", e)))
}

async fn connect(url: &str) -> Result<Arc<HttpProvider>> {
    let provider = Provider::<Http>::try_from(url)
        .map_err(|e| PegError::Config(format!("Invalid RPC URL {}: {}", url, e)))?;
    let chain_id = provider.get_chainid().await?;
    info!("Connected to {} (chain id {})", url, chain_id);
    Ok(Arc::new(provider))
}

/// Fork-only admin calls (anvil cheatcodes)
///
/// Generic over the middleware so the calls can be replayed against a
/// scripted JSON-RPC transport in tests.
#[derive(Debug)]
pub struct ForkAdmin<M> {
    client: Arc<M>,
}

impl<M> Clone for ForkAdmin<M> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}

impl<M: Middleware> ForkAdmin<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }

    async fn cheat<P>(&self, method: &str, params: P) -> Result<()>
    where
        P: std::fmt::Debug + serde::Serialize + Send + Sync,
    {
        debug!("{} {:?}", method, params);
        let _: serde_json::Value = self.client.provider().request(method, params).await?;
        Ok(())
    }

    /// Let the node accept transactions from `addr` without its key
    pub async fn impersonate(&self, addr: Address) -> Result<()> {
        self.cheat("anvil_impersonateAccount", [addr]).await
    }

    pub async fn stop_impersonating(&self, addr: Address) -> Result<()> {
        self.cheat("anvil_stopImpersonatingAccount", [addr]).await
    }

    /// Overwrite the ETH balance of `addr` on the fork
    pub async fn set_balance(&self, addr: Address, eth_amount: f64) -> Result<U256> {
        let wei = eth_to_wei(eth_amount)?;
        self.cheat("anvil_setBalance", (addr, wei)).await?;
        Ok(wei)
    }
}

pub fn eth_to_wei(eth_amount: f64) -> Result<U256> {
    if !eth_amount.is_finite() || eth_amount < 0.0 {
        return Err(PegError::Config(format!("Invalid ETH amount: {}", eth_amount)));
    }
    parse_ether(eth_amount).map_err(|e| PegError::Config(format!("Invalid ETH amount {}: {}", eth_amount, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eth_to_wei() {
        assert_eq!(eth_to_wei(5.0).unwrap(), U256::exp10(18) * 5u64);
        assert_eq!(eth_to_wei(0.5).unwrap(), U256::exp10(17) * 5u64);
        assert!(eth_to_wei(-1.0).is_err());
        assert!(eth_to_wei(f64::NAN).is_err());
    }

    #[test]
    fn test_set_balance_params_are_hex() {
        let addr: Address = "0x9201da0D97CaAAff53f01B2fB56767C7072dE340".parse().unwrap();
        let params = serde_json::to_value((addr, eth_to_wei(5.0).unwrap())).unwrap();
        assert_eq!(params[0], "0x9201da0d97caaaff53f01b2fb56767c7072de340");
        assert_eq!(params[1], "0x4563918244f40000");
    }

    #[tokio::test]
    async fn test_mainnet_requires_url() {
        let config = RpcConfig {
            mainnet_url: None,
            fork_url: "http://127.0.0.1:8545".to_string(),
        };
        match connect_mainnet(&config).await {
            Err(PegError::Config(msg)) => assert!(msg.contains("ALCHEMY_MAINNET_URL")),
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("expected configuration error"),
        }
    }
}
