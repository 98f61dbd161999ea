//! Curve USDC/crvUSD stable pool on an anvil mainnet fork
//!
//! Read helpers for pool coins, reserves and LP balances, plus a
//! single-sided USDC withdrawal executed from an impersonated LP holder.

pub mod math;


pub use math::{burn_amount, min_amount_out, to_units};

use crate::config::{parse_address, CurveConfig};
use crate::error::{PegError, Result};
use crate::rpc::ForkAdmin;
use ethers::contract::abigen;
use ethers::providers::Middleware;
use ethers::types::{Address, TransactionReceipt, H256, U256, U64};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

abigen!(
    CurveStableSwap,
    r#"[
        function coins(uint256 i) external view returns (address)
        function balances(uint256 i) external view returns (uint256)
        function token() external view returns (address)
        function calc_withdraw_one_coin(uint256 burn_amount, int128 i) external view returns (uint256)
        function remove_liquidity_one_coin(uint256 burn_amount, int128 i, uint256 min_received) external returns (uint256)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function decimals() external view returns (uint8)
        function balanceOf(address account) external view returns (uint256)
    ]"#
);

/// Pool reserves in human units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolBalances {
    pub usdc: Decimal,
    pub crvusd: Decimal,
}

/// Outcome of a single-sided USDC withdrawal
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalReport {
    pub holder: Address,
    pub tx_hash: H256,
    pub lp_burned: Decimal,
    pub expected_usdc: Decimal,
    pub min_usdc: Decimal,
    pub usdc_before: Decimal,
    pub usdc_after: Decimal,
}

impl WithdrawalReport {
    pub fn received(&self) -> Decimal {
        self.usdc_after - self.usdc_before
    }
}

/// Order the two raw reserves as (USDC, crvUSD) given the pool's coin 0
pub fn order_reserves(coin0: Address, usdc: Address, b0: U256, b1: U256) -> (U256, U256) {
    if coin0 == usdc {
        (b0, b1)
    } else {
        (b1, b0)
    }
}

/// Receipt polling defaults; anvil automines so the first poll usually hits
const RECEIPT_POLL_ATTEMPTS: usize = 40;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Read/write access to the Curve pool through one client
pub struct CurvePool<M> {
    client: Arc<M>,
    pool: CurveStableSwap<M>,
    pool_address: Address,
    usdc_address: Address,
    crvusd_address: Address,
    usdc_index: u8,
    gas_limit: u64,
    gas_funding_eth: f64,
    receipt_attempts: usize,
    receipt_interval: Duration,
}

impl<M: Middleware + 'static> CurvePool<M> {
    pub fn new(client: Arc<M>, config: &CurveConfig) -> Result<Self> {
        let pool_address = parse_address("curve.pool", &config.pool)?;
        Ok(Self {
            pool: CurveStableSwap::new(pool_address, client.clone()),
            client,
            pool_address,
            usdc_address: parse_address("curve.usdc", &config.usdc)?,
            crvusd_address: parse_address("curve.crvusd", &config.crvusd)?,
            usdc_index: config.usdc_index,
            gas_limit: config.gas_limit,
            gas_funding_eth: config.gas_funding_eth,
            receipt_attempts: RECEIPT_POLL_ATTEMPTS,
            receipt_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    /// Override how often and how long to poll for a transaction receipt
    pub fn with_receipt_polling(mut self, attempts: usize, interval: Duration) -> Self {
        self.receipt_attempts = attempts.max(1);
        self.receipt_interval = interval;
        self
    }

    pub fn address(&self) -> Address {
        self.pool_address
    }

    fn erc20(&self, token: Address) -> Erc20<M> {
        Erc20::new(token, self.client.clone())
    }

    async fn decimals(&self, token: Address) -> Result<u8> {
        self.erc20(token)
            .decimals()
            .call()
            .await
            .map_err(|e| PegError::Contract(format!("decimals() on {:?}: {}", token, e)))
    }

    async fn token_balance(&self, token: Address, holder: Address) -> Result<U256> {
        self.erc20(token)
            .balance_of(holder)
            .call()
            .await
            .map_err(|e| PegError::Contract(format!("balanceOf({:?}) on {:?}: {}", holder, token, e)))
    }

    /// The pool's two underlying token addresses
    pub async fn coins(&self) -> Result<[Address; 2]> {
        let mut coins = [Address::zero(); 2];
        for (i, slot) in coins.iter_mut().enumerate() {
            *slot = self
                .pool
                .coins(U256::from(i))
                .call()
                .await
                .map_err(|e| PegError::Contract(format!("coins({}): {}", i, e)))?;
        }
        Ok(coins)
    }

    /// USDC and crvUSD reserves, matched to the pool's coin order
    pub async fn balances(&self) -> Result<PoolBalances> {
        let usdc_dec = self.decimals(self.usdc_address).await?;
        let crvusd_dec = self.decimals(self.crvusd_address).await?;

        let mut raw = [U256::zero(); 2];
        for (i, slot) in raw.iter_mut().enumerate() {
            *slot = self
                .pool
                .balances(U256::from(i))
                .call()
                .await
                .map_err(|e| PegError::Contract(format!("balances({}): {}", i, e)))?;
        }

        let coins = self.coins().await?;
        let (usdc_raw, crvusd_raw) = order_reserves(coins[0], self.usdc_address, raw[0], raw[1]);

        Ok(PoolBalances {
            usdc: to_units(usdc_raw, usdc_dec)?,
            crvusd: to_units(crvusd_raw, crvusd_dec)?,
        })
    }

    /// LP token address; pools without `token()` are their own LP token
    pub async fn lp_token(&self) -> Address {
        match self.pool.token().call().await {
            Ok(addr) => addr,
            Err(e) => {
                warn!("token() unavailable ({}), using pool address as LP token", e);
                self.pool_address
            }
        }
    }

    /// Raw LP balance in smallest units
    pub async fn lp_balance(&self, holder: Address) -> Result<U256> {
        let lp = self.lp_token().await;
        self.token_balance(lp, holder).await
    }

    async fn checked_usdc_index(&self) -> Result<u8> {
        let coin = self
            .pool
            .coins(U256::from(self.usdc_index))
            .call()
            .await
            .map_err(|e| PegError::Contract(format!("coins({}): {}", self.usdc_index, e)))?;
        if coin != self.usdc_address {
            return Err(PegError::Config(format!(
                "coins({}) is {:?}, not USDC {:?}",
                self.usdc_index, coin, self.usdc_address
            )));
        }
        Ok(self.usdc_index)
    }

    /// Burn `fraction` of the holder's LP tokens for USDC only
    ///
    /// The holder is impersonated on the fork and funded for gas; the
    /// impersonation is lifted again whether or not the withdrawal succeeds.
    pub async fn withdraw_usdc_single_sided(
        &self,
        admin: &ForkAdmin<M>,
        holder: Address,
        fraction: Decimal,
        slippage_bps: u32,
    ) -> Result<WithdrawalReport> {
        let usdc_index = self.checked_usdc_index().await?;
        let lp_address = self.lp_token().await;

        let usdc_dec = self.decimals(self.usdc_address).await?;
        let lp_dec = self.decimals(lp_address).await?;

        let lp_balance = self.token_balance(lp_address, holder).await?;
        if lp_balance.is_zero() {
            return Err(PegError::ZeroBalance(format!("{:?}", holder)));
        }

        let lp_amount = burn_amount(lp_balance, fraction)?;
        if lp_amount.is_zero() {
            return Err(PegError::InvalidData(format!(
                "burning {} of {} LP rounds down to zero",
                fraction, lp_balance
            )));
        }

        let expected = self
            .pool
            .calc_withdraw_one_coin(lp_amount, usdc_index as i128)
            .call()
            .await
            .map_err(|e| PegError::Contract(format!("calc_withdraw_one_coin: {}", e)))?;
        let min_out = min_amount_out(expected, slippage_bps)?;

        let usdc_before = self.token_balance(self.usdc_address, holder).await?;

        info!(
            "Withdrawing: burn {} LP of {}, expect {} USDC raw, min {}",
            lp_amount, lp_balance, expected, min_out
        );

        admin.impersonate(holder).await?;
        let sent = self
            .send_remove_liquidity(admin, holder, lp_amount, usdc_index, min_out)
            .await;
        if let Err(e) = admin.stop_impersonating(holder).await {
            warn!("Failed to stop impersonating {:?}: {}", holder, e);
        }
        let tx_hash = sent?;

        let usdc_after = self.token_balance(self.usdc_address, holder).await?;
        let received = usdc_after.saturating_sub(usdc_before);
        if received < min_out {
            return Err(PegError::Slippage {
                received: to_units(received, usdc_dec)?.to_string(),
                minimum: to_units(min_out, usdc_dec)?.to_string(),
            });
        }

        Ok(WithdrawalReport {
            holder,
            tx_hash,
            lp_burned: to_units(lp_amount, lp_dec)?,
            expected_usdc: to_units(expected, usdc_dec)?,
            min_usdc: to_units(min_out, usdc_dec)?,
            usdc_before: to_units(usdc_before, usdc_dec)?,
            usdc_after: to_units(usdc_after, usdc_dec)?,
        })
    }

    async fn send_remove_liquidity(
        &self,
        admin: &ForkAdmin<M>,
        holder: Address,
        lp_amount: U256,
        usdc_index: u8,
        min_out: U256,
    ) -> Result<H256> {
        admin.set_balance(holder, self.gas_funding_eth).await?;
        let gas_price = self
            .client
            .get_gas_price()
            .await
            .map_err(|e| PegError::Rpc(format!("eth_gasPrice: {}", e)))?;

        let call = self
            .pool
            .remove_liquidity_one_coin(lp_amount, usdc_index as i128, min_out)
            .from(holder)
            .gas(self.gas_limit)
            .gas_price(gas_price);
        let tx_hash = call
            .send()
            .await
            .map_err(|e| PegError::Contract(format!("remove_liquidity_one_coin: {}", e)))?
            .tx_hash();

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if receipt.status != Some(U64::from(1)) {
            return Err(PegError::TransactionFailed(format!(
                "remove_liquidity_one_coin tx {:?} reverted",
                tx_hash
            )));
        }

        info!("remove_liquidity_one_coin mined in {:?}", receipt.block_number);
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        for attempt in 0..self.receipt_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.receipt_interval).await;
            }
            let receipt = self
                .client
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| PegError::Rpc(format!("eth_getTransactionReceipt: {}", e)))?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            debug!("No receipt yet for {:?} (attempt {})", tx_hash, attempt + 1);
        }
        Err(PegError::TransactionFailed(format!(
            "no receipt for {:?} after {} polls",
            tx_hash, self.receipt_attempts
        )))
    }
}
