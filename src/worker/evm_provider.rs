use std::time::Duration;

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use url::Url;

use super::provider::{BalanceProvider, ChainBalances, TokenBalance};
use crate::{
    abis::IERC20,
    chain::Chain,
    config::{EvmChainSettings, TrackedTokenSettings},
    utils::u256_to_token_amount,
};

/// Timeout for individual RPC calls
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Native and ERC-20 balances read over JSON-RPC for one EVM chain.
pub struct EvmBalanceProvider {
    chain: Chain,
    provider: DynProvider,
    native_ticker: String,
    native_decimals: u8,
    tokens: Vec<(TrackedTokenSettings, Address)>,
}

impl EvmBalanceProvider {
    pub fn new(settings: &EvmChainSettings) -> Result<Self> {
        let url = Url::parse(&settings.rpc_url)
            .with_context(|| format!("Invalid RPC URL for {}", settings.chain))?;

        let client = ProviderBuilder::new().connect_http(url);
        let provider = DynProvider::new(client);

        let tokens = settings
            .tokens
            .iter()
            .map(|token| {
                let address: Address = token.address.parse().with_context(|| {
                    format!("Invalid {} contract address for {}", token.ticker, settings.chain)
                })?;
                Ok((token.clone(), address))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chain: settings.chain.clone(),
            provider,
            native_ticker: settings.native_ticker.clone(),
            native_decimals: settings.native_decimals,
            tokens,
        })
    }

    async fn native_balance(&self, owner: Address) -> Result<TokenBalance> {
        let raw = tokio::time::timeout(RPC_CALL_TIMEOUT, self.provider.get_balance(owner))
            .await
            .map_err(|_| anyhow!("eth_getBalance timed out"))?
            .context("eth_getBalance failed")?;

        let amount = u256_to_token_amount(raw, self.native_decimals)
            .ok_or_else(|| anyhow!("Native balance {} does not fit a finite amount", raw))?;

        Ok(TokenBalance {
            token: self.native_ticker.clone(),
            amount,
        })
    }

    async fn token_balance(
        &self,
        token: &TrackedTokenSettings,
        contract: Address,
        owner: Address,
    ) -> Result<TokenBalance> {
        let erc20 = IERC20::new(contract, &self.provider);

        let raw = tokio::time::timeout(RPC_CALL_TIMEOUT, erc20.balanceOf(owner).call())
            .await
            .map_err(|_| anyhow!("{} balanceOf timed out", token.ticker))?
            .with_context(|| format!("{} balanceOf failed", token.ticker))?;

        let amount = u256_to_token_amount(raw, token.decimals)
            .ok_or_else(|| anyhow!("{} balance {} does not fit a finite amount", token.ticker, raw))?;

        Ok(TokenBalance {
            token: token.ticker.clone(),
            amount,
        })
    }
}

#[async_trait]
impl BalanceProvider for EvmBalanceProvider {
    /// Any failed call fails the whole lookup, a partial token list would
    /// read as a zero balance downstream.
    async fn fetch_balances(&self, chain: &Chain, address: &str) -> Result<ChainBalances> {
        if chain != &self.chain {
            bail!("Provider for {} cannot serve {}", self.chain, chain);
        }

        let owner: Address = address
            .parse()
            .with_context(|| format!("Invalid {} address {}", chain, address))?;

        let token_calls = self
            .tokens
            .iter()
            .map(|(token, contract)| self.token_balance(token, *contract, owner));

        let (native, tokens) =
            tokio::try_join!(self.native_balance(owner), try_join_all(token_calls))?;

        let mut balances = Vec::with_capacity(tokens.len() + 1);
        balances.push(native);
        balances.extend(tokens);

        Ok(ChainBalances {
            tokens: balances,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(rpc_url: &str, token_address: &str) -> EvmChainSettings {
        EvmChainSettings {
            chain: Chain::Ethereum,
            rpc_url: rpc_url.to_string(),
            native_ticker: "ETH".to_string(),
            native_decimals: 18,
            tokens: vec![TrackedTokenSettings {
                ticker: "USDC".to_string(),
                address: token_address.to_string(),
                decimals: 6,
            }],
        }
    }

    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    #[test]
    fn test_rejects_invalid_configuration() {
        assert!(EvmBalanceProvider::new(&settings("not a url", USDC)).is_err());
        assert!(EvmBalanceProvider::new(&settings("http://localhost:8545", "0x12")).is_err());
        assert!(EvmBalanceProvider::new(&settings("http://localhost:8545", USDC)).is_ok());
    }

    #[tokio::test]
    async fn test_rejects_other_chain_and_bad_address() {
        let provider = EvmBalanceProvider::new(&settings("http://localhost:8545", USDC)).unwrap();
        assert!(provider.fetch_balances(&Chain::Base, USDC).await.is_err());
        assert!(provider.fetch_balances(&Chain::Ethereum, "garbage").await.is_err());
    }
}
