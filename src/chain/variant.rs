use anyhow::Result;
use async_trait::async_trait;

use super::http::HttpBridge;
use super::mock::MockChain;
use crate::traits::{ChainStateReader, ContractCaller};
use crate::types::{ContractData, Hash32, SimulatedCall, Submission};

/// Enum representing all chain collaborator implementations.
pub enum ChainVariant {
    Http(HttpBridge),
    Mock(MockChain),
}

impl ChainVariant {
    pub fn http(base_url: impl Into<String>) -> Self {
        ChainVariant::Http(HttpBridge::new(base_url))
    }
}

#[async_trait]
impl ChainStateReader for ChainVariant {
    fn name(&self) -> &'static str {
        match self {
            ChainVariant::Http(inner) => ChainStateReader::name(inner),
            ChainVariant::Mock(inner) => ChainStateReader::name(inner),
        }
    }

    async fn contract_data(&self, farmer: &str) -> Result<ContractData> {
        match self {
            ChainVariant::Http(inner) => inner.contract_data(farmer).await,
            ChainVariant::Mock(inner) => inner.contract_data(farmer).await,
        }
    }
}

#[async_trait]
impl ContractCaller for ChainVariant {
    fn name(&self) -> &'static str {
        match self {
            ChainVariant::Http(inner) => ContractCaller::name(inner),
            ChainVariant::Mock(inner) => ContractCaller::name(inner),
        }
    }

    async fn plant(&self, farmer: &str, amount: i128) -> Result<SimulatedCall> {
        match self {
            ChainVariant::Http(inner) => inner.plant(farmer, amount).await,
            ChainVariant::Mock(inner) => inner.plant(farmer, amount).await,
        }
    }

    async fn work(&self, farmer: &str, hash: &Hash32, nonce: u64) -> Result<SimulatedCall> {
        match self {
            ChainVariant::Http(inner) => inner.work(farmer, hash, nonce).await,
            ChainVariant::Mock(inner) => inner.work(farmer, hash, nonce).await,
        }
    }

    async fn sign_auth_entries(&self, farmer: &str, call: SimulatedCall) -> Result<SimulatedCall> {
        match self {
            ChainVariant::Http(inner) => inner.sign_auth_entries(farmer, call).await,
            ChainVariant::Mock(inner) => inner.sign_auth_entries(farmer, call).await,
        }
    }

    async fn send(&self, call: &SimulatedCall) -> Result<Submission> {
        match self {
            ChainVariant::Http(inner) => inner.send(call).await,
            ChainVariant::Mock(inner) => inner.send(call).await,
        }
    }
}
