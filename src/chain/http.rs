use anyhow::Result;
use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::Body;
use hyper::Client;
use hyper::Method;
use hyper::Request;
use hyper::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::FarmError;
use crate::traits::{ChainStateReader, ContractCaller};
use crate::types::{ContractData, Hash32, SimulatedCall, Submission};

/// JSON/HTTP client for the chain sidecar, which owns RPC access and the
/// farmer's signing key.
///
/// # Protocol
/// - GET  /contract-data?farmer=<pk> - `ContractData`
/// - POST /plant     `{farmer, amount}` - `SimulatedCall`
/// - POST /work      `{farmer, hash, nonce}` - `SimulatedCall`
/// - POST /sign-auth `{farmer, envelope}` - `SimulatedCall`
/// - POST /send      `{envelope}` - `Submission`
///
/// `amount` and `nonce` travel as decimal strings, `hash` as hex.
pub struct HttpBridge {
    base_url: String,
    client: Client<HttpConnector>,
}

#[derive(Serialize)]
struct PlantRequest<'a> {
    farmer: &'a str,
    amount: String,
}

#[derive(Serialize)]
struct WorkRequest<'a> {
    farmer: &'a str,
    hash: String,
    nonce: String,
}

#[derive(Serialize)]
struct SignRequest<'a> {
    farmer: &'a str,
    envelope: &'a str,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    envelope: &'a str,
}

impl HttpBridge {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: Client::new(),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let uri: hyper::Uri = format!("{}{}", self.base_url, path).parse()?;
        debug!("bridge GET {}", path);
        let response = self.client.get(uri).await?;
        Self::read_json(path, response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}{}", self.base_url, path))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?;
        debug!("bridge POST {}", path);
        let response = self.client.request(request).await?;
        Self::read_json(path, response).await
    }

    async fn read_json<T: DeserializeOwned>(path: &str, response: Response<Body>) -> Result<T> {
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;

        if !status.is_success() {
            return Err(FarmError::Bridge {
                path: path.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            }
            .into());
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl ChainStateReader for HttpBridge {
    fn name(&self) -> &'static str {
        "http-bridge"
    }

    async fn contract_data(&self, farmer: &str) -> Result<ContractData> {
        // strkeys are base32, no escaping needed
        self.get_json(&format!("/contract-data?farmer={}", farmer)).await
    }
}

#[async_trait]
impl ContractCaller for HttpBridge {
    fn name(&self) -> &'static str {
        "http-bridge"
    }

    async fn plant(&self, farmer: &str, amount: i128) -> Result<SimulatedCall> {
        let body = PlantRequest {
            farmer,
            amount: amount.to_string(),
        };
        self.post_json("/plant", &body).await
    }

    async fn work(&self, farmer: &str, hash: &Hash32, nonce: u64) -> Result<SimulatedCall> {
        let body = WorkRequest {
            farmer,
            hash: hex::encode(hash),
            nonce: nonce.to_string(),
        };
        self.post_json("/work", &body).await
    }

    async fn sign_auth_entries(&self, farmer: &str, call: SimulatedCall) -> Result<SimulatedCall> {
        let body = SignRequest {
            farmer,
            envelope: &call.envelope,
        };
        self.post_json("/sign-auth", &body).await
    }

    async fn send(&self, call: &SimulatedCall) -> Result<Submission> {
        let body = SendRequest {
            envelope: &call.envelope,
        };
        self.post_json("/send", &body).await
    }
}
