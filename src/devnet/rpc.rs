//! The devnet validator rpc server, and a client for it.

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: String,
    pub moniker: String,
    /// Chain id.
    pub network: String,
    pub listen_addr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SyncInfo {
    pub latest_block_height: u64,
    pub catching_up: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
    pub genesis_hash: String,
    pub min_gas_prices: String,
    pub mempool_broadcast: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BlockResponse {
    pub chain_id: String,
    pub height: u64,
}

#[derive(Clone)]
pub struct RpcState {
    pub node_info: NodeInfo,
    pub genesis_hash: String,
    pub min_gas_prices: String,
    pub mempool_broadcast: bool,
    pub height: watch::Receiver<u64>,
    /// Height of the peer this node follows, if any.
    pub upstream: Option<watch::Receiver<u64>>,
}

pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/block", get(get_block))
        .route("/status", get(get_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn get_block(State(state): State<RpcState>) -> Result<Json<BlockResponse>, AppError> {
    let height = *state.height.borrow();
    if height == 0 {
        return Err(AppError(
            StatusCode::SERVICE_UNAVAILABLE,
            anyhow::anyhow!("no block produced yet"),
        ));
    }
    Ok(Json(BlockResponse {
        chain_id: state.node_info.network.clone(),
        height,
    }))
}

async fn get_status(State(state): State<RpcState>) -> Json<NodeStatus> {
    let height = *state.height.borrow();
    let catching_up = state
        .upstream
        .as_ref()
        .is_some_and(|upstream| *upstream.borrow() > height);
    Json(NodeStatus {
        node_info: state.node_info.clone(),
        sync_info: SyncInfo {
            latest_block_height: height,
            catching_up,
        },
        genesis_hash: state.genesis_hash.clone(),
        min_gas_prices: state.min_gas_prices.clone(),
        mempool_broadcast: state.mempool_broadcast,
    })
}

// Make our own error that wraps `anyhow::Error`.
pub struct AppError(pub StatusCode, pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0, format!("{}", self.1)).into_response()
    }
}

pub struct RpcClient {
    pub url: Url,
    pub reqwest_client: reqwest::Client,
}

impl RpcClient {
    /// `addr` is either `host:port` or a full `http://` url.
    pub fn new(addr: &str) -> Result<Self> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };
        Ok(Self {
            url: Url::parse(&url).with_context(|| format!("parsing rpc address {addr}"))?,
            reqwest_client: reqwest::Client::new(),
        })
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.reqwest_client
            .get(self.url.join("status")?)
            .send()
            .await
            .context("getting node status")?
            .error_for_status()?
            .json::<NodeStatus>()
            .await
            .context("reading node status response")
    }

    pub async fn block(&self) -> Result<BlockResponse> {
        self.reqwest_client
            .get(self.url.join("block")?)
            .send()
            .await
            .context("getting latest block")?
            .error_for_status()?
            .json::<BlockResponse>()
            .await
            .context("reading block response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn block_is_unavailable_until_first_block() {
        let (tx, rx) = watch::channel(0u64);
        let state = RpcState {
            node_info: NodeInfo {
                id: "abc".to_string(),
                moniker: "node0".to_string(),
                network: "chain".to_string(),
                listen_addr: "127.0.0.1:1".to_string(),
            },
            genesis_hash: "h".to_string(),
            min_gas_prices: String::new(),
            mempool_broadcast: true,
            height: rx,
            upstream: None,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, router(state)).await });

        let client = RpcClient::new(&addr.to_string()).unwrap();
        assert!(client.block().await.is_err());
        assert_eq!(client.status().await.unwrap().sync_info.latest_block_height, 0);

        tx.send_replace(3);
        let block = client.block().await.unwrap();
        assert_eq!(block.height, 3);
        assert_eq!(block.chain_id, "chain");

        server.abort();
    }
}
