//! REST API handlers for ledger operations
//!
//! Parameters arrive in the query string, the way the dashboard builds its
//! requests. Mining and attacks are CPU-bound and run on the blocking pool
//! with a cancellation token tied to server shutdown and the optional
//! per-request mining timeout.

use crate::api::websocket::{WsBroadcaster, WsEvent};
use crate::core::{Amount, Block, ChainStats, Transaction};
use crate::engine::{Engine, EngineError};
use crate::mining::MempoolEntry;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Miner used when the request names none
pub const DEFAULT_MINER: &str = "Miner";

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
    /// Cancelled on shutdown; every mining job runs on a child token
    pub shutdown: CancellationToken,
    /// Upper bound on a single mine or attack request
    pub mine_timeout: Option<Duration>,
}

impl ApiState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            ws_broadcaster: Arc::new(WsBroadcaster::new()),
            shutdown: CancellationToken::new(),
            mine_timeout: None,
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Outcome of a transfer submission
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmitResponse {
    Ok { transaction: Transaction },
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct MineResponse {
    #[serde(flatten)]
    pub block: Block,
    pub reward: Amount,
    pub time_ms: u128,
    pub attempts: u64,
}

#[derive(Debug, Serialize)]
pub struct AttackResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
pub struct MempoolResponse {
    pub pending_transactions: usize,
    pub transactions: Vec<MempoolEntry>,
}

#[derive(Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub blocks_checked: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, error: String) -> (StatusCode, Json<ApiError>) {
    (status, Json(ApiError { error }))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct TransactionQuery {
    pub sender: String,
    pub recipient: String,
    pub amount: Amount,
}

fn default_miner() -> String {
    DEFAULT_MINER.to_string()
}

#[derive(Deserialize)]
pub struct MineQuery {
    #[serde(default = "default_miner")]
    pub miner_name: String,
}

#[derive(Deserialize)]
pub struct AttackQuery {
    pub attacker: String,
}

// ============================================================================
// Blocking job runner
// ============================================================================

/// Run a CPU-bound engine job off the async workers
///
/// The job sees a token that fires on shutdown or after `mine_timeout`.
async fn run_blocking<T, F>(state: &ApiState, job: F) -> Result<T, (StatusCode, Json<ApiError>)>
where
    T: Send + 'static,
    F: FnOnce(&Engine, &CancellationToken) -> T + Send + 'static,
{
    let cancel = state.shutdown.child_token();

    let timer = state.mine_timeout.map(|timeout| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            log::warn!("Mining job exceeded {:?}, cancelling", timeout);
            cancel.cancel();
        })
    });

    let engine = Arc::clone(&state.engine);
    let result = tokio::task::spawn_blocking(move || job(&engine, &cancel)).await;

    if let Some(timer) = timer {
        timer.abort();
    }

    result.map_err(|e| {
        log::error!("Mining job panicked: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Mining job failed: {}", e))
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /balances - Balance of every address on the canonical chain
pub async fn get_balances(State(state): State<ApiState>) -> Json<BTreeMap<String, Amount>> {
    Json(state.engine.balances())
}

/// GET /chain - Every canonical block, genesis first
pub async fn get_chain(State(state): State<ApiState>) -> Json<Vec<Block>> {
    Json(state.engine.chain())
}

/// POST /transaction - Queue a transfer
///
/// Malformed parameters are reported in the same `status: error` body as
/// any other rejection.
pub async fn submit_transaction(
    State(state): State<ApiState>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Json<SubmitResponse> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return Json(SubmitResponse::Error {
                message: rejection.body_text(),
            })
        }
    };

    match state
        .engine
        .submit(&query.sender, &query.recipient, query.amount)
    {
        Ok(transaction) => {
            state.ws_broadcaster.broadcast(WsEvent::TransactionAdded {
                transaction: transaction.clone(),
            });
            Json(SubmitResponse::Ok { transaction })
        }
        Err(e) => Json(SubmitResponse::Error {
            message: e.to_string(),
        }),
    }
}

/// POST /mine - Mine the pending pool into a new block
pub async fn mine_block(
    State(state): State<ApiState>,
    Query(query): Query<MineQuery>,
) -> ApiResult<MineResponse> {
    let miner = query.miner_name;
    let result = run_blocking(&state, move |engine, cancel| engine.mine(&miner, cancel)).await?;

    match result {
        Ok(mined) => {
            let reward = mined.block.mining_reward();

            state.ws_broadcaster.broadcast(WsEvent::BlockMined {
                block: mined.block.clone(),
                reward,
            });

            Ok(Json(MineResponse {
                block: mined.block,
                reward,
                time_ms: mined.stats.time_ms,
                attempts: mined.stats.hash_attempts,
            }))
        }
        Err(e) if e.is_cancelled() => Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("Mining failed: {}", e),
        )),
        Err(e @ EngineError::InvalidAddress(_)) => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Mining failed: {}", e),
        )),
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Mining failed: {}", e),
        )),
    }
}

/// POST /attack - Attempt to replace the canonical chain
pub async fn attack(
    State(state): State<ApiState>,
    Query(query): Query<AttackQuery>,
) -> ApiResult<AttackResponse> {
    let attacker = query.attacker;
    let result =
        run_blocking(&state, move |engine, cancel| engine.attack(&attacker, cancel)).await?;

    let response = match result {
        Ok(outcome) => {
            let message = outcome.message();
            state.ws_broadcaster.broadcast(WsEvent::ChainReplaced {
                length: outcome.chain_length,
                orphaned: outcome.orphaned,
                message: message.clone(),
            });
            AttackResponse {
                success: true,
                message,
            }
        }
        Err(e) => AttackResponse {
            success: false,
            message: format!("Attack failed: {}", e),
        },
    };

    Ok(Json(response))
}

/// GET /pending - Pending transactions
pub async fn get_pending(State(state): State<ApiState>) -> Json<MempoolResponse> {
    let transactions = state.engine.pending_entries();

    Json(MempoolResponse {
        pending_transactions: transactions.len(),
        transactions,
    })
}

/// GET /chain/validate - Re-validate the canonical chain
pub async fn validate_chain(State(state): State<ApiState>) -> Json<ValidationResponse> {
    let response = match state.engine.validate() {
        Ok(blocks_checked) => ValidationResponse {
            valid: true,
            blocks_checked,
            message: format!("Blockchain is valid ({} blocks verified)", blocks_checked),
        },
        Err(e) => ValidationResponse {
            valid: false,
            blocks_checked: state.engine.chain_len(),
            message: format!("Blockchain validation failed: {}", e),
        },
    };

    Json(response)
}

/// GET /stats - Chain statistics
pub async fn get_stats(State(state): State<ApiState>) -> Json<ChainStats> {
    Json(state.engine.stats())
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn state() -> ApiState {
        let engine = Engine::new(EngineConfig {
            difficulty: 1,
            ..Default::default()
        })
        .unwrap();
        ApiState::new(Arc::new(engine))
    }

    fn transfer(
        sender: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<Query<TransactionQuery>, QueryRejection> {
        Ok(Query(TransactionQuery {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
        }))
    }

    fn mine_as(name: &str) -> Query<MineQuery> {
        Query(MineQuery {
            miner_name: name.to_string(),
        })
    }

    #[tokio::test]
    async fn test_dashboard_flow() {
        let state = state();

        let Json(rejected) =
            submit_transaction(State(state.clone()), transfer("Alice", "Bob", 10.0)).await;
        let json = serde_json::to_value(&rejected).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["message"].as_str().unwrap().contains("Insufficient funds"));

        let Json(mined) = mine_block(State(state.clone()), mine_as("Miner"))
            .await
            .unwrap();
        assert_eq!(mined.block.index, 1);
        assert_eq!(mined.reward, 50.0);

        let Json(accepted) =
            submit_transaction(State(state.clone()), transfer("Miner", "Alice", 20.0)).await;
        let json = serde_json::to_value(&accepted).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["transaction"]["recipient"], "Alice");

        mine_block(State(state.clone()), mine_as("Miner"))
            .await
            .unwrap();

        let Json(balances) = get_balances(State(state.clone())).await;
        assert_eq!(balances["Miner"], 80.0);
        assert_eq!(balances["Alice"], 20.0);

        let Json(chain) = get_chain(State(state)).await;
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[2].transactions[1].sender, "Miner");
    }

    #[tokio::test]
    async fn test_malformed_transfer_is_status_error() {
        let state = state();
        let uri: axum::http::Uri = "/transaction?sender=Miner&recipient=Alice&amount=lots"
            .parse()
            .unwrap();
        let query = Query::<TransactionQuery>::try_from_uri(&uri);
        assert!(query.is_err());

        let Json(response) = submit_transaction(State(state.clone()), query).await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert!(!json["message"].as_str().unwrap().is_empty());
        assert!(state.engine.pending().is_empty());
    }

    #[tokio::test]
    async fn test_reserved_miner_name_is_bad_request() {
        let state = state();

        for name in ["COINBASE", ""] {
            let (status, Json(error)) = mine_block(State(state.clone()), mine_as(name))
                .await
                .unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(error.error.contains("Invalid reward address"));
        }

        let Json(response) = attack(
            State(state.clone()),
            Query(AttackQuery {
                attacker: "COINBASE".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!response.success);

        let Json(balances) = get_balances(State(state)).await;
        assert!(balances.is_empty());
    }

    #[tokio::test]
    async fn test_mine_response_shape() {
        let state = state();
        let Json(mined) = mine_block(State(state), mine_as("Miner")).await.unwrap();
        let json = serde_json::to_value(&mined).unwrap();

        for key in ["index", "timestamp", "previous_hash", "hash", "nonce", "transactions"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["transactions"][0]["sender"], "COINBASE");
        assert!(json["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn test_attack_endpoint() {
        let state = state();
        mine_block(State(state.clone()), mine_as("Miner"))
            .await
            .unwrap();

        let Json(response) = attack(
            State(state.clone()),
            Query(AttackQuery {
                attacker: "Mallory".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(response.success);

        let Json(balances) = get_balances(State(state)).await;
        assert!(balances["Mallory"] >= 50.0);
        assert!(!balances.contains_key("Miner"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_mining() {
        let state = state();
        state.shutdown.cancel();

        let (status, Json(error)) = mine_block(State(state.clone()), mine_as("Miner"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(error.error.contains("cancelled"));

        let Json(response) = attack(
            State(state.clone()),
            Query(AttackQuery {
                attacker: "Mallory".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!response.success);
        assert_eq!(state.engine.chain_len(), 1);
    }

    #[tokio::test]
    async fn test_pending_and_validate() {
        let state = state();
        mine_block(State(state.clone()), mine_as("Miner"))
            .await
            .unwrap();
        submit_transaction(State(state.clone()), transfer("Miner", "Bob", 1.0)).await;

        let Json(pending) = get_pending(State(state.clone())).await;
        assert_eq!(pending.pending_transactions, 1);
        assert_eq!(pending.transactions[0].tx.recipient, "Bob");

        let Json(validation) = validate_chain(State(state.clone())).await;
        assert!(validation.valid);
        assert_eq!(validation.blocks_checked, 2);

        let Json(stats) = get_stats(State(state)).await;
        assert_eq!(stats.height, 1);
    }
}
