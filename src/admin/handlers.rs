use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::broker::ExchangeStats;
use crate::queue::QueueStats;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub exchanges: usize,
    pub queues: usize,
    /// Ready messages across all queues.
    pub depth: usize,
    pub unacked: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let stats = state.broker.stats();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        exchanges: stats.exchanges.len(),
        queues: stats.queues.len(),
        depth: stats.queues.iter().map(|q| q.depth).sum(),
        unacked: stats.queues.iter().map(|q| q.unacked).sum(),
    })
}

pub async fn get_exchanges(State(state): State<AdminState>) -> Json<Vec<ExchangeStats>> {
    Json(state.broker.stats().exchanges)
}

pub async fn get_queues(State(state): State<AdminState>) -> Json<Vec<QueueStats>> {
    Json(state.broker.stats().queues)
}
