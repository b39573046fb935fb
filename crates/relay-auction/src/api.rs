//! Serve the auction status and bid submission API.

use {
    crate::{error::Error, orchestrator::RoundOrchestrator},
    axum::{
        Json,
        Router,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    model::SignedBid,
    serde::Serialize,
    std::{future::Future, net::SocketAddr, sync::Arc},
};

pub struct Api {
    pub addr: SocketAddr,
    pub orchestrator: Arc<RoundOrchestrator>,
}

impl Api {
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "serving auction API");

        axum::serve(listener, router(self.orchestrator))
            .with_graceful_shutdown(shutdown)
            .await
    }
}

fn router(orchestrator: Arc<RoundOrchestrator>) -> Router {
    Router::new()
        .route("/api/v1/auction/current_bid", get(current_bid))
        .route("/api/v1/auction/bids", post(submit_bid))
        .route("/metrics", get(metrics))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Status of the active round. Bidders need the block to sign bids the
/// round accepts.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentBid {
    l1_block: u64,
    /// `null` while no valid bid leads.
    bid: Option<SignedBid>,
}

async fn current_bid(State(orchestrator): State<Arc<RoundOrchestrator>>) -> Response {
    match orchestrator.current_round() {
        Ok(round) => Json(CurrentBid {
            l1_block: round.l1_block,
            bid: round.leader,
        })
        .into_response(),
        Err(err @ Error::NoActiveRound) => (StatusCode::CONFLICT, err.to_string()).into_response(),
        Err(err) => {
            tracing::error!(?err, "failed to read current bid");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn submit_bid(
    State(orchestrator): State<Arc<RoundOrchestrator>>,
    body: String,
) -> Response {
    let bid = match SignedBid::decode(&body) {
        Ok(bid) => bid,
        Err(err) => {
            tracing::debug!(?err, "malformed bid submission");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };
    match orchestrator.submit(bid).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(err @ Error::NoActiveRound) => (StatusCode::CONFLICT, err.to_string()).into_response(),
        Err(err) => {
            tracing::error!(?err, "failed to submit bid");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn metrics() -> Response {
    match observe::metrics::encode(observe::metrics::get_registry()) {
        Ok(encoded) => encoded.into_response(),
        Err(err) => {
            tracing::error!(?err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
