use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use tapedeck_proto::deck::DeckSnapshot;
use tapedeck_proto::protocol::Command;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    snapshot: watch::Receiver<DeckSnapshot>,
    commands: mpsc::Sender<Command>,
}

pub fn router(snapshot: watch::Receiver<DeckSnapshot>, commands: mpsc::Sender<Command>) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/eject", get(eject).post(eject))
        .route("/api/play", get(play).post(play))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/slot", get(slot).post(slot))
        .route("/api/door", get(door).post(door))
        .layer(CorsLayer::permissive())
        .with_state(HttpState { snapshot, commands })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    snapshot: watch::Receiver<DeckSnapshot>,
    commands: mpsc::Sender<Command>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(snapshot, commands);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

async fn get_state(State(state): State<HttpState>) -> Json<DeckSnapshot> {
    Json(state.snapshot.borrow().clone())
}

async fn forward(state: &HttpState, cmd: Command) -> StatusCode {
    info!("HTTP API: {:?}", cmd);
    if state.commands.send(cmd).await.is_err() {
        error!("HTTP API: deck core is gone");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

async fn eject(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::Eject).await
}

async fn play(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::Play).await
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::Stop).await
}

async fn slot(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::Slot).await
}

async fn door(State(state): State<HttpState>) -> StatusCode {
    forward(&state, Command::CloseDoor).await
}
