mod event;
mod handlers;
mod state;

use std::net::SocketAddr;

use anyhow::Result;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{info, Level};

use crate::rooms::Registry;

use self::state::ServerState;

/// HTTP + WebSocket front of the room registry. The registry instance is
/// injected, never global.
pub struct Server {
  port: u16,
  registry: Registry,
}

impl Server {
  pub fn new(port: u16, registry: Registry) -> Self {
    Self { port, registry }
  }

  pub async fn listen(self) -> Result<()> {
    let app = Self::router(ServerState::new(self.registry));
    let addr = SocketAddr::new([0, 0, 0, 0].into(), self.port);
    info!("listening on {addr}");

    axum::Server::bind(&addr)
      .serve(app.into_make_service_with_connect_info::<SocketAddr>())
      .await?;

    Ok(())
  }

  fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
      .allow_methods([Method::GET, Method::POST])
      .allow_origin(Any);
    let trace = TraceLayer::new_for_http()
      .on_response(DefaultOnResponse::new().level(Level::INFO).latency_unit(LatencyUnit::Micros));

    Router::new()
      .route("/", get(handlers::socket))
      .route("/api/create-room", post(handlers::create_room))
      .route("/api/room/:code", get(handlers::room_info))
      .layer(cors)
      .layer(trace)
      .with_state(state)
  }
}
