//! Server binary for the BFF authentication broker.

// crates.io
use tracing_subscriber::EnvFilter;
// self
use bff_broker::{
	config::BrokerConfig,
	error::Result,
	server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.init();

	let config = BrokerConfig::from_env()?;
	let addr = config.socket_addr();
	let state = AppState::new(config)?;
	let router = server::router(state);
	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.map_err(bff_broker::error::TransportError::from)?;

	tracing::info!(%addr, "BFF broker listening");

	axum::serve(listener, router)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(bff_broker::error::TransportError::from)?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(err) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %err, "failed to install shutdown handler");
	}
}
