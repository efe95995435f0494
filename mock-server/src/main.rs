use mock_pce::{AppState, MockConfig};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let retry_after_secs = std::env::var("RETRY_AFTER")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    let config = MockConfig {
        retry_after_secs,
        pending_polls: 1,
        ..MockConfig::default()
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, user = %config.username, "mock PCE listening");
    mock_pce::run_with_state(listener, AppState::new(config)).await
}
