use messaging_service::{config::Config, logging, rpc, state::AppState};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env()?;
    let state = AppState::from_config(config).await?;

    tracing::info!("messaging-service ready, reading JSON-lines requests from stdin");
    rpc::serve(&state, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    tracing::info!("stdin closed, shutting down");
    state.shutdown().await;
    Ok(())
}
