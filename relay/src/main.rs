use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_relay::config::RelayConfig;
use chat_relay::pipeline::RelayPipeline;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_relay=info,youtube_chat=info,twitch_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration incomplete: {}", e);
            error!("copy .env.example to .env and fill in your values");
            std::process::exit(1);
        }
    };

    let auto_restart = config.auto_restart;
    let restart_delay = config.restart_delay;

    let mut pipeline = RelayPipeline::new(config);
    let cancel = pipeline.cancel_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    loop {
        match pipeline.run().await {
            Ok(()) => break,
            Err(e) if auto_restart && !pipeline.cancel_token().is_cancelled() => {
                error!(error = %e, delay = ?restart_delay, "relay failed, restarting");
                tokio::time::sleep(restart_delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
