use clap::Parser;
use cloudshadow::config::CliConfig;
use cloudshadow::Daemon;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (userdata, rebuild) = CliConfig::parse().into_userdata();

    let daemon = Daemon::new(userdata, rebuild)?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    daemon.run(cancel).await
}
