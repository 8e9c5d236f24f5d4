use chatlink_server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load();

    tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .init();

    chatlink_server::run(config).await
}
