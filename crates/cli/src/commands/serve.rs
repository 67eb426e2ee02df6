//! `turnrelay serve`: Start the HTTP relay.

use turnrelay_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("turnrelay {}", env!("CARGO_PKG_VERSION"));
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Policy:    {}", config.policy.active_path().display());
    println!("   Store:     {} ({:?})", config.store.backend, config.store.persistence);

    turnrelay_gateway::start(config).await?;

    Ok(())
}
