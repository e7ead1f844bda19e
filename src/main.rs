use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn, Level};

use bulwark::config::ServerConfig;
use bulwark::game::actions::{self, Actions};
use bulwark::game::level;
use bulwark::net::protocol::Inbound;
use bulwark::net::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Bulwark Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(
        "Configuration loaded: {}:{}, tick_rate={}, max_players={}",
        config.bind_address, config.port, config.tick_rate, config.max_players
    );

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

    let server = Server::bind(&config).await?;
    tokio::spawn(server.run(inbound_tx, outgoing_rx));

    let mut ecs = level::build_world(&config, Actions::new(outgoing_tx))?;
    level::scatter_resources(&mut ecs, &config);
    info!("World ready");

    let mut ticker = interval(Duration::from_millis(1000 / config.tick_rate as u64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Drain everything the transport collected since last tick,
                // then advance the simulation exactly once.
                while let Ok(event) = inbound_rx.try_recv() {
                    match event {
                        Inbound::Connected(conn) => {
                            if level::join(&mut ecs, &config, conn).is_none() {
                                warn!("connection {conn} rejected: match is full");
                            }
                        }
                        Inbound::Command(conn, cmd) => {
                            actions::handle_command(&mut ecs, conn, cmd);
                        }
                        Inbound::Disconnected(conn) => {
                            level::handle_disconnect(&mut ecs, conn);
                        }
                    }
                }

                ecs.update();
                level::check_outcome(&mut ecs);

                if ecs.tick_count() % (config.tick_rate as u64 * 30) == 0 {
                    info!(
                        "tick {}: {} entities",
                        ecs.tick_count(),
                        ecs.entities_with(&[]).len()
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Server stopped");
    Ok(())
}
