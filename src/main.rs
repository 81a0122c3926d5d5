use color_eyre::eyre::eyre;
use tracing::{error, info};

use framesync::config::{config_path, load_config};
use framesync::demo::CounterState;
use framesync::{fields, logger, GameServer, UdpTransport};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let path = config_path();
    let config = load_config(&path);
    config.validate()?;
    logger::init_from_config(&config.tracing);

    info!(
        { fields::CONFIG_SOURCE } = path.as_str(),
        { fields::PORT } = config.server.port,
        { fields::TICK_INTERVAL_MS } = config.server.tick_interval_ms,
        { fields::FRAME_BUFFER_SIZE } = config.server.frame_buffer_size,
        tracing_format = config.tracing.format.as_str(),
        tracing_level = config.tracing.level.as_str(),
        "Server configuration loaded"
    );

    let transport = UdpTransport::bind(config.server.listen_address(), &config.transport)
        .await
        .map_err(|e| {
            error!(
                { fields::PORT } = config.server.port,
                { fields::ERROR } = %e,
                "Failed to bind server socket"
            );
            e
        })?;

    info!(
        { fields::ADDR } = %transport.local_addr,
        "Server ready to accept clients"
    );

    let server = GameServer::new(CounterState::default(), &config.server, transport.outbound);
    match server.run(transport.inbound).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!({ fields::ERROR } = %e, "Game server stopped");
            Err(eyre!(e))
        }
    }
}
