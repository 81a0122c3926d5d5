// Demo client: joins the server and sends a random counter diff every input interval.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use color_eyre::eyre::{eyre, WrapErr};
use rand::Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use framesync::client::ProgressWatch;
use framesync::config::{config_path, load_config};
use framesync::demo::{CounterDelta, CounterState};
use framesync::{fields, logger, ClientError, GameClient, SimulationState, UdpTransport};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let path = config_path();
    let config = load_config(&path);
    config.validate()?;
    logger::init_from_config(&config.tracing);

    let server_addr: SocketAddr = tokio::net::lookup_host(config.client.server_address.as_str())
        .await
        .wrap_err_with(|| format!("resolving {}", config.client.server_address))?
        .next()
        .ok_or_else(|| eyre!("{} did not resolve", config.client.server_address))?;

    let transport = UdpTransport::bind(config.client.bind_address.as_str(), &config.transport)
        .await
        .wrap_err_with(|| format!("binding {}", config.client.bind_address))?;

    let client = GameClient::new(
        config.client.username.clone(),
        server_addr,
        CounterState::default(),
        transport.outbound,
    );
    info!(
        { fields::USER_NAME } = %client.username(),
        { fields::ADDR } = %transport.local_addr,
        server = %server_addr,
        "Client starting"
    );
    let (handle, mut task) = client.spawn(transport.inbound);
    handle.join().await?;

    let input_interval = Duration::from_millis(config.client.input_interval_ms.max(1));
    let rejoin_interval = Duration::from_millis(config.client.rejoin_interval_ms.max(1));
    let rejoin_every = (config.client.rejoin_interval_ms / input_interval.as_millis() as u64).max(1);
    let mut tick = interval(input_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut unjoined_ticks = 0u64;
    let mut last_frame = 0u64;
    let mut progress = ProgressWatch::new(rejoin_interval, Instant::now());

    loop {
        tokio::select! {
            result = &mut task => {
                let result = result.wrap_err("client task panicked")?;
                if let Err(e) = &result {
                    error!({ fields::ERROR } = %e, "Client stopped");
                }
                return result.map_err(|e| eyre!(e));
            }
            _ = tick.tick() => {
                let diff = rand::thread_rng().gen_range(-9..=9);
                match handle.input(CounterDelta::new(diff).encode()).await {
                    Ok(()) => {
                        unjoined_ticks = 0;
                    }
                    Err(ClientError::NotJoined) => {
                        unjoined_ticks += 1;
                        if unjoined_ticks % rejoin_every == 0 {
                            debug!("Join not acknowledged yet, retrying");
                            handle.join().await?;
                        }
                        continue;
                    }
                    Err(e) => return Err(eyre!(e)),
                }

                let snapshot = handle.snapshot().await?;
                if progress.observe(snapshot.frame, Instant::now()) {
                    warn!(
                        { fields::FRAME } = snapshot.frame,
                        "No frame updates from server, rejoining"
                    );
                    handle.join().await?;
                    continue;
                }
                if snapshot.frame != last_frame {
                    last_frame = snapshot.frame;
                    let mut mirror = CounterState::default();
                    mirror.deserialize(&snapshot.state)?;
                    info!(
                        { fields::FRAME } = snapshot.frame,
                        counter = mirror.counter(),
                        "State mirrored"
                    );
                }
            }
        }
    }
}
