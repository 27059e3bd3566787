//! Bot engine: connects to the gateway and dispatches events.
//!
//! Each interaction is answered on its own task so a slow REST call never
//! holds up the gateway loop.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, trace, warn};

use crate::commands::Fishery;
use crate::config::BotConfig;
use crate::events::GatewayEvent;
use crate::gateway::{self, GatewayConfig, INTENTS};
use crate::handlers;
use crate::http::{DiscordHttpClient, HttpError};
use crate::store::SqliteStore;
use crate::types::Snowflake;

/// The game as run in production.
pub type Game = Fishery<SqliteStore>;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("gateway stopped")]
    GatewayStopped,
}

/// Lifecycle state owned by the event loop.
#[derive(Debug)]
pub struct BotState {
    /// Application whose commands were registered this run.
    pub commands_registered_for: Option<Snowflake>,
    pub start_time: Instant,
}

impl Default for BotState {
    fn default() -> Self {
        Self {
            commands_registered_for: None,
            start_time: Instant::now(),
        }
    }
}

/// Everything an interaction task needs. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub http: DiscordHttpClient,
    pub fishery: Arc<Game>,
    pub moderator_role_ids: Arc<[Snowflake]>,
}

/// Run until the gateway gives up.
pub async fn run(config: BotConfig, fishery: Arc<Game>) -> Result<(), BotError> {
    let ctx = Context {
        http: DiscordHttpClient::new(&config.token)?,
        fishery,
        moderator_role_ids: config.moderator_role_ids.clone().into(),
    };
    let mut state = BotState::default();

    let gw = gateway::connect(GatewayConfig {
        token: config.token.clone(),
        intents: INTENTS,
        shard: None,
    });
    info!("gateway started, entering event loop");

    while let Ok(event) = gw.events.recv().await {
        match event {
            GatewayEvent::Ready(ready) => {
                handlers::on_ready(&mut state, &ctx.http, &config, &ready).await;
            }
            GatewayEvent::InteractionCreate(interaction) => {
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let id = interaction.id.clone();
                    if let Err(e) = handlers::on_interaction(&ctx, *interaction).await {
                        error!(interaction_id = %id, error = %e, "failed to answer interaction");
                    }
                });
            }
            GatewayEvent::Unknown {
                event_name: Some(name),
                ..
            } => trace!(event = %name, "unhandled gateway event"),
            _ => {}
        }
    }

    warn!(
        uptime_s = state.start_time.elapsed().as_secs(),
        "event stream ended, bot shutting down"
    );
    Err(BotError::GatewayStopped)
}
