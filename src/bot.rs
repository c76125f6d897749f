//! Bot wiring: shared handles, session state, and the event loop.
//!
//! Events are handled one at a time in arrival order. A member-join pass
//! runs to completion before the next event is looked at.

use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, trace, warn};

use crate::config::BotConfig;
use crate::events::GatewayEvent;
use crate::gateway::{self, GatewayConfig};
use crate::handlers;
use crate::http::{DiscordHttpClient, HttpError};
use crate::permissions::RoleIds;
use crate::store::{Store, StoreError};
use crate::types::Snowflake;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("failed to open settings store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] HttpError),
}

/// Identity and lifecycle state for the current process.
#[derive(Debug)]
pub struct BotState {
    pub bot_user_id: Option<Snowflake>,
    pub application_id: Option<Snowflake>,
    /// Slash commands are registered once per process, on the first READY.
    pub commands_registered: bool,
    pub start_time: Instant,
}

impl Default for BotState {
    fn default() -> Self {
        Self {
            bot_user_id: None,
            application_id: None,
            commands_registered: false,
            start_time: Instant::now(),
        }
    }
}

/// Everything a handler needs.
#[derive(Debug)]
pub struct Bot {
    pub http: DiscordHttpClient,
    pub store: Store,
    pub role_ids: RoleIds,
    pub command_guild_id: Option<Snowflake>,
    pub state: BotState,
}

impl Bot {
    pub fn new(config: &BotConfig, store: Store) -> Result<Self, BotError> {
        Ok(Self {
            http: DiscordHttpClient::new(&config.token)?,
            store,
            role_ids: config.role_ids.clone(),
            command_guild_id: config.command_guild_id.clone(),
            state: BotState::default(),
        })
    }

    async fn dispatch(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready(ready) => handlers::on_ready(self, ready).await,
            GatewayEvent::GuildCreate(guild) => handlers::on_guild_create(&guild),
            GatewayEvent::GuildMemberAdd(add) => handlers::on_guild_member_add(self, add).await,
            GatewayEvent::InteractionCreate(interaction) => {
                if let Err(e) = handlers::on_interaction(self, &interaction).await {
                    error!(error = %e, interaction_id = %interaction.id, "failed to answer interaction");
                }
            }
            other => trace!(event = %other.name(), "unhandled gateway event"),
        }
    }
}

/// Open the store, connect to the gateway, and process events until the
/// gateway gives up.
pub async fn start(config: BotConfig) -> Result<(), BotError> {
    let store = Store::open(&config.database_path)?;
    info!(path = %config.database_path.display(), "settings store ready");

    let mut bot = Bot::new(&config, store)?;
    let gw = gateway::connect(GatewayConfig::new(config.token.clone()));
    info!(intents = gateway::INTENTS, "gateway started, entering event loop");

    while let Ok(event) = gw.events.recv().await {
        bot.dispatch(event).await;
    }

    warn!(
        uptime_s = bot.state.start_time.elapsed().as_secs(),
        "event stream ended, bot shutting down"
    );
    Ok(())
}
