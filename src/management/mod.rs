//! Typed wrappers over the `minecraft:` management methods
//!
//! Each wrapper only marshals parameters and decodes the result; all
//! connection handling and correlation stays in [`MsmpClient`].

mod lists;
mod types;

pub use lists::ListEndpoint;
pub use types::{
    IpAddress, IpBan, KickPlayer, Operator, Player, ServerState, TypedRule, UserBan, Version,
};

use lists::positional;
use msmp_client::{MsmpClient, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

pub const SERVER_STATUS: &str = "minecraft:server/status";
pub const SERVER_SAVE: &str = "minecraft:server/save";
pub const SERVER_STOP: &str = "minecraft:server/stop";
pub const SERVER_SYSTEM_MESSAGE: &str = "minecraft:server/system_message";
pub const ALLOWLIST: &str = "minecraft:allowlist";
pub const BANS: &str = "minecraft:bans";
pub const IP_BANS: &str = "minecraft:ip_bans";
pub const OPERATORS: &str = "minecraft:operators";
pub const GAMERULES: &str = "minecraft:gamerules";
pub const GAMERULES_UPDATE: &str = "minecraft:gamerules/update";
pub const PLAYERS: &str = "minecraft:players";
pub const PLAYERS_KICK: &str = "minecraft:players/kick";
pub const SERVER_SETTINGS: &str = "minecraft:serversettings";

/// Management API bound to one client
#[derive(Clone)]
pub struct Management {
    client: MsmpClient,
}

impl Management {
    pub fn new(client: MsmpClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &MsmpClient {
        &self.client
    }

    // Server

    pub async fn status(&self) -> Result<ServerState> {
        self.client.request(SERVER_STATUS, &Value::Null).await
    }

    pub async fn save(&self) -> Result<Value> {
        self.client.request(SERVER_SAVE, &Value::Null).await
    }

    pub async fn stop(&self) -> Result<Value> {
        info!("Requesting server stop");
        self.client.request(SERVER_STOP, &Value::Null).await
    }

    /// Broadcast a system message to every player
    pub async fn system_message(&self, message: &str) -> Result<Value> {
        let params = positional(&json!({ "message": message }))?;
        self.client.request(SERVER_SYSTEM_MESSAGE, &params).await
    }

    // Server settings

    /// Read one setting, e.g. `difficulty` or `max_players`
    pub async fn setting(&self, path: &str) -> Result<Value> {
        let method = format!("{}/{}", SERVER_SETTINGS, path);
        self.client.request(&method, &Value::Null).await
    }

    pub async fn set_setting<V>(&self, path: &str, value: &V) -> Result<Value>
    where
        V: Serialize + ?Sized,
    {
        let method = format!("{}/{}/set", SERVER_SETTINGS, path);
        debug!(path, "Updating server setting");
        let params = positional(&json!({ "value": serde_json::to_value(value)? }))?;
        self.client.request(&method, &params).await
    }

    // Lists

    pub fn allowlist(&self) -> ListEndpoint<'_, Player> {
        ListEndpoint::new(&self.client, ALLOWLIST)
    }

    pub fn bans(&self) -> ListEndpoint<'_, UserBan> {
        ListEndpoint::new(&self.client, BANS)
    }

    pub fn ip_bans(&self) -> ListEndpoint<'_, IpBan> {
        ListEndpoint::new(&self.client, IP_BANS)
    }

    pub fn operators(&self) -> ListEndpoint<'_, Operator> {
        ListEndpoint::new(&self.client, OPERATORS)
    }

    // Game rules

    pub async fn gamerules(&self) -> Result<Vec<TypedRule>> {
        self.client.request(GAMERULES, &Value::Null).await
    }

    pub async fn update_gamerules(&self, rules: &[TypedRule]) -> Result<Vec<TypedRule>> {
        self.client
            .request(GAMERULES_UPDATE, &positional(rules)?)
            .await
    }

    // Players

    pub async fn players(&self) -> Result<Vec<Player>> {
        self.client.request(PLAYERS, &Value::Null).await
    }

    pub async fn kick(&self, player: Player, reason: Option<String>) -> Result<Value> {
        info!(player = ?player.name, "Kicking player");
        let params = positional(&KickPlayer { player, reason })?;
        self.client.request(PLAYERS_KICK, &params).await
    }
}
