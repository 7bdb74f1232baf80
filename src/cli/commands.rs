//! CLI command definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "msmp")]
#[command(about = "Minecraft Server Management Protocol client", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Management server URL
    #[arg(long, env = "MSMP_URL", default_value = "ws://localhost:25576", global = true)]
    pub url: String,

    /// Management secret
    #[arg(long, env = "MSMP_SECRET", default_value = "", hide_env_values = true, global = true)]
    pub secret: String,

    /// Seconds to wait for each response
    #[arg(long, default_value_t = 30, global = true)]
    pub timeout: u64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show server status
    Status,

    /// Save the world
    Save,

    /// Stop the server
    Stop,

    /// Broadcast a system message
    Say {
        /// Message text
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// List connected players
    Players,

    /// Kick a player
    Kick {
        /// Player name
        name: String,

        /// Reason shown to the player
        #[arg(long)]
        reason: Option<String>,
    },

    /// Manage the allowlist
    #[command(subcommand)]
    Allowlist(PlayerListCommands),

    /// Manage player bans
    #[command(subcommand)]
    Bans(BanCommands),

    /// Manage IP bans
    #[command(subcommand)]
    IpBans(IpBanCommands),

    /// Manage operators
    #[command(subcommand)]
    Ops(OperatorCommands),

    /// Read or update game rules
    #[command(subcommand)]
    Gamerules(GameruleCommands),

    /// Read or change server settings
    ///
    /// Examples:
    ///   msmp setting get difficulty
    ///   msmp setting set max_players 40
    #[command(subcommand)]
    Setting(SettingCommands),

    /// Send a raw request and print the response
    ///
    /// Examples:
    ///   msmp call minecraft:server/status
    ///   msmp call minecraft:allowlist/add '[{"name":"jeb_"}]'
    Call {
        /// Method name
        method: String,

        /// Parameters as JSON
        params: Option<String>,
    },

    /// Send a raw notification
    Notify {
        /// Method name
        method: String,

        /// Parameters as JSON
        params: Option<String>,
    },

    /// Print server notifications until interrupted
    Watch,
}

#[derive(Subcommand)]
pub enum PlayerListCommands {
    /// Show the list
    List,

    /// Add a player
    Add { name: String },

    /// Remove a player
    Remove { name: String },

    /// Remove every entry
    Clear,
}

#[derive(Subcommand)]
pub enum BanCommands {
    /// Show banned players
    List,

    /// Ban a player
    Add {
        name: String,

        #[arg(long)]
        reason: Option<String>,

        /// Expiry timestamp (ISO 8601)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Lift a ban
    Remove { name: String },

    /// Lift every ban
    Clear,
}

#[derive(Subcommand)]
pub enum IpBanCommands {
    /// Show banned addresses
    List,

    /// Ban an address
    Add {
        ip: String,

        #[arg(long)]
        reason: Option<String>,

        /// Expiry timestamp (ISO 8601)
        #[arg(long)]
        expires: Option<String>,
    },

    /// Lift a ban
    Remove { ip: String },

    /// Lift every ban
    Clear,
}

#[derive(Subcommand)]
pub enum OperatorCommands {
    /// Show operators
    List,

    /// Make a player an operator
    Add {
        name: String,

        /// Permission level (1-4)
        #[arg(long, value_parser = parse_permission_level)]
        level: Option<u8>,

        /// Allow joining when the server is full
        #[arg(long)]
        bypass_player_limit: bool,
    },

    /// Revoke operator status
    Remove { name: String },

    /// Revoke every operator
    Clear,
}

#[derive(Subcommand)]
pub enum GameruleCommands {
    /// Show every game rule
    List,

    /// Update one game rule
    Set {
        key: String,
        value: String,

        /// Rule type, e.g. boolean or integer
        #[arg(long = "type")]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SettingCommands {
    /// Read a setting
    Get { path: String },

    /// Change a setting; the value is parsed as JSON, falling back to a string
    Set { path: String, value: String },
}

fn parse_permission_level(s: &str) -> Result<u8, String> {
    match s.parse::<u8>() {
        Ok(level @ 1..=4) => Ok(level),
        _ => Err(format!("Invalid permission level: {}. Must be 1, 2, 3, or 4", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_permission_level() {
        assert_eq!(parse_permission_level("4"), Ok(4));
        assert!(parse_permission_level("0").is_err());
        assert!(parse_permission_level("op").is_err());
    }

    #[test]
    fn test_parse_raw_call() {
        let cli = Cli::try_parse_from([
            "msmp",
            "--url",
            "ws://mc.example:25576",
            "call",
            "minecraft:allowlist/add",
            r#"[{"name":"jeb_"}]"#,
        ])
        .unwrap();

        assert_eq!(cli.url, "ws://mc.example:25576");
        match cli.command {
            Commands::Call { method, params } => {
                assert_eq!(method, "minecraft:allowlist/add");
                assert!(params.is_some());
            }
            _ => panic!("expected call"),
        }
    }
}
