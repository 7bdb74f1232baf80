//! msmp CLI entry point

mod cli;

use crate::cli::{
    BanCommands, Cli, Commands, GameruleCommands, IpBanCommands, OperatorCommands,
    PlayerListCommands, SettingCommands,
};
use anyhow::{Context, Result};
use clap::Parser;
use msmp::management::{IpAddress, IpBan, Operator, Player, TypedRule, UserBan};
use msmp::{Management, MsmpClient, MsmpConfig};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize minimal tracing for CLI
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    let cli = Cli::parse();

    let watching = matches!(cli.command, Commands::Watch);
    let mut config = MsmpConfig::new(&cli.url, &cli.secret)
        .call_timeout(Duration::from_secs(cli.timeout));
    if !watching {
        config = config.no_reconnect();
    }

    let client = MsmpClient::builder(config)
        .notification_handler(|notification| {
            let params = notification.params.clone().unwrap_or(Value::Null);
            println!("{} {}", notification.method, params);
        })
        .build();

    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", cli.url))?;

    let mgmt = Management::new(client.clone());
    let result = run(&mgmt, cli.command).await;

    // The server may already have gone away after `stop`
    let _ = client.disconnect().await;
    result
}

async fn run(mgmt: &Management, command: Commands) -> Result<()> {
    match command {
        Commands::Status => print_json(&mgmt.status().await?),
        Commands::Save => print_json(&mgmt.save().await?),
        Commands::Stop => print_json(&mgmt.stop().await?),
        Commands::Say { message } => print_json(&mgmt.system_message(&message.join(" ")).await?),
        Commands::Players => print_json(&mgmt.players().await?),
        Commands::Kick { name, reason } => {
            print_json(&mgmt.kick(Player::named(name), reason).await?)
        }
        Commands::Allowlist(command) => allowlist(mgmt, command).await,
        Commands::Bans(command) => bans(mgmt, command).await,
        Commands::IpBans(command) => ip_bans(mgmt, command).await,
        Commands::Ops(command) => operators(mgmt, command).await,
        Commands::Gamerules(command) => gamerules(mgmt, command).await,
        Commands::Setting(command) => setting(mgmt, command).await,
        Commands::Call { method, params } => {
            let params = parse_params(params.as_deref())?;
            let response = mgmt.client().call(&method, params).await?;
            print_json(&response.into_result()?)
        }
        Commands::Notify { method, params } => {
            let params = parse_params(params.as_deref())?;
            mgmt.client().notify(&method, params).await?;
            Ok(())
        }
        Commands::Watch => {
            eprintln!("Watching notifications, press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            Ok(())
        }
    }
}

async fn allowlist(mgmt: &Management, command: PlayerListCommands) -> Result<()> {
    let list = mgmt.allowlist();
    let entries = match command {
        PlayerListCommands::List => list.get().await?,
        PlayerListCommands::Add { name } => list.add(&Player::named(name)).await?,
        PlayerListCommands::Remove { name } => list.remove(&Player::named(name)).await?,
        PlayerListCommands::Clear => list.clear().await?,
    };
    print_json(&entries)
}

async fn bans(mgmt: &Management, command: BanCommands) -> Result<()> {
    let list = mgmt.bans();
    let entries = match command {
        BanCommands::List => list.get().await?,
        BanCommands::Add { name, reason, expires } => {
            let mut ban = UserBan::new(Player::named(name));
            ban.reason = reason;
            ban.expires = expires;
            list.add(&ban).await?
        }
        BanCommands::Remove { name } => list.remove(&Player::named(name)).await?,
        BanCommands::Clear => list.clear().await?,
    };
    print_json(&entries)
}

async fn ip_bans(mgmt: &Management, command: IpBanCommands) -> Result<()> {
    let list = mgmt.ip_bans();
    let entries = match command {
        IpBanCommands::List => list.get().await?,
        IpBanCommands::Add { ip, reason, expires } => {
            let mut ban = IpBan::new(ip);
            ban.reason = reason;
            ban.expires = expires;
            list.add(&ban).await?
        }
        IpBanCommands::Remove { ip } => list.remove(&IpAddress { ip }).await?,
        IpBanCommands::Clear => list.clear().await?,
    };
    print_json(&entries)
}

async fn operators(mgmt: &Management, command: OperatorCommands) -> Result<()> {
    let list = mgmt.operators();
    let entries = match command {
        OperatorCommands::List => list.get().await?,
        OperatorCommands::Add { name, level, bypass_player_limit } => {
            let mut op = Operator::new(Player::named(name));
            op.permission_level = level;
            op.bypasses_player_limit = bypass_player_limit.then_some(true);
            list.add(&op).await?
        }
        OperatorCommands::Remove { name } => list.remove(&Player::named(name)).await?,
        OperatorCommands::Clear => list.clear().await?,
    };
    print_json(&entries)
}

async fn gamerules(mgmt: &Management, command: GameruleCommands) -> Result<()> {
    match command {
        GameruleCommands::List => print_json(&mgmt.gamerules().await?),
        GameruleCommands::Set { key, value, kind } => {
            let rule = TypedRule { key, value, kind };
            print_json(&mgmt.update_gamerules(&[rule]).await?)
        }
    }
}

async fn setting(mgmt: &Management, command: SettingCommands) -> Result<()> {
    match command {
        SettingCommands::Get { path } => print_json(&mgmt.setting(&path).await?),
        SettingCommands::Set { path, value } => {
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            print_json(&mgmt.set_setting(&path, &value).await?)
        }
    }
}

fn parse_params(raw: Option<&str>) -> Result<Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).context("Params must be valid JSON"),
        None => Ok(Value::Null),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
