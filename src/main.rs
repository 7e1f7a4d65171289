//! # rolesync
//!
//! Command-line entry point: wires settings, telemetry, the SQLite stores and
//! the HTTP collaborators into a reconciliation [`Coordinator`].

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use rolesync_clients::{DiscordDirectory, GameApiClient};
use rolesync_core::clock::SystemClock;
use rolesync_core::ids::{GuildId, PlayerTag, RoleId, UserId};
use rolesync_core::settings::SettingKey;
use rolesync_engine::{
    ClanEvent, Coordinator, EngineOptions, Reconciler, TargetSet, UpdateOptions, UpdateTarget,
};
use rolesync_settings::RoleSyncSettings;
use rolesync_store::{Database, LinkRepo, RoleDelayRepo, SettingsRepo};
use rolesync_telemetry::{init_telemetry, TelemetryConfig};

/// Keep chat roles and nicknames in sync with linked game accounts.
#[derive(Parser, Debug)]
#[command(name = "rolesync", about = "Role and nickname reconciliation")]
struct Cli {
    /// Settings file (defaults to `~/.rolesync/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from settings.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read newline-delimited clan events from stdin and run the delay sweep.
    Serve,

    /// Reconcile members of a guild now.
    Update {
        #[arg(long)]
        guild: String,
        /// Only members currently holding this role.
        #[arg(long, conflicts_with = "user")]
        role: Option<String>,
        /// Only this user.
        #[arg(long)]
        user: Option<String>,
        /// Apply every change immediately, ignoring delays.
        #[arg(long)]
        force: bool,
        /// Report changes without editing anyone.
        #[arg(long)]
        dry_run: bool,
    },

    /// Link a game account to a user.
    Link {
        #[arg(long)]
        user: String,
        #[arg(long)]
        tag: String,
        #[arg(long)]
        verified: bool,
        /// Reconcile the user in this guild right after linking.
        #[arg(long)]
        guild: Option<String>,
    },

    /// Remove a linked account.
    Unlink {
        #[arg(long)]
        user: String,
        #[arg(long)]
        tag: String,
    },

    /// Set a per-guild setting to a JSON value.
    Setting {
        #[arg(long)]
        guild: String,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

struct App {
    settings: RoleSyncSettings,
    db: Database,
}

impl App {
    fn coordinator(&self) -> Coordinator {
        let game = Arc::new(GameApiClient::new(
            &self.settings.game_api.base_url,
            &self.settings.game_api.token,
        ));
        let directory = Arc::new(DiscordDirectory::new(
            &self.settings.discord.base_url,
            &self.settings.discord.token,
        ));
        let options = EngineOptions {
            fetch_concurrency: self.settings.engine.fetch_concurrency,
            edit_delay: self.settings.engine.edit_delay(),
        };
        let reconciler = Reconciler::new(
            game,
            directory,
            Arc::new(LinkRepo::new(self.db.clone())),
            Arc::new(SettingsRepo::new(self.db.clone())),
            RoleDelayRepo::new(self.db.clone()),
            Arc::new(SystemClock),
            options,
        );
        Coordinator::new(reconciler)
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn serve(app: &App) -> Result<()> {
    let coordinator = app.coordinator();
    let sweep = coordinator.spawn_sweep(app.settings.engine.sweep_interval());
    tracing::info!(
        interval_secs = app.settings.engine.sweep_interval_secs,
        "delay sweep started"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("Failed to read stdin")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => handle_event_line(&coordinator, &line).await,
                    None => {
                        tracing::info!("event stream closed, sweep keeps running");
                        stdin_open = false;
                    }
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for ctrl+c")?;
                break;
            }
        }
    }

    sweep.abort();
    tracing::info!("Shutting down");
    Ok(())
}

async fn handle_event_line(coordinator: &Coordinator, line: &str) {
    let event: ClanEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed event");
            return;
        }
    };
    let Some(clan) = event.clan.as_ref().map(|c| c.tag.clone()) else {
        tracing::warn!("skipping event without clan");
        return;
    };
    if let Err(e) = coordinator.exec(&clan, &event).await {
        tracing::warn!(clan_tag = %clan, error = %e, "event dispatch failed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => rolesync_settings::load_settings_from_path(path),
        None => rolesync_settings::load_settings(),
    }
    .context("Failed to load settings")?;
    if let Some(path) = cli.db_path {
        settings.database.path = path;
    }

    init_telemetry(&TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ));

    ensure_parent_dir(&settings.database.path)?;
    let db = Database::open(&settings.database.path).with_context(|| {
        format!(
            "Failed to open database: {}",
            settings.database.path.display()
        )
    })?;
    tracing::info!(path = %settings.database.path.display(), "Database opened");
    let app = App { settings, db };

    match cli.command {
        Command::Serve => serve(&app).await?,

        Command::Update {
            guild,
            role,
            user,
            force,
            dry_run,
        } => {
            let target = match (role, user) {
                (Some(role), _) => UpdateTarget::Role(RoleId::from_raw(role)),
                (None, Some(user)) => {
                    UpdateTarget::Members(TargetSet::from_users([UserId::from_raw(user)]))
                }
                (None, None) => UpdateTarget::All,
            };
            let options = UpdateOptions {
                target,
                force,
                dry_run,
            };
            let log = app
                .coordinator()
                .update_many(&GuildId::from_raw(guild), options)
                .await?;
            match log {
                Some(log) => print_json(&log)?,
                None => println!("nothing to reconcile"),
            }
        }

        Command::Link {
            user,
            tag,
            verified,
            guild,
        } => {
            let user = UserId::from_raw(user);
            let links = LinkRepo::new(app.db.clone());
            let account = links.link(&user, &PlayerTag::new(&tag), verified)?;
            print_json(&account)?;
            if let Some(guild) = guild {
                let log = app
                    .coordinator()
                    .update_one(&user, &GuildId::from_raw(guild))
                    .await?;
                if let Some(log) = log {
                    print_json(&log)?;
                }
            }
        }

        Command::Unlink { user, tag } => {
            let links = LinkRepo::new(app.db.clone());
            if !links.unlink(&UserId::from_raw(user), &PlayerTag::new(&tag))? {
                bail!("no live link for {tag}");
            }
        }

        Command::Setting { guild, key, value } => {
            let key: SettingKey = key.parse().map_err(anyhow::Error::msg)?;
            let value: serde_json::Value =
                serde_json::from_str(&value).context("Setting value must be JSON")?;
            SettingsRepo::new(app.db.clone()).set(&GuildId::from_raw(guild), key, &value)?;
        }
    }

    Ok(())
}
