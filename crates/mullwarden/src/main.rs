// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mullwarden::config::{self, ACCOUNT_ID_ENV};
use mullwarden::inventory::{Inventory, RelayFilter};
use mullwarden::reconcile::{AccountState, PeerState, PortForwardSpec, PortForwardState};
use mullwarden::transport::HttpTransport;
use mullwarden::Reconciler;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(distribute)]
    {
        fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    #[cfg(not(distribute))]
    {
        fmt().pretty().with_env_filter(filter).with_writer(std::io::stderr).init();
    }
}

#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("GIT_VERSION"))]
#[command(about = "Manage Mullvad accounts, WireGuard keys and forwarded ports")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "mullwarden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or inspect the account
    #[command(subcommand)]
    Account(AccountCommand),
    /// Register, inspect or revoke WireGuard keys
    #[command(subcommand)]
    Peer(PeerCommand),
    /// Manage forwarded ports
    #[command(subcommand)]
    Port(PortCommand),
    /// List every city with relays
    Cities,
    /// Look up a city by name
    City { name: String },
    /// List relays, optionally filtered
    Relays {
        /// Relay type, e.g. "wireguard" or "openvpn"
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        country: Option<String>,
        /// City name, e.g. "Gothenburg"
        #[arg(long)]
        city: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum AccountCommand {
    Create,
    Show,
}

#[derive(Debug, Subcommand)]
enum PeerCommand {
    Add { public_key: String },
    Show { public_key: String },
    Revoke { public_key: String },
}

#[derive(Debug, Subcommand)]
enum PortCommand {
    Add {
        country: String,
        city: String,
        #[arg(long)]
        peer: Option<String>,
    },
    Show {
        country: String,
        city: String,
        port: u16,
    },
    /// Move a port to another peer (or none) without changing its number
    Relink {
        country: String,
        city: String,
        port: u16,
        #[arg(long)]
        peer: Option<String>,
    },
    Remove {
        country: String,
        city: String,
        port: u16,
    },
}

fn print<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn tracked_port(country: String, city: String, port: u16) -> PortForwardState {
    PortForwardState {
        country_code: country,
        city_code: city,
        peer: None,
        port,
        assigned: false,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let settings = config::load(&args.config)
        .await?
        .with_account_override(std::env::var(ACCOUNT_ID_ENV).ok());
    settings.validate()?;
    info!(config = %args.config.display(), api_url = %settings.api_url, "starting mullwarden");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }
    let mut bind_policy = settings.bind_policy();
    bind_policy.cancel = Some(cancel);

    let reconciler = mullwarden::connect(&settings)?.with_bind_policy(bind_policy);
    run(&reconciler, args.command, settings.account_id).await
}

async fn run(
    reconciler: &Reconciler<HttpTransport>,
    command: Command,
    account_id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let inventory = Inventory::new(reconciler.api());

    match command {
        Command::Account(AccountCommand::Create) => print(&reconciler.create_account().await?)?,
        Command::Account(AccountCommand::Show) => {
            let id = account_id.ok_or("no account ID configured")?;
            let state: AccountState = reconciler.import_account(&id).await?;
            print(&state)?;
        }
        Command::Peer(PeerCommand::Add { public_key }) => {
            print(&reconciler.create_peer(&public_key).await?)?;
        }
        Command::Peer(PeerCommand::Show { public_key }) => {
            let state: PeerState = reconciler.import_peer(&public_key).await?;
            print(&state)?;
        }
        Command::Peer(PeerCommand::Revoke { public_key }) => {
            let state = reconciler.import_peer(&public_key).await?;
            reconciler.delete_peer(&state).await?;
            info!(public_key, "revoked");
        }
        Command::Port(PortCommand::Add { country, city, peer }) => {
            let spec = PortForwardSpec {
                country_code: country,
                city_code: city,
                peer,
            };
            print(&reconciler.create_port_forward(&spec).await?)?;
        }
        Command::Port(PortCommand::Show { country, city, port }) => {
            let state = reconciler
                .read_port_forward(&tracked_port(country, city, port))
                .await?;
            print(&state)?;
        }
        Command::Port(PortCommand::Relink {
            country,
            city,
            port,
            peer,
        }) => {
            let current = reconciler
                .read_port_forward(&tracked_port(country, city, port))
                .await?;
            let desired = PortForwardSpec {
                country_code: current.country_code.clone(),
                city_code: current.city_code.clone(),
                peer,
            };
            print(&reconciler.update_port_forward(&current, &desired).await?)?;
        }
        Command::Port(PortCommand::Remove { country, city, port }) => {
            let deleted = reconciler
                .delete_port_forward(&tracked_port(country, city, port))
                .await?;
            info!(?deleted, "port removed");
        }
        Command::Cities => print(&inventory.list_cities().await?)?,
        Command::City { name } => print(&inventory.find_city(&name).await?)?,
        Command::Relays {
            kind,
            country,
            city,
        } => {
            let filter = RelayFilter {
                kind,
                country_code: country,
                city_name: city,
            };
            let relays = inventory.list_relays(&filter).await?;
            let hostnames: Vec<String> = relays.iter().map(|r| r.fqdn()).collect();
            info!(count = relays.len(), ?hostnames, "matched relays");
            print(&relays)?;
        }
    }

    Ok(())
}
