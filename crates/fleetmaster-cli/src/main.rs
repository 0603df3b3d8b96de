//! fleetmaster CLI
//!
//! Command-line interface for operating a fleetmaster daemon

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use url::Url;

use fleetmaster_api::events::FleetEvent;
use fleetmaster_api::responses::{AllocateResponse, FleetActionResponse, ServerSummary};
use fleetmaster_client::{HttpClient, WsClient};

#[derive(Parser)]
#[command(name = "fleetmaster-cli")]
#[command(about = "Operate a game-server fleet", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, env = "FLEETMASTER_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Print raw JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon health
    Health,
    /// List live servers
    #[command(name = "list")]
    List {
        /// Only servers at or over capacity
        #[arg(long)]
        full: bool,
    },
    /// Provision a server
    #[command(name = "add")]
    Add {
        /// Never reap the server for being empty
        #[arg(long)]
        standby: bool,
        /// Host port instead of the next pool port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Tear down the server on a port
    #[command(name = "remove")]
    Remove { port: u16 },
    /// Place a party the way a matchmaker would
    #[command(name = "allocate")]
    Allocate {
        #[arg(default_value_t = 1)]
        party_size: u32,
        /// Player identity for the ban check
        #[arg(long)]
        identity: Option<String>,
    },
    /// Overwrite a server's player count
    #[command(name = "overwrite")]
    Overwrite { port: u16, player_count: u32 },
    /// Occupancy log of a server, removed servers included
    #[command(name = "history")]
    History { server_id: String },
    /// Run a reconciliation pass
    #[command(name = "reconcile")]
    Reconcile,
    /// Start every server's container
    #[command(name = "startall")]
    StartAll,
    /// Stop every managed container
    #[command(name = "stopall")]
    StopAll,
    /// Stream live fleet events
    #[command(name = "watch")]
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.url)?;
    let json = cli.json;

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            if json {
                print_json(&health)?;
            } else {
                println!(
                    "{} fleet={} live_servers={}",
                    health.status, health.fleet, health.live_servers
                );
            }
        }
        Commands::List { full } => {
            let mut request = client.list_servers();
            if full {
                request = request.full();
            }
            let servers = request.send().await?;
            if json {
                print_json(&servers)?;
            } else {
                print_servers(&servers);
            }
        }
        Commands::Add { standby, port } => {
            let server = client.create_server(standby, port).await?;
            report_server(json, "created", &server)?;
        }
        Commands::Remove { port } => {
            let server = client.remove_server(port).await?;
            report_server(json, "removed", &server)?;
        }
        Commands::Allocate {
            party_size,
            identity,
        } => {
            let response = client.allocate(party_size, identity).await?;
            if json {
                print_json(&response)?;
            } else {
                println!("{}", describe_allocation(&response));
            }
        }
        Commands::Overwrite { port, player_count } => {
            let server = client.override_player_count(port, player_count).await?;
            report_server(json, "updated", &server)?;
        }
        Commands::History { server_id } => {
            let history = client.server_history(&server_id).await?;
            if json {
                print_json(&history)?;
            } else {
                print_servers(std::slice::from_ref(&history.server));
                println!();
                for entry in &history.history {
                    println!(
                        "{}  {:>4}  {}",
                        entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.player_count,
                        entry.source
                    );
                }
            }
        }
        Commands::Reconcile => {
            let summary = client.reconcile().await?;
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "orphans removed: {}, stale records removed: {}, replacements: {}, bootstrapped: {}",
                    summary.orphans_removed,
                    summary.stale_records_removed,
                    summary.replacements_provisioned,
                    summary.bootstrapped
                );
                print_errors(&summary.errors);
            }
        }
        Commands::StartAll => {
            let response = client.start_all().await?;
            report_action(json, "started", &response)?;
        }
        Commands::StopAll => {
            let response = client.stop_all().await?;
            report_action(json, "stopped", &response)?;
        }
        Commands::Watch => watch(&cli.url, json).await?,
    }

    Ok(())
}

async fn watch(base: &str, json: bool) -> Result<()> {
    let url = events_url(base)?;
    let mut events = WsClient::connect(url.as_str()).await?;
    eprintln!("watching {url}");

    while let Some(event) = events.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", describe_event(&event));
        }
    }
    Ok(())
}

/// WebSocket events endpoint for an HTTP base URL
fn events_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base)?.join("/ws/events")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| color_eyre::eyre::eyre!("cannot derive a websocket url from {base}"))?;
    Ok(url)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_servers(servers: &[ServerSummary]) {
    println!(
        "{:<6} {:<36} {:<15} {:>9} {:<13} {:<8}",
        "PORT", "SERVER ID", "ADDRESS", "PLAYERS", "STATE", "STANDBY"
    );
    for s in servers {
        println!(
            "{:<6} {:<36} {:<15} {:>9} {:<13} {:<8}",
            s.port,
            s.server_id,
            s.ip_address,
            format!("{}/{}", s.player_count, s.max_capacity),
            s.state,
            if s.standby { "yes" } else { "" }
        );
    }
}

fn report_server(json: bool, verb: &str, server: &ServerSummary) -> Result<()> {
    if json {
        return print_json(server);
    }
    println!(
        "{verb} {} on {}:{} ({})",
        server.server_id, server.ip_address, server.port, server.state
    );
    Ok(())
}

fn report_action(json: bool, verb: &str, response: &FleetActionResponse) -> Result<()> {
    if json {
        return print_json(response);
    }
    println!("{verb} {} containers", response.affected);
    print_errors(&response.errors);
    Ok(())
}

fn print_errors(errors: &[String]) {
    for e in errors {
        eprintln!("error: {e}");
    }
}

fn describe_allocation(response: &AllocateResponse) -> String {
    match response {
        AllocateResponse::Assigned {
            ip_address,
            port,
            server_id,
            player_count,
            max_capacity,
        } => format!("{ip_address}:{port} ({server_id}, {player_count}/{max_capacity})"),
        AllocateResponse::NoCapacity { message } => format!("no capacity: {message}"),
        AllocateResponse::JoiningDisabled { message } => format!("joining disabled: {message}"),
        AllocateResponse::Denied { message } => format!("denied: {message}"),
    }
}

fn describe_event(event: &FleetEvent) -> String {
    match event {
        FleetEvent::ServerProvisioned {
            server_id,
            port,
            standby,
        } => {
            let kind = if *standby { "standby" } else { "on-demand" };
            format!("+ {server_id} provisioned on {port} ({kind})")
        }
        FleetEvent::ServerStateChanged {
            server_id,
            from,
            to,
        } => format!("~ {server_id} {from} -> {to}"),
        FleetEvent::OccupancyChanged {
            server_id,
            player_count,
            max_capacity,
            source,
        } => format!("# {server_id} {player_count}/{max_capacity} ({source})"),
        FleetEvent::ServerRemoved {
            server_id,
            port,
            reason,
        } => format!("- {server_id} removed from {port} ({reason})"),
    }
}
