//! CLI command implementations.

use crate::output::{event_line, professional_detail, professional_line, slot_line};
use avail_core::{
    AvailabilityEvent, AvailabilitySlot, AvailabilityStatus, Profession, Professional,
    ProfessionalId, SlotId,
};
use avail_server::protocol::{
    HistoryParams, ProfessionalParams, RecentParams, RegisterParams, SlotAddParams,
    SlotRemoveParams, StatusSetParams, SubscriptionParams,
};
use avail_server::{AvailServer, ClientError, RpcClient, ServerConfig, ServerMessage};
use avail_store::AvailabilityStore;
use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const CONFIG_FILE: &str = "config.json";

fn config_path(root: &Path) -> PathBuf {
    root.join(".avail").join(CONFIG_FILE)
}

/// Config used by client commands: the project's, then the user's.
fn client_config() -> Result<ServerConfig> {
    let local = config_path(Path::new("."));
    if local.exists() {
        return Ok(ServerConfig::load(&local)?);
    }

    match dirs::config_dir() {
        Some(dir) => Ok(ServerConfig::load_or_default(
            &dir.join("avail").join(CONFIG_FILE),
        )?),
        None => Ok(ServerConfig::default()),
    }
}

/// Resolves the server URL. An explicit `--url` always wins.
pub fn server_url(url: Option<String>, config: &ServerConfig) -> String {
    if let Some(url) = url {
        return url;
    }

    let mut addr = config.addr;
    if addr.ip().is_unspecified() {
        addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
    format!("ws://{}", addr)
}

async fn connect(url: Option<String>) -> Result<RpcClient> {
    let url = match url {
        Some(url) => url,
        None => server_url(None, &client_config()?),
    };
    debug!("Connecting to {}", url);

    match RpcClient::connect(&url).await {
        Ok(client) => Ok(client),
        Err(e) => Err(format!("cannot reach server at {} ({})", url, e).into()),
    }
}

async fn call<P: Serialize>(client: &mut RpcClient, method: &str, params: &P) -> Result<Value> {
    Ok(client.call(method, serde_json::to_value(params)?).await?)
}

/// Takes one field out of a result object.
fn field<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T> {
    let inner = value.get_mut(key).map(Value::take).unwrap_or(Value::Null);
    Ok(serde_json::from_value(inner)?)
}

/// Initialize a project directory.
pub fn init(path: &Path) -> Result<()> {
    let config_path = config_path(path);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    ServerConfig::default().save(&config_path)?;

    println!("{} Initialized avail in {}", "✓".green(), path.display());
    println!("  Run {} to start the server", "avail serve".cyan());

    Ok(())
}

/// Start the availability server.
pub async fn serve(port: Option<u16>, headless: bool, path: &Path) -> Result<()> {
    let mut config = ServerConfig::load_or_default(&config_path(path))?;
    if headless {
        config.addr.set_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    if let Some(port) = port {
        config.addr.set_port(port);
    }

    if headless {
        println!("{}", "Starting availability server in headless mode...".cyan());
    } else {
        println!("{}", "Starting availability server...".cyan());
    }

    let data_dir = config.resolve_data_dir(path);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(format!("Opening store at {}...", data_dir.display()));

    let store = Arc::new(AvailabilityStore::open(&data_dir)?);

    spinner.finish_and_clear();

    let stats = store.stats();
    println!(
        "{} Loaded {} professionals ({} events, {} slots)",
        "✓".green(),
        stats.professionals.to_string().cyan(),
        stats.events.to_string().cyan(),
        stats.slots.to_string().cyan()
    );

    let addr = config.addr;
    let server = AvailServer::new_with_shared(store.clone(), config);

    println!("{} Listening on ws://{}", "✓".green(), addr);
    if headless {
        println!("  Headless mode: accepting connections from any host");
    }
    println!("  Press {} to stop", "Ctrl+C".cyan());

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    store.flush()?;
    println!("{} Store flushed, bye", "✓".green());

    Ok(())
}

/// Register a professional.
pub async fn register(
    url: Option<String>,
    name: String,
    profession: Profession,
    id: Option<ProfessionalId>,
    status: Option<AvailabilityStatus>,
) -> Result<()> {
    let mut client = connect(url).await?;
    let params = RegisterParams {
        id,
        name,
        profession,
        status,
    };

    let result = call(&mut client, "professional.register", &params).await?;
    let professional: Professional = serde_json::from_value(result)?;
    println!("{} Registered {}", "✓".green(), professional_line(&professional));

    client.close().await?;
    Ok(())
}

/// Change a professional's status.
pub async fn set(
    url: Option<String>,
    id: ProfessionalId,
    status: AvailabilityStatus,
    reason: Option<String>,
) -> Result<()> {
    let mut client = connect(url).await?;
    let params = StatusSetParams {
        professional_id: id,
        status,
        reason,
    };

    let result = call(&mut client, "status.set", &params).await?;
    let event: AvailabilityEvent = serde_json::from_value(result)?;
    println!("{} {}", "✓".green(), event_line(&event));

    client.close().await?;
    Ok(())
}

/// Show one professional or all of them.
pub async fn status(url: Option<String>, id: Option<ProfessionalId>) -> Result<()> {
    let mut client = connect(url).await?;

    match id {
        Some(professional_id) => {
            let result = call(
                &mut client,
                "status.get",
                &ProfessionalParams { professional_id },
            )
            .await?;
            let professional: Professional = serde_json::from_value(result)?;
            println!("{}", professional_detail(&professional));
        }
        None => {
            let result = client.call("professional.list", Value::Null).await?;
            let professionals: Vec<Professional> = field(result, "professionals")?;

            if professionals.is_empty() {
                println!("No professionals registered");
                println!("  Run {} to add one", "avail register".cyan());
            } else {
                println!("{}", "Professionals".cyan().bold());
                println!();
                for professional in &professionals {
                    println!("  {}", professional_line(professional));
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

/// Show a professional's status history.
pub async fn history(url: Option<String>, id: ProfessionalId, limit: usize) -> Result<()> {
    let mut client = connect(url).await?;
    let params = HistoryParams {
        professional_id: id.clone(),
        limit,
    };

    let result = call(&mut client, "status.history", &params).await?;
    let events: Vec<AvailabilityEvent> = field(result, "events")?;

    if events.is_empty() {
        println!("No status changes recorded for {}", id.as_str().cyan());
    } else {
        for event in &events {
            println!("{}", event_line(event));
        }
    }

    client.close().await?;
    Ok(())
}

/// Show the latest status changes across every professional.
pub async fn recent(url: Option<String>, limit: usize) -> Result<()> {
    let mut client = connect(url).await?;

    let result = call(&mut client, "status.recent", &RecentParams { limit }).await?;
    let events: Vec<AvailabilityEvent> = field(result, "events")?;

    if events.is_empty() {
        println!("No status changes recorded yet");
    } else {
        for event in &events {
            println!("{}", event_line(event));
        }
    }

    client.close().await?;
    Ok(())
}

/// Register every professional in a roster file.
///
/// The roster is a JSON array of `{id?, name, profession, status?}`
/// objects. Entries the server rejects are reported and skipped.
pub async fn import(url: Option<String>, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file)?;
    let roster: Vec<RegisterParams> = serde_json::from_str(&text)?;

    let mut client = connect(url).await?;

    let bar = ProgressBar::new(roster.len() as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut imported = 0usize;
    let mut rejected = Vec::new();

    for entry in &roster {
        bar.set_message(entry.name.clone());
        match call(&mut client, "professional.register", entry).await {
            Ok(_) => imported += 1,
            Err(e) => match e.downcast_ref::<ClientError>() {
                Some(ClientError::Rpc { message, .. }) => {
                    rejected.push((entry.name.clone(), message.clone()))
                }
                _ => {
                    bar.abandon();
                    return Err(e);
                }
            },
        }
        bar.inc(1);
    }

    bar.finish_and_clear();

    println!(
        "{} Imported {} of {} professionals",
        "✓".green(),
        imported.to_string().cyan(),
        roster.len()
    );

    if !rejected.is_empty() {
        println!("\n{} entries rejected:", "⚠".yellow());
        for (name, reason) in rejected.iter().take(5) {
            println!("  {} - {}", name.red(), reason);
        }
        if rejected.len() > 5 {
            println!("  ... and {} more", rejected.len() - 5);
        }
    }

    client.close().await?;
    Ok(())
}

/// Print status changes until interrupted.
pub async fn watch(url: Option<String>, ids: Vec<ProfessionalId>) -> Result<()> {
    let mut client = connect(url).await?;
    let count = ids.len();

    call(
        &mut client,
        "subscribe",
        &SubscriptionParams {
            professional_ids: ids,
        },
    )
    .await?;

    println!(
        "{} Watching {} professionals. Press {} to stop",
        "✓".green(),
        count,
        "Ctrl+C".cyan()
    );

    loop {
        tokio::select! {
            msg = client.next_message() => match msg? {
                ServerMessage::AvailabilityChanged(event) => println!("{}", event_line(&event)),
                ServerMessage::Welcome(welcome) => {
                    debug!("Connected as {}", welcome.connection_id);
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await?;
    Ok(())
}

/// Schedule a slot.
pub async fn slot_add(
    url: Option<String>,
    id: ProfessionalId,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: AvailabilityStatus,
) -> Result<()> {
    let mut client = connect(url).await?;
    let params = SlotAddParams {
        professional_id: id,
        start,
        end,
        status,
    };

    let result = call(&mut client, "schedule.add", &params).await?;
    let slot: AvailabilitySlot = serde_json::from_value(result)?;
    println!("{} Scheduled {}", "✓".green(), slot_line(&slot));

    client.close().await?;
    Ok(())
}

/// List a professional's slots.
pub async fn slot_list(url: Option<String>, id: ProfessionalId) -> Result<()> {
    let mut client = connect(url).await?;

    let result = call(
        &mut client,
        "schedule.list",
        &ProfessionalParams {
            professional_id: id.clone(),
        },
    )
    .await?;
    let slots: Vec<AvailabilitySlot> = field(result, "slots")?;

    if slots.is_empty() {
        println!("No slots scheduled for {}", id.as_str().cyan());
    } else {
        for slot in &slots {
            println!("{}", slot_line(slot));
        }
    }

    client.close().await?;
    Ok(())
}

/// Remove a slot.
pub async fn slot_remove(url: Option<String>, id: ProfessionalId, slot: SlotId) -> Result<()> {
    let mut client = connect(url).await?;
    let params = SlotRemoveParams {
        slot_id: slot,
        professional_id: id,
    };

    let result = call(&mut client, "schedule.remove", &params).await?;
    let removed: AvailabilitySlot = serde_json::from_value(result)?;
    println!("{} Removed {}", "✓".green(), slot_line(&removed));

    client.close().await?;
    Ok(())
}

/// Show server statistics.
pub async fn info(url: Option<String>) -> Result<()> {
    let mut client = connect(url).await?;
    let info = client.call("server.info", Value::Null).await?;

    println!("{}", "Server Status".cyan().bold());
    println!();
    for (label, key) in [
        ("Version:", "version"),
        ("Uptime (s):", "uptimeSecs"),
        ("Connections:", "connections"),
        ("Subscriptions:", "subscriptions"),
        ("Professionals:", "professionals"),
        ("Events:", "events"),
        ("Slots:", "slots"),
        ("Last sequence:", "lastSequence"),
    ] {
        let value = match &info[key] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {} {}", label.dimmed(), value);
    }

    client.close().await?;
    Ok(())
}
