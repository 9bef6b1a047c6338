use anyhow::{anyhow, Result};
use clap::Parser;
use colored::*;
use events::{EventTypeSet, RealtimeEvent, Severity};
use realtime_client::{
    ApiClient, ClientReconnector, ConnectionState, EventSourceConnector, ReconnectConfig,
    SubscribeRequest,
};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "realtime-client")]
#[command(about = "Subscribe to a user's realtime event stream")]
struct Cli {
    /// Base URL of the backend (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// User to subscribe as, sent in the x-user-id header
    #[arg(long)]
    user_id: String,

    /// Comma separated event types to receive (default: all)
    #[arg(long)]
    types: Option<String>,

    /// Resume after this event id
    #[arg(long)]
    last_event_id: Option<String>,

    /// Reconnection attempt n waits n times this many seconds
    #[arg(long, default_value_t = 3)]
    base_interval_secs: u64,

    /// Consecutive failed reconnections before giving up
    #[arg(long, default_value_t = 5)]
    max_attempts: u32,

    /// Send a notification with this title to the user once subscribed
    #[arg(long)]
    send_notification: Option<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    let filter = match cli.types.as_deref() {
        Some(list) => EventTypeSet::parse_list(list)
            .map_err(|e| anyhow!("Unknown event type: {}", e.0))?,
        None => EventTypeSet::default(),
    };
    let types = if filter.is_unfiltered() {
        Vec::new()
    } else {
        filter.types()
    };

    let request = SubscribeRequest::new(cli.user_id.clone())
        .types(types)
        .last_event_id(cli.last_event_id.clone());
    let config = ReconnectConfig {
        base_interval: Duration::from_secs(cli.base_interval_secs),
        max_attempts: cli.max_attempts,
    };

    println!(
        "{} Subscribing to {} as {}",
        "→".blue(),
        request.url(&cli.base_url)?,
        cli.user_id
    );
    let mut client = ClientReconnector::connect(
        EventSourceConnector::new(cli.base_url.clone()),
        request,
        config,
    );
    let mut states = client.state_changes();
    let mut pending_notification = cli.send_notification.clone();

    loop {
        tokio::select! {
            event = client.next_event() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                print_state(state);

                if state == ConnectionState::Live {
                    if let Some(title) = pending_notification.take() {
                        send_notification(&cli.base_url, &cli.user_id, &title).await?;
                    }
                }
                if state == ConnectionState::Failed {
                    println!("{} Giving up", "✗".red());
                    std::process::exit(1);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                client.disconnect();
                println!("\n{} Disconnected", "→".blue());
                break;
            }
        }
    }

    Ok(())
}

async fn send_notification(base_url: &str, user_id: &str, title: &str) -> Result<()> {
    let api_client = ApiClient::new(reqwest::Client::new(), base_url.to_string());
    let notification = api_client
        .send_notification(user_id, title, "Sent from realtime-client", Severity::Info)
        .await?;
    println!(
        "{} Notification sent (ID: {})",
        "✓".green(),
        notification.id
    );
    Ok(())
}

fn print_state(state: ConnectionState) {
    match state {
        ConnectionState::Connecting => println!("{} Connecting...", "→".blue()),
        ConnectionState::Replaying => println!("{} Connected, replaying missed events", "✓".green()),
        ConnectionState::Live => println!("{} Live", "✓".green()),
        ConnectionState::Backoff { attempt } => {
            println!("{} Connection lost, retry {attempt} pending", "!".yellow())
        }
        ConnectionState::Failed => println!("{} Connection failed", "✗".red()),
        ConnectionState::Closed => println!("{} Closed", "→".blue()),
    }
}

fn print_event(event: &RealtimeEvent) {
    let data = event
        .payload
        .data()
        .map(|data| data.to_string())
        .unwrap_or_default();
    println!(
        "{} [{}] {} {}",
        event.timestamp.format("%H:%M:%S").to_string().dimmed(),
        event.id,
        event.event_type().as_str().cyan().bold(),
        data
    );
}
