//! cast-connect - Manage social network integrations
//!
//! Stores the OAuth credentials obtained elsewhere, lists and removes them,
//! and drives the Facebook page picker (fetch pages, then pick one).

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libcrosscast::service::CrosscastService;
use libcrosscast::types::PendingSelection;
use libcrosscast::{logging, CrosscastError, Integration, Platform, Result};

#[derive(Parser, Debug)]
#[command(name = "cast-connect")]
#[command(version)]
#[command(about = "Manage social network integrations")]
#[command(long_about = "\
cast-connect - Manage social network integrations

DESCRIPTION:
    cast-connect stores the credentials Crosscast publishes with. The OAuth
    consent flow itself happens in a browser; hand the resulting tokens to
    cast-connect and they are kept in the Crosscast database, one active
    integration per user and network.

    Facebook posts go to a page, not to a profile. Run `pages` with the user
    token to list the pages it manages, then `select` one of them.

COMMANDS:
    connect     Store or replace the integration for a network
    list        List integrations (tokens are never printed)
    disconnect  Deactivate the integration for a network
    pages       Start a Facebook page selection
    select      Finish a Facebook page selection

USAGE EXAMPLES:
    # Twitter/X with an OAuth2 user token
    cast-connect connect twitter --token <TOKEN> --username alice_dev

    # LinkedIn needs the member id
    cast-connect connect linkedin --token <TOKEN> --external-id <MEMBER_ID>

    # Reddit with a refresh token, posting to r/rust
    cast-connect connect reddit --token <TOKEN> --refresh-token <REFRESH> \\
        --expires-in 3600 --subreddit rust

    # Facebook page picker
    cast-connect pages --token <USER_TOKEN>
    cast-connect select <SELECTION_ID> <PAGE_ID>

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    Override with environment variables:
        CROSSCAST_CONFIG    - Path to config file
        CROSSCAST_USER      - User the integrations belong to (same as --user)

EXIT CODES:
    0 - Success
    1 - Operation failed (e.g. Facebook rejected the token)
    2 - Database or configuration error
    3 - Invalid input or nothing to act on
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User the integrations belong to
    #[arg(short, long, global = true, env = "CROSSCAST_USER", default_value = "default")]
    user: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store credentials for a network
    Connect {
        /// Network name (linkedin, facebook, twitter, threads, reddit, instagram)
        platform: String,

        /// Access token
        #[arg(long)]
        token: String,

        /// Refresh token (Reddit)
        #[arg(long)]
        refresh_token: Option<String>,

        /// Seconds until the access token expires
        #[arg(long, value_name = "SECONDS")]
        expires_in: Option<i64>,

        /// Account id on the network (LinkedIn member, Instagram or Threads user)
        #[arg(long)]
        external_id: Option<String>,

        /// Display name, used to build post URLs
        #[arg(long)]
        username: Option<String>,

        /// Target subreddit (Reddit)
        #[arg(long)]
        subreddit: Option<String>,

        /// Page id (Facebook)
        #[arg(long)]
        page_id: Option<String>,

        /// Page access token (Facebook)
        #[arg(long)]
        page_token: Option<String>,
    },

    /// List integrations
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Deactivate the integration for a network
    Disconnect {
        /// Network name
        platform: String,
    },

    /// Fetch the Facebook pages a user token manages
    Pages {
        /// Facebook user access token
        #[arg(long)]
        token: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Connect one of the pages offered by `pages`
    Select {
        /// Selection id printed by `pages`
        selection_id: String,

        /// Page id to connect
        page_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_for_cli(cli.verbose, "error");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let user = cli.user;
    match cli.command {
        Commands::Connect {
            platform,
            token,
            refresh_token,
            expires_in,
            external_id,
            username,
            subreddit,
            page_id,
            page_token,
        } => {
            let platform = parse_platform(&platform)?;
            let now = Utc::now().timestamp();

            let mut integration = Integration::new(&user, platform, &token);
            integration.secondary_token = refresh_token;
            integration.expires_at = expires_in.map(|secs| now + secs);
            integration.external_id = external_id;
            integration.username = username;
            integration.subreddit = subreddit;
            integration.page_id = page_id;
            integration.page_token = page_token;

            let service = CrosscastService::new().await?;
            let stored = service.connections().connect(integration).await?;
            println!("Connected {} ({})", stored.platform, stored.id);
            Ok(())
        }
        Commands::List { format } => {
            let json = parse_format(&format)?;
            let service = CrosscastService::new().await?;
            let integrations = service.connections().list(&user).await?;
            if json {
                let redacted: Vec<serde_json::Value> =
                    integrations.iter().map(integration_json).collect();
                print_json(&serde_json::json!(redacted));
            } else {
                let now = Utc::now().timestamp();
                for integration in &integrations {
                    println!("{}", integration_line(integration, now));
                }
            }
            Ok(())
        }
        Commands::Disconnect { platform } => {
            let platform = parse_platform(&platform)?;
            let service = CrosscastService::new().await?;
            service
                .connections()
                .disconnect(&user, platform, Utc::now().timestamp())
                .await?;
            println!("Disconnected {}", platform);
            Ok(())
        }
        Commands::Pages { token, format } => {
            let json = parse_format(&format)?;
            let service = CrosscastService::new().await?;
            let selection = service
                .connections()
                .begin_page_selection(&user, &token, Utc::now().timestamp())
                .await?;
            if json {
                print_json(&selection_json(&selection));
            } else {
                println!("Selection: {}", selection.id);
                println!("Expires:   {}", format_timestamp(selection.expires_at));
                for page in &selection.options {
                    println!("  {} | {}", page.id, page.name);
                }
            }
            Ok(())
        }
        Commands::Select {
            selection_id,
            page_id,
        } => {
            let service = CrosscastService::new().await?;
            let integration = service
                .connections()
                .complete_page_selection(&user, &selection_id, &page_id, Utc::now().timestamp())
                .await?;
            println!(
                "Connected facebook page {}",
                integration.username.as_deref().unwrap_or(page_id.as_str())
            );
            Ok(())
        }
    }
}

fn parse_platform(name: &str) -> Result<Platform> {
    name.parse().map_err(CrosscastError::InvalidInput)
}

fn parse_format(format: &str) -> Result<bool> {
    match format {
        "text" => Ok(false),
        "json" => Ok(true),
        other => Err(CrosscastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

/// One line per integration; tokens stay out of the output
fn integration_line(integration: &Integration, now: i64) -> String {
    let account = integration
        .username
        .as_deref()
        .or(integration.external_id.as_deref())
        .unwrap_or("-");
    let state = if !integration.active {
        "inactive"
    } else if integration.is_expired(now) {
        "expired"
    } else {
        "active"
    };
    format!("{} | {} | {}", integration.platform, account, state)
}

fn integration_json(integration: &Integration) -> serde_json::Value {
    serde_json::json!({
        "id": integration.id,
        "platform": integration.platform,
        "username": integration.username,
        "external_id": integration.external_id,
        "page_id": integration.page_id,
        "subreddit": integration.subreddit,
        "active": integration.active,
        "expires_at": integration.expires_at,
        "last_used_at": integration.last_used_at,
    })
}

fn selection_json(selection: &PendingSelection) -> serde_json::Value {
    let pages: Vec<serde_json::Value> = selection
        .options
        .iter()
        .map(|page| serde_json::json!({ "id": page.id, "name": page.name }))
        .collect();
    serde_json::json!({
        "selection_id": selection.id,
        "expires_at": selection.expires_at,
        "pages": pages,
    })
}

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}
