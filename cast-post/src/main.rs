//! cast-post - Publish content to connected social networks

use chrono::Utc;
use clap::Parser;
use libcrosscast::logging;
use libcrosscast::scheduling::parse_schedule;
use libcrosscast::service::CrosscastService;
use libcrosscast::types::{parse_platform_list, FailedTarget, PublishedTarget};
use libcrosscast::{CrosscastError, Platform, PublishRequest, Result, Visibility};
use std::io::{IsTerminal, Read};

#[derive(Parser, Debug)]
#[command(name = "cast-post")]
#[command(version)]
#[command(about = "Publish content to connected social networks")]
#[command(long_about = "\
cast-post - Publish content to connected social networks

DESCRIPTION:
    cast-post sends one piece of content to several networks at once
    (LinkedIn, Facebook, Twitter/X, Threads, Reddit, Instagram). Each
    network is tried independently: one failure never stops the others.

    Without --platform the post goes to every active integration of the
    user. With --schedule the post is queued for cast-send instead of
    being published now; with --draft it is only stored.

USAGE:
    # Publish to every connected network
    cast-post \"Hello from everywhere\"

    # Pick networks and read the text from stdin
    echo \"Release notes are out\" | cast-post --platform twitter,linkedin

    # Instagram needs an image
    cast-post \"New menu\" --platform instagram --media https://cdn.example/menu.jpg

    # Schedule for later
    cast-post \"Good morning\" --schedule \"tomorrow 9am\"
    cast-post \"Reminder\" --schedule 2h

    # Machine-readable output
    cast-post \"Hello\" --format json

OUTPUT:
    text - one \"platform: url\" line per published network on stdout,
           failures on stderr
    json - a single object with post_id, status, succeeded and failed

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    Override with environment variables:
        CROSSCAST_CONFIG    - Path to config file
        CROSSCAST_USER      - User to post as (same as --user)

EXIT CODES:
    0 - Published to at least one network (or scheduled / drafted)
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (empty or too long content, bad platform, bad time)
    4 - Nothing was published; every network failed
    5 - No active integrations for the requested networks
")]
struct Cli {
    /// Content to post (reads from stdin if not provided)
    content: Option<String>,

    /// Target specific platform(s) (comma-separated)
    #[arg(short, long, value_name = "PLATFORMS")]
    #[arg(help = "Comma-separated networks (linkedin, facebook, twitter, threads, reddit, instagram)")]
    platform: Option<String>,

    /// Image or link to attach
    #[arg(short, long, value_name = "URL")]
    media: Option<String>,

    /// Audience for networks that support it
    #[arg(long, default_value = "public")]
    #[arg(help = "Audience: public or connections (LinkedIn)")]
    visibility: String,

    /// Schedule instead of publishing now
    #[arg(short, long, value_name = "WHEN", conflicts_with = "draft")]
    #[arg(help = "Publish later: RFC 3339 time, duration (30m, 2h) or phrase (\"tomorrow 9am\")")]
    schedule: Option<String>,

    /// Save as draft without posting
    #[arg(short, long)]
    draft: bool,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// User whose integrations are used
    #[arg(short, long, env = "CROSSCAST_USER", default_value = "default")]
    user: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
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
    let json = match cli.format.as_str() {
        "text" => false,
        "json" => true,
        other => {
            return Err(CrosscastError::InvalidInput(format!(
                "Invalid format '{}'. Must be 'text' or 'json'",
                other
            )))
        }
    };

    let request = build_request(&cli)?;
    let service = CrosscastService::new().await?;
    let posting = service.posting();

    if cli.draft {
        let post = posting.save_draft(&cli.user, &request).await?;
        if json {
            print_json(&serde_json::json!({ "post_id": post.id, "status": "draft" }));
        } else {
            println!("{}", post.id);
        }
        return Ok(());
    }

    if let Some(when) = &cli.schedule {
        let now = Utc::now();
        let at = parse_schedule(when, now)?;
        let post = posting.schedule(&cli.user, &request, at, now).await?;
        if json {
            print_json(&serde_json::json!({
                "post_id": post.id,
                "status": "scheduled",
                "scheduled_at": at.to_rfc3339(),
            }));
        } else {
            println!("{} scheduled for {}", post.id, at.to_rfc3339());
        }
        return Ok(());
    }

    match posting.publish(&cli.user, &request).await {
        Ok(report) => {
            if json {
                print_json(&outcome_json(
                    &report.post_id,
                    "published",
                    &report.succeeded,
                    &report.failed,
                ));
            } else {
                print_outcome(&report.succeeded, &report.failed);
            }
            Ok(())
        }
        Err(CrosscastError::NothingPublished { post_id, failed }) => {
            if json {
                print_json(&outcome_json(&post_id, "failed", &[], &failed));
            } else {
                print_outcome(&[], &failed);
            }
            Err(CrosscastError::NothingPublished { post_id, failed })
        }
        Err(e) => Err(e),
    }
}

fn build_request(cli: &Cli) -> Result<PublishRequest> {
    let text = match &cli.content {
        Some(content) => content.clone(),
        None => read_stdin()?,
    };
    if text.trim().is_empty() {
        return Err(CrosscastError::InvalidInput(
            "Content cannot be empty".to_string(),
        ));
    }

    let platforms: Vec<Platform> = match &cli.platform {
        Some(list) => parse_platform_list(list).map_err(CrosscastError::InvalidInput)?,
        None => Vec::new(),
    };
    let visibility: Visibility = cli
        .visibility
        .parse()
        .map_err(CrosscastError::InvalidInput)?;

    Ok(PublishRequest {
        text,
        visibility,
        platforms,
        media_url: cli.media.clone(),
    })
}

fn read_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(CrosscastError::InvalidInput(
            "No content provided. Pass it as an argument or pipe it on stdin".to_string(),
        ));
    }

    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .map_err(|e| CrosscastError::InvalidInput(format!("Failed to read stdin: {}", e)))?;
    Ok(buffer.trim_end_matches('\n').to_string())
}

fn print_outcome(succeeded: &[PublishedTarget], failed: &[FailedTarget]) {
    for target in succeeded {
        println!("{}: {}", target.platform, target.url);
    }
    for target in failed {
        eprintln!("Error: {}: {}", target.platform, target.message);
    }
}

fn outcome_json(
    post_id: &str,
    status: &str,
    succeeded: &[PublishedTarget],
    failed: &[FailedTarget],
) -> serde_json::Value {
    serde_json::json!({
        "post_id": post_id,
        "status": status,
        "succeeded": succeeded,
        "failed": failed,
    })
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}
