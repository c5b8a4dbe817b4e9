//! cast-queue - Inspect and manage drafts and scheduled posts
//!
//! Unix-style tool over the post store: list a user's posts, show one post
//! with its per-network results, delete drafts and pending scheduled posts.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use libcrosscast::service::CrosscastService;
use libcrosscast::{logging, CrosscastError, Post, PostStatus, PostWithRecords, Result};

#[derive(Parser, Debug)]
#[command(name = "cast-queue")]
#[command(version)]
#[command(about = "Inspect and manage drafts and scheduled posts")]
#[command(long_about = "\
cast-queue - Inspect and manage drafts and scheduled posts

DESCRIPTION:
    cast-queue is a Unix-style tool for looking at a user's posts in the
    Crosscast store. Use it to list posts, inspect the per-network result
    of a publish, or delete drafts and scheduled posts that have not gone
    out yet.

COMMANDS:
    list        List posts, newest first
    show        Show one post with its per-network results
    delete      Delete a draft or a pending scheduled post

USAGE EXAMPLES:
    # List everything
    cast-queue list

    # Only the scheduled queue, as JSON
    cast-queue list --status scheduled --format json

    # Where did a post end up?
    cast-queue show <POST_ID>

    # Drop a scheduled post before cast-send picks it up
    cast-queue delete <POST_ID>

CONFIGURATION:
    Configuration file: ~/.config/crosscast/config.toml
    Database location: ~/.local/share/crosscast/crosscast.db

    Override with environment variables:
        CROSSCAST_CONFIG    - Path to config file
        CROSSCAST_USER      - User whose posts are shown (same as --user)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input or unknown post (bad status, format, post ID)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// User whose posts are managed
    #[arg(short, long, global = true, env = "CROSSCAST_USER", default_value = "default")]
    user: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List posts
    List {
        /// Only posts with this status (draft, scheduled, published, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of posts to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show one post
    Show {
        /// Post ID
        post_id: String,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a draft or scheduled post
    Delete {
        /// Post ID
        post_id: String,
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
    let service = CrosscastService::new().await?;

    match cli.command {
        Commands::List {
            status,
            limit,
            format,
        } => cmd_list(&service, &cli.user, status.as_deref(), limit, &format).await,
        Commands::Show { post_id, format } => {
            cmd_show(&service, &cli.user, &post_id, &format).await
        }
        Commands::Delete { post_id } => {
            service.posting().delete(&cli.user, &post_id).await?;
            println!("Deleted {}", post_id);
            Ok(())
        }
    }
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

/// List posts
async fn cmd_list(
    service: &CrosscastService,
    user_id: &str,
    status: Option<&str>,
    limit: usize,
    format: &str,
) -> Result<()> {
    let json = parse_format(format)?;
    let status: Option<PostStatus> = status
        .map(|s| s.parse().map_err(CrosscastError::InvalidInput))
        .transpose()?;

    let posts = service.posting().list(user_id, status, limit).await?;

    if json {
        print_json(&serde_json::json!(posts));
    } else {
        output_list_text(&posts);
    }
    Ok(())
}

/// Output posts as human-readable text
fn output_list_text(posts: &[Post]) {
    let now = Utc::now().timestamp();

    for post in posts {
        let when = match post.status {
            PostStatus::Scheduled => post
                .scheduled_at
                .map(|ts| format_time_until(now, ts))
                .unwrap_or_else(|| "unknown".to_string()),
            PostStatus::Published => post
                .published_at
                .map(format_timestamp)
                .unwrap_or_default(),
            _ => format_timestamp(post.created_at),
        };

        println!(
            "{} | {} | {} | {}",
            post.id,
            post.status,
            truncate_content(&post.content, 50),
            when
        );
    }
}

/// Show a single post with its platform records
async fn cmd_show(
    service: &CrosscastService,
    user_id: &str,
    post_id: &str,
    format: &str,
) -> Result<()> {
    let json = parse_format(format)?;
    let found = service.posting().get(user_id, post_id).await?;

    if json {
        print_json(&serde_json::json!({
            "post": found.post,
            "records": found.records,
        }));
    } else {
        output_show_text(&found);
    }
    Ok(())
}

fn output_show_text(found: &PostWithRecords) {
    let post = &found.post;
    println!("ID:         {}", post.id);
    println!("Status:     {}", post.status);
    println!("Visibility: {}", post.visibility.as_str());
    println!("Created:    {}", format_timestamp(post.created_at));
    if let Some(at) = post.scheduled_at {
        println!("Scheduled:  {}", format_timestamp(at));
    }
    if let Some(at) = post.published_at {
        println!("Published:  {}", format_timestamp(at));
    }
    if !post.platforms.is_empty() {
        let names: Vec<&str> = post.platforms.iter().map(|p| p.as_str()).collect();
        println!("Platforms:  {}", names.join(", "));
    }
    if let Some(media) = &post.media_url {
        println!("Media:      {}", media);
    }
    if let Some(error) = &post.error {
        println!("Error:      {}", error);
    }

    println!();
    println!("{}", post.content);

    if !found.records.is_empty() {
        println!();
        for record in &found.records {
            if record.success {
                println!(
                    "  {}: {}",
                    record.platform,
                    record.url.as_deref().unwrap_or("published")
                );
            } else {
                println!(
                    "  {}: failed ({})",
                    record.platform,
                    record.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
}

/// Truncate content to max characters with ellipsis
fn truncate_content(content: &str, max_chars: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let truncated: String = single_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Format time until scheduled time in human-readable format
fn format_time_until(now: i64, scheduled_at: i64) -> String {
    let diff = scheduled_at - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}
