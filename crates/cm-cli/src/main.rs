mod cache;
mod config;
mod engine;
mod error;
mod generative;
mod intent;
mod pipeline;
mod server;
mod tiering;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cm_core::Window;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::engine::{Engine, SaveRequest};

#[derive(Parser)]
#[command(name = "cm", about = "Cast intelligence engine CLI and HTTP server")]
struct Cli {
    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,

    /// Save a cast and analyze it
    Save {
        /// Cast hash
        id: String,
        /// Cast text
        text: String,
        /// Author handle
        #[arg(long, default_value = "unknown")]
        author: String,
        /// User saving the cast
        #[arg(long)]
        saved_by: String,
        #[arg(long, default_value_t = 0)]
        likes: u32,
        #[arg(long, default_value_t = 0)]
        replies: u32,
        #[arg(long, default_value_t = 0)]
        recasts: u32,
    },

    /// Re-analyze a saved cast against current context
    Analyze {
        /// Cast hash
        id: String,
    },

    /// Ask for an opinion on a saved cast
    Opinion {
        /// Cast hash
        id: String,
        /// Requesting user
        #[arg(long)]
        user: String,
        /// Free-text question shaping the opinion
        #[arg(long, default_value = "what do you think about this")]
        prompt: String,
    },

    /// Show trending topics for a window (hour/day/week)
    Trending {
        #[arg(default_value = "day")]
        window: String,
    },

    /// Natural-language trend digest for a window
    Digest {
        #[arg(default_value = "day")]
        window: String,
    },

    /// Profile a user: interests, recommendations, similar users
    Recommend {
        /// User to profile
        user: String,
    },

    /// Find saved casts similar to one cast
    Similar {
        /// Cast hash
        id: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Remove one user's save of a cast
    Unsave {
        /// Cast hash
        id: String,
        #[arg(long)]
        saved_by: String,
    },

    /// Re-analyze casts whose stored analysis predates the current model
    Retag,

    /// Show engine statistics
    Stats,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open_engine(config: &EngineConfig) -> Result<Engine> {
    Engine::open(config).map_err(|e| anyhow::anyhow!("failed to open engine: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::load();

    match &cli.command {
        Commands::Serve => cmd_serve(&config).await,
        Commands::Save {
            id,
            text,
            author,
            saved_by,
            likes,
            replies,
            recasts,
        } => {
            cmd_save(
                &config,
                SaveRequest {
                    id: id.clone(),
                    author: author.clone(),
                    saved_by: saved_by.clone(),
                    text: text.clone(),
                    timestamp: None,
                    likes: *likes,
                    replies: *replies,
                    recasts: *recasts,
                    embeds: Vec::new(),
                },
            )
            .await
        }
        Commands::Analyze { id } => cmd_analyze(&config, id).await,
        Commands::Opinion { id, user, prompt } => cmd_opinion(&config, id, user, prompt).await,
        Commands::Trending { window } => cmd_trending(&config, window).await,
        Commands::Digest { window } => cmd_digest(&config, window).await,
        Commands::Recommend { user } => cmd_recommend(&config, user).await,
        Commands::Similar { id, limit } => cmd_similar(&config, id, *limit).await,
        Commands::Unsave { id, saved_by } => cmd_unsave(&config, id, saved_by).await,
        Commands::Retag => cmd_retag(&config).await,
        Commands::Stats => cmd_stats(&config).await,
    }
}

async fn cmd_serve(config: &EngineConfig) -> Result<()> {
    let engine = Arc::new(open_engine(config)?);
    let shutdown = CancellationToken::new();
    server::serve(engine, &config.bind, shutdown)
        .await
        .context("server failed")
}

async fn cmd_save(config: &EngineConfig, req: SaveRequest) -> Result<()> {
    let engine = open_engine(config)?;
    let id = req.id.clone();
    match engine.save(req).await {
        Ok(scores) => {
            println!("saved {id}");
            print_scores(&scores);
            Ok(())
        }
        Err(error::EngineError::AlreadySaved { id }) => {
            println!("{id} already saved");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{e}")),
    }
}

async fn cmd_analyze(config: &EngineConfig, id: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let scores = engine
        .analyze(id)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    print_scores(&scores);
    Ok(())
}

fn print_scores(scores: &cm_core::Scores) {
    println!("quality:         {:.1}/100", scores.quality_score);
    println!("trending:        {:.2}", scores.trending_score);
    println!("save_worthiness: {:.2}", scores.save_worthiness);
    println!("confidence:      {:.2}", scores.confidence_score);
    println!("version:         {}", scores.analysis_version);
}

async fn cmd_opinion(config: &EngineConfig, id: &str, user: &str, prompt: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let result = engine
        .opinion(id, user, prompt)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{}", result.value.opinion_text);
    println!();
    println!(
        "tone={} confidence={:.2} tier={}",
        result.value.response_tone,
        result.value.confidence_score,
        result.tier.as_str()
    );
    for step in &result.value.reasoning {
        println!("  - {step}");
    }
    Ok(())
}

fn parse_window(window: &str) -> Result<Window> {
    window.parse().map_err(|e: String| anyhow::anyhow!(e))
}

async fn cmd_trending(config: &EngineConfig, window: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let report = engine.trending(parse_window(window)?).await;

    if report.insufficient_data {
        println!("no trend data for the last {} yet", report.window);
        return Ok(());
    }
    for trend in &report.trends {
        let flag = if trend.low_confidence { " (early)" } else { "" };
        println!(
            "{:<20} saves={:<4} avg_engagement={:<8.1} growth={:+}{flag}",
            trend.topic, trend.save_count, trend.engagement_avg, trend.recent_growth
        );
    }
    Ok(())
}

async fn cmd_digest(config: &EngineConfig, window: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let result = engine.digest(parse_window(window)?).await;
    println!("{}", result.value);
    tracing::debug!("digest served from {} tier", result.tier.as_str());
    Ok(())
}

async fn cmd_recommend(config: &EngineConfig, user: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let profile = engine
        .recommend(user)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("user:             {}", profile.user);
    println!("interests:        {}", join_or_none(&profile.interests));
    println!("engagement_level: {:.2}", profile.engagement_level);
    println!(
        "try_hashtags:     {}",
        join_or_none(&profile.recommended_hashtags)
    );
    println!("similar_users:    {}", join_or_none(&profile.similar_users));
    Ok(())
}

fn join_or_none(values: &[String]) -> String {
    if values.is_empty() {
        "(none)".to_string()
    } else {
        values.join(", ")
    }
}

async fn cmd_similar(config: &EngineConfig, id: &str, limit: usize) -> Result<()> {
    let engine = open_engine(config)?;
    let hits = engine
        .find_similar(id, limit)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    if hits.is_empty() {
        println!("no other saved casts to compare");
        return Ok(());
    }
    for hit in &hits {
        println!("{:.2}  {}  (saved by {})", hit.score, hit.id, hit.saved_by);
    }
    Ok(())
}

async fn cmd_unsave(config: &EngineConfig, id: &str, saved_by: &str) -> Result<()> {
    let engine = open_engine(config)?;
    engine
        .unsave(id, saved_by)
        .await
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("removed {id} for {saved_by}");
    Ok(())
}

async fn cmd_retag(config: &EngineConfig) -> Result<()> {
    let engine = open_engine(config)?;
    let report = engine.retag().await.map_err(|e| anyhow::anyhow!("{e}"))?;
    println!(
        "scanned {} casts, refreshed {}",
        report.scanned, report.refreshed
    );
    Ok(())
}

async fn cmd_stats(config: &EngineConfig) -> Result<()> {
    let engine = open_engine(config)?;
    let stats = engine.stats().await.map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("items:      {}", stats.items);
    println!("opinions:   {}", stats.opinions);
    println!("users:      {}", stats.users);
    println!("topics:     {}", stats.tracked_topics);
    println!(
        "generative: {}",
        if stats.generative_configured {
            "configured"
        } else {
            "offline (tier 2/3 only)"
        }
    );
    if let Some(version) = stats.db_schema_version {
        println!("schema:     v{version}");
    }
    Ok(())
}
