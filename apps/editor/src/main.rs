use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use assistant::{AssistantConfig, HttpAssistant};
use clap::{Parser, Subcommand, ValueEnum};
use deck_session::{CapabilityError, ResearchTopic, SessionController};
use serde::Serialize;
use shared::domain::{Deck, DeckId, SlideId, SlidePatch, SlideVisual};
use storage::Storage;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{database_url, load_settings, read_text_arg};

#[derive(Parser, Debug)]
#[command(about = "Runs one editing action against a stored deck")]
struct Cli {
    /// Overrides the configured database url.
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    deck: DeckId,
    /// 1-based position of the slide to select before running the command.
    #[arg(long)]
    slide: Option<usize>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChartArg {
    Bar,
    Pie,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TopicArg {
    Competitors,
    SocialProof,
    MarketSize,
}

impl From<TopicArg> for ResearchTopic {
    fn from(topic: TopicArg) -> Self {
        match topic {
            TopicArg::Competitors => ResearchTopic::Competitors,
            TopicArg::SocialProof => ResearchTopic::SocialProof,
            TopicArg::MarketSize => ResearchTopic::MarketSize,
        }
    }
}

/// Text arguments starting with `@` are read from that file.
#[derive(Subcommand, Debug)]
enum Command {
    Show,
    SetTitle {
        title: String,
    },
    SetTemplate {
        template: String,
    },
    Edit {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },
    Rewrite {
        instruction: String,
    },
    Analyze,
    Research {
        query: Option<String>,
        #[arg(long, value_enum, conflicts_with = "query")]
        topic: Option<TopicArg>,
    },
    Layout,
    Chart {
        #[arg(value_enum)]
        kind: ChartArg,
    },
    Table {
        instruction: String,
    },
    Headlines,
    Metrics,
    Image {
        prompt: Option<String>,
    },
    EditImage {
        instruction: String,
    },
    Bio {
        bio: String,
    },
    Financials {
        assumptions: String,
    },
    Roadmap {
        milestones: String,
    },
    Publish,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves a 1-based slide position.
fn slide_at(deck: &Deck, position: usize) -> Result<SlideId> {
    position
        .checked_sub(1)
        .and_then(|index| deck.slides.get(index))
        .map(|slide| slide.id)
        .ok_or_else(|| anyhow!("deck has no slide at position {position}"))
}

fn capability_failed(err: CapabilityError) -> anyhow::Error {
    anyhow!(err.user_message())
}

async fn run(session: &Arc<SessionController>, command: Command) -> Result<()> {
    match command {
        Command::Show => print_json(&session.snapshot().await)?,
        Command::SetTitle { title } => session.set_title(title).await?.settled().await,
        Command::SetTemplate { template } => session.set_template(template).await?.settled().await,
        Command::Edit { title, content } => {
            let patch = SlidePatch {
                title,
                visual: content.map(SlideVisual::Text),
                ..SlidePatch::default()
            };
            if patch.is_empty() {
                return Err(anyhow!("nothing to edit; pass --title and/or --content"));
            }
            let slide_id = session
                .snapshot()
                .await
                .selected_slide
                .map(|slide| slide.id)
                .ok_or_else(|| capability_failed(CapabilityError::NoSelection))?;
            session.update_slide(slide_id, patch).await?.settled().await;
        }
        Command::Rewrite { instruction } => {
            let instruction = read_text_arg(&instruction)?;
            print_json(&session.rewrite(&instruction).await.map_err(capability_failed)?)?
        }
        Command::Analyze => print_json(&session.analyze().await.map_err(capability_failed)?)?,
        Command::Research { query, topic } => {
            let brief = match (query, topic) {
                (_, Some(topic)) => session.research_topic(topic.into()).await,
                (Some(query), None) => session.research(&query).await,
                (None, None) => return Err(anyhow!("pass a query or --topic")),
            };
            print_json(&brief.map_err(capability_failed)?)?
        }
        Command::Layout => print_json(&session.suggest_layout().await.map_err(capability_failed)?)?,
        Command::Chart { kind } => {
            let chart = match kind {
                ChartArg::Bar => session.suggest_bar_chart().await,
                ChartArg::Pie => session.suggest_pie_chart().await,
            };
            print_json(&chart.map_err(capability_failed)?)?
        }
        Command::Table { instruction } => {
            let instruction = read_text_arg(&instruction)?;
            print_json(&session.generate_table(&instruction).await.map_err(capability_failed)?)?
        }
        Command::Headlines => {
            print_json(&session.generate_headlines().await.map_err(capability_failed)?)?
        }
        Command::Metrics => print_json(&session.extract_metrics().await.map_err(capability_failed)?)?,
        Command::Image { prompt } => print_json(
            &session
                .generate_image(prompt.as_deref())
                .await
                .map_err(capability_failed)?,
        )?,
        Command::EditImage { instruction } => {
            print_json(&session.edit_image(&instruction).await.map_err(capability_failed)?)?
        }
        Command::Bio { bio } => {
            let bio = read_text_arg(&bio)?;
            print_json(&session.summarize_bio(&bio).await.map_err(capability_failed)?)?
        }
        Command::Financials { assumptions } => {
            let assumptions = read_text_arg(&assumptions)?;
            print_json(
                &session
                    .generate_financials(&assumptions)
                    .await
                    .map_err(capability_failed)?,
            )?
        }
        Command::Roadmap { milestones } => {
            let milestones = read_text_arg(&milestones)?;
            print_json(
                &session
                    .generate_roadmap_slide(&milestones)
                    .await
                    .map_err(capability_failed)?,
            )?
        }
        Command::Publish => {
            session
                .publish()
                .await
                .map_err(|err| anyhow!(err.user_message()))?;
            print_json(&session.snapshot().await.publish)?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let database_url = database_url(&settings, cli.database_url.as_deref())?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(%database_url, %error, "failed to open deck database");
        error
    })?;

    let mut assistant_config = AssistantConfig::new(&settings.assistant_url)?
        .with_timeout(settings.assistant_timeout());
    if let Some(api_key) = &settings.assistant_api_key {
        assistant_config = assistant_config.with_api_key(api_key);
    }
    let assistant = HttpAssistant::new(assistant_config)?;
    info!(
        %database_url,
        assistant_url = %settings.assistant_url,
        "editor: backends configured"
    );

    let session = SessionController::open(cli.deck, Arc::new(storage), Arc::new(assistant))
        .await
        .with_context(|| format!("failed to open deck {}", cli.deck))?;

    if let Some(position) = cli.slide {
        let deck = session.snapshot().await.deck;
        let slide_id = slide_at(&deck, position)?;
        if let Some(fetch) = session.select_slide(slide_id).await? {
            fetch.abort();
        }
    }

    let outcome = run(&session, cli.command).await;
    session.flush().await;
    outcome
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
