use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use shared::domain::{DeckId, ImageRef, Slide};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/decks.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateDeck {
        title: String,
        #[arg(long, default_value = "minimal")]
        template: String,
    },
    AddSlide {
        deck_id: DeckId,
        title: String,
        #[arg(long)]
        content: Option<String>,
        /// Placeholder prompt for an image that has not been generated yet.
        #[arg(long)]
        image_prompt: Option<String>,
    },
    ListDecks,
    ShowDeck {
        deck_id: DeckId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateDeck { title, template } => {
            let deck_id = storage.create_deck(&title, &template).await?;
            println!("created deck_id={deck_id}");
        }
        Command::AddSlide {
            deck_id,
            title,
            content,
            image_prompt,
        } => {
            let mut slide = Slide::new(title);
            if let Some(content) = content {
                slide = slide.with_content(content);
            }
            slide.image = image_prompt.map(ImageRef::Prompt);
            storage.insert_slide(deck_id, &slide).await?;
            println!("created slide_id={} in deck_id={deck_id}", slide.id);
        }
        Command::ListDecks => {
            for (deck_id, title) in storage.list_decks().await? {
                println!("{deck_id}\t{title}");
            }
        }
        Command::ShowDeck { deck_id } => {
            let deck = storage
                .read_deck(deck_id)
                .await?
                .ok_or_else(|| anyhow!("deck {deck_id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&deck)?);
        }
    }

    Ok(())
}
