use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    ChartData, Deck, DeckId, DeckPatch, ImageRef, Publication, Slide, SlideId, SlidePatch,
    SlideVisual, TableData,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Column form of a slide's active representation. At most one is set.
#[derive(Debug, Default)]
struct VisualColumns {
    content: Option<String>,
    chart_json: Option<String>,
    table_json: Option<String>,
}

impl VisualColumns {
    fn from_visual(visual: &SlideVisual) -> Result<Self> {
        let columns = match visual {
            SlideVisual::Empty => Self::default(),
            SlideVisual::Text(text) => Self {
                content: Some(text.clone()),
                ..Self::default()
            },
            SlideVisual::Chart(chart) => Self {
                chart_json: Some(
                    serde_json::to_string(chart).context("failed to encode chart data")?,
                ),
                ..Self::default()
            },
            SlideVisual::Table(table) => Self {
                table_json: Some(
                    serde_json::to_string(table).context("failed to encode table data")?,
                ),
                ..Self::default()
            },
        };
        Ok(columns)
    }

    fn into_visual(self) -> Result<SlideVisual> {
        if let Some(raw) = self.chart_json {
            let chart: ChartData =
                serde_json::from_str(&raw).context("failed to decode stored chart data")?;
            return Ok(SlideVisual::Chart(chart));
        }
        if let Some(raw) = self.table_json {
            let table: TableData =
                serde_json::from_str(&raw).context("failed to decode stored table data")?;
            return Ok(SlideVisual::Table(table));
        }
        Ok(self
            .content
            .map(SlideVisual::Text)
            .unwrap_or(SlideVisual::Empty))
    }
}

fn image_columns(image: Option<&ImageRef>) -> (Option<&'static str>, Option<String>) {
    match image {
        Some(ImageRef::Url(url)) => (Some("url"), Some(url.clone())),
        Some(ImageRef::Prompt(prompt)) => (Some("prompt"), Some(prompt.clone())),
        None => (None, None),
    }
}

fn image_from_columns(kind: Option<String>, value: Option<String>) -> Option<ImageRef> {
    match (kind.as_deref(), value) {
        (Some("url"), Some(value)) => Some(ImageRef::Url(value)),
        (Some("prompt"), Some(value)) => Some(ImageRef::Prompt(value)),
        _ => None,
    }
}

fn slide_from_row(row: &SqliteRow) -> Result<Slide> {
    let raw_id: String = row.try_get("id")?;
    let id = SlideId::from_str(&raw_id).with_context(|| format!("invalid slide id '{raw_id}'"))?;
    let visual = VisualColumns {
        content: row.try_get("content")?,
        chart_json: row.try_get("chart_json")?,
        table_json: row.try_get("table_json")?,
    }
    .into_visual()?;

    Ok(Slide {
        id,
        title: row.try_get("title")?,
        visual,
        image: image_from_columns(row.try_get("image_kind")?, row.try_get("image_value")?),
        template: row.try_get("template")?,
    })
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_deck(&self, title: &str, template: &str) -> Result<DeckId> {
        let deck_id = DeckId::new();
        sqlx::query("INSERT INTO decks (id, title, template) VALUES (?, ?, ?)")
            .bind(deck_id.to_string())
            .bind(title)
            .bind(template)
            .execute(&self.pool)
            .await
            .context("failed to insert deck")?;
        Ok(deck_id)
    }

    pub async fn list_decks(&self) -> Result<Vec<(DeckId, String)>> {
        let rows = sqlx::query("SELECT id, title FROM decks ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let raw_id: String = row.get(0);
                let deck_id = DeckId::from_str(&raw_id)
                    .with_context(|| format!("invalid deck id '{raw_id}'"))?;
                Ok((deck_id, row.get::<String, _>(1)))
            })
            .collect()
    }

    pub async fn read_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        let Some(row) = sqlx::query(
            "SELECT title, template, publish_key, published_at FROM decks WHERE id = ?",
        )
        .bind(deck_id.to_string())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let publish_key: Option<String> = row.try_get("publish_key")?;
        let published_at: Option<DateTime<Utc>> = row.try_get("published_at")?;
        let publication = match (publish_key, published_at) {
            (Some(idempotency_key), Some(published_at)) => Some(Publication {
                idempotency_key,
                published_at,
            }),
            _ => None,
        };

        let slide_rows = sqlx::query(
            "SELECT id, title, content, chart_json, table_json, image_kind, image_value, template
             FROM slides
             WHERE deck_id = ?
             ORDER BY position ASC",
        )
        .bind(deck_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        let slides = slide_rows
            .iter()
            .map(slide_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Deck {
            id: deck_id,
            title: row.try_get("title")?,
            template: row.try_get("template")?,
            slides,
            publication,
        }))
    }

    pub async fn write_deck_fields(&self, deck_id: DeckId, patch: &DeckPatch) -> Result<()> {
        if patch.title.is_some() || patch.template.is_some() {
            let mut builder =
                QueryBuilder::<Sqlite>::new("UPDATE decks SET updated_at = CURRENT_TIMESTAMP");
            if let Some(title) = &patch.title {
                builder.push(", title = ").push_bind(title.clone());
            }
            if let Some(template) = &patch.template {
                builder.push(", template = ").push_bind(template.clone());
            }
            builder.push(" WHERE id = ").push_bind(deck_id.to_string());
            let result = builder.build().execute(&self.pool).await?;
            if result.rows_affected() == 0 {
                bail!("deck {deck_id} not found");
            }
        }

        if let Some(publication) = &patch.publication {
            self.record_publication(deck_id, publication).await?;
        }

        Ok(())
    }

    /// Records a publication once per idempotency key. Returns `false` when the
    /// key was already applied.
    pub async fn record_publication(
        &self,
        deck_id: DeckId,
        publication: &Publication,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO deck_publications (deck_id, idempotency_key, published_at)
             VALUES (?, ?, ?)
             ON CONFLICT(deck_id, idempotency_key) DO NOTHING",
        )
        .bind(deck_id.to_string())
        .bind(&publication.idempotency_key)
        .bind(publication.published_at)
        .execute(&mut *tx)
        .await
        .context("failed to record deck publication")?
        .rows_affected()
            == 1;

        if inserted {
            let result = sqlx::query(
                "UPDATE decks SET publish_key = ?, published_at = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?",
            )
            .bind(&publication.idempotency_key)
            .bind(publication.published_at)
            .bind(deck_id.to_string())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                bail!("deck {deck_id} not found");
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn publication_count(&self, deck_id: DeckId) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM deck_publications WHERE deck_id = ?")
            .bind(deck_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn write_slide_fields(&self, slide_id: SlideId, patch: &SlidePatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut builder =
            QueryBuilder::<Sqlite>::new("UPDATE slides SET updated_at = CURRENT_TIMESTAMP");
        if let Some(title) = &patch.title {
            builder.push(", title = ").push_bind(title.clone());
        }
        if let Some(visual) = &patch.visual {
            let columns = VisualColumns::from_visual(visual)?;
            builder
                .push(", content = ")
                .push_bind(columns.content)
                .push(", chart_json = ")
                .push_bind(columns.chart_json)
                .push(", table_json = ")
                .push_bind(columns.table_json);
        }
        if let Some(image) = &patch.image {
            let (kind, value) = image_columns(image.as_ref());
            builder
                .push(", image_kind = ")
                .push_bind(kind)
                .push(", image_value = ")
                .push_bind(value);
        }
        if let Some(template) = &patch.template {
            builder.push(", template = ").push_bind(template.clone());
        }
        builder.push(" WHERE id = ").push_bind(slide_id.to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to update slide {slide_id}"))?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("slide {slide_id} not found"));
        }
        Ok(())
    }

    /// Appends a slide after the deck's current last slide.
    pub async fn insert_slide(&self, deck_id: DeckId, slide: &Slide) -> Result<()> {
        let columns = VisualColumns::from_visual(&slide.visual)?;
        let (image_kind, image_value) = image_columns(slide.image.as_ref());
        sqlx::query(
            "INSERT INTO slides
                (id, deck_id, position, title, content, chart_json, table_json, image_kind, image_value, template)
             VALUES (
                ?1, ?2,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM slides WHERE deck_id = ?2),
                ?3, ?4, ?5, ?6, ?7, ?8, ?9
             )",
        )
        .bind(slide.id.to_string())
        .bind(deck_id.to_string())
        .bind(&slide.title)
        .bind(columns.content)
        .bind(columns.chart_json)
        .bind(columns.table_json)
        .bind(image_kind)
        .bind(image_value)
        .bind(slide.template.as_deref())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert slide {} into deck {deck_id}", slide.id))?;
        Ok(())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
