use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{ChartData, TableData},
    error::ApiErrorBody,
    protocol::{
        Capability, DeckContext, FinancialProjection, GeneratedSlide, LayoutSuggestion, Metric,
        ResearchBrief, SlideAnalysis, SlideContext, SuggestionSet,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{AssistantError, AssistantGateway};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const SUGGESTIONS_PATH: &str = "suggestions";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl AssistantConfig {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url.trim())
            .with_context(|| format!("invalid assistant url '{base_url}'"))?;
        // `Url::join` replaces the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct HttpAssistant {
    http: Client,
    config: AssistantConfig,
}

#[derive(Serialize)]
struct SlideRequest<'a> {
    slide: &'a SlideContext,
}

#[derive(Serialize)]
struct InstructionRequest<'a> {
    slide: &'a SlideContext,
    instruction: &'a str,
}

#[derive(Serialize)]
struct ResearchRequest<'a> {
    query: &'a str,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    slide: &'a SlideContext,
    prompt: &'a str,
}

#[derive(Serialize)]
struct EditImageRequest<'a> {
    slide: &'a SlideContext,
    image_url: &'a str,
    instruction: &'a str,
}

#[derive(Serialize)]
struct BioRequest<'a> {
    slide: &'a SlideContext,
    bio: &'a str,
}

#[derive(Serialize)]
struct DeckRequest<'a> {
    deck: &'a DeckContext,
    notes: &'a str,
}

#[derive(Deserialize)]
struct ContentResponse {
    content: String,
}

#[derive(Deserialize)]
struct HeadlinesResponse {
    headlines: Vec<String>,
}

#[derive(Deserialize)]
struct MetricsResponse {
    metrics: Vec<Metric>,
}

#[derive(Deserialize)]
struct ImageResponse {
    image_url: String,
}

#[derive(Deserialize)]
struct SummaryResponse {
    summary: String,
}

impl HttpAssistant {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build assistant http client")?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config
            .base_url
            .join(&format!("v1/{path}"))
            .with_context(|| format!("invalid assistant endpoint '{path}'"))
    }

    async fn call<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut request = self.http.post(url).json(body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let raw = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_slice::<ApiErrorBody>(&raw) {
                Ok(body) => (body.error.code, body.error.message),
                Err(_) => (None, String::from_utf8_lossy(&raw).trim().to_string()),
            };
            warn!(
                endpoint = path,
                status = status.as_u16(),
                code = code.as_deref().unwrap_or(""),
                "assistant: request rejected"
            );
            return Err(AssistantError::Rejected {
                status: status.as_u16(),
                code,
                message,
            }
            .into());
        }

        debug!(endpoint = path, bytes = raw.len(), "assistant: response received");
        serde_json::from_slice(&raw)
            .map_err(|err| AssistantError::Malformed(format!("{path}: {err}")).into())
    }
}

fn transport_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        AssistantError::Timeout.into()
    } else {
        AssistantError::Transport(err.to_string()).into()
    }
}

#[async_trait]
impl AssistantGateway for HttpAssistant {
    async fn rewrite(&self, slide: &SlideContext, instruction: &str) -> Result<String> {
        let body: ContentResponse = self
            .call(
                Capability::Rewrite.slug(),
                &InstructionRequest { slide, instruction },
            )
            .await?;
        Ok(body.content)
    }

    async fn analyze(&self, slide: &SlideContext) -> Result<SlideAnalysis> {
        self.call(Capability::Analyze.slug(), &SlideRequest { slide })
            .await
    }

    async fn research(&self, query: &str) -> Result<ResearchBrief> {
        self.call(Capability::Research.slug(), &ResearchRequest { query })
            .await
    }

    async fn suggest_layout(&self, slide: &SlideContext) -> Result<LayoutSuggestion> {
        self.call(Capability::SuggestLayout.slug(), &SlideRequest { slide })
            .await
    }

    async fn suggest_bar_chart(&self, slide: &SlideContext) -> Result<ChartData> {
        self.call(Capability::SuggestBarChart.slug(), &SlideRequest { slide })
            .await
    }

    async fn suggest_pie_chart(&self, slide: &SlideContext) -> Result<ChartData> {
        self.call(Capability::SuggestPieChart.slug(), &SlideRequest { slide })
            .await
    }

    async fn generate_table(&self, slide: &SlideContext, instruction: &str) -> Result<TableData> {
        self.call(
            Capability::GenerateTable.slug(),
            &InstructionRequest { slide, instruction },
        )
        .await
    }

    async fn generate_headlines(&self, slide: &SlideContext) -> Result<Vec<String>> {
        let body: HeadlinesResponse = self
            .call(Capability::GenerateHeadlines.slug(), &SlideRequest { slide })
            .await?;
        Ok(body.headlines)
    }

    async fn extract_metrics(&self, slide: &SlideContext) -> Result<Vec<Metric>> {
        let body: MetricsResponse = self
            .call(Capability::ExtractMetrics.slug(), &SlideRequest { slide })
            .await?;
        Ok(body.metrics)
    }

    async fn generate_image(&self, slide: &SlideContext, prompt: &str) -> Result<String> {
        let body: ImageResponse = self
            .call(
                Capability::GenerateImage.slug(),
                &ImageRequest { slide, prompt },
            )
            .await?;
        Ok(body.image_url)
    }

    async fn edit_image(
        &self,
        slide: &SlideContext,
        image_url: &str,
        instruction: &str,
    ) -> Result<String> {
        let body: ImageResponse = self
            .call(
                Capability::EditImage.slug(),
                &EditImageRequest {
                    slide,
                    image_url,
                    instruction,
                },
            )
            .await?;
        Ok(body.image_url)
    }

    async fn summarize_bio(&self, slide: &SlideContext, bio: &str) -> Result<String> {
        let body: SummaryResponse = self
            .call(Capability::SummarizeBio.slug(), &BioRequest { slide, bio })
            .await?;
        Ok(body.summary)
    }

    async fn generate_financials(
        &self,
        deck: &DeckContext,
        assumptions: &str,
    ) -> Result<FinancialProjection> {
        self.call(
            Capability::GenerateFinancials.slug(),
            &DeckRequest {
                deck,
                notes: assumptions,
            },
        )
        .await
    }

    async fn generate_roadmap_slide(
        &self,
        deck: &DeckContext,
        milestones: &str,
    ) -> Result<GeneratedSlide> {
        self.call(
            Capability::GenerateRoadmapSlide.slug(),
            &DeckRequest {
                deck,
                notes: milestones,
            },
        )
        .await
    }

    async fn fetch_all_suggestions(&self, slide: &SlideContext) -> Result<SuggestionSet> {
        self.call(SUGGESTIONS_PATH, &SlideRequest { slide }).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
