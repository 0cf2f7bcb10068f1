//! Seam between the editing session and the generative assistant service.

use anyhow::anyhow;
use async_trait::async_trait;
use shared::{
    domain::{ChartData, TableData},
    protocol::{
        DeckContext, FinancialProjection, GeneratedSlide, LayoutSuggestion, Metric, ResearchBrief,
        SlideAnalysis, SlideContext, SuggestionSet,
    },
};
use thiserror::Error;

mod http;
pub use http::{AssistantConfig, HttpAssistant};

/// Failure reported by an assistant backend. Gateways return these inside
/// `anyhow::Error` so callers can downcast for classification.
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("assistant rejected request with status {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("assistant request timed out")]
    Timeout,
    #[error("assistant transport failure: {0}")]
    Transport(String),
    #[error("assistant returned a malformed payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait AssistantGateway: Send + Sync {
    async fn rewrite(&self, slide: &SlideContext, instruction: &str) -> anyhow::Result<String>;
    async fn analyze(&self, slide: &SlideContext) -> anyhow::Result<SlideAnalysis>;
    async fn research(&self, query: &str) -> anyhow::Result<ResearchBrief>;
    async fn suggest_layout(&self, slide: &SlideContext) -> anyhow::Result<LayoutSuggestion>;
    async fn suggest_bar_chart(&self, slide: &SlideContext) -> anyhow::Result<ChartData>;
    async fn suggest_pie_chart(&self, slide: &SlideContext) -> anyhow::Result<ChartData>;
    async fn generate_table(
        &self,
        slide: &SlideContext,
        instruction: &str,
    ) -> anyhow::Result<TableData>;
    async fn generate_headlines(&self, slide: &SlideContext) -> anyhow::Result<Vec<String>>;
    async fn extract_metrics(&self, slide: &SlideContext) -> anyhow::Result<Vec<Metric>>;
    /// Returns the location of the rendered image.
    async fn generate_image(&self, slide: &SlideContext, prompt: &str) -> anyhow::Result<String>;
    async fn edit_image(
        &self,
        slide: &SlideContext,
        image_url: &str,
        instruction: &str,
    ) -> anyhow::Result<String>;
    async fn summarize_bio(&self, slide: &SlideContext, bio: &str) -> anyhow::Result<String>;
    async fn generate_financials(
        &self,
        deck: &DeckContext,
        assumptions: &str,
    ) -> anyhow::Result<FinancialProjection>;
    async fn generate_roadmap_slide(
        &self,
        deck: &DeckContext,
        milestones: &str,
    ) -> anyhow::Result<GeneratedSlide>;
    /// Copilot, image and research prompts for one slide in a single call.
    async fn fetch_all_suggestions(&self, slide: &SlideContext) -> anyhow::Result<SuggestionSet>;
}

pub struct MissingAssistant;

fn unavailable<T>() -> anyhow::Result<T> {
    Err(anyhow!(AssistantError::Transport(
        "assistant backend is unavailable".into()
    )))
}

#[async_trait]
impl AssistantGateway for MissingAssistant {
    async fn rewrite(&self, _slide: &SlideContext, _instruction: &str) -> anyhow::Result<String> {
        unavailable()
    }

    async fn analyze(&self, _slide: &SlideContext) -> anyhow::Result<SlideAnalysis> {
        unavailable()
    }

    async fn research(&self, _query: &str) -> anyhow::Result<ResearchBrief> {
        unavailable()
    }

    async fn suggest_layout(&self, _slide: &SlideContext) -> anyhow::Result<LayoutSuggestion> {
        unavailable()
    }

    async fn suggest_bar_chart(&self, _slide: &SlideContext) -> anyhow::Result<ChartData> {
        unavailable()
    }

    async fn suggest_pie_chart(&self, _slide: &SlideContext) -> anyhow::Result<ChartData> {
        unavailable()
    }

    async fn generate_table(
        &self,
        _slide: &SlideContext,
        _instruction: &str,
    ) -> anyhow::Result<TableData> {
        unavailable()
    }

    async fn generate_headlines(&self, _slide: &SlideContext) -> anyhow::Result<Vec<String>> {
        unavailable()
    }

    async fn extract_metrics(&self, _slide: &SlideContext) -> anyhow::Result<Vec<Metric>> {
        unavailable()
    }

    async fn generate_image(&self, _slide: &SlideContext, _prompt: &str) -> anyhow::Result<String> {
        unavailable()
    }

    async fn edit_image(
        &self,
        _slide: &SlideContext,
        _image_url: &str,
        _instruction: &str,
    ) -> anyhow::Result<String> {
        unavailable()
    }

    async fn summarize_bio(&self, _slide: &SlideContext, _bio: &str) -> anyhow::Result<String> {
        unavailable()
    }

    async fn generate_financials(
        &self,
        _deck: &DeckContext,
        _assumptions: &str,
    ) -> anyhow::Result<FinancialProjection> {
        unavailable()
    }

    async fn generate_roadmap_slide(
        &self,
        _deck: &DeckContext,
        _milestones: &str,
    ) -> anyhow::Result<GeneratedSlide> {
        unavailable()
    }

    async fn fetch_all_suggestions(&self, _slide: &SlideContext) -> anyhow::Result<SuggestionSet> {
        unavailable()
    }
}
