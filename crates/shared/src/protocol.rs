use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ChartData, Deck, ImageRef, Slide, SlideId, TableData};

/// One assistant-backed operation exposed to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Rewrite,
    Analyze,
    Research,
    SuggestLayout,
    SuggestBarChart,
    SuggestPieChart,
    GenerateTable,
    GenerateHeadlines,
    ExtractMetrics,
    GenerateImage,
    EditImage,
    SummarizeBio,
    GenerateFinancials,
    GenerateRoadmapSlide,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Capability::Rewrite,
        Capability::Analyze,
        Capability::Research,
        Capability::SuggestLayout,
        Capability::SuggestBarChart,
        Capability::SuggestPieChart,
        Capability::GenerateTable,
        Capability::GenerateHeadlines,
        Capability::ExtractMetrics,
        Capability::GenerateImage,
        Capability::EditImage,
        Capability::SummarizeBio,
        Capability::GenerateFinancials,
        Capability::GenerateRoadmapSlide,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Capability::Rewrite => "rewrite",
            Capability::Analyze => "analyze",
            Capability::Research => "research",
            Capability::SuggestLayout => "suggest-layout",
            Capability::SuggestBarChart => "suggest-bar-chart",
            Capability::SuggestPieChart => "suggest-pie-chart",
            Capability::GenerateTable => "generate-table",
            Capability::GenerateHeadlines => "generate-headlines",
            Capability::ExtractMetrics => "extract-metrics",
            Capability::GenerateImage => "generate-image",
            Capability::EditImage => "edit-image",
            Capability::SummarizeBio => "summarize-bio",
            Capability::GenerateFinancials => "generate-financials",
            Capability::GenerateRoadmapSlide => "generate-roadmap-slide",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// The slide fields sent along with every slide-scoped assistant call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideContext {
    pub slide_id: SlideId,
    pub title: String,
    pub content: String,
}

impl From<&Slide> for SlideContext {
    fn from(slide: &Slide) -> Self {
        Self {
            slide_id: slide.id,
            title: slide.title.clone(),
            content: slide.content().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckContext {
    pub title: String,
    pub slides: Vec<SlideContext>,
}

impl From<&Deck> for DeckContext {
    fn from(deck: &Deck) -> Self {
        Self {
            title: deck.title.clone(),
            slides: deck.slides.iter().map(SlideContext::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideAnalysis {
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchSource {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBrief {
    pub query: String,
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<ResearchSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutSuggestion {
    pub template: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialYear {
    pub year: i32,
    pub revenue: f64,
    pub expenses: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialProjection {
    pub years: Vec<FinancialYear>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSlide {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SuggestionSet {
    #[serde(default)]
    pub copilot: Vec<String>,
    #[serde(default)]
    pub image: Vec<String>,
    #[serde(default)]
    pub research: Vec<String>,
}

/// Last successful payload of a capability, kept in its operation slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "capability", content = "payload", rename_all = "kebab-case")]
pub enum CapabilityResult {
    Rewrite(String),
    Analyze(SlideAnalysis),
    Research(ResearchBrief),
    SuggestLayout(LayoutSuggestion),
    SuggestBarChart(ChartData),
    SuggestPieChart(ChartData),
    GenerateTable(TableData),
    GenerateHeadlines(Vec<String>),
    ExtractMetrics(Vec<Metric>),
    GenerateImage(ImageRef),
    EditImage(ImageRef),
    SummarizeBio(String),
    GenerateFinancials(FinancialProjection),
    GenerateRoadmapSlide(SlideId),
}

impl CapabilityResult {
    pub fn capability(&self) -> Capability {
        match self {
            CapabilityResult::Rewrite(_) => Capability::Rewrite,
            CapabilityResult::Analyze(_) => Capability::Analyze,
            CapabilityResult::Research(_) => Capability::Research,
            CapabilityResult::SuggestLayout(_) => Capability::SuggestLayout,
            CapabilityResult::SuggestBarChart(_) => Capability::SuggestBarChart,
            CapabilityResult::SuggestPieChart(_) => Capability::SuggestPieChart,
            CapabilityResult::GenerateTable(_) => Capability::GenerateTable,
            CapabilityResult::GenerateHeadlines(_) => Capability::GenerateHeadlines,
            CapabilityResult::ExtractMetrics(_) => Capability::ExtractMetrics,
            CapabilityResult::GenerateImage(_) => Capability::GenerateImage,
            CapabilityResult::EditImage(_) => Capability::EditImage,
            CapabilityResult::SummarizeBio(_) => Capability::SummarizeBio,
            CapabilityResult::GenerateFinancials(_) => Capability::GenerateFinancials,
            CapabilityResult::GenerateRoadmapSlide(_) => Capability::GenerateRoadmapSlide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_serializes_as_slug() {
        for capability in Capability::ALL {
            let json = serde_json::to_value(capability).expect("json");
            assert_eq!(json, serde_json::Value::String(capability.slug().into()));
        }
    }
}
