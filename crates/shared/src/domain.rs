use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_newtype!(DeckId);
id_newtype!(SlideId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub kind: ChartKind,
    #[serde(default)]
    pub title: String,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// The one structured payload a slide shows. Holding it in a single enum keeps
/// text, chart and table mutually exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SlideVisual {
    #[default]
    Empty,
    Text(String),
    Chart(ChartData),
    Table(TableData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageRef {
    /// A concrete image location.
    Url(String),
    /// An AI image prompt that has not been rendered yet.
    Prompt(String),
}

impl ImageRef {
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageRef::Url(url) => Some(url),
            ImageRef::Prompt(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: SlideId,
    pub title: String,
    #[serde(default)]
    pub visual: SlideVisual,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl Slide {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: SlideId::new(),
            title: title.into(),
            visual: SlideVisual::Empty,
            image: None,
            template: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.set_active_representation(SlideVisual::Text(content.into()));
        self
    }

    /// Free text shown on the slide, empty when a chart or table is active.
    pub fn content(&self) -> &str {
        match &self.visual {
            SlideVisual::Text(text) => text,
            _ => "",
        }
    }

    /// Swaps the active representation, dropping whatever was shown before.
    pub fn set_active_representation(&mut self, visual: SlideVisual) -> SlideVisual {
        std::mem::replace(&mut self.visual, visual)
    }

    pub fn apply(&mut self, patch: &SlidePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(visual) = &patch.visual {
            self.set_active_representation(visual.clone());
        }
        if let Some(image) = &patch.image {
            self.image = image.clone();
        }
        if let Some(template) = &patch.template {
            self.template = template.clone();
        }
    }
}

/// Partial slide update. `None` leaves a field untouched; the nested options
/// on `image` and `template` distinguish "clear" from "keep".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SlidePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<SlideVisual>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<ImageRef>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<Option<String>>,
}

impl SlidePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self::visual(SlideVisual::Text(content.into()))
    }

    pub fn visual(visual: SlideVisual) -> Self {
        Self {
            visual: Some(visual),
            ..Self::default()
        }
    }

    pub fn image(image: Option<ImageRef>) -> Self {
        Self {
            image: Some(image),
            ..Self::default()
        }
    }

    pub fn template(template: Option<String>) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.visual.is_none()
            && self.image.is_none()
            && self.template.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub idempotency_key: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub title: String,
    pub template: String,
    pub slides: Vec<Slide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
}

impl Deck {
    pub fn new(title: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: DeckId::new(),
            title: title.into(),
            template: template.into(),
            slides: Vec::new(),
            publication: None,
        }
    }

    pub fn slide(&self, slide_id: SlideId) -> Option<&Slide> {
        self.slides.iter().find(|slide| slide.id == slide_id)
    }

    pub fn slide_mut(&mut self, slide_id: SlideId) -> Option<&mut Slide> {
        self.slides.iter_mut().find(|slide| slide.id == slide_id)
    }

    pub fn position(&self, slide_id: SlideId) -> Option<usize> {
        self.slides.iter().position(|slide| slide.id == slide_id)
    }

    pub fn apply(&mut self, patch: &DeckPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(template) = &patch.template {
            self.template = template.clone();
        }
        if let Some(publication) = &patch.publication {
            self.publication = Some(publication.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeckPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
}

impl DeckPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn template(template: impl Into<String>) -> Self {
        Self {
            template: Some(template.into()),
            ..Self::default()
        }
    }
}
