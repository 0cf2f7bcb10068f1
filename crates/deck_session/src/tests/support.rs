use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use assistant::{AssistantError, AssistantGateway};
use async_trait::async_trait;
use shared::{
    domain::{
        ChartData, ChartKind, ChartSeries, Deck, DeckId, DeckPatch, Slide, SlideId, SlidePatch,
        TableData,
    },
    protocol::{
        DeckContext, FinancialProjection, FinancialYear, GeneratedSlide, LayoutSuggestion, Metric,
        ResearchBrief, SlideAnalysis, SlideContext, SuggestionSet,
    },
};
use tokio::sync::Semaphore;

use crate::{persistence::PersistenceGateway, SessionController};

pub fn deck_with(titles: &[&str]) -> Deck {
    let mut deck = Deck::new("Seed round", "minimal");
    for title in titles {
        deck.slides
            .push(Slide::new(*title).with_content(format!("{title} body")));
    }
    deck
}

pub fn start(
    deck: Deck,
) -> (
    Arc<SessionController>,
    Arc<RecordingPersistence>,
    Arc<ScriptedAssistant>,
) {
    let persistence = Arc::new(RecordingPersistence::new(deck.clone()));
    let assistant = Arc::new(ScriptedAssistant::default());
    start_with(deck, persistence, assistant)
}

pub fn start_with(
    deck: Deck,
    persistence: Arc<RecordingPersistence>,
    assistant: Arc<ScriptedAssistant>,
) -> (
    Arc<SessionController>,
    Arc<RecordingPersistence>,
    Arc<ScriptedAssistant>,
) {
    let session = SessionController::from_deck(deck, persistence.clone(), assistant.clone());
    (session, persistence, assistant)
}

/// Polls `check` until it holds, failing the test after a few seconds.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition was not reached in time");
}

/// In-memory deck store that records every write it receives.
pub struct RecordingPersistence {
    deck: Mutex<Deck>,
    slide_writes: Mutex<Vec<(SlideId, SlidePatch)>>,
    deck_writes: Mutex<Vec<(DeckId, DeckPatch)>>,
    inserts: Mutex<Vec<(DeckId, Slide)>>,
    fail_slide_writes: AtomicBool,
    panic_slide_writes: AtomicBool,
    publication_failures: AtomicUsize,
}

impl RecordingPersistence {
    pub fn new(deck: Deck) -> Self {
        Self {
            deck: Mutex::new(deck),
            slide_writes: Mutex::new(Vec::new()),
            deck_writes: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            fail_slide_writes: AtomicBool::new(false),
            panic_slide_writes: AtomicBool::new(false),
            publication_failures: AtomicUsize::new(0),
        }
    }

    pub fn fail_slide_writes(&self, fail: bool) {
        self.fail_slide_writes.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_slide_writes(&self, panic: bool) {
        self.panic_slide_writes.store(panic, Ordering::SeqCst);
    }

    /// The next `count` writes carrying a publication fail.
    pub fn fail_publications(&self, count: usize) {
        self.publication_failures.store(count, Ordering::SeqCst);
    }

    pub fn stored_deck(&self) -> Deck {
        self.deck.lock().expect("deck lock").clone()
    }

    pub fn slide_writes(&self) -> Vec<(SlideId, SlidePatch)> {
        self.slide_writes.lock().expect("writes lock").clone()
    }

    pub fn deck_writes(&self) -> Vec<(DeckId, DeckPatch)> {
        self.deck_writes.lock().expect("writes lock").clone()
    }

    pub fn inserts(&self) -> Vec<(DeckId, Slide)> {
        self.inserts.lock().expect("inserts lock").clone()
    }
}

#[async_trait]
impl PersistenceGateway for RecordingPersistence {
    async fn read_deck(&self, deck_id: DeckId) -> Result<Option<Deck>> {
        let deck = self.deck.lock().expect("deck lock");
        Ok((deck.id == deck_id).then(|| deck.clone()))
    }

    async fn write_deck_fields(&self, deck_id: DeckId, patch: &DeckPatch) -> Result<()> {
        self.deck_writes
            .lock()
            .expect("writes lock")
            .push((deck_id, patch.clone()));
        if patch.publication.is_some()
            && self
                .publication_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok()
        {
            return Err(anyhow!("database is locked"));
        }
        self.deck.lock().expect("deck lock").apply(patch);
        Ok(())
    }

    async fn write_slide_fields(&self, slide_id: SlideId, patch: &SlidePatch) -> Result<()> {
        self.slide_writes
            .lock()
            .expect("writes lock")
            .push((slide_id, patch.clone()));
        if self.fail_slide_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        if self.panic_slide_writes.load(Ordering::SeqCst) {
            panic!("slide store crashed");
        }
        let mut deck = self.deck.lock().expect("deck lock");
        let slide = deck
            .slide_mut(slide_id)
            .ok_or_else(|| anyhow!("slide {slide_id} not found"))?;
        slide.apply(patch);
        Ok(())
    }

    async fn insert_slide(&self, deck_id: DeckId, slide: &Slide) -> Result<()> {
        self.inserts
            .lock()
            .expect("inserts lock")
            .push((deck_id, slide.clone()));
        self.deck.lock().expect("deck lock").slides.push(slide.clone());
        Ok(())
    }
}

type FailureFactory = Box<dyn Fn() -> AssistantError + Send + Sync>;

/// Assistant double. Every call is logged as `"{slug}:{subject}"`, where the
/// subject is the slide title, the deck title or the research query. Calls can
/// be held at a gate keyed by that string or by the bare slug.
#[derive(Default)]
pub struct ScriptedAssistant {
    calls: Mutex<Vec<String>>,
    completed: AtomicUsize,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failures: Mutex<HashMap<String, FailureFactory>>,
}

impl ScriptedAssistant {
    pub fn gate(&self, key: &str) {
        self.gates
            .lock()
            .expect("gates lock")
            .insert(key.to_string(), Arc::new(Semaphore::new(0)));
    }

    /// Lets one held call through.
    pub fn release(&self, key: &str) {
        let gates = self.gates.lock().expect("gates lock");
        gates.get(key).expect("gate exists").add_permits(1);
    }

    pub fn fail(&self, slug: &str, failure: impl Fn() -> AssistantError + Send + Sync + 'static) {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(slug.to_string(), Box::new(failure));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, key: &str, count: usize) {
        eventually(|| async move {
            self.calls().iter().filter(|call| call.as_str() == key).count() >= count
        })
        .await;
    }

    async fn enter(&self, slug: &str, subject: &str) -> Result<()> {
        let key = format!("{slug}:{subject}");
        self.calls.lock().expect("calls lock").push(key.clone());
        let gate = {
            let gates = self.gates.lock().expect("gates lock");
            gates.get(&key).or_else(|| gates.get(slug)).cloned()
        };
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        let failures = self.failures.lock().expect("failures lock");
        match failures.get(slug) {
            Some(failure) => Err(failure().into()),
            None => Ok(()),
        }
    }
}

pub fn sample_chart(kind: ChartKind) -> ChartData {
    ChartData {
        kind,
        title: "Revenue".into(),
        labels: vec!["2024".into(), "2025".into()],
        series: vec![ChartSeries {
            name: "ARR".into(),
            values: vec![1.5, 4.0],
        }],
    }
}

#[async_trait]
impl AssistantGateway for ScriptedAssistant {
    async fn rewrite(&self, slide: &SlideContext, instruction: &str) -> Result<String> {
        self.enter("rewrite", &slide.title).await?;
        Ok(format!("{} rewritten: {instruction}", slide.title))
    }

    async fn analyze(&self, slide: &SlideContext) -> Result<SlideAnalysis> {
        self.enter("analyze", &slide.title).await?;
        Ok(SlideAnalysis {
            summary: format!("{} is clear", slide.title),
            strengths: vec!["focused".into()],
            improvements: Vec::new(),
            score: Some(8),
        })
    }

    async fn research(&self, query: &str) -> Result<ResearchBrief> {
        self.enter("research", query).await?;
        Ok(ResearchBrief {
            query: query.to_string(),
            summary: "three notable players".into(),
            sources: Vec::new(),
        })
    }

    async fn suggest_layout(&self, slide: &SlideContext) -> Result<LayoutSuggestion> {
        self.enter("suggest-layout", &slide.title).await?;
        Ok(LayoutSuggestion {
            template: "two-column".into(),
            rationale: "text and visual side by side".into(),
        })
    }

    async fn suggest_bar_chart(&self, slide: &SlideContext) -> Result<ChartData> {
        self.enter("suggest-bar-chart", &slide.title).await?;
        Ok(sample_chart(ChartKind::Bar))
    }

    async fn suggest_pie_chart(&self, slide: &SlideContext) -> Result<ChartData> {
        self.enter("suggest-pie-chart", &slide.title).await?;
        Ok(sample_chart(ChartKind::Pie))
    }

    async fn generate_table(&self, slide: &SlideContext, _instruction: &str) -> Result<TableData> {
        self.enter("generate-table", &slide.title).await?;
        Ok(TableData {
            headers: vec!["Plan".into(), "Price".into()],
            rows: vec![vec!["Team".into(), "$20".into()]],
        })
    }

    async fn generate_headlines(&self, slide: &SlideContext) -> Result<Vec<String>> {
        self.enter("generate-headlines", &slide.title).await?;
        Ok(vec![format!("{}, sharper", slide.title)])
    }

    async fn extract_metrics(&self, slide: &SlideContext) -> Result<Vec<Metric>> {
        self.enter("extract-metrics", &slide.title).await?;
        Ok(vec![Metric {
            label: "ARR".into(),
            value: "$4M".into(),
            context: None,
        }])
    }

    async fn generate_image(&self, slide: &SlideContext, prompt: &str) -> Result<String> {
        self.enter("generate-image", &slide.title).await?;
        Ok(format!("https://img.test/{}", prompt.replace(' ', "-")))
    }

    async fn edit_image(
        &self,
        slide: &SlideContext,
        image_url: &str,
        _instruction: &str,
    ) -> Result<String> {
        self.enter("edit-image", &slide.title).await?;
        Ok(format!("{image_url}?edited"))
    }

    async fn summarize_bio(&self, slide: &SlideContext, _bio: &str) -> Result<String> {
        self.enter("summarize-bio", &slide.title).await?;
        Ok("Operator with two exits".into())
    }

    async fn generate_financials(
        &self,
        deck: &DeckContext,
        _assumptions: &str,
    ) -> Result<FinancialProjection> {
        self.enter("generate-financials", &deck.title).await?;
        Ok(FinancialProjection {
            years: vec![FinancialYear {
                year: 2026,
                revenue: 1_000_000.0,
                expenses: 800_000.0,
                net_income: 200_000.0,
            }],
            assumptions: vec!["20% monthly growth".into()],
        })
    }

    async fn generate_roadmap_slide(
        &self,
        deck: &DeckContext,
        milestones: &str,
    ) -> Result<GeneratedSlide> {
        self.enter("generate-roadmap-slide", &deck.title).await?;
        Ok(GeneratedSlide {
            title: "Roadmap".into(),
            content: milestones.to_string(),
            image_prompt: Some("timeline illustration".into()),
        })
    }

    async fn fetch_all_suggestions(&self, slide: &SlideContext) -> Result<SuggestionSet> {
        self.enter("suggestions", &slide.title).await?;
        Ok(SuggestionSet {
            copilot: vec![format!("copilot for {}", slide.title)],
            image: vec![format!("image for {}", slide.title)],
            research: vec![format!("research for {}", slide.title)],
        })
    }
}
