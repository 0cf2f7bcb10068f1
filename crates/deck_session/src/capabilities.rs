use std::sync::Arc;

use shared::{
    domain::{ChartData, ImageRef, Slide, SlideId, SlidePatch, SlideVisual, TableData},
    protocol::{
        Capability, CapabilityResult, DeckContext, FinancialProjection, LayoutSuggestion, Metric,
        ResearchBrief, SlideAnalysis, SlideContext,
    },
};
use tracing::{debug, info, warn};

use crate::{
    events::SessionEvent, operations::CapabilityError, SessionController, SessionState,
};

/// Canned research angles derived from the selected slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResearchTopic {
    Competitors,
    SocialProof,
    MarketSize,
}

impl ResearchTopic {
    fn query(self, deck_title: &str, slide: &Slide) -> String {
        let subject = match (deck_title.trim(), slide.title.trim()) {
            ("", slide_title) => slide_title.to_string(),
            (deck_title, "") => deck_title.to_string(),
            (deck_title, slide_title) => format!("{deck_title}: {slide_title}"),
        };
        match self {
            ResearchTopic::Competitors => format!("Main competitors and alternatives for {subject}"),
            ResearchTopic::SocialProof => {
                format!("Customer testimonials, press coverage and adoption signals for {subject}")
            }
            ResearchTopic::MarketSize => {
                format!("Total addressable market size and growth rate for {subject}")
            }
        }
    }
}

/// Slide and deck title captured when a slide-scoped call starts.
struct SlideTarget {
    slide: Slide,
    deck_title: String,
}

impl SlideTarget {
    fn id(&self) -> SlideId {
        self.slide.id
    }

    fn context(&self) -> SlideContext {
        SlideContext::from(&self.slide)
    }
}

/// One admitted call of a capability. Dropping it before `finish` settles the
/// slot (the caller stopped waiting) releases the call instead.
struct InFlight<'a> {
    session: &'a SessionController,
    capability: Capability,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let capability = self.capability;
        debug!(%capability, "capability: call abandoned");
        let slot = self.session.operations().abandon(capability).clone();
        self.session
            .emit(SessionEvent::OperationUpdated { capability, slot });
    }
}

impl SessionController {
    /// Admits a call under the lock: records the rejection in the slot when it
    /// cannot start, otherwise marks the slot pending.
    fn admit(
        &self,
        state: &SessionState,
        capability: Capability,
        check: Result<(), CapabilityError>,
    ) -> Result<InFlight<'_>, CapabilityError> {
        let check = if state.publish.is_published() {
            Err(CapabilityError::ReadOnly)
        } else {
            check
        };
        let slot = match &check {
            Ok(()) => self.operations().begin(capability).clone(),
            Err(err) => {
                debug!(%capability, reason = %err, "capability: refused");
                self.operations().reject(capability, err).clone()
            }
        };
        self.emit(SessionEvent::OperationUpdated { capability, slot });
        check.map(|()| InFlight {
            session: self,
            capability,
            settled: false,
        })
    }

    async fn begin_on_slide(
        &self,
        capability: Capability,
        require: impl FnOnce(&Slide) -> Result<(), CapabilityError>,
    ) -> Result<(SlideTarget, InFlight<'_>), CapabilityError> {
        let guard = self.inner.lock().await;
        let selected = guard.store.selected().cloned();
        let check = selected
            .as_ref()
            .ok_or(CapabilityError::NoSelection)
            .and_then(require);
        let call = self.admit(&*guard, capability, check)?;
        let slide = selected.ok_or(CapabilityError::NoSelection)?;
        let target = SlideTarget {
            slide,
            deck_title: guard.store.deck().title.clone(),
        };
        Ok((target, call))
    }

    async fn begin_on_deck(
        &self,
        capability: Capability,
    ) -> Result<(DeckContext, InFlight<'_>), CapabilityError> {
        let guard = self.inner.lock().await;
        let call = self.admit(&*guard, capability, Ok(()))?;
        Ok((DeckContext::from(guard.store.deck()), call))
    }

    /// Settles the slot for `call`. On success `apply` runs under the lock and
    /// returns the payload kept in the slot, or the reason its effect was
    /// refused.
    async fn finish<T>(
        &self,
        mut call: InFlight<'_>,
        outcome: anyhow::Result<T>,
        apply: impl FnOnce(&mut SessionState, &T) -> Result<CapabilityResult, CapabilityError>,
    ) -> Result<T, CapabilityError> {
        let capability = call.capability;
        let mut guard = self.inner.lock().await;
        let applied = match outcome {
            Ok(value) => apply(&mut *guard, &value).map(|result| (value, result)),
            Err(err) => {
                warn!(
                    %capability,
                    error = %format!("{err:#}"),
                    "assistant: capability failed"
                );
                Err(CapabilityError::from_provider(err))
            }
        };
        call.settled = true;
        match applied {
            Ok((value, result)) => {
                let slot = self.operations().succeed(result).clone();
                self.emit(SessionEvent::OperationUpdated { capability, slot });
                Ok(value)
            }
            Err(error) => {
                let slot = self.operations().fail(capability, &error).clone();
                self.emit(SessionEvent::OperationUpdated { capability, slot });
                Err(error)
            }
        }
    }

    /// Routes a capability result to the slide it was requested for, even if
    /// the selection has moved on since.
    fn apply_to_slide(
        &self,
        state: &mut SessionState,
        slide_id: SlideId,
        patch: SlidePatch,
    ) -> Result<(), CapabilityError> {
        if state.publish.is_published() {
            debug!(%slide_id, "capability: deck published meanwhile, result not applied");
            return Err(CapabilityError::ReadOnly);
        }
        match self
            .coordinator
            .apply_patch(&mut state.store, slide_id, patch)
        {
            Ok(write) => {
                write.detach();
                Ok(())
            }
            Err(err) => {
                warn!(%slide_id, error = %err, "capability: result not applied");
                Err(CapabilityError::SlideMissing(slide_id))
            }
        }
    }

    fn append_to_deck(&self, state: &mut SessionState, slide: Slide) -> Result<(), CapabilityError> {
        let slide_id = slide.id;
        if state.publish.is_published() {
            debug!(%slide_id, "capability: deck published meanwhile, slide not appended");
            return Err(CapabilityError::ReadOnly);
        }
        match self.coordinator.append_slide(&mut state.store, slide) {
            Ok(write) => {
                write.detach();
                Ok(())
            }
            Err(err) => {
                warn!(%slide_id, error = %err, "capability: slide not appended");
                Err(CapabilityError::DuplicateSlide(slide_id))
            }
        }
    }

    pub async fn rewrite(&self, instruction: &str) -> Result<String, CapabilityError> {
        let (target, call) = self.begin_on_slide(Capability::Rewrite, |_| Ok(())).await?;
        let outcome = self.assistant.rewrite(&target.context(), instruction).await;
        self.finish(call, outcome, |state, content: &String| {
            self.apply_to_slide(state, target.id(), SlidePatch::content(content.clone()))?;
            Ok(CapabilityResult::Rewrite(content.clone()))
        })
        .await
    }

    pub async fn analyze(&self) -> Result<SlideAnalysis, CapabilityError> {
        let (target, call) = self.begin_on_slide(Capability::Analyze, |_| Ok(())).await?;
        let outcome = self.assistant.analyze(&target.context()).await;
        self.finish(call, outcome, |_, analysis: &SlideAnalysis| {
            Ok(CapabilityResult::Analyze(analysis.clone()))
        })
        .await
    }

    /// Free-form research; does not need a selected slide.
    pub async fn research(&self, query: &str) -> Result<ResearchBrief, CapabilityError> {
        let (_, call) = self.begin_on_deck(Capability::Research).await?;
        let outcome = self.assistant.research(query).await;
        self.finish_research(call, outcome).await
    }

    pub async fn research_competitors(&self) -> Result<ResearchBrief, CapabilityError> {
        self.research_topic(ResearchTopic::Competitors).await
    }

    pub async fn research_social_proof(&self) -> Result<ResearchBrief, CapabilityError> {
        self.research_topic(ResearchTopic::SocialProof).await
    }

    pub async fn research_market_size(&self) -> Result<ResearchBrief, CapabilityError> {
        self.research_topic(ResearchTopic::MarketSize).await
    }

    pub async fn research_topic(&self, topic: ResearchTopic) -> Result<ResearchBrief, CapabilityError> {
        let (target, call) = self.begin_on_slide(Capability::Research, |_| Ok(())).await?;
        let query = topic.query(&target.deck_title, &target.slide);
        debug!(?topic, %query, "capability: research query derived");
        let outcome = self.assistant.research(&query).await;
        self.finish_research(call, outcome).await
    }

    async fn finish_research(
        &self,
        call: InFlight<'_>,
        outcome: anyhow::Result<ResearchBrief>,
    ) -> Result<ResearchBrief, CapabilityError> {
        self.finish(call, outcome, |_, brief: &ResearchBrief| {
            Ok(CapabilityResult::Research(brief.clone()))
        })
        .await
    }

    pub async fn suggest_layout(&self) -> Result<LayoutSuggestion, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::SuggestLayout, |_| Ok(()))
            .await?;
        let outcome = self.assistant.suggest_layout(&target.context()).await;
        self.finish(call, outcome, |state, layout: &LayoutSuggestion| {
            self.apply_to_slide(
                state,
                target.id(),
                SlidePatch::template(Some(layout.template.clone())),
            )?;
            Ok(CapabilityResult::SuggestLayout(layout.clone()))
        })
        .await
    }

    pub async fn suggest_bar_chart(&self) -> Result<ChartData, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::SuggestBarChart, |_| Ok(()))
            .await?;
        let outcome = self.assistant.suggest_bar_chart(&target.context()).await;
        self.finish(call, outcome, |state, chart: &ChartData| {
            self.apply_to_slide(
                state,
                target.id(),
                SlidePatch::visual(SlideVisual::Chart(chart.clone())),
            )?;
            Ok(CapabilityResult::SuggestBarChart(chart.clone()))
        })
        .await
    }

    pub async fn suggest_pie_chart(&self) -> Result<ChartData, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::SuggestPieChart, |_| Ok(()))
            .await?;
        let outcome = self.assistant.suggest_pie_chart(&target.context()).await;
        self.finish(call, outcome, |state, chart: &ChartData| {
            self.apply_to_slide(
                state,
                target.id(),
                SlidePatch::visual(SlideVisual::Chart(chart.clone())),
            )?;
            Ok(CapabilityResult::SuggestPieChart(chart.clone()))
        })
        .await
    }

    pub async fn generate_table(&self, instruction: &str) -> Result<TableData, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::GenerateTable, |_| Ok(()))
            .await?;
        let outcome = self
            .assistant
            .generate_table(&target.context(), instruction)
            .await;
        self.finish(call, outcome, |state, table: &TableData| {
            self.apply_to_slide(
                state,
                target.id(),
                SlidePatch::visual(SlideVisual::Table(table.clone())),
            )?;
            Ok(CapabilityResult::GenerateTable(table.clone()))
        })
        .await
    }

    pub async fn generate_headlines(&self) -> Result<Vec<String>, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::GenerateHeadlines, |_| Ok(()))
            .await?;
        let outcome = self.assistant.generate_headlines(&target.context()).await;
        self.finish(call, outcome, |_, headlines: &Vec<String>| {
            Ok(CapabilityResult::GenerateHeadlines(headlines.clone()))
        })
        .await
    }

    pub async fn extract_metrics(&self) -> Result<Vec<Metric>, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::ExtractMetrics, |_| Ok(()))
            .await?;
        let outcome = self.assistant.extract_metrics(&target.context()).await;
        self.finish(call, outcome, |_, metrics: &Vec<Metric>| {
            Ok(CapabilityResult::ExtractMetrics(metrics.clone()))
        })
        .await
    }

    /// Renders an image for the selected slide. Without an explicit prompt the
    /// slide's pending image prompt is used, then its title.
    pub async fn generate_image(&self, prompt: Option<&str>) -> Result<String, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::GenerateImage, |_| Ok(()))
            .await?;
        let prompt = match (prompt, &target.slide.image) {
            (Some(prompt), _) => prompt.to_string(),
            (None, Some(ImageRef::Prompt(placeholder))) => placeholder.clone(),
            (None, _) => target.slide.title.clone(),
        };
        let outcome = self
            .assistant
            .generate_image(&target.context(), &prompt)
            .await;
        self.finish(call, outcome, |state, url: &String| {
            let image = ImageRef::Url(url.clone());
            self.apply_to_slide(state, target.id(), SlidePatch::image(Some(image.clone())))?;
            Ok(CapabilityResult::GenerateImage(image))
        })
        .await
    }

    pub async fn edit_image(&self, instruction: &str) -> Result<String, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::EditImage, |slide| {
                match slide.image.as_ref().and_then(ImageRef::url) {
                    Some(_) => Ok(()),
                    None => Err(CapabilityError::MissingImage),
                }
            })
            .await?;
        let image_url = target
            .slide
            .image
            .as_ref()
            .and_then(ImageRef::url)
            .unwrap_or_default()
            .to_string();
        let outcome = self
            .assistant
            .edit_image(&target.context(), &image_url, instruction)
            .await;
        self.finish(call, outcome, |state, url: &String| {
            let image = ImageRef::Url(url.clone());
            self.apply_to_slide(state, target.id(), SlidePatch::image(Some(image.clone())))?;
            Ok(CapabilityResult::EditImage(image))
        })
        .await
    }

    /// Summarizes `bio` and rewrites the selected slide around the summary.
    /// Only the summarize-bio slot tracks this call.
    pub async fn summarize_bio(&self, bio: &str) -> Result<String, CapabilityError> {
        let (target, call) = self
            .begin_on_slide(Capability::SummarizeBio, |_| Ok(()))
            .await?;
        let context = target.context();
        let outcome: anyhow::Result<(String, String)> = async {
            let summary = self.assistant.summarize_bio(&context, bio).await?;
            let instruction = format!(
                "Rewrite this slide as a short team member bio built around this summary: {summary}"
            );
            let content = self.assistant.rewrite(&context, &instruction).await?;
            Ok((summary, content))
        }
        .await;
        let (summary, _) = self
            .finish(call, outcome, |state, (summary, content): &(String, String)| {
                self.apply_to_slide(state, target.id(), SlidePatch::content(content.clone()))?;
                Ok(CapabilityResult::SummarizeBio(summary.clone()))
            })
            .await?;
        Ok(summary)
    }

    pub async fn generate_financials(
        &self,
        assumptions: &str,
    ) -> Result<FinancialProjection, CapabilityError> {
        let (deck, call) = self.begin_on_deck(Capability::GenerateFinancials).await?;
        let outcome = self.assistant.generate_financials(&deck, assumptions).await;
        self.finish(call, outcome, |_, projection: &FinancialProjection| {
            Ok(CapabilityResult::GenerateFinancials(projection.clone()))
        })
        .await
    }

    /// Appends an assistant-written roadmap slide, persists it and selects it.
    pub async fn generate_roadmap_slide(
        self: &Arc<Self>,
        milestones: &str,
    ) -> Result<Slide, CapabilityError> {
        let (deck, call) = self.begin_on_deck(Capability::GenerateRoadmapSlide).await?;
        let outcome = self
            .assistant
            .generate_roadmap_slide(&deck, milestones)
            .await
            .map(|generated| {
                let mut slide = Slide::new(generated.title).with_content(generated.content);
                slide.image = generated.image_prompt.map(ImageRef::Prompt);
                slide
            });
        let slide = self
            .finish(call, outcome, |state, slide: &Slide| {
                self.append_to_deck(state, slide.clone())?;
                Ok(CapabilityResult::GenerateRoadmapSlide(slide.id))
            })
            .await?;

        match self.select_slide(slide.id).await {
            Ok(fetch) => {
                info!(slide_id = %slide.id, "capability: roadmap slide appended");
                drop(fetch);
            }
            Err(err) => {
                warn!(slide_id = %slide.id, error = %err, "capability: roadmap slide not selected")
            }
        }
        Ok(slide)
    }
}
