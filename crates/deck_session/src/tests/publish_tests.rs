use super::*;
use chrono::TimeZone;
use shared::domain::Slide;

fn deck(title: &str, slides: usize) -> Deck {
    let mut deck = Deck::new(title, "minimal");
    for index in 0..slides {
        deck.slides.push(Slide::new(format!("Slide {index}")));
    }
    deck
}

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().expect("timestamp")
}

#[test]
fn validation_reports_every_problem() {
    let err = validate(&deck("  ", 0)).expect_err("invalid");
    assert_eq!(
        err.problems,
        vec![ValidationProblem::EmptyTitle, ValidationProblem::NoSlides]
    );
    assert!(validate(&deck("Pitch", 1)).is_ok());
}

#[test]
fn happy_path_walks_every_phase() {
    let mut workflow = PublishWorkflow::new();
    let deck = deck("Pitch", 2);

    let ticket = workflow.start(&deck, at(1_700_000_000_000)).expect("start");
    assert_eq!(ticket.deck_id, deck.id);
    assert_eq!(
        ticket.publication.idempotency_key,
        format!("{}-1700000000000", deck.id)
    );
    assert_eq!(workflow.state().phase, PublishPhase::Saving);
    assert_eq!(workflow.state().progress_label, LABEL_SAVING);

    assert!(workflow.saved());
    assert_eq!(workflow.state().phase, PublishPhase::Finalizing);
    assert!(workflow.succeeded());
    assert!(workflow.is_published());
    assert_eq!(workflow.state().progress_label, LABEL_PUBLISHED);
}

#[test]
fn validation_failure_resets_on_acknowledge() {
    let mut workflow = PublishWorkflow::new();

    let err = workflow
        .start(&deck("", 3), at(1))
        .expect_err("empty title");
    assert!(matches!(err, PublishError::Validation(_)));
    assert!(matches!(
        workflow.state().phase,
        PublishPhase::Failed(PublishError::Validation(_))
    ));
    assert_eq!(
        workflow.state().progress_label,
        "Add a deck title before publishing."
    );
    assert!(workflow.state().idempotency_key.is_none());

    assert!(workflow.acknowledge());
    assert_eq!(workflow.state(), &PublishState::default());
}

#[test]
fn start_is_only_valid_from_idle() {
    let mut workflow = PublishWorkflow::new();
    workflow.start(&deck("Pitch", 1), at(1)).expect("start");

    let err = workflow
        .start(&deck("Pitch", 1), at(2))
        .expect_err("already saving");
    assert_eq!(err, PublishError::NotIdle { phase: "saving" });
    assert_eq!(workflow.state().phase, PublishPhase::Saving);
}

#[test]
fn retry_after_durable_failure_reuses_idempotency_key() {
    let mut workflow = PublishWorkflow::new();
    let deck = deck("Pitch", 1);

    let first = workflow.start(&deck, at(1_000)).expect("first");
    assert!(workflow.failed(PersistenceError::new("deck publication", "disk full")));
    assert!(!workflow.is_published());
    assert!(workflow.acknowledge());

    let second = workflow.start(&deck, at(5_000)).expect("second");
    assert_eq!(
        second.publication.idempotency_key,
        first.publication.idempotency_key
    );
    assert_eq!(second.publication.published_at, at(5_000));
}

#[test]
fn success_clears_the_retry_key() {
    let mut workflow = PublishWorkflow::new();
    let deck = deck("Pitch", 1);

    workflow.start(&deck, at(1_000)).expect("first");
    workflow.failed(PersistenceError::new("deck publication", "timeout"));
    workflow.acknowledge();
    workflow.start(&deck, at(2_000)).expect("retry");
    workflow.saved();
    workflow.succeeded();

    assert!(workflow.retry_key.is_none());
}

#[test]
fn transitions_out_of_order_are_refused() {
    let mut workflow = PublishWorkflow::new();
    assert!(!workflow.saved());
    assert!(!workflow.succeeded());
    assert!(!workflow.failed(PersistenceError::new("deck", "x")));
    assert!(!workflow.acknowledge());
    assert_eq!(workflow.state().phase, PublishPhase::Idle);
}

#[test]
fn already_published_deck_resumes_read_only() {
    let mut published = deck("Pitch", 1);
    published.publication = Some(Publication {
        idempotency_key: "deck-1".into(),
        published_at: at(1_000),
    });

    let mut workflow = PublishWorkflow::resume(&published);
    assert!(workflow.is_published());
    assert_eq!(workflow.state().progress_label, LABEL_PUBLISHED);
    assert_eq!(workflow.state().idempotency_key.as_deref(), Some("deck-1"));
    assert!(matches!(
        workflow.start(&published, at(2_000)),
        Err(PublishError::NotIdle { phase: "succeeded" })
    ));

    assert!(!PublishWorkflow::resume(&deck("Pitch", 1)).is_published());
}
