use super::*;
use shared::domain::Slide;

#[test]
fn slide_positions_are_one_based() {
    let mut deck = Deck::new("Seed round", "minimal");
    deck.slides.push(Slide::new("Problem"));
    deck.slides.push(Slide::new("Solution"));

    assert_eq!(slide_at(&deck, 1).expect("first"), deck.slides[0].id);
    assert_eq!(slide_at(&deck, 2).expect("second"), deck.slides[1].id);

    let err = slide_at(&deck, 0).expect_err("zero");
    assert_eq!(err.to_string(), "deck has no slide at position 0");
    assert!(slide_at(&deck, 3).is_err());
}
