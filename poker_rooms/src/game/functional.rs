use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
};

use super::entities::{ACE, Card, HandValue, Rank, Suit, Value};

/// Get the indices corresponding to the winning hands from an array
/// of hands that were each created from `eval`. Every hand tied for best
/// is returned so pots can be split.
///
/// # Examples
///
/// ```
/// use poker_rooms::{entities::{Card, Suit}, functional::{argmax, eval}};
///
/// let cards1 = [Card(4, Suit::Club), Card(11, Suit::Spade)];
/// let cards2 = [Card(4, Suit::Club), Card(12, Suit::Spade)];
/// let hand1 = eval(&cards1);
/// let hand2 = eval(&cards2);
/// assert_eq!(argmax(&[hand1, hand2]), vec![1])
/// ```
pub fn argmax(hands: &[HandValue]) -> Vec<usize> {
    let mut max: Option<&HandValue> = None;
    let mut argmaxes: Vec<usize> = Vec::new();
    for (i, hand) in hands.iter().enumerate() {
        match max.map(|max| hand.cmp(max)) {
            Some(Ordering::Equal) => argmaxes.push(i),
            Some(Ordering::Less) => {}
            Some(Ordering::Greater) | None => {
                argmaxes.clear();
                argmaxes.push(i);
                max = Some(hand);
            }
        }
    }
    argmaxes
}

/// Evaluate each set of cards once and return the indices of every set
/// tied for the best hand.
pub fn determine_winners(hands: &[Vec<Card>]) -> Vec<usize> {
    let hands: Vec<HandValue> = hands.iter().map(|cards| eval(cards)).collect();
    argmax(&hands)
}

/// Evaluate any number of cards (typically 2 hole cards plus up to 5
/// community cards), returning the category of the best 5-card hand and
/// the values needed to break ties within that category.
///
/// The result doesn't depend on the order of `cards`.
///
/// # Examples
///
/// ```
/// use poker_rooms::{entities::{Card, Rank, Suit}, functional::eval};
///
/// let cards = [Card(4, Suit::Club), Card(4, Suit::Heart), Card(11, Suit::Spade)];
/// let hand = eval(&cards);
/// assert_eq!(hand.rank, Rank::OnePair);
/// assert_eq!(hand.values, vec![4, 11]);
/// ```
pub fn eval(cards: &[Card]) -> HandValue {
    // Count the number of times a card value appears. Helps track
    // one pair, two pair, etc.
    let mut value_counts: BTreeMap<Value, usize> = BTreeMap::new();
    // Mapping of suit to the values within that suit. Used for tracking
    // whether there's a flush or straight flush.
    let mut values_per_suit: HashMap<Suit, Vec<Value>> = HashMap::new();
    for Card(value, suit) in cards {
        *value_counts.entry(*value).or_default() += 1;
        values_per_suit.entry(*suit).or_default().push(*value);
    }

    // Partition values by how often they appear, highest values first.
    let mut quads: Vec<Value> = Vec::new();
    let mut trips: Vec<Value> = Vec::new();
    let mut pairs: Vec<Value> = Vec::new();
    for (value, count) in value_counts.iter().rev() {
        match count {
            1 => {}
            2 => pairs.push(*value),
            3 => trips.push(*value),
            _ => quads.push(*value),
        }
    }

    // Only one suit can reach five cards in a 7-card hand, but keep the
    // best one anyways in case more cards are evaluated.
    let mut flush: Option<Vec<Value>> = None;
    let mut straight_flush: Option<Value> = None;
    for values in values_per_suit.values_mut().filter(|values| values.len() >= 5) {
        values.sort_unstable_by(|a, b| b.cmp(a));
        straight_flush = straight_flush.max(straight_high(values));
        let top: Vec<Value> = values[..5].to_vec();
        if flush.as_ref().is_none_or(|best| top > *best) {
            flush = Some(top);
        }
    }

    let all_values: Vec<Value> = value_counts.keys().copied().collect();
    let kickers = |used: &[Value], n: usize| -> Vec<Value> {
        all_values
            .iter()
            .rev()
            .filter(|value| !used.contains(value))
            .take(n)
            .copied()
            .collect()
    };

    if let Some(high) = straight_flush {
        let rank = if high == ACE {
            Rank::RoyalFlush
        } else {
            Rank::StraightFlush
        };
        return HandValue {
            rank,
            values: vec![high],
        };
    }

    if let Some(&quad) = quads.first() {
        let mut values = vec![quad];
        values.extend(kickers(&[quad], 1));
        return HandValue {
            rank: Rank::FourOfAKind,
            values,
        };
    }

    if let Some(&trip) = trips.first() {
        // A second three of a kind can fill in as the pair.
        let pair = match (trips.get(1), pairs.first()) {
            (Some(&t), Some(&p)) => Some(t.max(p)),
            (Some(&t), None) => Some(t),
            (None, Some(&p)) => Some(p),
            (None, None) => None,
        };
        if let Some(pair) = pair {
            return HandValue {
                rank: Rank::FullHouse,
                values: vec![trip, pair],
            };
        }
    }

    if let Some(values) = flush {
        return HandValue {
            rank: Rank::Flush,
            values,
        };
    }

    if let Some(high) = straight_high(&all_values) {
        return HandValue {
            rank: Rank::Straight,
            values: vec![high],
        };
    }

    if let Some(&trip) = trips.first() {
        let mut values = vec![trip];
        values.extend(kickers(&[trip], 2));
        return HandValue {
            rank: Rank::ThreeOfAKind,
            values,
        };
    }

    match pairs[..] {
        [high, low, ..] => {
            let mut values = vec![high, low];
            values.extend(kickers(&[high, low], 1));
            HandValue {
                rank: Rank::TwoPair,
                values,
            }
        }
        [pair] => {
            let mut values = vec![pair];
            values.extend(kickers(&[pair], 3));
            HandValue {
                rank: Rank::OnePair,
                values,
            }
        }
        [] => HandValue {
            rank: Rank::HighCard,
            values: kickers(&[], 5),
        },
    }
}

/// Return the high card of the best straight within `values`, if any.
/// The wheel (A-2-3-4-5) counts as a straight with a high card of 5.
fn straight_high(values: &[Value]) -> Option<Value> {
    let mut unique = values.to_vec();
    unique.sort_unstable();
    unique.dedup();

    let mut best = None;
    let mut count: usize = 0;
    let mut prev: Value = 0;
    for value in unique.iter() {
        if count > 0 && prev + 1 == *value {
            count += 1;
        } else {
            count = 1;
        }
        prev = *value;
        if count >= 5 {
            best = Some(*value);
        }
    }

    if best.is_none() && [ACE, 2, 3, 4, 5].iter().all(|v| unique.contains(v)) {
        best = Some(5);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::{argmax, determine_winners, eval};
    use crate::game::entities::{Card, HandValue, Rank, Suit};

    struct TestHand {
        expected_rank: Rank,
        cards: Vec<Card>,
    }

    macro_rules! eval_and_argmax_tests {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (test_hand1, test_hand2, expected_winner) = $value;
                let hand1 = eval(&test_hand1.cards);
                let hand2 = eval(&test_hand2.cards);
                assert_eq!(test_hand1.expected_rank, hand1.rank);
                assert_eq!(test_hand2.expected_rank, hand2.rank);
                assert_eq!(expected_winner, argmax(&[hand1, hand2]));
            }
        )*
        }
    }

    eval_and_argmax_tests! {
        royal_flush_wins_to_straight_flush: (TestHand{expected_rank: Rank::RoyalFlush, cards: vec![
            Card(14, Suit::Spade),
            Card(13, Suit::Spade),
            Card(12, Suit::Spade),
            Card(11, Suit::Spade),
            Card(10, Suit::Spade),
            Card(2, Suit::Heart),
            Card(3, Suit::Club),
        ]}, TestHand{expected_rank: Rank::StraightFlush, cards: vec![
            Card(13, Suit::Heart),
            Card(12, Suit::Heart),
            Card(11, Suit::Heart),
            Card(10, Suit::Heart),
            Card(9, Suit::Heart),
            Card(14, Suit::Club),
            Card(14, Suit::Diamond),
        ]}, vec![0]),
        straight_flush_wins_to_flush: (TestHand{expected_rank: Rank::StraightFlush, cards: vec![
            Card(5, Suit::Heart),
            Card(6, Suit::Heart),
            Card(7, Suit::Heart),
            Card(8, Suit::Heart),
            Card(9, Suit::Heart),
            Card(14, Suit::Heart),
        ]}, TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(2, Suit::Diamond),
            Card(4, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(7, Suit::Diamond),
        ]}, vec![0]),
        straight_loses_to_straight_flush: (TestHand{expected_rank: Rank::Straight, cards: vec![
            Card(4, Suit::Heart),
            Card(5, Suit::Heart),
            Card(6, Suit::Club),
            Card(7, Suit::Heart),
            Card(8, Suit::Heart),
        ]}, TestHand{expected_rank: Rank::StraightFlush, cards: vec![
            Card(3, Suit::Diamond),
            Card(4, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(7, Suit::Diamond),
        ]}, vec![1]),
        straight_wins_to_high_card: (TestHand{expected_rank: Rank::Straight, cards: vec![
            Card(4, Suit::Heart),
            Card(5, Suit::Heart),
            Card(6, Suit::Club),
            Card(7, Suit::Heart),
            Card(8, Suit::Heart),
        ]}, TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(14, Suit::Diamond),
            Card(5, Suit::Heart),
            Card(6, Suit::Heart),
            Card(7, Suit::Heart),
            Card(8, Suit::Club),
            Card(10, Suit::Diamond),
        ]}, vec![0]),
        wheel_loses_to_six_high_straight: (TestHand{expected_rank: Rank::Straight, cards: vec![
            Card(14, Suit::Heart),
            Card(2, Suit::Club),
            Card(3, Suit::Diamond),
            Card(4, Suit::Heart),
            Card(5, Suit::Spade),
            Card(13, Suit::Spade),
            Card(9, Suit::Club),
        ]}, TestHand{expected_rank: Rank::Straight, cards: vec![
            Card(2, Suit::Club),
            Card(3, Suit::Diamond),
            Card(4, Suit::Heart),
            Card(5, Suit::Spade),
            Card(6, Suit::Heart),
        ]}, vec![1]),
        flush_loses_to_straight_flush: (TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(4, Suit::Heart),
            Card(5, Suit::Heart),
            Card(6, Suit::Club),
            Card(7, Suit::Heart),
            Card(8, Suit::Heart),
            Card(10, Suit::Heart),
        ]}, TestHand{expected_rank: Rank::StraightFlush, cards: vec![
            Card(3, Suit::Diamond),
            Card(4, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(7, Suit::Diamond),
            Card(8, Suit::Diamond),
        ]}, vec![1]),
        flush_loses_to_flush: (TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(2, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(7, Suit::Diamond),
            Card(9, Suit::Diamond),
        ]}, TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(3, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(7, Suit::Diamond),
            Card(9, Suit::Diamond),
        ]}, vec![1]),
        flush_kickers_come_from_flush_suit: (TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(14, Suit::Club),
            Card(2, Suit::Diamond),
            Card(5, Suit::Diamond),
            Card(6, Suit::Diamond),
            Card(8, Suit::Diamond),
            Card(9, Suit::Diamond),
            Card(13, Suit::Club),
        ]}, TestHand{expected_rank: Rank::Flush, cards: vec![
            Card(3, Suit::Heart),
            Card(5, Suit::Heart),
            Card(6, Suit::Heart),
            Card(8, Suit::Heart),
            Card(9, Suit::Heart),
        ]}, vec![1]),
        high_card_loses_to_high_card: (TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(3, Suit::Club),
            Card(5, Suit::Heart),
            Card(7, Suit::Diamond),
            Card(9, Suit::Heart),
            Card(11, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(4, Suit::Club),
            Card(6, Suit::Heart),
            Card(8, Suit::Diamond),
            Card(10, Suit::Heart),
            Card(12, Suit::Spade),
        ]}, vec![1]),
        high_card_ties_with_high_card: (TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(4, Suit::Club),
            Card(5, Suit::Heart),
            Card(7, Suit::Diamond),
            Card(9, Suit::Heart),
            Card(11, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(4, Suit::Spade),
            Card(5, Suit::Club),
            Card(7, Suit::Heart),
            Card(9, Suit::Diamond),
            Card(11, Suit::Heart),
        ]}, vec![0, 1]),
        sixth_card_does_not_break_ties: (TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(2, Suit::Club),
            Card(5, Suit::Heart),
            Card(7, Suit::Diamond),
            Card(9, Suit::Heart),
            Card(11, Suit::Spade),
            Card(13, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(3, Suit::Club),
            Card(5, Suit::Club),
            Card(7, Suit::Heart),
            Card(9, Suit::Diamond),
            Card(11, Suit::Heart),
            Card(13, Suit::Heart),
        ]}, vec![0, 1]),
        full_house_loses_to_full_house: (TestHand{expected_rank: Rank::FullHouse, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(4, Suit::Diamond),
            Card(6, Suit::Heart),
            Card(6, Suit::Diamond),
            Card(6, Suit::Club),
            Card(12, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::FullHouse, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(4, Suit::Diamond),
            Card(6, Suit::Heart),
            Card(6, Suit::Diamond),
            Card(11, Suit::Spade),
        ]}, vec![0]),
        two_pair_wins_to_two_pair: (TestHand{expected_rank: Rank::TwoPair, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(6, Suit::Heart),
            Card(8, Suit::Diamond),
            Card(12, Suit::Club),
            Card(12, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::TwoPair, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(6, Suit::Heart),
            Card(6, Suit::Diamond),
            Card(11, Suit::Spade),
        ]}, vec![0]),
        one_pair_wins_to_one_pair: (TestHand{expected_rank: Rank::OnePair, cards: vec![
            Card(4, Suit::Club),
            Card(6, Suit::Heart),
            Card(8, Suit::Diamond),
            Card(12, Suit::Club),
            Card(12, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::OnePair, cards: vec![
            Card(3, Suit::Club),
            Card(6, Suit::Heart),
            Card(8, Suit::Diamond),
            Card(12, Suit::Heart),
            Card(12, Suit::Diamond),
        ]}, vec![0]),
        four_of_a_kind_wins_to_two_pair: (TestHand{expected_rank: Rank::FourOfAKind, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(4, Suit::Diamond),
            Card(4, Suit::Spade),
            Card(6, Suit::Heart),
            Card(12, Suit::Club),
            Card(12, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::TwoPair, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(6, Suit::Heart),
            Card(6, Suit::Diamond),
            Card(11, Suit::Spade),
        ]}, vec![0]),
        high_card_loses_to_one_pair: (TestHand{expected_rank: Rank::HighCard, cards: vec![
            Card(4, Suit::Club),
            Card(12, Suit::Spade),
        ]}, TestHand{expected_rank: Rank::OnePair, cards: vec![
            Card(4, Suit::Club),
            Card(4, Suit::Heart),
            Card(11, Suit::Spade),
        ]}, vec![1]),
        three_of_a_kind_loses_to_three_of_a_kind: (TestHand{expected_rank: Rank::ThreeOfAKind, cards: vec![
            Card(6, Suit::Heart),
            Card(14, Suit::Spade),
            Card(14, Suit::Diamond),
            Card(14, Suit::Heart),
        ]}, TestHand{expected_rank: Rank::ThreeOfAKind, cards: vec![
            Card(7, Suit::Heart),
            Card(14, Suit::Spade),
            Card(14, Suit::Diamond),
            Card(14, Suit::Heart),
        ]}, vec![1]),
    }

    #[test]
    fn tie_break_values() {
        let quads = eval(&[
            Card(9, Suit::Club),
            Card(9, Suit::Heart),
            Card(9, Suit::Diamond),
            Card(9, Suit::Spade),
            Card(13, Suit::Heart),
            Card(13, Suit::Club),
            Card(2, Suit::Club),
        ]);
        assert_eq!(
            quads,
            HandValue {
                rank: Rank::FourOfAKind,
                values: vec![9, 13]
            }
        );

        let two_trips = eval(&[
            Card(3, Suit::Club),
            Card(3, Suit::Heart),
            Card(3, Suit::Diamond),
            Card(8, Suit::Spade),
            Card(8, Suit::Heart),
            Card(8, Suit::Club),
            Card(2, Suit::Club),
        ]);
        assert_eq!(
            two_trips,
            HandValue {
                rank: Rank::FullHouse,
                values: vec![8, 3]
            }
        );

        // With three pairs, the third pair can play as the kicker.
        let three_pairs = eval(&[
            Card(10, Suit::Club),
            Card(10, Suit::Heart),
            Card(7, Suit::Diamond),
            Card(7, Suit::Spade),
            Card(5, Suit::Heart),
            Card(5, Suit::Club),
            Card(2, Suit::Club),
        ]);
        assert_eq!(
            three_pairs,
            HandValue {
                rank: Rank::TwoPair,
                values: vec![10, 7, 5]
            }
        );

        let wheel = eval(&[
            Card(14, Suit::Club),
            Card(2, Suit::Heart),
            Card(3, Suit::Diamond),
            Card(4, Suit::Spade),
            Card(5, Suit::Heart),
        ]);
        assert_eq!(
            wheel,
            HandValue {
                rank: Rank::Straight,
                values: vec![5]
            }
        );

        let steel_wheel = eval(&[
            Card(14, Suit::Club),
            Card(2, Suit::Club),
            Card(3, Suit::Club),
            Card(4, Suit::Club),
            Card(5, Suit::Club),
            Card(13, Suit::Club),
        ]);
        assert_eq!(
            steel_wheel,
            HandValue {
                rank: Rank::StraightFlush,
                values: vec![5]
            }
        );
    }

    #[test]
    fn identical_hands_all_win() {
        let board = [
            Card(14, Suit::Spade),
            Card(13, Suit::Spade),
            Card(12, Suit::Spade),
            Card(11, Suit::Spade),
            Card(10, Suit::Spade),
        ];
        let hands: Vec<Vec<Card>> = [
            [Card(2, Suit::Club), Card(3, Suit::Club)],
            [Card(2, Suit::Heart), Card(3, Suit::Heart)],
            [Card(4, Suit::Diamond), Card(7, Suit::Club)],
            [Card(8, Suit::Diamond), Card(9, Suit::Club)],
        ]
        .iter()
        .map(|hole| {
            let mut cards = hole.to_vec();
            cards.extend(board);
            cards
        })
        .collect();
        assert_eq!(determine_winners(&hands), vec![0, 1, 2, 3]);
    }

    #[test]
    fn argmax_of_nothing_is_nothing() {
        assert!(argmax(&[]).is_empty());
        assert!(determine_winners(&[]).is_empty());
    }
}
