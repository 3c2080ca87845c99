use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    borrow::Borrow,
    fmt::{self},
    hash::{Hash, Hasher},
    str::FromStr,
};
use thiserror::Error;

use super::{UserError, constants};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Club,
    Spade,
    Diamond,
    Heart,
}

pub const SUITS: [Suit; 4] = [Suit::Club, Suit::Spade, Suit::Diamond, Suit::Heart];

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Club => "c",
            Self::Spade => "s",
            Self::Diamond => "d",
            Self::Heart => "h",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values.
pub type Value = u8;

pub const MIN_VALUE: Value = 2;
pub const ACE: Value = 14;

/// A card is a tuple of a uInt8 value (two=2u8 ... ace=14u8) and a suit.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            11 => "J",
            12 => "Q",
            13 => "K",
            v => &v.to_string(),
        };
        let repr = format!("{value}/{}", self.1);
        write!(f, "{repr:>4}")
    }
}

/// Hand categories, weakest first.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Rank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "high card",
            Self::OnePair => "one pair",
            Self::TwoPair => "two pair",
            Self::ThreeOfAKind => "three of a kind",
            Self::Straight => "straight",
            Self::Flush => "flush",
            Self::FullHouse => "full house",
            Self::FourOfAKind => "four of a kind",
            Self::StraightFlush => "straight flush",
            Self::RoyalFlush => "royal flush",
        };
        write!(f, "{repr}")
    }
}

/// An evaluated hand. Hands compare by rank first and then
/// lexicographically by their tie-break values, so the derived ordering is
/// the poker ordering.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct HandValue {
    pub rank: Rank,
    /// Card values (high to low) whose meaning depends on the rank, e.g.
    /// the quad value followed by the kicker.
    pub values: Vec<Value>,
}

#[derive(Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum DeckError {
    #[error("deck exhausted")]
    Exhausted,
}

/// A 52-card deck and the community cards dealt from it. Each room owns
/// its own deck and random number generator.
#[derive(Debug)]
pub struct Deck {
    cards: Vec<Card>,
    community: Vec<Card>,
    rng: StdRng,
}

impl Deck {
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// A deck with a reproducible shuffle sequence.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        let mut deck = Self {
            cards: Vec::with_capacity(constants::DECK_SIZE),
            community: Vec::with_capacity(constants::MAX_COMMUNITY_CARDS),
            rng,
        };
        deck.reset();
        deck
    }

    #[must_use]
    pub fn community(&self) -> &[Card] {
        &self.community
    }

    /// Burn a card and put the next 3 on the board.
    pub fn deal_flop(&mut self) -> Result<(), DeckError> {
        self.draw()?;
        for _ in 0..3 {
            let card = self.draw()?;
            self.community.push(card);
        }
        Ok(())
    }

    pub fn deal_hole(&mut self, n: usize) -> Result<Vec<Card>, DeckError> {
        (0..n).map(|_| self.draw()).collect()
    }

    /// Burn a card and put the next one on the board.
    pub fn deal_river(&mut self) -> Result<(), DeckError> {
        self.deal_street()
    }

    pub fn deal_turn(&mut self) -> Result<(), DeckError> {
        self.deal_street()
    }

    fn deal_street(&mut self) -> Result<(), DeckError> {
        self.draw()?;
        let card = self.draw()?;
        self.community.push(card);
        Ok(())
    }

    pub fn draw(&mut self) -> Result<Card, DeckError> {
        self.cards.pop().ok_or(DeckError::Exhausted)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    /// Replace the remaining cards so that they're drawn in the given order.
    #[cfg(test)]
    pub(crate) fn stack(&mut self, cards: &[Card]) {
        self.cards = cards.iter().rev().copied().collect();
    }

    /// Rebuild all 52 cards, clear the board, and shuffle.
    pub fn reset(&mut self) {
        self.cards.clear();
        self.community.clear();
        for value in MIN_VALUE..=ACE {
            for suit in SUITS {
                self.cards.push(Card(value, suit));
            }
        }
        self.cards.shuffle(&mut self.rng);
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

/// Type alias for whole chips. All bets and player stacks are represented
/// as whole chips.
pub type Chips = u64;

/// Room identifiers are small integers that get recycled once a room
/// empties out.
pub type RoomId = u32;

/// Type alias for seat positions at a table.
pub type SeatIndex = usize;

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Username(String);

impl Username {
    /// Trims the name and replaces inner whitespace. Length is checked
    /// on registration.
    pub fn new(s: &str) -> Self {
        let username: String = s
            .trim()
            .chars()
            .map(|c| if c.is_ascii_whitespace() { '_' } else { c })
            .collect();
        Self(username)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_too_long(&self) -> bool {
        self.0.chars().count() > constants::MAX_USERNAME_LENGTH
    }
}

impl Borrow<str> for Username {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'de> Deserialize<'de> for Username {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

impl From<&str> for Username {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Username {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Blinds {
    pub small: Chips,
    pub big: Chips,
}

impl fmt::Display for Blinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = format!("{}/{}", self.small, self.big);
        write!(f, "{repr}")
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub name: Username,
    pub chips: Chips,
}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Borrow<Username> for User {
    fn borrow(&self) -> &Username {
        &self.name
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Action {
    AllIn,
    Bet,
    Call,
    Check,
    Fold,
    Raise,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::AllIn => "all-in",
            Self::Bet => "bet",
            Self::Call => "call",
            Self::Check => "check",
            Self::Fold => "fold",
            Self::Raise => "raise",
        };
        write!(f, "{repr}")
    }
}

impl FromStr for Action {
    type Err = UserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "allin" => Ok(Self::AllIn),
            "bet" => Ok(Self::Bet),
            "call" => Ok(Self::Call),
            "check" => Ok(Self::Check),
            "fold" => Ok(Self::Fold),
            "raise" => Ok(Self::Raise),
            _ => Err(UserError::InvalidAction {
                action: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Stage {
    #[default]
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
}

impl Stage {
    /// Whether a hand is being played and players may act.
    pub fn is_betting(&self) -> bool {
        matches!(self, Self::Preflop | Self::Flop | Self::Turn | Self::River)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Waiting => "WAITING",
            Self::Preflop => "PREFLOP",
            Self::Flop => "FLOP",
            Self::Turn => "TURN",
            Self::River => "RIVER",
            Self::Showdown => "SHOWDOWN",
        };
        write!(f, "{repr}")
    }
}

/// A seated user. The room owns the user's chips while they're seated and
/// their hole cards for the duration of a hand.
#[derive(Clone, Debug)]
pub struct Player {
    pub user: User,
    pub cards: Vec<Card>,
    /// Chips put in during the current betting round only.
    pub current_bet: Chips,
    /// Still holds cards this hand. False once folded.
    pub has_hand: bool,
    /// Can still voluntarily act this hand. False once folded or all-in.
    pub is_active: bool,
}

impl Player {
    #[must_use]
    pub fn new(user: User) -> Self {
        Self {
            user,
            cards: Vec::with_capacity(constants::NUM_HOLE_CARDS),
            current_bet: 0,
            has_hand: false,
            is_active: false,
        }
    }

    /// Whether it can ever be this player's turn again this hand.
    pub fn can_act(&self) -> bool {
        self.has_hand && self.is_active && self.user.chips > 0
    }

    pub fn reset(&mut self) {
        self.cards.clear();
        self.current_bet = 0;
        self.has_hand = false;
        self.is_active = false;
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PlayerView {
    pub seat_idx: SeatIndex,
    pub user: User,
    pub current_bet: Chips,
    pub has_hand: bool,
    pub is_active: bool,
}

/// The public table plus the viewer's own hole cards.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameView {
    pub room_id: RoomId,
    pub blinds: Blinds,
    pub stage: Stage,
    pub pot: Chips,
    pub current_bet: Chips,
    pub button_idx: SeatIndex,
    pub next_action_idx: Option<SeatIndex>,
    pub board: Vec<Card>,
    pub players: Vec<PlayerView>,
    pub hole_cards: Vec<Card>,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RevealedHand {
    pub username: Username,
    pub cards: Vec<Card>,
    pub rank: Rank,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Winner {
    pub username: Username,
    pub rank: Rank,
    pub chips_won: Chips,
    pub total_chips: Chips,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShowdownSummary {
    pub room_id: RoomId,
    pub pot: Chips,
    pub winners: Vec<Winner>,
    pub hands: Vec<RevealedHand>,
    pub board: Vec<Card>,
    pub chip_counts: Vec<User>,
}

/// A lobby listing entry.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GameSummary {
    pub room_id: RoomId,
    pub blinds: Blinds,
    pub num_players: usize,
    pub stage: Stage,
}

impl fmt::Display for GameSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "room {} ({} blinds, {} players, {})",
            self.room_id, self.blinds, self.num_players, self.stage
        )
    }
}
