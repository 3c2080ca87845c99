use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt,
};
use thiserror::Error;

pub mod constants;
pub mod entities;
pub mod functional;

use constants::{MAX_PLAYERS, NUM_HOLE_CARDS};
use entities::{
    Action, Blinds, Card, Chips, Deck, GameSummary, GameView, HandValue, Player, PlayerView,
    RevealedHand, RoomId, SeatIndex, ShowdownSummary, Stage, User, Username, Winner,
};

const DECK_INVARIANT: &str = "a single hand never deals more than 27 of the 52 cards";

#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum UserError {
    #[error("username already seated")]
    AlreadySeated,
    #[error("game already started")]
    AlreadyStarted,
    #[error("bet must be >= {min}")]
    BetTooSmall { min: Chips },
    #[error("call must be for exactly {expected}")]
    CallMismatch { expected: Chips },
    #[error("can't bet with a bet already out, raise instead")]
    CannotBet,
    #[error("can't check when behind the current bet")]
    CannotCheck,
    #[error("username can't be empty")]
    EmptyUsername,
    #[error("game not in progress")]
    GameNotInProgress,
    #[error("not enough chips")]
    InsufficientChips,
    #[error("{action} is not an action")]
    InvalidAction { action: String },
    #[error("blinds must be positive and small < big")]
    InvalidBlinds,
    #[error("starting stack must be positive")]
    InvalidStack,
    #[error("missing parameters")]
    MissingParams,
    #[error("amount can't be negative")]
    NegativeAmount,
    #[error("no bet to raise, bet instead")]
    NoBetToRaise,
    #[error("need 2+ players with chips")]
    NotEnoughPlayers,
    #[error("not in a game")]
    NotInGame,
    #[error("not seated in this game")]
    NotInSession,
    #[error("username not registered")]
    NotRegistered,
    #[error("not your turn")]
    NotYourTurn,
    #[error("nothing to call, check instead")]
    NothingToCall,
    #[error("raise must be to >= {min}")]
    RaiseTooSmall { min: Chips },
    #[error("game is full")]
    RoomFull,
    #[error("game not found")]
    RoomNotFound,
    #[error("game isn't waiting for players")]
    RoomNotWaiting,
    #[error("still seated in a game")]
    StillSeated,
    #[error("username already taken")]
    UsernameTaken,
    #[error("username can't be longer than {max} characters")]
    UsernameTooLong { max: usize },
}

/// How a hand ended. Rooms go back to waiting for players right after.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HandResult {
    /// Everyone else folded or left.
    FoldOut { winner: Username, pot: Chips },
    Showdown(ShowdownSummary),
}

impl fmt::Display for HandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FoldOut { winner, pot } => write!(f, "{winner} won {pot} uncontested"),
            Self::Showdown(summary) => {
                let repr = summary
                    .winners
                    .iter()
                    .map(|winner| {
                        format!(
                            "{} won {} with a {}",
                            winner.username, winner.chips_won, winner.rank
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{repr}")
            }
        }
    }
}

/// Seat indices going clockwise, starting at (and including) `start`.
fn clockwise_from(start: SeatIndex) -> impl Iterator<Item = SeatIndex> {
    (0..MAX_PLAYERS).map(move |offset| (start + offset) % MAX_PLAYERS)
}

/// One table. Seats are a fixed arena so a player's seat index never
/// changes while they're seated.
#[derive(Debug)]
pub struct GameRoom {
    id: RoomId,
    blinds: Blinds,
    seats: Vec<Option<Player>>,
    seats_by_username: HashMap<Username, SeatIndex>,
    pot: Chips,
    current_bet: Chips,
    button_idx: SeatIndex,
    next_action_idx: Option<SeatIndex>,
    stage: Stage,
    acted: HashSet<Username>,
    last_raiser: Option<Username>,
    deck: Deck,
}

impl GameRoom {
    #[must_use]
    pub fn new(id: RoomId, blinds: Blinds) -> Self {
        Self::with_deck(id, blinds, Deck::new())
    }

    /// A room whose shuffles are reproducible.
    #[must_use]
    pub fn with_seed(id: RoomId, blinds: Blinds, seed: u64) -> Self {
        Self::with_deck(id, blinds, Deck::with_seed(seed))
    }

    fn with_deck(id: RoomId, blinds: Blinds, deck: Deck) -> Self {
        Self {
            id,
            blinds,
            seats: vec![None; MAX_PLAYERS],
            seats_by_username: HashMap::with_capacity(MAX_PLAYERS),
            pot: 0,
            current_bet: 0,
            button_idx: 0,
            next_action_idx: None,
            stage: Stage::Waiting,
            acted: HashSet::with_capacity(MAX_PLAYERS),
            last_raiser: None,
            deck,
        }
    }

    /// Apply an action for the player whose turn it is. Returns how the
    /// hand ended if the action ended it. Nothing changes if the action
    /// is rejected.
    pub fn act(
        &mut self,
        username: &str,
        action: &str,
        amount: Option<i64>,
    ) -> Result<Option<HandResult>, UserError> {
        let Some(&seat_idx) = self.seats_by_username.get(username) else {
            return Err(UserError::NotInSession);
        };
        if !self.stage.is_betting() {
            return Err(UserError::GameNotInProgress);
        }
        if self.next_action_idx != Some(seat_idx) {
            return Err(UserError::NotYourTurn);
        }
        let amount = amount.unwrap_or(0);
        if amount < 0 {
            return Err(UserError::NegativeAmount);
        }
        let action: Action = action.parse()?;
        // Anything that doesn't fit in chips is more than anyone has.
        let amount = Chips::try_from(amount).map_err(|_| UserError::InsufficientChips)?;

        self.apply(seat_idx, action, amount)?;
        Ok(self.settle(seat_idx + 1))
    }

    /// Validate and apply an action. Every check happens before any
    /// state changes.
    fn apply(&mut self, seat_idx: SeatIndex, action: Action, amount: Chips) -> Result<(), UserError> {
        let room_bet = self.current_bet;
        let min_bet = self.blinds.big;
        let player = self.seats[seat_idx]
            .as_mut()
            .expect("the turn pointer always points at an occupied seat");
        let chips = player.user.chips;
        let owed = room_bet.saturating_sub(player.current_bet);

        let (cost, raises) = match action {
            Action::Fold => {
                player.has_hand = false;
                player.is_active = false;
                (0, false)
            }
            Action::Check => {
                if owed > 0 {
                    return Err(UserError::CannotCheck);
                }
                (0, false)
            }
            Action::Bet => {
                if room_bet > 0 {
                    return Err(UserError::CannotBet);
                } else if amount < min_bet {
                    return Err(UserError::BetTooSmall { min: min_bet });
                } else if amount > chips {
                    return Err(UserError::InsufficientChips);
                }
                (amount, true)
            }
            Action::Raise => {
                if room_bet == 0 {
                    return Err(UserError::NoBetToRaise);
                }
                let min = room_bet.saturating_mul(2);
                if amount < min {
                    return Err(UserError::RaiseTooSmall { min });
                }
                let cost = amount - player.current_bet;
                if cost > chips {
                    return Err(UserError::InsufficientChips);
                }
                (cost, true)
            }
            Action::Call => {
                if owed == 0 {
                    return Err(UserError::NothingToCall);
                }
                let cost = owed.min(chips);
                if amount != 0 && amount != cost {
                    return Err(UserError::CallMismatch { expected: cost });
                }
                (cost, false)
            }
            Action::AllIn => {
                player.is_active = false;
                (chips, player.current_bet + chips > room_bet)
            }
        };

        player.user.chips -= cost;
        player.current_bet += cost;
        if player.user.chips == 0 {
            player.is_active = false;
        }
        self.pot += cost;
        let name = player.user.name.clone();
        if raises {
            self.current_bet = player.current_bet;
            self.last_raiser = Some(name.clone());
            self.acted.clear();
        }
        self.acted.insert(name);
        Ok(())
    }

    /// Move the hand along after something changed: finish the hand if
    /// it's decided, deal the next street if the betting round is done,
    /// or hand the turn to the next seat (starting the search at
    /// `start`) that can act.
    fn settle(&mut self, start: SeatIndex) -> Option<HandResult> {
        let mut start = start;
        loop {
            if self.players().filter(|player| player.has_hand).count() <= 1 {
                return self.fold_out();
            } else if self.is_ready_for_showdown() {
                loop {
                    if let Some(result) = self.advance_stage() {
                        return Some(result);
                    }
                }
            } else if self.is_betting_round_complete() {
                if let Some(result) = self.advance_stage() {
                    return Some(result);
                }
                start = self.button_idx + 1;
            } else {
                self.next_action_idx = self.next_actor_from(start);
                return None;
            }
        }
    }

    /// Whether nobody can make a meaningful decision anymore, so the rest
    /// of the board can be dealt without any betting.
    fn is_ready_for_showdown(&self) -> bool {
        let actors: Vec<&Player> = self.players().filter(|player| player.can_act()).collect();
        actors.len() <= 1 && actors.iter().all(|player| player.current_bet >= self.current_bet)
    }

    /// Every player still in the hand and able to bet has acted since the
    /// last bet or raise and matched it.
    pub fn is_betting_round_complete(&self) -> bool {
        self.players()
            .filter(|player| player.has_hand && player.is_active)
            .all(|player| {
                player.user.chips == 0
                    || (self.acted.contains(&player.user.name)
                        && player.current_bet == self.current_bet)
            })
    }

    /// Reset the round's bets and deal the next street. Advancing from
    /// the river goes to the showdown instead.
    fn advance_stage(&mut self) -> Option<HandResult> {
        self.current_bet = 0;
        self.acted.clear();
        self.last_raiser = None;
        for player in self.seats.iter_mut().flatten() {
            player.current_bet = 0;
        }

        let dealt = match self.stage {
            Stage::Preflop => {
                self.stage = Stage::Flop;
                self.deck.deal_flop()
            }
            Stage::Flop => {
                self.stage = Stage::Turn;
                self.deck.deal_turn()
            }
            Stage::Turn => {
                self.stage = Stage::River;
                self.deck.deal_river()
            }
            Stage::River => return Some(self.showdown()),
            Stage::Waiting | Stage::Showdown => {
                unreachable!("only a hand in progress can advance")
            }
        };
        dealt.expect(DECK_INVARIANT);
        self.next_action_idx = self.next_actor_from(self.button_idx + 1);
        None
    }

    /// Give the pot to the only player left holding cards.
    fn fold_out(&mut self) -> Option<HandResult> {
        let pot = self.pot;
        let winner = self.seats.iter_mut().flatten().find(|player| player.has_hand);
        let result = winner.map(|player| {
            player.user.chips += pot;
            HandResult::FoldOut {
                winner: player.user.name.clone(),
                pot,
            }
        });
        self.end_hand();
        result
    }

    /// Compare every remaining hand and split the pot between the best.
    /// Odd chips go to the first winner clockwise from the button.
    fn showdown(&mut self) -> HandResult {
        self.stage = Stage::Showdown;
        let board = self.deck.community().to_vec();
        let contenders: Vec<SeatIndex> = clockwise_from(self.button_idx + 1)
            .filter(|&seat_idx| {
                self.seats[seat_idx]
                    .as_ref()
                    .is_some_and(|player| player.has_hand)
            })
            .collect();

        let mut hands = Vec::with_capacity(contenders.len());
        let mut values: Vec<HandValue> = Vec::with_capacity(contenders.len());
        for &seat_idx in &contenders {
            let player = self.seats[seat_idx].as_ref().expect("contenders are seated");
            let mut cards = player.cards.clone();
            cards.extend(board.iter().copied());
            let value = functional::eval(&cards);
            hands.push(RevealedHand {
                username: player.user.name.clone(),
                cards: player.cards.clone(),
                rank: value.rank,
            });
            values.push(value);
        }

        let winning_idxs = functional::argmax(&values);
        let pot = self.pot;
        let num_winners = winning_idxs.len().max(1) as Chips;
        let share = pot / num_winners;
        let remainder = pot % num_winners;
        let mut winners = Vec::with_capacity(winning_idxs.len());
        for (i, &contender_idx) in winning_idxs.iter().enumerate() {
            let chips_won = if i == 0 { share + remainder } else { share };
            let player = self.seats[contenders[contender_idx]]
                .as_mut()
                .expect("contenders are seated");
            player.user.chips += chips_won;
            winners.push(Winner {
                username: player.user.name.clone(),
                rank: values[contender_idx].rank,
                chips_won,
                total_chips: player.user.chips,
            });
        }

        let summary = ShowdownSummary {
            room_id: self.id,
            pot,
            winners,
            hands,
            board,
            chip_counts: self.players().map(|player| player.user.clone()).collect(),
        };
        self.end_hand();
        HandResult::Showdown(summary)
    }

    /// Go back to waiting for players and move the button along.
    fn end_hand(&mut self) {
        for player in self.seats.iter_mut().flatten() {
            player.reset();
        }
        self.deck.reset();
        self.pot = 0;
        self.current_bet = 0;
        self.acted.clear();
        self.last_raiser = None;
        self.next_action_idx = None;
        self.stage = Stage::Waiting;
        if let Some(button_idx) = clockwise_from(self.button_idx + 1)
            .find(|&seat_idx| self.seats[seat_idx].is_some())
        {
            self.button_idx = button_idx;
        }
    }

    /// Start a hand. Only seated players can start one, and at least two
    /// seated players need chips to play with. The hand can end right
    /// away if the blinds put everyone all-in.
    pub fn start(&mut self, initiator: &str) -> Result<Option<HandResult>, UserError> {
        if !self.contains(initiator) {
            return Err(UserError::NotInSession);
        } else if self.stage != Stage::Waiting {
            return Err(UserError::AlreadyStarted);
        } else if self.players().filter(|player| player.user.chips > 0).count() < 2 {
            return Err(UserError::NotEnoughPlayers);
        }

        self.deck.reset();
        self.pot = 0;
        self.current_bet = 0;
        self.acted.clear();
        for player in self.seats.iter_mut().flatten() {
            player.reset();
            if player.user.chips > 0 {
                player.cards = self.deck.deal_hole(NUM_HOLE_CARDS).expect(DECK_INVARIANT);
                player.has_hand = true;
                player.is_active = true;
            }
        }
        self.stage = Stage::Preflop;

        let dealt_in: Vec<SeatIndex> = clockwise_from(self.button_idx)
            .filter(|&seat_idx| {
                self.seats[seat_idx]
                    .as_ref()
                    .is_some_and(|player| player.has_hand)
            })
            .collect();
        self.button_idx = dealt_in[0];

        // Heads-up, the button is the small blind and acts first.
        let (small_idx, big_idx, first_idx) = match dealt_in[..] {
            [button, other] => (button, other, button),
            [_, small, big, first, ..] => (small, big, first),
            [_, small, big] => (small, big, dealt_in[0]),
            _ => unreachable!("at least two players were dealt in"),
        };
        let small = self.post_blind(small_idx, self.blinds.small);
        let big = self.post_blind(big_idx, self.blinds.big);
        self.current_bet = small.max(big);
        self.last_raiser = self.seats[big_idx]
            .as_ref()
            .map(|player| player.user.name.clone());

        Ok(self.settle(first_idx))
    }

    fn post_blind(&mut self, seat_idx: SeatIndex, blind: Chips) -> Chips {
        let player = self.seats[seat_idx]
            .as_mut()
            .expect("blinds are posted by dealt-in players");
        let posted = blind.min(player.user.chips);
        player.user.chips -= posted;
        player.current_bet = posted;
        if player.user.chips == 0 {
            player.is_active = false;
        }
        self.pot += posted;
        posted
    }

    /// Seat a user at the lowest open seat.
    pub fn seat(&mut self, user: User) -> Result<SeatIndex, UserError> {
        if self.seats_by_username.contains_key(&user.name) {
            return Err(UserError::AlreadySeated);
        } else if self.is_full() {
            return Err(UserError::RoomFull);
        } else if self.stage != Stage::Waiting {
            return Err(UserError::RoomNotWaiting);
        }
        let seat_idx = self
            .seats
            .iter()
            .position(Option::is_none)
            .expect("a room that isn't full has an open seat");
        self.seats_by_username.insert(user.name.clone(), seat_idx);
        self.seats[seat_idx] = Some(Player::new(user));
        Ok(seat_idx)
    }

    /// Remove a player at any point. During a hand this is the same as
    /// folding, except the player's chips leave with them; anything
    /// they've already bet stays in the pot.
    pub fn remove(&mut self, username: &str) -> Result<(User, Option<HandResult>), UserError> {
        let seat_idx = self
            .seats_by_username
            .remove(username)
            .ok_or(UserError::NotInGame)?;
        let player = self.seats[seat_idx]
            .take()
            .expect("the seat index only tracks occupied seats");
        self.acted.remove(username);
        if self.last_raiser.as_ref().is_some_and(|raiser| raiser.as_str() == username) {
            self.last_raiser = None;
        }

        let result = if self.stage.is_betting() && player.has_hand {
            if self.next_action_idx == Some(seat_idx) {
                self.settle(seat_idx + 1)
            } else {
                let start = self.next_action_idx.unwrap_or(seat_idx + 1);
                self.settle(start)
            }
        } else {
            None
        };
        Ok((player.user, result))
    }

    fn next_actor_from(&self, start: SeatIndex) -> Option<SeatIndex> {
        clockwise_from(start).find(|&seat_idx| {
            self.seats[seat_idx]
                .as_ref()
                .is_some_and(Player::can_act)
        })
    }

    fn players(&self) -> impl Iterator<Item = &Player> {
        self.seats.iter().flatten()
    }

    #[must_use]
    pub fn blinds(&self) -> Blinds {
        self.blinds
    }

    #[must_use]
    pub fn board(&self) -> &[Card] {
        self.deck.community()
    }

    #[must_use]
    pub fn button_idx(&self) -> SeatIndex {
        self.button_idx
    }

    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.seats_by_username.contains_key(username)
    }

    #[must_use]
    pub fn current_bet(&self) -> Chips {
        self.current_bet
    }

    #[must_use]
    pub fn id(&self) -> RoomId {
        self.id
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seats_by_username.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.seats_by_username.len() == MAX_PLAYERS
    }

    #[must_use]
    pub fn last_raiser(&self) -> Option<&Username> {
        self.last_raiser.as_ref()
    }

    #[must_use]
    pub fn next_action_idx(&self) -> Option<SeatIndex> {
        self.next_action_idx
    }

    #[must_use]
    pub fn num_players(&self) -> usize {
        self.seats_by_username.len()
    }

    #[must_use]
    pub fn player(&self, username: &str) -> Option<&Player> {
        let seat_idx = self.seats_by_username.get(username)?;
        self.seats[*seat_idx].as_ref()
    }

    #[must_use]
    pub fn pot(&self) -> Chips {
        self.pot
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn summary(&self) -> GameSummary {
        GameSummary {
            room_id: self.id,
            blinds: self.blinds,
            num_players: self.num_players(),
            stage: self.stage,
        }
    }

    #[must_use]
    pub fn usernames(&self) -> Vec<Username> {
        self.players().map(|player| player.user.name.clone()).collect()
    }

    /// The public table as seen by `username`, including their own hole
    /// cards and nobody else's.
    #[must_use]
    pub fn view(&self, username: &str) -> GameView {
        let players = self
            .seats
            .iter()
            .enumerate()
            .filter_map(|(seat_idx, seat)| {
                seat.as_ref().map(|player| PlayerView {
                    seat_idx,
                    user: player.user.clone(),
                    current_bet: player.current_bet,
                    has_hand: player.has_hand,
                    is_active: player.is_active,
                })
            })
            .collect();
        GameView {
            room_id: self.id,
            blinds: self.blinds,
            stage: self.stage,
            pot: self.pot,
            current_bet: self.current_bet,
            button_idx: self.button_idx,
            next_action_idx: self.next_action_idx,
            board: self.deck.community().to_vec(),
            players,
            hole_cards: self
                .player(username)
                .map(|player| player.cards.clone())
                .unwrap_or_default(),
        }
    }

    /// A view for every seated player.
    #[must_use]
    pub fn views(&self) -> Vec<(Username, GameView)> {
        self.players()
            .map(|player| (player.user.name.clone(), self.view(player.user.name.as_str())))
            .collect()
    }
}
