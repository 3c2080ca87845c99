pub const MAX_PLAYERS: usize = 9;
pub const MAX_USERNAME_LENGTH: usize = 16;
pub const NUM_HOLE_CARDS: usize = 2;
pub const MAX_COMMUNITY_CARDS: usize = 5;
pub const DECK_SIZE: usize = 52;

// Upper bound on a buy-in so that a full table's chips always fit in a pot.
pub const MAX_STARTING_STACK: i64 = 1_000_000_000;
