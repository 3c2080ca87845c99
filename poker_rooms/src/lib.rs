pub mod net;
pub use net::{client::Client, messages, server, utils};

pub mod game;
pub use game::{
    GameRoom, HandResult, UserError,
    constants::{self, MAX_PLAYERS},
    entities, functional,
};

pub mod registry;
pub use registry::{Outcome, Registry};
