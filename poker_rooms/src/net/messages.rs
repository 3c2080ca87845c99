use serde::{Deserialize, Serialize};
use std::fmt;

use crate::game::{
    UserError,
    entities::{Chips, GameSummary, GameView, RoomId, ShowdownSummary, Username},
};

#[derive(Debug, Deserialize, Eq, thiserror::Error, PartialEq, Serialize)]
pub enum ClientError {
    #[error("already associated")]
    AlreadyAssociated,
    #[error("does not exist")]
    DoesNotExist,
    #[error("unassociated")]
    Unassociated,
}

/// Everything a client can ask of the server. Numeric fields that
/// clients may leave out or get wrong are signed and optional so they
/// can be rejected with a reason instead of failing to decode.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Command {
    Register,
    Unregister,
    ListGames,
    CreateGame {
        small_blind: Option<i64>,
        big_blind: Option<i64>,
    },
    JoinGame {
        room_id: RoomId,
        starting_stack: Option<i64>,
    },
    ExitGame,
    StartGame {
        room_id: RoomId,
    },
    PlayTurn {
        room_id: RoomId,
        action: String,
        amount: Option<i64>,
    },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => write!(f, "registered"),
            Self::Unregister => write!(f, "unregistered"),
            Self::ListGames => write!(f, "listed games"),
            Self::CreateGame {
                small_blind,
                big_blind,
            } => match (small_blind, big_blind) {
                (Some(small_blind), Some(big_blind)) => {
                    write!(f, "created a game with {small_blind}/{big_blind} blinds")
                }
                _ => write!(f, "created a game"),
            },
            Self::JoinGame { room_id, .. } => write!(f, "joined room {room_id}"),
            Self::ExitGame => write!(f, "left their game"),
            Self::StartGame { room_id } => write!(f, "started room {room_id}"),
            Self::PlayTurn {
                room_id,
                action,
                amount,
            } => match amount {
                Some(amount) => write!(f, "decided to {action} {amount} in room {room_id}"),
                None => write!(f, "decided to {action} in room {room_id}"),
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientMessage {
    pub username: Username,
    pub command: Command,
}

impl fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.username, self.command)
    }
}

/// Successful command results.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Reply {
    Ack,
    GameCreated(RoomId),
    Games(Vec<GameSummary>),
    Joined { room_id: RoomId, num_players: usize },
    /// The initiator's view of the freshly dealt hand.
    GameStarted(GameView),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack => write!(f, "ok"),
            Self::GameCreated(room_id) => write!(f, "created room {room_id}"),
            Self::Games(games) => {
                let repr = games
                    .iter()
                    .map(GameSummary::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
                write!(f, "{repr}")
            }
            Self::Joined {
                room_id,
                num_players,
            } => write!(f, "joined room {room_id} ({num_players} seated)"),
            Self::GameStarted(view) => write!(f, "room {} started", view.room_id),
        }
    }
}

/// Messages pushed to every player seated in a room.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Notification {
    /// A new hand with the recipient's hole cards.
    GameStarted(GameView),
    GameStateUpdate(GameView),
    Showdown(ShowdownSummary),
    /// Everyone but the winner folded.
    GameOver {
        room_id: RoomId,
        winner: Username,
        pot: Chips,
    },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameStarted(view) => write!(f, "room {} dealt a new hand", view.room_id),
            Self::GameStateUpdate(view) => {
                write!(f, "room {} is at {} with {} in the pot", view.room_id, view.stage, view.pot)
            }
            Self::Showdown(summary) => {
                write!(f, "room {} showdown for {}:", summary.room_id, summary.pot)?;
                for winner in &summary.winners {
                    write!(f, " {} won {} with a {}", winner.username, winner.chips_won, winner.rank)?;
                }
                Ok(())
            }
            Self::GameOver {
                room_id,
                winner,
                pot,
            } => write!(f, "room {room_id}: {winner} won {pot} uncontested"),
        }
    }
}

/// A notification addressed to a single user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery {
    pub to: Username,
    pub notification: Notification,
}

#[derive(Debug, Deserialize, Serialize)]
pub enum ServerMessage {
    /// The result of the recipient's own command.
    Reply(Result<Reply, UserError>),
    Notification(Notification),
    ClientError(ClientError),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reply(Ok(reply)) => write!(f, "{reply}"),
            Self::Reply(Err(error)) => write!(f, "{error}"),
            Self::Notification(notification) => write!(f, "{notification}"),
            Self::ClientError(error) => write!(f, "{error}"),
        }
    }
}
