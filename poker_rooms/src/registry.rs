use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{
    game::{
        GameRoom, HandResult, UserError,
        constants::{MAX_STARTING_STACK, MAX_USERNAME_LENGTH},
        entities::{Blinds, Chips, GameSummary, GameView, RoomId, Stage, User, Username},
    },
    net::messages::{Command, Delivery, Notification, Reply},
};

/// The result of handling one command: a reply for whoever sent it and
/// notifications for everyone the command affected.
#[derive(Debug)]
pub struct Outcome {
    pub reply: Result<Reply, UserError>,
    pub deliveries: Vec<Delivery>,
}

/// Owns every registered username and every room. Commands are applied
/// one at a time, so each one sees and leaves behind a consistent state.
#[derive(Debug)]
pub struct Registry {
    registered: HashSet<Username>,
    rooms: BTreeMap<RoomId, GameRoom>,
    rooms_by_username: HashMap<Username, RoomId>,
    free_ids: BTreeSet<RoomId>,
    next_id: RoomId,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Notify everyone in a room about how a hand ended (if it did) and
/// then about the table as it is now.
fn room_deliveries(room: &GameRoom, result: Option<HandResult>) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    if let Some(result) = result {
        info!("room {}: {result}", room.id());
        let notification = match result {
            HandResult::FoldOut { winner, pot } => Notification::GameOver {
                room_id: room.id(),
                winner,
                pot,
            },
            HandResult::Showdown(summary) => Notification::Showdown(summary),
        };
        for username in room.usernames() {
            deliveries.push(Delivery {
                to: username,
                notification: notification.clone(),
            });
        }
    }
    for (username, view) in room.views() {
        deliveries.push(Delivery {
            to: username,
            notification: Notification::GameStateUpdate(view),
        });
    }
    deliveries
}

impl Registry {
    pub fn new() -> Self {
        Self {
            registered: HashSet::new(),
            rooms: BTreeMap::new(),
            rooms_by_username: HashMap::new(),
            free_ids: BTreeSet::new(),
            next_id: 1,
        }
    }

    /// Apply a command on behalf of `username`.
    pub fn handle(&mut self, username: &Username, command: Command) -> Outcome {
        let result = match command {
            Command::Register => self.register(username).map(|()| (Reply::Ack, Vec::new())),
            Command::Unregister => self.unregister(username).map(|()| (Reply::Ack, Vec::new())),
            Command::ListGames => Ok((Reply::Games(self.list_games()), Vec::new())),
            Command::CreateGame {
                small_blind,
                big_blind,
            } => self
                .create_game(small_blind, big_blind)
                .map(|room_id| (Reply::GameCreated(room_id), Vec::new())),
            Command::JoinGame {
                room_id,
                starting_stack,
            } => self
                .join_game(username, room_id, starting_stack)
                .map(|num_players| {
                    let deliveries = self
                        .rooms
                        .get(&room_id)
                        .map(|room| room_deliveries(room, None))
                        .unwrap_or_default();
                    (
                        Reply::Joined {
                            room_id,
                            num_players,
                        },
                        deliveries,
                    )
                }),
            Command::ExitGame => self
                .exit_game(username)
                .map(|deliveries| (Reply::Ack, deliveries)),
            Command::StartGame { room_id } => self
                .start_game(username, room_id)
                .map(|(view, deliveries)| (Reply::GameStarted(view), deliveries)),
            Command::PlayTurn {
                room_id,
                action,
                amount,
            } => self
                .play_turn(username, room_id, &action, amount)
                .map(|deliveries| (Reply::Ack, deliveries)),
        };
        match result {
            Ok((reply, deliveries)) => Outcome {
                reply: Ok(reply),
                deliveries,
            },
            Err(error) => Outcome {
                reply: Err(error),
                deliveries: Vec::new(),
            },
        }
    }

    pub fn register(&mut self, username: &Username) -> Result<(), UserError> {
        if username.is_empty() {
            Err(UserError::EmptyUsername)
        } else if username.is_too_long() {
            Err(UserError::UsernameTooLong {
                max: MAX_USERNAME_LENGTH,
            })
        } else if !self.registered.insert(username.clone()) {
            Err(UserError::UsernameTaken)
        } else {
            Ok(())
        }
    }

    pub fn unregister(&mut self, username: &Username) -> Result<(), UserError> {
        if !self.registered.contains(username) {
            Err(UserError::NotRegistered)
        } else if self.rooms_by_username.contains_key(username) {
            Err(UserError::StillSeated)
        } else {
            self.registered.remove(username);
            Ok(())
        }
    }

    /// Create an empty room, reusing the lowest id that's been freed up.
    pub fn create_game(
        &mut self,
        small_blind: Option<i64>,
        big_blind: Option<i64>,
    ) -> Result<RoomId, UserError> {
        let (Some(small), Some(big)) = (small_blind, big_blind) else {
            return Err(UserError::MissingParams);
        };
        if small <= 0 || big <= 0 || small >= big {
            return Err(UserError::InvalidBlinds);
        }
        let blinds = Blinds {
            small: Chips::try_from(small).map_err(|_| UserError::InvalidBlinds)?,
            big: Chips::try_from(big).map_err(|_| UserError::InvalidBlinds)?,
        };

        let room_id = match self.free_ids.pop_first() {
            Some(room_id) => room_id,
            None => {
                let room_id = self.next_id;
                self.next_id += 1;
                room_id
            }
        };
        self.rooms.insert(room_id, GameRoom::new(room_id, blinds));
        info!("room {room_id} created with {blinds} blinds");
        Ok(room_id)
    }

    /// Seat a registered user, returning how many players are seated.
    pub fn join_game(
        &mut self,
        username: &Username,
        room_id: RoomId,
        starting_stack: Option<i64>,
    ) -> Result<usize, UserError> {
        if !self.registered.contains(username) {
            return Err(UserError::NotRegistered);
        } else if self.rooms_by_username.contains_key(username) {
            return Err(UserError::AlreadySeated);
        }
        let room = self.rooms.get_mut(&room_id).ok_or(UserError::RoomNotFound)?;
        if room.is_full() {
            return Err(UserError::RoomFull);
        } else if room.stage() != Stage::Waiting {
            return Err(UserError::RoomNotWaiting);
        }
        let chips = match starting_stack {
            Some(stack) if stack > 0 && stack <= MAX_STARTING_STACK => {
                Chips::try_from(stack).map_err(|_| UserError::InvalidStack)?
            }
            _ => return Err(UserError::InvalidStack),
        };
        room.seat(User {
            name: username.clone(),
            chips,
        })?;
        self.rooms_by_username.insert(username.clone(), room_id);
        Ok(room.num_players())
    }

    /// Leave whatever room the user is seated in, destroying the room if
    /// they were the last one there.
    pub fn exit_game(&mut self, username: &Username) -> Result<Vec<Delivery>, UserError> {
        let room_id = *self
            .rooms_by_username
            .get(username)
            .ok_or(UserError::NotInGame)?;
        // A mapping that doesn't lead to a seat is stale and gets dropped.
        let Some(room) = self.rooms.get_mut(&room_id) else {
            self.rooms_by_username.remove(username);
            warn!("dropped {username}'s mapping to missing room {room_id}");
            return Err(UserError::RoomNotFound);
        };
        let result = match room.remove(username.as_str()) {
            Ok((_, result)) => result,
            Err(error) => {
                self.rooms_by_username.remove(username);
                warn!("dropped {username}'s mapping to room {room_id} without a seat");
                return Err(error);
            }
        };
        self.rooms_by_username.remove(username);
        if room.is_empty() {
            self.rooms.remove(&room_id);
            self.free_ids.insert(room_id);
            info!("room {room_id} destroyed");
            Ok(Vec::new())
        } else {
            Ok(room_deliveries(room, result))
        }
    }

    pub fn list_games(&self) -> Vec<GameSummary> {
        self.rooms.values().map(GameRoom::summary).collect()
    }

    /// Deal a new hand. Every seated player is sent their own view of it.
    pub fn start_game(
        &mut self,
        username: &Username,
        room_id: RoomId,
    ) -> Result<(GameView, Vec<Delivery>), UserError> {
        let room = self.rooms.get_mut(&room_id).ok_or(UserError::RoomNotFound)?;
        let result = room.start(username.as_str())?;
        let mut deliveries: Vec<Delivery> = room
            .views()
            .into_iter()
            .map(|(to, view)| Delivery {
                to,
                notification: Notification::GameStarted(view),
            })
            .collect();
        if result.is_some() {
            deliveries.extend(room_deliveries(room, result));
        }
        Ok((room.view(username.as_str()), deliveries))
    }

    pub fn play_turn(
        &mut self,
        username: &Username,
        room_id: RoomId,
        action: &str,
        amount: Option<i64>,
    ) -> Result<Vec<Delivery>, UserError> {
        if self.rooms_by_username.get(username) != Some(&room_id) {
            return Err(UserError::NotInSession);
        }
        let room = self.rooms.get_mut(&room_id).ok_or(UserError::RoomNotFound)?;
        let result = room.act(username.as_str(), action, amount)?;
        Ok(room_deliveries(room, result))
    }

    /// Clean up after a connection that's gone. Leaving the room counts
    /// as folding so nobody's left waiting on the user.
    pub fn disconnect(&mut self, username: &Username) -> Vec<Delivery> {
        let deliveries = match self.exit_game(username) {
            Ok(deliveries) => {
                warn!("{username} disconnected and was removed from their room");
                deliveries
            }
            Err(_) => Vec::new(),
        };
        self.registered.remove(username);
        deliveries
    }

    pub fn is_registered(&self, username: &str) -> bool {
        self.registered.contains(username)
    }

    pub fn room(&self, room_id: RoomId) -> Option<&GameRoom> {
        self.rooms.get(&room_id)
    }

    pub fn room_of(&self, username: &str) -> Option<RoomId> {
        self.rooms_by_username.get(username).copied()
    }
}
