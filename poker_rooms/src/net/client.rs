//! A low-level TCP client.
//!
//! This client is blocking and so is primarily used as a testing utility
//! rather than an actual poker client.

use anyhow::{Error, bail};
use std::{
    collections::VecDeque,
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use crate::game::{
    UserError,
    entities::{GameSummary, GameView, RoomId, Username},
};

use super::{
    messages::{ClientError, ClientMessage, Command, Notification, Reply, ServerMessage},
    utils,
};

pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Client {
    pub username: Username,
    pub stream: TcpStream,
    /// Notifications that arrived while waiting on a reply.
    notifications: VecDeque<Notification>,
}

impl Client {
    /// Open a connection without registering.
    pub fn connect(username: Username, addr: &SocketAddr) -> Result<Self, Error> {
        let mut connect_timeouts = vec![
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_millis(100),
        ];
        while let Some(connect_timeout) = connect_timeouts.pop() {
            match TcpStream::connect_timeout(addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(READ_TIMEOUT))?;
                    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
                    return Ok(Self {
                        username,
                        stream,
                        notifications: VecDeque::new(),
                    });
                }
                _ => thread::sleep(connect_timeout),
            }
        }
        bail!("couldn't connect to {addr} as {username}")
    }

    /// Connect and register the username.
    pub fn register(username: Username, addr: &SocketAddr) -> Result<Self, Error> {
        let mut client = Self::connect(username, addr)?;
        match client.request(Command::Register)? {
            Ok(Reply::Ack) => Ok(client),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    pub fn create_game(&mut self, small_blind: i64, big_blind: i64) -> Result<RoomId, Error> {
        let command = Command::CreateGame {
            small_blind: Some(small_blind),
            big_blind: Some(big_blind),
        };
        match self.request(command)? {
            Ok(Reply::GameCreated(room_id)) => Ok(room_id),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    pub fn exit_game(&mut self) -> Result<(), Error> {
        match self.request(Command::ExitGame)? {
            Ok(Reply::Ack) => Ok(()),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    pub fn join_game(&mut self, room_id: RoomId, starting_stack: i64) -> Result<usize, Error> {
        let command = Command::JoinGame {
            room_id,
            starting_stack: Some(starting_stack),
        };
        match self.request(command)? {
            Ok(Reply::Joined { num_players, .. }) => Ok(num_players),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    pub fn list_games(&mut self) -> Result<Vec<GameSummary>, Error> {
        match self.request(Command::ListGames)? {
            Ok(Reply::Games(games)) => Ok(games),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    /// Take a turn, returning the server's verdict on it.
    pub fn play_turn(
        &mut self,
        room_id: RoomId,
        action: &str,
        amount: Option<i64>,
    ) -> Result<Result<(), UserError>, Error> {
        let command = Command::PlayTurn {
            room_id,
            action: action.to_string(),
            amount,
        };
        match self.request(command)? {
            Ok(Reply::Ack) => Ok(Ok(())),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => Ok(Err(error)),
        }
    }

    pub fn recv(&mut self) -> Result<ServerMessage, Error> {
        match utils::read_prefixed::<ServerMessage, TcpStream>(&mut self.stream) {
            Ok(ServerMessage::ClientError(error)) => bail!(error),
            Ok(msg) => Ok(msg),
            Err(error) => bail!(error),
        }
    }

    pub fn recv_client_error(&mut self) -> Result<ClientError, Error> {
        loop {
            match utils::read_prefixed::<ServerMessage, TcpStream>(&mut self.stream) {
                Ok(ServerMessage::ClientError(error)) => return Ok(error),
                Ok(ServerMessage::Notification(notification)) => {
                    self.notifications.push_back(notification)
                }
                Ok(response) => {
                    bail!("invalid server response: {response}")
                }
                Err(error) => bail!(error),
            }
        }
    }

    /// Get the next notification, including any that were set aside while
    /// waiting on a reply.
    pub fn recv_notification(&mut self) -> Result<Notification, Error> {
        if let Some(notification) = self.notifications.pop_front() {
            return Ok(notification);
        }
        match self.recv()? {
            ServerMessage::Notification(notification) => Ok(notification),
            response => bail!("invalid server response: {response}"),
        }
    }

    /// Wait for the reply to the last command, setting aside any
    /// notifications that arrive first.
    pub fn recv_reply(&mut self) -> Result<Result<Reply, UserError>, Error> {
        loop {
            match self.recv()? {
                ServerMessage::Reply(reply) => return Ok(reply),
                ServerMessage::Notification(notification) => {
                    self.notifications.push_back(notification)
                }
                ServerMessage::ClientError(error) => bail!(error),
            }
        }
    }

    pub fn request(&mut self, command: Command) -> Result<Result<Reply, UserError>, Error> {
        self.send(command)?;
        self.recv_reply()
    }

    pub fn send(&mut self, command: Command) -> Result<(), Error> {
        let msg = ClientMessage {
            username: self.username.clone(),
            command,
        };
        utils::write_prefixed(&mut self.stream, &msg)?;
        Ok(())
    }

    pub fn start_game(&mut self, room_id: RoomId) -> Result<GameView, Error> {
        match self.request(Command::StartGame { room_id })? {
            Ok(Reply::GameStarted(view)) => Ok(view),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }

    pub fn unregister(&mut self) -> Result<(), Error> {
        match self.request(Command::Unregister)? {
            Ok(Reply::Ack) => Ok(()),
            Ok(reply) => bail!("invalid server response: {reply}"),
            Err(error) => bail!(error),
        }
    }
}
