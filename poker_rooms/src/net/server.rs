use anyhow::{Error, bail};
use log::{debug, error, info, warn};
use mio::{
    Events, Interest, Poll, Token, Waker,
    net::{TcpListener, TcpStream},
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    io,
    sync::mpsc::{Receiver, Sender, channel},
    thread,
    time::Duration,
};

use crate::{game::entities::Username, registry::Registry};

use super::{
    messages::{ClientError, ClientMessage, Command, Delivery, Reply, ServerMessage},
    utils::{read_prefixed, write_prefixed},
};

pub const DEFAULT_MAX_CONNECTIONS: usize = 256;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_NETWORK_EVENTS_PER_USER: usize = 6;
pub const SERVER: Token = Token(0);
pub const WAKER: Token = Token(1);

/// Messages from the IO thread to the game thread.
#[derive(Debug)]
enum ClientData {
    /// A client command that passed the connection checks.
    Command {
        token: Token,
        generation: u64,
        msg: ClientMessage,
    },
    /// A registered user's connection is gone.
    Disconnect(Username),
}

/// Messages from the game thread to the IO thread. These are never sent
/// to clients directly, but fields within them are.
#[derive(Debug)]
enum ServerData {
    /// The result of a command, for the connection that sent it.
    Reply {
        token: Token,
        generation: u64,
        msg: ClientMessage,
        reply: Box<ServerMessage>,
    },
    /// A notification for whichever connection a user is on.
    Delivery(Delivery),
}

fn token_to_string(token: &Token) -> String {
    let id = token.0;
    format!("token({id})")
}

pub struct ServerConfig {
    /// Connections beyond this are closed as soon as they're accepted.
    pub max_connections: usize,
    pub poll_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// This manager enables a few mechanisms:
///
/// - Helps keep tokens bounded, recycling unused tokens for future
///   connections. Each connection also gets a generation that's never
///   reused, telling apart connections that held the same token.
/// - Associates tokens with the username registered over them, making it
///   easier to route replies and notifications to clients.
/// - Keeps connections from acting on behalf of usernames that were
///   registered over other connections.
struct TokenManager {
    generations: BTreeMap<Token, u64>,
    next_generation: u64,
    recycled_tokens: BTreeSet<Token>,
    streams: BTreeMap<Token, TcpStream>,
    tokens_to_usernames: BTreeMap<Token, Username>,
    usernames_to_tokens: HashMap<Username, Token>,
}

impl TokenManager {
    /// Associate a token with a TCP stream. Since tokens are usually registered
    /// with a poll, the typical workflow is:
    ///
    /// 1. Create a new token.
    /// 2. Register the token and stream with the poll.
    /// 3. Associate the token and stream with the token manager.
    ///
    /// This transfers ownership of the stream to the token manager, allowing
    /// deallocation of the stream whenever the token is recycled. Returns
    /// the connection's generation.
    pub fn associate_token_and_stream(&mut self, token: Token, stream: TcpStream) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.generations.insert(token, generation);
        self.streams.insert(token, stream);
        generation
    }

    /// Check whether a connection may send a message. A connection can
    /// register once, and after that it can only act as that username.
    /// Connections that haven't registered can't act as a username that
    /// another connection registered.
    pub fn check_message(&self, token: &Token, msg: &ClientMessage) -> Result<(), ClientError> {
        match (
            self.tokens_to_usernames.get(token),
            self.usernames_to_tokens.get(&msg.username),
        ) {
            (Some(_), _) if msg.command == Command::Register => Err(ClientError::AlreadyAssociated),
            (Some(username), _) if *username != msg.username => Err(ClientError::Unassociated),
            (None, Some(_)) if msg.command != Command::Register => Err(ClientError::Unassociated),
            _ => Ok(()),
        }
    }

    /// Confirm a token's username. This should be called once the
    /// registry accepts the registration, with the generation of the
    /// connection that asked for it.
    pub fn confirm_username(
        &mut self,
        token: Token,
        generation: u64,
        username: Username,
    ) -> Result<(), ClientError> {
        if !self.is_connected(&token, generation) {
            Err(ClientError::DoesNotExist)
        } else if self.tokens_to_usernames.contains_key(&token)
            || self.usernames_to_tokens.contains_key(&username)
        {
            Err(ClientError::AlreadyAssociated)
        } else {
            self.tokens_to_usernames.insert(token, username.clone());
            self.usernames_to_tokens.insert(username, token);
            Ok(())
        }
    }

    pub fn get_generation_with_token(&self, token: &Token) -> Result<u64, ClientError> {
        self.generations
            .get(token)
            .copied()
            .ok_or(ClientError::DoesNotExist)
    }

    pub fn get_confirmed_username_with_token(&self, token: &Token) -> Result<Username, ClientError> {
        self.tokens_to_usernames
            .get(token)
            .cloned()
            .ok_or(ClientError::Unassociated)
    }

    pub fn get_mut_stream_with_token(&mut self, token: &Token) -> Result<&mut TcpStream, ClientError> {
        self.streams.get_mut(token).ok_or(ClientError::DoesNotExist)
    }

    pub fn get_token_with_username(&self, username: &str) -> Result<Token, ClientError> {
        self.usernames_to_tokens
            .get(username)
            .copied()
            .ok_or(ClientError::Unassociated)
    }

    /// Whether the connection from `generation` still holds the token.
    pub fn is_connected(&self, token: &Token, generation: u64) -> bool {
        self.generations.get(token) == Some(&generation)
    }

    pub fn new() -> Self {
        Self {
            generations: BTreeMap::new(),
            next_generation: 0,
            recycled_tokens: BTreeSet::new(),
            streams: BTreeMap::new(),
            tokens_to_usernames: BTreeMap::new(),
            usernames_to_tokens: HashMap::new(),
        }
    }

    /// Create a new token.
    pub fn new_token(&mut self) -> Token {
        match self.recycled_tokens.pop_first() {
            Some(token) => token,
            None => {
                let newest = match self.streams.last_key_value() {
                    Some((token, _)) => token,
                    None => &WAKER,
                };
                Token(newest.0 + 1)
            }
        }
    }

    pub fn num_connections(&self) -> usize {
        self.streams.len()
    }

    /// Forget a token's username. Should be used when a user unregisters
    /// but stays connected.
    pub fn release_username(&mut self, token: &Token) -> Result<Username, ClientError> {
        let username = self
            .tokens_to_usernames
            .remove(token)
            .ok_or(ClientError::Unassociated)?;
        self.usernames_to_tokens.remove(&username);
        Ok(username)
    }

    /// Manually recycle an individual token. Should be used when a client is
    /// dropped or misbehaving.
    pub fn recycle_token(&mut self, token: Token) -> Result<TcpStream, ClientError> {
        if let Some(username) = self.tokens_to_usernames.remove(&token) {
            self.usernames_to_tokens.remove(&username);
        }
        let stream = self.streams.remove(&token).ok_or(ClientError::DoesNotExist)?;
        self.generations.remove(&token);
        self.recycled_tokens.insert(token);
        Ok(stream)
    }
}

/// Run the server in two separate threads. The parent thread owns the
/// registry and every room while the child thread manages non-blocking
/// networking IO. Commands are applied one at a time in the order they
/// arrive.
pub fn run(addr: &str, config: ServerConfig) -> Result<(), Error> {
    let addr = addr.parse()?;
    let max_network_events = MAX_NETWORK_EVENTS_PER_USER * config.max_connections;

    let (tx_client, rx_client): (Sender<ClientData>, Receiver<ClientData>) = channel();
    let (tx_server, rx_server): (Sender<ServerData>, Receiver<ServerData>) = channel();

    let mut poll = Poll::new()?;
    let waker = Waker::new(poll.registry(), WAKER)?;

    // This thread is where the actual networking happens for non-blocking IO.
    // A server is bound to the address and manages connections to clients.
    // Messages from the main thread are queued for each client connection.
    thread::spawn(move || -> Result<(), Error> {
        let mut events = Events::with_capacity(max_network_events);
        let mut messages_to_process: HashMap<Token, VecDeque<ClientMessage>> = HashMap::new();
        let mut messages_to_write: HashMap<Token, VecDeque<ServerMessage>> = HashMap::new();
        let mut server = TcpListener::bind(addr)?;
        let mut token_manager = TokenManager::new();
        let mut tokens_to_remove: HashSet<Token> = HashSet::new();
        let mut tokens_to_reregister: HashSet<Token> = HashSet::new();
        poll.registry()
            .register(&mut server, SERVER, Interest::READABLE)?;
        info!("listening on {addr}");

        loop {
            if let Err(error) = poll.poll(&mut events, Some(config.poll_timeout)) {
                match error.kind() {
                    io::ErrorKind::Interrupted => continue,
                    _ => bail!(error),
                }
            }

            for event in events.iter() {
                match event.token() {
                    SERVER => loop {
                        // Received an event for the TCP server socket, which
                        // indicates we can accept a connection.
                        let mut stream = match server.accept() {
                            Ok((stream, _)) => stream,
                            Err(error) => {
                                match error.kind() {
                                    // If we get a `WouldBlock` error we know our
                                    // listener has no more incoming connections queued,
                                    // so we can return to polling and wait for some
                                    // more.
                                    io::ErrorKind::WouldBlock => break,
                                    // If it was any other kind of error, something went
                                    // wrong and we should terminate.
                                    _ => bail!(error),
                                }
                            }
                        };

                        // Dropping the stream closes the connection.
                        if token_manager.num_connections() >= config.max_connections {
                            warn!("at capacity, refusing a connection");
                            continue;
                        }

                        let token = token_manager.new_token();
                        poll.registry()
                            .register(&mut stream, token, Interest::READABLE)?;
                        let generation = token_manager.associate_token_and_stream(token, stream);
                        let repr = token_to_string(&token);
                        debug!("accepted new connection {generation} with {repr}");
                    },
                    WAKER => {
                        // Drain server messages received from the parent thread so
                        // they can be relayed to the respective clients.
                        while let Ok(data) = rx_server.try_recv() {
                            match data {
                                // Replies go back to the connection that sent the command.
                                // Successful registrations tie the connection to the
                                // username and unregistrations untie them.
                                ServerData::Reply {
                                    token,
                                    generation,
                                    msg,
                                    reply,
                                } => {
                                    let is_connected = token_manager.is_connected(&token, generation);
                                    if let ServerMessage::Reply(Ok(Reply::Ack)) = *reply {
                                        match msg.command {
                                            Command::Register => {
                                                // The client disconnected before its registration went
                                                // through. The game thread still has to forget them.
                                                if token_manager
                                                    .confirm_username(
                                                        token,
                                                        generation,
                                                        msg.username.clone(),
                                                    )
                                                    .is_err()
                                                {
                                                    tx_client.send(ClientData::Disconnect(msg.username))?;
                                                    continue;
                                                }
                                            }
                                            Command::Unregister if is_connected => {
                                                token_manager.release_username(&token).ok();
                                            }
                                            _ => {}
                                        }
                                    }
                                    if is_connected {
                                        messages_to_write.entry(token).or_default().push_back(*reply);
                                        tokens_to_reregister.insert(token);
                                    }
                                }
                                // Notifications can be safely dropped if their recipient
                                // is no longer connected.
                                ServerData::Delivery(Delivery { to, notification }) => {
                                    if let Ok(token) =
                                        token_manager.get_token_with_username(to.as_str())
                                    {
                                        let msg = ServerMessage::Notification(notification);
                                        messages_to_write.entry(token).or_default().push_back(msg);
                                        tokens_to_reregister.insert(token);
                                    }
                                }
                            }
                        }
                        for token in tokens_to_reregister.drain() {
                            if let Ok(stream) = token_manager.get_mut_stream_with_token(&token) {
                                poll.registry().reregister(
                                    stream,
                                    token,
                                    Interest::READABLE | Interest::WRITABLE,
                                )?;
                            }
                        }
                    }
                    // Only care about events associated with clients that are
                    // still valid.
                    token if !tokens_to_remove.contains(&token) => {
                        // Maybe received an event for a TCP connection.
                        if let Ok(stream) = token_manager.get_mut_stream_with_token(&token) {
                            if event.is_writable() {
                                if let Some(messages) = messages_to_write.get_mut(&token) {
                                    // Need to handle the case where there's an unresponsive or
                                    // misbehaving client that doesn't let us write messages to
                                    // them. If their message queue reaches a certain size, queue
                                    // them for removal.
                                    if messages.len() >= max_network_events {
                                        let repr = token_to_string(&token);
                                        error!(
                                            "{repr} has not been receiving and will be removed."
                                        );
                                        tokens_to_remove.insert(token);
                                        continue;
                                    }
                                    while let Some(msg) = messages.pop_front() {
                                        match write_prefixed::<ServerMessage, TcpStream>(
                                            stream, &msg,
                                        ) {
                                            Ok(_) => {
                                                // Client errors are strict and result in the removal of a connection.
                                                if let ServerMessage::ClientError(_) = msg {
                                                    let repr = token_to_string(&token);
                                                    debug!("{repr}: {msg}");
                                                    tokens_to_remove.insert(token);
                                                    break;
                                                }
                                            }
                                            Err(error) => {
                                                match error.kind() {
                                                    // `write_prefixed` uses `write_all` under the hood, so we know
                                                    // that if any of these occur, then the connection was probably
                                                    // dropped at some point.
                                                    io::ErrorKind::BrokenPipe
                                                    | io::ErrorKind::ConnectionAborted
                                                    | io::ErrorKind::ConnectionReset
                                                    | io::ErrorKind::TimedOut
                                                    | io::ErrorKind::UnexpectedEof => {
                                                        let repr = token_to_string(&token);
                                                        debug!("{repr} connection dropped");
                                                        tokens_to_remove.insert(token);
                                                    }
                                                    // Would block "errors" are the OS's way of saying that the
                                                    // connection is not actually ready to perform this I/O operation.
                                                    io::ErrorKind::WouldBlock => {
                                                        // The message couldn't be sent, so we need to push it back
                                                        // onto the queue so we don't accidentally forget about it.
                                                        messages.push_front(msg);
                                                    }
                                                    // Retry writing in the case that the full message couldn't
                                                    // be written. This should be infrequent.
                                                    io::ErrorKind::WriteZero => {
                                                        let repr = token_to_string(&token);
                                                        debug!("{repr} got a zero write, but will retry");
                                                        messages.push_front(msg);
                                                        continue;
                                                    }
                                                    // A message too big to frame is a bug on our end,
                                                    // but it only affects this one client.
                                                    io::ErrorKind::InvalidData => {
                                                        let repr = token_to_string(&token);
                                                        error!("{repr} was sent an unframeable message");
                                                        tokens_to_remove.insert(token);
                                                    }
                                                    // Other errors we'll consider fatal.
                                                    _ => bail!(error),
                                                }
                                                poll.registry().reregister(
                                                    stream,
                                                    token,
                                                    Interest::READABLE,
                                                )?;
                                                break;
                                            }
                                        }
                                    }
                                }
                            }

                            if event.is_readable() {
                                // We can (maybe) read from the connection.
                                loop {
                                    match read_prefixed::<ClientMessage, TcpStream>(stream) {
                                        Ok(msg) => {
                                            let messages =
                                                messages_to_process.entry(token).or_default();
                                            messages.push_back(msg);
                                            if messages.len() >= MAX_NETWORK_EVENTS_PER_USER {
                                                let repr = token_to_string(&token);
                                                error!(
                                                    "{repr} has been spamming and will be removed."
                                                );
                                                tokens_to_remove.insert(token);
                                                break;
                                            }
                                        }
                                        Err(error) => {
                                            match error.kind() {
                                                // `read_prefixed` uses `read_exact` under the hood, so we know
                                                // that an Eof error means the connection was dropped.
                                                io::ErrorKind::BrokenPipe
                                                | io::ErrorKind::ConnectionAborted
                                                | io::ErrorKind::ConnectionReset
                                                | io::ErrorKind::InvalidData
                                                | io::ErrorKind::TimedOut
                                                | io::ErrorKind::UnexpectedEof => {
                                                    let repr = token_to_string(&token);
                                                    debug!("{repr}'s connection dropped");
                                                    tokens_to_remove.insert(token);
                                                }
                                                // Would block "errors" are the OS's way of saying that the
                                                // connection is not actually ready to perform this I/O operation.
                                                io::ErrorKind::WouldBlock => {}
                                                // Other errors we'll consider fatal.
                                                _ => {
                                                    bail!(error)
                                                }
                                            }
                                            break;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    // The client is already queued for removal and so this event
                    // will be ignored.
                    _ => {}
                }
            }

            // Process all the messages received from the clients.
            for (token, msgs) in messages_to_process
                .drain()
                .filter(|(t, _)| !tokens_to_remove.contains(t))
            {
                let Ok(generation) = token_manager.get_generation_with_token(&token) else {
                    continue;
                };
                for msg in msgs {
                    let repr = token_to_string(&token);
                    match token_manager.check_message(&token, &msg) {
                        Ok(()) => {
                            debug!("{repr}: {msg}");
                            tx_client.send(ClientData::Command {
                                token,
                                generation,
                                msg,
                            })?;
                        }
                        Err(error) => {
                            debug!("{repr}: {error}");
                            let msg = ServerMessage::ClientError(error);
                            messages_to_write.entry(token).or_default().push_back(msg);
                            tokens_to_reregister.insert(token);
                        }
                    }
                }
            }
            for token in tokens_to_reregister.drain() {
                if let Ok(stream) = token_manager.get_mut_stream_with_token(&token) {
                    poll.registry().reregister(
                        stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    )?;
                }
            }

            // Recycle all tokens that need to be removed, deregistering their streams
            // with the poll. Registered users are cleaned up by the game thread.
            for token in tokens_to_remove.drain() {
                let repr = token_to_string(&token);
                debug!("{repr} is being removed");
                if let Ok(username) = token_manager.get_confirmed_username_with_token(&token) {
                    tx_client.send(ClientData::Disconnect(username))?;
                }
                messages_to_write.remove(&token);
                if let Ok(mut stream) = token_manager.recycle_token(token) {
                    poll.registry().deregister(&mut stream)?;
                }
            }
        }
    });

    let mut registry = Registry::new();
    loop {
        // Blocks until the IO thread has something. There are no turn
        // timeouts, so an idle table just waits.
        let data = rx_client.recv()?;
        let deliveries = match data {
            ClientData::Command {
                token,
                generation,
                msg,
            } => {
                let outcome = registry.handle(&msg.username, msg.command.clone());
                match &outcome.reply {
                    Ok(_) => info!("{msg}"),
                    Err(error) => error!("{error}: {msg}"),
                }
                let reply = Box::new(ServerMessage::Reply(outcome.reply));
                tx_server.send(ServerData::Reply {
                    token,
                    generation,
                    msg,
                    reply,
                })?;
                outcome.deliveries
            }
            ClientData::Disconnect(username) => {
                info!("{username} disconnected");
                registry.disconnect(&username)
            }
        };
        for delivery in deliveries {
            tx_server.send(ServerData::Delivery(delivery))?;
        }
        waker.wake()?;
    }
}
