use mio::net::TcpListener;

use std::{net::SocketAddr, thread};

use poker_rooms::{
    Client, UserError,
    entities::{Chips, Stage, Username},
    messages::{ClientError, Command, Notification, Reply},
    server::{self, ServerConfig},
};

fn get_random_open_port() -> u16 {
    let addr = "127.0.0.1:0".parse().unwrap();
    // Bind to port 0, which tells the OS to assign an available port
    let listener = TcpListener::bind(addr).unwrap();
    // Get the assigned port
    listener.local_addr().unwrap().port()
}

fn start_server() -> SocketAddr {
    let port = get_random_open_port();
    let addr = format!("127.0.0.1:{port}");
    thread::spawn(move || server::run(&addr, ServerConfig::default()));
    format!("127.0.0.1:{port}").parse().unwrap()
}

/// Read notifications until one matches.
fn wait_for(client: &mut Client, matches: impl Fn(&Notification) -> bool) -> Notification {
    loop {
        let notification = client.recv_notification().unwrap();
        if matches(&notification) {
            return notification;
        }
    }
}

#[test]
fn register_and_create_games() {
    let addr = start_server();
    let mut alice = Client::register(Username::new("alice"), &addr).unwrap();
    assert!(alice.list_games().unwrap().is_empty());

    let command = Command::CreateGame {
        small_blind: Some(10),
        big_blind: Some(5),
    };
    assert_eq!(alice.request(command).unwrap(), Err(UserError::InvalidBlinds));
    let command = Command::CreateGame {
        small_blind: None,
        big_blind: Some(5),
    };
    assert_eq!(alice.request(command).unwrap(), Err(UserError::MissingParams));
    assert_eq!(alice.create_game(10, 20).unwrap(), 1);

    let games = alice.list_games().unwrap();
    assert_eq!(games.len(), 1);
    assert_eq!(games[0].room_id, 1);
    assert_eq!(games[0].num_players, 0);
    assert_eq!(games[0].stage, Stage::Waiting);

    // Usernames are unique across the whole server.
    let mut imposter = Client::connect(Username::new("alice"), &addr).unwrap();
    assert_eq!(
        imposter.request(Command::Register).unwrap(),
        Err(UserError::UsernameTaken)
    );
    let mut verbose = Client::connect(Username::new("alice_the_magnificent"), &addr).unwrap();
    assert_eq!(
        verbose.request(Command::Register).unwrap(),
        Err(UserError::UsernameTooLong { max: 16 })
    );
    let mut nobody = Client::connect(Username::new("  "), &addr).unwrap();
    assert_eq!(
        nobody.request(Command::Register).unwrap(),
        Err(UserError::EmptyUsername)
    );
}

#[test]
fn heads_up_hands_over_tcp() {
    let addr = start_server();
    let mut alice = Client::register(Username::new("alice"), &addr).unwrap();
    let mut bob = Client::register(Username::new("bob"), &addr).unwrap();

    let room_id = alice.create_game(5, 10).unwrap();
    assert_eq!(alice.join_game(room_id, 100).unwrap(), 1);
    assert_eq!(bob.join_game(room_id, 100).unwrap(), 2);
    assert_eq!(
        alice.request(Command::Unregister).unwrap(),
        Err(UserError::StillSeated)
    );

    // The button posts the small blind and acts first.
    let view = alice.start_game(room_id).unwrap();
    assert_eq!(view.stage, Stage::Preflop);
    assert_eq!(view.hole_cards.len(), 2);
    assert_eq!(view.pot, 15);
    assert_eq!(view.current_bet, 10);
    assert_eq!(view.next_action_idx, Some(0));
    let Notification::GameStarted(bob_view) =
        wait_for(&mut bob, |n| matches!(n, Notification::GameStarted(_)))
    else {
        unreachable!()
    };
    assert_eq!(bob_view.hole_cards.len(), 2);
    assert_ne!(bob_view.hole_cards, view.hole_cards);

    assert_eq!(
        bob.play_turn(room_id, "check", None).unwrap(),
        Err(UserError::NotYourTurn)
    );
    assert_eq!(
        alice.play_turn(room_id, "call", Some(-5)).unwrap(),
        Err(UserError::NegativeAmount)
    );
    assert_eq!(
        alice.play_turn(room_id, "limp", None).unwrap(),
        Err(UserError::InvalidAction {
            action: "limp".to_string()
        })
    );
    assert_eq!(alice.play_turn(room_id, "call", None).unwrap(), Ok(()));
    assert_eq!(bob.play_turn(room_id, "check", None).unwrap(), Ok(()));
    let Notification::GameStateUpdate(flop) = wait_for(&mut alice, |n| {
        matches!(n, Notification::GameStateUpdate(view) if view.stage == Stage::Flop)
    }) else {
        unreachable!()
    };
    assert_eq!(flop.board.len(), 3);
    assert_eq!(flop.pot, 20);
    assert_eq!(flop.next_action_idx, Some(1));

    // Check it down.
    for _ in 0..3 {
        assert_eq!(bob.play_turn(room_id, "check", None).unwrap(), Ok(()));
        assert_eq!(alice.play_turn(room_id, "check", None).unwrap(), Ok(()));
    }
    for client in [&mut alice, &mut bob] {
        let Notification::Showdown(summary) =
            wait_for(client, |n| matches!(n, Notification::Showdown(_)))
        else {
            unreachable!()
        };
        assert_eq!(summary.pot, 20);
        assert_eq!(summary.board.len(), 5);
        assert_eq!(summary.hands.len(), 2);
        let chips_won: Chips = summary.winners.iter().map(|winner| winner.chips_won).sum();
        assert_eq!(chips_won, 20);
        let total: Chips = summary.chip_counts.iter().map(|user| user.chips).sum();
        assert_eq!(total, 200);
    }

    // The button moves to bob, who folds the next hand away.
    let view = bob.start_game(room_id).unwrap();
    assert_eq!(view.button_idx, 1);
    assert_eq!(bob.play_turn(room_id, "fold", None).unwrap(), Ok(()));
    for client in [&mut alice, &mut bob] {
        let notification = wait_for(client, |n| matches!(n, Notification::GameOver { .. }));
        assert_eq!(
            notification,
            Notification::GameOver {
                room_id,
                winner: Username::new("alice"),
                pot: 15
            }
        );
    }

    alice.exit_game().unwrap();
    bob.exit_game().unwrap();
    assert!(alice.list_games().unwrap().is_empty());
    alice.unregister().unwrap();
}

#[test]
fn connections_cant_act_for_other_users() {
    let addr = start_server();
    let mut alice = Client::register(Username::new("alice"), &addr).unwrap();
    alice.create_game(1, 2).unwrap();

    let mut mallory = Client::connect(Username::new("alice"), &addr).unwrap();
    mallory.send(Command::ExitGame).unwrap();
    assert_eq!(mallory.recv_client_error().unwrap(), ClientError::Unassociated);

    alice.username = Username::new("bob");
    alice.send(Command::ListGames).unwrap();
    assert_eq!(alice.recv_client_error().unwrap(), ClientError::Unassociated);
}

#[test]
fn disconnecting_mid_hand_folds_and_unregisters() {
    let addr = start_server();
    let mut alice = Client::register(Username::new("alice"), &addr).unwrap();
    let mut bob = Client::register(Username::new("bob"), &addr).unwrap();
    let room_id = alice.create_game(5, 10).unwrap();
    alice.join_game(room_id, 100).unwrap();
    bob.join_game(room_id, 100).unwrap();
    alice.start_game(room_id).unwrap();

    drop(alice);
    let notification = wait_for(&mut bob, |n| matches!(n, Notification::GameOver { .. }));
    assert_eq!(
        notification,
        Notification::GameOver {
            room_id,
            winner: Username::new("bob"),
            pot: 15
        }
    );
    let games = bob.list_games().unwrap();
    assert_eq!(games[0].num_players, 1);
    assert_eq!(games[0].stage, Stage::Waiting);

    // The username is free again.
    let mut alice = Client::register(Username::new("alice"), &addr).unwrap();
    assert_eq!(
        alice.request(Command::ExitGame).unwrap(),
        Err(UserError::NotInGame)
    );
}

#[test]
fn concurrent_clients_get_distinct_rooms() {
    let addr = start_server();
    let workers: Vec<_> = (0..8)
        .map(|i| {
            thread::spawn(move || {
                let username = Username::new(&format!("user{i}"));
                let mut client = Client::register(username, &addr).unwrap();
                let room_id = client.create_game(1, 2).unwrap();
                assert_eq!(client.join_game(room_id, 50).unwrap(), 1);
                (client, room_id)
            })
        })
        .collect();
    let mut clients: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .collect();
    let mut room_ids: Vec<_> = clients.iter().map(|(_, room_id)| *room_id).collect();
    room_ids.sort_unstable();
    assert_eq!(room_ids, (1..=8).collect::<Vec<_>>());

    let games = clients[0].0.list_games().unwrap();
    assert_eq!(games.len(), 8);
    assert!(games.iter().all(|game| game.num_players == 1));

    // Emptied rooms are destroyed and their ids reused.
    let (mut client, room_id) = clients.swap_remove(2);
    client.exit_game().unwrap();
    let (client, _) = &mut clients[0];
    assert_eq!(client.list_games().unwrap().len(), 7);
    let command = Command::CreateGame {
        small_blind: Some(1),
        big_blind: Some(2),
    };
    assert_eq!(
        client.request(command).unwrap(),
        Ok(Reply::GameCreated(room_id))
    );
}
