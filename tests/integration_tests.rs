//! Integration tests for the networked protocol
//!
//! These tests run a real server on a loopback UDP socket and drive it with
//! the client library or with hand-built datagrams.

use client::game::ClientGame;
use client::network::{Client, ClientError};
use server::network::Server;
use server::world::World;
use shared::protocol::{EnterRequest, Team};
use shared::{GameTime, GameVars, Packet, PlayerId, ShotSlot, MAX_SHOTS, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

async fn spawn_server(world: Vec<u8>) -> SocketAddr {
    let world = World::from_bytes(world).expect("world fits");
    let mut server = Server::new("127.0.0.1:0", world, 8)
        .await
        .expect("Failed to bind server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    addr
}

/// HANDSHAKE TESTS
mod handshake_tests {
    use super::*;

    /// A well-formed handshake is approved
    #[tokio::test]
    async fn client_handshake_approved() {
        let addr = spawn_server(Vec::new()).await;
        let mut client = Client::new(&addr.to_string()).await.unwrap();

        tokio_test::assert_ok!(
            client
                .connect(&EnterRequest::new(Team::Blue, "approved", "[IT]"))
                .await
        );
        assert!(client.is_connected());

        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    /// A handshake with the wrong protocol version is denied with both versions in the reason
    #[tokio::test]
    async fn wrong_version_denied_with_reason() {
        let addr = spawn_server(Vec::new()).await;
        let mut client = Client::new(&addr.to_string()).await.unwrap();

        let request = EnterRequest {
            protocol_version: PROTOCOL_VERSION + 1,
            ..EnterRequest::new(Team::Red, "stale", "")
        };

        match client.connect(&request).await {
            Err(ClientError::Denied(reason)) => assert_eq!(
                reason,
                format!(
                    "protocol versions do not match: server is {}, you are {}",
                    PROTOCOL_VERSION,
                    PROTOCOL_VERSION + 1
                )
            ),
            other => panic!("expected denial, got {:?}", other.map(|_| ())),
        }
        assert!(!client.is_connected());
    }

    /// World requests from peers that never completed a handshake get no answer
    #[tokio::test]
    async fn unapproved_world_request_ignored() {
        let addr = spawn_server(b"secret".to_vec()).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let request = Packet::unreliable(shared::protocol::encode_world_request());
        socket
            .send_to(&request.encode().unwrap(), addr)
            .await
            .unwrap();

        let mut buffer = [0u8; 2048];
        let reply = timeout(Duration::from_millis(300), socket.recv_from(&mut buffer)).await;
        assert!(reply.is_err(), "server answered an unapproved peer");
    }
}

/// WORLD TRANSFER TESTS
mod world_tests {
    use super::*;

    async fn fetch(world: Vec<u8>) -> Vec<u8> {
        let addr = spawn_server(world).await;
        let mut client = Client::new(&addr.to_string()).await.unwrap();
        client
            .connect(&EnterRequest::new(Team::Green, "fetcher", ""))
            .await
            .unwrap();
        let fetched = client.fetch_world().await.unwrap();
        client.disconnect().await.unwrap();
        fetched
    }

    /// A small world arrives byte for byte
    #[tokio::test]
    async fn ten_byte_world_round_trip() {
        let world: Vec<u8> = (0u8..10).collect();
        assert_eq!(fetch(world.clone()).await, world);
    }

    /// An empty world is a valid world
    #[tokio::test]
    async fn empty_world_round_trip() {
        assert!(fetch(Vec::new()).await.is_empty());
    }

    /// A world spanning many fragments is reassembled intact
    #[tokio::test]
    async fn multi_fragment_world_round_trip() {
        let world: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();
        assert_eq!(fetch(world.clone()).await, world);
    }

    /// Two clients fetch the same world independently
    #[tokio::test]
    async fn concurrent_clients_share_world() {
        let world: Vec<u8> = b"shared arena".to_vec();
        let addr = spawn_server(world.clone()).await;

        let mut handles = Vec::new();
        for callsign in ["alpha", "bravo"] {
            let target = addr.to_string();
            handles.push(tokio::spawn(async move {
                let mut client = Client::new(&target).await.unwrap();
                client
                    .connect(&EnterRequest::new(Team::Purple, callsign, ""))
                    .await
                    .unwrap();
                client.fetch_world().await.unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), world);
        }
    }
}

/// SIMULATION TESTS
mod simulation_tests {
    use super::*;

    /// Firing MAX_SHOTS times fills every slot, the next fire is denied
    /// until a shot finishes its reload
    #[test]
    fn fire_scenario_denies_when_full() {
        let vars = GameVars::default();
        let mut game = ClientGame::new(
            PlayerId(3),
            Team::Rogue,
            ClientGame::walled_arena(400.0),
            vars,
        );

        let slots: Vec<ShotSlot> = (0..MAX_SHOTS).map(|_| game.fire()).collect();
        let expected: Vec<ShotSlot> = (0..MAX_SHOTS).map(ShotSlot::Slot).collect();
        assert_eq!(slots, expected);

        let step = Duration::from_millis(16);
        let mut time = GameTime::default().advance(step);
        game.update(&time);

        assert_eq!(game.fire(), ShotSlot::Dummy);
        assert_eq!(game.shots().len(), MAX_SHOTS as usize);

        while time.total < vars.reload_time + step * 2 {
            time = time.advance(step);
            game.update(&time);
        }
        assert!(game.shots().is_empty());
        assert_eq!(game.fire(), ShotSlot::Slot(0));
    }
}
