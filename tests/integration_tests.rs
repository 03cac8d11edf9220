//! Integration tests for the match server over real TCP connections
//!
//! Each test starts a server on an ephemeral loopback port and drives it with
//! line-protocol clients, checking what every client actually receives.

use assert_approx_eq::assert_approx_eq;
use server::config::{DispatchMode, ServerConfig};
use server::game::Match;
use server::network::Server;
use server::player::Activity;
use shared::{Envelope, JoinResult, Scores};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const READ_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

fn loopback(dispatch: DispatchMode) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        dispatch,
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> (SocketAddr, Arc<Match>) {
    let game = Arc::new(Match::new(config.match_settings()));
    game.start();
    let server = Server::bind(&config, Arc::clone(&game))
        .await
        .expect("failed to bind test server");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, game)
}

fn scores(entries: &[(&str, i32)]) -> Scores {
    entries
        .iter()
        .map(|(name, kills)| (name.to_string(), *kills))
        .collect()
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        let framed = format!("{}\n", line);
        tokio_test::assert_ok!(self.writer.write_all(framed.as_bytes()).await);
    }

    async fn recv(&mut self) -> Envelope {
        let mut line = String::new();
        let read = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for server message")
            .unwrap();
        assert!(read > 0, "connection closed while waiting for a message");
        Envelope::from_slice(line.as_bytes()).unwrap()
    }

    async fn recv_n(&mut self, count: usize) -> Vec<Envelope> {
        let mut envelopes = Vec::with_capacity(count);
        for _ in 0..count {
            envelopes.push(self.recv().await);
        }
        envelopes
    }

    /// Joins and returns the (identity, name) the server assigned.
    async fn join(&mut self, name: &str) -> (String, String) {
        self.send_raw(&format!(r#"{{"type":8,"name":"{}"}}"#, name))
            .await;
        let replies = self.recv_n(3).await;
        assert!(matches!(replies[0], Envelope::Broadcast { .. }));
        assert!(matches!(replies[1], Envelope::Scoreboard { .. }));
        match &replies[2] {
            Envelope::Join {
                name,
                identity: Some(identity),
                result: Some(JoinResult::Success),
            } => (identity.clone(), name.clone()),
            other => panic!("expected a successful JOIN reply, got {:?}", other),
        }
    }

    async fn assert_quiet(&mut self) {
        let mut line = String::new();
        let result = timeout(QUIET_PERIOD, self.reader.read_line(&mut line)).await;
        assert!(result.is_err(), "unexpected message: {}", line);
    }

    async fn assert_closed(&mut self) {
        let mut rest = Vec::new();
        let read = timeout(READ_TIMEOUT, self.reader.read_to_end(&mut rest))
            .await
            .expect("connection was not closed")
            .unwrap();
        assert_eq!(read, 0, "unexpected trailing data before close");
    }
}

/// JOIN / HIT / KILL FLOW TESTS
mod match_flow_tests {
    use super::*;

    /// Two players with the same name, one hit for half health, one lethal hit
    #[tokio::test]
    async fn duplicate_name_hit_and_kill() {
        let (addr, game) = start_server(loopback(DispatchMode::Ordered)).await;
        let mut alice = TestClient::connect(addr).await;
        let mut second = TestClient::connect(addr).await;

        let (_, alice_name) = alice.join("Alice").await;
        assert_eq!(alice_name, "Alice");

        let (second_id, second_name) = second.join("Alice").await;
        assert_ne!(second_name, "Alice");
        assert!(second_name.starts_with("Alice"));
        assert_eq!(
            alice.recv_n(2).await,
            vec![
                Envelope::broadcast(format!("Player {} joined", second_name)),
                Envelope::scoreboard(scores(&[("Alice", 0), (second_name.as_str(), 0)])),
            ]
        );

        let hit = format!(r#"{{"type":7,"hit_player":"{}","damage":50}}"#, second_name);
        alice.send_raw(&hit).await;
        assert_eq!(
            second.recv().await,
            Envelope::client("remaining health 50.00")
        );

        alice.send_raw(&hit).await;
        let kill_text = format!("Alice killed {}", second_name);
        let board = scores(&[("Alice", 1), (second_name.as_str(), 0)]);
        assert_eq!(
            second.recv_n(4).await,
            vec![
                Envelope::client("remaining health 0.00"),
                Envelope::kill("Alice"),
                Envelope::broadcast(kill_text.clone()),
                Envelope::scoreboard(board.clone()),
            ]
        );
        assert_eq!(
            alice.recv_n(2).await,
            vec![Envelope::broadcast(kill_text), Envelope::scoreboard(board)]
        );

        let roster = game.roster();
        let victim = roster.lookup(Some(second_name.as_str()), None).unwrap();
        assert_eq!(victim.to_string(), second_id);
        assert_eq!(roster.deaths(victim), 1);
        assert_approx_eq!(roster.health(victim).unwrap(), 100.0);
        assert_eq!(roster.activity(victim), Some(Activity::Idle));
    }

    /// A full match answers the joiner with a failure and tells nobody else
    #[tokio::test]
    async fn join_rejected_when_full() {
        let config = ServerConfig {
            max_players: 1,
            ..loopback(DispatchMode::Ordered)
        };
        let (addr, game) = start_server(config).await;
        let mut alice = TestClient::connect(addr).await;
        let mut bob = TestClient::connect(addr).await;
        alice.join("Alice").await;

        bob.send_raw(r#"{"type":8,"name":"Bob"}"#).await;

        assert_eq!(bob.recv().await, Envelope::join_failure());
        alice.assert_quiet().await;
        assert_eq!(game.roster().count(), 1);
    }

    /// Scoreboard requests and pings are answered on the requesting connection
    #[tokio::test]
    async fn scoreboard_and_ping() {
        let (addr, _game) = start_server(loopback(DispatchMode::Concurrent)).await;
        let mut alice = TestClient::connect(addr).await;
        alice.join("Alice").await;

        alice.send_raw(r#"{"type":3,"nonce":"n-7"}"#).await;
        assert_eq!(
            alice.recv().await,
            Envelope::Ping {
                nonce: Some("n-7".to_string())
            }
        );

        alice.send_raw(r#"{"type":10}"#).await;
        assert_eq!(
            alice.recv().await,
            Envelope::scoreboard(scores(&[("Alice", 0)]))
        );
    }
}

/// AUTHENTICATION AND MALFORMED INPUT TESTS
mod gate_tests {
    use super::*;

    /// Messages from a connection without a registered player go nowhere
    #[tokio::test]
    async fn unauthenticated_messages_are_dropped() {
        let (addr, game) = start_server(loopback(DispatchMode::Ordered)).await;
        let mut alice = TestClient::connect(addr).await;
        let mut stranger = TestClient::connect(addr).await;
        alice.join("Alice").await;

        stranger
            .send_raw(r#"{"type":7,"hit_player":"Alice","damage":50}"#)
            .await;
        stranger.send_raw(r#"{"type":10}"#).await;
        stranger.send_raw(r#"{"type":9,"name":"Alice"}"#).await;

        stranger.assert_quiet().await;
        alice.assert_quiet().await;
        let alice_id = game.roster().lookup(Some("Alice"), None).unwrap();
        assert_approx_eq!(game.roster().health(alice_id).unwrap(), 100.0);
        assert_eq!(game.roster().count(), 1);
    }

    /// A bad line is dropped and the connection keeps working
    #[tokio::test]
    async fn malformed_lines_are_ignored() {
        let (addr, _game) = start_server(loopback(DispatchMode::Ordered)).await;
        let mut client = TestClient::connect(addr).await;

        client.send_raw("this is not json").await;
        client.send_raw(r#"{"type":99}"#).await;
        client.send_raw("").await;
        client.assert_quiet().await;

        let (_, name) = client.join("Carol").await;
        assert_eq!(name, "Carol");
    }
}

/// CONNECTION LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// LEAVE closes the leaver's connection and notifies the others
    #[tokio::test]
    async fn leave_closes_connection() {
        let (addr, game) = start_server(loopback(DispatchMode::Ordered)).await;
        let mut alice = TestClient::connect(addr).await;
        let mut bob = TestClient::connect(addr).await;
        alice.join("Alice").await;
        bob.join("Bob").await;
        alice.recv_n(2).await;

        bob.send_raw(r#"{"type":9}"#).await;

        bob.assert_closed().await;
        assert_eq!(
            alice.recv_n(3).await,
            vec![
                Envelope::broadcast("Player Bob left"),
                Envelope::leave("Bob"),
                Envelope::scoreboard(scores(&[("Alice", 0)])),
            ]
        );
        assert_eq!(game.roster().count(), 1);
    }

    /// By default a dropped connection leaves its player registered
    #[tokio::test]
    async fn dropped_connection_is_kept() {
        let (addr, game) = start_server(loopback(DispatchMode::Ordered)).await;
        let mut alice = TestClient::connect(addr).await;
        let mut bob = TestClient::connect(addr).await;
        alice.join("Alice").await;
        bob.join("Bob").await;
        alice.recv_n(2).await;

        drop(bob);
        sleep(QUIET_PERIOD).await;

        alice.assert_quiet().await;
        assert_eq!(game.roster().count(), 2);
    }

    /// With reaping enabled a dropped connection behaves like LEAVE
    #[tokio::test]
    async fn dropped_connection_is_reaped() {
        let config = ServerConfig {
            reap_on_disconnect: true,
            ..loopback(DispatchMode::Ordered)
        };
        let (addr, game) = start_server(config).await;
        let mut alice = TestClient::connect(addr).await;
        let mut bob = TestClient::connect(addr).await;
        alice.join("Alice").await;
        bob.join("Bob").await;
        alice.recv_n(2).await;

        drop(bob);

        assert_eq!(
            alice.recv_n(3).await,
            vec![
                Envelope::broadcast("Player Bob left"),
                Envelope::leave("Bob"),
                Envelope::scoreboard(scores(&[("Alice", 0)])),
            ]
        );
        assert_eq!(game.roster().count(), 1);
    }
}
