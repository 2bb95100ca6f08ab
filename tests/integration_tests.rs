//! Integration tests for the session server and client logic
//!
//! These tests run a real server on a loopback port and drive it with
//! scripted players that use the client's mirror and command routing.

use client::game::ClientMirror;
use client::input::{route, Intent};
use client::network::connect;
use server::network::{Server, ServerConfig};
use shared::{
    decode, read_frame, write_packet, ClientPacket, GamePhase, Job, ServerPacket,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// A scripted player: a raw connection plus the client-side mirror
struct Bot {
    stream: TcpStream,
    mirror: ClientMirror,
}

impl Bot {
    async fn connect(addr: SocketAddr, name: &str) -> Self {
        let stream = connect(&addr.to_string(), None).await.unwrap();
        let mut mirror = ClientMirror::new(name);
        mirror.connected();
        Bot { stream, mirror }
    }

    /// Connects, introduces itself and waits for its own join line
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut bot = Self::connect(addr, name).await;
        bot.send(&ClientPacket::Intro {
            name: name.to_string(),
            ready: false,
        })
        .await;
        bot.until_line(&format!("[Server] {} has joined.", name))
            .await;
        bot
    }

    async fn send(&mut self, packet: &ClientPacket) {
        write_packet(&mut self.stream, packet).await.unwrap();
    }

    async fn recv(&mut self) -> Option<ServerPacket> {
        let frame = timeout(WAIT, read_frame(&mut self.stream))
            .await
            .expect("timed out waiting for the server")
            .unwrap()?;
        let packet: ServerPacket = decode(&frame).unwrap();
        self.mirror.apply(packet.clone());
        Some(packet)
    }

    /// Reads packets until one matches, returning everything read before it
    async fn until(&mut self, wanted: impl Fn(&ServerPacket) -> bool) -> Vec<ServerPacket> {
        let mut skipped = Vec::new();
        loop {
            match self.recv().await {
                Some(packet) if wanted(&packet) => return skipped,
                Some(packet) => skipped.push(packet),
                None => panic!(
                    "{} was disconnected while waiting, saw {:?}",
                    self.mirror.name(),
                    skipped
                ),
            }
        }
    }

    async fn until_line(&mut self, text: &str) -> Vec<ServerPacket> {
        self.until(|packet| matches!(packet, ServerPacket::Chat { text: t } if t == text))
            .await
    }

    async fn until_turn(&mut self) {
        self.until(|packet| *packet == ServerPacket::TakeTurn).await;
        assert!(self.mirror.my_turn());
    }

    /// True when the turn arrived, false when the game ended instead
    async fn until_turn_or_game_over(&mut self) -> bool {
        self.until(|packet| {
            matches!(
                packet,
                ServerPacket::TakeTurn
                    | ServerPacket::GameStateUpdate {
                        phase: GamePhase::GameOver,
                        ..
                    }
            )
        })
        .await;
        self.mirror.my_turn()
    }

    /// Types a console line; it must turn into a request for the server
    async fn command(&mut self, line: &str) {
        match route(line, &mut self.mirror) {
            Ok(Intent::Send(packet)) => self.send(&packet).await,
            other => panic!("'{}' did not produce a request: {:?}", line, other),
        }
    }
}

async fn start_server(expected_players: usize) -> (SocketAddr, mpsc::UnboundedSender<String>) {
    let config = ServerConfig {
        expected_players,
        seed: Some(7),
    };
    let mut server = Server::bind("127.0.0.1:0", config).await.unwrap();
    let addr = server.local_addr();
    let (console_tx, console_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        server.run(console_rx).await.unwrap();
    });
    (addr, console_tx)
}

async fn lobby(addr: SocketAddr, names: &[&str]) -> Vec<Bot> {
    let mut bots = Vec::new();
    for name in names {
        bots.push(Bot::join(addr, name).await);
    }
    bots
}

/// Readies everyone and walks character select in roster order
async fn play_character_select(bots: &mut [Bot], jobs: &[&str]) {
    for bot in bots.iter_mut() {
        bot.command(".ready").await;
    }
    for (bot, job) in bots.iter_mut().zip(jobs) {
        bot.until_turn().await;
        assert_eq!(bot.mirror.game_phase(), GamePhase::CharacterSelect);
        bot.command(job).await;
    }
}

/// LOBBY AND READINESS
mod lobby_tests {
    use super::*;

    #[tokio::test]
    async fn only_first_player_gets_first_turn() {
        let (addr, _console) = start_server(3).await;
        let mut bots = lobby(addr, &["A", "B", "C"]).await;

        for bot in bots.iter_mut() {
            bot.command(".ready").await;
        }

        bots[0].until_turn().await;
        assert!(bots[0].mirror.in_progress());

        bots[0].command(".wizard").await;
        let before_choice = bots[1]
            .until_line("[Server] A has chosen to be a Wizard")
            .await;
        assert!(before_choice.contains(&ServerPacket::GameStarted));
        assert!(!before_choice.contains(&ServerPacket::TakeTurn));

        // B is next in roster order
        bots[1].until_turn().await;
    }

    #[tokio::test]
    async fn player_list_reflects_readiness() {
        let (addr, _console) = start_server(3).await;
        let mut bots = lobby(addr, &["A", "B"]).await;

        bots[1].command(".ready").await;
        bots[0].until_line("[Server] B is ready.").await;
        bots[0].command(".players").await;

        bots[0]
            .until(|packet| {
                *packet
                    == ServerPacket::PlayerListReply {
                        players: vec![("A".to_string(), false), ("B".to_string(), true)],
                    }
            })
            .await;
    }

    #[tokio::test]
    async fn surplus_player_is_turned_away() {
        let (addr, _console) = start_server(2).await;
        let _bots = lobby(addr, &["A", "B"]).await;

        let mut late = Bot::connect(addr, "C").await;
        late.send(&ClientPacket::Intro {
            name: "C".to_string(),
            ready: true,
        })
        .await;

        let skipped = late
            .until(|packet| matches!(packet, ServerPacket::Disconnected { .. }))
            .await;
        assert!(skipped.is_empty());
        assert!(late.recv().await.is_none());
    }

    #[tokio::test]
    async fn chat_reaches_everyone() {
        let (addr, _console) = start_server(3).await;
        let mut bots = lobby(addr, &["A", "B"]).await;

        bots[0].command("hello there").await;
        bots[1].until_line("A: hello there").await;
        bots[0].until_line("A: hello there").await;
    }
}

/// FULL GAMES
mod game_tests {
    use super::*;

    #[tokio::test]
    async fn attack_moves_turn_and_updates_every_mirror() {
        let (addr, _console) = start_server(3).await;
        let mut bots = lobby(addr, &["A", "B", "C"]).await;
        play_character_select(&mut bots, &[".wizard", ".warrior", ".assassin"]).await;

        bots[0].until_turn().await;
        assert_eq!(bots[0].mirror.game_phase(), GamePhase::Main);
        assert_eq!(bots[0].mirror.me().job, Job::Wizard);
        assert_eq!(bots[0].mirror.roster().len(), 3);

        bots[0].command(".atk B").await;

        bots[1].until_line("[Server] A attacked B for 12").await;
        bots[1].until_turn().await;
        assert_eq!(bots[1].mirror.me().health, 88);

        let skipped = bots[2]
            .until(|packet| {
                *packet
                    == ServerPacket::PlayerHpUpdate {
                        name: "B".to_string(),
                        health: 88,
                    }
            })
            .await;
        assert!(!skipped.contains(&ServerPacket::TakeTurn));
        assert_eq!(bots[2].mirror.living_player("B").map(|p| p.health), Some(88));
    }

    #[tokio::test]
    async fn last_survivor_wins() {
        let (addr, _console) = start_server(2).await;
        let mut bots = lobby(addr, &["A", "B"]).await;
        play_character_select(&mut bots, &[".1", ".2"]).await;

        // A attacks B, B attacks itself: 24 damage per round
        loop {
            assert!(bots[0].until_turn_or_game_over().await);
            bots[0].command(".atk B").await;
            if !bots[1].until_turn_or_game_over().await {
                break;
            }
            bots[1].command(".atk me").await;
        }

        assert_eq!(bots[1].mirror.game_phase(), GamePhase::GameOver);
        assert!(bots[1].mirror.me().health <= 0);

        let skipped = bots[0]
            .until(|packet| {
                matches!(
                    packet,
                    ServerPacket::GameStateUpdate {
                        phase: GamePhase::GameOver,
                        roster: None
                    }
                )
            })
            .await;
        assert!(skipped.contains(&ServerPacket::server_line("A wins!")));
        assert!(!skipped.contains(&ServerPacket::TakeTurn));
        assert!(!bots[0].mirror.my_turn());
    }

    #[tokio::test]
    async fn disconnect_forfeits_turn() {
        let (addr, _console) = start_server(3).await;
        let mut bots = lobby(addr, &["A", "B", "C"]).await;
        play_character_select(&mut bots, &[".wizard", ".warrior", ".assassin"]).await;

        bots[0].until_turn().await;
        let quitter = bots.remove(0);
        drop(quitter);

        bots[0].until_line("[Server] A has left the game.").await;
        bots[0].until_turn().await;

        bots[1]
            .until(|packet| {
                *packet
                    == ServerPacket::PlayerHpUpdate {
                        name: "A".to_string(),
                        health: 0,
                    }
            })
            .await;
        assert!(bots[1].mirror.living_player("A").is_none());
    }

    #[tokio::test]
    async fn console_lines_are_server_chat() {
        let (addr, console) = start_server(2).await;
        let mut bots = lobby(addr, &["A"]).await;

        console.send("welcome".to_string()).unwrap();
        bots[0].until_line("[Server] welcome").await;
    }
}
