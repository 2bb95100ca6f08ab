//! Binary packet codec and stream framing.
//!
//! Packets are encoded with bincode's varint configuration, so an enum's
//! variant index (the message kind) occupies a single leading byte, strings
//! are length-prefixed UTF-8 and booleans are one byte. On the stream each
//! encoded packet is preceded by its length as a big-endian `u32`.

use crate::MAX_PACKET_SIZE;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to encode packet: {0}")]
    Encode(#[source] bincode::Error),
    #[error("malformed packet: {0}")]
    Decode(#[source] bincode::Error),
    #[error("frame of {0} bytes exceeds the packet size limit")]
    FrameTooLarge(usize),
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_PACKET_SIZE as u64)
}

pub fn encode<T: Serialize>(packet: &T) -> Result<Vec<u8>, ProtocolError> {
    options().serialize(packet).map_err(ProtocolError::Encode)
}

/// Decodes exactly one packet; trailing bytes are an error.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    options().deserialize(bytes).map_err(ProtocolError::Decode)
}

/// Reads one length-prefixed frame. Returns `Ok(None)` when the peer closed
/// the stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // A corrupt length cannot be skipped over, the caller must drop the stream
    if len > MAX_PACKET_SIZE {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(Some(buffer))
}

pub async fn write_packet<W, T>(writer: &mut W, packet: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = encode(packet)?;
    writer.write_u32(data.len() as u32).await?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, ClientPacket, GamePhase, Job, PlayerSnapshot, ServerPacket};
    use tokio_test::io::Builder;

    fn frame(packet: &impl Serialize) -> Vec<u8> {
        let payload = encode(packet).unwrap();
        let mut bytes = (payload.len() as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(&payload);
        bytes
    }

    #[test]
    fn test_client_packets_roundtrip() {
        let packets = vec![
            ClientPacket::Intro {
                name: "Alice".to_string(),
                ready: true,
            },
            ClientPacket::Ready,
            ClientPacket::Unready,
            ClientPacket::PlayerListRequest,
            ClientPacket::PlayerStatsRequest,
            ClientPacket::Chat {
                text: "hello there".to_string(),
            },
            ClientPacket::JobChosen { job: Job::Assassin },
            ClientPacket::ActionTaken {
                action: Action::AttackRandom,
                target: "Bob".to_string(),
            },
        ];

        for packet in packets {
            let bytes = encode(&packet).unwrap();
            let decoded: ClientPacket = decode(&bytes).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_server_packets_roundtrip() {
        let roster = vec![
            PlayerSnapshot {
                name: "Alice".to_string(),
                health: 100,
                ready: true,
                job: Job::Wizard,
            },
            PlayerSnapshot {
                name: "Bob".to_string(),
                health: -4,
                ready: true,
                job: Job::Warrior,
            },
        ];

        let packets = vec![
            ServerPacket::server_line("Alice has joined."),
            ServerPacket::GameStarted,
            ServerPacket::PlayerListReply {
                players: vec![("Alice".to_string(), true), ("Bob".to_string(), false)],
            },
            ServerPacket::PlayerStatsReply {
                players: vec![("Alice".to_string(), Job::Wizard, 88)],
            },
            ServerPacket::TakeTurn,
            ServerPacket::GameStateUpdate {
                phase: GamePhase::Main,
                roster: Some(roster),
            },
            ServerPacket::GameStateUpdate {
                phase: GamePhase::GameOver,
                roster: None,
            },
            ServerPacket::PlayerHpUpdate {
                name: "Bob".to_string(),
                health: -4,
            },
            ServerPacket::Disconnected {
                reason: "Server full".to_string(),
            },
        ];

        for packet in packets {
            let bytes = encode(&packet).unwrap();
            let decoded: ServerPacket = decode(&bytes).unwrap();
            assert_eq!(decoded, packet);
        }
    }

    #[test]
    fn test_message_kind_is_single_leading_byte() {
        assert_eq!(encode(&ClientPacket::Ready).unwrap(), vec![1]);
        assert_eq!(encode(&ServerPacket::TakeTurn).unwrap(), vec![4]);

        let intro = ClientPacket::Intro {
            name: "A".to_string(),
            ready: true,
        };
        assert_eq!(encode(&intro).unwrap(), vec![0, 1, b'A', 1]);

        // Jobs are tagged Wizard, Warrior, Assassin
        let chosen = |job| encode(&ClientPacket::JobChosen { job }).unwrap();
        assert_eq!(chosen(Job::Wizard), vec![6, 0]);
        assert_eq!(chosen(Job::Warrior), vec![6, 1]);
        assert_eq!(chosen(Job::Assassin), vec![6, 2]);

        let update = ServerPacket::PlayerHpUpdate {
            name: "B".to_string(),
            health: 88,
        };
        // zig-zag: 88 -> 176
        assert_eq!(encode(&update).unwrap(), vec![6, 1, b'B', 176]);
    }

    #[test]
    fn test_malformed_packets_rejected() {
        assert!(matches!(
            decode::<ClientPacket>(&[]),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            decode::<ClientPacket>(&[200]),
            Err(ProtocolError::Decode(_))
        ));
        // Intro cut off inside the name
        assert!(matches!(
            decode::<ClientPacket>(&[0, 5, b'A']),
            Err(ProtocolError::Decode(_))
        ));
        // Ready followed by garbage
        assert!(matches!(
            decode::<ClientPacket>(&[1, 0]),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_oversized_packet_not_encoded() {
        let packet = ClientPacket::Chat {
            text: "x".repeat(MAX_PACKET_SIZE + 1),
        };
        assert!(matches!(encode(&packet), Err(ProtocolError::Encode(_))));
    }

    #[tokio::test]
    async fn test_read_frame_then_clean_eof() {
        let bytes = frame(&ClientPacket::PlayerListRequest);
        let mut mock = Builder::new().read(&bytes).build();

        let payload = read_frame(&mut mock).await.unwrap().unwrap();
        let packet: ClientPacket = decode(&payload).unwrap();
        assert_eq!(packet, ClientPacket::PlayerListRequest);

        assert!(read_frame(&mut mock).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_length() {
        let header = ((MAX_PACKET_SIZE + 1) as u32).to_be_bytes();
        let mut mock = Builder::new().read(&header).build();

        match read_frame(&mut mock).await {
            Err(ProtocolError::FrameTooLarge(len)) => assert_eq!(len, MAX_PACKET_SIZE + 1),
            other => panic!("Expected FrameTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_packet_emits_length_prefix() {
        let packet = ServerPacket::server_line("Alice's turn");
        let mut mock = Builder::new().write(&frame(&packet)).build();

        write_packet(&mut mock, &packet).await.unwrap();
    }

    #[tokio::test]
    async fn test_frames_preserve_order_over_stream() {
        let (mut writer, mut reader) = tokio::io::duplex(1024);
        let packets = vec![
            ServerPacket::server_line("Bob attacked Carol for 12"),
            ServerPacket::PlayerHpUpdate {
                name: "Carol".to_string(),
                health: 88,
            },
            ServerPacket::TakeTurn,
        ];

        for packet in &packets {
            write_packet(&mut writer, packet).await.unwrap();
        }
        drop(writer);

        let mut received = Vec::new();
        while let Some(payload) = read_frame(&mut reader).await.unwrap() {
            received.push(decode::<ServerPacket>(&payload).unwrap());
        }
        assert_eq!(received, packets);
    }
}
