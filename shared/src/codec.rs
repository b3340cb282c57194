//! Wire codec for the fixed message catalog.
//!
//! Every message is one tag byte followed by a tag-specific body. All
//! multi-byte integers are big-endian. Encoding is total; decoding checks the
//! body length against the layout of the tag and rejects anything else.

use crate::types::{Color, DisconnectReason, MoveIntent, PlayerRecord, ProjectileRecord};
use thiserror::Error;

pub const TAG_HANDSHAKE_PROBE: u8 = 0x01;
pub const TAG_HANDSHAKE_FAILED: u8 = 0x02;
pub const TAG_PLAYER_LIST: u8 = 0x03;
pub const TAG_PROJECTILE_LIST: u8 = 0x04;
pub const TAG_ASSIGN_ID: u8 = 0x05;
pub const TAG_DISCONNECT_NOTICE: u8 = 0x06;

pub const TAG_HANDSHAKE_REPLY: u8 = 0x81;
pub const TAG_PLAYER_LIST_REQUEST: u8 = 0x82;
pub const TAG_MOVEMENT_UPDATE: u8 = 0x83;
pub const TAG_CREATE_PROJECTILE: u8 = 0x84;
pub const TAG_CLIENT_DISCONNECT: u8 = 0x85;

/// Text the server sends as its handshake probe.
pub const HANDSHAKE_PROBE_TEXT: &str = "ping";
/// Text the client must answer with.
pub const HANDSHAKE_REPLY_TEXT: &str = "pong";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty message (no tag byte)")]
    Empty,

    #[error("unknown message tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("malformed {message} message: {reason}")]
    Malformed {
        message: &'static str,
        reason: String,
    },

    #[error("frame payload of {0} bytes exceeds the 16-bit length prefix")]
    FrameTooLarge(usize),
}

impl CodecError {
    fn malformed(message: &'static str, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            message,
            reason: reason.into(),
        }
    }
}

/// Every message either peer can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // server -> client
    HandshakeProbe { text: String },
    HandshakeFailed,
    PlayerList { players: Vec<PlayerRecord> },
    ProjectileList { projectiles: Vec<ProjectileRecord> },
    AssignId { id: u8 },
    DisconnectNotice { reason: DisconnectReason },

    // client -> server
    HandshakeReply { text: String },
    PlayerListRequest,
    MovementUpdate { intent: MoveIntent },
    CreateProjectile { heading: u16 },
    ClientDisconnect,
}

impl Message {
    /// The probe the server opens every handshake with.
    pub fn probe() -> Self {
        Message::HandshakeProbe {
            text: HANDSHAKE_PROBE_TEXT.to_string(),
        }
    }

    /// The reply a well-behaved client answers the probe with.
    pub fn reply() -> Self {
        Message::HandshakeReply {
            text: HANDSHAKE_REPLY_TEXT.to_string(),
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Message::HandshakeProbe { .. } => TAG_HANDSHAKE_PROBE,
            Message::HandshakeFailed => TAG_HANDSHAKE_FAILED,
            Message::PlayerList { .. } => TAG_PLAYER_LIST,
            Message::ProjectileList { .. } => TAG_PROJECTILE_LIST,
            Message::AssignId { .. } => TAG_ASSIGN_ID,
            Message::DisconnectNotice { .. } => TAG_DISCONNECT_NOTICE,
            Message::HandshakeReply { .. } => TAG_HANDSHAKE_REPLY,
            Message::PlayerListRequest => TAG_PLAYER_LIST_REQUEST,
            Message::MovementUpdate { .. } => TAG_MOVEMENT_UPDATE,
            Message::CreateProjectile { .. } => TAG_CREATE_PROJECTILE,
            Message::ClientDisconnect => TAG_CLIENT_DISCONNECT,
        }
    }

    pub fn name(&self) -> &'static str {
        tag_name(self.tag())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.body_len());
        out.push(self.tag());

        match self {
            Message::HandshakeProbe { text } | Message::HandshakeReply { text } => {
                out.extend_from_slice(text.as_bytes());
            }
            Message::HandshakeFailed
            | Message::PlayerListRequest
            | Message::ClientDisconnect => {}
            Message::PlayerList { players } => {
                for player in players {
                    out.push(player.id);
                    out.extend_from_slice(&player.x.to_be_bytes());
                    out.extend_from_slice(&player.y.to_be_bytes());
                    out.extend_from_slice(&[player.color.r, player.color.g, player.color.b]);
                }
            }
            Message::ProjectileList { projectiles } => {
                for projectile in projectiles {
                    out.extend_from_slice(&projectile.x.to_be_bytes());
                    out.extend_from_slice(&projectile.y.to_be_bytes());
                }
            }
            Message::AssignId { id } => out.push(*id),
            Message::DisconnectNotice { reason } => out.push(reason.code()),
            Message::MovementUpdate { intent } => out.push(intent.pack()),
            Message::CreateProjectile { heading } => out.extend_from_slice(&heading.to_be_bytes()),
        }

        out
    }

    pub fn decode(data: &[u8]) -> Result<Message, CodecError> {
        let (&tag, body) = data.split_first().ok_or(CodecError::Empty)?;

        match tag {
            TAG_HANDSHAKE_PROBE => Ok(Message::HandshakeProbe {
                text: decode_text("handshake-probe", body)?,
            }),
            TAG_HANDSHAKE_FAILED => {
                expect_len("handshake-failed", body, 0)?;
                Ok(Message::HandshakeFailed)
            }
            TAG_PLAYER_LIST => Ok(Message::PlayerList {
                players: body
                    .chunks_exact(PlayerRecord::ENCODED_SIZE)
                    .map(|c| PlayerRecord {
                        id: c[0],
                        x: u16::from_be_bytes([c[1], c[2]]),
                        y: u16::from_be_bytes([c[3], c[4]]),
                        color: Color::new(c[5], c[6], c[7]),
                    })
                    .collect(),
            }),
            TAG_PROJECTILE_LIST => Ok(Message::ProjectileList {
                projectiles: body
                    .chunks_exact(ProjectileRecord::ENCODED_SIZE)
                    .map(|c| ProjectileRecord {
                        x: u16::from_be_bytes([c[0], c[1]]),
                        y: u16::from_be_bytes([c[2], c[3]]),
                    })
                    .collect(),
            }),
            TAG_ASSIGN_ID => {
                expect_len("assign-id", body, 1)?;
                Ok(Message::AssignId { id: body[0] })
            }
            TAG_DISCONNECT_NOTICE => {
                expect_len("disconnect-notice", body, 1)?;
                let reason = DisconnectReason::from_code(body[0]).ok_or_else(|| {
                    CodecError::malformed(
                        "disconnect-notice",
                        format!("unknown reason code {}", body[0]),
                    )
                })?;
                Ok(Message::DisconnectNotice { reason })
            }
            TAG_HANDSHAKE_REPLY => Ok(Message::HandshakeReply {
                text: decode_text("handshake-reply", body)?,
            }),
            TAG_PLAYER_LIST_REQUEST => {
                expect_len("player-list-request", body, 0)?;
                Ok(Message::PlayerListRequest)
            }
            TAG_MOVEMENT_UPDATE => {
                expect_len("movement-update", body, 1)?;
                Ok(Message::MovementUpdate {
                    intent: MoveIntent::unpack(body[0]),
                })
            }
            TAG_CREATE_PROJECTILE => {
                expect_len("create-projectile", body, 2)?;
                Ok(Message::CreateProjectile {
                    heading: u16::from_be_bytes([body[0], body[1]]),
                })
            }
            TAG_CLIENT_DISCONNECT => {
                expect_len("client-disconnect", body, 0)?;
                Ok(Message::ClientDisconnect)
            }
            unknown => Err(CodecError::UnknownTag(unknown)),
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Message::HandshakeProbe { text } | Message::HandshakeReply { text } => text.len(),
            Message::PlayerList { players } => players.len() * PlayerRecord::ENCODED_SIZE,
            Message::ProjectileList { projectiles } => {
                projectiles.len() * ProjectileRecord::ENCODED_SIZE
            }
            Message::CreateProjectile { .. } => 2,
            Message::AssignId { .. }
            | Message::DisconnectNotice { .. }
            | Message::MovementUpdate { .. } => 1,
            Message::HandshakeFailed
            | Message::PlayerListRequest
            | Message::ClientDisconnect => 0,
        }
    }
}

/// Human-readable name for a tag, used in logs.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_HANDSHAKE_PROBE => "handshake-probe",
        TAG_HANDSHAKE_FAILED => "handshake-failed",
        TAG_PLAYER_LIST => "player-list",
        TAG_PROJECTILE_LIST => "projectile-list",
        TAG_ASSIGN_ID => "assign-id",
        TAG_DISCONNECT_NOTICE => "disconnect-notice",
        TAG_HANDSHAKE_REPLY => "handshake-reply",
        TAG_PLAYER_LIST_REQUEST => "player-list-request",
        TAG_MOVEMENT_UPDATE => "movement-update",
        TAG_CREATE_PROJECTILE => "create-projectile",
        TAG_CLIENT_DISCONNECT => "client-disconnect",
        _ => "unknown",
    }
}

fn expect_len(message: &'static str, body: &[u8], expected: usize) -> Result<(), CodecError> {
    if body.len() == expected {
        Ok(())
    } else {
        Err(CodecError::malformed(
            message,
            format!("expected {} body bytes, got {}", expected, body.len()),
        ))
    }
}

fn decode_text(message: &'static str, body: &[u8]) -> Result<String, CodecError> {
    String::from_utf8(body.to_vec())
        .map_err(|e| CodecError::malformed(message, format!("invalid utf-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(message: Message) {
        let encoded = message.encode();
        assert_eq!(encoded[0], message.tag());
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, message, "roundtrip mismatch for {}", message.name());
    }

    #[test]
    fn test_handshake_messages_roundtrip() {
        roundtrip(Message::probe());
        roundtrip(Message::reply());
        roundtrip(Message::HandshakeReply {
            text: "test".to_string(),
        });
        roundtrip(Message::HandshakeFailed);
    }

    #[test]
    fn test_handshake_probe_is_ascii_ping() {
        assert_eq!(Message::probe().encode(), b"\x01ping".to_vec());
        assert_eq!(Message::reply().encode(), b"\x81pong".to_vec());
    }

    #[test]
    fn test_player_list_layout() {
        let message = Message::PlayerList {
            players: vec![PlayerRecord {
                id: 7,
                x: 0x0102,
                y: 0x0304,
                color: Color::new(10, 20, 30),
            }],
        };
        assert_eq!(
            message.encode(),
            vec![TAG_PLAYER_LIST, 7, 0x01, 0x02, 0x03, 0x04, 10, 20, 30]
        );
    }

    #[test]
    fn test_player_list_roundtrip_with_boundary_ids() {
        roundtrip(Message::PlayerList {
            players: vec![
                PlayerRecord {
                    id: 0,
                    x: 8,
                    y: 6,
                    color: Color::new(128, 253, 43),
                },
                PlayerRecord {
                    id: 255,
                    x: 1550,
                    y: 850,
                    color: Color::new(218, 0, 5),
                },
            ],
        });
        roundtrip(Message::PlayerList { players: vec![] });
    }

    #[test]
    fn test_projectile_list_roundtrip() {
        roundtrip(Message::ProjectileList {
            projectiles: vec![
                ProjectileRecord { x: 128, y: 16 },
                ProjectileRecord { x: 0, y: 250 },
                ProjectileRecord { x: 830, y: 678 },
            ],
        });
    }

    #[test]
    fn test_record_lists_ignore_trailing_fragment() {
        let mut encoded = Message::ProjectileList {
            projectiles: vec![ProjectileRecord { x: 1, y: 2 }],
        }
        .encode();
        encoded.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        match Message::decode(&encoded).unwrap() {
            Message::ProjectileList { projectiles } => {
                assert_eq!(projectiles, vec![ProjectileRecord { x: 1, y: 2 }]);
            }
            other => panic!("unexpected message {:?}", other),
        }

        let short = [TAG_PLAYER_LIST, 1, 2, 3];
        assert_eq!(
            Message::decode(&short).unwrap(),
            Message::PlayerList { players: vec![] }
        );
    }

    #[test]
    fn test_assign_id_roundtrip() {
        roundtrip(Message::AssignId { id: 0 });
        roundtrip(Message::AssignId { id: 255 });
    }

    #[test]
    fn test_disconnect_notice_roundtrip() {
        roundtrip(Message::DisconnectNotice {
            reason: DisconnectReason::Kicked,
        });
        roundtrip(Message::DisconnectNotice {
            reason: DisconnectReason::Killed,
        });
        roundtrip(Message::DisconnectNotice {
            reason: DisconnectReason::ServerClosed,
        });
    }

    #[test]
    fn test_movement_update_roundtrip_all_intents() {
        for dx in -1..=1 {
            for dy in -1..=1 {
                roundtrip(Message::MovementUpdate {
                    intent: MoveIntent::new(dx, dy),
                });
            }
        }
    }

    #[test]
    fn test_create_projectile_roundtrip() {
        for heading in [0, 9000, 18094, 30000, 35999] {
            roundtrip(Message::CreateProjectile { heading });
        }
    }

    #[test]
    fn test_empty_body_messages_roundtrip() {
        roundtrip(Message::PlayerListRequest);
        roundtrip(Message::ClientDisconnect);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert!(matches!(
            Message::decode(&[TAG_ASSIGN_ID]),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            Message::decode(&[TAG_CREATE_PROJECTILE, 0x00]),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            Message::decode(&[TAG_CLIENT_DISCONNECT, 0x00]),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            Message::decode(&[TAG_MOVEMENT_UPDATE, 0x01, 0x01]),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_reason() {
        assert!(matches!(
            Message::decode(&[TAG_DISCONNECT_NOTICE, 9]),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8_handshake() {
        assert!(matches!(
            Message::decode(&[TAG_HANDSHAKE_REPLY, 0xFF, 0xFE]),
            Err(CodecError::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(Message::decode(&[0x7F, 1, 2]), Err(CodecError::UnknownTag(0x7F)));
        assert_eq!(Message::decode(&[]), Err(CodecError::Empty));
    }
}
