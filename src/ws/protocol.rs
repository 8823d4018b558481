//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::commands::Command;
use crate::game::game_loop::HitRecord;

// ============================================================================
// Inbound
// ============================================================================

/// Current payload shape: `{"kind":"cmd","commands":[...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct CommandBatch {
    pub commands: Vec<InputCommand>,
}

/// One entry of a command batch
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InputCommand {
    /// Steering direction, -1 (left) to 1 (right)
    Turn { value: i32 },
    Move { thrust: bool, brake: bool },
    /// Fire the primary weapon
    Shoot,
    /// Unknown types are skipped
    #[serde(other)]
    Unknown,
}

/// Older single-command shape: `{"cmd":"turn","deg":15}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum LegacyCommand {
    /// Absolute degree delta
    Turn { deg: f32 },
    /// Thrust delta
    Move { delta: f32 },
    Shoot {
        #[serde(default)]
        weapon: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Reasons an inbound payload is dropped
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload matches no known command shape")]
    UnrecognizedShape,

    #[error("Field {0} is not a finite number")]
    NonFinite(&'static str),
}

/// Decode one inbound payload into commands for the player's ship.
///
/// `tick_dt` scales batch TURN values into a degree delta. A payload that
/// fails to decode produces no commands at all.
pub fn decode_payload(
    player_id: Uuid,
    payload: &[u8],
    tick_dt: f32,
) -> Result<Vec<Command>, PayloadError> {
    let root: Value = serde_json::from_slice(payload)?;

    let is_batch = root.get("kind").and_then(Value::as_str) == Some("cmd")
        && root.get("commands").is_some_and(Value::is_array);

    if is_batch {
        let batch: CommandBatch = serde_json::from_value(root)?;
        return Ok(batch
            .commands
            .into_iter()
            .filter_map(|c| c.into_command(player_id, tick_dt))
            .collect());
    }

    if root.get("cmd").is_some() {
        let legacy: LegacyCommand = serde_json::from_value(root)?;
        return Ok(legacy.into_command(player_id)?.into_iter().collect());
    }

    Err(PayloadError::UnrecognizedShape)
}

impl InputCommand {
    fn into_command(self, ship_id: Uuid, tick_dt: f32) -> Option<Command> {
        match self {
            Self::Turn { value } => Some(Command::Turn {
                ship_id,
                degrees: value.clamp(-1, 1) as f32 * 180.0 * tick_dt,
            }),
            Self::Move { thrust, brake } => {
                let thrust = if thrust {
                    1.0
                } else if brake {
                    -1.0
                } else {
                    0.0
                };
                Some(Command::Move { ship_id, thrust })
            }
            Self::Shoot => Some(Command::Shoot {
                ship_id,
                weapon: None,
            }),
            Self::Unknown => None,
        }
    }
}

impl LegacyCommand {
    fn into_command(self, ship_id: Uuid) -> Result<Option<Command>, PayloadError> {
        let command = match self {
            Self::Turn { deg } => Some(Command::Turn {
                ship_id,
                degrees: finite("deg", deg)?,
            }),
            Self::Move { delta } => Some(Command::Move {
                ship_id,
                thrust: finite("delta", delta)?,
            }),
            Self::Shoot { weapon } => Some(Command::Shoot { ship_id, weapon }),
            Self::Unknown => None,
        };
        Ok(command)
    }
}

/// Out-of-range JSON numbers such as `1e39` deserialize to an infinite f32
fn finite(field: &'static str, value: f32) -> Result<f32, PayloadError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PayloadError::NonFinite(field))
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// One encoded frame ready for every stream of a world
#[derive(Debug, Clone)]
pub struct ServerUpdate {
    pub tick: u64,
    /// UTF-8 JSON of a `SnapshotMsg`
    pub payload: Bytes,
}

impl ServerUpdate {
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Per-tick world message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMsg {
    pub tick: u64,
    /// Server wall clock (unix millis)
    pub server_time: u64,
    pub state: WorldState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldState {
    pub ships: BTreeMap<Uuid, ShipSnapshot>,
    pub projectiles: BTreeMap<Uuid, ProjectileSnapshot>,
    pub hits: Vec<HitSnapshot>,
}

/// Ship state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipSnapshot {
    pub id: Uuid,
    pub player_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    /// Degrees in [0, 360)
    pub heading: f32,
    pub radius: f32,
    pub health: f32,
    pub max_health: f32,
    pub alive: bool,
    /// Equipped weapon codes in slot order
    pub weapons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: Uuid,
    pub owner_ship_id: Uuid,
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub damage: f32,
    pub alive: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HitSnapshot {
    pub ship_id: Uuid,
    pub projectile_id: Uuid,
    pub damage: f32,
}

impl From<&HitRecord> for HitSnapshot {
    fn from(hit: &HitRecord) -> Self {
        Self {
            ship_id: hit.ship_id,
            projectile_id: hit.projectile_id,
            damage: hit.damage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    const DT: f32 = 0.05;

    #[test]
    fn batch_turn_scales_by_tick() {
        let player = Uuid::new_v4();
        let payload = br#"{"kind":"cmd","tick":1,"commands":[{"type":"TURN","value":1}]}"#;

        let commands = assert_ok!(decode_payload(player, payload, DT));

        assert_eq!(commands.len(), 1);
        match &commands[0] {
            Command::Turn { ship_id, degrees } => {
                assert_eq!(*ship_id, player);
                assert!((degrees - 9.0).abs() < 1e-4);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn batch_turn_value_is_clamped() {
        let payload = br#"{"kind":"cmd","commands":[{"type":"TURN","value":-7}]}"#;
        let commands = assert_ok!(decode_payload(Uuid::new_v4(), payload, DT));
        assert!(matches!(commands[0], Command::Turn { degrees, .. } if (degrees + 9.0).abs() < 1e-4));
    }

    #[test]
    fn batch_move_and_shoot() {
        let player = Uuid::new_v4();
        let payload = br#"{"kind":"cmd","commands":[
            {"type":"MOVE","thrust":true,"brake":true},
            {"type":"MOVE","thrust":false,"brake":true},
            {"type":"MOVE","thrust":false,"brake":false},
            {"type":"SHOOT"}
        ]}"#;

        let commands = assert_ok!(decode_payload(player, payload, DT));

        assert_eq!(
            commands,
            vec![
                Command::Move {
                    ship_id: player,
                    thrust: 1.0,
                },
                Command::Move {
                    ship_id: player,
                    thrust: -1.0,
                },
                Command::Move {
                    ship_id: player,
                    thrust: 0.0,
                },
                Command::Shoot {
                    ship_id: player,
                    weapon: None,
                },
            ]
        );
    }

    #[test]
    fn unknown_batch_entries_are_skipped() {
        let payload = br#"{"kind":"cmd","commands":[{"type":"DANCE"},{"type":"SHOOT"}]}"#;
        let commands = assert_ok!(decode_payload(Uuid::new_v4(), payload, DT));
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn missing_field_drops_the_whole_batch() {
        let payload = br#"{"kind":"cmd","commands":[{"type":"SHOOT"},{"type":"TURN"}]}"#;
        let err = assert_err!(decode_payload(Uuid::new_v4(), payload, DT));
        assert!(matches!(err, PayloadError::Json(_)));
    }

    #[test]
    fn legacy_shapes_decode() {
        let player = Uuid::new_v4();

        let turn = assert_ok!(decode_payload(player, br#"{"cmd":"turn","deg":15.5}"#, DT));
        assert_eq!(
            turn,
            vec![Command::Turn {
                ship_id: player,
                degrees: 15.5,
            }]
        );

        let mv = assert_ok!(decode_payload(player, br#"{"cmd":"move","delta":-0.5}"#, DT));
        assert_eq!(
            mv,
            vec![Command::Move {
                ship_id: player,
                thrust: -0.5,
            }]
        );

        let shoot = assert_ok!(decode_payload(player, br#"{"cmd":"shoot","weapon":"LASER"}"#, DT));
        assert_eq!(
            shoot,
            vec![Command::Shoot {
                ship_id: player,
                weapon: Some("LASER".into()),
            }]
        );

        let bare = assert_ok!(decode_payload(player, br#"{"cmd":"shoot"}"#, DT));
        assert_eq!(
            bare,
            vec![Command::Shoot {
                ship_id: player,
                weapon: None,
            }]
        );

        let unknown = assert_ok!(decode_payload(player, br#"{"cmd":"warp"}"#, DT));
        assert!(unknown.is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let player = Uuid::new_v4();

        assert!(matches!(
            decode_payload(player, b"{not json", DT),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            decode_payload(player, br#"{"cmd":"turn"}"#, DT),
            Err(PayloadError::Json(_))
        ));
        assert!(matches!(
            decode_payload(player, br#"{"hello":"world"}"#, DT),
            Err(PayloadError::UnrecognizedShape)
        ));
        // kind without a commands array is not a batch
        assert!(matches!(
            decode_payload(player, br#"{"kind":"cmd","commands":5}"#, DT),
            Err(PayloadError::UnrecognizedShape)
        ));
    }

    #[test]
    fn out_of_range_legacy_numbers_are_rejected() {
        let player = Uuid::new_v4();

        let err = assert_err!(decode_payload(player, br#"{"cmd":"turn","deg":1e39}"#, DT));
        assert!(matches!(err, PayloadError::NonFinite("deg")));

        let err = assert_err!(decode_payload(player, br#"{"cmd":"move","delta":-1e39}"#, DT));
        assert!(matches!(err, PayloadError::NonFinite("delta")));
    }
}
