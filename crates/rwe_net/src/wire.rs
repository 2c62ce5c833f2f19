//! Wire protocol messages.
//!
//! One [`NetworkMessage`] per UDP datagram, no framing. Messages are
//! written as `prost` derives rather than generated from a `.proto` file;
//! the tags below are the schema.
//!
//! Fixed-point values travel as their raw bit patterns so both ends
//! reconstruct identical simulation inputs.

use prost::Message;
use rwe_core::command::{IssueMode, PlayerCommand, PlayerUnitCommand};
use rwe_core::grid::DiscreteRect;
use rwe_core::ids::{FeatureId, UnitId};
use rwe_core::math::{SimScalar, SimVector};
use rwe_core::unit::{AttackTarget, FireOrders, ReclaimTarget, UnitOrder};

use crate::error::{NetworkError, Result};

// ============================================================================
// Envelope
// ============================================================================

/// Top-level datagram.
#[derive(Clone, PartialEq, Message)]
pub struct NetworkMessage {
    /// What the datagram carries.
    #[prost(oneof = "network_message::Payload", tags = "1, 2")]
    pub payload: Option<network_message::Payload>,
}

/// Payload variants of [`NetworkMessage`].
pub mod network_message {
    /// What a datagram carries.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Payload {
        /// In-game command and hash exchange.
        #[prost(message, tag = "1")]
        GameUpdate(super::GameUpdate),
        /// Pre-game ready state.
        #[prost(message, tag = "2")]
        LoadingStatus(super::LoadingStatus),
    }
}

impl NetworkMessage {
    /// Wrap a game update.
    #[must_use]
    pub fn game_update(update: GameUpdate) -> Self {
        Self {
            payload: Some(network_message::Payload::GameUpdate(update)),
        }
    }

    /// Wrap a loading status.
    #[must_use]
    pub fn loading_status(state: LoadingState) -> Self {
        Self {
            payload: Some(network_message::Payload::LoadingStatus(LoadingStatus {
                status: state as i32,
            })),
        }
    }

    /// Decode one datagram.
    ///
    /// # Errors
    /// Returns [`NetworkError::Decode`] if the bytes are not a message.
    pub fn from_datagram(bytes: &[u8]) -> Result<Self> {
        Ok(Self::decode(bytes)?)
    }
}

// ============================================================================
// Game Update
// ============================================================================

/// Everything one peer has not yet had acknowledged, plus its acks.
///
/// Command sets are numbered from zero in the order the sender produced
/// them. `command_sets[i]` is set number `next_command_set_to_send + i`.
/// Hashes are numbered the same way on their own stream.
#[derive(Clone, PartialEq, Message)]
pub struct GameUpdate {
    /// Number of the first set in `command_sets`.
    #[prost(uint32, tag = "1")]
    pub next_command_set_to_send: u32,
    /// Number of the next set the sender expects from the receiver.
    #[prost(uint32, tag = "2")]
    pub next_command_set_to_receive: u32,
    /// Unacknowledged command sets.
    #[prost(message, repeated, tag = "3")]
    pub command_sets: Vec<PlayerCommandSet>,
    /// Unacknowledged state hashes.
    #[prost(fixed32, repeated, tag = "4")]
    pub hashes: Vec<u32>,
    /// Number of the first hash in `hashes`.
    #[prost(uint32, tag = "5")]
    pub next_hash_to_send: u32,
    /// Number of the next hash the sender expects from the receiver.
    #[prost(uint32, tag = "6")]
    pub next_hash_to_receive: u32,
    /// Sender's scene time when the datagram was built.
    #[prost(uint32, tag = "7")]
    pub current_scene_time: u32,
}

/// Commands one player issued for one scene tick.
#[derive(Clone, PartialEq, Message)]
pub struct PlayerCommandSet {
    /// The commands, possibly none.
    #[prost(message, repeated, tag = "1")]
    pub commands: Vec<PlayerCommandProto>,
}

/// A single player command.
#[derive(Clone, PartialEq, Message)]
pub struct PlayerCommandProto {
    /// Which command.
    #[prost(oneof = "player_command_proto::Command", tags = "1, 2, 3")]
    pub command: Option<player_command_proto::Command>,
}

/// Variants of [`PlayerCommandProto`].
pub mod player_command_proto {
    /// Which command.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Command {
        /// Pause the match.
        #[prost(message, tag = "1")]
        Pause(super::Empty),
        /// Resume the match.
        #[prost(message, tag = "2")]
        Unpause(super::Empty),
        /// Command one unit.
        #[prost(message, tag = "3")]
        UnitCommand(super::UnitCommandProto),
    }
}

/// Placeholder for variants without data.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct Empty {}

/// A command addressed to one unit.
#[derive(Clone, PartialEq, Message)]
pub struct UnitCommandProto {
    /// Raw unit id.
    #[prost(uint32, tag = "1")]
    pub unit: u32,
    /// What to do.
    #[prost(oneof = "unit_command_proto::Command", tags = "2, 3, 4, 5")]
    pub command: Option<unit_command_proto::Command>,
}

/// Variants of [`UnitCommandProto`].
pub mod unit_command_proto {
    /// What to do.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Command {
        /// Give an order.
        #[prost(message, tag = "2")]
        IssueOrder(super::IssueOrderProto),
        /// Clear orders.
        #[prost(message, tag = "3")]
        Stop(super::Empty),
        /// Change fire orders.
        #[prost(enumeration = "super::FireOrdersProto", tag = "4")]
        SetFireOrders(i32),
        /// Switch on or off.
        #[prost(bool, tag = "5")]
        SetOnOff(bool),
    }
}

/// An order and how it joins the queue.
#[derive(Clone, PartialEq, Message)]
pub struct IssueOrderProto {
    /// The order.
    #[prost(message, optional, tag = "1")]
    pub order: Option<UnitOrderProto>,
    /// Append instead of replacing.
    #[prost(bool, tag = "2")]
    pub queued: bool,
}

/// Standing fire orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FireOrdersProto {
    /// Never fire unprompted.
    HoldFire = 0,
    /// Fire back at attackers.
    ReturnFire = 1,
    /// Engage anything in range.
    FireAtWill = 2,
}

/// A unit order.
#[derive(Clone, PartialEq, Message)]
pub struct UnitOrderProto {
    /// Which order.
    #[prost(oneof = "unit_order_proto::Order", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub order: Option<unit_order_proto::Order>,
}

/// Variants of [`UnitOrderProto`].
pub mod unit_order_proto {
    /// Which order.
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Order {
        /// Move to a position.
        #[prost(message, tag = "1")]
        Move(super::VectorProto),
        /// Attack a ground position.
        #[prost(message, tag = "2")]
        AttackGround(super::VectorProto),
        /// Attack a unit.
        #[prost(uint32, tag = "3")]
        AttackUnit(u32),
        /// Build something.
        #[prost(message, tag = "4")]
        Build(super::BuildOrderProto),
        /// Clear a footprint.
        #[prost(message, tag = "5")]
        BuggerOff(super::RectProto),
        /// Assist an unfinished unit.
        #[prost(uint32, tag = "6")]
        CompleteBuild(u32),
        /// Reclaim a unit.
        #[prost(uint32, tag = "7")]
        ReclaimUnit(u32),
        /// Reclaim a feature.
        #[prost(uint32, tag = "8")]
        ReclaimFeature(u32),
    }
}

/// Build order payload.
#[derive(Clone, PartialEq, Message)]
pub struct BuildOrderProto {
    /// Unit type name.
    #[prost(string, tag = "1")]
    pub unit_type: String,
    /// Centre of the new unit.
    #[prost(message, optional, tag = "2")]
    pub position: Option<VectorProto>,
}

/// A fixed-point vector as raw bits.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct VectorProto {
    /// X bits.
    #[prost(sint32, tag = "1")]
    pub x: i32,
    /// Y bits.
    #[prost(sint32, tag = "2")]
    pub y: i32,
    /// Z bits.
    #[prost(sint32, tag = "3")]
    pub z: i32,
}

/// A grid rectangle.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct RectProto {
    /// Left column.
    #[prost(sint32, tag = "1")]
    pub x: i32,
    /// Top row.
    #[prost(sint32, tag = "2")]
    pub y: i32,
    /// Width.
    #[prost(sint32, tag = "3")]
    pub width: i32,
    /// Height.
    #[prost(sint32, tag = "4")]
    pub height: i32,
}

// ============================================================================
// Loading
// ============================================================================

/// A peer's loading state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum LoadingState {
    /// Still loading.
    Loading = 0,
    /// Ready to start.
    Ready = 1,
}

/// Pre-game ready state.
#[derive(Clone, Copy, PartialEq, Message)]
pub struct LoadingStatus {
    /// A [`LoadingState`].
    #[prost(enumeration = "LoadingState", tag = "1")]
    pub status: i32,
}

impl LoadingStatus {
    /// The state, treating unknown values as still loading.
    #[must_use]
    pub fn state(&self) -> LoadingState {
        LoadingState::try_from(self.status).unwrap_or(LoadingState::Loading)
    }
}

// ============================================================================
// Conversions
// ============================================================================

fn malformed(what: &str) -> NetworkError {
    NetworkError::MalformedCommand(what.to_string())
}

impl From<SimVector> for VectorProto {
    fn from(v: SimVector) -> Self {
        Self {
            x: v.x.to_bits(),
            y: v.y.to_bits(),
            z: v.z.to_bits(),
        }
    }
}

impl From<VectorProto> for SimVector {
    fn from(v: VectorProto) -> Self {
        SimVector::new(SimScalar::from_bits(v.x), SimScalar::from_bits(v.y), SimScalar::from_bits(v.z))
    }
}

impl From<FireOrders> for FireOrdersProto {
    fn from(orders: FireOrders) -> Self {
        match orders {
            FireOrders::HoldFire => Self::HoldFire,
            FireOrders::ReturnFire => Self::ReturnFire,
            FireOrders::FireAtWill => Self::FireAtWill,
        }
    }
}

impl From<FireOrdersProto> for FireOrders {
    fn from(orders: FireOrdersProto) -> Self {
        match orders {
            FireOrdersProto::HoldFire => Self::HoldFire,
            FireOrdersProto::ReturnFire => Self::ReturnFire,
            FireOrdersProto::FireAtWill => Self::FireAtWill,
        }
    }
}

impl From<&UnitOrder> for UnitOrderProto {
    fn from(order: &UnitOrder) -> Self {
        use unit_order_proto::Order;
        let order = match order {
            UnitOrder::Move(position) => Order::Move((*position).into()),
            UnitOrder::Attack(AttackTarget::Ground(position)) => Order::AttackGround((*position).into()),
            UnitOrder::Attack(AttackTarget::Unit(unit)) => Order::AttackUnit(unit.value()),
            UnitOrder::Build { unit_type, position } => Order::Build(BuildOrderProto {
                unit_type: unit_type.clone(),
                position: Some((*position).into()),
            }),
            UnitOrder::BuggerOff(rect) => Order::BuggerOff(RectProto {
                x: rect.x(),
                y: rect.y(),
                width: rect.width(),
                height: rect.height(),
            }),
            UnitOrder::CompleteBuild(unit) => Order::CompleteBuild(unit.value()),
            UnitOrder::Reclaim(ReclaimTarget::Unit(unit)) => Order::ReclaimUnit(unit.value()),
            UnitOrder::Reclaim(ReclaimTarget::Feature(feature)) => Order::ReclaimFeature(feature.value()),
        };
        Self { order: Some(order) }
    }
}

impl TryFrom<UnitOrderProto> for UnitOrder {
    type Error = NetworkError;

    fn try_from(proto: UnitOrderProto) -> Result<Self> {
        use unit_order_proto::Order;
        Ok(match proto.order.ok_or_else(|| malformed("order without a variant"))? {
            Order::Move(position) => UnitOrder::Move(position.into()),
            Order::AttackGround(position) => UnitOrder::Attack(AttackTarget::Ground(position.into())),
            Order::AttackUnit(unit) => UnitOrder::Attack(AttackTarget::Unit(UnitId::from_raw(unit))),
            Order::Build(build) => UnitOrder::Build {
                unit_type: build.unit_type,
                position: build.position.ok_or_else(|| malformed("build order without a position"))?.into(),
            },
            Order::BuggerOff(rect) => UnitOrder::BuggerOff(
                DiscreteRect::try_new(rect.x, rect.y, rect.width, rect.height)
                    .ok_or_else(|| malformed("rectangle with negative size"))?,
            ),
            Order::CompleteBuild(unit) => UnitOrder::CompleteBuild(UnitId::from_raw(unit)),
            Order::ReclaimUnit(unit) => UnitOrder::Reclaim(ReclaimTarget::Unit(UnitId::from_raw(unit))),
            Order::ReclaimFeature(feature) => UnitOrder::Reclaim(ReclaimTarget::Feature(FeatureId::from_raw(feature))),
        })
    }
}

impl From<&PlayerCommand> for PlayerCommandProto {
    fn from(command: &PlayerCommand) -> Self {
        use player_command_proto::Command;
        use unit_command_proto::Command as UnitCommand;
        let command = match command {
            PlayerCommand::PauseGame => Command::Pause(Empty {}),
            PlayerCommand::UnpauseGame => Command::Unpause(Empty {}),
            PlayerCommand::UnitCommand { unit, command } => {
                let inner = match command {
                    PlayerUnitCommand::IssueOrder { order, mode } => UnitCommand::IssueOrder(IssueOrderProto {
                        order: Some(order.into()),
                        queued: *mode == IssueMode::Queued,
                    }),
                    PlayerUnitCommand::Stop => UnitCommand::Stop(Empty {}),
                    PlayerUnitCommand::SetFireOrders(orders) => {
                        UnitCommand::SetFireOrders(FireOrdersProto::from(*orders) as i32)
                    }
                    PlayerUnitCommand::SetOnOff(on) => UnitCommand::SetOnOff(*on),
                };
                Command::UnitCommand(UnitCommandProto {
                    unit: unit.value(),
                    command: Some(inner),
                })
            }
        };
        Self { command: Some(command) }
    }
}

impl TryFrom<PlayerCommandProto> for PlayerCommand {
    type Error = NetworkError;

    fn try_from(proto: PlayerCommandProto) -> Result<Self> {
        use player_command_proto::Command;
        use unit_command_proto::Command as UnitCommand;
        Ok(match proto.command.ok_or_else(|| malformed("command without a variant"))? {
            Command::Pause(_) => PlayerCommand::PauseGame,
            Command::Unpause(_) => PlayerCommand::UnpauseGame,
            Command::UnitCommand(unit_command) => {
                let command = match unit_command
                    .command
                    .ok_or_else(|| malformed("unit command without a variant"))?
                {
                    UnitCommand::IssueOrder(issue) => PlayerUnitCommand::IssueOrder {
                        order: issue.order.ok_or_else(|| malformed("issue without an order"))?.try_into()?,
                        mode: if issue.queued { IssueMode::Queued } else { IssueMode::Immediate },
                    },
                    UnitCommand::Stop(_) => PlayerUnitCommand::Stop,
                    UnitCommand::SetFireOrders(value) => PlayerUnitCommand::SetFireOrders(
                        FireOrdersProto::try_from(value)
                            .map_err(|_| malformed("unknown fire orders"))?
                            .into(),
                    ),
                    UnitCommand::SetOnOff(on) => PlayerUnitCommand::SetOnOff(on),
                };
                PlayerCommand::UnitCommand {
                    unit: UnitId::from_raw(unit_command.unit),
                    command,
                }
            }
        })
    }
}

impl From<&[PlayerCommand]> for PlayerCommandSet {
    fn from(commands: &[PlayerCommand]) -> Self {
        Self {
            commands: commands.iter().map(PlayerCommandProto::from).collect(),
        }
    }
}

impl PlayerCommandSet {
    /// Convert to simulation commands.
    ///
    /// # Errors
    /// Returns [`NetworkError::MalformedCommand`] if any command is invalid.
    pub fn into_commands(self) -> Result<Vec<PlayerCommand>> {
        self.commands.into_iter().map(PlayerCommand::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_command(command: PlayerUnitCommand) -> PlayerCommand {
        PlayerCommand::UnitCommand {
            unit: UnitId::from_raw(0x0304),
            command,
        }
    }

    #[test]
    fn test_every_order_survives_the_wire() {
        let orders = vec![
            UnitOrder::Move(SimVector::new(
                SimScalar::from_bits(-12_345),
                SimScalar::from_bits(1),
                SimScalar::from_bits(i32::MAX),
            )),
            UnitOrder::Attack(AttackTarget::Ground(SimVector::from_ints(100, 0, -4))),
            UnitOrder::Attack(AttackTarget::Unit(UnitId::from_raw(7))),
            UnitOrder::Build {
                unit_type: "ARMSOLAR".to_string(),
                position: SimVector::from_ints(56, 0, 8),
            },
            UnitOrder::BuggerOff(DiscreteRect::new(-2, 3, 4, 5)),
            UnitOrder::CompleteBuild(UnitId::from_raw(9)),
            UnitOrder::Reclaim(ReclaimTarget::Unit(UnitId::from_raw(10))),
            UnitOrder::Reclaim(ReclaimTarget::Feature(FeatureId::from_raw(11))),
        ];
        let mut commands: Vec<PlayerCommand> = orders
            .into_iter()
            .map(|order| {
                unit_command(PlayerUnitCommand::IssueOrder {
                    order,
                    mode: IssueMode::Queued,
                })
            })
            .collect();
        commands.extend([
            PlayerCommand::PauseGame,
            PlayerCommand::UnpauseGame,
            unit_command(PlayerUnitCommand::Stop),
            unit_command(PlayerUnitCommand::SetFireOrders(FireOrders::ReturnFire)),
            unit_command(PlayerUnitCommand::SetOnOff(false)),
        ]);

        let message = NetworkMessage::game_update(GameUpdate {
            command_sets: vec![PlayerCommandSet::from(commands.as_slice())],
            ..GameUpdate::default()
        });
        let decoded = NetworkMessage::from_datagram(&message.encode_to_vec()).unwrap();
        let Some(network_message::Payload::GameUpdate(update)) = decoded.payload else {
            panic!("expected a game update");
        };
        let set = update.command_sets.into_iter().next().unwrap();
        assert_eq!(set.into_commands().unwrap(), commands);
    }

    #[test]
    fn test_loading_status() {
        let message = NetworkMessage::loading_status(LoadingState::Ready);
        let decoded = NetworkMessage::decode(message.encode_to_vec().as_slice()).unwrap();
        let Some(network_message::Payload::LoadingStatus(status)) = decoded.payload else {
            panic!("expected a loading status");
        };
        assert_eq!(status.state(), LoadingState::Ready);
        assert_eq!(LoadingStatus { status: 42 }.state(), LoadingState::Loading);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            NetworkMessage::from_datagram(&[0xff, 0xff, 0xff]),
            Err(NetworkError::Decode(_))
        ));
    }

    #[test]
    fn test_empty_variants_are_malformed() {
        assert!(PlayerCommand::try_from(PlayerCommandProto::default()).is_err());
        let negative = UnitOrderProto {
            order: Some(unit_order_proto::Order::BuggerOff(RectProto {
                x: 0,
                y: 0,
                width: -1,
                height: 1,
            })),
        };
        assert!(matches!(
            UnitOrder::try_from(negative),
            Err(NetworkError::MalformedCommand(_))
        ));
    }
}
