// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! Line grammar spoken by the panel's integration service.
//!
//! Every message, in both directions, is a single line of the form
//!
//! ```text
//! Security_system::EventName(Field1 = Value1, Field2 = Value2, ...)
//! ```
//!
//! Inbound lines are decoded into [`Event`]s; anything that does not match a
//! known shape decodes to `None` and is dropped by the caller. Outbound
//! [`Command`]s render to the exact inverse form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespace prefix carried by every panel message.
pub const NAMESPACE: &str = "Security_system";

/// Arming literal carried by `PartitionStatus` / `PartitionEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArmingStatus {
    Disarmed,
    ArmedAway,
    ArmedStay,
    ArmedNight,
}

impl ArmingStatus {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Disarmed" => Some(Self::Disarmed),
            "ArmedAway" => Some(Self::ArmedAway),
            "ArmedStay" => Some(Self::ArmedStay),
            "ArmedNight" => Some(Self::ArmedNight),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarmed => "Disarmed",
            Self::ArmedAway => "ArmedAway",
            Self::ArmedStay => "ArmedStay",
            Self::ArmedNight => "ArmedNight",
        }
    }
}

/// `CurrentZoneStatus` literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoneCondition {
    Sealed,
    Unsealed,
}

impl ZoneCondition {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "Sealed" => Some(Self::Sealed),
            "Unsealed" => Some(Self::Unsealed),
            _ => None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed)
    }
}

/// Named panel operation submitted through `SmartPin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Macro {
    Disarm,
    ArmAway,
    ArmStay,
    ArmNight,
    ArmStayInstant,
    ArmNightInstant,
}

impl Macro {
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "Disarm" => Some(Self::Disarm),
            "ArmAway" => Some(Self::ArmAway),
            "ArmStay" => Some(Self::ArmStay),
            "ArmNight" => Some(Self::ArmNight),
            "ArmStayInstant" => Some(Self::ArmStayInstant),
            "ArmNightInstant" => Some(Self::ArmNightInstant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disarm => "Disarm",
            Self::ArmAway => "ArmAway",
            Self::ArmStay => "ArmStay",
            Self::ArmNight => "ArmNight",
            Self::ArmStayInstant => "ArmStayInstant",
            Self::ArmNightInstant => "ArmNightInstant",
        }
    }

    /// The arming status the panel reports once this macro has been applied.
    pub fn reported_status(&self) -> ArmingStatus {
        match self {
            Self::Disarm => ArmingStatus::Disarmed,
            Self::ArmAway => ArmingStatus::ArmedAway,
            Self::ArmStay | Self::ArmStayInstant => ArmingStatus::ArmedStay,
            Self::ArmNight | Self::ArmNightInstant => ArmingStatus::ArmedNight,
        }
    }
}

/// A decoded inbound panel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// `PartitionStatus(PartitionNumber, CurrentPartitionArmingStatus)`
    PartitionStatus { partition: u32, status: ArmingStatus },
    /// `PartitionEvent(PartitionNumber, CurrentPartitionArmingEvent)`; handled
    /// exactly like `PartitionStatus`.
    PartitionEvent { partition: u32, status: ArmingStatus },
    /// `PartitionAlarm(PartitionNumber, IsPartitionAlarmActive)`.
    /// Only the literal `true` sets `active`.
    PartitionAlarm { partition: u32, active: bool },
    /// `PartitionReady(PartitionNumber, IsPartitionReady)`; carries no state.
    PartitionReady { partition: u32, ready: bool },
    /// `ZoneStatus(ZoneNumber, CurrentZoneStatus, ZoneSummary)`
    ZoneStatus {
        zone: u32,
        condition: ZoneCondition,
        summary: Option<u32>,
    },
    /// `ZoneBypass(ZoneNumber, IsZoneBypassed)`; carries no state.
    ZoneBypass { zone: u32, bypassed: bool },
    /// `OutputStatus(OutputNumber, IsOutputOn)`
    OutputStatus { output: u32, on: bool },
}

impl Event {
    /// Name of the event as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Event::PartitionStatus { .. } => "PartitionStatus",
            Event::PartitionEvent { .. } => "PartitionEvent",
            Event::PartitionAlarm { .. } => "PartitionAlarm",
            Event::PartitionReady { .. } => "PartitionReady",
            Event::ZoneStatus { .. } => "ZoneStatus",
            Event::ZoneBypass { .. } => "ZoneBypass",
            Event::OutputStatus { .. } => "OutputStatus",
        }
    }
}

/// A line split into its grammar parts, before any typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub fields: Vec<(&'a str, &'a str)>,
}

impl<'a> RawMessage<'a> {
    /// Split `Namespace::Name(K = V, ...)`. Returns `None` for anything else.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (namespace, rest) = line.split_once("::")?;
        let open = rest.find('(')?;
        let body = rest[open + 1..].strip_suffix(')')?;
        let name = &rest[..open];
        if namespace.is_empty() || name.is_empty() {
            return None;
        }

        let mut fields = Vec::new();
        if !body.trim().is_empty() {
            for part in body.split(',') {
                let (key, value) = part.split_once('=')?;
                fields.push((key.trim(), value.trim()));
            }
        }

        Some(Self {
            namespace,
            name,
            fields,
        })
    }

    pub fn field(&self, key: &str) -> Option<&'a str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    fn number(&self, key: &str) -> Option<u32> {
        self.field(key)?.parse().ok()
    }
}

/// Decode one line into a typed event.
///
/// Returns `None` when the line is not a recognised panel message; this is
/// the normal outcome for traffic the bridge does not model.
pub fn decode(line: &str) -> Option<Event> {
    let msg = RawMessage::parse(line)?;
    if msg.namespace != NAMESPACE {
        return None;
    }

    match msg.name {
        "PartitionStatus" => Some(Event::PartitionStatus {
            partition: msg.number("PartitionNumber")?,
            status: ArmingStatus::from_wire(msg.field("CurrentPartitionArmingStatus")?)?,
        }),
        "PartitionEvent" => Some(Event::PartitionEvent {
            partition: msg.number("PartitionNumber")?,
            status: ArmingStatus::from_wire(msg.field("CurrentPartitionArmingEvent")?)?,
        }),
        "PartitionAlarm" => Some(Event::PartitionAlarm {
            partition: msg.number("PartitionNumber")?,
            active: msg.field("IsPartitionAlarmActive")? == "true",
        }),
        "PartitionReady" => Some(Event::PartitionReady {
            partition: msg.number("PartitionNumber")?,
            ready: msg.field("IsPartitionReady")? == "true",
        }),
        "ZoneStatus" => Some(Event::ZoneStatus {
            zone: msg.number("ZoneNumber")?,
            condition: ZoneCondition::from_wire(msg.field("CurrentZoneStatus")?)?,
            summary: msg.number("ZoneSummary"),
        }),
        "ZoneBypass" => Some(Event::ZoneBypass {
            zone: msg.number("ZoneNumber")?,
            bypassed: msg.field("IsZoneBypassed")? == "true",
        }),
        "OutputStatus" => Some(Event::OutputStatus {
            output: msg.number("OutputNumber")?,
            on: parse_bool(msg.field("IsOutputOn")?)?,
        }),
        _ => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Commands that can be written to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `OutputOn(OutputNumber = <id>)`
    OutputOn { output: u32 },
    /// `OutputOff(OutputNumber = <id>)`
    OutputOff { output: u32 },
    /// `SmartPin(PartitionNumber, MacroName, User, UserCode, ZoneNumber)`.
    /// `User` and `ZoneNumber` are always sent empty.
    SmartPin {
        partition: u32,
        macro_name: Macro,
        code: String,
    },
    /// `ActivateTask(TaskNumber = <id>)`
    ActivateTask { task: u32 },
    /// Keepalive sent by the transport every 15 seconds.
    UpdateSecurityStatus {
        controller_type: String,
        controller_address: String,
        ready_zones: String,
        alarm_zones: String,
    },
}

impl Command {
    /// Convert the command to its wire representation, without terminator.
    pub fn to_wire_string(&self) -> String {
        match self {
            Command::OutputOn { output } => {
                format!("{NAMESPACE}::OutputOn(OutputNumber = {output})")
            }
            Command::OutputOff { output } => {
                format!("{NAMESPACE}::OutputOff(OutputNumber = {output})")
            }
            Command::SmartPin {
                partition,
                macro_name,
                code,
            } => format!(
                "{NAMESPACE}::SmartPin(PartitionNumber = {partition}, MacroName = {}, User = , UserCode = {code}, ZoneNumber = )",
                macro_name.as_str()
            ),
            Command::ActivateTask { task } => {
                format!("{NAMESPACE}::ActivateTask(TaskNumber = {task})")
            }
            Command::UpdateSecurityStatus {
                controller_type,
                controller_address,
                ready_zones,
                alarm_zones,
            } => format!(
                "{NAMESPACE}::UpdateSecurityStatus(ControllerType = {controller_type}, ControllerAddress = {controller_address}, ReadyZones = {ready_zones}, AlarmZones = {alarm_zones})"
            ),
        }
    }

    /// The full line written to the socket, newline-terminated.
    pub fn to_line(&self) -> String {
        let mut line = self.to_wire_string();
        line.push('\n');
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}
