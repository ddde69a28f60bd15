// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::{BridgeError, Result};
use crate::protocol::Macro;

/// Sensor semantics of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
pub enum ZoneKind {
    /// Unsealed means motion detected.
    Motion,
    /// Unsealed means contact open.
    Contact,
}

/// Actuator driven by a panel output relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, serde::Serialize)]
pub enum OutputKind {
    Door,
    GarageDoorOpener,
    Switch,
}

/// What a logical arming mode (stay/away/night) resolves to on the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ModeBinding {
    ArmStay,
    ArmStayInstant,
    ArmAway,
    ArmNight,
    ArmNightInstant,
    /// The mode is not selectable by the host.
    Hidden,
}

impl ModeBinding {
    /// The macro this binding submits, or `None` when hidden.
    pub fn macro_name(&self) -> Option<Macro> {
        match self {
            Self::ArmStay => Some(Macro::ArmStay),
            Self::ArmStayInstant => Some(Macro::ArmStayInstant),
            Self::ArmAway => Some(Macro::ArmAway),
            Self::ArmNight => Some(Macro::ArmNight),
            Self::ArmNightInstant => Some(Macro::ArmNightInstant),
            Self::Hidden => None,
        }
    }
}

/// Panel link settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// First field of the `UpdateSecurityStatus` keepalive
    pub controller_type: String,
    /// Panel integration service host (default: 127.0.0.1)
    pub address: String,
    /// Panel integration service port (default: 12321)
    pub port: u16,
    /// `ReadyZones` field of the keepalive
    pub ready_zones: String,
    /// `AlarmZones` field of the keepalive
    pub alarm_zones: String,
    /// Delay between a closed link and the next dial (default: 10000)
    pub reconnect_delay_ms: u64,
    /// Read inactivity after which the socket is torn down (default: 60000)
    pub idle_timeout_ms: u64,
    /// Keepalive period (default: 15000)
    pub keepalive_interval_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            controller_type: "HOMEBRIDGE".to_string(),
            address: "127.0.0.1".to_string(),
            port: 12321,
            ready_zones: String::new(),
            alarm_zones: String::new(),
            reconnect_delay_ms: 10_000,
            idle_timeout_ms: 60_000,
            keepalive_interval_ms: 15_000,
        }
    }
}

impl LinkConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::default()
    }

    /// `host:port` as sent in the keepalive and used for dialling.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Builder for LinkConfig.
#[derive(Debug, Clone, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    pub fn controller_type(mut self, controller_type: impl Into<String>) -> Self {
        self.config.controller_type = controller_type.into();
        self
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.config.address = address.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn ready_zones(mut self, zones: impl Into<String>) -> Self {
        self.config.ready_zones = zones.into();
        self
    }

    pub fn alarm_zones(mut self, zones: impl Into<String>) -> Self {
        self.config.alarm_zones = zones.into();
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn idle_timeout_ms(mut self, ms: u64) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    pub fn keepalive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keepalive_interval_ms = ms;
        self
    }

    pub fn build(self) -> LinkConfig {
        self.config
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ZoneKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub number: u32,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: OutputKind,
    /// Zone whose sealed state this output tracks. `0` means none.
    #[serde(default)]
    pub zone: Option<u32>,
    /// Zone shared by mutually exclusive outputs. Falls back to `zone`.
    #[serde(default)]
    pub group_zone: Option<u32>,
    /// Drive time in seconds; makes the output time-driven.
    #[serde(default)]
    pub duration: Option<u64>,
    /// Absolute target position the output aligns to when driven.
    #[serde(default)]
    pub target: Option<u8>,
    /// Debounce zone changes for 2s. Defaults on for doors, off for switches.
    #[serde(default)]
    pub debounce: Option<bool>,
}

impl OutputConfig {
    pub fn new(number: u32, kind: OutputKind) -> Self {
        Self {
            number,
            name: String::new(),
            kind,
            zone: None,
            group_zone: None,
            duration: None,
            target: None,
            debounce: None,
        }
    }

    pub fn with_zone(mut self, zone: u32) -> Self {
        self.zone = Some(zone);
        self
    }

    pub fn with_group_zone(mut self, zone: u32) -> Self {
        self.group_zone = Some(zone);
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration = Some(secs);
        self
    }

    pub fn with_target(mut self, target: u8) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_debounce(mut self, debounce: bool) -> Self {
        self.debounce = Some(debounce);
        self
    }

    /// The zone this output follows, ignoring the `0` placeholder.
    pub fn tracking_zone(&self) -> Option<u32> {
        self.zone.filter(|z| *z != 0)
    }

    /// The zone keying the mutual-exclusion group.
    pub fn exclusion_zone(&self) -> Option<u32> {
        self.group_zone
            .filter(|z| *z != 0)
            .or_else(|| self.tracking_zone())
    }

    /// The zone whose status is fanned out to this output. An output with
    /// only a group zone follows that zone.
    pub fn followed_zone(&self) -> Option<u32> {
        self.tracking_zone()
            .or_else(|| self.group_zone.filter(|z| *z != 0))
    }

    pub fn debounce_enabled(&self) -> bool {
        self.debounce
            .unwrap_or(!matches!(self.kind, OutputKind::Switch))
    }

    pub fn duration_secs(&self) -> Option<u64> {
        self.duration.filter(|d| *d != 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    pub number: u32,
    #[serde(default)]
    pub name: String,
    /// User code sent with every SmartPin
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_stay_mode")]
    pub stay_mode: ModeBinding,
    #[serde(default = "default_away_mode")]
    pub away_mode: ModeBinding,
    #[serde(default = "default_night_mode")]
    pub night_mode: ModeBinding,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

fn default_stay_mode() -> ModeBinding {
    ModeBinding::ArmStay
}

fn default_away_mode() -> ModeBinding {
    ModeBinding::ArmAway
}

fn default_night_mode() -> ModeBinding {
    ModeBinding::Hidden
}

impl PartitionConfig {
    pub fn new(number: u32, code: impl Into<String>) -> Self {
        Self {
            number,
            name: String::new(),
            code: code.into(),
            stay_mode: default_stay_mode(),
            away_mode: default_away_mode(),
            night_mode: default_night_mode(),
            zones: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub number: u32,
    #[serde(default)]
    pub name: String,
}

/// Everything the registry is built from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

impl DeviceConfig {
    pub fn zones(&self) -> impl Iterator<Item = &ZoneConfig> {
        self.partitions.iter().flat_map(|p| p.zones.iter())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputConfig> {
        self.partitions.iter().flat_map(|p| p.outputs.iter())
    }

    /// Reject duplicate device numbers and dangling zone references.
    pub fn validate(&self) -> Result<()> {
        unique("partition", self.partitions.iter().map(|p| p.number))?;
        unique("zone", self.zones().map(|z| z.number))?;
        unique("output", self.outputs().map(|o| o.number))?;
        unique("task", self.tasks.iter().map(|t| t.number))?;

        let zones: HashSet<u32> = self.zones().map(|z| z.number).collect();
        for output in self.outputs() {
            if let Some(zone) = output.tracking_zone()
                && !zones.contains(&zone)
            {
                return Err(BridgeError::invalid_config(format!(
                    "output {} tracks undeclared zone {}",
                    output.number, zone
                )));
            }
            if let Some(zone) = output.group_zone.filter(|z| *z != 0)
                && !zones.contains(&zone)
            {
                return Err(BridgeError::invalid_config(format!(
                    "output {} is grouped on undeclared zone {}",
                    output.number, zone
                )));
            }
            if let Some(target) = output.target
                && target > 100
            {
                return Err(BridgeError::invalid_config(format!(
                    "output {} target {} is outside 0..=100",
                    output.number, target
                )));
            }
        }
        Ok(())
    }
}

fn unique(what: &str, numbers: impl Iterator<Item = u32>) -> Result<()> {
    let mut seen = HashSet::new();
    for n in numbers {
        if !seen.insert(n) {
            return Err(BridgeError::invalid_config(format!(
                "duplicate {what} number {n}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[link]
address = "10.0.0.9"
ready_zones = "1,2"

[[partitions]]
number = 1
code = "1234"
night_mode = "ArmNightInstant"

  [[partitions.zones]]
  number = 2
  type = "Contact"

  [[partitions.outputs]]
  number = 5
  type = "Door"
  zone = 2
  group_zone = 2
  duration = 10

  [[partitions.outputs]]
  number = 6
  type = "Switch"
  group_zone = 2

[[tasks]]
number = 3
"#;

    #[test]
    fn test_parse_sample() {
        let cfg: DeviceConfig = toml::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.link.address, "10.0.0.9");
        assert_eq!(cfg.link.port, 12321);
        assert_eq!(cfg.link.reconnect_delay_ms, 10_000);

        let p = &cfg.partitions[0];
        assert_eq!(p.stay_mode, ModeBinding::ArmStay);
        assert_eq!(p.away_mode, ModeBinding::ArmAway);
        assert_eq!(p.night_mode, ModeBinding::ArmNightInstant);

        let door = &p.outputs[0];
        assert_eq!(door.kind, OutputKind::Door);
        assert_eq!(door.exclusion_zone(), Some(2));
        assert!(door.debounce_enabled());

        let switch = &p.outputs[1];
        assert_eq!(switch.tracking_zone(), None);
        assert_eq!(switch.exclusion_zone(), Some(2));
        assert_eq!(switch.followed_zone(), Some(2));
        assert!(!switch.debounce_enabled());

        assert_eq!(cfg.tasks[0].number, 3);
    }

    #[test]
    fn test_zero_zone_means_none() {
        let out = OutputConfig::new(1, OutputKind::Door).with_zone(0);
        assert_eq!(out.tracking_zone(), None);
        assert_eq!(out.exclusion_zone(), None);
        let out = out.with_group_zone(4);
        assert_eq!(out.exclusion_zone(), Some(4));
    }

    #[test]
    fn test_default_night_mode_hidden() {
        let p = PartitionConfig::new(1, "0000");
        assert_eq!(p.night_mode, ModeBinding::Hidden);
        assert_eq!(p.night_mode.macro_name(), None);
        assert_eq!(ModeBinding::ArmStayInstant.macro_name(), Some(Macro::ArmStayInstant));
    }

    #[test]
    fn test_validate_duplicate_output() {
        let mut p = PartitionConfig::new(1, "");
        p.outputs.push(OutputConfig::new(5, OutputKind::Switch));
        p.outputs.push(OutputConfig::new(5, OutputKind::Door));
        let cfg = DeviceConfig {
            partitions: vec![p],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig { .. }));
        assert!(err.to_string().contains("duplicate output number 5"));
    }

    #[test]
    fn test_validate_undeclared_zone() {
        let mut p = PartitionConfig::new(1, "");
        p.outputs.push(OutputConfig::new(5, OutputKind::Door).with_zone(9));
        let cfg = DeviceConfig {
            partitions: vec![p],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_undeclared_group_zone() {
        let mut p = PartitionConfig::new(1, "");
        p.zones.push(ZoneConfig {
            number: 2,
            name: String::new(),
            kind: ZoneKind::Contact,
        });
        p.outputs.push(
            OutputConfig::new(5, OutputKind::Door)
                .with_zone(2)
                .with_group_zone(12),
        );
        let cfg = DeviceConfig {
            partitions: vec![p],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("grouped on undeclared zone 12"));

        let mut cfg = cfg;
        cfg.partitions[0].outputs[0].group_zone = Some(2);
        assert!(cfg.validate().is_ok());
        cfg.partitions[0].outputs[0].group_zone = Some(0);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_target_range() {
        let mut p = PartitionConfig::new(1, "");
        p.outputs.push(OutputConfig::new(5, OutputKind::Door).with_target(150));
        let cfg = DeviceConfig {
            partitions: vec![p],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_link_builder() {
        let link = LinkConfig::builder()
            .address("192.168.1.50")
            .port(4000)
            .keepalive_interval_ms(1000)
            .build();
        assert_eq!(link.endpoint(), "192.168.1.50:4000");
        assert_eq!(link.keepalive_interval_ms, 1000);
        assert_eq!(link.idle_timeout_ms, 60_000);
    }
}
