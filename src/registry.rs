// MIT License - Copyright (c) 2026 envy-lan-bridge contributors
// Envy panel bridge

//! Table of every configured device, built once at startup.
//!
//! Besides the ID maps the registry holds two adjacency maps derived from
//! output configuration: which outputs follow a zone (for zone fan-out) and
//! which outputs share a mutual-exclusion group. Both are read-only after
//! construction.

use std::collections::BTreeMap;

use crate::config::DeviceConfig;
use crate::devices::{Output, Partition, Task, Zone};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct Registry {
    partitions: BTreeMap<u32, Partition>,
    zones: BTreeMap<u32, Zone>,
    outputs: BTreeMap<u32, Output>,
    tasks: BTreeMap<u32, Task>,
    /// zone -> outputs following it
    watchers: BTreeMap<u32, Vec<u32>>,
    /// group zone -> outputs sharing it
    groups: BTreeMap<u32, Vec<u32>>,
}

impl Registry {
    /// Validate `config` and build every device from it.
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        let mut registry = Self::default();
        for p in &config.partitions {
            registry.partitions.insert(p.number, Partition::new(p));
        }
        for z in config.zones() {
            registry.zones.insert(z.number, Zone::new(z));
        }
        for o in config.outputs() {
            let output = Output::from_config(o);
            if let Some(zone) = output.zone() {
                registry.watchers.entry(zone).or_default().push(o.number);
            }
            if let Some(group) = output.group() {
                registry.groups.entry(group).or_default().push(o.number);
            }
            registry.outputs.insert(o.number, output);
        }
        for t in &config.tasks {
            registry.tasks.insert(t.number, Task::new(t));
        }
        Ok(registry)
    }

    pub fn partition(&self, id: u32) -> Option<&Partition> {
        self.partitions.get(&id)
    }

    pub fn partition_mut(&mut self, id: u32) -> Option<&mut Partition> {
        self.partitions.get_mut(&id)
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn zone(&self, id: u32) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn zone_mut(&mut self, id: u32) -> Option<&mut Zone> {
        self.zones.get_mut(&id)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    pub fn output(&self, id: u32) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn output_mut(&mut self, id: u32) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (u32, &Output)> {
        self.outputs.iter().map(|(id, o)| (*id, o))
    }

    pub fn task(&self, id: u32) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: u32) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    /// Outputs following `zone`.
    pub fn zone_watchers(&self, zone: u32) -> &[u32] {
        self.watchers.get(&zone).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Other outputs in the same exclusion group as `output`. Never contains
    /// `output` itself; empty for unknown or ungrouped outputs.
    pub fn siblings(&self, output: u32) -> Vec<u32> {
        let Some(group) = self.outputs.get(&output).and_then(Output::group) else {
            return Vec::new();
        };
        self.groups
            .get(&group)
            .map(|members| members.iter().copied().filter(|id| *id != output).collect())
            .unwrap_or_default()
    }
}
