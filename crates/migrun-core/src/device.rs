//! Device registry: GPU or MIG slice ids and how many workers each may run at once.
//!
//! The registry is built once from configuration and never changes during a
//! run. Registry order is the tie-break order used by the dispatch loop.

use std::collections::HashSet;

use crate::config::ConfigError;

/// A GPU or MIG device and its concurrency ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Identifier passed to workers via `CUDA_VISIBLE_DEVICES`.
    pub name: String,
    /// Maximum number of jobs running on this device at once.
    pub capacity: usize,
}

impl Device {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
        }
    }
}

/// Validated, ordered list of devices.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    /// Validate and wrap `devices`: at least one device, unique names, capacity >= 1.
    pub fn new(devices: Vec<Device>) -> Result<Self, ConfigError> {
        if devices.is_empty() {
            return Err(ConfigError::NoDevices);
        }
        let mut seen = HashSet::new();
        for d in &devices {
            if !seen.insert(d.name.as_str()) {
                return Err(ConfigError::DuplicateDevice(d.name.clone()));
            }
            if d.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(d.name.clone()));
            }
        }
        Ok(Self { devices })
    }

    /// Pair device names with capacities. An empty capacity list means one job per device.
    pub fn from_lists(names: &[String], capacities: &[usize]) -> Result<Self, ConfigError> {
        if !capacities.is_empty() && capacities.len() != names.len() {
            return Err(ConfigError::CapacityMismatch {
                devices: names.len(),
                capacities: capacities.len(),
            });
        }
        let devices = names
            .iter()
            .enumerate()
            .map(|(i, name)| Device::new(name.clone(), capacities.get(i).copied().unwrap_or(1)))
            .collect();
        Self::new(devices)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Sum of all device capacities (upper bound on concurrently running workers).
    pub fn total_capacity(&self) -> usize {
        self.devices.iter().map(|d| d.capacity).sum()
    }
}

/// Split a comma separated list (`"MIG-a,MIG-b"`), trimming blanks.
pub fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma separated list of capacities (`"2,3"`).
pub fn parse_capacities(s: &str) -> Result<Vec<usize>, ConfigError> {
    parse_list(s)
        .into_iter()
        .map(|x| {
            x.parse::<usize>()
                .map_err(|_| ConfigError::InvalidCapacity(x.clone()))
        })
        .collect()
}
