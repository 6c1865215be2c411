// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static device configuration.
//!
//! `devices.json` (an array of descriptors) and `rules.json` are loaded once
//! at startup; the registry is immutable afterwards. All runtime mutability
//! lives in [`crate::context::HomeContext`] and the rule engine.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::HomeError;
use crate::rules::Rule;

/// Device categories known to the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Light,
    Lock,
    Cover,
    Switch,
    Thermostat,
    Siren,
    Sensor,
    Camera,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Lock => "lock",
            Self::Cover => "cover",
            Self::Switch => "switch",
            Self::Thermostat => "thermostat",
            Self::Siren => "siren",
            Self::Sensor => "sensor",
            Self::Camera => "camera",
        }
    }
}

/// Broker subjects a device listens and reports on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topics {
    pub set: String,
    pub state: String,
}

/// A static device descriptor from `devices.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub topics: Topics,
}

/// Immutable `device_id → descriptor` mapping.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, Device>,
}

impl DeviceRegistry {
    /// Build a registry from a descriptor list, rejecting duplicate IDs.
    pub fn from_devices(devices: Vec<Device>) -> Result<Self, HomeError> {
        let mut map = HashMap::with_capacity(devices.len());
        for device in devices {
            let id = device.id.clone();
            if map.insert(id.clone(), device).is_some() {
                return Err(HomeError::ConfigInvalid(format!("duplicate device id: {id}")));
            }
        }
        Ok(Self { devices: map })
    }

    /// Load `devices.json` from the config directory.
    pub fn load(config_dir: &Path) -> Result<Self, HomeError> {
        let path = config_dir.join("devices.json");
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            HomeError::ConfigInvalid(format!("cannot read {}: {e}", path.display()))
        })?;
        let devices: Vec<Device> = serde_json::from_str(&contents).map_err(|e| {
            HomeError::ConfigInvalid(format!("cannot parse {}: {e}", path.display()))
        })?;
        Self::from_devices(devices)
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }
}

/// Load the initial rule list from `rules.json` in the config directory.
pub fn load_rules(config_dir: &Path) -> Result<Vec<Rule>, HomeError> {
    let path = config_dir.join("rules.json");
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| HomeError::ConfigInvalid(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&contents)
        .map_err(|e| HomeError::ConfigInvalid(format!("cannot parse {}: {e}", path.display())))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
