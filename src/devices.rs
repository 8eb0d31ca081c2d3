//! Audio device boundary
//!
//! Capture itself lives outside this crate; the core only needs descriptors
//! to stamp on new recordings.

use anyhow::{anyhow, Result};

use crate::database::{AudioDeviceInfo, DeviceType};

pub trait DeviceProvider: Send + Sync {
    fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>>;

    fn default_device(&self) -> Result<AudioDeviceInfo> {
        self.list_devices()?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No audio input devices available"))
    }
}

/// The device reported when nothing better is known
pub fn fallback_device() -> AudioDeviceInfo {
    AudioDeviceInfo {
        device_id: "0".to_string(),
        name: "Default Microphone".to_string(),
        sample_rate: 44100,
        channels: 2,
        device_type: DeviceType::Microphone,
    }
}

/// Fixed device list
pub struct StaticDeviceProvider {
    devices: Vec<AudioDeviceInfo>,
}

impl StaticDeviceProvider {
    pub fn new(devices: Vec<AudioDeviceInfo>) -> Self {
        Self { devices }
    }
}

impl Default for StaticDeviceProvider {
    fn default() -> Self {
        Self::new(vec![fallback_device()])
    }
}

impl DeviceProvider for StaticDeviceProvider {
    fn list_devices(&self) -> Result<Vec<AudioDeviceInfo>> {
        Ok(self.devices.clone())
    }
}
