//! Host facts reported to the twin and sampled for heartbeats.

use serde::Serialize;
use sysinfo::System;

const UNKNOWN: &str = "Unknown";

/// Device properties published once the module is ready.
///
/// Memory figures are in KB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostProperties {
    pub hostname: String,
    pub processor_architecture: String,
    pub platform: String,
    pub os_type: String,
    pub os_name: String,
    pub total_memory: u64,
    pub sw_version: String,
}

impl HostProperties {
    pub fn collect() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        Self {
            hostname: System::host_name().unwrap_or_else(|| UNKNOWN.to_string()),
            processor_architecture: std::env::consts::ARCH.to_string(),
            platform: std::env::consts::OS.to_string(),
            os_type: System::name().unwrap_or_else(|| UNKNOWN.to_string()),
            os_name: System::kernel_version().unwrap_or_else(|| UNKNOWN.to_string()),
            total_memory: system.total_memory() / 1024,
            sw_version: System::long_os_version().unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}

/// Memory currently available to new work, in KB. Zero when unreadable.
pub fn free_memory_kb() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory() / 1024
}
