//! Client identity: product tag plus a stable hardware address.

use std::fs;
use std::path::Path;
use tracing::debug;

const NET_CLASS_DIR: &str = "/sys/class/net";
const FALLBACK_ADDRESS: &str = "00:00:00:00:00:00";

pub fn client_id(tag: &str, address: &str) -> String {
    format!("{}{}", tag, address.to_uppercase())
}

/// Address of the first non-loopback interface, by interface name
pub fn hardware_address() -> Option<String> {
    read_hardware_address(Path::new(NET_CLASS_DIR))
}

/// Configured address, else the detected one, else all zeros
pub fn resolve_address(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(hardware_address)
        .unwrap_or_else(|| FALLBACK_ADDRESS.to_string())
}

fn read_hardware_address(net_dir: &Path) -> Option<String> {
    let mut interfaces: Vec<_> = fs::read_dir(net_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    interfaces.sort();

    interfaces.into_iter().find_map(|iface| {
        if iface.file_name().is_some_and(|name| name == "lo") {
            return None;
        }
        let address = fs::read_to_string(iface.join("address")).ok()?;
        let address = address.trim();
        if address.is_empty() || address == FALLBACK_ADDRESS {
            return None;
        }
        debug!("Using hardware address {} of {}", address, iface.display());
        Some(address.to_string())
    })
}
