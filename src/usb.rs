//! USB serial device discovery by stable descriptor properties.
//!
//! A `/dev/ttyUSB*` device's kernel name is assigned by plug order and is
//! not stable across reboots or reconnects. This module matches devices by
//! udev properties instead (vendor, interface number, ...), mirroring the
//! original's `pyudev`-based `find_usb_devices`.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{info, warn};
use serde::Deserialize;

/// A set of udev property name/value pairs that must all match for a tty
/// device to be assigned a given logical name. Transparent so the config
/// layer can deserialize it straight from a JSON object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DeviceMatch(pub HashMap<String, String>);

pub trait UsbDeviceFinder: Send + Sync {
    /// Scans attached USB tty devices and returns the logical names (keys
    /// of `defs`) that currently have a matching device plugged in.
    fn find(&self, defs: &HashMap<String, DeviceMatch>) -> HashMap<String, PathBuf>;
}

/// `udev`-backed implementation: enumerates the `tty` subsystem and matches
/// each device's properties against every configured [`DeviceMatch`].
pub struct UdevFinder;

impl UsbDeviceFinder for UdevFinder {
    fn find(&self, defs: &HashMap<String, DeviceMatch>) -> HashMap<String, PathBuf> {
        let mut attached = HashMap::new();

        let mut enumerator = match udev::Enumerator::new() {
            Ok(e) => e,
            Err(e) => {
                warn!("udev enumerator unavailable: {e}");
                return attached;
            }
        };
        if let Err(e) = enumerator.match_subsystem("tty") {
            warn!("udev match_subsystem(tty) failed: {e}");
            return attached;
        }
        let devices = match enumerator.scan_devices() {
            Ok(d) => d,
            Err(e) => {
                warn!("udev scan_devices failed: {e}");
                return attached;
            }
        };

        for device in devices {
            let Some(devnode) = device.devnode() else { continue };
            let devnode_str = devnode.to_string_lossy();
            if !devnode_str.contains("USB") {
                continue;
            }
            info!("detected usb tty {devnode_str}");

            let matched = defs.iter().find(|(_, matcher)| {
                matcher.0.iter().all(|(prop, expected)| {
                    device
                        .property_value(prop)
                        .map(|v| v.to_string_lossy() == expected.as_str())
                        .unwrap_or(false)
                })
            });

            match matched {
                Some((name, _)) => {
                    info!("found {name} matches {devnode_str}");
                    attached.insert(name.clone(), devnode.to_path_buf());
                }
                None => {
                    info!("not configured {devnode_str}");
                }
            }
        }

        attached
    }
}

/// Test double: a fixed mapping of logical name to device path, no actual
/// udev access.
pub struct StaticFinder(pub HashMap<String, PathBuf>);

impl UsbDeviceFinder for StaticFinder {
    fn find(&self, _defs: &HashMap<String, DeviceMatch>) -> HashMap<String, PathBuf> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_finder_returns_its_fixed_mapping_regardless_of_defs() {
        let mut fixed = HashMap::new();
        fixed.insert("compass".to_string(), PathBuf::from("/dev/ttyUSB0"));
        let finder = StaticFinder(fixed.clone());
        assert_eq!(finder.find(&HashMap::new()), fixed);
    }

    #[test]
    fn device_match_deserializes_from_a_flat_json_object() {
        let m: DeviceMatch = serde_json::from_str(
            r#"{"ID_VENDOR": "FTDI", "ID_USB_INTERFACE_NUM": "00"}"#,
        )
        .unwrap();
        assert_eq!(m.0.get("ID_VENDOR").map(String::as_str), Some("FTDI"));
    }
}
