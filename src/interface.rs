use anyhow::Result;
use tracing::{debug, info};

use crate::command::{self, Check, CommandRunner};
use crate::error::SetupError;
use crate::nmcli;

/// Devices reported by `nmcli device status`, split by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedDevices {
    /// Every `ethernet` device, in listed order.
    pub ethernet: Vec<String>,
    /// The first `wifi` device.
    pub wifi: Option<String>,
}

/// Interfaces the bridge and access point will be built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacePlan {
    pub primary: String,
    pub secondary: Option<String>,
    pub wifi: String,
}

impl InterfacePlan {
    /// Ethernet interfaces to enslave to the bridge, primary first.
    pub fn ethernet(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.secondary.as_deref())
            .collect()
    }
}

/// Parse `nmcli -t -f DEVICE,TYPE device status` output.
pub fn parse_device_status(output: &str) -> DetectedDevices {
    let mut devices = DetectedDevices::default();

    for line in output.lines() {
        let fields = nmcli::split_terse(line);
        let [name, kind, ..] = fields.as_slice() else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        match kind.as_str() {
            "ethernet" => devices.ethernet.push(name.clone()),
            "wifi" if devices.wifi.is_none() => devices.wifi = Some(name.clone()),
            "wifi" => debug!(device = %name, "ignoring additional WiFi device"),
            _ => {}
        }
    }

    devices
}

/// Query the device list. A failing query yields no devices.
pub fn detect_devices<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<DetectedDevices> {
    let output = command::run(runner, &nmcli::device_status_terse(), Check::BestEffort)?;
    Ok(parse_device_status(&output))
}

/// Apply the selection policy to the detected devices.
///
/// No Ethernet device is fatal ([`SetupError::NoEthernetInterface`]). A single
/// one is accepted with a warning and the secondary slave is skipped. Beyond
/// two, the extras are ignored. A missing WiFi device is also fatal
/// ([`SetupError::NoWifiInterface`]), so the caller fails before issuing any
/// bridge command.
pub fn plan_interfaces(devices: DetectedDevices) -> Result<InterfacePlan> {
    let mut ethernet = devices.ethernet.into_iter();

    let primary = ethernet.next().ok_or(SetupError::NoEthernetInterface)?;
    let secondary = ethernet.next();
    let ignored: Vec<String> = ethernet.collect();
    if !ignored.is_empty() {
        debug!(?ignored, "ignoring Ethernet devices beyond the second");
    }

    if secondary.is_none() {
        println!(
            "[WARN] Only one Ethernet detected ({}). Secondary slave will be skipped.",
            primary
        );
    }

    let wifi = devices.wifi.ok_or(SetupError::NoWifiInterface)?;

    info!(%primary, secondary = ?secondary, %wifi, "interfaces selected");
    Ok(InterfacePlan {
        primary,
        secondary,
        wifi,
    })
}

/// Detect devices and choose the interfaces to configure.
pub fn detect_interfaces<R: CommandRunner + ?Sized>(runner: &mut R) -> Result<InterfacePlan> {
    plan_interfaces(detect_devices(runner)?)
}
