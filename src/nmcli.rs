//! The `nmcli` command surface used by the setup.
//!
//! Each function returns a [`CommandLine`]; nothing here executes anything.
//! Mutating commands go through `sudo` when `use_sudo` is set, queries run
//! unprivileged the way an operator would type them.

use crate::command::CommandLine;

const NMCLI: &str = "nmcli";

/// A connection profile as listed by `nmcli -t -f NAME,UUID,TYPE connection show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub uuid: String,
    pub kind: String,
}

impl ConnectionProfile {
    pub fn is_loopback(&self) -> bool {
        self.kind == "loopback" || self.name == "lo"
    }
}

/// Split one line of terse output into fields.
///
/// Fields are separated by `:`; a literal colon or backslash inside a value is
/// escaped with a backslash.
pub fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// `nmcli -t -f DEVICE,TYPE device status`
pub fn device_status_terse() -> CommandLine {
    CommandLine::new(NMCLI)
        .args(["-t", "-f", "DEVICE,TYPE", "device", "status"])
        .query()
}

/// `nmcli device status` (human readable)
pub fn device_status() -> CommandLine {
    CommandLine::new(NMCLI).args(["device", "status"]).query()
}

/// `nmcli connection show` (human readable)
pub fn connection_show() -> CommandLine {
    CommandLine::new(NMCLI).args(["connection", "show"]).query()
}

/// `nmcli -t -f NAME,UUID,TYPE connection show`
pub fn connection_list() -> CommandLine {
    CommandLine::new(NMCLI)
        .args(["-t", "-f", "NAME,UUID,TYPE", "connection", "show"])
        .query()
}

/// Parse the output of [`connection_list`].
pub fn parse_connection_list(output: &str) -> Vec<ConnectionProfile> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields = split_terse(line);
            match fields.as_slice() {
                [name, uuid, kind, ..] => Some(ConnectionProfile {
                    name: name.clone(),
                    uuid: uuid.clone(),
                    kind: kind.clone(),
                }),
                _ => None,
            }
        })
        .collect()
}

/// `nmcli connection delete <uuid>...`
pub fn connection_delete<'a>(uuids: impl IntoIterator<Item = &'a str>, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo)
        .args(["connection", "delete"])
        .args(uuids)
}

/// `nmcli connection add type bridge ifname <bridge> con-name <bridge> autoconnect yes`
pub fn bridge_add(bridge: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo).args([
        "connection",
        "add",
        "type",
        "bridge",
        "ifname",
        bridge,
        "con-name",
        bridge,
        "autoconnect",
        "yes",
    ])
}

/// `nmcli connection add type ethernet ifname <iface> con-name <name> master <bridge> autoconnect yes`
pub fn bridge_slave_add(iface: &str, con_name: &str, bridge: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo).args([
        "connection",
        "add",
        "type",
        "ethernet",
        "ifname",
        iface,
        "con-name",
        con_name,
        "master",
        bridge,
        "autoconnect",
        "yes",
    ])
}

/// `nmcli connection add type wifi ifname <iface> con-name <name> ssid <ssid> mode ap`
pub fn access_point_add(iface: &str, con_name: &str, ssid: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo).args([
        "connection",
        "add",
        "type",
        "wifi",
        "ifname",
        iface,
        "con-name",
        con_name,
        "ssid",
        ssid,
        "mode",
        "ap",
    ])
}

/// `nmcli connection modify <name> <key> <value> [<key> <value>...]`
pub fn connection_modify(con_name: &str, settings: &[(&str, &str)], use_sudo: bool) -> CommandLine {
    settings.iter().fold(
        CommandLine::privileged(NMCLI, use_sudo).args(["connection", "modify", con_name]),
        |cmd, (key, value)| cmd.arg(*key).arg(*value),
    )
}

/// `nmcli connection modify <name> wifi-sec.psk <psk>` with the key redacted in output.
pub fn set_psk(con_name: &str, psk: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo)
        .args(["connection", "modify", con_name, "wifi-sec.psk"])
        .secret_arg(psk)
}

/// `nmcli connection up <name>`
pub fn connection_up(con_name: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo).args(["connection", "up", con_name])
}

/// `nmcli device connect <iface>`
pub fn device_connect(iface: &str, use_sudo: bool) -> CommandLine {
    CommandLine::privileged(NMCLI, use_sudo).args(["device", "connect", iface])
}
