//! Tests for the provisioning sequence
//!
//! The sequence is driven by a recording command runner and a scripted
//! prompter, so no command ever reaches the host. These tests verify:
//! - Interface selection policy as seen in the issued commands
//! - Passphrase confirmation loop
//! - Fatal versus best-effort failure handling
//! - Command ordering of the full run

use anyhow::{anyhow, Result};
use pi_bridge_setup::{
    exit_code_for, CommandLine, CommandOutput, CommandRunner, Config, Outcome, Prompter,
    Provisioner, SetupError,
};
use std::collections::VecDeque;
use std::io;

// =============================================================================
// Test doubles
// =============================================================================

struct FakeRunner {
    issued: Vec<CommandLine>,
    replies: Vec<(String, CommandOutput)>,
}

impl FakeRunner {
    fn new(device_status: &str) -> Self {
        Self {
            issued: Vec::new(),
            replies: vec![
                ("which nmcli".to_string(), CommandOutput::success("/usr/bin/nmcli\n")),
                (
                    "nmcli -t -f DEVICE,TYPE device status".to_string(),
                    CommandOutput::success(device_status),
                ),
            ],
        }
    }

    /// Reply with `output` to any command whose argv contains `needle`.
    /// Later rules win.
    fn reply(mut self, needle: &str, output: CommandOutput) -> Self {
        self.replies.insert(0, (needle.to_string(), output));
        self
    }

    fn lines(&self) -> Vec<String> {
        self.issued.iter().map(joined).collect()
    }

    fn position(&self, needle: &str) -> Option<usize> {
        self.lines().iter().position(|l| l.contains(needle))
    }

    fn count(&self, needle: &str) -> usize {
        self.lines().iter().filter(|l| l.contains(needle)).count()
    }
}

impl CommandRunner for FakeRunner {
    fn execute(&mut self, command: &CommandLine) -> io::Result<CommandOutput> {
        self.issued.push(command.clone());
        let line = joined(command);
        Ok(self
            .replies
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::success("")))
    }
}

fn joined(command: &CommandLine) -> String {
    command.argv().join(" ")
}

struct ScriptedPrompter {
    answers: VecDeque<String>,
    secrets: VecDeque<String>,
    secret_prompts: usize,
}

impl ScriptedPrompter {
    fn new(answers: &[&str], secrets: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|s| s.to_string()).collect(),
            secrets: secrets.iter().map(|s| s.to_string()).collect(),
            secret_prompts: 0,
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer for '{}'", prompt))
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        self.secret_prompts += 1;
        self.secrets
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted secret for '{}'", prompt))
    }
}

const TWO_ETHERNET: &str = "eth0:ethernet\nwlan0:wifi\neth1:ethernet\nlo:loopback\n";

fn standard_prompter() -> ScriptedPrompter {
    ScriptedPrompter::new(&["pi", "HomeNet", "n"], &["Secret123", "Secret123"])
}

fn provision(runner: &mut FakeRunner, prompter: &mut ScriptedPrompter) -> Result<Outcome> {
    let config = Config::default();
    Provisioner::new(runner, prompter, &config).run()
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn test_full_run_orders_bridge_access_point_and_sudoers() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = standard_prompter();

    let outcome = provision(&mut runner, &mut prompter).expect("run should succeed");
    assert_eq!(outcome, Outcome::Completed);

    let eth0 = runner
        .position("sudo nmcli connection add type ethernet ifname eth0 con-name br0-eth0 master br0")
        .expect("eth0 slave attach");
    let eth1 = runner
        .position("sudo nmcli connection add type ethernet ifname eth1 con-name br0-eth1 master br0")
        .expect("eth1 slave attach");
    let ap = runner
        .position("sudo nmcli connection add type wifi ifname wlan0 con-name hotspot ssid HomeNet mode ap")
        .expect("access point profile");
    let enslave = runner
        .position("connection modify hotspot connection.master br0 connection.slave-type bridge")
        .expect("access point bridge association");
    let sudoers = runner
        .position("sudo tee /etc/sudoers.d/nmcli.tmp")
        .expect("sudoers drop-in");

    assert!(eth0 < eth1);
    assert!(eth1 < ap);
    assert!(ap < enslave);
    assert!(enslave < sudoers);

    let tee = &runner.issued[sudoers];
    assert_eq!(
        tee.stdin_data(),
        Some("pi ALL=(ALL) NOPASSWD: /usr/bin/nmcli\n")
    );
}

#[test]
fn test_full_run_issues_steps_in_documented_order() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    let order = [
        "which nmcli",
        "sudo apt update",
        "sudo apt full-upgrade -y",
        "sudo apt install -y network-manager",
        "nmcli -t -f NAME,UUID,TYPE connection show",
        "sudo systemctl stop dhcpcd",
        "sudo systemctl disable dhcpcd",
        "sudo systemctl enable NetworkManager",
        "sudo systemctl start NetworkManager",
        "nmcli -t -f DEVICE,TYPE device status",
        "sudo nmcli connection add type bridge ifname br0 con-name br0 autoconnect yes",
        "sudo nmcli connection modify br0 ipv4.method auto ipv6.method ignore",
        "sudo nmcli connection up br0",
        "sudo nmcli connection up br0-eth0",
        "sudo nmcli connection up br0-eth1",
        "sudo nmcli connection add type wifi",
        "sudo nmcli connection modify hotspot 802-11-wireless.mode ap",
        "sudo nmcli connection modify hotspot wifi-sec.key-mgmt wpa-psk",
        "sudo nmcli connection modify hotspot wifi-sec.psk Secret123",
        "sudo nmcli connection modify hotspot ipv4.method disabled",
        "sudo nmcli connection modify hotspot ipv6.method ignore",
        "sudo nmcli connection modify hotspot connection.autoconnect yes",
        "sudo nmcli connection up hotspot",
        "sudo nmcli device connect wlan0",
        "sudo tee /etc/sudoers.d/nmcli.tmp",
        "sudo chmod 0440 /etc/sudoers.d/nmcli.tmp",
        "sudo visudo -cf /etc/sudoers.d/nmcli.tmp",
        "sudo mv -f /etc/sudoers.d/nmcli.tmp /etc/sudoers.d/nmcli",
        "nmcli connection show",
        "nmcli device status",
        "ip a show br0",
    ];

    let lines = runner.lines();
    let mut cursor = 0;
    for expected in order {
        let found = lines[cursor..]
            .iter()
            .position(|l| l.contains(expected))
            .unwrap_or_else(|| panic!("'{}' not issued after position {}: {:#?}", expected, cursor, lines));
        cursor += found + 1;
    }
    assert_eq!(runner.count("reboot"), 0, "reboot declined");
}

#[test]
fn test_psk_is_passed_but_not_displayed() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    let psk = runner
        .issued
        .iter()
        .find(|c| c.get_args().iter().any(|a| a == "wifi-sec.psk"))
        .expect("psk command");
    assert_eq!(psk.get_args().last().map(String::as_str), Some("Secret123"));
    assert!(!psk.to_string().contains("Secret123"));
}

// =============================================================================
// Interface selection
// =============================================================================

#[test]
fn test_no_ethernet_exits_before_bridge() {
    let mut runner = FakeRunner::new("wlan0:wifi\nlo:loopback\n");
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::NoEthernetInterface)
    ));
    assert_eq!(exit_code_for(&err), 1);
    assert_eq!(runner.count("type bridge"), 0);
    assert_eq!(runner.count("connection add"), 0);
}

#[test]
fn test_failed_device_query_counts_as_no_ethernet() {
    let mut runner = FakeRunner::new("").reply(
        "DEVICE,TYPE device status",
        CommandOutput::failure(8, "NetworkManager is not running"),
    );
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert_eq!(exit_code_for(&err), 1);
    assert_eq!(runner.count("connection add"), 0);
}

#[test]
fn test_single_ethernet_skips_secondary_slave() {
    let mut runner = FakeRunner::new("eth0:ethernet\nwlan0:wifi\n");
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(runner.count("connection add type bridge"), 1);
    assert_eq!(runner.count("connection add type ethernet"), 1);
    assert_eq!(runner.count("br0-eth1"), 0);
    assert_eq!(runner.count("connection up br0-eth0"), 1);
}

#[test]
fn test_extra_ethernet_devices_are_ignored() {
    let mut runner = FakeRunner::new("eth0:ethernet\neth1:ethernet\neth2:ethernet\nwlan0:wifi\n");
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(runner.count("connection add type ethernet"), 2);
    assert_eq!(runner.count("eth2"), 0);
}

#[test]
fn test_first_wifi_device_wins() {
    let mut runner = FakeRunner::new("eth0:ethernet\nwlan1:wifi\nwlan0:wifi\n");
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(runner.count("type wifi ifname wlan1"), 1);
    assert_eq!(runner.count("wlan0"), 0);
}

#[test]
fn test_missing_wifi_exits_before_bridge() {
    let mut runner = FakeRunner::new("eth0:ethernet\n");
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::NoWifiInterface)
    ));
    assert_eq!(runner.count("connection add"), 0);
}

// =============================================================================
// Operator input
// =============================================================================

#[test]
fn test_mismatched_confirmation_prompts_both_again() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = ScriptedPrompter::new(
        &["pi", "HomeNet", "n"],
        &["Abcdefg1", "Abcdefg2", "Secret123", "Secret123"],
    );
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(prompter.secret_prompts, 4);
    assert_eq!(runner.count("wifi-sec.psk Secret123"), 1);
    assert_eq!(runner.count("Abcdefg"), 0);
}

#[test]
fn test_weak_password_prompts_both_again() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = ScriptedPrompter::new(
        &["pi", "HomeNet", "n"],
        &["secret123", "secret123", "Secretxyz", "Secretxyz", "Secret123", "Secret123"],
    );
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(prompter.secret_prompts, 6);
    assert_eq!(runner.count("wifi-sec.psk Secret123"), 1);
}

#[test]
fn test_invalid_username_is_asked_again() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = ScriptedPrompter::new(
        &["pi ALL=(ALL) NOPASSWD: ALL", "  pi  ", "HomeNet", "n"],
        &["Secret123", "Secret123"],
    );
    provision(&mut runner, &mut prompter).unwrap();

    let tee = runner
        .issued
        .iter()
        .find(|c| joined(c).contains("tee"))
        .expect("sudoers write");
    assert_eq!(tee.stdin_data(), Some("pi ALL=(ALL) NOPASSWD: /usr/bin/nmcli\n"));
}

#[test]
fn test_ssid_with_shell_characters_stays_one_argument() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = ScriptedPrompter::new(
        &["pi", "Home'Net; reboot", "n"],
        &["Secret123", "Secret123"],
    );
    provision(&mut runner, &mut prompter).unwrap();

    let ap = runner
        .issued
        .iter()
        .find(|c| joined(c).contains("type wifi"))
        .expect("access point profile");
    let args = ap.get_args();
    let ssid = args.iter().position(|a| a == "ssid").unwrap();
    assert_eq!(args[ssid + 1], "Home'Net; reboot");
    assert_eq!(runner.count("reboot"), 1, "only the ssid mentions reboot");
}

#[test]
fn test_reboot_when_confirmed() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = ScriptedPrompter::new(&["pi", "HomeNet", "Y"], &["Secret123", "Secret123"]);

    let outcome = provision(&mut runner, &mut prompter).unwrap();
    assert_eq!(outcome, Outcome::RebootIssued);
    assert_eq!(runner.lines().last().map(String::as_str), Some("sudo reboot"));
}

// =============================================================================
// Failure handling
// =============================================================================

#[test]
fn test_fatal_failure_halts_immediately() {
    let mut runner = FakeRunner::new(TWO_ETHERNET).reply(
        "apt install",
        CommandOutput::failure(100, "E: Unable to locate package hostapd"),
    );
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert_eq!(exit_code_for(&err), 100);
    assert!(runner.lines().last().unwrap().starts_with("sudo apt install -y"));
    assert_eq!(runner.count("systemctl"), 0);
    assert_eq!(runner.count("connection add"), 0);
}

#[test]
fn test_missing_nmcli_is_a_precondition_failure() {
    let mut runner = FakeRunner::new(TWO_ETHERNET).reply("which nmcli", CommandOutput::failure(1, ""));
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SetupError>(),
        Some(SetupError::MissingPrerequisite(_))
    ));
    assert_eq!(exit_code_for(&err), 1);
    assert_eq!(runner.lines(), vec!["which nmcli"]);
}

#[test]
fn test_best_effort_failures_are_tolerated() {
    let mut runner = FakeRunner::new(TWO_ETHERNET)
        .reply("systemctl stop dhcpcd", CommandOutput::failure(5, "Unit dhcpcd.service not loaded."))
        .reply("systemctl disable dhcpcd", CommandOutput::failure(1, "not found"))
        .reply("device connect", CommandOutput::failure(10, "busy"));
    let mut prompter = standard_prompter();

    assert_eq!(provision(&mut runner, &mut prompter).unwrap(), Outcome::Completed);
    assert_eq!(runner.count("visudo"), 1);
}

#[test]
fn test_failed_network_service_start_is_fatal() {
    let mut runner = FakeRunner::new(TWO_ETHERNET)
        .reply("systemctl start NetworkManager", CommandOutput::failure(4, "no such unit"));
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert_eq!(exit_code_for(&err), 4);
    assert_eq!(runner.count("device status"), 0);
}

#[test]
fn test_rejected_sudoers_file_is_fatal() {
    let mut runner = FakeRunner::new(TWO_ETHERNET)
        .reply("visudo", CommandOutput::failure(1, "parse error"));
    let mut prompter = standard_prompter();

    let err = provision(&mut runner, &mut prompter).unwrap_err();
    assert_eq!(exit_code_for(&err), 1);
    assert!(format!("{:#}", err).contains("failed validation"));
    assert_eq!(runner.count("nmcli connection show"), 0);

    // The rule was only ever staged, never written to the live drop-in.
    let live = runner
        .issued
        .iter()
        .filter(|c| c.get_args().iter().any(|a| a == "/etc/sudoers.d/nmcli"))
        .count();
    assert_eq!(live, 0, "live sudoers path touched: {:#?}", runner.lines());
    assert_eq!(runner.count("mv -f"), 0);
    assert_eq!(
        runner.lines().last().map(String::as_str),
        Some("sudo rm -f /etc/sudoers.d/nmcli.tmp")
    );
}

#[test]
fn test_sudoers_drop_in_is_validated_before_install() {
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    let visudo = runner.position("visudo -cf /etc/sudoers.d/nmcli.tmp").expect("visudo check");
    let install = runner
        .position("mv -f /etc/sudoers.d/nmcli.tmp /etc/sudoers.d/nmcli")
        .expect("install into place");
    assert!(visudo < install);
    assert_eq!(runner.count("rm -f"), 0);
}

// =============================================================================
// Connection cleanup
// =============================================================================

#[test]
fn test_cleanup_deletes_everything_but_loopback() {
    let listing = "Wired connection 1:aaaa-1:802-3-ethernet\nlo:bbbb-2:loopback\npreconfigured:cccc-3:802-11-wireless\n";
    let mut runner = FakeRunner::new(TWO_ETHERNET)
        .reply("NAME,UUID,TYPE", CommandOutput::success(listing));
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    let delete = runner
        .issued
        .iter()
        .find(|c| joined(c).contains("connection delete"))
        .expect("delete command");
    assert_eq!(
        delete.argv(),
        vec!["sudo", "nmcli", "connection", "delete", "aaaa-1", "cccc-3"]
    );
}

#[test]
fn test_cleanup_skipped_when_only_loopback() {
    let mut runner = FakeRunner::new(TWO_ETHERNET)
        .reply("NAME,UUID,TYPE", CommandOutput::success("lo:bbbb-2:loopback\n"));
    let mut prompter = standard_prompter();
    provision(&mut runner, &mut prompter).unwrap();

    assert_eq!(runner.count("connection delete"), 0);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_custom_names_without_sudo() {
    let config = Config {
        bridge_name: "lan0".to_string(),
        hotspot_name: "ap".to_string(),
        use_sudo: false,
        ..Config::default()
    };
    let mut runner = FakeRunner::new(TWO_ETHERNET);
    let mut prompter = standard_prompter();

    Provisioner::new(&mut runner, &mut prompter, &config)
        .run()
        .unwrap();

    assert!(runner.lines().iter().all(|l| !l.starts_with("sudo")));
    assert_eq!(runner.count("nmcli connection add type bridge ifname lan0 con-name lan0"), 1);
    assert_eq!(runner.count("con-name lan0-eth1 master lan0"), 1);
    assert_eq!(runner.count("connection modify ap connection.master lan0"), 1);
    assert_eq!(runner.count("ip a show lan0"), 1);
}
