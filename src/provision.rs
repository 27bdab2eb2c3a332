//! The provisioning sequence.
//!
//! [`Provisioner::run`] walks the steps in a fixed order. A step either aborts
//! the run by returning an error ([`Check::Fatal`]) or tolerates failure
//! ([`Check::BestEffort`]). Nothing is retried and nothing is rolled back:
//! after a fatal error the system stays as the last completed step left it.

use anyhow::{Context, Result};
use console::style;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::command::{self, Check, CommandLine, CommandRunner};
use crate::config::Config;
use crate::error::SetupError;
use crate::interface::{self, InterfacePlan};
use crate::nmcli;
use crate::prompt::Prompter;
use crate::validate;

/// Provisioning steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CheckPrerequisites,
    AskSudoUser,
    UpgradeSystem,
    InstallPackages,
    RemoveConnections,
    DisableLegacyDhcp,
    StartNetworkManager,
    DetectInterfaces,
    CreateBridge,
    ConfigureBridgeAddressing,
    ActivateBridge,
    CollectAccessPoint,
    CreateAccessPoint,
    ReassertLinks,
    GrantNmcliAccess,
    ReportStatus,
    OfferReboot,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CheckPrerequisites => "check prerequisites",
            Step::AskSudoUser => "ask sudo user",
            Step::UpgradeSystem => "upgrade system",
            Step::InstallPackages => "install packages",
            Step::RemoveConnections => "remove existing connections",
            Step::DisableLegacyDhcp => "disable legacy dhcp client",
            Step::StartNetworkManager => "start network service",
            Step::DetectInterfaces => "detect interfaces",
            Step::CreateBridge => "create bridge",
            Step::ConfigureBridgeAddressing => "configure bridge addressing",
            Step::ActivateBridge => "activate bridge",
            Step::CollectAccessPoint => "collect access point settings",
            Step::CreateAccessPoint => "create access point",
            Step::ReassertLinks => "re-assert links",
            Step::GrantNmcliAccess => "grant nmcli access",
            Step::ReportStatus => "report status",
            Step::OfferReboot => "offer reboot",
        };
        f.write_str(name)
    }
}

/// Bridge to create: its name and the Ethernet interfaces to enslave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub name: String,
    pub slaves: Vec<String>,
}

impl BridgeConfig {
    pub fn new(name: &str, plan: &InterfacePlan) -> Self {
        Self {
            name: name.to_string(),
            slaves: plan.ethernet().into_iter().map(String::from).collect(),
        }
    }

    /// Profile name for the slave at `index`: `br0-eth0`, `br0-eth1`.
    pub fn slave_connection_name(&self, index: usize) -> String {
        format!("{}-eth{}", self.name, index)
    }

    /// `(interface, profile name)` pairs in attach order.
    pub fn slave_connections(&self) -> Vec<(&str, String)> {
        self.slaves
            .iter()
            .enumerate()
            .map(|(i, iface)| (iface.as_str(), self.slave_connection_name(i)))
            .collect()
    }
}

/// WiFi access point bound to the bridge.
#[derive(Clone)]
pub struct AccessPointConfig {
    pub connection_name: String,
    pub interface: String,
    pub ssid: String,
    pub passphrase: Zeroizing<String>,
    pub bridge: String,
}

impl fmt::Debug for AccessPointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPointConfig")
            .field("connection_name", &self.connection_name)
            .field("interface", &self.interface)
            .field("ssid", &self.ssid)
            .field("passphrase", &"<redacted>")
            .field("bridge", &self.bridge)
            .finish()
    }
}

/// Values gathered while the sequence runs.
#[derive(Debug, Clone)]
pub struct SetupContext {
    pub nmcli_path: PathBuf,
    pub sudo_user: String,
    pub interfaces: InterfacePlan,
    pub bridge: BridgeConfig,
    pub access_point: AccessPointConfig,
}

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    RebootIssued,
}

/// The sudoers line granting `user` passwordless use of `nmcli_path`.
pub fn sudoers_rule(user: &str, nmcli_path: &Path) -> String {
    format!("{} ALL=(ALL) NOPASSWD: {}\n", user, nmcli_path.display())
}

pub struct Provisioner<'a, R: ?Sized, P: ?Sized> {
    runner: &'a mut R,
    prompter: &'a mut P,
    config: &'a Config,
}

impl<'a, R, P> Provisioner<'a, R, P>
where
    R: CommandRunner + ?Sized,
    P: Prompter + ?Sized,
{
    pub fn new(runner: &'a mut R, prompter: &'a mut P, config: &'a Config) -> Self {
        Self {
            runner,
            prompter,
            config,
        }
    }

    /// Run every step in order.
    pub fn run(&mut self) -> Result<Outcome> {
        begin(Step::CheckPrerequisites);
        let nmcli_path = self.check_prerequisites()?;

        begin(Step::AskSudoUser);
        let sudo_user = self.ask_sudo_user()?;

        begin(Step::UpgradeSystem);
        self.upgrade_system()?;

        begin(Step::InstallPackages);
        self.install_packages()?;

        begin(Step::RemoveConnections);
        self.remove_existing_connections()?;

        begin(Step::DisableLegacyDhcp);
        self.disable_legacy_dhcp()?;

        begin(Step::StartNetworkManager);
        self.start_network_service()?;

        begin(Step::DetectInterfaces);
        let interfaces = interface::detect_interfaces(&mut *self.runner)?;
        let bridge = BridgeConfig::new(&self.config.bridge_name, &interfaces);

        begin(Step::CreateBridge);
        self.create_bridge(&bridge)?;

        begin(Step::ConfigureBridgeAddressing);
        self.configure_bridge_addressing(&bridge)?;

        begin(Step::ActivateBridge);
        self.activate_bridge(&bridge)?;

        begin(Step::CollectAccessPoint);
        let access_point = self.collect_access_point(&interfaces, &bridge)?;

        let ctx = SetupContext {
            nmcli_path,
            sudo_user,
            interfaces,
            bridge,
            access_point,
        };

        begin(Step::CreateAccessPoint);
        self.create_access_point(&ctx.access_point)?;

        begin(Step::ReassertLinks);
        self.reassert_links(&ctx)?;

        begin(Step::GrantNmcliAccess);
        self.grant_nmcli_access(&ctx)?;

        begin(Step::ReportStatus);
        self.report_status(&ctx.bridge)?;

        begin(Step::OfferReboot);
        self.offer_reboot()
    }

    fn run_cmd(&mut self, cmd: &CommandLine, check: Check) -> Result<String> {
        command::run(&mut *self.runner, cmd, check)
    }

    fn sudo(&self, program: &str) -> CommandLine {
        CommandLine::privileged(program, self.config.use_sudo)
    }

    /// Locate `nmcli`, returning its path for the sudoers rule.
    pub fn check_prerequisites(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.config.nmcli_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(SetupError::MissingPrerequisite(path.display().to_string()).into());
        }

        let which = CommandLine::new("which").arg("nmcli").query();
        match command::probe(&mut *self.runner, &which) {
            Some(path) if !path.is_empty() => {
                debug!(%path, "found nmcli");
                Ok(PathBuf::from(path))
            }
            _ => Err(SetupError::MissingPrerequisite("nmcli".to_string()).into()),
        }
    }

    pub fn ask_sudo_user(&mut self) -> Result<String> {
        loop {
            let user = self
                .prompter
                .ask("Enter the username to allow nmcli without sudo password")?;
            let user = user.trim().to_string();
            match validate::validate_username(&user) {
                Ok(()) => return Ok(user),
                Err(e) => println!("{}", e),
            }
        }
    }

    pub fn upgrade_system(&mut self) -> Result<()> {
        let update = self.sudo("apt").arg("update");
        self.run_cmd(&update, Check::Fatal)?;
        let upgrade = self.sudo("apt").args(["full-upgrade", "-y"]);
        self.run_cmd(&upgrade, Check::Fatal)?;
        Ok(())
    }

    pub fn install_packages(&mut self) -> Result<()> {
        if self.config.packages.is_empty() {
            info!("no packages configured, skipping install");
            return Ok(());
        }
        let install = self
            .sudo("apt")
            .args(["install", "-y"])
            .args(self.config.packages.iter().map(String::as_str));
        self.run_cmd(&install, Check::Fatal)?;
        Ok(())
    }

    /// Delete every connection profile except loopback.
    pub fn remove_existing_connections(&mut self) -> Result<()> {
        let listing = self.run_cmd(&nmcli::connection_list(), Check::BestEffort)?;
        let doomed: Vec<_> = nmcli::parse_connection_list(&listing)
            .into_iter()
            .filter(|profile| !profile.is_loopback())
            .collect();

        if doomed.is_empty() {
            debug!("no connection profiles to delete");
            return Ok(());
        }

        for profile in &doomed {
            info!(name = %profile.name, uuid = %profile.uuid, "deleting connection profile");
        }
        let delete = nmcli::connection_delete(
            doomed.iter().map(|p| p.uuid.as_str()),
            self.config.use_sudo,
        );
        self.run_cmd(&delete, Check::BestEffort)?;
        Ok(())
    }

    pub fn disable_legacy_dhcp(&mut self) -> Result<()> {
        let service = self.config.legacy_dhcp_service.clone();
        for action in ["stop", "disable"] {
            let cmd = self.sudo("systemctl").args([action, service.as_str()]);
            self.run_cmd(&cmd, Check::BestEffort)?;
        }
        Ok(())
    }

    pub fn start_network_service(&mut self) -> Result<()> {
        let service = self.config.network_service.clone();
        for action in ["enable", "start"] {
            let cmd = self.sudo("systemctl").args([action, service.as_str()]);
            self.run_cmd(&cmd, Check::Fatal)?;
        }
        Ok(())
    }

    pub fn create_bridge(&mut self, bridge: &BridgeConfig) -> Result<()> {
        let use_sudo = self.config.use_sudo;
        self.run_cmd(&nmcli::bridge_add(&bridge.name, use_sudo), Check::Fatal)?;
        for (iface, con_name) in bridge.slave_connections() {
            let cmd = nmcli::bridge_slave_add(iface, &con_name, &bridge.name, use_sudo);
            self.run_cmd(&cmd, Check::Fatal)?;
        }
        Ok(())
    }

    /// DHCP client on the bridge, IPv6 ignored.
    pub fn configure_bridge_addressing(&mut self, bridge: &BridgeConfig) -> Result<()> {
        let cmd = nmcli::connection_modify(
            &bridge.name,
            &[("ipv4.method", "auto"), ("ipv6.method", "ignore")],
            self.config.use_sudo,
        );
        self.run_cmd(&cmd, Check::Fatal)?;
        Ok(())
    }

    pub fn activate_bridge(&mut self, bridge: &BridgeConfig) -> Result<()> {
        let use_sudo = self.config.use_sudo;
        self.run_cmd(&nmcli::connection_up(&bridge.name, use_sudo), Check::Fatal)?;
        for (_, con_name) in bridge.slave_connections() {
            self.run_cmd(&nmcli::connection_up(&con_name, use_sudo), Check::Fatal)?;
        }
        Ok(())
    }

    /// Ask for the SSID and a confirmed passphrase.
    pub fn collect_access_point(
        &mut self,
        interfaces: &InterfacePlan,
        bridge: &BridgeConfig,
    ) -> Result<AccessPointConfig> {
        println!();
        println!("{}", style("=== Wi-Fi Access Point Configuration ===").bold());

        let ssid = self.ask_ssid()?;
        let passphrase = self.ask_passphrase()?;
        println!("SSID configured: {}", ssid);

        Ok(AccessPointConfig {
            connection_name: self.config.hotspot_name.clone(),
            interface: interfaces.wifi.clone(),
            ssid,
            passphrase,
            bridge: bridge.name.clone(),
        })
    }

    fn ask_ssid(&mut self) -> Result<String> {
        loop {
            let ssid = self.prompter.ask("Enter desired WiFi SSID")?;
            match validate::validate_ssid(&ssid) {
                Ok(()) => return Ok(ssid),
                Err(e) => println!("{}", e),
            }
        }
    }

    /// Both entries are asked again on a mismatch or a policy violation.
    fn ask_passphrase(&mut self) -> Result<Zeroizing<String>> {
        loop {
            let first = Zeroizing::new(self.prompter.ask_secret(
                "Enter WiFi password (min 8 chars, incl. uppercase and digits)",
            )?);
            let second = Zeroizing::new(self.prompter.ask_secret("Confirm password")?);

            if *first != *second {
                println!("Passwords do not match. Try again.");
                continue;
            }
            if let Err(e) = validate::validate_password(&first) {
                println!("{}", e);
                continue;
            }
            return Ok(first);
        }
    }

    pub fn create_access_point(&mut self, ap: &AccessPointConfig) -> Result<()> {
        let use_sudo = self.config.use_sudo;
        let name = ap.connection_name.as_str();

        let commands = [
            nmcli::access_point_add(&ap.interface, name, &ap.ssid, use_sudo),
            nmcli::connection_modify(name, &[("802-11-wireless.mode", "ap")], use_sudo),
            nmcli::connection_modify(name, &[("wifi-sec.key-mgmt", "wpa-psk")], use_sudo),
            nmcli::set_psk(name, &ap.passphrase, use_sudo),
            nmcli::connection_modify(
                name,
                &[
                    ("connection.master", ap.bridge.as_str()),
                    ("connection.slave-type", "bridge"),
                ],
                use_sudo,
            ),
            nmcli::connection_modify(name, &[("ipv4.method", "disabled")], use_sudo),
            nmcli::connection_modify(name, &[("ipv6.method", "ignore")], use_sudo),
            nmcli::connection_modify(name, &[("connection.autoconnect", "yes")], use_sudo),
            nmcli::connection_up(name, use_sudo),
        ];
        for cmd in &commands {
            self.run_cmd(cmd, Check::Fatal)?;
        }
        Ok(())
    }

    pub fn reassert_links(&mut self, ctx: &SetupContext) -> Result<()> {
        let use_sudo = self.config.use_sudo;
        self.run_cmd(&nmcli::connection_up(&ctx.bridge.name, use_sudo), Check::BestEffort)?;
        self.run_cmd(
            &nmcli::device_connect(&ctx.interfaces.wifi, use_sudo),
            Check::BestEffort,
        )?;
        Ok(())
    }

    /// Stage the sudoers drop-in next to its final path, let visudo check it,
    /// then move it into place.
    ///
    /// sudo skips files in `/etc/sudoers.d` whose name contains a `.`, so the
    /// staged `<file>.tmp` is never read by sudo. A rule visudo rejects never
    /// reaches the live path and the staged copy is removed.
    pub fn grant_nmcli_access(&mut self, ctx: &SetupContext) -> Result<()> {
        let file = self.config.sudoers_file.display().to_string();
        let staged = format!("{}.tmp", file);
        let rule = sudoers_rule(&ctx.sudo_user, &ctx.nmcli_path);

        let tee = self.sudo("tee").arg(staged.as_str()).stdin(rule);
        self.run_cmd(&tee, Check::Fatal)
            .with_context(|| format!("Failed to write {}", staged))?;

        if let Err(e) = self.check_staged_sudoers(&staged) {
            let cleanup = self.sudo("rm").args(["-f", staged.as_str()]);
            self.run_cmd(&cleanup, Check::BestEffort)?;
            return Err(e).with_context(|| format!("{} failed validation", file));
        }

        let install = self.sudo("mv").args(["-f", staged.as_str(), file.as_str()]);
        self.run_cmd(&install, Check::Fatal)?;

        info!(user = %ctx.sudo_user, %file, "granted passwordless nmcli");
        Ok(())
    }

    fn check_staged_sudoers(&mut self, staged: &str) -> Result<()> {
        let chmod = self.sudo("chmod").args(["0440", staged]);
        self.run_cmd(&chmod, Check::Fatal)?;

        let check = self.sudo("visudo").args(["-cf", staged]);
        self.run_cmd(&check, Check::Fatal)?;
        Ok(())
    }

    pub fn report_status(&mut self, bridge: &BridgeConfig) -> Result<()> {
        println!();
        println!("{}", style("=== Setup Complete: Connections Status ===").bold());

        let show_bridge = CommandLine::new("ip")
            .args(["a", "show", bridge.name.as_str()])
            .query();
        for cmd in [nmcli::connection_show(), nmcli::device_status(), show_bridge] {
            let output = self.run_cmd(&cmd, Check::BestEffort)?;
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Ok(())
    }

    pub fn offer_reboot(&mut self) -> Result<Outcome> {
        if self.prompter.confirm("Reboot now? (y/n)")? {
            let reboot = self.sudo("reboot");
            self.run_cmd(&reboot, Check::Fatal)?;
            return Ok(Outcome::RebootIssued);
        }
        Ok(Outcome::Completed)
    }
}

fn begin(step: Step) {
    info!(%step, "starting step");
}
