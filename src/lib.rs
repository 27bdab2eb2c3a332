//! Raspberry Pi bridge and access point provisioning.
//!
//! This library turns a freshly installed Raspberry Pi into a transparent
//! network bridge: the wired interfaces are enslaved to a bridge that takes
//! its address over DHCP, and the WiFi radio becomes an access point attached
//! to the same bridge. All of the work is delegated to NetworkManager through
//! `nmcli`, `apt` and `systemctl`.
//!
//! # Modules
//!
//! - [`command`] - Structured command execution and the runner trait
//! - [`config`] - Optional TOML overrides for names, packages and paths
//! - [`error`] - Error type and exit code mapping
//! - [`interface`] - Ethernet and WiFi device detection
//! - [`nmcli`] - Builders for the `nmcli` invocations and terse output parsing
//! - [`prompt`] - Operator prompts
//! - [`provision`] - The ordered provisioning sequence
//! - [`validate`] - Passphrase, username and SSID checks
//!
//! # Example Usage
//!
//! ```no_run
//! use pi_bridge_setup::{Config, Provisioner, SystemRunner, TerminalPrompter};
//!
//! let config = Config::default();
//! let mut runner = SystemRunner::new();
//! let mut prompter = TerminalPrompter::new();
//!
//! Provisioner::new(&mut runner, &mut prompter, &config)
//!     .run()
//!     .expect("Provisioning failed");
//! ```

/// Command module describing external programs as argv vectors.
/// Runs them on the host, in dry-run mode, or against a test double.
pub mod command;

/// Configuration module for the optional TOML overrides.
/// Handles the default path, loading, validation and printing.
pub mod config;

/// Error module defining the setup's failure kinds.
/// Uses `thiserror` and maps each failure to a process exit code.
pub mod error;

/// Interface module for Ethernet and WiFi device selection.
/// Parses the nmcli device list and applies the bridge slave policy.
pub mod interface;

/// nmcli module building every NetworkManager invocation.
/// Also splits terse output and parses the connection list.
pub mod nmcli;

/// Prompt module for operator input.
/// Uses `dialoguer` for echoed text, masked secrets and yes/no questions.
pub mod prompt;

/// Provision module running the ordered setup steps.
/// Builds the bridge, the hotspot and the sudoers drop-in.
pub mod provision;

/// Validation module for the WiFi passphrase, username and SSID.
pub mod validate;

// Re-export the command runner seam and its implementations
pub use command::{Check, CommandLine, CommandOutput, CommandRunner, DryRunRunner, SystemRunner};

// Re-export the configuration type
pub use config::Config;

// Re-export the main error type and its exit code mapping
pub use error::{exit_code_for, SetupError};

// Re-export interface detection for callers planning the bridge
pub use interface::{detect_interfaces, InterfacePlan};

// Re-export the operator prompt seam
pub use prompt::{Prompter, TerminalPrompter};

// Re-export the provisioning sequence entry points
pub use provision::{Outcome, Provisioner, SetupContext};

// Re-export the passphrase policy
pub use validate::{validate_password, PasswordError};
