use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use pi_bridge_setup::{
    exit_code_for, CommandRunner, Config, DryRunRunner, Outcome, Provisioner, SystemRunner,
    TerminalPrompter,
};

#[derive(Parser)]
#[command(name = "pi-bridge-setup")]
#[command(about = "Configure a Raspberry Pi as an Ethernet bridge with a WiFi access point")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/pi-bridge-setup/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print changing commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(Outcome::RebootIssued) => tracing::info!("reboot issued"),
        Ok(Outcome::Completed) => tracing::info!("setup finished"),
        Err(err) => {
            eprintln!("[ERROR] {:#}", err);
            process::exit(exit_code_for(&err));
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<Outcome> {
    let config = Config::load(cli.config.as_deref())?;

    if cli.show_config {
        print!("{}", config.to_toml()?);
        return Ok(Outcome::Completed);
    }

    let mut runner: Box<dyn CommandRunner> = if cli.dry_run {
        tracing::info!("dry run: only read-only commands will be executed");
        Box::new(DryRunRunner::new(SystemRunner::new()))
    } else {
        Box::new(SystemRunner::new())
    };
    let mut prompter = TerminalPrompter::new();

    Provisioner::new(runner.as_mut(), &mut prompter, &config).run()
}
