use thiserror::Error;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("{0} not found. Install NetworkManager first.")]
    MissingPrerequisite(String),

    #[error("No Ethernet interface found. Exiting.")]
    NoEthernetInterface,

    #[error("No WiFi interface found. Exiting.")]
    NoWifiInterface,

    #[error("Command failed ({}): {}", describe_code(.code), .stderr)]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read input: {0}")]
    Prompt(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SetupError {
    /// Process exit code for this failure.
    ///
    /// Command failures propagate the command's own code; a command without an
    /// exit status (killed by a signal, or its stdin was cut short) and every
    /// precondition failure map to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            SetupError::CommandFailed { code, .. } => match code {
                Some(c) if *c != 0 => *c,
                _ => 1,
            },
            SetupError::Spawn { .. } => 127,
            _ => 1,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "no exit status".to_string(),
    }
}

/// Exit code for an error returned by the provisioning sequence.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<SetupError>()
        .map(SetupError::exit_code)
        .unwrap_or(1)
}
