use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};

use crate::error::SetupError;

/// Blocking operator input.
pub trait Prompter {
    /// Ask for a line of text, echoed.
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Ask for a secret without echoing it.
    fn ask_secret(&mut self, prompt: &str) -> Result<String>;

    /// Ask a yes/no question. Only `y` (any case) counts as yes.
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        let answer = self.ask(prompt)?;
        Ok(answer.trim().eq_ignore_ascii_case("y"))
    }
}

/// Prompts on the controlling terminal.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        let answer: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(|e| SetupError::Prompt(e.to_string()))?;
        Ok(answer)
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        let answer = Password::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| SetupError::Prompt(e.to_string()))?;
        Ok(answer)
    }
}
