//! Progress reporting utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a long-running step (file load, model call) is in progress.
///
/// Cleared silently when dropped without being finished.
#[derive(Debug)]
pub struct Spinner {
    pb: Option<ProgressBar>,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        Self {
            pb: Some(create_spinner(message)),
        }
    }

    /// Spinner that draws nothing, for machine-readable output
    pub fn hidden() -> Self {
        Self { pb: None }
    }

    pub fn for_output(message: &str, json: bool) -> Self {
        if json {
            Self::hidden()
        } else {
            Self::new(message)
        }
    }

    pub fn set_message(&self, message: &str) {
        if let Some(pb) = &self.pb {
            pb.set_message(message.to_string());
        }
    }

    pub fn finish(mut self, message: &str) {
        if let Some(pb) = self.pb.take() {
            pb.finish_with_message(message.to_string());
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_spinner_is_inert() {
        let spinner = Spinner::for_output("Analyzing requirements...", true);
        spinner.set_message("still going");
        spinner.finish("done");
    }
}
