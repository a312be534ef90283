// UI layer: the terminal pieces of a run. A byte progress bar per upload
// attempt (`indicatif`) and the title prompt for new depositions
// (`dialoguer`). Nothing here influences the upload loop.

use crate::uploader::ProgressObserver;
use anyhow::Result;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Mutex;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// Draws one progress bar per attempt. A failed attempt leaves its bar
/// abandoned on screen and the next attempt starts a fresh one from zero.
#[derive(Default)]
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template(BAR_TEMPLATE)
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl ProgressObserver for TerminalProgress {
    fn on_attempt_start(&self, path: &Path, total: u64) {
        let bar = ProgressBar::new(total);
        bar.set_style(Self::style());
        bar.set_message(crate::planner::basename(path));
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_bytes_transferred(&self, count: u64) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.inc(count);
            }
        }
    }

    fn on_attempt_end(&self, succeeded: bool) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                if succeeded {
                    bar.finish();
                } else {
                    bar.abandon_with_message("failed");
                }
            }
        }
    }
}

/// Ask the user for the title of a new deposition.
pub fn prompt_title() -> Result<String> {
    let title: String = Input::new()
        .with_prompt("Enter the title of the dataset")
        .interact_text()?;
    Ok(title)
}
