//! Terminal progress bars.

use indicatif::{ProgressBar, ProgressStyle};
use synergy_transfer::ProgressSnapshot;
use synergy_transfer::format::{format_speed, format_time};

const TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes}";

/// Progress bar for one transfer or generation run.
pub struct TransferBar {
    bar: ProgressBar,
    label: String,
}

impl TransferBar {
    pub fn new(total_bytes: u64, label: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_bar(ProgressBar::new(total_bytes), label)
    }

    fn with_bar(bar: ProgressBar, label: impl Into<String>) -> anyhow::Result<Self> {
        bar.set_style(
            ProgressStyle::default_bar()
                .template(TEMPLATE)?
                .progress_chars("#>-"),
        );
        let label = label.into();
        bar.set_message(label.clone());
        Ok(Self { bar, label })
    }

    pub fn set_position(&self, bytes: u64) {
        self.bar.set_position(bytes);
    }

    /// Applies a tracker snapshot: position plus speed and ETA.
    pub fn apply(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_length(snapshot.total_size);
        self.bar.set_position(snapshot.current_size);
        self.bar.set_message(format!(
            "{}  {}  ETA {}",
            self.label,
            format_speed(snapshot.speed_mbps),
            format_time(snapshot.eta_seconds)
        ));
    }

    pub fn finish(&self, msg: impl Into<String>) {
        self.bar.finish_with_message(msg.into());
    }

    pub fn abandon(&self, msg: impl Into<String>) {
        self.bar.abandon_with_message(msg.into());
    }
}
