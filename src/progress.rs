//! Progress display for convergence runs

use colored::Colorize;
use converge::{NotificationRecord, NotificationStatus, Outcome, ProgressCallback, ResourceId, RunReport};
use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Progress bar in the house style
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template(TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb
}

/// Drives a progress bar from executor callbacks and prints one line per
/// change or skip above it
#[derive(Default)]
pub struct RunProgress {
    pb: Option<ProgressBar>,
    quiet: bool,
}

impl RunProgress {
    pub fn new(quiet: bool) -> Self {
        Self { pb: None, quiet }
    }

    /// Remove the bar; also needed when a run aborts before completing
    pub fn clear(&mut self) {
        if let Some(pb) = self.pb.take() {
            pb.finish_and_clear();
        }
    }

    fn line(&self, msg: String) {
        if self.quiet {
            return;
        }
        match &self.pb {
            Some(pb) => pb.println(msg),
            None => println!("{msg}"),
        }
    }
}

/// One-line rendering of a resource outcome, `None` when there is nothing to say
pub fn outcome_line(id: &ResourceId, outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::Changed { .. } => Some(format!("  {} {} {}", "✓".green(), id, outcome.label().dimmed())),
        Outcome::WouldChange { .. } => Some(format!("  {} {} {}", "~".yellow(), id, outcome.label().dimmed())),
        Outcome::Skipped { reason } => Some(format!("  {} {} {}", "⊘".dimmed(), id, reason.dimmed())),
        Outcome::Failed { error } => Some(format!("  {} {} {}", "✗".red(), id, error.red())),
        Outcome::Unchanged => None,
    }
}

/// One-line rendering of a delivered notification
pub fn notification_line(record: &NotificationRecord) -> String {
    let status = match &record.status {
        NotificationStatus::Fired { .. } => "fired".to_string(),
        NotificationStatus::WouldFire => "would fire".to_string(),
        NotificationStatus::Skipped { reason } => format!("skipped: {reason}"),
        NotificationStatus::Failed { error } => format!("failed: {error}"),
    };
    format!(
        "  {} {} {} ({}, from {}) {}",
        "↻".cyan(),
        record.target,
        record.action,
        record.timing,
        record.source,
        status.dimmed()
    )
}

impl ProgressCallback for RunProgress {
    fn on_run_start(&mut self, total: usize) {
        if !self.quiet {
            self.pb = Some(bar(total as u64, "Converging"));
        }
    }

    fn on_resource_start(&mut self, id: &ResourceId, _description: &str) {
        if let Some(pb) = &self.pb {
            pb.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &ResourceId, outcome: &Outcome) {
        if let Some(line) = outcome_line(id, outcome) {
            self.line(line);
        }
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }

    fn on_notification(&mut self, record: &NotificationRecord) {
        self.line(notification_line(record));
    }

    fn on_run_complete(&mut self, _report: &RunReport) {
        self.clear();
    }
}
