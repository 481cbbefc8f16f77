//! Terminal frontend for a setup run, rendered via `indicatif` progress bars.
//!
//! The UI is a plain subscriber: it learns everything through the
//! aggregator's callback interface plus the published snapshot channel for
//! the overall bar. The engine never knows it is being rendered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;

use crate::aggregator::{AggregatedState, ProgressAggregator, Subscriber};
use crate::plan::Operation;

const CHECK: &str = "\u{2714}"; // ✔
const CROSS: &str = "\u{2718}"; // ✘
const SKIP: &str = "\u{21B7}"; // ↷

/// Stacked progress bars: one overall bar plus one line per started
/// operation.
pub struct SetupUi {
    multi: MultiProgress,
    overall: ProgressBar,
    op_bars: HashMap<String, ProgressBar>,
    snapshots: watch::Receiver<Arc<AggregatedState>>,
}

impl SetupUi {
    /// Build the UI over an aggregator's snapshot channel. Subscribe the
    /// returned value before the run starts.
    pub fn new(aggregator: &ProgressAggregator) -> Self {
        let multi = MultiProgress::new();

        let overall_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(overall_style);
        overall.set_prefix("Setup");

        Self {
            multi,
            overall,
            op_bars: HashMap::new(),
            snapshots: aggregator.watch_snapshots(),
        }
    }

    fn refresh_overall(&mut self) {
        let snapshot = self.snapshots.borrow();
        self.overall.set_position(u64::from(snapshot.overall_percent));
        if let Some(current) = &snapshot.current {
            self.overall.set_message(current.clone());
        } else {
            self.overall.set_message("");
        }
        if snapshot.all_terminal() {
            self.overall.finish();
        }
    }

    fn bar_for(&mut self, op: &Operation) -> &ProgressBar {
        self.op_bars.entry(op.id.clone()).or_insert_with(|| {
            let bar_style = ProgressStyle::default_spinner()
                .template("  {spinner} {prefix:.bold} {msg}")
                .expect("progress bar template is a valid static string");
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(bar_style);
            bar.set_prefix(op.name.clone());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        })
    }

}

impl Subscriber for SetupUi {
    fn on_start(&mut self, op: &Operation) {
        let bar = self.bar_for(op);
        bar.set_message(style("starting...").dim().to_string());
        self.refresh_overall();
    }

    fn on_progress(&mut self, op: &Operation, percent: u8, message: Option<&str>) {
        let bar = self.bar_for(op);
        match message {
            Some(msg) => bar.set_message(format!("{}% {}", percent, style(msg).dim())),
            None => bar.set_message(format!("{}%", percent)),
        }
        self.refresh_overall();
    }

    fn on_complete(&mut self, op: &Operation, success: bool, message: Option<&str>) {
        let bar = self.bar_for(op).clone();
        if success {
            bar.finish_with_message(style(CHECK).green().to_string());
        } else if message == Some("skipped") {
            bar.finish_with_message(format!("{} {}", style(SKIP).yellow(), "skipped"));
        } else {
            bar.finish_with_message(style("cancelled").yellow().to_string());
        }
        self.refresh_overall();
    }

    fn on_error(&mut self, op: &Operation, message: &str, recoverable: bool) {
        let bar = self.bar_for(op).clone();
        let suffix = if recoverable { "" } else { " (not recoverable)" };
        bar.finish_with_message(format!(
            "{} {}{}",
            style(CROSS).red(),
            style(message).red(),
            suffix
        ));
        self.refresh_overall();
    }
}
