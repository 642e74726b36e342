//! One-way progress notifications from measurement stages to the console.
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// `done` of `total` units finished in the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<Progress>;

/// Send an update if anyone is listening. A closed receiver is not an error.
pub fn report(tx: Option<&ProgressSender>, done: u64, total: u64) {
    if let Some(tx) = tx {
        let _ = tx.send(Progress { done, total });
    }
}

/// Spawn a task that renders updates as a progress bar until every sender is dropped.
pub fn spawn_bar(total: u64, label: &'static str) -> (ProgressSender, JoinHandle<()>) {
    let (tx, mut rx): (ProgressSender, ProgressReceiver) = mpsc::unbounded_channel();
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template("{prefix} [{bar:40}] {pos}/{len} {elapsed_precise}")
        .map(|s| s.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_prefix(label);

    let handle = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            bar.set_length(p.total);
            bar.set_position(p.done);
        }
        bar.finish();
    });
    (tx, handle)
}
