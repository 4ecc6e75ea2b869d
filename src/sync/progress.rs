use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "Progress |{bar:40}| {percent}% | {pos}/{len} Files | {msg}";

/// Upload progress for one batch. Owned and updated by the coordinator only.
pub struct UploadProgress {
    bar: ProgressBar,
}

impl UploadProgress {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(TEMPLATE) {
            bar.set_style(style.progress_chars("\u{2588}\u{2588}\u{2591}"));
        }
        bar.set_message("Starting...");
        Self { bar }
    }

    /// No terminal output.
    pub fn hidden(total: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total as u64);
        Self { bar }
    }

    /// Record that `completed` files are done, the latest being `label`.
    pub fn update(&self, completed: usize, label: String) {
        self.bar.set_position(completed as u64);
        self.bar.set_message(label);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Run `f` with the bar cleared, for log output that must not tear it.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.bar.suspend(f)
    }

    pub fn finish(&self) {
        self.bar.finish();
    }
}
