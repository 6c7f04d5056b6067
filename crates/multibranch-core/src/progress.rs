use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;

/// Append-only, line-oriented output for one reconciliation pass.
pub trait ProgressSink: Send + Sync {
    fn line(&self, message: &str);

    /// A major phase boundary. Timestamped.
    fn phase(&self, message: &str) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.line(&format!("[{now}] {message}"));
    }
}

/// Forwards every line to `tracing` at INFO.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn line(&self, message: &str) {
        tracing::info!(target: "multibranch::progress", "{message}");
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct BufferedProgress {
    lines: Mutex<Vec<String>>,
}

impl BufferedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|l| l.contains(needle))
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

impl ProgressSink for BufferedProgress {
    fn line(&self, message: &str) {
        tracing::debug!(target: "multibranch::progress", "{message}");
        self.lines.lock().push(message.to_string());
    }
}
