//! State that is threaded through every stage of a discovery run

use chrono::Utc;

use crate::cancel::CancelSignal;
use crate::discovery::configuration::Service;
use crate::error::Result;

/// The diagnostic log of a discovery run.
///
/// Every line is also sent to the `log` facade at the matching level.
#[derive(Debug, Default)]
pub struct DiscoveryLog {
    lines: Vec<String>,
    n_errors: u32,
}

impl DiscoveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many warnings and errors have been recorded
    pub fn n_errors(&self) -> u32 {
        self.n_errors
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Log an error
    pub fn error(&mut self, text: &str) {
        log::error!("{}", text);
        self.n_errors += 1;
        self.push("ERROR", text);
    }
    /// Log a warning
    pub fn warn(&mut self, text: &str) {
        log::warn!("{}", text);
        self.n_errors += 1;
        self.push("WARN", text);
    }
    /// Log an info
    pub fn info(&mut self, text: &str) {
        log::info!("{}", text);
        self.push("INFO", text);
    }
    /// Log a debug message
    pub fn debug(&mut self, text: &str) {
        log::debug!("{}", text);
        self.push("DEBUG", text);
    }

    fn push(&mut self, level: &str, text: &str) {
        self.lines.push(format!("{} {:5} {}", Utc::now().format("%H:%M:%S%.3f"), level, text));
    }

    /// Render the log as a single text
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        if text.is_empty() == false {
            text.push('\n');
        }
        text
    }
}

/// Everything one service probe needs to carry around. There is one session per service and per run.
pub struct DiscoverySession {
    pub service: Service,
    pub log: DiscoveryLog,
    cancel: CancelSignal,
}

impl DiscoverySession {
    pub fn new(service: Service, cancel: CancelSignal) -> Self {
        Self { service, log: DiscoveryLog::new(), cancel }
    }

    /// Called between stages. Returns `Err(DavError::Cancelled)` when the run must stop.
    pub fn checkpoint(&mut self) -> Result<()> {
        if let Err(err) = self.cancel.check() {
            self.log.info(&format!("{} discovery cancelled", self.service));
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cancel::cancel_pair;

    #[test]
    fn log_counts_errors() {
        let mut log = DiscoveryLog::new();
        log.info("starting");
        log.warn("no principal");
        log.error("broken");
        assert_eq!(log.n_errors(), 2);
        assert_eq!(log.lines().len(), 3);
        assert!(log.to_text().contains("no principal"));
        assert!(log.to_text().ends_with('\n'));
    }

    #[test]
    fn checkpoint_follows_cancellation() {
        let (handle, signal) = cancel_pair();
        let mut session = DiscoverySession::new(Service::CalDav, signal);
        assert!(session.checkpoint().is_ok());
        handle.cancel();
        assert!(session.checkpoint().is_err());
    }
}
