/// Collects user-visible messages raised while handling collaborator data.
///
/// Skipped items (e.g. malformed explorer transactions) surface here instead
/// of aborting the run.
#[derive(Debug, Default)]
pub struct MessageLog {
    warnings: Vec<String>,
}

impl MessageLog {
    pub fn new() -> Self {
        MessageLog::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Drain the collected warnings, e.g. to display them to the user
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
