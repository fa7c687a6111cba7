/// Fire-and-forget notification surface for batch summaries.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str);
}

/// Default surface: writes the summary to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &str) {
        log::info!("{summary}");
    }
}
