//! User-visible notifications raised by the connection layer.

/// Sink for banners shown to the user.
pub trait Notifier: Send + Sync {
    /// A failure the user should see, e.g. a lost connection.
    fn report_error(&self, title: &str, detail: &str);

    fn report_success(&self, title: &str);

    /// Neutral information such as an incoming friend request.
    fn report_info(&self, title: &str, detail: &str) {
        crate::log_info!(title, detail, "notification");
    }
}

/// Writes notifications to the log. Used by the terminal client.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn report_error(&self, title: &str, detail: &str) {
        crate::log_error!("{title}: {detail}");
    }

    fn report_success(&self, title: &str) {
        crate::log_info!("{title}");
    }

    fn report_info(&self, title: &str, detail: &str) {
        crate::log_info!("{title}: {detail}");
    }
}
