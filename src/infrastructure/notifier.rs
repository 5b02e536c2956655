use crate::domain::notification::Notification;
use crate::domain::ports::NotificationSink;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Filter directive the binary installs when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "crowdpay=info";

/// Delivers notifications as structured log events.
///
/// Used by the binary, where the platform's notification service picks up
/// the `crowdpay::notification` target from the log stream.
#[derive(Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn emit(&self, notification: Notification) -> Result<()> {
        info!(
            target: "crowdpay::notification",
            user_id = notification.user_id,
            kind = ?notification.kind,
            related_id = ?notification.related_id,
            "{}",
            notification.content
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::NotificationKind;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifications_pass_the_default_filter() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(DEFAULT_LOG_FILTER))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        TracingNotificationSink
            .emit(Notification::new(
                7,
                NotificationKind::ContributionSuccess,
                "Your contribution of 5000 XOF was received",
                Some(6),
            ))
            .await
            .unwrap();

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Your contribution of 5000 XOF was received"));
        assert!(output.contains("crowdpay::notification"));
        assert!(output.contains("user_id=7"));
    }
}
