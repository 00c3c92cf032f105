use souk_core::Notification;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Logs every queued notification until all senders are gone, then returns how many
/// were drained. Delivery to users happens outside this process.
pub fn spawn_notification_drain(mut receiver: mpsc::Receiver<Notification>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut drained = 0usize;
        while let Some(notification) = receiver.recv().await {
            drained += 1;
            let quote_id =
                notification.data.get("quote_id").map(String::as_str).unwrap_or("unknown");
            info!(
                event_name = "notification.queued",
                user_id = %notification.user_id.0,
                channel = notification.channel.as_str(),
                template = notification.template.as_str(),
                quote_id,
                fields = notification.data.len(),
                "notification handed off for delivery"
            );
        }
        info!(event_name = "notification.drain_closed", drained, "notification drain stopped");
        drained
    })
}
