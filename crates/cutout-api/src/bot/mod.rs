//! Telegram front end: long-poll loop, routing, keyboards and reply text.

pub mod keyboard;
pub mod replies;
pub mod router;
pub mod transport;

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use router::Router;
pub use transport::ChatTransport;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Handlers still running at shutdown get this long to finish.
const DRAIN_GRACE: Duration = Duration::from_secs(10);

/// Poll for updates and route each one on its own task until `cancel` fires.
///
/// Transport errors back off exponentially (1s up to 30s); the loop only
/// exits on cancellation.
pub async fn run<T: ChatTransport + 'static>(router: Router<T>, cancel: CancellationToken) {
    let mut offset: Option<i64> = None;
    let mut backoff = Duration::from_secs(1);
    let mut handlers = JoinSet::new();

    info!("bot polling started");

    loop {
        while handlers.try_join_next().is_some() {}

        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = router.transport().get_updates(offset) => polled,
        };

        match polled {
            Ok(updates) => {
                backoff = Duration::from_secs(1);
                for update in updates {
                    offset = Some(update.update_id + 1);
                    let router = router.clone();
                    handlers.spawn(async move { router.handle_update(update).await });
                }
            }
            Err(e) => {
                warn!(error = %e, retry_in_secs = backoff.as_secs(), "polling failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }

    let pending = handlers.len();
    if pending > 0 {
        debug!(pending, "waiting for in-flight handlers");
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while handlers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pending = handlers.len(), "abandoning handlers still running at shutdown");
            handlers.abort_all();
        }
    }

    info!("bot polling stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::router::tests::{MockTransport, Sent, test_service};
    use super::*;
    use cutout_infra::telegram::types::{Chat, Message, Update, User};

    fn help_update(update_id: i64) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                from: Some(User {
                    id: 5,
                    first_name: "Bo".to_string(),
                    last_name: None,
                    username: None,
                }),
                chat: Chat { id: 5 },
                text: Some("/help".to_string()),
                photo: None,
                document: None,
            }),
            callback_query: None,
        }
    }

    #[tokio::test]
    async fn loop_routes_updates_and_stops_on_cancel() {
        let transport = MockTransport::default();
        transport
            .updates
            .lock()
            .unwrap()
            .extend([vec![help_update(1), help_update(2)], vec![help_update(3)]]);
        let transport = Arc::new(transport);
        let router = Router::new(Arc::clone(&transport), test_service(), 1024 * 1024);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(router, cancel.clone()));

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if transport.sent().len() == 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(delivered.is_ok(), "updates were not routed");
        assert!(transport
            .sent()
            .iter()
            .all(|s| matches!(s, Sent::Message { chat_id: 5, .. })));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
