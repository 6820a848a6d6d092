//! Cancellation signals.

use tokio::sync::watch;

/// Resolves once the signal reads `true`. Never resolves if the sender is gone.
pub(crate) async fn cancelled(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow() {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves once either signal reads `true`.
pub(crate) async fn either_cancelled(
    first: &mut watch::Receiver<bool>,
    second: &mut watch::Receiver<bool>,
) {
    tokio::select! {
        () = cancelled(first) => {}
        () = cancelled(second) => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_never_cancels() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_secs(5), cancelled(&mut rx)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_already_set_resolves() {
        let (_tx, mut rx) = watch::channel(true);
        cancelled(&mut rx).await;
    }

    #[tokio::test]
    async fn test_either_resolves_on_second() {
        let (_a, mut first) = watch::channel(false);
        let (b, mut second) = watch::channel(false);
        let waiter = tokio::spawn(async move { either_cancelled(&mut first, &mut second).await });
        b.send(true).unwrap();
        tokio_test::assert_ok!(waiter.await);
    }
}
