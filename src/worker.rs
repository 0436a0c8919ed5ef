//! Reconciliation worker: periodically pulls non-terminal orders and syncs each one against
//! the accrual oracle, bounded to a fixed number of concurrent in-flight syncs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::ledger::LedgerService;

/// Spawns the worker loop and returns a handle plus the token that cancels it.
pub fn spawn(
    ledger: Arc<LedgerService>,
    pool_size: usize,
    interval: Duration,
) -> (tokio::task::JoinHandle<()>, CancellationToken) {
    let token = CancellationToken::new();
    let worker_token = token.clone();

    let handle = tokio::spawn(async move {
        tracing::info!(pool_size, interval_secs = interval.as_secs(), "reconciliation worker started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = worker_token.cancelled() => {
                    tracing::info!("reconciliation worker stopping");
                    return;
                }
                _ = ticker.tick() => {
                    process_batch(&ledger, pool_size, &worker_token).await;
                }
            }
        }
    });

    (handle, token)
}

async fn process_batch(ledger: &Arc<LedgerService>, pool_size: usize, cancel: &CancellationToken) {
    let order_ids = match ledger.orders_to_sync(pool_size as i64).await {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch orders to sync");
            return;
        }
    };

    if order_ids.is_empty() {
        return;
    }

    tracing::info!(count = order_ids.len(), "syncing orders");

    let semaphore = Arc::new(Semaphore::new(pool_size));
    let mut tasks = Vec::with_capacity(order_ids.len());

    for order_id in order_ids {
        let permit = Arc::clone(&semaphore);
        let ledger = Arc::clone(ledger);
        let cancel = cancel.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = permit
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            if let Err(e) = ledger.sync_order(&order_id, &cancel).await {
                tracing::warn!(order_id = %order_id, error = %e, "order sync failed");
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
}
