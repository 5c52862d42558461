use std::future::Future;
use std::sync::Arc;

use super::{make_order, make_update, seed_order, TestResult};
use crate::{OrderStore, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_updates_exactly_one_wins",
            concurrent_updates_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_creates_same_podio_item_exactly_one_wins",
            concurrent_creates_same_podio_item_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_updates_final_state_consistent",
            concurrent_updates_final_state_consistent(factory).await,
        ),
    ]
}

/// Whether the error is the expected losing outcome of an OCC race.
fn is_conflict(err: &StorageError) -> bool {
    matches!(err, StorageError::ConcurrentConflict { .. })
}

/// N tasks each open a snapshot and attempt to update the same order from
/// version 0. Exactly one commit succeeds; the rest must observe a
/// ConcurrentConflict -- at the update call or at commit, both are valid
/// places for a backend to detect the race.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_order(storage.as_ref(), "order-1", "item-1").await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
                .await
            {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(e) if is_conflict(&e) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(e) if is_conflict(&e) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

/// N tasks race to create an order for the same podio item. Exactly one
/// commit succeeds; the rest get DuplicatePodioItem.
async fn concurrent_creates_same_podio_item_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .create_order(&mut snap, make_order(&format!("order-{i}"), "item-1"))
                .await
            {
                Ok(()) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::DuplicatePodioItem { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::DuplicatePodioItem { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

/// After a concurrent update race, the final record must be consistent:
/// version 1, in the target state, readable by a non-locking read.
async fn concurrent_updates_final_state_consistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_order(storage.as_ref(), "order-1", "item-1").await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s
                .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
                .await
            {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) | Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
                    Err(e) => Err(e),
                },
                Err(StorageError::ConcurrentConflict { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(())
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.version != 1 {
        return Err(format!(
            "expected version 1 after single winning update, got {}",
            order.version
        ));
    }
    if order.status != "fetching_data" {
        return Err(format!(
            "expected status 'fetching_data', got '{}'",
            order.status
        ));
    }
    Ok(())
}
