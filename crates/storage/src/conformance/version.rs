use std::future::Future;

use super::{make_update, seed_order, TestResult};
use crate::{OrderStore, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "version_increments_by_one_per_update",
            version_increments_by_one_per_update(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_is_a_conflict",
            stale_version_is_a_conflict(factory).await,
        ),
    ]
}

async fn version_increments_by_one_per_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    for (expected_version, status) in [(0, "fetching_data"), (1, "generating"), (2, "reviewing")] {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let new_version = storage
            .update_order(&mut snap, make_update("order-1", expected_version, status))
            .await
            .map_err(|e| format!("update at v{expected_version}: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit at v{expected_version}: {e}"))?;
        if new_version != expected_version + 1 {
            return Err(format!(
                "expected new version {}, got {new_version}",
                expected_version + 1
            ));
        }
    }

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.version != 3 {
        return Err(format!("expected version 3, got {}", order.version));
    }
    Ok(())
}

async fn stale_version_is_a_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    // Advance to version 1.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    // A writer still holding version 0 must conflict, at the update call or
    // at commit.
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = match storage
        .update_order(&mut snap, make_update("order-1", 0, "generating"))
        .await
    {
        Ok(_) => storage.commit_snapshot(snap).await,
        Err(e) => {
            let _ = storage.abort_snapshot(snap).await;
            Err(e)
        }
    };

    match result {
        Err(StorageError::ConcurrentConflict {
            order_id,
            expected_version,
        }) if order_id == "order-1" && expected_version == 0 => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(()) => Err("stale update committed".to_string()),
    }
}
