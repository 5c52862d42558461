use std::future::Future;

use super::{make_order, make_update, seed_order, TestResult};
use crate::{OrderStore, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_create_is_invisible",
            uncommitted_create_is_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_update_is_invisible",
            uncommitted_update_is_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "aborted_snapshot_discards_writes",
            aborted_snapshot_discards_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "snapshot_reads_its_own_writes",
            snapshot_reads_its_own_writes(factory).await,
        ),
    ]
}

async fn uncommitted_create_is_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .create_order(&mut snap, make_order("order-1", "item-1"))
        .await
        .map_err(|e| format!("create: {e}"))?;

    // Not yet committed -- a non-locking read must not see it.
    match storage.get_order("order-1").await {
        Err(StorageError::OrderNotFound { .. }) => {}
        Err(e) => return Err(format!("expected OrderNotFound, got: {e}")),
        Ok(_) => return Err("uncommitted order visible to outside reader".to_string()),
    }

    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get after commit: {e}"))?;
    Ok(())
}

async fn uncommitted_update_is_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if outside.status != "pending" || outside.version != 0 {
        return Err(format!(
            "uncommitted update visible: status '{}', version {}",
            outside.status, outside.version
        ));
    }

    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let after = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if after.status != "fetching_data" || after.version != 1 {
        return Err(format!(
            "committed update not visible: status '{}', version {}",
            after.status, after.version
        ));
    }
    Ok(())
}

async fn aborted_snapshot_discards_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.status != "pending" || order.version != 0 {
        return Err(format!(
            "aborted write leaked: status '{}', version {}",
            order.status, order.version
        ));
    }
    Ok(())
}

async fn snapshot_reads_its_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .update_order(&mut snap, make_update("order-1", 0, "fetching_data"))
        .await
        .map_err(|e| format!("update: {e}"))?;

    let inside = storage
        .get_order_for_update(&mut snap, "order-1")
        .await
        .map_err(|e| format!("get_for_update: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;

    if inside.status != "fetching_data" {
        return Err(format!(
            "snapshot did not read its own write: status '{}'",
            inside.status
        ));
    }
    Ok(())
}
