use std::future::Future;

use super::{make_biznesplan, make_ceidg, make_log, make_research, make_update, seed_order, TestResult};
use crate::{OrderStore, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "commit",
            "transition_child_and_log_commit_together",
            transition_child_and_log_commit_together(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "second_attach_rejected",
            second_attach_rejected(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "failed_snapshot_leaves_no_partial_state",
            failed_snapshot_leaves_no_partial_state(factory).await,
        ),
    ]
}

/// A stage completion writes the status transition, the child record, and
/// the audit entry in one snapshot; after commit all three are visible.
async fn transition_child_and_log_commit_together<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .update_order(&mut snap, make_update("order-1", 0, "generating"))
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .attach_ceidg(&mut snap, make_ceidg("ceidg-1", "order-1"))
        .await
        .map_err(|e| format!("attach ceidg: {e}"))?;
    storage
        .attach_research(&mut snap, make_research("res-1", "order-1"))
        .await
        .map_err(|e| format!("attach research: {e}"))?;
    storage
        .append_process_log(
            &mut snap,
            make_log("log-1", "order-1", "fetching_ceidg", "Registry data cached"),
        )
        .await
        .map_err(|e| format!("append: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.status != "generating" {
        return Err(format!("expected 'generating', got '{}'", order.status));
    }
    if storage
        .get_ceidg("order-1")
        .await
        .map_err(|e| format!("get ceidg: {e}"))?
        .is_none()
    {
        return Err("ceidg record missing after commit".to_string());
    }
    if storage
        .get_research("order-1")
        .await
        .map_err(|e| format!("get research: {e}"))?
        .is_none()
    {
        return Err("research record missing after commit".to_string());
    }
    let logs = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if logs.len() != 1 {
        return Err(format!("expected 1 log entry, got {}", logs.len()));
    }
    Ok(())
}

async fn second_attach_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .attach_biznesplan(&mut snap, make_biznesplan("bp-1", "order-1"))
        .await
        .map_err(|e| format!("attach: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .attach_biznesplan(&mut snap, make_biznesplan("bp-2", "order-1"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyRecorded { record, .. }) if record == "biznesplan" => Ok(()),
        Err(e) => Err(format!("expected AlreadyRecorded, got: {e}")),
        Ok(()) => Err("expected AlreadyRecorded, got Ok".to_string()),
    }
}

/// A snapshot that hits an error mid-way and aborts must leave nothing
/// behind -- no child record without its status transition, or vice versa.
async fn failed_snapshot_leaves_no_partial_state<S, F, Fut>(factory: &F) -> Result<(), String>
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
        .update_order(&mut snap, make_update("order-1", 0, "generating"))
        .await
        .map_err(|e| format!("update: {e}"))?;
    storage
        .attach_ceidg(&mut snap, make_ceidg("ceidg-1", "order-1"))
        .await
        .map_err(|e| format!("attach: {e}"))?;
    // Unknown order id -- this op must fail.
    let failed = storage
        .append_process_log(
            &mut snap,
            make_log("log-1", "order-999", "fetching_ceidg", "orphan entry"),
        )
        .await;
    if failed.is_ok() {
        return Err("log append for unknown order succeeded".to_string());
    }
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.status != "pending" {
        return Err(format!(
            "partial state: status advanced to '{}'",
            order.status
        ));
    }
    if storage
        .get_ceidg("order-1")
        .await
        .map_err(|e| format!("get ceidg: {e}"))?
        .is_some()
    {
        return Err("partial state: ceidg record leaked".to_string());
    }
    Ok(())
}
