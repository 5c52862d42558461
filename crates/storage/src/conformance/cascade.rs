use std::future::Future;

use super::{make_biznesplan, make_ceidg, make_log, make_research, seed_order, TestResult};
use crate::{OrderStore, StorageError};

pub(super) async fn run_cascade_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "cascade",
            "delete_removes_all_dependents",
            delete_removes_all_dependents(factory).await,
        ),
        TestResult::from_result(
            "cascade",
            "delete_spares_other_orders",
            delete_spares_other_orders(factory).await,
        ),
    ]
}

async fn attach_full_family<S: OrderStore>(storage: &S, order_id: &str) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .attach_ceidg(&mut snap, make_ceidg(&format!("ceidg-{order_id}"), order_id))
        .await
        .map_err(|e| format!("attach ceidg: {e}"))?;
    storage
        .attach_research(&mut snap, make_research(&format!("res-{order_id}"), order_id))
        .await
        .map_err(|e| format!("attach research: {e}"))?;
    storage
        .attach_biznesplan(
            &mut snap,
            make_biznesplan(&format!("bp-{order_id}"), order_id),
        )
        .await
        .map_err(|e| format!("attach biznesplan: {e}"))?;
    for i in 0..3 {
        storage
            .append_process_log(
                &mut snap,
                make_log(&format!("log-{order_id}-{i}"), order_id, "phase", "entry"),
            )
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
    }
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(())
}

async fn delete_removes_all_dependents<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    attach_full_family(&storage, "order-1").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .delete_order(&mut snap, "order-1")
        .await
        .map_err(|e| format!("delete: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    match storage.get_order("order-1").await {
        Err(StorageError::OrderNotFound { .. }) => {}
        Err(e) => return Err(format!("expected OrderNotFound, got: {e}")),
        Ok(_) => return Err("order survived delete".to_string()),
    }
    if storage
        .get_ceidg("order-1")
        .await
        .map_err(|e| format!("get ceidg: {e}"))?
        .is_some()
    {
        return Err("orphaned ceidg record".to_string());
    }
    if storage
        .get_research("order-1")
        .await
        .map_err(|e| format!("get research: {e}"))?
        .is_some()
    {
        return Err("orphaned research record".to_string());
    }
    if storage
        .get_biznesplan("order-1")
        .await
        .map_err(|e| format!("get biznesplan: {e}"))?
        .is_some()
    {
        return Err("orphaned biznesplan record".to_string());
    }
    let logs = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !logs.is_empty() {
        return Err(format!("{} orphaned log entries", logs.len()));
    }
    Ok(())
}

async fn delete_spares_other_orders<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    seed_order(&storage, "order-2", "item-2").await?;
    attach_full_family(&storage, "order-1").await?;
    attach_full_family(&storage, "order-2").await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .delete_order(&mut snap, "order-1")
        .await
        .map_err(|e| format!("delete: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    storage
        .get_order("order-2")
        .await
        .map_err(|e| format!("get order-2: {e}"))?;
    if storage
        .get_biznesplan("order-2")
        .await
        .map_err(|e| format!("get biznesplan: {e}"))?
        .is_none()
    {
        return Err("order-2 biznesplan lost in cascade".to_string());
    }
    let logs = storage
        .list_process_logs("order-2")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if logs.len() != 3 {
        return Err(format!("order-2 expected 3 entries, got {}", logs.len()));
    }
    Ok(())
}
