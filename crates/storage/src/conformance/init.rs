use std::future::Future;

use super::{make_order, seed_order, TestResult};
use crate::{OrderStore, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "init",
            "create_order_starts_pending_at_version_0",
            create_order_starts_pending_at_version_0(factory).await,
        ),
        TestResult::from_result(
            "init",
            "duplicate_podio_item_rejected",
            duplicate_podio_item_rejected(factory).await,
        ),
        TestResult::from_result(
            "init",
            "find_by_podio_item_round_trip",
            find_by_podio_item_round_trip(factory).await,
        ),
    ]
}

async fn create_order_starts_pending_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    let order = storage
        .get_order("order-1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if order.status != "pending" {
        return Err(format!("expected status 'pending', got '{}'", order.status));
    }
    if order.version != 0 {
        return Err(format!("expected version 0, got {}", order.version));
    }
    Ok(())
}

async fn duplicate_podio_item_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage
        .create_order(&mut snap, make_order("order-2", "item-1"))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::DuplicatePodioItem { podio_item_id }) if podio_item_id == "item-1" => {
            Ok(())
        }
        Err(e) => Err(format!("expected DuplicatePodioItem, got: {e}")),
        Ok(()) => Err("expected DuplicatePodioItem, got Ok".to_string()),
    }
}

async fn find_by_podio_item_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;

    let found = storage
        .find_by_podio_item("item-1")
        .await
        .map_err(|e| format!("find: {e}"))?
        .ok_or("expected order for item-1")?;
    if found.id != "order-1" {
        return Err(format!("expected order-1, got {}", found.id));
    }

    let missing = storage
        .find_by_podio_item("item-999")
        .await
        .map_err(|e| format!("find: {e}"))?;
    if missing.is_some() {
        return Err("expected None for unknown podio item".to_string());
    }
    Ok(())
}
