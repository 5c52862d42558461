use std::future::Future;

use super::{make_log, seed_order, TestResult};
use crate::OrderStore;

pub(super) async fn run_log_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "log",
            "entries_list_in_append_order",
            entries_list_in_append_order(factory).await,
        ),
        TestResult::from_result(
            "log",
            "listing_is_restartable",
            listing_is_restartable(factory).await,
        ),
        TestResult::from_result(
            "log",
            "append_never_mutates_earlier_entries",
            append_never_mutates_earlier_entries(factory).await,
        ),
        TestResult::from_result(
            "log",
            "listing_is_scoped_to_one_order",
            listing_is_scoped_to_one_order(factory).await,
        ),
    ]
}

async fn append_n<S: OrderStore>(storage: &S, order_id: &str, n: usize) -> Result<(), String> {
    for i in 0..n {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .append_process_log(
                &mut snap,
                make_log(
                    &format!("log-{i}"),
                    order_id,
                    &format!("phase-{i}"),
                    &format!("message {i}"),
                ),
            )
            .await
            .map_err(|e| format!("append {i}: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit {i}: {e}"))?;
    }
    Ok(())
}

async fn entries_list_in_append_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    append_n(&storage, "order-1", 5).await?;

    let logs = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if logs.len() != 5 {
        return Err(format!("expected 5 entries, got {}", logs.len()));
    }
    for (i, entry) in logs.iter().enumerate() {
        if entry.id != format!("log-{i}") {
            return Err(format!(
                "entry {i} out of order: expected log-{i}, got {}",
                entry.id
            ));
        }
    }
    Ok(())
}

async fn listing_is_restartable<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    append_n(&storage, "order-1", 3).await?;

    let first = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("first list: {e}"))?;
    let second = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("second list: {e}"))?;

    let first_ids: Vec<&str> = first.iter().map(|l| l.id.as_str()).collect();
    let second_ids: Vec<&str> = second.iter().map(|l| l.id.as_str()).collect();
    if first_ids != second_ids {
        return Err(format!(
            "listing not restartable: {first_ids:?} vs {second_ids:?}"
        ));
    }
    Ok(())
}

async fn append_never_mutates_earlier_entries<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    append_n(&storage, "order-1", 1).await?;

    let before = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("list: {e}"))?;

    append_n_more(&storage, "order-1", 1).await?;

    let after = storage
        .list_process_logs("order-1")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if after.len() != 2 {
        return Err(format!("expected 2 entries, got {}", after.len()));
    }
    let original = &before[0];
    let still = &after[0];
    if still.id != original.id
        || still.message != original.message
        || still.phase != original.phase
        || still.created_at != original.created_at
    {
        return Err("earlier entry changed after a later append".to_string());
    }
    Ok(())
}

async fn append_n_more<S: OrderStore>(
    storage: &S,
    order_id: &str,
    n: usize,
) -> Result<(), String> {
    for i in 0..n {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .append_process_log(
                &mut snap,
                make_log(
                    &format!("late-{i}"),
                    order_id,
                    "late_phase",
                    "a later entry",
                ),
            )
            .await
            .map_err(|e| format!("append: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }
    Ok(())
}

async fn listing_is_scoped_to_one_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed_order(&storage, "order-1", "item-1").await?;
    seed_order(&storage, "order-2", "item-2").await?;
    append_n(&storage, "order-1", 2).await?;

    let other = storage
        .list_process_logs("order-2")
        .await
        .map_err(|e| format!("list: {e}"))?;
    if !other.is_empty() {
        return Err(format!(
            "order-2 sees {} foreign entries",
            other.len()
        ));
    }
    Ok(())
}
