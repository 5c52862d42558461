//! In-memory reference backend.
//!
//! `MemoryStore` buffers a snapshot's writes in the snapshot itself and
//! applies them to the shared state only at commit, under one lock, after
//! re-validating every precondition against what is actually committed by
//! then. That gives the two properties the conformance suite demands of
//! every backend: uncommitted writes are invisible to other snapshots, and
//! of N snapshots racing on the same order version exactly one commits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    BiznesplanRecord, CeidgRecord, OrderRecord, OrderUpdate, ProcessLogRecord, ResearchRecord,
};
use crate::traits::OrderStore;

/// In-memory `OrderStore`, cheap to construct per test and usable as the
/// backing store of a single-process deployment.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Clone, Default)]
struct Inner {
    orders: BTreeMap<String, OrderRecord>,
    ceidg: BTreeMap<String, CeidgRecord>,
    research: BTreeMap<String, ResearchRecord>,
    biznesplany: BTreeMap<String, BiznesplanRecord>,
    process_logs: Vec<ProcessLogRecord>,
}

/// Buffered transaction: validated operations waiting for commit.
pub struct MemorySnapshot {
    ops: Vec<PendingOp>,
}

#[derive(Clone)]
enum PendingOp {
    CreateOrder(OrderRecord),
    UpdateOrder(OrderUpdate),
    AttachCeidg(CeidgRecord),
    AttachResearch(ResearchRecord),
    AttachBiznesplan(BiznesplanRecord),
    UpdateBiznesplan(BiznesplanRecord),
    AppendLog(ProcessLogRecord),
    DeleteOrder(String),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another thread panicked mid-write of a
        // working copy; the committed state itself is always consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Committed state plus this snapshot's pending writes, for
    /// read-your-writes and for validating the next operation.
    fn view(&self, snapshot: &MemorySnapshot) -> Inner {
        let mut view = self.lock().clone();
        for op in &snapshot.ops {
            // Pending ops were validated when buffered; against their own
            // base view they cannot fail.
            let _ = apply(&mut view, op);
        }
        view
    }

    /// Validate `op` against the snapshot's current view, then buffer it.
    fn stage(
        &self,
        snapshot: &mut MemorySnapshot,
        op: PendingOp,
    ) -> Result<(), StorageError> {
        let mut view = self.view(snapshot);
        apply(&mut view, &op)?;
        snapshot.ops.push(op);
        Ok(())
    }
}

/// Apply one operation to a working copy of the store, validating its
/// preconditions. Used both when buffering (against the snapshot view) and
/// at commit (against the then-committed state).
fn apply(state: &mut Inner, op: &PendingOp) -> Result<(), StorageError> {
    match op {
        PendingOp::CreateOrder(record) => {
            if state
                .orders
                .values()
                .any(|o| o.podio_item_id == record.podio_item_id)
            {
                return Err(StorageError::DuplicatePodioItem {
                    podio_item_id: record.podio_item_id.clone(),
                });
            }
            if state.orders.contains_key(&record.id) {
                return Err(StorageError::Backend(format!(
                    "duplicate order id: {}",
                    record.id
                )));
            }
            state.orders.insert(record.id.clone(), record.clone());
            Ok(())
        }
        PendingOp::UpdateOrder(update) => {
            let order = state.orders.get_mut(&update.order_id).ok_or_else(|| {
                StorageError::OrderNotFound {
                    order_id: update.order_id.clone(),
                }
            })?;
            if order.version != update.expected_version {
                return Err(StorageError::ConcurrentConflict {
                    order_id: update.order_id.clone(),
                    expected_version: update.expected_version,
                });
            }
            order.status = update.status.clone();
            order.current_phase = update.current_phase.clone();
            order.progress_percent = update.progress_percent;
            order.error_message = update.error_message.clone();
            order.retry_count = update.retry_count;
            order.worker_task_id = update.worker_task_id.clone();
            order.updated_at = update.updated_at.clone();
            if update.started_at.is_some() {
                order.started_at = update.started_at.clone();
            }
            if update.completed_at.is_some() {
                order.completed_at = update.completed_at.clone();
            }
            order.version += 1;
            Ok(())
        }
        PendingOp::AttachCeidg(record) => {
            require_order(state, &record.order_id)?;
            if state.ceidg.contains_key(&record.order_id) {
                return Err(StorageError::AlreadyRecorded {
                    order_id: record.order_id.clone(),
                    record: "ceidg_data".to_string(),
                });
            }
            state.ceidg.insert(record.order_id.clone(), record.clone());
            Ok(())
        }
        PendingOp::AttachResearch(record) => {
            require_order(state, &record.order_id)?;
            if state.research.contains_key(&record.order_id) {
                return Err(StorageError::AlreadyRecorded {
                    order_id: record.order_id.clone(),
                    record: "research_result".to_string(),
                });
            }
            state
                .research
                .insert(record.order_id.clone(), record.clone());
            Ok(())
        }
        PendingOp::AttachBiznesplan(record) => {
            require_order(state, &record.order_id)?;
            if state.biznesplany.contains_key(&record.order_id) {
                return Err(StorageError::AlreadyRecorded {
                    order_id: record.order_id.clone(),
                    record: "biznesplan".to_string(),
                });
            }
            state
                .biznesplany
                .insert(record.order_id.clone(), record.clone());
            Ok(())
        }
        PendingOp::UpdateBiznesplan(record) => {
            if !state.biznesplany.contains_key(&record.order_id) {
                return Err(StorageError::RecordMissing {
                    order_id: record.order_id.clone(),
                    record: "biznesplan".to_string(),
                });
            }
            state
                .biznesplany
                .insert(record.order_id.clone(), record.clone());
            Ok(())
        }
        PendingOp::AppendLog(record) => {
            require_order(state, &record.order_id)?;
            state.process_logs.push(record.clone());
            Ok(())
        }
        PendingOp::DeleteOrder(order_id) => {
            if state.orders.remove(order_id).is_none() {
                return Err(StorageError::OrderNotFound {
                    order_id: order_id.clone(),
                });
            }
            state.ceidg.remove(order_id);
            state.research.remove(order_id);
            state.biznesplany.remove(order_id);
            state.process_logs.retain(|l| &l.order_id != order_id);
            Ok(())
        }
    }
}

fn require_order(state: &Inner, order_id: &str) -> Result<(), StorageError> {
    if state.orders.contains_key(order_id) {
        Ok(())
    } else {
        Err(StorageError::OrderNotFound {
            order_id: order_id.to_string(),
        })
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot { ops: Vec::new() })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut inner = self.lock();
        // Replay against the committed state as of now. Another snapshot may
        // have committed since the ops were buffered, so every precondition
        // (OCC version, uniqueness) is checked again. All-or-nothing: the
        // working copy replaces the store only if every op applies.
        let mut working = inner.clone();
        for op in &snapshot.ops {
            apply(&mut working, op)?;
        }
        *inner = working;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn create_order(
        &self,
        snapshot: &mut MemorySnapshot,
        record: OrderRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::CreateOrder(record))
    }

    async fn get_order_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        order_id: &str,
    ) -> Result<OrderRecord, StorageError> {
        self.view(snapshot)
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| StorageError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    async fn update_order(
        &self,
        snapshot: &mut MemorySnapshot,
        update: OrderUpdate,
    ) -> Result<i64, StorageError> {
        let new_version = update.expected_version + 1;
        self.stage(snapshot, PendingOp::UpdateOrder(update))?;
        Ok(new_version)
    }

    async fn delete_order(
        &self,
        snapshot: &mut MemorySnapshot,
        order_id: &str,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::DeleteOrder(order_id.to_string()))
    }

    async fn attach_ceidg(
        &self,
        snapshot: &mut MemorySnapshot,
        record: CeidgRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::AttachCeidg(record))
    }

    async fn attach_research(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ResearchRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::AttachResearch(record))
    }

    async fn attach_biznesplan(
        &self,
        snapshot: &mut MemorySnapshot,
        record: BiznesplanRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::AttachBiznesplan(record))
    }

    async fn update_biznesplan(
        &self,
        snapshot: &mut MemorySnapshot,
        record: BiznesplanRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::UpdateBiznesplan(record))
    }

    async fn append_process_log(
        &self,
        snapshot: &mut MemorySnapshot,
        record: ProcessLogRecord,
    ) -> Result<(), StorageError> {
        self.stage(snapshot, PendingOp::AppendLog(record))
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderRecord, StorageError> {
        self.lock()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| StorageError::OrderNotFound {
                order_id: order_id.to_string(),
            })
    }

    async fn find_by_podio_item(
        &self,
        podio_item_id: &str,
    ) -> Result<Option<OrderRecord>, StorageError> {
        Ok(self
            .lock()
            .orders
            .values()
            .find(|o| o.podio_item_id == podio_item_id)
            .cloned())
    }

    async fn list_orders(
        &self,
        status_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>, StorageError> {
        let inner = self.lock();
        let mut orders: Vec<OrderRecord> = inner
            .orders
            .values()
            .filter(|o| status_filter.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        if limit > 0 {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn get_ceidg(&self, order_id: &str) -> Result<Option<CeidgRecord>, StorageError> {
        Ok(self
            .lock()
            .ceidg
            .get(order_id)
            .cloned())
    }

    async fn get_research(&self, order_id: &str) -> Result<Option<ResearchRecord>, StorageError> {
        Ok(self
            .lock()
            .research
            .get(order_id)
            .cloned())
    }

    async fn get_biznesplan(
        &self,
        order_id: &str,
    ) -> Result<Option<BiznesplanRecord>, StorageError> {
        Ok(self
            .lock()
            .biznesplany
            .get(order_id)
            .cloned())
    }

    async fn list_process_logs(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProcessLogRecord>, StorageError> {
        // Insertion order is creation order; no re-sort needed.
        Ok(self
            .lock()
            .process_logs
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }
}
