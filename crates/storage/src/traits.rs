use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    BiznesplanRecord, CeidgRecord, OrderRecord, OrderUpdate, ProcessLogRecord, ResearchRecord,
};

/// The storage trait for order backends.
///
/// An `OrderStore` implementation provides durable, transactional storage for
/// orders, their four child record kinds, and the append-only process log.
///
/// ## Snapshot semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` -- start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` -- commit and consume the transaction
///    OR `abort_snapshot(snapshot)` -- roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back. Commit is all-or-nothing: a snapshot that wrote a
/// status transition, a child record, and a log entry either lands all three
/// or none. Commit re-validates every version precondition, so of N snapshots
/// racing on the same order exactly one commits.
///
/// Within a snapshot, `get_order_for_update` observes the snapshot's own
/// pending writes on top of the latest committed state (`SELECT ... FOR
/// UPDATE` semantics); other snapshots never see uncommitted writes.
///
/// ## Transition/audit coupling
///
/// Every `update_order` that changes `status` must be accompanied by an
/// `append_process_log` in the SAME snapshot. This is what guarantees that a
/// reader never observes a status without its matching audit entry.
///
/// ## Cascade
///
/// `delete_order` removes the order and every dependent record (CEIDG,
/// research, biznesplan, process log) atomically. A relational backend may
/// lean on native `ON DELETE CASCADE`; either way no orphan survives.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Order mutations (within snapshot) ─────────────────────────────────

    /// Insert a new order. The record must arrive at status `"pending"`,
    /// version 0. A duplicate `podio_item_id` is `DuplicatePodioItem`.
    async fn create_order(
        &self,
        snapshot: &mut Self::Snapshot,
        record: OrderRecord,
    ) -> Result<(), StorageError>;

    /// Read an order's current record, locking the row for update until the
    /// snapshot commits or aborts.
    async fn get_order_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        order_id: &str,
    ) -> Result<OrderRecord, StorageError>;

    /// Apply a version-validated update of the order's lifecycle fields.
    ///
    /// Conditional on `version == update.expected_version`; zero rows
    /// affected is `ConcurrentConflict`. Returns the new version number.
    async fn update_order(
        &self,
        snapshot: &mut Self::Snapshot,
        update: OrderUpdate,
    ) -> Result<i64, StorageError>;

    /// Delete the order and cascade to all dependent records.
    async fn delete_order(
        &self,
        snapshot: &mut Self::Snapshot,
        order_id: &str,
    ) -> Result<(), StorageError>;

    // ── Child records (within snapshot) ───────────────────────────────────

    /// Attach the CEIDG registry data. Insert-once: a second attach for the
    /// same order is `AlreadyRecorded`.
    async fn attach_ceidg(
        &self,
        snapshot: &mut Self::Snapshot,
        record: CeidgRecord,
    ) -> Result<(), StorageError>;

    /// Attach the market research result. Insert-once per order.
    async fn attach_research(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ResearchRecord,
    ) -> Result<(), StorageError>;

    /// Attach the generated business plan. Insert-once per order.
    async fn attach_biznesplan(
        &self,
        snapshot: &mut Self::Snapshot,
        record: BiznesplanRecord,
    ) -> Result<(), StorageError>;

    /// Replace the business plan record (iteration and cost tracking across
    /// review cycles). Requires a previously attached record.
    async fn update_biznesplan(
        &self,
        snapshot: &mut Self::Snapshot,
        record: BiznesplanRecord,
    ) -> Result<(), StorageError>;

    /// Append one process log entry. Pure insert; existing entries are never
    /// mutated.
    async fn append_process_log(
        &self,
        snapshot: &mut Self::Snapshot,
        record: ProcessLogRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot, non-locking) ──────────────────

    /// Read an order without locking.
    async fn get_order(&self, order_id: &str) -> Result<OrderRecord, StorageError>;

    /// Look up an order by its intake item id.
    async fn find_by_podio_item(
        &self,
        podio_item_id: &str,
    ) -> Result<Option<OrderRecord>, StorageError>;

    /// List orders, optionally filtered by status string. `limit` of 0 means
    /// no limit.
    async fn list_orders(
        &self,
        status_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<OrderRecord>, StorageError>;

    /// Read the CEIDG child record, if attached.
    async fn get_ceidg(&self, order_id: &str) -> Result<Option<CeidgRecord>, StorageError>;

    /// Read the research child record, if attached.
    async fn get_research(&self, order_id: &str) -> Result<Option<ResearchRecord>, StorageError>;

    /// Read the biznesplan child record, if attached.
    async fn get_biznesplan(
        &self,
        order_id: &str,
    ) -> Result<Option<BiznesplanRecord>, StorageError>;

    /// List the order's process log ascending by creation order. The result
    /// is a fresh sequence each call -- re-reading returns the same entries
    /// again, not a one-shot cursor.
    async fn list_process_logs(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProcessLogRecord>, StorageError>;
}
