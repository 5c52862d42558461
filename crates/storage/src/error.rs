/// All errors that can be returned by an `OrderStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict -- another writer committed an update
    /// to this order first. The expected version was not found.
    #[error("concurrent conflict on order {order_id}: expected version {expected_version}")]
    ConcurrentConflict {
        order_id: String,
        expected_version: i64,
    },

    /// No order with the given id.
    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// An order with this intake item id already exists.
    #[error("order already exists for podio item: {podio_item_id}")]
    DuplicatePodioItem { podio_item_id: String },

    /// The 1:1 child record was already attached to this order.
    #[error("{record} already recorded for order {order_id}")]
    AlreadyRecorded { order_id: String, record: String },

    /// Updating a child record that was never attached.
    #[error("{record} not recorded for order {order_id}")]
    RecordMissing { order_id: String, record: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
