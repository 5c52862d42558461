//! Conformance test suite for `OrderStore` implementations.
//!
//! A backend-agnostic suite that any `OrderStore` implementation can run to
//! verify correctness. The suite covers:
//!
//! - **Initialization**: order creation, podio item uniqueness
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-record snapshots
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Process log**: append-only ordering and restartable listing
//! - **Cascade**: deleting an order removes every dependent record
//! - **Concurrency**: racing snapshots resolve to exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use biznesplan_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cascade;
mod commit;
mod concurrent;
mod init;
mod log;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{
    BiznesplanRecord, CeidgRecord, OrderRecord, OrderUpdate, ProcessLogRecord, ResearchRecord,
};
use crate::OrderStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "cascade").
    pub category: String,
    /// Test name (e.g. "create_order_starts_pending_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: OrderStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(log::run_log_tests(&factory).await);
    results.extend(cascade::run_cascade_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_order(id: &str, podio_item_id: &str) -> OrderRecord {
    OrderRecord {
        id: id.to_string(),
        podio_item_id: podio_item_id.to_string(),
        podio_workspace_id: None,
        podio_app_id: None,
        nip: "1234567890".to_string(),
        full_name: "Jan Kowalski".to_string(),
        email: Some("jan@example.pl".to_string()),
        phone: None,
        services: vec!["Software Development".to_string()],
        expected_annual_revenue: Some(250_000),
        notes: None,
        status: "pending".to_string(),
        worker_task_id: None,
        current_phase: None,
        progress_percent: 0,
        error_message: None,
        retry_count: 0,
        version: 0,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
        started_at: None,
        completed_at: None,
    }
}

fn make_update(order_id: &str, expected_version: i64, status: &str) -> OrderUpdate {
    OrderUpdate {
        order_id: order_id.to_string(),
        expected_version,
        status: status.to_string(),
        current_phase: Some(status.to_string()),
        progress_percent: 0,
        error_message: None,
        retry_count: 0,
        worker_task_id: None,
        started_at: None,
        completed_at: None,
        updated_at: "2026-01-01T00:01:00Z".to_string(),
    }
}

fn make_ceidg(id: &str, order_id: &str) -> CeidgRecord {
    CeidgRecord {
        id: id.to_string(),
        order_id: order_id.to_string(),
        nip: "1234567890".to_string(),
        regon: None,
        company_name: "Kowalski Software".to_string(),
        first_name: Some("Jan".to_string()),
        last_name: Some("Kowalski".to_string()),
        street: None,
        building_no: None,
        apartment_no: None,
        postal_code: None,
        city: Some("Warszawa".to_string()),
        province: None,
        pkd_main: Some("62.01.Z".to_string()),
        pkd_main_name: None,
        pkd_other: serde_json::Value::Null,
        activity_started: Some("2020-01-01".to_string()),
        activity_ended: None,
        entry_status: Some("Aktywny".to_string()),
        raw_response: serde_json::json!({"test": true}),
        fetched_at: "2026-01-01T00:00:30Z".to_string(),
    }
}

fn make_research(id: &str, order_id: &str) -> ResearchRecord {
    ResearchRecord {
        id: id.to_string(),
        order_id: order_id.to_string(),
        market_data: serde_json::json!({"industry_overview": "IT services"}),
        swot: serde_json::json!({"strengths": ["niche expertise"]}),
        sources: serde_json::json!([]),
        research_method: Some("mock".to_string()),
        research_queries: serde_json::Value::Null,
        research_duration_seconds: Some(12),
        source_count: 3,
        source_quality_score: Some(7),
        relevance_score: Some(8),
        researched_at: "2026-01-01T00:00:45Z".to_string(),
    }
}

fn make_biznesplan(id: &str, order_id: &str) -> BiznesplanRecord {
    BiznesplanRecord {
        id: id.to_string(),
        order_id: order_id.to_string(),
        content_markdown: Some("# Biznesplan".to_string()),
        review_status: "draft".to_string(),
        iterations: 0,
        current_section_index: 0,
        total_sections: 9,
        generator_log: serde_json::Value::Null,
        reviewer_log: serde_json::Value::Null,
        final_word_count: None,
        final_page_count: None,
        final_quality_score: None,
        final_issues: serde_json::Value::Null,
        total_cost_cents: Some(25),
        cache_hit_rate: None,
        generation_started_at: None,
        generation_completed_at: None,
        generation_duration_seconds: None,
        created_at: "2026-01-01T00:01:00Z".to_string(),
        updated_at: "2026-01-01T00:01:00Z".to_string(),
    }
}

fn make_log(id: &str, order_id: &str, phase: &str, message: &str) -> ProcessLogRecord {
    ProcessLogRecord {
        id: id.to_string(),
        order_id: order_id.to_string(),
        phase: phase.to_string(),
        message: message.to_string(),
        level: "info".to_string(),
        data: None,
        progress_current: None,
        progress_total: None,
        created_at: "2026-01-01T00:00:10Z".to_string(),
    }
}

/// Create and commit an order, returning nothing; helper for tests that need
/// a committed order to work against.
async fn seed_order<S: OrderStore>(storage: &S, id: &str, podio_item_id: &str) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .create_order(&mut snap, make_order(id, podio_item_id))
        .await
        .map_err(|e| format!("create: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(())
}
