use biznesplan_core::{derive_percent, format_usd_cents};
use serde::{Deserialize, Serialize};

/// One business plan order as stored in the backend.
///
/// `status` and the log `level` fields persist as lowercase strings; decode
/// them through `biznesplan_core::OrderStatus::decode` /
/// `LogLevel::decode`, which reject unknown values. All timestamps are
/// RFC 3339 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    /// External intake item id. Unique across all orders.
    pub podio_item_id: String,
    pub podio_workspace_id: Option<String>,
    pub podio_app_id: Option<String>,

    /// Polish tax identifier, 10 digits.
    pub nip: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,

    /// Services the client offers, in listing order.
    pub services: Vec<String>,
    /// Expected annual revenue in PLN.
    pub expected_annual_revenue: Option<i64>,
    pub notes: Option<String>,

    /// Lifecycle state, lowercase string form.
    pub status: String,
    /// External task queue id of the worker driving this order, recorded
    /// for traceability (at most one in-flight task per order).
    pub worker_task_id: Option<String>,
    /// Human-readable phase label, e.g. "Generating section 3/9".
    pub current_phase: Option<String>,
    /// 0-100. Non-decreasing while the order sits in an active stage;
    /// reset to 0 when a retry re-enters a stage.
    pub progress_percent: u8,

    pub error_message: Option<String>,
    pub retry_count: u32,

    /// Optimistic concurrency counter. Increments by exactly 1 per
    /// committed update.
    pub version: i64,

    pub created_at: String,
    pub updated_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// A version-validated update of an order's lifecycle fields.
///
/// Applied conditionally on `version == expected_version`; a mismatch is a
/// `StorageError::ConcurrentConflict`. `status`, `current_phase`,
/// `progress_percent`, `error_message`, `retry_count`, `worker_task_id`,
/// and `updated_at` overwrite the stored values; `started_at` and
/// `completed_at` are written only when `Some` and never cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub expected_version: i64,
    pub status: String,
    pub current_phase: Option<String>,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub worker_task_id: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub updated_at: String,
}

/// Verified business identity data from the CEIDG registry, cached once per
/// order when the fetch stage completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeidgRecord {
    pub id: String,
    pub order_id: String,

    pub nip: String,
    pub regon: Option<String>,
    pub company_name: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,

    pub street: Option<String>,
    pub building_no: Option<String>,
    pub apartment_no: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,

    /// Main PKD activity code and its registry name.
    pub pkd_main: Option<String>,
    pub pkd_main_name: Option<String>,
    /// Additional PKD codes, open JSON list.
    pub pkd_other: serde_json::Value,

    /// Activity start / end dates as YYYY-MM-DD strings.
    pub activity_started: Option<String>,
    pub activity_ended: Option<String>,
    /// Registry entry status, e.g. "Aktywny".
    pub entry_status: Option<String>,

    /// Full registry response, kept for fields not yet modeled.
    pub raw_response: serde_json::Value,

    pub fetched_at: String,
}

impl CeidgRecord {
    /// Join the non-empty address parts with ", ".
    pub fn full_address(&self) -> String {
        [
            self.street.as_deref(),
            self.building_no.as_deref(),
            self.apartment_no.as_deref(),
            self.postal_code.as_deref(),
            self.city.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Market research findings and SWOT analysis, one per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRecord {
    pub id: String,
    pub order_id: String,

    /// Open JSON: industry overview, market size, trends, key players.
    pub market_data: serde_json::Value,
    /// Open JSON: strengths / weaknesses / opportunities / threats lists.
    pub swot: serde_json::Value,
    /// Open JSON list of cited sources.
    pub sources: serde_json::Value,

    pub research_method: Option<String>,
    pub research_queries: serde_json::Value,
    pub research_duration_seconds: Option<u64>,

    pub source_count: u32,
    /// 1-10 rating of source quality.
    pub source_quality_score: Option<u8>,
    /// 1-10 relevance to the business.
    pub relevance_score: Option<u8>,

    pub researched_at: String,
}

/// The generated business plan document and its generation metadata, one
/// per order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiznesplanRecord {
    pub id: String,
    pub order_id: String,

    pub content_markdown: Option<String>,
    /// draft / in_review / approved / rejected.
    pub review_status: String,

    /// Refinement iterations performed so far.
    pub iterations: u32,
    /// Section currently being generated, 0-based.
    pub current_section_index: u32,
    pub total_sections: u32,

    /// Open JSON: generator token/cost counters keyed by stage.
    pub generator_log: serde_json::Value,
    /// Open JSON: reviewer token/cost counters and per-iteration reviews.
    pub reviewer_log: serde_json::Value,

    pub final_word_count: Option<u32>,
    /// Estimated A4 pages.
    pub final_page_count: Option<u32>,
    /// 0-100 from the reviewer.
    pub final_quality_score: Option<u8>,
    /// Open JSON list of unresolved issues, if any.
    pub final_issues: serde_json::Value,

    /// Total generation cost in US cents.
    pub total_cost_cents: Option<i64>,
    /// Prompt cache hit rate, 0-100.
    pub cache_hit_rate: Option<u8>,

    pub generation_started_at: Option<String>,
    pub generation_completed_at: Option<String>,
    pub generation_duration_seconds: Option<u64>,

    pub created_at: String,
    pub updated_at: String,
}

impl BiznesplanRecord {
    /// Display form of the total cost: 25 -> "$0.25", absent -> "$0.00".
    pub fn total_cost_display(&self) -> String {
        format_usd_cents(self.total_cost_cents.unwrap_or(0))
    }
}

/// One append-only audit trail entry. Immutable once created; ordered by
/// creation, never updated or deleted except through the order cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessLogRecord {
    pub id: String,
    pub order_id: String,

    /// Stage label, e.g. "fetching_ceidg", "generating_section_3".
    pub phase: String,
    pub message: String,
    /// debug / info / warning / error.
    pub level: String,

    /// Open JSON payload. Documented optional keys: section_name,
    /// section_index, tokens_used, duration_seconds, cost_usd.
    pub data: Option<serde_json::Value>,

    pub progress_current: Option<u32>,
    pub progress_total: Option<u32>,

    pub created_at: String,
}

impl ProcessLogRecord {
    /// Percentage derived from the progress pair; `None` when either half
    /// is absent.
    pub fn progress_percent(&self) -> Option<u8> {
        derive_percent(self.progress_current, self.progress_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_progress_is_derived() {
        let entry = ProcessLogRecord {
            id: "log-1".to_string(),
            order_id: "order-1".to_string(),
            phase: "generating_section_3".to_string(),
            message: "Generating section 3/9".to_string(),
            level: "info".to_string(),
            data: None,
            progress_current: Some(3),
            progress_total: Some(9),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(entry.progress_percent(), Some(33));

        let mut no_total = entry.clone();
        no_total.progress_total = None;
        assert_eq!(no_total.progress_percent(), None);
    }

    #[test]
    fn cost_display() {
        let mut plan = BiznesplanRecord {
            id: "bp-1".to_string(),
            order_id: "order-1".to_string(),
            content_markdown: None,
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
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(plan.total_cost_display(), "$0.25");
        plan.total_cost_cents = None;
        assert_eq!(plan.total_cost_display(), "$0.00");
    }

    #[test]
    fn address_joins_present_parts() {
        let record = CeidgRecord {
            id: "ceidg-1".to_string(),
            order_id: "order-1".to_string(),
            nip: "1234567890".to_string(),
            regon: None,
            company_name: "Kowalski Software".to_string(),
            first_name: Some("Jan".to_string()),
            last_name: Some("Kowalski".to_string()),
            street: Some("Marszalkowska".to_string()),
            building_no: Some("1".to_string()),
            apartment_no: None,
            postal_code: Some("00-624".to_string()),
            city: Some("Warszawa".to_string()),
            province: Some("mazowieckie".to_string()),
            pkd_main: Some("62.01.Z".to_string()),
            pkd_main_name: None,
            pkd_other: serde_json::Value::Null,
            activity_started: Some("2020-01-01".to_string()),
            activity_ended: None,
            entry_status: Some("Aktywny".to_string()),
            raw_response: serde_json::Value::Null,
            fetched_at: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(record.full_address(), "Marszalkowska, 1, 00-624, Warszawa");
    }
}
