//! End-to-end lifecycle tests over the in-memory store.

use biznesplan_core::{NewOrder, OrderStatus, Progress};
use biznesplan_engine::{IterationCapPolicy, Pipeline, PipelineError, ReviewOutcome};
use biznesplan_storage::{BiznesplanRecord, CeidgRecord, MemoryStore, OrderStore, ResearchRecord};

fn pipeline() -> Pipeline<MemoryStore> {
    pipeline_with(2, IterationCapPolicy::new(3))
}

fn pipeline_with(retry_ceiling: u32, policy: IterationCapPolicy) -> Pipeline<MemoryStore> {
    Pipeline::new(MemoryStore::new(), retry_ceiling, Box::new(policy))
}

fn new_order(podio_item_id: &str) -> NewOrder {
    NewOrder {
        podio_item_id: podio_item_id.to_string(),
        podio_workspace_id: None,
        podio_app_id: None,
        nip: "5213017228".to_string(),
        full_name: "Jan Kowalski".to_string(),
        email: Some("jan@example.pl".to_string()),
        phone: Some("+48600700800".to_string()),
        services: vec!["Software Development".to_string(), "QA".to_string()],
        expected_annual_revenue: Some(300_000),
        notes: None,
    }
}

fn ceidg() -> CeidgRecord {
    CeidgRecord {
        id: "ceidg-1".to_string(),
        order_id: String::new(),
        nip: "5213017228".to_string(),
        regon: Some("12345678901234".to_string()),
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
        pkd_main_name: Some("Dzialalnosc zwiazana z oprogramowaniem".to_string()),
        pkd_other: serde_json::json!([]),
        activity_started: Some("2020-01-01".to_string()),
        activity_ended: None,
        entry_status: Some("Aktywny".to_string()),
        raw_response: serde_json::json!({}),
        fetched_at: "2026-02-01T10:00:00Z".to_string(),
    }
}

fn research() -> ResearchRecord {
    ResearchRecord {
        id: "res-1".to_string(),
        order_id: String::new(),
        market_data: serde_json::json!({"industry_overview": "IT services in Poland"}),
        swot: serde_json::json!({"strengths": ["niche expertise"]}),
        sources: serde_json::json!([{"title": "GUS report", "year": 2025}]),
        research_method: Some("perplexity".to_string()),
        research_queries: serde_json::json!(["IT market Poland 2025"]),
        research_duration_seconds: Some(40),
        source_count: 3,
        source_quality_score: Some(8),
        relevance_score: Some(9),
        researched_at: "2026-02-01T10:01:00Z".to_string(),
    }
}

fn draft_plan() -> BiznesplanRecord {
    BiznesplanRecord {
        id: "bp-1".to_string(),
        order_id: String::new(),
        content_markdown: Some("# Biznesplan\n...".to_string()),
        review_status: "draft".to_string(),
        iterations: 0,
        current_section_index: 9,
        total_sections: 9,
        generator_log: serde_json::json!({"api_calls": 10, "total_cost_usd": 0.25}),
        reviewer_log: serde_json::Value::Null,
        final_word_count: Some(9500),
        final_page_count: Some(27),
        final_quality_score: None,
        final_issues: serde_json::json!([]),
        total_cost_cents: Some(25),
        cache_hit_rate: Some(80),
        generation_started_at: Some("2026-02-01T10:02:00Z".to_string()),
        generation_completed_at: None,
        generation_duration_seconds: Some(600),
        created_at: "2026-02-01T10:02:00Z".to_string(),
        updated_at: "2026-02-01T10:02:00Z".to_string(),
    }
}

async fn drive_to_reviewing(pipeline: &Pipeline<MemoryStore>, podio: &str) -> String {
    let order = pipeline.create_order(new_order(podio)).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();
    pipeline
        .complete_generation(&order.id, draft_plan())
        .await
        .unwrap();
    order.id
}

fn approved() -> ReviewOutcome {
    ReviewOutcome {
        approved: true,
        quality_score: Some(92),
        issues: serde_json::json!([]),
        feedback: Some("High quality, meets all criteria".to_string()),
    }
}

fn needs_work() -> ReviewOutcome {
    ReviewOutcome {
        approved: false,
        quality_score: Some(60),
        issues: serde_json::json!([{"section": "SWOT", "severity": "minor"}]),
        feedback: Some("SWOT section lacks sources".to_string()),
    }
}

#[tokio::test]
async fn full_lifecycle_reaches_completed() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    assert_eq!(order.status, "pending");
    assert_eq!(order.progress_percent, 0);

    let order = pipeline.start(&order.id, "task-77").await.unwrap();
    assert_eq!(order.status, "fetching_data");
    assert!(order.started_at.is_some());
    assert_eq!(order.worker_task_id.as_deref(), Some("task-77"));

    let order = pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();
    assert_eq!(order.status, "generating");

    let order = pipeline
        .report_progress(
            &order.id,
            "generating_section_3",
            "Generating section 3/9",
            Progress::new(3, 9).unwrap(),
            Some(serde_json::json!({"section_name": "Analiza SWOT", "section_index": 3})),
        )
        .await
        .unwrap();
    assert_eq!(order.progress_percent, 33);
    assert_eq!(order.current_phase.as_deref(), Some("Generating section 3/9"));

    let order = pipeline
        .complete_generation(&order.id, draft_plan())
        .await
        .unwrap();
    assert_eq!(order.status, "reviewing");

    let order = pipeline.record_review(&order.id, approved()).await.unwrap();
    assert_eq!(order.status, "completed");
    assert_eq!(order.progress_percent, 100);
    assert!(order.completed_at.is_some());

    let plan = pipeline
        .store()
        .get_biznesplan(&order.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plan.review_status, "approved");
    assert_eq!(plan.final_quality_score, Some(92));
    assert!(plan.generation_completed_at.is_some());

    // Children landed with their transitions.
    assert!(pipeline.store().get_ceidg(&order.id).await.unwrap().is_some());
    assert!(pipeline
        .store()
        .get_research(&order.id)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn every_transition_carries_an_audit_entry() {
    let pipeline = pipeline();
    let id = drive_to_reviewing(&pipeline, "item-1").await;
    pipeline.record_review(&id, approved()).await.unwrap();

    let logs = pipeline.store().list_process_logs(&id).await.unwrap();
    let phases: Vec<&str> = logs.iter().map(|l| l.phase.as_str()).collect();
    assert_eq!(
        phases,
        vec![
            "order_received",
            "fetching_data",
            "fetching_data",
            "generating",
            "reviewing",
        ]
    );
    // Listing twice returns the same sequence.
    let again = pipeline.store().list_process_logs(&id).await.unwrap();
    assert_eq!(logs.len(), again.len());
    for (a, b) in logs.iter().zip(again.iter()) {
        assert_eq!(a.id, b.id);
    }
}

#[tokio::test]
async fn invalid_nip_is_rejected_before_persistence() {
    let pipeline = pipeline();
    let mut order = new_order("item-1");
    order.nip = "12345".to_string();
    let err = pipeline.create_order(order).await.unwrap_err();
    assert!(matches!(err, PipelineError::Domain(_)), "got: {err}");
}

#[tokio::test]
async fn duplicate_podio_item_is_rejected() {
    let pipeline = pipeline();
    pipeline.create_order(new_order("item-1")).await.unwrap();
    let err = pipeline.create_order(new_order("item-1")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)), "got: {err}");
}

#[tokio::test]
async fn operations_refuse_the_wrong_stage() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();

    // Not started yet: stage completions must refuse.
    let err = pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::WrongStage { .. }), "got: {err}");

    pipeline.start(&order.id, "task-1").await.unwrap();
    let err = pipeline.start(&order.id, "task-2").await.unwrap_err();
    assert!(matches!(err, PipelineError::WrongStage { .. }), "got: {err}");

    // A review can only be recorded while reviewing.
    let err = pipeline
        .record_review(&order.id, approved())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::WrongStage { .. }), "got: {err}");
}

#[tokio::test]
async fn cancelled_is_terminal() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();

    let cancelled = pipeline.cancel(&order.id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");

    // The in-flight worker's next operation observes the cancellation and
    // aborts: no document is attached afterwards.
    let err = pipeline
        .complete_generation(&order.id, draft_plan())
        .await
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::OrderCancelled { .. }),
        "got: {err}"
    );
    assert!(pipeline
        .store()
        .get_biznesplan(&order.id)
        .await
        .unwrap()
        .is_none());

    // No further transitions of any kind.
    let err = pipeline.cancel(&order.id).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::OrderCancelled { .. }),
        "got: {err}"
    );
    let err = pipeline.fail(&order.id, "boom").await.unwrap_err();
    assert!(
        matches!(err, PipelineError::OrderCancelled { .. }),
        "got: {err}"
    );

    let stored = pipeline.store().get_order(&order.id).await.unwrap();
    assert_eq!(stored.status, "cancelled");
}

#[tokio::test]
async fn retry_below_ceiling_reenters_the_stage() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();
    pipeline
        .report_progress(
            &order.id,
            "generating_section_2",
            "Generating section 2/9",
            Progress::new(2, 9).unwrap(),
            None,
        )
        .await
        .unwrap();

    let order = pipeline
        .record_retry(&order.id, "LLM timeout")
        .await
        .unwrap();
    assert_eq!(order.status, "generating");
    assert_eq!(order.retry_count, 1);
    // Fresh attempt: the progress floor restarts.
    assert_eq!(order.progress_percent, 0);

    let logs = pipeline.store().list_process_logs(&order.id).await.unwrap();
    let last = logs.last().unwrap();
    assert_eq!(last.level, "error");
    assert!(last.message.contains("LLM timeout"));
}

#[tokio::test]
async fn exceeding_retry_ceiling_fails_the_order() {
    let pipeline = pipeline_with(2, IterationCapPolicy::new(3));
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();

    pipeline.record_retry(&order.id, "timeout 1").await.unwrap();
    pipeline.record_retry(&order.id, "timeout 2").await.unwrap();
    let order = pipeline
        .record_retry(&order.id, "timeout 3")
        .await
        .unwrap();

    assert_eq!(order.status, "failed");
    assert_eq!(order.retry_count, 3);
    let message = order.error_message.expect("error_message populated");
    assert!(!message.is_empty());

    let logs = pipeline.store().list_process_logs(&order.id).await.unwrap();
    let last = logs.last().unwrap();
    assert_eq!(last.level, "error");
    assert!(last.message.contains("Retry ceiling exceeded"));

    // Terminal: nothing moves it again.
    let err = pipeline.record_retry(&order.id, "again").await.unwrap_err();
    assert!(
        matches!(err, PipelineError::TerminalState { .. }),
        "got: {err}"
    );
}

#[tokio::test]
async fn review_cycle_iterates_then_completes() {
    let pipeline = pipeline();
    let id = drive_to_reviewing(&pipeline, "item-1").await;

    let order = pipeline.record_review(&id, needs_work()).await.unwrap();
    assert_eq!(order.status, "refining");

    let order = pipeline
        .complete_refinement(&id, draft_plan())
        .await
        .unwrap();
    assert_eq!(order.status, "reviewing");
    let plan = pipeline.store().get_biznesplan(&id).await.unwrap().unwrap();
    assert_eq!(plan.iterations, 1);

    let order = pipeline.record_review(&id, approved()).await.unwrap();
    assert_eq!(order.status, "completed");
}

#[tokio::test]
async fn iteration_ceiling_completes_with_residual_issues() {
    let pipeline = pipeline_with(2, IterationCapPolicy::new(1));
    let id = drive_to_reviewing(&pipeline, "item-1").await;

    pipeline.record_review(&id, needs_work()).await.unwrap();
    pipeline.complete_refinement(&id, draft_plan()).await.unwrap();

    // Second unapproved review hits the ceiling: force-complete.
    let order = pipeline.record_review(&id, needs_work()).await.unwrap();
    assert_eq!(order.status, "completed");

    let plan = pipeline.store().get_biznesplan(&id).await.unwrap().unwrap();
    assert_eq!(plan.review_status, "approved");
    assert!(plan.final_issues.as_array().is_some_and(|a| !a.is_empty()));

    let logs = pipeline.store().list_process_logs(&id).await.unwrap();
    let last = logs.last().unwrap();
    assert_eq!(last.level, "warning");
    assert!(last.message.contains("residual issues"));
}

#[tokio::test]
async fn iteration_ceiling_can_fail_instead() {
    let policy = IterationCapPolicy {
        max_iterations: 1,
        fail_on_ceiling: true,
    };
    let pipeline = pipeline_with(2, policy);
    let id = drive_to_reviewing(&pipeline, "item-1").await;

    pipeline.record_review(&id, needs_work()).await.unwrap();
    pipeline.complete_refinement(&id, draft_plan()).await.unwrap();
    let order = pipeline.record_review(&id, needs_work()).await.unwrap();

    assert_eq!(order.status, "failed");
    assert!(order.error_message.is_some());
    let plan = pipeline.store().get_biznesplan(&id).await.unwrap().unwrap();
    assert_eq!(plan.review_status, "rejected");
}

#[tokio::test]
async fn progress_never_regresses_within_a_stage() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();

    pipeline
        .report_progress(
            &order.id,
            "generating_section_5",
            "Generating section 5/9",
            Progress::new(5, 9).unwrap(),
            None,
        )
        .await
        .unwrap();

    let err = pipeline
        .report_progress(
            &order.id,
            "generating_section_2",
            "Generating section 2/9",
            Progress::new(2, 9).unwrap(),
            None,
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::ProgressRegression { .. }),
        "got: {err}"
    );

    // The failed report left nothing behind.
    let stored = pipeline.store().get_order(&order.id).await.unwrap();
    assert_eq!(stored.progress_percent, 55);
}

#[tokio::test]
async fn progress_entries_carry_the_pair() {
    let pipeline = pipeline();
    let order = pipeline.create_order(new_order("item-1")).await.unwrap();
    pipeline.start(&order.id, "task-1").await.unwrap();
    pipeline
        .complete_fetch(&order.id, ceidg(), research())
        .await
        .unwrap();
    pipeline
        .report_progress(
            &order.id,
            "generating_section_3",
            "Generating section 3/9",
            Progress::new(3, 9).unwrap(),
            None,
        )
        .await
        .unwrap();

    let logs = pipeline.store().list_process_logs(&order.id).await.unwrap();
    let entry = logs.last().unwrap();
    assert_eq!(entry.progress_current, Some(3));
    assert_eq!(entry.progress_total, Some(9));
    assert_eq!(entry.progress_percent(), Some(33));
}
