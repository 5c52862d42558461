//! The order pipeline: one snapshot per lifecycle operation.
//!
//! Every operation follows the same shape:
//!
//! 1. begin a storage snapshot
//! 2. re-read the order with a lock and decode its status
//! 3. refuse if the order is cancelled or terminal (cooperative cancellation
//!    check at the stage boundary)
//! 4. validate the requested edge against the state machine
//! 5. write the status / phase / progress update (OCC), any child records,
//!    and the audit log entry
//! 6. commit -- or abort on any failure, leaving no partial state

use biznesplan_core::{validate_transition, LogLevel, NewOrder, OrderStatus, Progress};
use biznesplan_storage::{
    BiznesplanRecord, CeidgRecord, OrderRecord, OrderStore, OrderUpdate, ProcessLogRecord,
    ResearchRecord,
};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::review::{ReviewContext, ReviewDecision, ReviewPolicy};

/// One reviewer pass over a generated document.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub approved: bool,
    /// 0-100 quality score, when the reviewer produced one.
    pub quality_score: Option<u8>,
    /// Open JSON list of issues found; empty list when clean.
    pub issues: serde_json::Value,
    pub feedback: Option<String>,
}

/// Drives orders through the lifecycle against an [`OrderStore`].
///
/// The pipeline is the single writer for an order: the external task queue
/// guarantees at most one in-flight task per order id, and the recorded
/// `worker_task_id` ties the order to that task. Readers may poll
/// concurrently; the OCC version check turns any write race into a
/// `StorageError::ConcurrentConflict` instead of a lost update.
pub struct Pipeline<S> {
    store: S,
    retry_ceiling: u32,
    review_policy: Box<dyn ReviewPolicy>,
}

impl<S: OrderStore> Pipeline<S> {
    pub fn new(store: S, retry_ceiling: u32, review_policy: Box<dyn ReviewPolicy>) -> Self {
        Self {
            store,
            retry_ceiling,
            review_policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and persist a new order at `pending`, with its first audit
    /// entry.
    pub async fn create_order(&self, new_order: NewOrder) -> Result<OrderRecord, PipelineError> {
        new_order.validate()?;
        let now = now_rfc3339();
        let record = OrderRecord {
            id: Uuid::new_v4().to_string(),
            podio_item_id: new_order.podio_item_id,
            podio_workspace_id: new_order.podio_workspace_id,
            podio_app_id: new_order.podio_app_id,
            nip: new_order.nip,
            full_name: new_order.full_name,
            email: new_order.email,
            phone: new_order.phone,
            services: new_order.services,
            expected_annual_revenue: new_order.expected_annual_revenue,
            notes: new_order.notes,
            status: OrderStatus::Pending.as_str().to_string(),
            worker_task_id: None,
            current_phase: None,
            progress_percent: 0,
            error_message: None,
            retry_count: 0,
            version: 0,
            created_at: now.clone(),
            updated_at: now.clone(),
            started_at: None,
            completed_at: None,
        };

        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            self.store.create_order(&mut snap, record.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        &record.id,
                        "order_received",
                        "Order received and queued".to_string(),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok::<(), PipelineError>(())
        }
        .await;
        self.finish(snap, staged).await?;

        tracing::info!(order_id = %record.id, podio_item_id = %record.podio_item_id, "order created");
        Ok(record)
    }

    /// `pending -> fetching_data`. Stamps `started_at` and records the
    /// worker's task id.
    pub async fn start(
        &self,
        order_id: &str,
        worker_task_id: &str,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            require_stage(order_id, status, OrderStatus::Pending)?;

            let mut update = transition_update(&record, status, OrderStatus::FetchingData, &now)?;
            update.current_phase = Some("Fetching business data".to_string());
            update.progress_percent = 0;
            update.worker_task_id = Some(worker_task_id.to_string());
            update.started_at = Some(now.clone());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        "fetching_data",
                        format!("Worker task {} started processing", worker_task_id),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::info!(order_id, worker_task_id, "order started");
        Ok(record)
    }

    /// Record in-stage progress: updates `current_phase` /
    /// `progress_percent` and appends the audit entry carrying the progress
    /// pair, without changing status. Progress never goes backwards within a
    /// stage.
    pub async fn report_progress(
        &self,
        order_id: &str,
        phase: &str,
        message: &str,
        progress: Progress,
        data: Option<serde_json::Value>,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            if !status.is_active_stage() {
                return Err(PipelineError::NotAnActiveStage {
                    order_id: order_id.to_string(),
                    status,
                });
            }
            let percent = progress.percent();
            if percent < record.progress_percent {
                return Err(PipelineError::ProgressRegression {
                    order_id: order_id.to_string(),
                    from: record.progress_percent,
                    to: percent,
                });
            }

            let mut update = base_update(&record, status, &now);
            update.current_phase = Some(message.to_string());
            update.progress_percent = percent;
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        phase,
                        message.to_string(),
                        LogLevel::Info,
                        data,
                        Some(progress),
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        self.finish(snap, staged).await
    }

    /// `fetching_data -> generating`. Attaches the CEIDG and research
    /// records in the same snapshot as the transition: the children and the
    /// status advance land together or not at all.
    pub async fn complete_fetch(
        &self,
        order_id: &str,
        mut ceidg: CeidgRecord,
        mut research: ResearchRecord,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            require_stage(order_id, status, OrderStatus::FetchingData)?;

            ceidg.order_id = order_id.to_string();
            research.order_id = order_id.to_string();
            self.store.attach_ceidg(&mut snap, ceidg).await?;
            self.store.attach_research(&mut snap, research).await?;

            let mut update = transition_update(&record, status, OrderStatus::Generating, &now)?;
            update.current_phase = Some("Generating business plan".to_string());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        "fetching_data",
                        "Registry data and market research recorded".to_string(),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::info!(order_id, "fetch stage completed");
        Ok(record)
    }

    /// `generating -> reviewing`. Attaches the generated document with the
    /// transition.
    pub async fn complete_generation(
        &self,
        order_id: &str,
        mut plan: BiznesplanRecord,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            require_stage(order_id, status, OrderStatus::Generating)?;

            plan.order_id = order_id.to_string();
            plan.review_status = "in_review".to_string();
            plan.updated_at = now.clone();
            self.store.attach_biznesplan(&mut snap, plan).await?;

            let mut update = transition_update(&record, status, OrderStatus::Reviewing, &now)?;
            update.current_phase = Some("Reviewing draft".to_string());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        "generating",
                        "Draft generated, sent for review".to_string(),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::info!(order_id, "generation completed");
        Ok(record)
    }

    /// Record a reviewer pass while in `reviewing`. The configured
    /// [`ReviewPolicy`] decides between approval, another refinement cycle,
    /// force-completion with residual issues, or failure at the iteration
    /// ceiling.
    pub async fn record_review(
        &self,
        order_id: &str,
        outcome: ReviewOutcome,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            require_stage(order_id, status, OrderStatus::Reviewing)?;

            let mut plan = self.store.get_biznesplan(order_id).await?.ok_or_else(|| {
                PipelineError::MissingChildRecord {
                    order_id: order_id.to_string(),
                    record: "biznesplan".to_string(),
                }
            })?;

            let decision = self.review_policy.decide(&ReviewContext {
                iterations_completed: plan.iterations,
                approved: outcome.approved,
                quality_score: outcome.quality_score,
            });

            plan.final_quality_score = outcome.quality_score;
            plan.final_issues = outcome.issues.clone();
            plan.updated_at = now.clone();
            let data = outcome
                .feedback
                .as_ref()
                .map(|feedback| serde_json::json!({ "feedback": feedback }));

            let (update, entry) = match decision {
                ReviewDecision::Approve => {
                    plan.review_status = "approved".to_string();
                    plan.generation_completed_at = Some(now.clone());
                    let mut update =
                        transition_update(&record, status, OrderStatus::Completed, &now)?;
                    update.current_phase = Some("Completed".to_string());
                    update.progress_percent = 100;
                    update.completed_at = Some(now.clone());
                    let entry = log_entry(
                        order_id,
                        "reviewing",
                        "Biznesplan approved".to_string(),
                        LogLevel::Info,
                        data,
                        None,
                        &now,
                    );
                    (update, entry)
                }
                ReviewDecision::Refine => {
                    plan.review_status = "in_review".to_string();
                    let mut update =
                        transition_update(&record, status, OrderStatus::Refining, &now)?;
                    update.current_phase = Some("Applying reviewer feedback".to_string());
                    let entry = log_entry(
                        order_id,
                        "reviewing",
                        format!(
                            "Review requested changes, starting iteration {}",
                            plan.iterations + 1
                        ),
                        LogLevel::Info,
                        data,
                        None,
                        &now,
                    );
                    (update, entry)
                }
                ReviewDecision::CompleteWithIssues => {
                    plan.review_status = "approved".to_string();
                    plan.generation_completed_at = Some(now.clone());
                    let mut update =
                        transition_update(&record, status, OrderStatus::Completed, &now)?;
                    update.current_phase = Some("Completed with residual issues".to_string());
                    update.progress_percent = 100;
                    update.completed_at = Some(now.clone());
                    let entry = log_entry(
                        order_id,
                        "reviewing",
                        format!(
                            "Iteration ceiling reached after {} refinements, completing with residual issues",
                            plan.iterations
                        ),
                        LogLevel::Warning,
                        data,
                        None,
                        &now,
                    );
                    (update, entry)
                }
                ReviewDecision::Fail => {
                    plan.review_status = "rejected".to_string();
                    let mut update =
                        transition_update(&record, status, OrderStatus::Failed, &now)?;
                    update.current_phase = Some("Failed".to_string());
                    update.error_message =
                        Some("review iteration ceiling exceeded without approval".to_string());
                    let entry = log_entry(
                        order_id,
                        "reviewing",
                        format!(
                            "Iteration ceiling reached after {} refinements, rejecting document",
                            plan.iterations
                        ),
                        LogLevel::Error,
                        data,
                        None,
                        &now,
                    );
                    (update, entry)
                }
            };

            self.store.update_biznesplan(&mut snap, plan).await?;
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store.append_process_log(&mut snap, entry).await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::info!(order_id, status = %record.status, "review recorded");
        Ok(record)
    }

    /// `refining -> reviewing`. Replaces the document with the refined
    /// draft and counts the iteration.
    pub async fn complete_refinement(
        &self,
        order_id: &str,
        refined: BiznesplanRecord,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            require_stage(order_id, status, OrderStatus::Refining)?;

            let previous = self.store.get_biznesplan(order_id).await?.ok_or_else(|| {
                PipelineError::MissingChildRecord {
                    order_id: order_id.to_string(),
                    record: "biznesplan".to_string(),
                }
            })?;

            let mut plan = refined;
            plan.id = previous.id;
            plan.order_id = order_id.to_string();
            plan.iterations = previous.iterations + 1;
            plan.review_status = "in_review".to_string();
            plan.created_at = previous.created_at;
            plan.updated_at = now.clone();
            let iterations = plan.iterations;
            self.store.update_biznesplan(&mut snap, plan).await?;

            let mut update = transition_update(&record, status, OrderStatus::Reviewing, &now)?;
            update.current_phase = Some("Reviewing draft".to_string());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        "refining",
                        format!("Refined draft ready for review (iteration {})", iterations),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        self.finish(snap, staged).await
    }

    /// Record a transient stage failure. Below the retry ceiling the order
    /// re-enters its current stage with `retry_count` incremented and
    /// progress reset to 0; at the ceiling it moves to `failed` with
    /// `error_message` populated. Both paths append an ERROR-level entry.
    pub async fn record_retry(
        &self,
        order_id: &str,
        stage_error: &str,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            if !status.is_active_stage() {
                return Err(PipelineError::NotAnActiveStage {
                    order_id: order_id.to_string(),
                    status,
                });
            }
            let attempts = record.retry_count + 1;

            if attempts > self.retry_ceiling {
                let mut update = transition_update(&record, status, OrderStatus::Failed, &now)?;
                update.current_phase = Some("Failed".to_string());
                update.error_message = Some(stage_error.to_string());
                update.retry_count = attempts;
                self.store.update_order(&mut snap, update.clone()).await?;
                self.store
                    .append_process_log(
                        &mut snap,
                        log_entry(
                            order_id,
                            status.as_str(),
                            format!(
                                "Retry ceiling exceeded after {} attempts: {}",
                                attempts, stage_error
                            ),
                            LogLevel::Error,
                            None,
                            None,
                            &now,
                        ),
                    )
                    .await?;
                return Ok(patched(record, update));
            }

            // Self-edge: re-enter the same stage for a fresh attempt. The
            // progress floor restarts with the attempt.
            let mut update = transition_update(&record, status, status, &now)?;
            update.retry_count = attempts;
            update.progress_percent = 0;
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        status.as_str(),
                        format!(
                            "Attempt {}/{} failed: {}; retrying",
                            attempts, self.retry_ceiling, stage_error
                        ),
                        LogLevel::Error,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        if record.status == OrderStatus::Failed.as_str() {
            tracing::error!(order_id, error = %stage_error, "retry ceiling exceeded");
        } else {
            tracing::warn!(order_id, attempts = record.retry_count, "stage retry");
        }
        Ok(record)
    }

    /// Move any non-terminal order to `cancelled`. Safe to issue while a
    /// worker is in flight: the worker's next snapshot read observes the
    /// cancellation and aborts without further side effects.
    pub async fn cancel(&self, order_id: &str) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            let mut update = transition_update(&record, status, OrderStatus::Cancelled, &now)?;
            update.current_phase = Some("Cancelled".to_string());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        "cancelled",
                        "Order cancelled on request".to_string(),
                        LogLevel::Info,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::info!(order_id, "order cancelled");
        Ok(record)
    }

    /// Move any non-terminal order to `failed` with an error message.
    pub async fn fail(
        &self,
        order_id: &str,
        message: &str,
    ) -> Result<OrderRecord, PipelineError> {
        let now = now_rfc3339();
        let mut snap = self.store.begin_snapshot().await?;
        let staged = async {
            let (record, status) = self.load_for_transition(&mut snap, order_id).await?;
            let mut update = transition_update(&record, status, OrderStatus::Failed, &now)?;
            update.current_phase = Some("Failed".to_string());
            update.error_message = Some(message.to_string());
            self.store.update_order(&mut snap, update.clone()).await?;
            self.store
                .append_process_log(
                    &mut snap,
                    log_entry(
                        order_id,
                        status.as_str(),
                        message.to_string(),
                        LogLevel::Error,
                        None,
                        None,
                        &now,
                    ),
                )
                .await?;
            Ok(patched(record, update))
        }
        .await;
        let record = self.finish(snap, staged).await?;
        tracing::error!(order_id, error = %message, "order failed");
        Ok(record)
    }

    // ── Internals ─────────────────────────────────────────────────────────

    /// Read the order with a lock and refuse terminal states. The cancelled
    /// check here is what makes worker cancellation cooperative: every
    /// operation re-reads inside its own snapshot before any side effect.
    async fn load_for_transition(
        &self,
        snap: &mut S::Snapshot,
        order_id: &str,
    ) -> Result<(OrderRecord, OrderStatus), PipelineError> {
        let record = self.store.get_order_for_update(snap, order_id).await?;
        let status = OrderStatus::decode(&record.status)?;
        if status == OrderStatus::Cancelled {
            return Err(PipelineError::OrderCancelled {
                order_id: order_id.to_string(),
            });
        }
        if status.is_terminal() {
            return Err(PipelineError::TerminalState {
                order_id: order_id.to_string(),
                status,
            });
        }
        Ok((record, status))
    }

    /// Commit on success, abort on failure.
    async fn finish<T>(
        &self,
        snap: S::Snapshot,
        staged: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        match staged {
            Ok(value) => {
                self.store.commit_snapshot(snap).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.store.abort_snapshot(snap).await;
                Err(e)
            }
        }
    }
}

/// Refuse an operation issued in the wrong stage.
fn require_stage(
    order_id: &str,
    found: OrderStatus,
    expected: OrderStatus,
) -> Result<(), PipelineError> {
    if found == expected {
        Ok(())
    } else {
        Err(PipelineError::WrongStage {
            order_id: order_id.to_string(),
            expected,
            found,
        })
    }
}

/// An update that carries the order's fields forward unchanged.
fn base_update(record: &OrderRecord, status: OrderStatus, now: &str) -> OrderUpdate {
    OrderUpdate {
        order_id: record.id.clone(),
        expected_version: record.version,
        status: status.as_str().to_string(),
        current_phase: record.current_phase.clone(),
        progress_percent: record.progress_percent,
        error_message: record.error_message.clone(),
        retry_count: record.retry_count,
        worker_task_id: record.worker_task_id.clone(),
        started_at: None,
        completed_at: None,
        updated_at: now.to_string(),
    }
}

/// Validate the edge, then build the update for the target status.
fn transition_update(
    record: &OrderRecord,
    from: OrderStatus,
    to: OrderStatus,
    now: &str,
) -> Result<OrderUpdate, PipelineError> {
    validate_transition(from, to)?;
    Ok(base_update(record, to, now))
}

/// The order record as it will read back after the update commits.
fn patched(record: OrderRecord, update: OrderUpdate) -> OrderRecord {
    let mut record = record;
    record.status = update.status;
    record.current_phase = update.current_phase;
    record.progress_percent = update.progress_percent;
    record.error_message = update.error_message;
    record.retry_count = update.retry_count;
    record.worker_task_id = update.worker_task_id;
    record.updated_at = update.updated_at;
    if update.started_at.is_some() {
        record.started_at = update.started_at;
    }
    if update.completed_at.is_some() {
        record.completed_at = update.completed_at;
    }
    record.version += 1;
    record
}

fn log_entry(
    order_id: &str,
    phase: &str,
    message: String,
    level: LogLevel,
    data: Option<serde_json::Value>,
    progress: Option<Progress>,
    now: &str,
) -> ProcessLogRecord {
    ProcessLogRecord {
        id: Uuid::new_v4().to_string(),
        order_id: order_id.to_string(),
        phase: phase.to_string(),
        message,
        level: level.as_str().to_string(),
        data,
        progress_current: progress.map(|p| p.current),
        progress_total: progress.map(|p| p.total),
        created_at: now.to_string(),
    }
}

/// RFC 3339 timestamp for the current instant. Formatted by hand to avoid
/// the format_description machinery for a fixed layout.
fn now_rfc3339() -> String {
    let now = time::OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}
