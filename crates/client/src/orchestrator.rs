//! Generation orchestrator.
//!
//! Drives one unit through `pending -> generating -> {completed, failed}`:
//! checks dependencies, opens the generation request, applies streamed
//! chunks to the [`Workspace`](quill_core::workspace::Workspace) cache in
//! arrival order, and reconciles with the backend once the unit completes.
//!
//! At most one generation per unit runs at a time. Every generation gets a
//! child of the orchestrator's master [`CancellationToken`], so a single
//! unit can be cancelled with [`Orchestrator::cancel`] and everything with
//! [`Orchestrator::shutdown`].
//!
//! Partial text lives in the cache only while a generation runs. Any ending
//! other than completion (failure, cancellation, interruption, transport
//! error) discards it.
//!
//! [`Orchestrator::run_phase`] generates a whole phase and, once every unit
//! in it is completed, advances the project when the next phase is
//! autonomous. A supervised next phase is reported as awaiting confirmation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use quill_core::autonomy::{self, PhaseTransition};
use quill_core::dependency::{describe_blockers, is_eligible, unmet_dependencies, Blocker};
use quill_core::error::CoreError;
use quill_core::status::UnitStatus;
use quill_core::types::EntityId;
use quill_core::unit::{ContentUnit, UnitKind};
use quill_events::{EventBus, NotificationService, WorkspaceEvent};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiClient, SseStream};
use crate::error::{ClientError, ClientResult};
use crate::payload::{validate, GenerationEvent, GenerationPayload};
use crate::projects::save_phase;
use crate::SharedWorkspace;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How a call to [`Orchestrator::generate`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The unit is `completed` with this content.
    Completed { content: String },
    /// The backend reported an error; the unit is `failed`.
    Failed { message: String },
    /// Cancelled by the caller. Status is left as last observed.
    Cancelled,
    /// The stream ended without `done` or `error`. Status is left as last
    /// observed.
    Interrupted,
    /// Dependencies are unmet. Nothing was sent.
    Blocked { blockers: Vec<Blocker> },
    /// A generation for this unit is already running; this call was ignored.
    AlreadyInFlight,
}

/// Result of [`Orchestrator::run_phase`].
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRun {
    pub outcomes: Vec<(EntityId, GenerationOutcome)>,
    /// Present when the phase is the project's current one and all of its
    /// units are completed.
    pub transition: Option<PhaseTransition>,
}

impl GenerationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, GenerationOutcome::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// In-flight tracking
// ---------------------------------------------------------------------------

type InFlightMap = Mutex<HashMap<EntityId, CancellationToken>>;

fn lock(map: &InFlightMap) -> MutexGuard<'_, HashMap<EntityId, CancellationToken>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes the unit from the in-flight map when the generation ends,
/// however it ends.
struct InFlightGuard<'a> {
    map: &'a InFlightMap,
    unit_id: EntityId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock(self.map).remove(&self.unit_id);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    api: ApiClient,
    workspace: SharedWorkspace,
    bus: Arc<EventBus>,
    notifications: Option<Arc<NotificationService>>,
    in_flight: InFlightMap,
    master: CancellationToken,
}

impl Orchestrator {
    pub fn new(api: ApiClient, workspace: SharedWorkspace, bus: Arc<EventBus>) -> Self {
        Self {
            api,
            workspace,
            bus,
            notifications: None,
            in_flight: Mutex::new(HashMap::new()),
            master: CancellationToken::new(),
        }
    }

    /// Surface blockers, failures and completions as toasts.
    pub fn with_notifications(mut self, notifications: Arc<NotificationService>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.workspace
    }

    pub fn is_in_flight(&self, unit_id: &str) -> bool {
        lock(&self.in_flight).contains_key(unit_id)
    }

    /// Cancel the running generation of `unit_id`. Returns `false` when none
    /// is running.
    pub fn cancel(&self, unit_id: &str) -> bool {
        match lock(&self.in_flight).get(unit_id) {
            Some(token) => {
                tracing::info!(unit_id = %unit_id, "Cancelling generation");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running generation. Later calls to
    /// [`generate`](Self::generate) return `Cancelled` immediately.
    pub fn shutdown(&self) {
        tracing::info!("Orchestrator shutting down");
        self.master.cancel();
    }

    /// Generate one unit. See the module docs for the state machine.
    pub async fn generate(&self, unit_id: &str) -> ClientResult<GenerationOutcome> {
        let unit = {
            let ws = self.workspace.read().await;
            let unit = ws
                .unit(unit_id)
                .cloned()
                .ok_or_else(|| CoreError::unit_not_found(unit_id))?;
            if !is_eligible(&unit, &*ws) {
                let blockers = unmet_dependencies(&unit, &*ws);
                drop(ws);
                return Ok(self.blocked(&unit, blockers));
            }
            unit
        };

        if self.master.is_cancelled() {
            return Ok(GenerationOutcome::Cancelled);
        }
        let token = {
            let mut map = lock(&self.in_flight);
            if map.contains_key(unit_id) {
                tracing::debug!(unit_id = %unit_id, "Generation already in flight, ignoring");
                return Ok(GenerationOutcome::AlreadyInFlight);
            }
            let token = self.master.child_token();
            map.insert(unit_id.to_string(), token.clone());
            token
        };
        let _guard = InFlightGuard {
            map: &self.in_flight,
            unit_id: unit_id.to_string(),
        };

        self.workspace.write().await.begin_generation(unit_id)?;
        self.bus.publish(WorkspaceEvent::GenerationStarted {
            unit_id: unit_id.to_string(),
        });
        tracing::info!(
            unit_id = %unit_id,
            unit_name = %unit.name,
            kind = ?unit.kind,
            "Generation started",
        );

        let result = match unit.kind {
            UnitKind::Field => self.run_field(&unit, &token).await,
            UnitKind::Block => self.run_block(&unit, &token).await,
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(unit_id = %unit_id, outcome = outcome_label(outcome), "Generation finished");
            }
            Err(e) => {
                tracing::error!(unit_id = %unit_id, error = %e, "Generation request failed");
                self.workspace.write().await.clear_partial(unit_id);
                self.notify_error(format!("Generation of '{}' failed: {e}", unit.name));
            }
        }
        result
    }

    /// Generate every unit of `phase` that is not yet completed, in order.
    ///
    /// Units are attempted one after another so a unit whose dependencies
    /// were produced earlier in the same pass sees them completed. Stops at
    /// the first cancellation.
    pub async fn generate_phase(&self, phase: &str) -> ClientResult<Vec<(EntityId, GenerationOutcome)>> {
        let ids: Vec<EntityId> = {
            let ws = self.workspace.read().await;
            ws.units_in_phase(phase)
                .into_iter()
                .filter(|u| u.status != UnitStatus::Completed)
                .map(|u| u.id.clone())
                .collect()
        };

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.generate(&id).await?;
            let stop = outcome == GenerationOutcome::Cancelled;
            outcomes.push((id, outcome));
            if stop {
                break;
            }
        }
        Ok(outcomes)
    }

    /// [`generate_phase`](Self::generate_phase), then advance the project
    /// past `phase` if it is current and fully completed. The advance is
    /// persisted only when the next phase is autonomous.
    pub async fn run_phase(&self, phase: &str) -> ClientResult<PhaseRun> {
        let outcomes = self.generate_phase(phase).await?;

        let project = {
            let ws = self.workspace.read().await;
            let finished = ws
                .units_in_phase(phase)
                .iter()
                .all(|u| u.status == UnitStatus::Completed);
            ws.project()
                .filter(|p| finished && p.current_phase == phase)
                .cloned()
        };
        let Some(mut project) = project else {
            return Ok(PhaseRun {
                outcomes,
                transition: None,
            });
        };

        let transition = autonomy::advance(&mut project)?;
        if !matches!(transition, PhaseTransition::AwaitingConfirmation { .. }) {
            save_phase(&self.api, &self.workspace, &self.bus, project).await?;
        }
        tracing::info!(phase = %phase, transition = ?transition, "Phase run finished");
        Ok(PhaseRun {
            outcomes,
            transition: Some(transition),
        })
    }

    // ---- fields: streaming ----

    async fn run_field(
        &self,
        unit: &ContentUnit,
        token: &CancellationToken,
    ) -> ClientResult<GenerationOutcome> {
        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(self.cancelled(&unit.id).await),
            opened = self.api.generate_field_stream(&unit.id, &unit.pre_answers) => opened,
        };
        let stream = match opened {
            Ok(stream) => stream,
            Err(ClientError::Api { status, message }) => {
                tracing::warn!(unit_id = %unit.id, status, "Backend rejected generation");
                return self.failed(unit, message).await;
            }
            Err(e) => return Err(e),
        };
        self.consume_stream(unit, stream, token).await
    }

    async fn consume_stream(
        &self,
        unit: &ContentUnit,
        mut stream: SseStream,
        token: &CancellationToken,
    ) -> ClientResult<GenerationOutcome> {
        let id = unit.id.as_str();
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(self.cancelled(id).await),
                next = stream.next() => next,
            };

            let value = match next {
                Some(Ok(value)) => value,
                Some(Err(e)) => return Err(e),
                None => return Ok(self.interrupted(id).await),
            };
            let Some(payload) = validate::<GenerationPayload>(value) else {
                continue;
            };

            for event in payload.into_events() {
                match event {
                    GenerationEvent::Chunk(chunk) => {
                        let accumulated_len = {
                            let mut ws = self.workspace.write().await;
                            ws.append_chunk(id, &chunk).len()
                        };
                        tracing::trace!(unit_id = %id, bytes = chunk.len(), "Chunk received");
                        self.bus.publish(WorkspaceEvent::ChunkAppended {
                            unit_id: id.to_string(),
                            chunk,
                            accumulated_len,
                        });
                    }
                    GenerationEvent::Done { content } => {
                        return self.completed(unit, content).await;
                    }
                    GenerationEvent::Error(message) => {
                        return self.failed(unit, message).await;
                    }
                }
            }
        }
    }

    // ---- blocks: blocking request ----

    async fn run_block(
        &self,
        unit: &ContentUnit,
        token: &CancellationToken,
    ) -> ClientResult<GenerationOutcome> {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(self.cancelled(&unit.id).await),
            result = self.api.generate_block(&unit.id) => result,
        };
        match result {
            Ok(block) if block.status == UnitStatus::Failed => {
                self.failed(unit, "Block generation failed".to_string()).await
            }
            Ok(block) => {
                let content = block.content.clone();
                self.workspace.write().await.apply_unit(block)?;
                self.completed(unit, Some(content)).await
            }
            Err(ClientError::Api { message, .. }) => self.failed(unit, message).await,
            Err(e) => Err(e),
        }
    }

    // ---- terminal transitions ----

    async fn completed(
        &self,
        unit: &ContentUnit,
        content: Option<String>,
    ) -> ClientResult<GenerationOutcome> {
        let content = self
            .workspace
            .write()
            .await
            .complete_generation(&unit.id, content)?;
        self.bus.publish(WorkspaceEvent::GenerationCompleted {
            unit_id: unit.id.clone(),
            content: content.clone(),
        });
        self.reconcile(&unit.project_id, unit.kind).await;
        if let Some(n) = &self.notifications {
            n.success(format!("'{}' generated", unit.name));
        }
        Ok(GenerationOutcome::Completed { content })
    }

    async fn failed(&self, unit: &ContentUnit, message: String) -> ClientResult<GenerationOutcome> {
        self.workspace.write().await.fail_generation(&unit.id)?;
        tracing::warn!(unit_id = %unit.id, error = %message, "Generation reported an error");
        self.bus.publish(WorkspaceEvent::GenerationFailed {
            unit_id: unit.id.clone(),
            message: message.clone(),
        });
        self.notify_error(format!("Generation of '{}' failed: {message}", unit.name));
        Ok(GenerationOutcome::Failed { message })
    }

    async fn cancelled(&self, unit_id: &str) -> GenerationOutcome {
        self.workspace.write().await.clear_partial(unit_id);
        self.bus.publish(WorkspaceEvent::GenerationCancelled {
            unit_id: unit_id.to_string(),
        });
        GenerationOutcome::Cancelled
    }

    async fn interrupted(&self, unit_id: &str) -> GenerationOutcome {
        self.workspace.write().await.clear_partial(unit_id);
        tracing::warn!(unit_id = %unit_id, "Generation stream ended without a terminal event");
        self.bus.publish(WorkspaceEvent::GenerationInterrupted {
            unit_id: unit_id.to_string(),
        });
        GenerationOutcome::Interrupted
    }

    fn blocked(&self, unit: &ContentUnit, blockers: Vec<Blocker>) -> GenerationOutcome {
        let names = describe_blockers(&blockers);
        tracing::info!(unit_id = %unit.id, blockers = %names, "Generation blocked by dependencies");
        self.bus.publish(WorkspaceEvent::GenerationBlocked {
            unit_id: unit.id.clone(),
            blockers: blockers.iter().map(|b| b.display_name().to_string()).collect(),
        });
        if let Some(n) = &self.notifications {
            n.warning(format!("Generate {names} before '{}'", unit.name));
        }
        GenerationOutcome::Blocked { blockers }
    }

    /// Re-fetch the project's units of `kind`. Failures are logged only;
    /// the completed unit is already in the cache.
    async fn reconcile(&self, project_id: &str, kind: UnitKind) {
        let fetched = match kind {
            UnitKind::Field => self.api.list_fields(project_id, None).await,
            UnitKind::Block => self.api.list_blocks(project_id).await,
        };
        match fetched {
            Ok(units) => {
                let count = units.len();
                self.workspace.write().await.replace_units(kind, units);
                self.bus.publish(WorkspaceEvent::UnitsReconciled {
                    project_id: project_id.to_string(),
                    count,
                });
            }
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "Reconciliation fetch failed");
            }
        }
    }

    fn notify_error(&self, message: String) {
        if let Some(n) = &self.notifications {
            n.error(message);
        }
    }
}

fn outcome_label(outcome: &GenerationOutcome) -> &'static str {
    match outcome {
        GenerationOutcome::Completed { .. } => "completed",
        GenerationOutcome::Failed { .. } => "failed",
        GenerationOutcome::Cancelled => "cancelled",
        GenerationOutcome::Interrupted => "interrupted",
        GenerationOutcome::Blocked { .. } => "blocked",
        GenerationOutcome::AlreadyInFlight => "already_in_flight",
    }
}
