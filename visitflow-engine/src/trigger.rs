//! Rule trigger.
//!
//! Re-evaluates the program rules against the live form and the persisted
//! record, publishes the [`RuleResult`] and feeds its side effects back:
//! assignments into the form and the writer, and cleared values for fields
//! that just became hidden.
//!
//! Evaluation is never chained to field writes implicitly. Callers invoke
//! [`RuleTrigger::trigger_auto_execute`] after edits, which collapses a burst
//! of edits into one evaluation per debounce window.

use crate::config::RuleTriggerConfig;
use crate::error::{EngineError, EngineResult};
use crate::form::LiveForm;
use crate::scheduler::{timer_task, Scheduler, TimerId};
use crate::status::ReadinessPredicate;
use crate::writer::BatchedWriter;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};
use visitflow_model::{FieldOption, OptionSet, RuleContext, RuleEvaluator, RuleResult, RuleSet};
use visitflow_storage::LiveQuery;
use visitflow_types::{Enrollment, FieldId, FieldMap, FieldValue, Record};

#[derive(Default)]
struct TriggerState {
    timer: Option<TimerId>,
    generation: u64,
    /// Hidden fields of the previous applied evaluation; `None` before the
    /// first one.
    previous_hidden: Option<BTreeSet<FieldId>>,
}

struct TriggerInner {
    evaluator: Arc<dyn RuleEvaluator>,
    rules: Arc<RuleSet>,
    form: LiveForm,
    record: LiveQuery<Option<Record>>,
    writer: BatchedWriter,
    scheduler: Arc<dyn Scheduler>,
    config: RuleTriggerConfig,
    enrollment: Option<Enrollment>,
    state: Mutex<TriggerState>,
    result: watch::Sender<RuleResult>,
}

/// Rule trigger bound to one record and its form.
#[derive(Clone)]
pub struct RuleTrigger {
    inner: Arc<TriggerInner>,
}

/// One evaluation, before its side effects are applied.
struct Evaluation {
    result: RuleResult,
    entity_values: FieldMap,
}

impl RuleTrigger {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        evaluator: Arc<dyn RuleEvaluator>,
        rules: Arc<RuleSet>,
        form: LiveForm,
        record: LiveQuery<Option<Record>>,
        writer: BatchedWriter,
        scheduler: Arc<dyn Scheduler>,
        config: RuleTriggerConfig,
        enrollment: Option<Enrollment>,
    ) -> Self {
        let (result, _) = watch::channel(RuleResult::default());
        Self {
            inner: Arc::new(TriggerInner {
                evaluator,
                rules,
                form,
                record,
                writer,
                scheduler,
                config,
                enrollment,
                state: Mutex::new(TriggerState::default()),
                result,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TriggerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the record's initial read. Evaluating before then runs the
    /// rules against empty entity values.
    pub async fn ready(&self) {
        let mut rx = self.inner.record.receiver();
        let _ = rx.wait_for(Option::is_some).await;
    }

    #[must_use]
    pub fn form(&self) -> &LiveForm {
        &self.inner.form
    }

    /// Result of the latest evaluation (empty before the first).
    #[must_use]
    pub fn result(&self) -> RuleResult {
        self.inner.result.borrow().clone()
    }

    /// Receiver of every published result.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RuleResult> {
        self.inner.result.subscribe()
    }

    /// Whether `field` is assigned by a rule and so not manually editable.
    #[must_use]
    pub fn is_computed(&self, field: &str) -> bool {
        self.inner.result.borrow().is_computed(field)
    }

    #[must_use]
    pub fn visible_options(&self, field: &str, option_set: &OptionSet) -> Vec<FieldOption> {
        self.inner.result.borrow().visible_options(field, option_set)
    }

    fn evaluate(&self) -> Evaluation {
        let record = self.inner.record.current().flatten();
        let entity_values = record
            .as_ref()
            .map(|r| r.values().clone())
            .unwrap_or_default();
        let enrollment = self
            .inner
            .enrollment
            .clone()
            .or_else(|| record.as_ref().and_then(|r| r.enrollment().cloned()));
        let context = RuleContext {
            form_values: self.inner.form.values(),
            entity_values: entity_values.clone(),
            enrollment,
            scope_id: record
                .as_ref()
                .map(|r| r.scope_id().to_owned())
                .unwrap_or_default(),
        };
        let rules = &self.inner.rules;
        let result = self
            .inner
            .evaluator
            .evaluate(&rules.rules, &rules.variables, &context);
        Evaluation {
            result,
            entity_values,
        }
    }

    /// Evaluates once and applies the result.
    ///
    /// Assignments reach the form before they are persisted. Fields that
    /// went from visible to hidden since the previous evaluation are cleared
    /// in the form and in the store; fields hidden from the first evaluation
    /// on are left alone.
    pub async fn execute_and_apply_rules(&self) -> EngineResult<RuleResult> {
        let evaluation = self.evaluate();
        self.apply(evaluation).await
    }

    async fn apply(&self, evaluation: Evaluation) -> EngineResult<RuleResult> {
        let Evaluation {
            result,
            entity_values,
        } = evaluation;
        let config = &self.inner.config;
        let form = &self.inner.form;
        let writer = &self.inner.writer;

        let newly_hidden: Vec<FieldId> = {
            let mut state = self.state();
            let newly = match &state.previous_hidden {
                Some(previous) => result.hidden_fields.difference(previous).cloned().collect(),
                None => Vec::new(),
            };
            state.previous_hidden = Some(result.hidden_fields.clone());
            newly
        };

        if config.apply_assignments_to_form {
            form.apply(&result.assignments);
        }

        let mut writes = FieldMap::new();
        if config.persist_assignments {
            for (field, value) in &result.assignments {
                let queued = writer.pending_value(field);
                let overrides_queue = queued.is_some_and(|queued| &queued != value);
                if overrides_queue || entity_values.get(field) != Some(value) {
                    writes.insert(field.clone(), value.clone());
                }
            }
        }

        if config.clear_hidden_fields {
            for field in &newly_hidden {
                form.clear(field);
                let persisted = entity_values.get(field).is_some_and(|v| !v.is_empty());
                let queued = writer.pending_value(field).is_some_and(|v| !v.is_empty());
                if persisted || queued {
                    writes.insert(field.clone(), FieldValue::Empty);
                }
            }
        }

        self.inner.result.send_replace(result.clone());
        debug!(
            "rules: {} evaluated: {} hidden, {} assigned, {} error(s), {} write(s)",
            writer.key(),
            result.hidden_fields.len(),
            result.assignments.len(),
            result.errors.len(),
            writes.len()
        );

        if !writes.is_empty() {
            writer.update_fields(writes).await?;
        }
        Ok(result)
    }

    /// Schedules an evaluation after the debounce window, restarting the
    /// window if one is already pending.
    pub fn trigger_auto_execute(&self) {
        let mut state = self.state();
        if let Some(timer) = state.timer.take() {
            self.inner.scheduler.cancel(timer);
        }
        state.generation += 1;
        let generation = state.generation;
        let trigger = self.clone();
        let timer = self.inner.scheduler.schedule(
            self.inner.config.debounce(),
            timer_task(async move { trigger.run_scheduled(generation).await }),
        );
        state.timer = Some(timer);
    }

    async fn run_scheduled(&self, generation: u64) {
        {
            let mut state = self.state();
            if state.generation == generation {
                state.timer = None;
            }
        }
        if let Err(e) = self.execute_and_apply_rules().await {
            warn!("rules: scheduled evaluation of {} failed: {}", self.inner.writer.key(), e);
        }
    }

    /// Cancels a pending scheduled evaluation.
    pub fn cancel(&self) -> bool {
        match self.state().timer.take() {
            Some(timer) => self.inner.scheduler.cancel(timer),
            None => false,
        }
    }

    /// Submits the form.
    ///
    /// Evaluates the rules; if any error message results, nothing is written
    /// and the errors are returned. Otherwise the result is applied, pending
    /// edits are flushed and the record is promoted to pending when
    /// `readiness` accepts it. Returns whether it was promoted.
    pub async fn submit(&self, readiness: &dyn ReadinessPredicate) -> EngineResult<bool> {
        let evaluation = self.evaluate();
        if evaluation.result.blocks_submission() {
            let messages = evaluation.result.errors.clone();
            self.inner.result.send_replace(evaluation.result);
            debug!(
                "rules: submission of {} blocked by {} error(s)",
                self.inner.writer.key(),
                messages.len()
            );
            return Err(EngineError::ValidationBlocked { messages });
        }
        self.cancel();
        self.apply(evaluation).await?;
        self.inner.writer.flush().await?;
        self.inner.writer.promote_if_ready(readiness).await
    }
}
