//! Dev↔QA iteration state machine.
//!
//! Runs the setup steps once, then alternates dev and qa steps until QA
//! approves or the iteration budget runs out, then runs the wrap-up steps
//! once. A step that errors or reports `success: false` is retried up to
//! `max_step_retries` more times; running out of attempts aborts the run.

use crate::config::WorkflowSettings;
use crate::error::{Result, SemadError};
use crate::logger::{WorkflowLogger, WorkflowMonitor};
use crate::step::{QaIssue, QaVerdict, StepContext, StepExecutor, StepOutcome};
use crate::types::AgentRole;
use crate::workflow::{Workflow, WorkflowStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    RunningDev,
    RunningQa,
    Approved,
    Exhausted,
}

impl LoopState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::RunningDev => "running_dev",
            LoopState::RunningQa => "running_qa",
            LoopState::Approved => "approved",
            LoopState::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub dev_result: Value,
    pub qa_result: QaVerdict,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub agent: AgentRole,
    pub action: String,
    /// Dev/qa iteration the step ran in; `0` for setup and wrap-up steps.
    pub iteration: u32,
    pub attempts: u32,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevQaOutcome {
    pub success: bool,
    pub qa_approved: bool,
    pub final_state: LoopState,
    pub total_iterations: u32,
    pub iterations: Vec<IterationRecord>,
    pub steps: Vec<StepRecord>,
}

impl DevQaOutcome {
    /// Issues from the last QA review, empty when QA approved.
    pub fn outstanding_issues(&self) -> &[QaIssue] {
        self.iterations
            .last()
            .map(|i| i.qa_result.issues.as_slice())
            .unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Step runner (shared with the linear flow)
// ---------------------------------------------------------------------------

pub(crate) struct StepRunner<'a> {
    pub executor: &'a dyn StepExecutor,
    pub logger: &'a dyn WorkflowLogger,
    pub max_step_retries: u32,
}

impl StepRunner<'_> {
    pub async fn run(&self, step: &WorkflowStep, context: &StepContext) -> Result<StepRecord> {
        let max_attempts = self.max_step_retries.saturating_add(1);
        let label = step.label();
        self.logger.task_start(&label);

        let mut reason = String::new();
        for attempt in 1..=max_attempts {
            match self.executor.execute(step, context).await {
                Ok(outcome) if outcome.success => {
                    self.logger.task_complete(&label);
                    return Ok(StepRecord {
                        index: step.index,
                        agent: step.agent,
                        action: step.action.clone(),
                        iteration: context.iteration,
                        attempts: attempt,
                        outcome,
                    });
                }
                Ok(outcome) => reason = outcome.failure_reason(),
                Err(e) => reason = e.to_string(),
            }
            self.logger.warning(&format!(
                "{label} failed (attempt {attempt}/{max_attempts}): {reason}"
            ));
        }

        let err = SemadError::StepFailed {
            agent: step.agent.to_string(),
            action: step.action.clone(),
            attempts: max_attempts,
            reason,
        };
        self.logger.error(&err.to_string());
        Err(err)
    }

    pub async fn run_all(
        &self,
        steps: &[WorkflowStep],
        context: &StepContext,
        records: &mut Vec<StepRecord>,
    ) -> Result<()> {
        for step in steps {
            records.push(self.run(step, context).await?);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub struct DevQaStateMachine<'a> {
    executor: &'a dyn StepExecutor,
    logger: &'a dyn WorkflowLogger,
    monitor: &'a dyn WorkflowMonitor,
    max_iterations: u32,
    max_step_retries: u32,
    state: LoopState,
}

impl<'a> DevQaStateMachine<'a> {
    pub fn new(
        settings: &WorkflowSettings,
        executor: &'a dyn StepExecutor,
        logger: &'a dyn WorkflowLogger,
        monitor: &'a dyn WorkflowMonitor,
    ) -> Self {
        Self {
            executor,
            logger,
            monitor,
            max_iterations: settings.max_iterations.max(1),
            max_step_retries: settings.max_step_retries,
            state: LoopState::RunningDev,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub async fn run(&mut self, workflow: &Workflow, base: &StepContext) -> Result<DevQaOutcome> {
        let layout = workflow
            .dev_qa_layout()
            .ok_or_else(|| SemadError::NotDevQaWorkflow(workflow.name.clone()))?;
        let runner = StepRunner {
            executor: self.executor,
            logger: self.logger,
            max_step_retries: self.max_step_retries,
        };
        let mut steps = Vec::new();

        self.monitor.phase_start(&workflow.name, "setup");
        let setup = runner
            .run_all(&workflow.steps[layout.setup()], base, &mut steps)
            .await;
        self.monitor
            .phase_complete(&workflow.name, "setup", setup.is_ok());
        setup?;

        let implement = &workflow.steps[layout.implement];
        let feedback = layout
            .feedback
            .map(|i| &workflow.steps[i])
            .unwrap_or(implement);
        let review = &workflow.steps[layout.review];

        self.monitor.phase_start(&workflow.name, "dev_qa_loop");
        let iterated = self
            .iterate(&runner, workflow, [implement, feedback, review], base, &mut steps)
            .await;
        self.monitor
            .phase_complete(&workflow.name, "dev_qa_loop", iterated.is_ok());
        let iterations = iterated?;

        let last = iterations.last();
        let wrap_ctx = StepContext {
            iteration: 0,
            dev_result: last.map(|i| i.dev_result.clone()),
            qa_issues: last.map(|i| i.qa_result.issues.clone()).unwrap_or_default(),
            ..base.clone()
        };
        self.monitor.phase_start(&workflow.name, "wrap_up");
        let wrap_up = runner
            .run_all(
                &workflow.steps[layout.wrap_up(workflow.steps.len())],
                &wrap_ctx,
                &mut steps,
            )
            .await;
        self.monitor
            .phase_complete(&workflow.name, "wrap_up", wrap_up.is_ok());
        wrap_up?;

        Ok(DevQaOutcome {
            success: true,
            qa_approved: self.state == LoopState::Approved,
            final_state: self.state,
            total_iterations: iterations.len() as u32,
            iterations,
            steps,
        })
    }

    /// Alternate dev and qa until approval or the iteration budget is spent.
    async fn iterate(
        &mut self,
        runner: &StepRunner<'_>,
        workflow: &Workflow,
        [implement, feedback, review]: [&WorkflowStep; 3],
        base: &StepContext,
        steps: &mut Vec<StepRecord>,
    ) -> Result<Vec<IterationRecord>> {
        let mut iterations = Vec::new();
        let mut issues: Vec<QaIssue> = Vec::new();
        let mut iteration = 1;
        loop {
            self.state = LoopState::RunningDev;
            let dev_step = if iteration == 1 { implement } else { feedback };
            let mut ctx = StepContext {
                iteration,
                qa_issues: std::mem::take(&mut issues),
                dev_result: None,
                ..base.clone()
            };
            let dev = runner.run(dev_step, &ctx).await?;
            let dev_result = dev.outcome.data.clone();
            steps.push(dev);

            self.state = LoopState::RunningQa;
            ctx.qa_issues.clear();
            ctx.dev_result = Some(dev_result.clone());
            let qa = runner.run(review, &ctx).await?;
            let verdict = QaVerdict::from_data(&qa.outcome.data);
            steps.push(qa);

            iterations.push(IterationRecord {
                iteration,
                dev_result,
                qa_result: verdict.clone(),
                timestamp: Utc::now(),
            });

            if verdict.approved {
                self.state = LoopState::Approved;
                return Ok(iterations);
            }
            if iteration >= self.max_iterations {
                self.state = LoopState::Exhausted;
                self.logger.warning(&format!(
                    "{}: QA did not approve after {} iteration(s); {} issue(s) outstanding",
                    workflow.name,
                    iteration,
                    verdict.issues.len()
                ));
                return Ok(iterations);
            }
            issues = verdict.issues;
            iteration += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
