//! Workflow executor.
//!
//! Loads a workflow by name and runs it either linearly (every dev/qa step
//! once) or iteratively (through the [`DevQaStateMachine`]). Workflows with
//! no dev/qa pair always run their steps once, in order.

use crate::config::WorkflowSettings;
use crate::devqa::{DevQaStateMachine, IterationRecord, LoopState, StepRecord, StepRunner};
use crate::error::Result;
use crate::logger::{NoopMonitor, TracingLogger, WorkflowLogger, WorkflowMonitor};
use crate::step::{QaIssue, QaVerdict, StepContext, StepExecutor};
use crate::types::FlowType;
use crate::workflow::{self, Workflow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Asked when the iteration budget runs out without QA approval. Returning
/// `true` accepts the work anyway.
pub type MaxIterationsHook = Box<dyn Fn(u32, &[QaIssue]) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow: String,
    pub flow_type: FlowType,
    pub dev_qa: bool,
    pub success: bool,
    pub qa_approved: bool,
    /// QA never approved but the max-iterations hook accepted the result.
    #[serde(default)]
    pub overridden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<LoopState>,
    pub total_iterations: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<IterationRecord>,
    pub steps: Vec<StepRecord>,
}

impl WorkflowRun {
    pub fn accepted(&self) -> bool {
        self.success && (self.qa_approved || self.overridden)
    }

    pub fn outstanding_issues(&self) -> &[QaIssue] {
        self.iterations
            .last()
            .map(|i| i.qa_result.issues.as_slice())
            .unwrap_or(&[])
    }
}

pub struct WorkflowExecutor {
    root: PathBuf,
    settings: WorkflowSettings,
    steps: Arc<dyn StepExecutor>,
    logger: Arc<dyn WorkflowLogger>,
    monitor: Arc<dyn WorkflowMonitor>,
    on_max_iterations_reached: Option<MaxIterationsHook>,
}

impl WorkflowExecutor {
    pub fn new(root: &Path, settings: WorkflowSettings, steps: Arc<dyn StepExecutor>) -> Self {
        Self {
            root: root.to_path_buf(),
            settings,
            steps,
            logger: Arc::new(TracingLogger),
            monitor: Arc::new(NoopMonitor),
            on_max_iterations_reached: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn WorkflowLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn WorkflowMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn on_max_iterations_reached(mut self, hook: MaxIterationsHook) -> Self {
        self.on_max_iterations_reached = Some(hook);
        self
    }

    /// Run `name` with the configured flow type.
    pub async fn execute(&self, name: &str, context: &StepContext) -> Result<WorkflowRun> {
        self.execute_with(name, self.settings.flow_type, context)
            .await
    }

    pub async fn execute_with(
        &self,
        name: &str,
        flow_type: FlowType,
        context: &StepContext,
    ) -> Result<WorkflowRun> {
        let workflow = workflow::load_workflow(&self.root, name)?;
        self.run_workflow(&workflow, flow_type, context).await
    }

    pub async fn run_workflow(
        &self,
        workflow: &Workflow,
        flow_type: FlowType,
        context: &StepContext,
    ) -> Result<WorkflowRun> {
        tracing::info!(
            workflow = %workflow.name,
            flow = %flow_type,
            "executing workflow"
        );
        let context = StepContext {
            workflow: workflow.name.clone(),
            ..context.clone()
        };
        if !workflow.is_dev_qa_workflow() {
            return self.run_sequential(workflow, flow_type, &context).await;
        }
        match flow_type {
            FlowType::Iterative => self.run_iterative(workflow, &context).await,
            FlowType::Linear => self.run_linear(workflow, &context).await,
        }
    }

    async fn run_iterative(&self, workflow: &Workflow, context: &StepContext) -> Result<WorkflowRun> {
        let mut machine = DevQaStateMachine::new(
            &self.settings,
            self.steps.as_ref(),
            self.logger.as_ref(),
            self.monitor.as_ref(),
        );
        let outcome = machine.run(workflow, context).await?;

        let overridden = !outcome.qa_approved
            && self
                .on_max_iterations_reached
                .as_ref()
                .is_some_and(|hook| hook(outcome.total_iterations, outcome.outstanding_issues()));
        if overridden {
            self.logger.warning(&format!(
                "{}: accepting unapproved work after {} iteration(s)",
                workflow.name, outcome.total_iterations
            ));
        }

        Ok(WorkflowRun {
            workflow: workflow.name.clone(),
            flow_type: FlowType::Iterative,
            dev_qa: true,
            success: outcome.success,
            qa_approved: outcome.qa_approved,
            overridden,
            final_state: Some(outcome.final_state),
            total_iterations: outcome.total_iterations,
            iterations: outcome.iterations,
            steps: outcome.steps,
        })
    }

    /// Setup, one implement, one review, wrap-up. Feedback steps are skipped
    /// and QA rejection does not trigger another round.
    async fn run_linear(&self, workflow: &Workflow, context: &StepContext) -> Result<WorkflowRun> {
        let Some(layout) = workflow.dev_qa_layout() else {
            return self.run_sequential(workflow, FlowType::Linear, context).await;
        };
        let runner = self.runner();
        let mut steps = Vec::new();

        self.phase(&workflow.name, "setup", async {
            runner
                .run_all(&workflow.steps[layout.setup()], context, &mut steps)
                .await
        })
        .await?;

        let dev_ctx = StepContext {
            iteration: 1,
            ..context.clone()
        };
        self.monitor.phase_start(&workflow.name, "dev_qa_pass");
        let pass = async {
            let dev = runner.run(&workflow.steps[layout.implement], &dev_ctx).await?;
            let qa_ctx = StepContext {
                dev_result: Some(dev.outcome.data.clone()),
                ..dev_ctx.clone()
            };
            let qa = runner.run(&workflow.steps[layout.review], &qa_ctx).await?;
            Ok::<_, crate::error::SemadError>((dev, qa))
        }
        .await;
        self.monitor
            .phase_complete(&workflow.name, "dev_qa_pass", pass.is_ok());
        let (dev, qa) = pass?;

        let verdict = QaVerdict::from_data(&qa.outcome.data);
        if !verdict.approved {
            self.logger.warning(&format!(
                "{}: QA raised {} issue(s); linear flow does not iterate",
                workflow.name,
                verdict.issues.len()
            ));
        }
        let iteration = IterationRecord {
            iteration: 1,
            dev_result: dev.outcome.data.clone(),
            qa_result: verdict.clone(),
            timestamp: Utc::now(),
        };
        steps.push(dev);
        steps.push(qa);

        let wrap_ctx = StepContext {
            dev_result: Some(iteration.dev_result.clone()),
            qa_issues: verdict.issues.clone(),
            ..context.clone()
        };
        self.phase(&workflow.name, "wrap_up", async {
            runner
                .run_all(
                    &workflow.steps[layout.wrap_up(workflow.steps.len())],
                    &wrap_ctx,
                    &mut steps,
                )
                .await
        })
        .await?;

        Ok(WorkflowRun {
            workflow: workflow.name.clone(),
            flow_type: FlowType::Linear,
            dev_qa: true,
            success: true,
            qa_approved: verdict.approved,
            overridden: false,
            final_state: None,
            total_iterations: 1,
            iterations: vec![iteration],
            steps,
        })
    }

    /// Every step once, in order.
    async fn run_sequential(
        &self,
        workflow: &Workflow,
        flow_type: FlowType,
        context: &StepContext,
    ) -> Result<WorkflowRun> {
        let runner = self.runner();
        let mut steps = Vec::new();
        self.phase(&workflow.name, "steps", async {
            runner.run_all(&workflow.steps, context, &mut steps).await
        })
        .await?;
        Ok(WorkflowRun {
            workflow: workflow.name.clone(),
            flow_type,
            dev_qa: false,
            success: true,
            qa_approved: false,
            overridden: false,
            final_state: None,
            total_iterations: 0,
            iterations: Vec::new(),
            steps,
        })
    }

    fn runner(&self) -> StepRunner<'_> {
        StepRunner {
            executor: self.steps.as_ref(),
            logger: self.logger.as_ref(),
            max_step_retries: self.settings.max_step_retries,
        }
    }

    async fn phase<F>(&self, workflow: &str, phase: &str, fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        self.monitor.phase_start(workflow, phase);
        let result = fut.await;
        self.monitor.phase_complete(workflow, phase, result.is_ok());
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
