//! Collaborators the workflow engine reports progress to.
//!
//! Every method has a no-op default so implementors only override what they
//! care about.

/// Task-level log sink used by the Dev/QA state machine.
pub trait WorkflowLogger: Send + Sync {
    fn task_start(&self, _name: &str) {}
    fn task_complete(&self, _name: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Phase-level monitor used by the workflow executor.
pub trait WorkflowMonitor: Send + Sync {
    fn phase_start(&self, _workflow: &str, _phase: &str) {}
    fn phase_complete(&self, _workflow: &str, _phase: &str, _success: bool) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl WorkflowLogger for NoopLogger {}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl WorkflowMonitor for NoopMonitor {}

/// Routes logger and monitor calls to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl WorkflowLogger for TracingLogger {
    fn task_start(&self, name: &str) {
        tracing::info!(task = %name, "task started");
    }

    fn task_complete(&self, name: &str) {
        tracing::info!(task = %name, "task complete");
    }

    fn warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

impl WorkflowMonitor for TracingLogger {
    fn phase_start(&self, workflow: &str, phase: &str) {
        tracing::debug!(workflow = %workflow, phase = %phase, "phase started");
    }

    fn phase_complete(&self, workflow: &str, phase: &str, success: bool) {
        tracing::debug!(workflow = %workflow, phase = %phase, success, "phase complete");
    }
}
