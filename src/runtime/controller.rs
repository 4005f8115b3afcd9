//! Execution state machine and script error mapping.
//!
//! Every top-level run goes `Idle -> Running -> {Completed | Cancelled | Faulted}`. The
//! terminal states are idle states too: the next run starts from them as if from `Idle`, and
//! an interrupt issued while no run is active is a no-op. Event handlers raised by host code
//! the script called join the outer run instead of starting their own. A host callback that
//! calls `execute` or `evaluate` again gets [`Error::EngineBusy`], because the outer run holds
//! the script globals.

use std::sync::Arc;

use parking_lot::Mutex;
use rhai::{EvalAltResult, ParseError};
use tracing::debug;

use crate::{
    error::LimitKind,
    runtime::{
        bindings::ExternalCallFailure,
        cancel::{CancelReason, CancelToken},
        ScriptLimits,
    },
    Error, Result,
};

/// State of the engine's execution controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ExecutionState {
    /// No run was started yet
    Idle,
    /// A run is active
    Running,
    /// The last run finished normally
    Completed,
    /// The last run was interrupted, timed out or declined by the continuation callback
    Cancelled,
    /// The last run failed
    Faulted,
}

impl ExecutionState {
    /// `true` unless a run is active
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !matches!(self, ExecutionState::Running)
    }
}

/// Tracks the active run and owns the cancellation token
pub struct ExecutionController {
    state: Mutex<ExecutionState>,
    token: Arc<CancelToken>,
}

impl ExecutionController {
    /// Create an idle controller around `token`
    #[must_use]
    pub fn new(token: Arc<CancelToken>) -> Self {
        ExecutionController {
            state: Mutex::new(ExecutionState::Idle),
            token,
        }
    }

    /// The current state
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        *self.state.lock()
    }

    /// `true` while a run is active
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.state().is_idle()
    }

    /// The cancellation token
    #[must_use]
    pub fn token(&self) -> &Arc<CancelToken> {
        &self.token
    }

    /// Start a top-level run. Must be called with the engine's run gate held.
    pub(crate) fn begin(&self, limits: &ScriptLimits) -> RunGuard<'_> {
        let run = self.token.begin(limits.timeout_ms);
        *self.state.lock() = ExecutionState::Running;
        debug!("run {} started", run);
        RunGuard {
            controller: self,
            run,
            outcome: ExecutionState::Faulted,
        }
    }

    /// Start a run unless one is active already
    pub(crate) fn enter(&self, limits: &ScriptLimits) -> Option<RunGuard<'_>> {
        (!self.is_running()).then(|| self.begin(limits))
    }

    /// Request cancellation of the active run; a no-op when idle
    pub fn interrupt(&self) -> bool {
        self.token.request_interrupt()
    }
}

/// An active top-level run; dropping it returns the controller to an idle state
pub(crate) struct RunGuard<'a> {
    controller: &'a ExecutionController,
    run: u64,
    outcome: ExecutionState,
}

impl RunGuard<'_> {
    /// Record the outcome of the run
    pub(crate) fn finish<T>(mut self, result: &Result<T>) {
        self.outcome = match result {
            Ok(_) => ExecutionState::Completed,
            Err(error)
                if error.is_cancellation()
                    || matches!(error, Error::LimitExceeded(LimitKind::Timeout(_))) =>
            {
                ExecutionState::Cancelled
            }
            Err(_) => ExecutionState::Faulted,
        };
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.controller.token.end(self.run);
        *self.controller.state.lock() = self.outcome;
        debug!("run {} finished: {}", self.run, self.outcome);
    }
}

/// Translate a script evaluation error into the crate error.
///
/// Bridge errors raised by host members come back as [`Error::ExternalCall`] with the original
/// error preserved; everything else the script did not handle is a [`Error::ScriptFault`].
pub(crate) fn map_eval_error(error: &EvalAltResult, document: &str, limits: &ScriptLimits) -> Error {
    let error = error.unwrap_inner();

    if let EvalAltResult::ErrorRuntime(value, _) = error {
        if let Some(failure) = value.read_lock::<ExternalCallFailure>() {
            return Error::ExternalCall(failure.0.clone());
        }
    }

    match error {
        EvalAltResult::ErrorTerminated(token, _) => {
            match token.read_lock::<CancelReason>().map(|reason| *reason) {
                Some(CancelReason::TimedOut(ms)) => Error::LimitExceeded(LimitKind::Timeout(ms)),
                _ => Error::ExecutionCancelled,
            }
        }
        EvalAltResult::ErrorTooManyOperations(_) => {
            Error::LimitExceeded(LimitKind::Operations(limits.max_operations))
        }
        EvalAltResult::ErrorStackOverflow(_) => {
            Error::LimitExceeded(LimitKind::CallDepth(limits.max_call_levels))
        }
        EvalAltResult::ErrorDataTooLarge(what, _) => {
            Error::LimitExceeded(LimitKind::DataSize(what.clone()))
        }
        EvalAltResult::ErrorParsing(kind, position) => Error::Parse {
            document: document.to_string(),
            line: position.line().unwrap_or(0),
            message: kind.to_string(),
        },
        other => Error::ScriptFault {
            document: document.to_string(),
            line: other.position().line().unwrap_or(0),
            message: other.to_string(),
        },
    }
}

/// Translate a compilation error into the crate error
pub(crate) fn map_parse_error(error: &ParseError, document: &str) -> Error {
    Error::Parse {
        document: document.to_string(),
        line: error.position().line().unwrap_or(0),
        message: error.err_type().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::{Dynamic, Position};

    #[test]
    fn test_state_transitions() {
        let controller = ExecutionController::new(Arc::new(CancelToken::new(100)));
        assert_eq!(controller.state(), ExecutionState::Idle);
        assert!(!controller.interrupt());

        let limits = ScriptLimits::default();
        let run = controller.begin(&limits);
        assert!(controller.is_running());
        assert!(controller.enter(&limits).is_none());
        run.finish::<()>(&Err(Error::ExecutionCancelled));
        assert_eq!(controller.state(), ExecutionState::Cancelled);

        let run = controller.enter(&limits).unwrap();
        run.finish(&Ok(()));
        assert_eq!(controller.state(), ExecutionState::Completed);

        drop(controller.begin(&limits));
        assert_eq!(controller.state(), ExecutionState::Faulted);
    }

    #[test]
    fn test_error_mapping() {
        let limits = ScriptLimits::default().with_max_operations(500);

        let terminated =
            EvalAltResult::ErrorTerminated(Dynamic::from(CancelReason::Interrupted), Position::NONE);
        assert!(matches!(
            map_eval_error(&terminated, "doc", &limits),
            Error::ExecutionCancelled
        ));

        let timed_out = EvalAltResult::ErrorTerminated(
            Dynamic::from(CancelReason::TimedOut(20)),
            Position::NONE,
        );
        assert!(matches!(
            map_eval_error(&timed_out, "doc", &limits),
            Error::LimitExceeded(LimitKind::Timeout(20))
        ));

        let operations = EvalAltResult::ErrorTooManyOperations(Position::NONE);
        assert!(matches!(
            map_eval_error(&operations, "doc", &limits),
            Error::LimitExceeded(LimitKind::Operations(500))
        ));

        let failure = ExternalCallFailure(Arc::new(Error::Disposed));
        let external = EvalAltResult::ErrorRuntime(Dynamic::from(failure), Position::NONE);
        match map_eval_error(&external, "doc", &limits) {
            Error::ExternalCall(inner) => assert!(matches!(*inner, Error::Disposed)),
            other => panic!("unexpected {other:?}"),
        }

        let fault = EvalAltResult::ErrorRuntime("boom".into(), Position::new(3, 1));
        match map_eval_error(&fault, "doc", &limits) {
            Error::ScriptFault { document, line, .. } => {
                assert_eq!(document, "doc");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
