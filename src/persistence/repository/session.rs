use std::fmt::{self, Display};
use std::future::Future;

use crate::persistence::repository::RepositoryError;
use crate::persistence::store::StoreSession;

// ============================================================================
// Transaction Session Lifecycle
// ============================================================================
//
//   Idle ──► Started ──► Committing ──► Committed ──► Ended
//    │          │            │
//    │          └──► Aborting ◄┘ (commit failed)
//    │                  │
//    │                  └──► Aborted ──► Ended
//    └──► Ended (start failed)
//
// `run` drives one store session through these states around a unit of
// work. The session is ended on every path, exactly once.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Committing,
    Committed,
    Aborting,
    Aborted,
    Ended,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Idle, Started)
                | (Idle, Ended)
                | (Started, Committing)
                | (Started, Aborting)
                | (Committing, Committed)
                | (Committing, Aborting)
                | (Aborting, Aborted)
                | (Committed, Ended)
                | (Aborted, Ended)
        )
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Started => "started",
            SessionState::Committing => "committing",
            SessionState::Committed => "committed",
            SessionState::Aborting => "aborting",
            SessionState::Aborted => "aborted",
            SessionState::Ended => "ended",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid session transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Current state of one session plus every state it went through.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    state: SessionState,
    history: Vec<SessionState>,
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn committed(&self) -> bool {
        self.history.contains(&SessionState::Committed)
    }

    pub fn advance(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        tracing::trace!(from = %self.state, to = %next, "Session state changed");
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    fn step(&mut self, next: SessionState) {
        if let Err(err) = self.advance(next) {
            tracing::error!(error = %err, "Session lifecycle out of order");
        }
    }
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `work` as one transaction on `session`, then end the session.
///
/// - `work` succeeds: commit. A failed commit is aborted and its error
///   returned.
/// - `work` fails: abort, and return the error of `work` untouched even
///   when the abort itself fails.
/// - A failure to end the session is returned only when nothing else
///   failed.
pub async fn run<S, Fut, T, E>(
    session: &S,
    lifecycle: &mut SessionLifecycle,
    work: Fut,
) -> Result<T, E>
where
    S: StoreSession + ?Sized,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepositoryError> + Display,
{
    let outcome = drive(session, lifecycle, work).await;

    let ended = session.end_session().await;
    lifecycle.step(SessionState::Ended);

    match (outcome, ended) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(end_err)) => {
            tracing::warn!(error = %end_err, "Failed to end session after commit");
            Err(RepositoryError::from(end_err).into())
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(end_err)) => {
            tracing::warn!(
                error = %end_err,
                cause = %err,
                "Failed to end session after failed transaction"
            );
            Err(err)
        }
    }
}

async fn drive<S, Fut, T, E>(
    session: &S,
    lifecycle: &mut SessionLifecycle,
    work: Fut,
) -> Result<T, E>
where
    S: StoreSession + ?Sized,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepositoryError> + Display,
{
    session
        .start_transaction()
        .await
        .map_err(|err| E::from(RepositoryError::from(err)))?;
    lifecycle.step(SessionState::Started);
    tracing::debug!("Transaction started");

    match work.await {
        Ok(value) => {
            lifecycle.step(SessionState::Committing);
            match session.commit_transaction().await {
                Ok(()) => {
                    lifecycle.step(SessionState::Committed);
                    tracing::debug!("Transaction committed");
                    Ok(value)
                }
                Err(commit_err) => {
                    lifecycle.step(SessionState::Aborting);
                    if let Err(abort_err) = session.abort_transaction().await {
                        tracing::warn!(error = %abort_err, "Abort after failed commit also failed");
                    }
                    lifecycle.step(SessionState::Aborted);
                    tracing::debug!(error = %commit_err, "Transaction aborted, commit failed");
                    Err(RepositoryError::from(commit_err).into())
                }
            }
        }
        Err(err) => {
            lifecycle.step(SessionState::Aborting);
            if let Err(abort_err) = session.abort_transaction().await {
                tracing::warn!(error = %abort_err, cause = %err, "Failed to abort transaction");
            }
            lifecycle.step(SessionState::Aborted);
            tracing::debug!(error = %err, "Transaction aborted");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::store::{StoreError, StoreResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    use SessionState::*;

    /// Session double that records calls and fails the ones it is told to.
    #[derive(Default)]
    struct ScriptedSession {
        calls: Mutex<Vec<&'static str>>,
        fail: Vec<&'static str>,
    }

    impl ScriptedSession {
        fn failing(fail: &[&'static str]) -> Self {
            Self {
                fail: fail.to_vec(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn call(&self, name: &'static str) -> StoreResult<()> {
            self.calls.lock().unwrap().push(name);
            if self.fail.contains(&name) {
                Err(StoreError::Unavailable(format!("{name} refused")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl StoreSession for ScriptedSession {
        async fn start_transaction(&self) -> StoreResult<()> {
            self.call("start")
        }

        async fn commit_transaction(&self) -> StoreResult<()> {
            self.call("commit")
        }

        async fn abort_transaction(&self) -> StoreResult<()> {
            self.call("abort")
        }

        async fn end_session(&self) -> StoreResult<()> {
            self.call("end")
        }
    }

    #[derive(Debug, PartialEq)]
    enum WorkError {
        Rejected(&'static str),
        Repository(String),
    }

    impl Display for WorkError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl From<RepositoryError> for WorkError {
        fn from(err: RepositoryError) -> Self {
            WorkError::Repository(err.to_string())
        }
    }

    #[test]
    fn test_transitions() {
        assert!(Idle.can_transition_to(Started));
        assert!(Idle.can_transition_to(Ended));
        assert!(Committing.can_transition_to(Aborting));
        assert!(!Started.can_transition_to(Ended));
        assert!(!Committed.can_transition_to(Aborting));
        assert!(!Ended.can_transition_to(Idle));
    }

    #[test]
    fn test_advance_rejects_invalid_transition() {
        let mut lifecycle = SessionLifecycle::new();

        let err = lifecycle.advance(Committed).unwrap_err();
        assert_eq!(err, InvalidTransition { from: Idle, to: Committed });
        assert_eq!(lifecycle.state(), Idle);
    }

    #[tokio::test]
    async fn test_successful_work_commits() {
        let session = ScriptedSession::default();
        let mut lifecycle = SessionLifecycle::new();

        let result: Result<u32, WorkError> = run(&session, &mut lifecycle, async { Ok(7) }).await;

        assert_eq!(result, Ok(7));
        assert_eq!(session.calls(), vec!["start", "commit", "end"]);
        assert_eq!(
            lifecycle.history(),
            &[Idle, Started, Committing, Committed, Ended]
        );
        assert!(lifecycle.committed());
    }

    #[tokio::test]
    async fn test_failed_work_aborts_and_returns_original_error() {
        let session = ScriptedSession::default();
        let mut lifecycle = SessionLifecycle::new();

        let result: Result<(), WorkError> =
            run(&session, &mut lifecycle, async { Err(WorkError::Rejected("boom")) }).await;

        assert_eq!(result, Err(WorkError::Rejected("boom")));
        assert_eq!(session.calls(), vec!["start", "abort", "end"]);
        assert_eq!(lifecycle.history(), &[Idle, Started, Aborting, Aborted, Ended]);
        assert!(!lifecycle.committed());
    }

    #[tokio::test]
    async fn test_failed_abort_keeps_original_error() {
        let session = ScriptedSession::failing(&["abort", "end"]);
        let mut lifecycle = SessionLifecycle::new();

        let result: Result<(), WorkError> =
            run(&session, &mut lifecycle, async { Err(WorkError::Rejected("boom")) }).await;

        assert_eq!(result, Err(WorkError::Rejected("boom")));
        assert_eq!(session.calls(), vec!["start", "abort", "end"]);
        assert_eq!(lifecycle.state(), Ended);
    }

    #[tokio::test]
    async fn test_failed_commit_aborts_and_returns_commit_error() {
        let session = ScriptedSession::failing(&["commit"]);
        let mut lifecycle = SessionLifecycle::new();

        let result: Result<(), WorkError> = run(&session, &mut lifecycle, async { Ok(()) }).await;

        assert!(matches!(result, Err(WorkError::Repository(ref msg)) if msg.contains("commit refused")));
        assert_eq!(session.calls(), vec!["start", "commit", "abort", "end"]);
        assert_eq!(
            lifecycle.history(),
            &[Idle, Started, Committing, Aborting, Aborted, Ended]
        );
    }

    #[tokio::test]
    async fn test_failed_start_still_ends_session() {
        let session = ScriptedSession::failing(&["start"]);
        let mut lifecycle = SessionLifecycle::new();
        let mut ran = false;

        let result: Result<(), WorkError> = run(&session, &mut lifecycle, async {
            ran = true;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(WorkError::Repository(_))));
        assert!(!ran);
        assert_eq!(session.calls(), vec!["start", "end"]);
        assert_eq!(lifecycle.history(), &[Idle, Ended]);
    }

    #[tokio::test]
    async fn test_end_failure_surfaces_after_commit() {
        let session = ScriptedSession::failing(&["end"]);
        let mut lifecycle = SessionLifecycle::new();

        let result: Result<(), WorkError> = run(&session, &mut lifecycle, async { Ok(()) }).await;

        assert!(matches!(result, Err(WorkError::Repository(ref msg)) if msg.contains("end refused")));
        assert!(lifecycle.committed());
        assert_eq!(lifecycle.state(), Ended);
    }
}
