//! Per-session scratch state.
//!
//! Each browser session owns one `SessionContext`: a processing flag and the last
//! successful result. Contexts are checked out for the duration of an evaluation
//! and checked back in afterwards, so the store lock is never held across the
//! completion call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::domain::EvaluationResult;

#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub id: Uuid,
    pub processing: bool,
    pub last_result: Option<EvaluationResult>,
    pub created_at: DateTime<Utc>,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            processing: false,
            last_result: None,
            created_at: Utc::now(),
            evaluated_at: None,
        }
    }

    /// Creation time, or the last successful evaluation if there was one.
    pub fn last_active(&self) -> DateTime<Utc> {
        self.evaluated_at.unwrap_or(self.created_at)
    }

    /// Replaces the last result. Only called after a successful evaluation.
    pub fn store_result(&mut self, result: EvaluationResult) {
        self.last_result = Some(result);
        self.evaluated_at = Some(Utc::now());
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// In-memory session table. Cloning shares the same table.
///
/// Idle sessions older than the TTL are dropped whenever a new session is
/// created. Sessions with an evaluation in flight are never dropped.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, SessionContext>>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::default(),
            ttl,
        }
    }

    pub fn create(&self) -> Result<SessionContext, AppError> {
        let session = SessionContext::new();
        let mut sessions = self.write()?;
        let pruned = prune_expired(&mut sessions, session.created_at, self.ttl);
        if pruned > 0 {
            debug!(pruned, remaining = sessions.len(), "Dropped expired sessions");
        }
        sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Result<SessionContext, AppError> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
    }

    /// Marks the session as processing and hands out a copy to evaluate with.
    /// A session can only run one evaluation at a time.
    pub fn checkout(&self, id: Uuid) -> Result<SessionContext, AppError> {
        let mut sessions = self.write()?;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;

        if session.processing {
            return Err(AppError::Conflict(format!(
                "Session {id} already has an evaluation in progress"
            )));
        }

        session.processing = true;
        Ok(session.clone())
    }

    /// Stores the context returned by an evaluation and clears the processing flag.
    pub fn checkin(&self, mut session: SessionContext) -> Result<(), AppError> {
        session.processing = false;
        self.write()?.insert(session.id, session);
        Ok(())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, SessionContext>>, AppError> {
        self.sessions
            .read()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("session store lock poisoned")))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, SessionContext>>, AppError> {
        self.sessions
            .write()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("session store lock poisoned")))
    }
}

/// Removes idle sessions whose last activity is at least `ttl` before `now`.
fn prune_expired(
    sessions: &mut HashMap<Uuid, SessionContext>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, session| {
        session.processing
            || now
                .signed_duration_since(session.last_active())
                .to_std()
                .map_or(true, |idle| idle < ttl)
    });
    before - sessions.len()
}
