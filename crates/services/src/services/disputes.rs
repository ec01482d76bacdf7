//! Student disputes of AI-assigned results, and finalization once the dispute window lapses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use db::{
    DBService,
    models::{
        assessment::Assessment,
        attempt::{Attempt, AttemptStatus, dispute_deadline},
        dispute::{Dispute, DisputeStatus, ResolveDispute},
        result::SkillResult,
        skill_level::SkillLevel,
        user::{User, UserRole},
    },
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("reason must not be empty")]
    EmptyReason,
    #[error("only the student who made the attempt can dispute its results")]
    NotOwner,
    #[error("results can only be disputed while the attempt is graded")]
    NotGraded,
    #[error("dispute period ended at {0}")]
    WindowClosed(DateTime<Utc>),
    #[error("this result already has an open dispute")]
    AlreadyOpen,
    #[error("dispute is already resolved")]
    AlreadyResolved,
    #[error("only teachers and admins can resolve disputes")]
    NotAuthorized,
    #[error("a new level can only be set when accepting a dispute")]
    LevelOnReject,
    #[error("level does not belong to the disputed skill")]
    LevelSkillMismatch,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(Clone)]
pub struct DisputeService {
    pool: SqlitePool,
}

impl DisputeService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a dispute on a result of the student's own graded attempt, within the dispute window
    pub async fn open(
        &self,
        result_id: Uuid,
        student_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Dispute, DisputeError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DisputeError::EmptyReason);
        }

        let result = SkillResult::find_by_id(&self.pool, result_id)
            .await?
            .ok_or(DisputeError::NotFound("result"))?;
        let attempt = Attempt::find_by_id(&self.pool, result.attempt_id)
            .await?
            .ok_or(DisputeError::NotFound("attempt"))?;
        if attempt.student_id != student_id {
            return Err(DisputeError::NotOwner);
        }
        if attempt.status != AttemptStatus::Graded {
            return Err(DisputeError::NotGraded);
        }

        let assessment = Assessment::find_by_id(&self.pool, attempt.assessment_id)
            .await?
            .ok_or(DisputeError::NotFound("assessment"))?;
        let graded_at = attempt.graded_at.ok_or(DisputeError::NotGraded)?;
        // A window past the representable range never closes
        match dispute_deadline(graded_at, assessment.dispute_period_days) {
            Some(deadline) if now > deadline => return Err(DisputeError::WindowClosed(deadline)),
            _ => {}
        }

        if Dispute::find_open_for_result(&self.pool, result_id).await?.is_some() {
            return Err(DisputeError::AlreadyOpen);
        }

        let dispute = Dispute::create(&self.pool, Uuid::new_v4(), result_id, student_id, reason)
            .await
            .map_err(|e| if is_unique_violation(&e) { DisputeError::AlreadyOpen } else { e.into() })?;

        info!(
            dispute_id = %dispute.id,
            result_id = %result_id,
            attempt_id = %attempt.id,
            "Dispute opened"
        );
        Ok(dispute)
    }

    /// Accept or reject an open dispute. Accepting with a new level overrides the result.
    pub async fn resolve(
        &self,
        dispute_id: Uuid,
        data: &ResolveDispute,
        now: DateTime<Utc>,
    ) -> Result<Dispute, DisputeError> {
        let dispute = Dispute::find_by_id(&self.pool, dispute_id)
            .await?
            .ok_or(DisputeError::NotFound("dispute"))?;
        if dispute.status != DisputeStatus::Open {
            return Err(DisputeError::AlreadyResolved);
        }

        let resolver = User::find_by_id(&self.pool, data.resolver_id)
            .await?
            .ok_or(DisputeError::NotFound("resolver"))?;
        if resolver.role == UserRole::Student {
            return Err(DisputeError::NotAuthorized);
        }

        let new_level = match data.new_skill_level_id {
            Some(_) if !data.accept => return Err(DisputeError::LevelOnReject),
            Some(level_id) => {
                let level = SkillLevel::find_by_id(&self.pool, level_id)
                    .await?
                    .ok_or(DisputeError::NotFound("skill level"))?;
                let result = SkillResult::find_by_id(&self.pool, dispute.result_id)
                    .await?
                    .ok_or(DisputeError::NotFound("result"))?;
                if level.skill_id != result.skill_id {
                    return Err(DisputeError::LevelSkillMismatch);
                }
                Some(level)
            }
            None => None,
        };

        let status = if data.accept {
            DisputeStatus::Accepted
        } else {
            DisputeStatus::Rejected
        };
        let resolution = data.resolution.as_deref().map(str::trim).filter(|r| !r.is_empty());
        let mut tx = self.pool.begin().await?;
        let resolved = Dispute::resolve(&mut *tx, dispute_id, status, resolution, resolver.id, now)
            .await?
            .ok_or(DisputeError::AlreadyResolved)?;
        if let Some(level) = new_level {
            SkillResult::override_level(&mut *tx, dispute.result_id, level.id)
                .await?
                .ok_or(DisputeError::NotFound("result"))?;
        }
        tx.commit().await?;

        info!(
            dispute_id = %dispute_id,
            status = %status,
            overridden = resolved.status == DisputeStatus::Accepted && data.new_skill_level_id.is_some(),
            "Dispute resolved"
        );
        Ok(resolved)
    }
}

/// Background service finalizing graded attempts whose dispute period has lapsed
pub struct DisputeWindowService {
    db: DBService,
    poll_interval: Duration,
}

impl DisputeWindowService {
    pub fn new(db: DBService, poll_interval: Duration) -> Self {
        Self { db, poll_interval }
    }

    /// Spawn the background dispute window service
    pub fn spawn(db: DBService, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
        let service = Self::new(db, poll_interval);
        tokio::spawn(async move {
            service.start().await;
        })
    }

    async fn start(&self) {
        info!(
            "Starting dispute window service with interval {:?}",
            self.poll_interval
        );

        let mut interval = interval(self.poll_interval);

        loop {
            interval.tick().await;
            if let Err(e) = self.finalize_lapsed(Utc::now()).await {
                error!("Error finalizing lapsed attempts: {}", e);
            }
        }
    }

    /// Finalize every graded attempt whose window ended before `now` and has no open dispute.
    /// Returns how many attempts were finalized.
    pub async fn finalize_lapsed(&self, now: DateTime<Utc>) -> Result<usize, sqlx::Error> {
        let graded = Attempt::find_graded_with_period(&self.db.pool).await?;
        if graded.is_empty() {
            debug!("Dispute window: no graded attempts");
            return Ok(0);
        }

        let mut finalized = 0;
        for candidate in graded {
            let Some(deadline) = candidate.dispute_deadline() else {
                continue;
            };
            if deadline > now {
                continue;
            }

            match Attempt::finalize(&self.db.pool, candidate.attempt.id, now).await {
                Ok(true) => {
                    finalized += 1;
                    info!(
                        attempt_id = %candidate.attempt.id,
                        deadline = %deadline,
                        "Dispute window: attempt finalized"
                    );
                }
                Ok(false) => debug!(
                    attempt_id = %candidate.attempt.id,
                    "Dispute window: attempt has open disputes, keeping it graded"
                ),
                Err(e) => warn!(
                    attempt_id = %candidate.attempt.id,
                    error = %e,
                    "Dispute window: error finalizing attempt"
                ),
            }
        }

        Ok(finalized)
    }
}
