//! AI grading of submitted attempts against the assessment's skill rubric.

use std::sync::Arc;

use chrono::Utc;
use db::models::{
    assessment::Assessment,
    attempt::Attempt,
    result::{NewSkillResult, SkillResult},
    skill::{Skill, SkillWithLevels},
};
use serde::Deserialize;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    ai_client::{AiError, AiProvider, ask_json},
    prompts,
};

const GRADING_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ai error: {0}")]
    Ai(#[from] AiError),
    #[error("attempt not found")]
    NotFound,
    #[error("attempt is not awaiting grading")]
    NotSubmitted,
    #[error("assessment not found")]
    AssessmentNotFound,
    #[error("assessment has no case text")]
    MissingCase,
    #[error("assessment has no skills to grade")]
    NoSkills,
    #[error("model did not grade skill '{0}'")]
    MissingSkill(String),
    #[error("model returned unknown level '{level}' for skill '{skill}'")]
    UnknownLevel { skill: String, level: String },
}

#[derive(Debug, Deserialize)]
struct GradingResponse {
    skills: Vec<SkillGrade>,
    overall_feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkillGrade {
    skill: String,
    level: String,
    feedback: Option<String>,
}

fn same_label(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Map the model's per-skill grades onto level ids. Every skill must be graded with one of its own labels.
fn map_grades(skills: &[SkillWithLevels], grades: &[SkillGrade]) -> Result<Vec<NewSkillResult>, GradingError> {
    for grade in grades {
        if !skills.iter().any(|s| same_label(&s.name, &grade.skill)) {
            warn!(skill = %grade.skill, "Ignoring grade for a skill the assessment does not have");
        }
    }

    skills
        .iter()
        .map(|skill| {
            let grade = grades
                .iter()
                .find(|g| same_label(&g.skill, &skill.name))
                .ok_or_else(|| GradingError::MissingSkill(skill.name.clone()))?;
            let level = skill
                .levels
                .iter()
                .find(|l| same_label(&l.label, &grade.level))
                .ok_or_else(|| GradingError::UnknownLevel {
                    skill: skill.name.clone(),
                    level: grade.level.clone(),
                })?;
            Ok(NewSkillResult {
                skill_id: skill.id,
                skill_level_id: level.id,
                feedback: grade.feedback.clone().filter(|f| !f.trim().is_empty()),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct GradingService {
    pool: SqlitePool,
    provider: Arc<dyn AiProvider>,
}

impl GradingService {
    pub fn new(pool: SqlitePool, provider: Arc<dyn AiProvider>) -> Self {
        Self { pool, provider }
    }

    /// Grade a submitted attempt. On failure the attempt is marked `Failed` and may be submitted again.
    pub async fn grade_attempt(&self, attempt_id: Uuid) -> Result<Vec<SkillResult>, GradingError> {
        let attempt = Attempt::find_by_id(&self.pool, attempt_id)
            .await?
            .ok_or(GradingError::NotFound)?;
        if !Attempt::claim_for_grading(&self.pool, attempt_id).await? {
            return Err(GradingError::NotSubmitted);
        }

        match self.grade(&attempt).await {
            Ok(results) => {
                info!(
                    attempt_id = %attempt_id,
                    result_count = results.len(),
                    "Attempt graded"
                );
                Ok(results)
            }
            Err(e) => {
                warn!(attempt_id = %attempt_id, error = %e, "Grading failed");
                Attempt::mark_failed(&self.pool, attempt_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn grade(&self, attempt: &Attempt) -> Result<Vec<SkillResult>, GradingError> {
        let assessment = Assessment::find_by_id(&self.pool, attempt.assessment_id)
            .await?
            .ok_or(GradingError::AssessmentNotFound)?;
        let case_text = assessment
            .case_text
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(GradingError::MissingCase)?;
        let skills = Skill::find_for_assessment(&self.pool, assessment.id).await?;
        if skills.is_empty() {
            return Err(GradingError::NoSkills);
        }

        let prompt = prompts::grading_prompt(case_text, assessment.solution.as_deref(), &attempt.answer, &skills);
        let response: GradingResponse = ask_json(
            self.provider.as_ref(),
            &prompt,
            Some(prompts::GRADING_SYSTEM),
            GRADING_MAX_TOKENS,
        )
        .await?;

        let new_results = map_grades(&skills, &response.skills)?;
        let results = SkillResult::replace_for_attempt(&self.pool, attempt.id, &new_results).await?;
        let overall = response.overall_feedback.as_deref().map(str::trim).filter(|f| !f.is_empty());
        Attempt::mark_graded(&self.pool, attempt.id, overall, Utc::now()).await?;

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        attempt::{AttemptStatus, StartAttempt},
        skill_level::SkillLevel,
        test_support::{create_assessment, create_skill, create_user, pool},
        user::UserRole,
    };

    use super::*;
    use crate::services::testing::ScriptedProvider;

    async fn submitted_attempt(pool: &SqlitePool, skill_ids: &[Uuid]) -> Attempt {
        let assessment = create_assessment(pool, skill_ids).await;
        let student = create_user(pool, "s@example.edu", UserRole::Student).await;
        let attempt = Attempt::create(
            pool,
            Uuid::new_v4(),
            &StartAttempt {
                assessment_id: assessment.id,
                student_id: student.id,
            },
        )
        .await
        .unwrap();
        Attempt::save_answer(pool, attempt.id, "Find a second supplier.").await.unwrap();
        Attempt::mark_submitted(pool, attempt.id, Utc::now()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_labels_match_case_insensitively() {
        let pool = pool().await;
        let skill = create_skill(&pool, "Risk analysis", &["Novice", "Proficient"]).await;
        let attempt = submitted_attempt(&pool, &[skill.id]).await;
        let provider = ScriptedProvider::new().with_reply(
            r#"{"skills": [{"skill": "risk ANALYSIS", "level": " proficient ", "feedback": "Good"}],
                "overall_feedback": "Well argued"}"#,
        );

        let service = GradingService::new(pool.clone(), Arc::new(provider.clone()));
        let results = service.grade_attempt(attempt.id).await.unwrap();

        let levels = SkillLevel::find_by_skill_id(&pool, skill.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].skill_level_id, levels[1].id);
        assert_eq!(results[0].feedback.as_deref(), Some("Good"));

        let graded = Attempt::find_by_id(&pool, attempt.id).await.unwrap().unwrap();
        assert_eq!(graded.status, AttemptStatus::Graded);
        assert_eq!(graded.overall_feedback.as_deref(), Some("Well argued"));
        assert!(graded.graded_at.is_some());
        assert!(provider.prompts()[0].contains("Find a second supplier."));

        // Already graded
        assert!(matches!(
            service.grade_attempt(attempt.id).await,
            Err(GradingError::NotSubmitted)
        ));
    }

    #[tokio::test]
    async fn test_unknown_label_fails_and_allows_resubmission() {
        let pool = pool().await;
        let skill = create_skill(&pool, "Risk analysis", &["Novice", "Proficient"]).await;
        let attempt = submitted_attempt(&pool, &[skill.id]).await;
        let provider = ScriptedProvider::new()
            .with_reply(r#"{"skills": [{"skill": "Risk analysis", "level": "Outstanding"}]}"#);

        let service = GradingService::new(pool.clone(), Arc::new(provider));
        let err = service.grade_attempt(attempt.id).await.unwrap_err();
        assert!(matches!(err, GradingError::UnknownLevel { .. }));

        let failed = Attempt::find_by_id(&pool, attempt.id).await.unwrap().unwrap();
        assert_eq!(failed.status, AttemptStatus::Failed);
        assert!(failed.grading_error.unwrap().contains("Outstanding"));
        assert!(SkillResult::find_by_attempt_id(&pool, attempt.id).await.unwrap().is_empty());
        assert!(Attempt::mark_submitted(&pool, attempt.id, Utc::now()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_skill_fails_grading() {
        let pool = pool().await;
        let first = create_skill(&pool, "Risk analysis", &["Low"]).await;
        let second = create_skill(&pool, "Communication", &["Low"]).await;
        let attempt = submitted_attempt(&pool, &[first.id, second.id]).await;
        let provider = ScriptedProvider::new()
            .with_reply(r#"{"skills": [{"skill": "Risk analysis", "level": "Low"}]}"#);

        let service = GradingService::new(pool.clone(), Arc::new(provider));
        let err = service.grade_attempt(attempt.id).await.unwrap_err();
        assert!(matches!(err, GradingError::MissingSkill(name) if name == "Communication"));
    }
}
