//! Generates assessment case studies and reference solutions grounded in linked sources.

use std::sync::Arc;

use db::models::{
    assessment::{Assessment, AssessmentStatus, GenerationStatus},
    domain::Domain,
    skill::{Skill, SkillWithLevels},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    ai_client::{AiError, AiProvider, ask_json},
    embeddings::{self, EmbeddingError, RetrievedChunk},
    prompts,
};

const CASE_MAX_TOKENS: u32 = 4096;
const SOLUTION_MAX_TOKENS: u32 = 4096;
// Embedding inputs are capped; the start of a case carries its framing
const RETRIEVAL_QUERY_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum CaseGenerationError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("ai error: {0}")]
    Ai(#[from] AiError),
    #[error("retrieval error: {0}")]
    Retrieval(#[from] EmbeddingError),
    #[error("assessment not found")]
    NotFound,
    #[error("generation already in progress")]
    AlreadyInProgress,
    #[error("only draft assessments can be regenerated")]
    NotDraft,
    #[error("model returned an empty {0}")]
    EmptyOutput(&'static str),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct GenerateRequest {
    /// Write a new case even if the assessment already has one
    #[serde(default)]
    pub regenerate_case: bool,
    /// Extra guidance from the teacher for the case text
    pub instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaseResponse {
    case_text: String,
}

#[derive(Debug, Deserialize)]
struct SolutionResponse {
    solution: String,
}

#[derive(Clone)]
pub struct CaseGenerator {
    pool: SqlitePool,
    provider: Arc<dyn AiProvider>,
    top_k: usize,
}

impl CaseGenerator {
    pub fn new(pool: SqlitePool, provider: Arc<dyn AiProvider>, top_k: usize) -> Self {
        Self { pool, provider, top_k }
    }

    /// Reserve the assessment for generation, moving it to `Pending`
    pub async fn claim(&self, assessment_id: Uuid) -> Result<Assessment, CaseGenerationError> {
        let assessment = Assessment::find_by_id(&self.pool, assessment_id)
            .await?
            .ok_or(CaseGenerationError::NotFound)?;
        if assessment.status != AssessmentStatus::Draft {
            return Err(CaseGenerationError::NotDraft);
        }
        if !Assessment::claim_generation(&self.pool, assessment_id).await? {
            return Err(CaseGenerationError::AlreadyInProgress);
        }

        Assessment::find_by_id(&self.pool, assessment_id)
            .await?
            .ok_or(CaseGenerationError::NotFound)
    }

    /// Run case and solution generation for a claimed assessment.
    ///
    /// Any failure leaves the assessment in `Failed` with the error recorded.
    pub async fn generate(&self, assessment_id: Uuid, request: GenerateRequest) -> Result<(), CaseGenerationError> {
        match self.run(assessment_id, &request).await {
            Ok(()) => {
                Assessment::update_generation_status(&self.pool, assessment_id, GenerationStatus::Completed, None)
                    .await?;
                info!(assessment_id = %assessment_id, "Case generation completed");
                Ok(())
            }
            Err(e) => {
                error!(assessment_id = %assessment_id, error = %e, "Case generation failed");
                Assessment::update_generation_status(
                    &self.pool,
                    assessment_id,
                    GenerationStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }

    async fn run(&self, assessment_id: Uuid, request: &GenerateRequest) -> Result<(), CaseGenerationError> {
        let assessment = Assessment::find_detail(&self.pool, assessment_id)
            .await?
            .ok_or(CaseGenerationError::NotFound)?;
        let skills = Skill::find_for_assessment(&self.pool, assessment_id).await?;

        let case_text = match assessment.case_text.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(existing) if !request.regenerate_case => existing.to_string(),
            _ => {
                Assessment::update_generation_status(&self.pool, assessment_id, GenerationStatus::GeneratingCase, None)
                    .await?;
                let case_text = self
                    .generate_case(&assessment, &skills, &assessment.source_ids, request.instructions.as_deref())
                    .await?;
                Assessment::store_case_text(&self.pool, assessment_id, &case_text).await?;
                info!(assessment_id = %assessment_id, case_len = case_text.len(), "Stored generated case");
                case_text
            }
        };

        Assessment::update_generation_status(&self.pool, assessment_id, GenerationStatus::GeneratingSolution, None)
            .await?;
        let excerpts = self.excerpts(&case_text, &assessment.source_ids).await?;
        let prompt = prompts::solution_prompt(&case_text, &skills, &excerpts);
        let response: SolutionResponse = ask_json(
            self.provider.as_ref(),
            &prompt,
            Some(prompts::SOLUTION_SYSTEM),
            SOLUTION_MAX_TOKENS,
        )
        .await?;
        let solution = response.solution.trim();
        if solution.is_empty() {
            return Err(CaseGenerationError::EmptyOutput("solution"));
        }
        Assessment::store_solution(&self.pool, assessment_id, solution).await?;

        Ok(())
    }

    async fn generate_case(
        &self,
        assessment: &Assessment,
        skills: &[SkillWithLevels],
        source_ids: &[Uuid],
        instructions: Option<&str>,
    ) -> Result<String, CaseGenerationError> {
        let domain = match assessment.domain_id {
            Some(domain_id) => Domain::find_by_id(&self.pool, domain_id).await?.map(|d| d.name),
            None => None,
        };

        let mut query = assessment.title.clone();
        for skill in skills {
            query.push(' ');
            query.push_str(&skill.name);
        }
        if let Some(instructions) = instructions {
            query.push(' ');
            query.push_str(instructions);
        }
        let excerpts = self.excerpts(&query, source_ids).await?;

        let prompt = prompts::case_prompt(&assessment.title, domain.as_deref(), skills, instructions, &excerpts);
        let response: CaseResponse =
            ask_json(self.provider.as_ref(), &prompt, Some(prompts::CASE_SYSTEM), CASE_MAX_TOKENS).await?;
        let case_text = response.case_text.trim();
        if case_text.is_empty() {
            return Err(CaseGenerationError::EmptyOutput("case"));
        }
        Ok(case_text.to_string())
    }

    async fn excerpts(&self, query: &str, source_ids: &[Uuid]) -> Result<Vec<RetrievedChunk>, EmbeddingError> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query: String = query.chars().take(RETRIEVAL_QUERY_CHARS).collect();
        embeddings::retrieve(self.provider.as_ref(), &self.pool, &query, Some(source_ids), self.top_k, 0.0).await
    }
}

#[cfg(test)]
mod tests {
    use db::models::{
        assessment::{Assessment, CreateAssessment},
        source::{CreateSource, Source},
        test_support::{create_assessment, create_skill, create_user, pool},
        user::UserRole,
    };

    use super::*;
    use crate::services::{embeddings::embed_source, testing::ScriptedProvider};

    #[tokio::test]
    async fn test_generates_case_and_grounded_solution() {
        let pool = pool().await;
        let provider = ScriptedProvider::new()
            .with_keywords(&["supplier", "audit"])
            .with_reply(r#"{"case_text": "A supplier misses an audit."}"#)
            .with_reply("```json\n{\"solution\": \"Escalate per the handbook [1].\"}\n```");
        let teacher = create_user(&pool, "t@example.edu", UserRole::Teacher).await;
        let skill = create_skill(&pool, "Supplier audit", &["Low", "High"]).await;
        let source = Source::create(
            &pool,
            Uuid::new_v4(),
            &CreateSource {
                title: "Handbook".to_string(),
                kind: None,
                content: "Every supplier audit is logged.".to_string(),
                uploaded_by: None,
            },
        )
        .await
        .unwrap();
        embed_source(&provider, &pool, source.id, 200).await.unwrap();

        let assessment = Assessment::create(
            &pool,
            Uuid::new_v4(),
            &CreateAssessment {
                title: "Supplier audit".to_string(),
                description: None,
                teacher_id: teacher.id,
                group_id: None,
                domain_id: None,
                case_text: None,
                dispute_period_days: None,
                skill_ids: vec![skill.id],
                source_ids: vec![source.id],
            },
        )
        .await
        .unwrap();

        let generator = CaseGenerator::new(pool.clone(), Arc::new(provider.clone()), 3);
        let claimed = generator.claim(assessment.id).await.unwrap();
        assert_eq!(claimed.generation_status, GenerationStatus::Pending);
        assert!(matches!(
            generator.claim(assessment.id).await,
            Err(CaseGenerationError::AlreadyInProgress)
        ));

        generator.generate(assessment.id, GenerateRequest::default()).await.unwrap();

        let stored = Assessment::find_by_id(&pool, assessment.id).await.unwrap().unwrap();
        assert_eq!(stored.case_text.as_deref(), Some("A supplier misses an audit."));
        assert_eq!(stored.solution.as_deref(), Some("Escalate per the handbook [1]."));
        assert_eq!(stored.generation_status, GenerationStatus::Completed);

        let prompts = provider.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Every supplier audit is logged."));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_existing_case_kept() {
        let pool = pool().await;
        let provider = ScriptedProvider::new().with_error(AiError::RateLimited);
        let assessment = create_assessment(&pool, &[]).await;

        let generator = CaseGenerator::new(pool.clone(), Arc::new(provider.clone()), 3);
        generator.claim(assessment.id).await.unwrap();
        let err = generator
            .generate(assessment.id, GenerateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CaseGenerationError::Ai(AiError::RateLimited)));

        let stored = Assessment::find_by_id(&pool, assessment.id).await.unwrap().unwrap();
        assert_eq!(stored.generation_status, GenerationStatus::Failed);
        assert!(stored.generation_error.is_some());
        assert_eq!(stored.case_text, assessment.case_text);
        // Existing case text means only the solution was requested
        assert!(provider.prompts()[0].starts_with("Write the model solution"));

        // A failed generation can be claimed again
        generator.claim(assessment.id).await.unwrap();
    }
}
