use std::sync::Arc;

use db::DBService;
use services::services::{
    ai_client::AiProvider, assessments::AssessmentService, attempts::AttemptService,
    background_jobs::JobQueue, case_generator::CaseGenerator, disputes::DisputeService,
    grading::GradingService,
};
use sqlx::SqlitePool;

/// Tunables the handlers need at request time
#[derive(Debug, Clone)]
pub struct Settings {
    pub chunk_size: usize,
    pub retrieval_top_k: usize,
    pub ai_configured: bool,
}

/// Shared handler state. Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    db: DBService,
    ai: Arc<dyn AiProvider>,
    jobs: JobQueue,
    settings: Settings,
}

impl AppState {
    pub fn new(db: DBService, ai: Arc<dyn AiProvider>, jobs: JobQueue, settings: Settings) -> Self {
        Self { db, ai, jobs, settings }
    }

    pub fn db(&self) -> &DBService {
        &self.db
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }

    pub fn ai(&self) -> Arc<dyn AiProvider> {
        self.ai.clone()
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn assessments(&self) -> AssessmentService {
        AssessmentService::new(self.db.pool.clone())
    }

    pub fn attempts(&self) -> AttemptService {
        AttemptService::new(self.db.pool.clone())
    }

    pub fn disputes(&self) -> DisputeService {
        DisputeService::new(self.db.pool.clone())
    }

    pub fn grading(&self) -> GradingService {
        GradingService::new(self.db.pool.clone(), self.ai.clone())
    }

    pub fn case_generator(&self) -> CaseGenerator {
        CaseGenerator::new(self.db.pool.clone(), self.ai.clone(), self.settings.retrieval_top_k)
    }
}
