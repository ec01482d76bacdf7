pub mod ai_client;
pub mod assessments;
pub mod attempts;
pub mod background_jobs;
pub mod case_generator;
pub mod database_validator;
pub mod disputes;
pub mod embeddings;
pub mod grading;
pub mod prompts;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
