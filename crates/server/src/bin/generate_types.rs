//! Writes the TypeScript declarations of every API type to `shared/types.ts`,
//! or to the path given as the first argument.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use ts_rs::TS;

fn declarations() -> Vec<String> {
    vec![
        utils::response::ApiResponse::<()>::decl(),
        utils::pagination::Page::<()>::decl(),
        utils::pagination::ListParams::decl(),
        utils::pagination::SortOrder::decl(),
        db::models::user::UserRole::decl(),
        db::models::user::User::decl(),
        db::models::user::CreateUser::decl(),
        db::models::user::UpdateUser::decl(),
        db::models::user::UserFilter::decl(),
        db::models::group::Group::decl(),
        db::models::group::CreateGroup::decl(),
        db::models::group::UpdateGroup::decl(),
        db::models::group::GroupFilter::decl(),
        db::models::group::AddGroupMember::decl(),
        db::models::domain::Domain::decl(),
        db::models::domain::CreateDomain::decl(),
        db::models::domain::UpdateDomain::decl(),
        db::models::skill::Skill::decl(),
        db::models::skill::SkillWithLevels::decl(),
        db::models::skill::CreateSkill::decl(),
        db::models::skill::UpdateSkill::decl(),
        db::models::skill::SkillFilter::decl(),
        db::models::skill_level::SkillLevel::decl(),
        db::models::skill_level::NewSkillLevel::decl(),
        db::models::source::SourceKind::decl(),
        db::models::source::SourceStatus::decl(),
        db::models::source::Source::decl(),
        db::models::source::CreateSource::decl(),
        db::models::source::SourceFilter::decl(),
        db::models::assessment::AssessmentStatus::decl(),
        db::models::assessment::GenerationStatus::decl(),
        db::models::assessment::Assessment::decl(),
        db::models::assessment::AssessmentDetail::decl(),
        db::models::assessment::CreateAssessment::decl(),
        db::models::assessment::UpdateAssessment::decl(),
        db::models::assessment::AssessmentFilter::decl(),
        db::models::attempt::AttemptStatus::decl(),
        db::models::attempt::Attempt::decl(),
        db::models::attempt::StartAttempt::decl(),
        db::models::attempt::SaveAnswer::decl(),
        db::models::attempt::AttemptFilter::decl(),
        db::models::result::SkillResult::decl(),
        db::models::result::SkillResultView::decl(),
        db::models::dispute::DisputeStatus::decl(),
        db::models::dispute::Dispute::decl(),
        db::models::dispute::OpenDispute::decl(),
        db::models::dispute::ResolveDispute::decl(),
        db::models::dispute::DisputeFilter::decl(),
        services::services::background_jobs::JobKind::decl(),
        services::services::background_jobs::JobStatus::decl(),
        services::services::background_jobs::JobRecord::decl(),
        services::services::embeddings::RetrievedChunk::decl(),
        services::services::case_generator::GenerateRequest::decl(),
        services::services::database_validator::ValidationResult::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::sources::SourceWithJob::decl(),
        server::routes::sources::SearchSources::decl(),
        server::routes::assessments::GenerationStarted::decl(),
        server::routes::attempts::AttemptSubmitted::decl(),
    ]
}

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shared/types.ts"));

    let mut out = String::from("// Generated by `cargo run --bin generate_types`. Do not edit.\n\n");
    for decl in declarations() {
        out.push_str("export ");
        out.push_str(&decl);
        out.push_str("\n\n");
    }

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    fs::write(&path, out).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
