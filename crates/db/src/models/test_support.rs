//! Fixtures for tests that need a migrated database with a few rows in it.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    assessment::{Assessment, AssessmentDetail, CreateAssessment},
    domain::{CreateDomain, Domain},
    skill::{CreateSkill, Skill},
    skill_level::{NewSkillLevel, SkillLevel},
    user::{CreateUser, User, UserRole},
};
use crate::DBService;

pub async fn pool() -> SqlitePool {
    DBService::new_in_memory().await.unwrap().pool
}

pub async fn create_user(pool: &SqlitePool, email: &str, role: UserRole) -> User {
    User::create(
        pool,
        Uuid::new_v4(),
        &CreateUser {
            email: email.to_string(),
            name: email.split('@').next().unwrap_or(email).to_string(),
            role: Some(role),
            institution: None,
        },
    )
    .await
    .unwrap()
}

/// Skill in a fresh domain, with the given level labels lowest first
pub async fn create_skill(pool: &SqlitePool, name: &str, levels: &[&str]) -> Skill {
    let domain = Domain::create(
        pool,
        Uuid::new_v4(),
        &CreateDomain {
            name: format!("Domain {}", Uuid::new_v4()),
            description: None,
        },
    )
    .await
    .unwrap();

    let skill = Skill::create(
        pool,
        Uuid::new_v4(),
        &CreateSkill {
            domain_id: domain.id,
            name: name.to_string(),
            description: None,
            levels: None,
        },
    )
    .await
    .unwrap();

    let levels: Vec<_> = levels
        .iter()
        .map(|label| NewSkillLevel {
            label: label.to_string(),
            description: None,
        })
        .collect();
    SkillLevel::replace_for_skill(pool, skill.id, &levels).await.unwrap();

    skill
}

/// Draft assessment with a case text, owned by a new teacher
pub async fn create_assessment(pool: &SqlitePool, skill_ids: &[Uuid]) -> AssessmentDetail {
    let teacher = create_user(pool, &format!("teacher-{}@example.edu", Uuid::new_v4()), UserRole::Teacher).await;
    Assessment::create(
        pool,
        Uuid::new_v4(),
        &CreateAssessment {
            title: "Case study".to_string(),
            description: None,
            teacher_id: teacher.id,
            group_id: None,
            domain_id: None,
            case_text: Some("A mid-sized retailer loses its main supplier.".to_string()),
            dispute_period_days: None,
            skill_ids: skill_ids.to_vec(),
            source_ids: vec![],
        },
    )
    .await
    .unwrap()
}
