use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use ts_rs::TS;
use utils::pagination::{ListParams, Page};
use uuid::Uuid;

use super::user::User;

/// A class of students taught by one teacher
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateGroup {
    pub name: String,
    pub description: Option<String>,
    pub teacher_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateGroup {
    pub name: Option<String>,
    pub description: Option<String>,
    pub teacher_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct GroupFilter {
    pub teacher_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AddGroupMember {
    pub user_id: Uuid,
}

const SORTABLE: &[&str] = &["name", "created_at", "updated_at"];

impl Group {
    pub async fn create(pool: &SqlitePool, id: Uuid, data: &CreateGroup) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"INSERT INTO groups (id, name, description, teacher_id)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.name.trim())
        .bind(&data.description)
        .bind(data.teacher_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &GroupFilter,
        params: &ListParams,
    ) -> Result<Page<Self>, sqlx::Error> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM groups g WHERE 1 = 1");
        push_filters(&mut count, filter, params);
        let total = count.build_query_scalar::<i64>().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT g.* FROM groups g WHERE 1 = 1");
        push_filters(&mut query, filter, params);
        query
            .push(" ORDER BY g.")
            .push(params.sort_column(SORTABLE, "name"))
            .push(" ")
            .push(params.order().as_sql())
            .push(" LIMIT ")
            .push_bind(params.limit())
            .push(" OFFSET ")
            .push_bind(params.offset());
        let items = query.build_query_as::<Group>().fetch_all(pool).await?;

        Ok(Page::new(items, total, params))
    }

    pub async fn update(pool: &SqlitePool, id: Uuid, data: &UpdateGroup) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Group>(
            r#"UPDATE groups
               SET name        = COALESCE($2, name),
                   description = COALESCE($3, description),
                   teacher_id  = COALESCE($4, teacher_id),
                   updated_at  = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(data.name.as_deref().map(str::trim))
        .bind(&data.description)
        .bind(data.teacher_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Add a user to the group. Returns false if they were already a member.
    pub async fn add_member(pool: &SqlitePool, group_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO group_members (group_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(group_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_member(pool: &SqlitePool, group_id: Uuid, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = $1 AND user_id = $2")
            .bind(group_id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn members(pool: &SqlitePool, group_id: Uuid) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT u.*
               FROM users u
               JOIN group_members gm ON gm.user_id = u.id
               WHERE gm.group_id = $1
               ORDER BY u.name"#,
        )
        .bind(group_id)
        .fetch_all(pool)
        .await
    }

    pub async fn is_member(pool: &SqlitePool, group_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count > 0)
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &GroupFilter, params: &ListParams) {
    if let Some(teacher_id) = filter.teacher_id {
        query.push(" AND g.teacher_id = ").push_bind(teacher_id);
    }
    if let Some(member_id) = filter.member_id {
        query
            .push(" AND EXISTS (SELECT 1 FROM group_members gm WHERE gm.group_id = g.id AND gm.user_id = ")
            .push_bind(member_id)
            .push(")");
    }
    if let Some(pattern) = params.search_pattern() {
        query.push(" AND g.name LIKE ").push_bind(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        test_support::{create_user, pool},
        user::UserRole,
    };

    #[tokio::test]
    async fn test_membership() {
        let pool = pool().await;
        let teacher = create_user(&pool, "t@example.edu", UserRole::Teacher).await;
        let student = create_user(&pool, "s@example.edu", UserRole::Student).await;
        let group = Group::create(
            &pool,
            Uuid::new_v4(),
            &CreateGroup {
                name: "Ethics 101".to_string(),
                description: None,
                teacher_id: teacher.id,
            },
        )
        .await
        .unwrap();

        assert!(Group::add_member(&pool, group.id, student.id).await.unwrap());
        assert!(!Group::add_member(&pool, group.id, student.id).await.unwrap());
        assert!(Group::is_member(&pool, group.id, student.id).await.unwrap());

        let filter = GroupFilter {
            member_id: Some(student.id),
            ..Default::default()
        };
        let page = Group::list(&pool, &filter, &ListParams::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let members = Group::members(&pool, group.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, student.id);

        assert_eq!(Group::remove_member(&pool, group.id, student.id).await.unwrap(), 1);
        assert!(!Group::is_member(&pool, group.id, student.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_teacher_is_foreign_key_violation() {
        let pool = pool().await;
        let err = Group::create(
            &pool,
            Uuid::new_v4(),
            &CreateGroup {
                name: "Orphan".to_string(),
                description: None,
                teacher_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap_err();

        assert!(err.as_database_error().is_some_and(|e| e.is_foreign_key_violation()));
    }
}
