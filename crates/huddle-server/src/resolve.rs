use huddle_db::entities::{projects, tasks};
use sea_orm::prelude::Uuid;
use sea_orm::{ConnectionTrait, DbErr, EntityTrait};

/// Rows an activity may point at. Carried verbatim onto audit and feed rows,
/// and used to resolve the owning organization when none is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityRefs {
    pub task_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
}

impl EntityRefs {
    pub fn task(task_id: Uuid) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::default()
        }
    }

    pub fn project(project_id: Uuid) -> Self {
        Self {
            project_id: Some(project_id),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_comment(mut self, comment_id: Uuid) -> Self {
        self.comment_id = Some(comment_id);
        self
    }
}

/// Resolves which organization an activity belongs to.
///
/// Precedence: an explicit organization wins, then the task's project's
/// organization, then the project's organization. `Ok(None)` means nothing
/// referenced resolves to an organization; the caller decides whether that
/// is fatal.
pub async fn organization_for<C: ConnectionTrait>(
    conn: &C,
    explicit: Option<Uuid>,
    refs: &EntityRefs,
) -> Result<Option<Uuid>, DbErr> {
    if let Some(organization_id) = explicit {
        return Ok(Some(organization_id));
    }

    if let Some(task_id) = refs.task_id {
        if let Some(task) = tasks::Entity::find_by_id(task_id).one(conn).await? {
            if let Some(project) = projects::Entity::find_by_id(task.project_id).one(conn).await? {
                return Ok(Some(project.organization_id));
            }
        }
    }

    if let Some(project_id) = refs.project_id {
        if let Some(project) = projects::Entity::find_by_id(project_id).one(conn).await? {
            return Ok(Some(project.organization_id));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[tokio::test]
    async fn explicit_organization_wins() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let other = testkit::seed_org(&db, &owner, "other").await;
        let project = testkit::seed_project(&db, &org).await;
        let task = testkit::seed_task(&db, &project, None).await;

        let resolved = organization_for(&db, Some(other.id), &EntityRefs::task(task.id))
            .await
            .unwrap();
        assert_eq!(resolved, Some(other.id));
    }

    #[tokio::test]
    async fn task_resolves_through_its_project() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;
        let task = testkit::seed_task(&db, &project, None).await;

        let resolved = organization_for(&db, None, &EntityRefs::task(task.id))
            .await
            .unwrap();
        assert_eq!(resolved, Some(org.id));
    }

    #[tokio::test]
    async fn project_alone_resolves() {
        let db = testkit::test_db().await;
        let owner = testkit::seed_user(&db, "owner@example.com").await;
        let org = testkit::seed_org(&db, &owner, "acme").await;
        let project = testkit::seed_project(&db, &org).await;

        let resolved = organization_for(&db, None, &EntityRefs::project(project.id))
            .await
            .unwrap();
        assert_eq!(resolved, Some(org.id));
    }

    #[tokio::test]
    async fn nothing_to_resolve_is_none_not_an_error() {
        let db = testkit::test_db().await;
        let resolved = organization_for(&db, None, &EntityRefs::default())
            .await
            .unwrap();
        assert_eq!(resolved, None);

        // A dangling task reference behaves the same way.
        let resolved = organization_for(&db, None, &EntityRefs::task(Uuid::new_v4()))
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }
}
