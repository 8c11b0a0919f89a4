use sea_orm_migration::prelude::*;

mod m0001_create_users;
mod m0002_create_organizations;
mod m0003_create_teams;
mod m0004_create_memberships;
mod m0005_create_projects;
mod m0006_create_tasks;
mod m0007_create_comments;
mod m0008_create_activity_logs;
mod m0009_create_feed_items;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m0001_create_users::Migration),
            Box::new(m0002_create_organizations::Migration),
            Box::new(m0003_create_teams::Migration),
            Box::new(m0004_create_memberships::Migration),
            Box::new(m0005_create_projects::Migration),
            Box::new(m0006_create_tasks::Migration),
            Box::new(m0007_create_comments::Migration),
            Box::new(m0008_create_activity_logs::Migration),
            Box::new(m0009_create_feed_items::Migration),
        ]
    }
}
