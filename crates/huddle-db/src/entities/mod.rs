pub mod activity_logs;
pub mod comment_mentions;
pub mod comments;
pub mod feed_items;
pub mod memberships;
pub mod organizations;
pub mod projects;
pub mod tasks;
pub mod teams;
pub mod users;
