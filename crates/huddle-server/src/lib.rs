pub mod api;
pub mod audit;
pub mod auth;
pub mod cache;
pub mod dispatch;
pub mod email;
pub mod feed;
pub mod hooks;
pub mod hub;
pub mod jobs;
pub mod mailer;
pub mod mutations;
pub mod resolve;
pub mod retention;
pub mod scheduler;
pub mod state;
pub mod ws;

#[cfg(test)]
pub(crate) mod testkit;
