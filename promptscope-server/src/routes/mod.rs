pub mod dashboards;
pub mod events;
pub mod feedback;
pub mod health;
pub mod projects;
pub mod prompts;
pub mod responses;
pub mod sessions;
pub mod tags;
pub mod users;
pub mod widgets;
