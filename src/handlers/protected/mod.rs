// Handlers behind the access-token middleware. Role checks happen per
// handler through the `RequireAdmin` / `RequireSuperAdmin` extractors.

pub mod admins;
pub mod auth;
pub mod evaluations;
pub mod profile;
pub mod schools;
pub mod students;
