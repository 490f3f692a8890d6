// Handlers reachable without an access token: login, refresh (guarded by
// the refresh-token middleware instead) and the health probe.

pub mod auth;
pub mod ping;

pub use auth::{login as auth_login, refresh as auth_refresh};
pub use ping::get as ping;
