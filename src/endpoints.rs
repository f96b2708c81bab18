//! The API endpoints URIs.

/// The route for the periodic trigger that runs due recurring rules.
pub const RUN_RECURRING: &str = "/api/cron/recurring";
/// The route to check that the server is up.
pub const HEALTH: &str = "/api/health";
