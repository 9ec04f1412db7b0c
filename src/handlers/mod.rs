// Public service endpoints (/, /health) and the plan-driven record API
// under /rest/:group. Every /rest route runs behind the identity middleware.
pub mod rest;
pub mod service;
