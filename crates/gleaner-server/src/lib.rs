//! REST API server: routes, authentication and DTOs over the extraction pipeline.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;
