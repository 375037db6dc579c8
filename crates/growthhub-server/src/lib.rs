pub mod app;
pub mod config;
pub mod error;
pub mod gemini;
pub mod routes;
pub mod state;
