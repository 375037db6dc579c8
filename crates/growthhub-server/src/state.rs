use std::sync::Arc;

use tracing::info;

use growthhub_core::{
    generation::TextGenerator,
    quota::{SamplingPolicy, UsageQuotaGate},
    segments::{default_segments, Segment},
};
use growthhub_duckdb::DuckDbBackend;

use crate::{config::Config, gemini::GeminiClient};

/// Shared application state injected into every handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// Usage log storage; also the store behind `gate`.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup.
    pub config: Arc<Config>,

    /// Quota-checked access to the text generator.
    pub gate: UsageQuotaGate,

    /// Segment catalog, fixed at startup.
    pub segments: Arc<Vec<Segment>>,
}

impl AppState {
    /// State backed by the Gemini client described in `config.gemini`.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let generator = Arc::new(GeminiClient::new(config.gemini.clone()));
        Self::with_generator(db, config, generator)
    }

    /// State with an explicit generator.
    pub fn with_generator(
        db: DuckDbBackend,
        config: Config,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let db = Arc::new(db);
        let gate = UsageQuotaGate::new(db.clone(), generator, config.timezone)
            .with_sampling(SamplingPolicy::new(config.generation_sample_rate));
        info!(
            timezone = %config.timezone,
            sample_rate = config.generation_sample_rate,
            "Usage quota gate ready"
        );
        Self {
            db,
            config: Arc::new(config),
            gate,
            segments: Arc::new(default_segments()),
        }
    }

    pub fn find_segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }
}
