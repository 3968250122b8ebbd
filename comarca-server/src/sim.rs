//! Simulated scraper adapters for local operation and demos.
//!
//! The real portal automation is an external collaborator; these adapters
//! let the binary run end to end, emitting a plausible log narrative with
//! deterministic per-tribunal results. A target listed in the
//! `options.extra["fail"]` field fails with a scrape error instead.

use std::{
    hash::{DefaultHasher, Hash, Hasher},
    time::Duration,
};

use async_trait::async_trait;
use comarca_core::{
    ExecutionLogSink, Result, ScrapeError, ScrapeOptions, ScrapeOutcome,
    ScraperAdapter, Sistema, TribunalConfig,
};

#[derive(Debug)]
pub struct SimulatedAdapter {
    sistema: Sistema,
}

impl SimulatedAdapter {
    pub fn new(sistema: Sistema) -> Self {
        Self { sistema }
    }

    fn seed(tribunal: &TribunalConfig) -> u64 {
        let mut hasher = DefaultHasher::new();
        tribunal.id.to_string().hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl ScraperAdapter for SimulatedAdapter {
    fn sistema(&self) -> Sistema {
        self.sistema
    }

    async fn execute(
        &self,
        tribunal: &TribunalConfig,
        options: &ScrapeOptions,
        logs: &ExecutionLogSink,
    ) -> Result<ScrapeOutcome> {
        let seed = Self::seed(tribunal);
        let page_delay = Duration::from_millis(20 + seed % 60);

        logs.info(format!("authenticating against {}", tribunal.url)).await;
        tokio::time::sleep(page_delay).await;

        if options
            .extra
            .get("fail")
            .is_some_and(|code| *code == tribunal.id.code)
        {
            logs.warn("portal returned an unexpected login page").await;
            return Err(ScrapeError::Scrape {
                tribunal: tribunal.id.to_string(),
                message: "simulated portal failure".into(),
            });
        }

        logs.info("session established").await;

        let pages = 2 + (seed % 3);
        let per_page = 4 + (seed % 9);
        for page in 1..=pages {
            tokio::time::sleep(page_delay).await;
            logs.info(format!(
                "page {page}/{pages}: {per_page} records collected"
            ))
            .await;
        }

        Ok(ScrapeOutcome {
            count: pages * per_page,
            artifacts: Vec::new(),
        })
    }
}

/// One simulated adapter per sistema, covering the whole catalog.
pub fn simulated_registry() -> comarca_core::AdapterRegistry {
    let mut registry = comarca_core::AdapterRegistry::new();
    for sistema in Sistema::all() {
        registry.register(std::sync::Arc::new(SimulatedAdapter::new(*sistema)));
    }
    registry
}
