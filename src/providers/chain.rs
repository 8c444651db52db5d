use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{AmapProvider, GeocodeProvider, MapQuestProvider, NominatimProvider};
use crate::TravelMapError;
use crate::config::TravelMapConfig;
use crate::error::Diagnostic;
use crate::models::{GeocodeResult, Source};
use crate::queue::{Priority, QueueError, QueueSettings, RequestQueue};

/// Configured providers in priority order, each behind its own queue.
pub struct ProviderChain {
    links: Vec<RequestQueue>,
}

impl ProviderChain {
    /// Build the chain from config, skipping providers without credentials.
    pub fn from_config(config: &TravelMapConfig) -> Result<Self, TravelMapError> {
        let providers_config = &config.providers;
        let mut providers: Vec<Arc<dyn GeocodeProvider>> = Vec::new();

        let sources = providers_config
            .sources()
            .map_err(|e| TravelMapError::config(e.to_string()))?;
        for source in sources {
            let provider: Arc<dyn GeocodeProvider> = match source {
                Source::Amap => match providers_config.amap_api_key.as_deref() {
                    Some(key) => Arc::new(AmapProvider::new(key, providers_config)?),
                    None => {
                        debug!("AMap API key missing, skipping provider");
                        continue;
                    }
                },
                Source::OpenStreetMap if providers_config.nominatim_enabled => {
                    Arc::new(NominatimProvider::new(providers_config)?)
                }
                Source::MapQuest => match providers_config.mapquest_api_key.as_deref() {
                    Some(key) => Arc::new(MapQuestProvider::new(key, providers_config)?),
                    None => {
                        debug!("MapQuest API key missing, skipping provider");
                        continue;
                    }
                },
                other => {
                    debug!("{} is disabled, skipping provider", other);
                    continue;
                }
            };
            providers.push(provider);
        }

        let chain = Self::from_providers(providers, QueueSettings::from(&config.queue));
        info!("Geocoding provider chain: {:?}", chain.sources());
        Ok(chain)
    }

    /// Chain over arbitrary providers; later duplicates of a source are dropped.
    #[must_use]
    pub fn from_providers(
        providers: Vec<Arc<dyn GeocodeProvider>>,
        settings: QueueSettings,
    ) -> Self {
        let mut links: Vec<RequestQueue> = Vec::with_capacity(providers.len());
        for provider in providers {
            if links.iter().any(|link| link.source() == provider.source()) {
                warn!("{} listed twice, ignoring duplicate", provider.source());
                continue;
            }
            links.push(RequestQueue::new(provider, settings));
        }
        Self { links }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.links.iter().map(RequestQueue::source).collect()
    }

    /// First provider in the chain.
    #[must_use]
    pub fn primary(&self) -> Option<&RequestQueue> {
        self.links.first()
    }

    /// Longest a lookup can wait in queues when every queue is full and
    /// every provider fails in turn. Provider response time is not included.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.links
            .iter()
            .map(|link| {
                let settings = link.settings();
                let slots = u32::try_from(settings.max_queue_size + 1).unwrap_or(u32::MAX);
                (settings.min_interval + settings.spacing).saturating_mul(slots)
            })
            .sum()
    }

    #[must_use]
    pub fn queue_lengths(&self) -> Vec<(Source, usize)> {
        self.links
            .iter()
            .map(|link| (link.source(), link.queue_length()))
            .collect()
    }

    /// One provider, through its queue.
    pub async fn query(
        queue: &RequestQueue,
        city: &str,
        priority: Priority,
    ) -> Result<GeocodeResult, Diagnostic> {
        let provider = queue.source();
        let ticket = queue.enqueue(city, priority).map_err(|e| match e {
            QueueError::Full { capacity } => Diagnostic::QueueFull { provider, capacity },
        })?;
        ticket
            .await
            .map_err(|error| Diagnostic::Provider { provider, error })
    }

    /// Try every provider in order until one answers.
    ///
    /// Failures and empty answers advance to the next provider without
    /// retrying.
    pub async fn geocode(&self, city: &str, priority: Priority) -> Result<GeocodeResult, Diagnostic> {
        if self.links.is_empty() {
            return Err(Diagnostic::NoProviders);
        }

        let mut attempts = Vec::with_capacity(self.links.len());
        for link in &self.links {
            match Self::query(link, city, priority).await {
                Ok(result) => return Ok(result),
                Err(diagnostic) => {
                    warn!("Geocoding '{}' failed: {}", city, diagnostic);
                    attempts.push(diagnostic);
                }
            }
        }

        Err(Diagnostic::AllProvidersExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::GeoCoordinate;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        source: Source,
        answer: Result<(f64, f64), ProviderError>,
        calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(source: Source, answer: Result<(f64, f64), ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                source,
                answer,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GeocodeProvider for StubProvider {
        fn source(&self) -> Source {
            self.source
        }

        async fn geocode(&self, _city: &str) -> Result<GeocodeResult, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let (lng, lat) = self.answer.clone()?;
            Ok(GeocodeResult::new(GeoCoordinate::new(lng, lat).unwrap(), self.source))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_advances_past_failures_without_retry() {
        let failing = StubProvider::new(Source::Amap, Err(ProviderError::Status(503)));
        let empty = StubProvider::new(Source::OpenStreetMap, Err(ProviderError::NotFound));
        let working = StubProvider::new(Source::MapQuest, Ok((2.35, 48.85)));
        let chain = ProviderChain::from_providers(
            vec![failing.clone(), empty.clone(), working.clone()],
            QueueSettings::default(),
        );

        let result = chain.geocode("Paris", Priority::Normal).await.unwrap();
        assert_eq!(result.source, Source::MapQuest);
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(working.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let first = StubProvider::new(Source::Amap, Ok((116.4, 39.9)));
        let second = StubProvider::new(Source::OpenStreetMap, Ok((0.0, 0.0)));
        let chain = ProviderChain::from_providers(
            vec![first, second.clone()],
            QueueSettings::default(),
        );

        let result = chain.geocode("北京", Priority::Normal).await.unwrap();
        assert_eq!(result.source, Source::Amap);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_collects_attempts() {
        let chain = ProviderChain::from_providers(
            vec![
                StubProvider::new(Source::Amap, Err(ProviderError::Rejected("INVALID_USER_KEY".into()))),
                StubProvider::new(Source::OpenStreetMap, Err(ProviderError::NotFound)),
            ],
            QueueSettings::default(),
        );

        match chain.geocode("Atlantis", Priority::Normal).await {
            Err(Diagnostic::AllProvidersExhausted { attempts }) => assert_eq!(attempts.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = ProviderChain::from_providers(Vec::new(), QueueSettings::default());
        assert_eq!(
            chain.geocode("Paris", Priority::Normal).await,
            Err(Diagnostic::NoProviders)
        );
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let chain = ProviderChain::from_providers(
            vec![
                StubProvider::new(Source::Amap, Err(ProviderError::NotFound)),
                StubProvider::new(Source::Amap, Err(ProviderError::NotFound)),
            ],
            QueueSettings::default(),
        );
        assert_eq!(chain.sources(), vec![Source::Amap]);
    }

    #[test]
    fn test_worst_case_wait_covers_every_full_queue() {
        assert_eq!(
            ProviderChain::from_providers(vec![], QueueSettings::default()).worst_case_wait(),
            Duration::ZERO
        );

        let chain = ProviderChain::from_providers(
            vec![
                StubProvider::new(Source::Amap, Err(ProviderError::NotFound)),
                StubProvider::new(Source::OpenStreetMap, Err(ProviderError::NotFound)),
                StubProvider::new(Source::MapQuest, Err(ProviderError::NotFound)),
            ],
            QueueSettings::default(),
        );
        // 3 queues x 101 slots x (500ms + 10ms)
        assert_eq!(chain.worst_case_wait(), Duration::from_millis(154_530));
    }

    #[test]
    fn test_from_config_skips_unconfigured_providers() {
        let mut config = TravelMapConfig::default();
        let chain = ProviderChain::from_config(&config).unwrap();
        assert_eq!(chain.sources(), vec![Source::OpenStreetMap]);

        config.providers.amap_api_key = Some("key".to_string());
        config.providers.nominatim_enabled = false;
        let chain = ProviderChain::from_config(&config).unwrap();
        assert_eq!(chain.sources(), vec![Source::Amap]);
        assert_eq!(chain.primary().map(RequestQueue::source), Some(Source::Amap));
    }
}
