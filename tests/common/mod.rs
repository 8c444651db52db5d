//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use travelmap::cache::{MemoryStore, PersistentCache};
use travelmap::{
    GeoCoordinate, GeocodeProvider, GeocodeResolver, GeocodeResult, ProviderChain, ProviderError,
    QueueSettings, ResolverSettings, Source,
};

/// Provider answering from a fixed table, counting every call.
pub struct MockProvider {
    source: Source,
    cities: HashMap<String, (f64, f64)>,
    failure: Option<ProviderError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            cities: HashMap::new(),
            failure: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_city(mut self, name: &str, lng: f64, lat: f64) -> Self {
        self.cities.insert(name.to_lowercase(), (lng, lat));
        self
    }

    /// Every call fails with `error`.
    pub fn failing(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodeProvider for MockProvider {
    fn source(&self) -> Source {
        self.source
    }

    async fn geocode(&self, city: &str) -> Result<GeocodeResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        let (lng, lat) = self
            .cities
            .get(&city.to_lowercase())
            .copied()
            .ok_or(ProviderError::NotFound)?;
        let coordinate =
            GeoCoordinate::new(lng, lat).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(GeocodeResult::new(coordinate, self.source))
    }
}

pub fn chain(providers: &[Arc<MockProvider>], settings: QueueSettings) -> ProviderChain {
    let providers = providers
        .iter()
        .map(|provider| Arc::clone(provider) as Arc<dyn GeocodeProvider>)
        .collect();
    ProviderChain::from_providers(providers, settings)
}

/// Resolver over `providers` with a persistent cache backed by `store`.
pub fn resolver_with_store(
    providers: &[Arc<MockProvider>],
    store: Arc<MemoryStore>,
) -> GeocodeResolver {
    GeocodeResolver::new(
        chain(providers, QueueSettings::default()),
        PersistentCache::new(store),
        ResolverSettings::default(),
    )
}

pub fn resolver(providers: &[Arc<MockProvider>]) -> GeocodeResolver {
    resolver_with_store(providers, Arc::new(MemoryStore::new()))
}
