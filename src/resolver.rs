//! Geocode resolution
//!
//! [`GeocodeResolver::resolve`] walks in-memory cache, persistent cache, the
//! provider chain, the built-in table and finally a fixed default point. It
//! always produces a coordinate; `source` tells the caller how much to trust
//! it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, FjallStore, InMemoryCache, PersistentCache};
use crate::config::TravelMapConfig;
use crate::coordinates::CoordinateStore;
use crate::error::Diagnostic;
use crate::models::{CityQuery, GeoCoordinate, GeocodeResult, Source, TrajectoryPoint, TravelPoint};
use crate::providers::ProviderChain;
use crate::queue::Priority;

/// Beijing, used when nothing else matches.
pub const DEFAULT_FALLBACK: GeoCoordinate = GeoCoordinate::from_trusted(116.397_428, 39.909_23);

#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub fallback: GeoCoordinate,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(200),
            fallback: DEFAULT_FALLBACK,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &TravelMapConfig) -> Result<Self> {
        Ok(Self {
            batch_size: config.batch.size.max(1),
            batch_delay: config.batch.delay(),
            fallback: config.fallback.coordinate()?,
        })
    }
}

/// How a slot got its value, from the point of view of one caller.
enum Outcome {
    /// Another caller filled the slot
    Joined,
    PersistentHit,
    Fresh,
}

pub struct GeocodeResolver {
    memory: InMemoryCache,
    persistent: PersistentCache,
    providers: ProviderChain,
    coordinates: CoordinateStore,
    settings: ResolverSettings,
}

impl GeocodeResolver {
    #[must_use]
    pub fn new(providers: ProviderChain, persistent: PersistentCache, settings: ResolverSettings) -> Self {
        Self {
            memory: InMemoryCache::new(),
            persistent,
            providers,
            coordinates: CoordinateStore::builtin(),
            settings,
        }
    }

    /// Resolver wired from configuration, with the on-disk cache when it can
    /// be opened.
    pub fn from_config(config: &TravelMapConfig) -> Result<Self> {
        let providers = ProviderChain::from_config(config)?;

        let persistent = match FjallStore::open(&config.cache.location) {
            Ok(store) => PersistentCache::new(Arc::new(store)),
            Err(e) => {
                warn!(
                    "Persistent cache unavailable at {}, continuing without it: {}",
                    config.cache.location, e
                );
                PersistentCache::unavailable()
            }
        }
        .with_prefix(&config.cache.key_prefix)
        .with_ttl(config.cache.ttl(), config.cache.ttl_jitter);

        Ok(Self::new(
            providers,
            persistent,
            ResolverSettings::from_config(config)?,
        ))
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderChain {
        &self.providers
    }

    #[must_use]
    pub fn settings(&self) -> ResolverSettings {
        self.settings
    }

    fn default_result(&self) -> GeocodeResult {
        GeocodeResult::new(self.settings.fallback, Source::Default)
    }

    /// Built-in table, else the default point.
    fn estimate(&self, city: &str) -> GeocodeResult {
        self.coordinates
            .resolve(city)
            .unwrap_or_else(|| self.default_result())
    }

    /// Resolve `city` to a coordinate. Never fails.
    ///
    /// Concurrent calls for the same city share one lookup. Results tagged
    /// `default` are neither cached nor shared with later callers.
    #[tracing::instrument(name = "resolve_city", skip(self))]
    pub async fn resolve(&self, city: &str, force_refresh: bool) -> GeocodeResult {
        let query = CityQuery::new(city).with_refresh(force_refresh);
        if query.is_empty() {
            return self.default_result();
        }
        let key = query.cache_key();

        let slot = if force_refresh {
            self.memory.replace_slot(&key)
        } else {
            if let Some(hit) = self.memory.get(&key) {
                debug!("In-memory cache hit for {}", query.name);
                return hit.as_cache_hit();
            }
            self.memory.slot(&key)
        };

        let mut outcome = Outcome::Joined;
        let outcome_ref = &mut outcome;
        let result = slot
            .get_or_init(|| async move {
                let (result, how) = self.lookup(&query).await;
                *outcome_ref = how;
                result
            })
            .await
            .clone();

        match outcome {
            Outcome::Joined if result.source.is_cacheable() => result.as_cache_hit(),
            Outcome::Joined => result,
            Outcome::PersistentHit => result.as_cache_hit(),
            Outcome::Fresh if result.source.is_cacheable() => {
                self.persistent.put(&key, &result);
                result
            }
            Outcome::Fresh => {
                self.memory.evict_if_same(&key, &slot);
                result
            }
        }
    }

    async fn lookup(&self, query: &CityQuery) -> (GeocodeResult, Outcome) {
        if !query.force_refresh {
            if let Some(hit) = self.persistent.get(&query.cache_key()) {
                debug!("Persistent cache hit for {}", query.name);
                return (hit, Outcome::PersistentHit);
            }
        }

        match self.providers.geocode(&query.name, Priority::Normal).await {
            Ok(result) => (result, Outcome::Fresh),
            Err(diagnostic) => {
                info!("Falling back for {}: {}", query.name, diagnostic);
                (self.estimate(&query.name), Outcome::Fresh)
            }
        }
    }

    /// Ask only the first provider in the chain, through its queue.
    ///
    /// Cached results count when they originally came from that provider.
    /// Concurrent calls for the same city share one provider call.
    #[tracing::instrument(name = "query_primary", skip(self))]
    pub async fn query_primary(
        &self,
        city: &str,
        force_refresh: bool,
        priority: Priority,
    ) -> Result<GeocodeResult, Diagnostic> {
        let primary = self.providers.primary().ok_or(Diagnostic::NoProviders)?;
        let query = CityQuery::new(city).with_refresh(force_refresh);
        let key = query.cache_key();

        if !force_refresh {
            let cached = self
                .memory
                .get(&key)
                .or_else(|| self.persistent.get(&key));
            if let Some(hit) = cached.filter(|hit| hit.source == primary.source()) {
                self.memory.put(&key, hit.clone());
                return Ok(hit.as_cache_hit());
            }
        }

        // A completed slot at this point holds another source's answer
        let slot = if force_refresh || self.memory.has(&key) {
            self.memory.replace_slot(&key)
        } else {
            self.memory.slot(&key)
        };

        let name = query.name.as_str();
        let mut fresh = false;
        let fresh_ref = &mut fresh;
        let result = slot
            .get_or_try_init(|| async move {
                *fresh_ref = true;
                ProviderChain::query(primary, name, priority).await
            })
            .await?
            .clone();

        if fresh {
            self.persistent.put(&key, &result);
            return Ok(result);
        }
        if result.source == primary.source() {
            return Ok(result.as_cache_hit());
        }

        // Joined a full-chain lookup that settled on another source
        let result = ProviderChain::query(primary, name, priority).await?;
        self.memory.put(&key, result.clone());
        self.persistent.put(&key, &result);
        Ok(result)
    }

    /// Cached coordinate if known, otherwise an immediate estimate while the
    /// real lookup runs in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn resolve_or_estimate(self: &Arc<Self>, city: &str) -> GeocodeResult {
        let query = CityQuery::new(city);
        if query.is_empty() {
            return self.default_result();
        }
        let key = query.cache_key();

        if let Some(hit) = self.memory.get(&key) {
            return hit.as_cache_hit();
        }
        if let Some(hit) = self.persistent.get(&key) {
            self.memory.put(&key, hit.clone());
            return hit.as_cache_hit();
        }

        let resolver = Arc::clone(self);
        let name = query.name.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&name, false).await;
            debug!("Background resolution of {} finished: {}", name, result.source);
        });

        self.estimate(&query.name)
    }

    /// Fill in locations for every unresolved point.
    ///
    /// Works in batches of `batch_size`, concurrently within a batch and with
    /// `batch_delay` between batches. Returns how many points were resolved.
    #[tracing::instrument(name = "resolve_points", skip_all, fields(points = points.len()))]
    pub async fn resolve_points(&self, points: &mut [TrajectoryPoint]) -> usize {
        let pending: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, point)| !point.is_resolved())
            .map(|(index, _)| index)
            .collect();

        for (batch, indices) in pending.chunks(self.settings.batch_size).enumerate() {
            if batch > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }

            let cities: Vec<String> = indices
                .iter()
                .map(|&index| points[index].point.city.clone())
                .collect();
            let results = join_all(cities.iter().map(|city| self.resolve(city, false))).await;

            for (&index, result) in indices.iter().zip(results) {
                points[index].location = Some(result);
            }
        }

        pending.len()
    }

    /// Resolve a whole imported trip.
    pub async fn resolve_trip(&self, points: Vec<TravelPoint>) -> Vec<TrajectoryPoint> {
        let mut trajectory: Vec<TrajectoryPoint> = points.into_iter().map(Into::into).collect();
        self.resolve_points(&mut trajectory).await;
        trajectory
    }

    /// Whether the persistent store could be opened.
    #[must_use]
    pub fn cache_available(&self) -> bool {
        self.persistent.is_available()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.persistent.stats()
    }

    pub fn sweep_expired(&self) -> usize {
        self.persistent.sweep_expired()
    }

    #[must_use]
    pub fn memory_entries(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub fn queue_lengths(&self) -> Vec<(Source, usize)> {
        self.providers.queue_lengths()
    }

    /// Periodically drop expired persistent entries.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let removed = resolver.sweep_expired();
                if removed > 0 {
                    info!("Swept {} expired geocode cache entries", removed);
                }
            }
        })
    }
}
