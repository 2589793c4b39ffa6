//! Crisis resource set and cache population policy.
//!
//! Install pre-fetches the precache list into the critical cache on a
//! best-effort basis. Activation re-validates the critical set and issues one
//! repair fetch per missing entry.

use std::sync::Arc;
use std::time::Duration;

use astral_core::{CacheDb, Error, Request, Response};
use serde::Serialize;

use crate::fetch::{Network, send_with_timeout};

pub const OFFLINE_CRISIS_PAGE: &str = "/offline-crisis.html";
pub const CRISIS_RESOURCES: &str = "/crisis-resources.json";
pub const COPING_STRATEGIES: &str = "/offline-coping-strategies.json";
pub const EMERGENCY_CONTACTS: &str = "/emergency-contacts.json";
pub const OFFLINE_PAGE: &str = "/offline.html";
pub const MANIFEST: &str = "/manifest.json";

/// Resources that must stay available offline.
pub const CRITICAL_RESOURCES: [&str; 4] = [OFFLINE_CRISIS_PAGE, CRISIS_RESOURCES, COPING_STRATEGIES, EMERGENCY_CONTACTS];

/// Fetched at install alongside the critical set.
pub const PRECACHE_EXTRAS: [&str; 4] = [OFFLINE_PAGE, MANIFEST, "/icon-192.png", "/icon-512.png"];

/// Extras also copied into the emergency fallback cache.
const FALLBACK_PAGES: [&str; 2] = [OFFLINE_PAGE, MANIFEST];

pub fn is_critical(key: &str) -> bool {
    CRITICAL_RESOURCES.contains(&key)
}

/// Names of the caches belonging to one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    /// Critical crisis resources.
    pub critical: String,
    /// Secondary lookups for the generic offline fallback.
    pub fallback: String,
    /// Cache-first static assets.
    pub static_assets: String,
    /// Successful network-first reads.
    pub runtime: String,
}

impl CacheNames {
    pub fn new(version: &str) -> Self {
        Self {
            critical: format!("crisis-resources-{version}"),
            fallback: format!("emergency-fallback-{version}"),
            static_assets: format!("static-resources-{version}"),
            runtime: format!("runtime-{version}"),
        }
    }

    /// Every cache name in the current version set.
    pub fn current(&self) -> [&str; 4] {
        [self.critical.as_str(), self.fallback.as_str(), self.static_assets.as_str(), self.runtime.as_str()]
    }

    pub fn is_current(&self, name: &str) -> bool {
        self.current().contains(&name)
    }
}

/// URLs stored and URLs that couldn't be fetched or stored in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

/// Populates and repairs the critical cache.
pub struct ResourcePolicy {
    db: CacheDb,
    network: Arc<dyn Network>,
    names: CacheNames,
    timeout: Duration,
}

impl ResourcePolicy {
    pub fn new(db: CacheDb, network: Arc<dyn Network>, names: CacheNames, timeout: Duration) -> Self {
        Self { db, network, names, timeout }
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    /// Pre-fetch the critical set and extras.
    ///
    /// A failed fetch or store is logged and recorded; it never aborts the pass.
    pub async fn install(&self) -> Result<PopulationReport, Error> {
        let critical = self.db.open_cache(&self.names.critical).await?;
        let fallback = self.db.open_cache(&self.names.fallback).await?;
        let mut report = PopulationReport::default();

        for url in CRITICAL_RESOURCES.iter().chain(PRECACHE_EXTRAS.iter()) {
            let response = match self.fetch_ok(url).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(url, error = %e, "precache fetch failed");
                    report.failed.push(url.to_string());
                    continue;
                }
            };

            if let Err(e) = critical.put(url, &response).await {
                tracing::warn!(url, error = %e, "precache store failed");
                report.failed.push(url.to_string());
                continue;
            }
            if FALLBACK_PAGES.contains(url)
                && let Err(e) = fallback.put(url, &response).await
            {
                tracing::warn!(url, error = %e, "fallback store failed");
            }
            report.cached.push(url.to_string());
        }

        tracing::info!(cached = report.cached.len(), failed = report.failed.len(), "install precache finished");
        Ok(report)
    }

    /// Critical URLs with no entry in the critical cache.
    pub async fn missing_critical(&self) -> Result<Vec<&'static str>, Error> {
        let critical = self.db.open_cache(&self.names.critical).await?;
        let mut missing = Vec::new();
        for url in CRITICAL_RESOURCES {
            if critical.match_url(url).await?.is_none() {
                missing.push(url);
            }
        }
        Ok(missing)
    }

    /// Issue one repair fetch for every missing critical URL.
    pub async fn revalidate(&self) -> Result<PopulationReport, Error> {
        let missing = self.missing_critical().await?;
        if missing.is_empty() {
            tracing::debug!("critical resources intact");
            return Ok(PopulationReport::default());
        }

        tracing::info!(missing = ?missing, "repairing critical resources");
        self.store_critical(&missing).await
    }

    /// Re-fetch every critical URL, overwriting what is cached.
    pub async fn refresh(&self) -> Result<PopulationReport, Error> {
        self.store_critical(&CRITICAL_RESOURCES).await
    }

    /// Delete caches outside the current version set.
    ///
    /// Returns the deleted names.
    pub async fn delete_stale_caches(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.db.cache_names().await? {
            if self.names.is_current(&name) {
                continue;
            }
            if self.db.delete_cache(&name).await? {
                tracing::info!(cache = %name, "deleted stale cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    async fn store_critical(&self, urls: &[&str]) -> Result<PopulationReport, Error> {
        let critical = self.db.open_cache(&self.names.critical).await?;
        let mut report = PopulationReport::default();

        for url in urls {
            let stored = match self.fetch_ok(url).await {
                Ok(response) => critical.put(url, &response).await,
                Err(e) => Err(e),
            };
            match stored {
                Ok(()) => report.cached.push(url.to_string()),
                Err(e) => {
                    tracing::error!(url, error = %e, "critical resource unavailable");
                    report.failed.push(url.to_string());
                }
            }
        }

        Ok(report)
    }

    async fn fetch_ok(&self, url: &str) -> Result<Response, Error> {
        let response = send_with_timeout(self.network.as_ref(), &Request::get(url), self.timeout).await?;
        if !response.is_success() {
            return Err(Error::HttpError(format!("status {} for {}", response.status, url)));
        }
        Ok(response)
    }
}
