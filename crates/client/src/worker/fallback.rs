//! Offline fallback resolution.
//!
//! Runs when a strategy could not produce a response. Navigations get a page,
//! function callers get parseable JSON, and the resolver itself never fails:
//! cache read errors are logged and treated as misses.

use astral_core::{CacheDb, Request, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

use super::resources::{CRISIS_RESOURCES, CacheNames, EMERGENCY_CONTACTS, OFFLINE_CRISIS_PAGE, OFFLINE_PAGE};
use super::router::Target;

const FUNCTION_OFFLINE_MESSAGE: &str = "You are offline. This feature will be available when your connection returns.";
const FUNCTION_QUEUED_MESSAGE: &str = "You are offline. Your request was saved and will be sent when you reconnect.";
const GENERIC_OFFLINE_MESSAGE: &str = "This content is not available offline.";

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub struct FallbackResolver {
    db: CacheDb,
    names: CacheNames,
}

impl FallbackResolver {
    pub fn new(db: CacheDb, names: CacheNames) -> Self {
        Self { db, names }
    }

    /// Produce a response for a request whose primary attempt failed.
    ///
    /// `queued` marks a mutating request that was saved for background sync.
    pub async fn resolve(&self, request: &Request, target: &Target, queued: bool) -> Response {
        if request.is_navigation() {
            let page_caches = [self.names.critical.as_str(), self.names.fallback.as_str()];
            for page in [OFFLINE_CRISIS_PAGE, OFFLINE_PAGE] {
                if let Some(response) = self.lookup(&page_caches, page).await {
                    tracing::info!(url = %target.url, page, "serving offline page");
                    return response;
                }
            }
            tracing::warn!(url = %target.url, "no offline page cached");
        } else if target.is_function() {
            return self.function_fallback(target, queued).await;
        }

        if let Some(response) = self.lookup(&[self.names.fallback.as_str()], &target.cache_key).await {
            return response;
        }

        Response::json(200, &json!({ "error": "Offline", "message": GENERIC_OFFLINE_MESSAGE, "timestamp": now_iso() }))
    }

    async fn function_fallback(&self, target: &Target, queued: bool) -> Response {
        let resource = if target.cache_key.contains("crisis-resources") {
            Some(CRISIS_RESOURCES)
        } else if target.cache_key.contains("emergency-contacts") {
            Some(EMERGENCY_CONTACTS)
        } else {
            None
        };

        if let Some(resource) = resource
            && let Some(response) = self.lookup(&[self.names.critical.as_str()], resource).await
        {
            tracing::info!(url = %target.url, resource, "serving cached crisis data");
            return response;
        }

        let message = if queued { FUNCTION_QUEUED_MESSAGE } else { FUNCTION_OFFLINE_MESSAGE };
        Response::json(503, &json!({ "offline": true, "message": message, "cached_at": now_iso() }))
    }

    async fn lookup(&self, caches: &[&str], key: &str) -> Option<Response> {
        match self.db.match_any(caches, key).await {
            Ok(Some(entry)) => Some(entry.to_response()),
            Ok(None) => {
                tracing::debug!(key, "fallback cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "fallback cache read failed");
                None
            }
        }
    }
}
