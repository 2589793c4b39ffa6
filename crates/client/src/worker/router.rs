//! Request routing.
//!
//! Routes are checked in order and the first match wins. Crisis function
//! routes sit before the generic function route so crisis traffic never lands
//! in the general queue. Cross-origin requests skip the table entirely.

use std::sync::LazyLock;

use astral_core::{Error, QueueKind, Request};
use regex::Regex;
use serde::Serialize;
use url::Url;

use super::resources::is_critical;
use crate::fetch::{cache_key, is_same_origin, parse_origin, resolve};

static FUNCTION_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/(?:\.netlify/functions|api)/").unwrap());
// Keyword must be a whole path word: `crisis-alert` matches, `helpers` doesn't.
static CRISIS_FUNCTION_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/(?:\.netlify/functions|api)/(?:.*[/_-])?(?:crisis|emergency|help)(?:[/_.-]|$)").unwrap()
});
static STATIC_ASSET_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(?:js|mjs|css|png|jpe?g|gif|svg|webp|ico|woff2?|ttf|otf)$").unwrap());

/// Path under `/.netlify/functions/` or `/api/`.
pub fn is_function_path(path: &str) -> bool {
    FUNCTION_PATH.is_match(path)
}

/// How a matched request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "queue")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    NetworkOnly,
    /// Network, else enqueue for background sync.
    QueueOnFailure(QueueKind),
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    CrisisFunction,
    Function,
    Critical,
    StaticAsset,
    Navigation,
}

impl Matcher {
    fn matches(self, request: &Request, target: &Target) -> bool {
        let path = target.url.path();
        match self {
            Matcher::CrisisFunction => CRISIS_FUNCTION_PATH.is_match(path),
            Matcher::Function => is_function_path(path),
            Matcher::Critical => is_critical(&target.cache_key),
            Matcher::StaticAsset => STATIC_ASSET_PATH.is_match(path),
            Matcher::Navigation => request.is_navigation(),
        }
    }
}

#[derive(Debug, Clone)]
struct Route {
    name: &'static str,
    method: Option<&'static str>,
    matcher: Matcher,
    strategy: Strategy,
}

const DEFAULT_ROUTE: &str = "default";

fn route_table() -> Vec<Route> {
    vec![
        Route {
            name: "crisis-functions",
            method: Some("POST"),
            matcher: Matcher::CrisisFunction,
            strategy: Strategy::QueueOnFailure(QueueKind::Crisis),
        },
        Route {
            name: "functions",
            method: Some("POST"),
            matcher: Matcher::Function,
            strategy: Strategy::QueueOnFailure(QueueKind::General),
        },
        Route {
            name: "critical-resources",
            method: Some("GET"),
            matcher: Matcher::Critical,
            strategy: Strategy::CacheFirst,
        },
        Route {
            name: "static-assets",
            method: Some("GET"),
            matcher: Matcher::StaticAsset,
            strategy: Strategy::CacheFirst,
        },
        Route {
            name: "function-reads",
            method: Some("GET"),
            matcher: Matcher::Function,
            strategy: Strategy::NetworkFirst,
        },
        Route { name: "navigations", method: None, matcher: Matcher::Navigation, strategy: Strategy::NetworkFirst },
    ]
}

/// A request URL resolved against the worker origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    pub cache_key: String,
    pub same_origin: bool,
}

impl Target {
    pub fn is_function(&self) -> bool {
        self.same_origin && is_function_path(self.url.path())
    }
}

/// The route chosen for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: &'static str,
    pub strategy: Strategy,
    pub target: Target,
}

/// Ordered, first-match-wins route table.
pub struct Router {
    origin: Url,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(origin: &str) -> Result<Self, Error> {
        let origin = parse_origin(origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self { origin, routes: route_table() })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve a URL against the origin and derive its cache key.
    pub fn target(&self, url: &str) -> Result<Target, Error> {
        let url = resolve(&self.origin, url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Target {
            cache_key: cache_key(&self.origin, &url),
            same_origin: is_same_origin(&self.origin, &url),
            url,
        })
    }

    pub fn route(&self, request: &Request) -> Result<RouteMatch, Error> {
        let target = self.target(&request.url)?;

        if target.same_origin {
            for route in &self.routes {
                if route.method.is_some_and(|m| m != request.method) {
                    continue;
                }
                if route.matcher.matches(request, &target) {
                    tracing::debug!(route = route.name, url = %target.url, "route matched");
                    return Ok(RouteMatch { route: route.name, strategy: route.strategy, target });
                }
            }
        }

        Ok(RouteMatch { route: DEFAULT_ROUTE, strategy: Strategy::NetworkOnly, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new("https://astral.example").unwrap()
    }

    fn route_of(request: Request) -> (&'static str, Strategy) {
        let matched = router().route(&request).unwrap();
        (matched.route, matched.strategy)
    }

    #[test]
    fn test_crisis_posts_use_crisis_queue() {
        for url in ["/.netlify/functions/crisis/alert", "/.netlify/functions/emergency-contact", "/api/help-request"] {
            assert_eq!(
                route_of(Request::post(url, "{}")),
                ("crisis-functions", Strategy::QueueOnFailure(QueueKind::Crisis)),
                "{url}"
            );
        }
    }

    #[test]
    fn test_other_posts_use_general_queue() {
        for url in ["/.netlify/functions/chat", "/api/mood-entries", "/api/reflections?draft=1"] {
            assert_eq!(
                route_of(Request::post(url, "{}")),
                ("functions", Strategy::QueueOnFailure(QueueKind::General)),
                "{url}"
            );
        }
    }

    #[test]
    fn test_crisis_keyword_must_be_a_path_word() {
        for url in ["/api/helpers", "/.netlify/functions/dilemmas-helpful", "/api/crisisless", "/api/non_emergencyish"] {
            assert_eq!(route_of(Request::post(url, "{}")).0, "functions", "{url}");
        }
        for url in ["/.netlify/functions/send-crisis-alert", "/api/v1/emergency", "/api/user_help/42"] {
            assert_eq!(route_of(Request::post(url, "{}")).0, "crisis-functions", "{url}");
        }
    }

    #[test]
    fn test_crisis_match_is_case_insensitive() {
        assert_eq!(route_of(Request::post("/api/Crisis", "{}")).0, "crisis-functions");
    }

    #[test]
    fn test_critical_resources_are_cache_first() {
        assert_eq!(route_of(Request::get("/emergency-contacts.json")), ("critical-resources", Strategy::CacheFirst));
        assert_eq!(
            route_of(Request::get("https://astral.example/offline-crisis.html")),
            ("critical-resources", Strategy::CacheFirst)
        );
    }

    #[test]
    fn test_critical_match_is_exact() {
        assert_eq!(route_of(Request::get("/emergency-contacts.json?v=3")).0, DEFAULT_ROUTE);
    }

    #[test]
    fn test_static_assets() {
        for url in ["/assets/index-4f2a.js", "/styles/main.CSS", "/icon-192.png", "/fonts/inter.woff2?v=1"] {
            assert_eq!(route_of(Request::get(url)), ("static-assets", Strategy::CacheFirst), "{url}");
        }
    }

    #[test]
    fn test_function_reads_are_network_first() {
        assert_eq!(route_of(Request::get("/api/unknown")), ("function-reads", Strategy::NetworkFirst));
        assert_eq!(
            route_of(Request::get("/.netlify/functions/crisis-resources")),
            ("function-reads", Strategy::NetworkFirst)
        );
    }

    #[test]
    fn test_navigations_are_network_first() {
        assert_eq!(route_of(Request::navigate("/dashboard")), ("navigations", Strategy::NetworkFirst));
    }

    #[test]
    fn test_default_route() {
        assert_eq!(route_of(Request::get("/robots.txt")), (DEFAULT_ROUTE, Strategy::NetworkOnly));
        assert_eq!(route_of(Request::new("DELETE", "/api/mood-entries/4")), (DEFAULT_ROUTE, Strategy::NetworkOnly));
    }

    #[test]
    fn test_cross_origin_takes_default() {
        assert_eq!(route_of(Request::post("https://other.example/api/crisis", "{}")).0, DEFAULT_ROUTE);
        assert_eq!(route_of(Request::get("https://cdn.example/app.js")).0, DEFAULT_ROUTE);
    }

    #[test]
    fn test_target_cache_key() {
        let matched = router().route(&Request::get("/api/resources?lang=en#top")).unwrap();
        assert_eq!(matched.target.cache_key, "/api/resources?lang=en");
        assert!(matched.target.same_origin);
        assert!(matched.target.is_function());
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(router().route(&Request::get("javascript:alert(1)")), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_strategy_serialization() {
        let value = serde_json::to_value(Strategy::QueueOnFailure(QueueKind::Crisis)).unwrap();
        assert_eq!(value, serde_json::json!({ "kind": "queue-on-failure", "queue": "crisis" }));
        let value = serde_json::to_value(Strategy::CacheFirst).unwrap();
        assert_eq!(value, serde_json::json!({ "kind": "cache-first" }));
    }
}
