//! Scripted in-memory network for worker tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use astral_core::{Error, Request, Response};
use async_trait::async_trait;

use crate::fetch::Network;

/// Serves `200 content for <url>` unless told otherwise.
#[derive(Default)]
pub struct ScriptedNetwork {
    responses: Mutex<HashMap<String, Response>>,
    failing: Mutex<HashSet<String>>,
    offline: Mutex<bool>,
    log: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn serving_site() -> Self {
        Self::default()
    }

    /// Every request fails at the transport level.
    pub fn offline() -> Self {
        let network = Self::default();
        network.set_offline(true);
        network
    }

    pub fn respond(&self, url: &str, response: Response) {
        self.failing.lock().unwrap().remove(url);
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// `"METHOD url"` for every request seen, in order.
    pub fn requested(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn send(&self, request: &Request) -> Result<Response, Error> {
        self.log.lock().unwrap().push(format!("{} {}", request.method, request.url));

        if *self.offline.lock().unwrap() || self.failing.lock().unwrap().contains(&request.url) {
            return Err(Error::Network(format!("failed to fetch {}", request.url)));
        }

        let scripted = self.responses.lock().unwrap().get(&request.url).cloned();
        Ok(scripted.unwrap_or_else(|| Response::new(200, format!("content for {}", request.url))))
    }
}
