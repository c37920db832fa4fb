//! Scripted upstream for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Semaphore;

use super::{CodesQuery, MeasuresQuery, TariffUpstream, UpstreamError};

/// What the scripted upstream answers for one page
#[derive(Debug, Clone)]
pub enum Scripted {
    Body(Value),
    Status(u16),
}

/// Upstream that replays fixed pages and records every request
///
/// Pages without a script answer 404, like the real service past its end.
/// A gated upstream records each request, then holds it until [`release`]
/// hands out a permit.
///
/// [`release`]: MockUpstream::release
#[derive(Default)]
pub struct MockUpstream {
    pages: Mutex<HashMap<u32, Scripted>>,
    calls: Mutex<Vec<CodesQuery>>,
    gate: Option<Semaphore>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: u32, body: Value) -> Self {
        self.set_page(page, body);
        self
    }

    pub fn with_status(self, page: u32, status: u16) -> Self {
        self.set_status(page, status);
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    /// Let `pages` held requests through
    pub fn release(&self, pages: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(pages);
        }
    }

    /// Re-script a page after the upstream has been shared
    pub fn set_page(&self, page: u32, body: Value) {
        self.pages
            .lock()
            .unwrap()
            .insert(page, Scripted::Body(body));
    }

    pub fn set_status(&self, page: u32, status: u16) {
        self.pages
            .lock()
            .unwrap()
            .insert(page, Scripted::Status(status));
    }

    pub fn calls(&self) -> Vec<CodesQuery> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn status_error(status: u16) -> UpstreamError {
    UpstreamError::Status {
        status,
        url: "mock://codes".to_string(),
        body: String::new(),
    }
}

#[async_trait]
impl TariffUpstream for MockUpstream {
    async fn fetch_codes_page(&self, query: &CodesQuery) -> Result<Value, UpstreamError> {
        self.calls.lock().unwrap().push(query.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let scripted = self.pages.lock().unwrap().get(&query.page).cloned();
        match scripted {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::Status(status)) => Err(status_error(status)),
            None => Err(status_error(404)),
        }
    }

    async fn fetch_measures(&self, query: &MeasuresQuery) -> Result<Value, UpstreamError> {
        Ok(serde_json::json!({ "nomenclatureCode": query.code, "measures": [] }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
