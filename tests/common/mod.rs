//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use page_render_archiver::render::{HtmlDocument, RenderError, RenderOptions, Renderer};
use page_render_archiver::storage::{ObjectStore, UploadError};
use url::Url;

pub const PAGE: &str = "<html>X</html>";

/// Renderer with per-URL scripted results and concurrency instrumentation.
///
/// URLs without a script render [`PAGE`]. A script is consumed one entry per
/// call; once exhausted the last entry repeats.
#[derive(Default)]
pub struct FakeRenderer {
    scripts: HashMap<String, Vec<Result<String, RenderError>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    panic_on: Option<String>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(mut self, url: &str, results: Vec<Result<&str, RenderError>>) -> Self {
        self.scripts.insert(
            url.to_string(),
            results
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect(),
        );
        self
    }

    pub fn fail(self, url: &str, err: RenderError) -> Self {
        self.script(url, vec![Err(err)])
    }

    pub fn panic_on(mut self, url: &str) -> Self {
        self.panic_on = Some(url.to_string());
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn next_result(&self, url: &str) -> Result<HtmlDocument, RenderError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(url.to_string()).or_insert(0);
            *entry += 1;
            *entry - 1
        };
        match self.scripts.get(url) {
            Some(script) => script[call.min(script.len() - 1)]
                .clone()
                .map(HtmlDocument::new),
            None => Ok(HtmlDocument::new(PAGE)),
        }
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(
        &self,
        url: &Url,
        _options: &RenderOptions,
    ) -> Result<HtmlDocument, RenderError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next_result(url.as_str());

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.as_deref() == Some(url.as_str()) {
            panic!("renderer blew up on {url}");
        }
        result
    }
}

/// Store that records puts and rejects configured keys.
#[derive(Default)]
pub struct RecordingStore {
    puts: Mutex<Vec<(String, String, Vec<u8>, String)>>,
    reject: Vec<String>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(keys: &[&str]) -> Self {
        Self {
            puts: Mutex::new(Vec::new()),
            reject: keys.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    pub fn puts(&self) -> Vec<(String, String, Vec<u8>, String)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.puts().into_iter().map(|(_, k, _, _)| k).collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), UploadError> {
        if self.reject.iter().any(|k| k == key) {
            return Err(UploadError::Status {
                key: key.to_string(),
                status: 503,
            });
        }
        self.puts.lock().unwrap().push((
            bucket.to_string(),
            key.to_string(),
            bytes.to_vec(),
            content_type.to_string(),
        ));
        Ok(())
    }
}
