use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use tracing::debug;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of page bodies; scrapers only ever see this seam.
pub trait Fetcher {
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP client that waits `delay` between consecutive requests.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    delay: Duration,
    last_request: Cell<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, delay: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            delay,
            last_request: Cell::new(None),
        })
    }

    fn wait_turn(&self) {
        if let Some(last) = self.last_request.get() {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
        self.last_request.set(Some(Instant::now()));
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_text(&self, url: &str) -> Result<String> {
        self.wait_turn();
        debug!(url, "GET");

        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request failed: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("GET {url} returned {status}");
        }

        response
            .text()
            .with_context(|| format!("failed to read response body: {url}"))
    }
}
