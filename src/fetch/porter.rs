//! Chromium-driven quote fetcher for porter.in.
//!
//! Each fetch launches its own headless browser and walks the estimate form:
//! city, service type, requirement, pickup, drop, contact details, submit,
//! then reads the vehicle cards. Every wait is bounded by the step timeout.

use super::QuoteFetcher;
use super::selectors as sel;
use crate::model::{Quote, QuoteFailure, QuoteRequest, QuoteResult};
use crate::telemetry::{fetch as fetch_span, metrics};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use opentelemetry::KeyValue;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

const POLL_STEP: Duration = Duration::from_millis(250);
const SETTLE: Duration = Duration::from_secs(1);
const AUTOCOMPLETE_DELAY: Duration = Duration::from_secs(2);

/// Browser settings for [`PorterFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Chromium binary. `None` lets chromiumoxide locate one.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Upper bound on each explicit wait for an element.
    pub step_timeout: Duration,
    pub site_url: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            step_timeout: Duration::from_secs(15),
            site_url: sel::SITE_URL.to_string(),
        }
    }
}

/// Fetches quotes by driving the porter.in estimate form.
pub struct PorterFetcher {
    config: FetcherConfig,
}

type StepResult<T> = std::result::Result<T, QuoteFailure>;

fn browser_failure(e: impl std::fmt::Display) -> QuoteFailure {
    QuoteFailure::new("Browser automation failed")
        .details(format!("browser error: {e}"))
        .suggestion("Make sure Chromium is installed, or point CHROME_PATH at it")
}

fn layout_failure(reason: &str) -> QuoteFailure {
    QuoteFailure::new(reason).details("porter.in might have changed its form structure")
}

fn contact_failure() -> QuoteFailure {
    QuoteFailure::new("Could not fill contact details")
        .details("porter.in might have changed its form fields")
}

impl PorterFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    async fn launch(&self) -> StepResult<(Browser, JoinHandle<()>)> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .request_timeout(self.config.step_timeout);
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = self.config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder.build().map_err(browser_failure)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(browser_failure)?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler: {e}");
                }
            }
        });
        Ok((browser, events))
    }

    async fn run(&self, request: &QuoteRequest) -> StepResult<Vec<Quote>> {
        let (mut browser, events) = self.launch().await?;
        info!(url = %self.config.site_url, "browser launched");

        let result = match browser.new_page(self.config.site_url.as_str()).await {
            Ok(page) => {
                let session = Session {
                    page: &page,
                    step_timeout: self.config.step_timeout,
                };
                session.walk(request).await
            }
            Err(e) => Err(browser_failure(e)),
        };

        if let Err(e) = browser.close().await {
            debug!("browser close: {e}");
        }
        match browser.wait().await {
            Ok(status) => debug!(?status, "browser process exited"),
            Err(e) => debug!("browser wait: {e}"),
        }
        events.abort();
        debug!("browser closed");

        result
    }
}

#[async_trait]
impl QuoteFetcher for PorterFetcher {
    async fn fetch_quote(&self, request: &QuoteRequest) -> QuoteResult {
        let span =
            fetch_span::start_fetch_span(request.city.as_str(), request.service_type.as_str());
        let start = Instant::now();

        let result = self.run(request).instrument(span.clone()).await;

        let elapsed_ms = start.elapsed().as_millis() as f64;
        metrics::fetch_duration_ms().record(elapsed_ms, &[]);
        match result {
            Ok(quotes) => {
                fetch_span::record_quote_count(&span, quotes.len());
                metrics::fetch_results().add(1, &[KeyValue::new("result", "success")]);
                QuoteResult::Success { quotes }
            }
            Err(failure) => {
                span.in_scope(|| warn!(%failure, "fetch failed"));
                metrics::fetch_results().add(1, &[KeyValue::new("result", "failure")]);
                QuoteResult::Failure(failure)
            }
        }
    }
}

/// One page walking through the estimate form.
struct Session<'a> {
    page: &'a Page,
    step_timeout: Duration,
}

impl Session<'_> {
    async fn walk(&self, request: &QuoteRequest) -> StepResult<Vec<Quote>> {
        self.select_city(request.city.as_str()).await?;

        debug!("opening estimate form");
        self.wait_for(sel::ESTIMATE_CARD)
            .await
            .ok_or_else(|| layout_failure("Could not open the estimate form"))?
            .click()
            .await
            .map_err(browser_failure)?;

        self.select_service_type(request.service_type.label()).await?;

        if !self.select_requirement().await {
            warn!("could not select requirement type, continuing");
        }

        let pickup = self
            .wait_for(sel::PICKUP_INPUT)
            .await
            .ok_or_else(|| layout_failure("Could not find pickup address field"))?;
        self.fill_address(&pickup, &request.pickup_address).await?;

        let drop_input = self
            .page
            .find_element(sel::DROP_INPUT)
            .await
            .map_err(|_| layout_failure("Could not find drop address field"))?;
        self.fill_address(&drop_input, &request.drop_address).await?;

        self.fill_contact(request.phone.as_str(), &request.name).await?;

        debug!("submitting form");
        let submit = self.wait_for(sel::SUBMIT_BUTTON).await.ok_or_else(|| {
            QuoteFailure::new("Could not submit the form")
                .details("the submit button never became available")
                .suggestion("Check that every field is filled with a valid value")
        })?;
        submit.click().await.map_err(browser_failure)?;

        self.collect_quotes().await
    }

    /// Poll for an element until the step timeout passes.
    async fn wait_for(&self, selector: &str) -> Option<Element> {
        let deadline = Instant::now() + self.step_timeout;
        loop {
            if let Ok(element) = self.page.find_element(selector).await {
                return Some(element);
            }
            if Instant::now() >= deadline {
                debug!(selector, "timed out waiting for element");
                return None;
            }
            tokio::time::sleep(POLL_STEP).await;
        }
    }

    async fn text_of(element: &Element) -> String {
        element
            .inner_text()
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    async fn select_city(&self, city: &str) -> StepResult<()> {
        debug!(city, "selecting city");
        self.wait_for(sel::CITY_SELECTOR)
            .await
            .ok_or_else(|| layout_failure("Could not open the city selector"))?
            .click()
            .await
            .map_err(browser_failure)?;
        tokio::time::sleep(SETTLE).await;

        let options = self
            .page
            .find_elements(sel::CITY_OPTIONS)
            .await
            .unwrap_or_default();
        let wanted = city.to_lowercase();
        for option in &options {
            if Self::text_of(option).await.to_lowercase().contains(&wanted) {
                option.click().await.map_err(browser_failure)?;
                return Ok(());
            }
        }

        Err(QuoteFailure::new(format!("Could not find city '{city}' on porter.in"))
            .details("the city might not be available or the site changed its interface")
            .suggestion("Double-check the city name or try another supported city"))
    }

    async fn select_service_type(&self, label: &str) -> StepResult<()> {
        debug!(service = label, "selecting service type");
        tokio::time::sleep(SETTLE).await;

        let mut containers = Vec::new();
        for selector in sel::SERVICE_CONTAINERS {
            if let Ok(found) = self.page.find_elements(*selector).await {
                if !found.is_empty() {
                    containers = found;
                    break;
                }
            }
        }

        let wanted = label.to_lowercase();
        for container in &containers {
            if Self::text_of(container).await.to_lowercase().contains(&wanted) {
                container.click().await.map_err(browser_failure)?;
                tokio::time::sleep(SETTLE).await;
                return Ok(());
            }
        }

        Err(layout_failure(&format!("Could not select service type: {label}"))
            .suggestion("Try a different service type or report the layout change"))
    }

    /// Best effort: the form still submits without it on some layouts.
    async fn select_requirement(&self) -> bool {
        for selector in sel::REQUIREMENT_INPUTS {
            if let Ok(input) = self.page.find_element(*selector).await {
                if input.click().await.is_ok() {
                    return true;
                }
            }
        }
        match self.page.evaluate(sel::REQUIREMENT_SCRIPT).await {
            Ok(result) => result.into_value::<bool>().unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn fill_address(&self, input: &Element, address: &str) -> StepResult<()> {
        debug!(address, "entering address");
        Self::replace_text(input, address).await?;
        tokio::time::sleep(AUTOCOMPLETE_DELAY).await;

        for selector in sel::AUTOCOMPLETE_OPTIONS {
            let options = self.page.find_elements(*selector).await.unwrap_or_default();
            if let Some(first) = options.first() {
                if first.click().await.is_ok() {
                    tokio::time::sleep(SETTLE).await;
                    return Ok(());
                }
            }
        }

        debug!("no autocomplete option clicked, using keyboard");
        input.press_key("ArrowDown").await.map_err(browser_failure)?;
        input.press_key("Enter").await.map_err(browser_failure)?;
        tokio::time::sleep(SETTLE).await;
        Ok(())
    }

    async fn fill_contact(&self, phone: &str, name: &str) -> StepResult<()> {
        let mobile = self
            .wait_for(sel::MOBILE_INPUT)
            .await
            .ok_or_else(contact_failure)?;
        Self::replace_text(&mobile, phone).await?;

        let name_input = self
            .page
            .find_element(sel::NAME_INPUT)
            .await
            .map_err(|_| contact_failure())?;
        Self::replace_text(&name_input, name).await
    }

    /// Focus an input, drop whatever it holds, then type `text`.
    async fn replace_text(input: &Element, text: &str) -> StepResult<()> {
        input.click().await.map_err(browser_failure)?;
        input
            .call_js_fn(sel::CLEAR_INPUT_FN, false)
            .await
            .map_err(browser_failure)?;
        input.type_str(text).await.map_err(browser_failure)?;
        Ok(())
    }

    async fn collect_quotes(&self) -> StepResult<Vec<Quote>> {
        debug!("waiting for results");
        if self.wait_for(sel::RESULT_CARD).await.is_none() {
            return Err(QuoteFailure::new("Results took too long to load")
                .details("porter.in might be slow or the addresses could not be resolved")
                .suggestion("Try different addresses or run the request again"));
        }

        let cards = self
            .page
            .find_elements(sel::RESULT_CARD)
            .await
            .map_err(browser_failure)?;
        if cards.is_empty() {
            return Ok(Vec::new());
        }

        let mut quotes = Vec::with_capacity(cards.len());
        for (i, card) in cards.iter().enumerate() {
            match Self::parse_card(card).await {
                Ok(quote) => {
                    debug!(card = i + 1, vehicle = %quote.vehicle_name, "parsed quote");
                    quotes.push(quote);
                }
                Err(e) => warn!(card = i + 1, "skipping unparseable quote card: {e}"),
            }
        }

        if quotes.is_empty() {
            return Err(QuoteFailure::new("Could not parse any quotes")
                .details("porter.in returned results in an unrecognised format")
                .suggestion("The result card structure has probably changed"));
        }
        info!(count = quotes.len(), "quotes retrieved");
        Ok(quotes)
    }

    async fn parse_card(card: &Element) -> chromiumoxide::error::Result<Quote> {
        let vehicle = Self::text_of(&card.find_element(sel::CARD_VEHICLE_NAME).await?).await;
        let fare = Self::text_of(&card.find_element(sel::CARD_FARE).await?).await;
        let capacity = Self::text_of(&card.find_element(sel::CARD_CAPACITY).await?).await;
        Ok(Quote::from_card(vehicle.trim(), fare.trim(), capacity.trim()))
    }
}
