// Live capture through a Browserless instance. The remote function does the
// scrolling and interception; its result is replayed into the session as
// events. When the scripted capture fails, a plain rendered snapshot is
// fetched instead so the markup strategies still have something to read.

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, CaptureRequest, PageCapture};
use shopscout_common::CaptureConfig;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::capture::{CaptureDriver, CaptureEvent, CaptureTarget, CapturedResponse};
use crate::error::CaptureError;

/// The two remote calls the driver needs.
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    async fn capture(&self, request: &CaptureRequest) -> browserless_client::Result<PageCapture>;
    async fn content(&self, url: &str) -> browserless_client::Result<String>;
}

#[async_trait]
impl RemoteBrowser for BrowserlessClient {
    async fn capture(&self, request: &CaptureRequest) -> browserless_client::Result<PageCapture> {
        BrowserlessClient::capture(self, request).await
    }

    async fn content(&self, url: &str) -> browserless_client::Result<String> {
        BrowserlessClient::content(self, url).await
    }
}

pub struct BrowserlessDriver<B = BrowserlessClient> {
    browser: B,
    capture: CaptureConfig,
    response_filter: Option<String>,
}

impl<B: RemoteBrowser> BrowserlessDriver<B> {
    pub fn new(browser: B, capture: CaptureConfig, response_filter: Option<String>) -> Self {
        Self {
            browser,
            capture,
            response_filter,
        }
    }

    /// The remote budget matches the cycle count actually requested, so it
    /// always ends before the session's deadline for the same run.
    fn request(&self, target: &CaptureTarget, scroll_cycles: u32) -> CaptureRequest {
        let budget = self.capture.with_scroll_cycles(scroll_cycles).remote_budget();
        CaptureRequest {
            url: target.url.clone(),
            scroll_cycles,
            scroll_delay_ms: self.capture.cycle_timeout_ms,
            response_filter: self.response_filter.clone(),
            navigation_timeout_ms: self.capture.navigation_timeout_ms,
            budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
        }
    }

    fn events(capture: PageCapture) -> impl Iterator<Item = CaptureEvent> {
        capture
            .responses
            .into_iter()
            .map(|r| CaptureEvent::Response(CapturedResponse::new(Some(r.url), r.content_type, r.body)))
            .chain((1..=capture.cycles_completed).map(CaptureEvent::ScrollCycle))
            .chain(std::iter::once(CaptureEvent::Snapshot(capture.html)))
    }
}

#[async_trait]
impl<B: RemoteBrowser + 'static> CaptureDriver for BrowserlessDriver<B> {
    async fn drive(
        &self,
        target: &CaptureTarget,
        scroll_cycles: u32,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), CaptureError> {
        let stream: Vec<CaptureEvent> =
            match self.browser.capture(&self.request(target, scroll_cycles)).await {
                Ok(capture) => Self::events(capture).collect(),
                Err(e) => {
                    warn!(
                        url = target.url.as_str(),
                        error = %e,
                        "Scripted capture failed, falling back to snapshot"
                    );
                    let html = self
                        .browser
                        .content(&target.url)
                        .await
                        .map_err(|_| CaptureError::from(e))?;
                    vec![CaptureEvent::Snapshot(html)]
                }
            };

        for event in stream {
            if events.send(event).await.is_err() {
                debug!("Capture session closed before all events were delivered");
                break;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use browserless_client::{BrowserlessError, InterceptedResponse};

    use super::*;
    use crate::capture::CaptureSession;

    /// Canned remote: either a full capture or a failing one, and optionally
    /// a rendered page for the fallback.
    struct CannedBrowser {
        capture: Option<PageCapture>,
        content: Option<String>,
    }

    #[async_trait]
    impl RemoteBrowser for CannedBrowser {
        async fn capture(&self, _request: &CaptureRequest) -> browserless_client::Result<PageCapture> {
            self.capture.clone().ok_or(BrowserlessError::Api {
                status: 500,
                message: "function crashed".into(),
            })
        }

        async fn content(&self, _url: &str) -> browserless_client::Result<String> {
            self.content
                .clone()
                .ok_or_else(|| BrowserlessError::Network("connection reset".into()))
        }
    }

    fn capture_config() -> CaptureConfig {
        CaptureConfig {
            scroll_cycles: 3,
            cycle_timeout_ms: 1500,
            navigation_timeout_ms: 60_000,
            transfer_margin_ms: 15_000,
        }
    }

    fn target() -> CaptureTarget {
        CaptureTarget::builder()
            .url("https://www.shopltk.com/categories/ltkhome")
            .category("ltkhome")
            .build()
    }

    #[test]
    fn request_carries_target_settings_and_budget() {
        let client = BrowserlessClient::new("http://browserless:3000", None).unwrap();
        let driver = BrowserlessDriver::new(client, capture_config(), Some("api-gateway".into()));

        let request = driver.request(&target(), 4);
        assert_eq!(request.url, "https://www.shopltk.com/categories/ltkhome");
        assert_eq!(request.scroll_cycles, 4);
        assert_eq!(request.scroll_delay_ms, 1500);
        assert_eq!(request.response_filter.as_deref(), Some("api-gateway"));
        assert_eq!(request.budget_ms, 66_000);

        let session_deadline = capture_config().with_scroll_cycles(4).deadline();
        assert!(u128::from(request.budget_ms) < session_deadline.as_millis());
    }

    #[tokio::test]
    async fn scripted_capture_becomes_events() {
        let browser = CannedBrowser {
            capture: Some(PageCapture {
                html: "<p>rendered</p>".into(),
                responses: vec![InterceptedResponse {
                    url: "https://api-gateway.shopltk.com/v2/ltks".into(),
                    content_type: "application/json".into(),
                    body: r#"{"ltks":[]}"#.into(),
                }],
                cycles_completed: 2,
            }),
            content: None,
        };
        let driver = Arc::new(BrowserlessDriver::new(browser, capture_config(), None));

        let capture = CaptureSession::run(driver, target(), &capture_config()).await.unwrap();
        assert_eq!(capture.responses.len(), 1);
        assert_eq!(capture.cycles_completed, 2);
        assert_eq!(capture.dom_snapshot.as_deref(), Some("<p>rendered</p>"));
    }

    #[tokio::test]
    async fn failed_capture_falls_back_to_rendered_snapshot() {
        let browser = CannedBrowser {
            capture: None,
            content: Some(r#"<a href="/explore/a/posts/p1">p1</a>"#.into()),
        };
        let driver = Arc::new(BrowserlessDriver::new(browser, capture_config(), None));

        let capture = CaptureSession::run(driver, target(), &capture_config()).await.unwrap();
        assert!(capture.responses.is_empty());
        assert!(capture.dom_snapshot.unwrap().contains("/posts/p1"));
    }

    #[tokio::test]
    async fn both_calls_failing_reports_the_capture_error() {
        let browser = CannedBrowser {
            capture: None,
            content: None,
        };
        let driver = Arc::new(BrowserlessDriver::new(browser, capture_config(), None));

        let err = CaptureSession::run(driver, target(), &capture_config()).await.unwrap_err();
        match err {
            CaptureError::Driver(message) => assert!(message.contains("function crashed")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
