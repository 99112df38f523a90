pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Puppeteer function run by the Browserless `/function` endpoint. Loads the
/// page, records JSON responses as they arrive, scrolls a bounded number of
/// times, then returns the final DOM together with the recorded responses.
/// A navigation timeout or an exhausted budget ends the work early; whatever
/// was recorded up to then is still returned.
const CAPTURE_FUNCTION: &str = r#"
export default async function ({ page, context }) {
  const responses = [];
  page.on('response', async (response) => {
    const url = response.url();
    if (context.responseFilter && !url.includes(context.responseFilter)) return;
    const contentType = response.headers()['content-type'] || '';
    if (!contentType.includes('json')) return;
    try {
      const body = await response.text();
      responses.push({ url, contentType, body });
    } catch (e) {
      // body unavailable (redirect or evicted); skip this response
    }
  });
  const deadline = Date.now() + context.budgetMs;
  try {
    await page.goto(context.url, { waitUntil: 'networkidle2', timeout: context.navigationTimeoutMs });
  } catch (e) {
    // slow load: keep whatever rendered so far
  }
  let cyclesCompleted = 0;
  for (; cyclesCompleted < context.scrollCycles && Date.now() < deadline; cyclesCompleted++) {
    await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
    const wait = Math.min(context.scrollDelayMs, Math.max(0, deadline - Date.now()));
    await new Promise((resolve) => setTimeout(resolve, wait));
  }
  const html = await page.content();
  return { data: { html, responses, cyclesCompleted }, type: 'application/json' };
}
"#;

/// Parameters for one scripted capture.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub url: String,
    pub scroll_cycles: u32,
    pub scroll_delay_ms: u64,
    /// Only responses whose URL contains this substring are recorded.
    pub response_filter: Option<String>,
    pub navigation_timeout_ms: u64,
    /// Total time the function may spend before returning what it has.
    pub budget_ms: u64,
}

/// A JSON network response recorded during the capture.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterceptedResponse {
    pub url: String,
    #[serde(default)]
    pub content_type: String,
    pub body: String,
}

/// Everything a scripted capture returns.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCapture {
    pub html: String,
    #[serde(default)]
    pub responses: Vec<InterceptedResponse>,
    #[serde(default)]
    pub cycles_completed: u32,
}

#[derive(Serialize)]
struct FunctionBody<'a> {
    code: &'a str,
    context: &'a CaptureRequest,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}/{}", self.base_url, path);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// POST a JSON body to `path` and return the response text.
    async fn call<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.text().await?)
    }

    /// Rendered HTML only, via `/content`. No interception, no scrolling.
    pub async fn content(&self, url: &str) -> Result<String> {
        let html = self.call("content", &serde_json::json!({ "url": url })).await?;
        tracing::debug!(url, html_bytes = html.len(), "Browserless content fetched");
        Ok(html)
    }

    /// Load a page with network interception and bounded scrolling via the
    /// `/function` endpoint.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<PageCapture> {
        tracing::info!(
            url = request.url.as_str(),
            scroll_cycles = request.scroll_cycles,
            budget_ms = request.budget_ms,
            "Starting browserless capture"
        );

        let text = self
            .call(
                "function",
                &FunctionBody {
                    code: CAPTURE_FUNCTION,
                    context: request,
                },
            )
            .await?;
        let capture: PageCapture = serde_json::from_str(&text)?;
        tracing::info!(
            url = request.url.as_str(),
            responses = capture.responses.len(),
            html_bytes = capture.html.len(),
            cycles = capture.cycles_completed,
            "Browserless capture complete"
        );
        Ok(capture)
    }
}
