// Capture session: bounded collection window over a driver's event feed.
//
// The driver pushes events into a channel while the page loads and scrolls.
// The session owns the only buffer, stops listening at the deadline or the
// scroll-cycle bound, and hands back a closed `RawCapture`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use shopscout_common::CaptureConfig;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::error::CaptureError;

/// Channel capacity between driver and session.
const EVENT_BUFFER: usize = 256;

/// One intercepted network response.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    /// Request URL, when the driver reports it.
    pub url: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

impl CapturedResponse {
    pub fn new(url: Option<String>, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            content_type: content_type.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Response(CapturedResponse),
    /// Serialized page state, when the driver can read it directly.
    EmbeddedState(String),
    /// DOM snapshot. A later snapshot replaces an earlier one.
    Snapshot(String),
    /// The driver finished scroll/wait cycle `n` (1-based).
    ScrollCycle(u32),
}

/// Everything captured in one window. Closed: nothing is appended after the
/// session returns it.
#[derive(Debug, Clone, Default)]
pub struct RawCapture {
    pub responses: Vec<CapturedResponse>,
    pub embedded_state: Option<String>,
    pub dom_snapshot: Option<String>,
    pub cycles_completed: u32,
    /// The window closed on its deadline rather than on driver completion.
    pub timed_out: bool,
}

impl RawCapture {
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty() && self.embedded_state.is_none() && self.dom_snapshot.is_none()
    }
}

/// The page a run captures, and how its records are labelled.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CaptureTarget {
    #[builder(setter(into))]
    pub url: String,
    #[builder(default, setter(into))]
    pub category: String,
}

/// Drives a browser (or a stand-in) and reports what it sees.
#[async_trait]
pub trait CaptureDriver: Send + Sync {
    /// Load `target`, run up to `scroll_cycles` scroll/wait cycles, and push
    /// events as they happen. Returning drops the sender, which closes the
    /// session's window.
    async fn drive(
        &self,
        target: &CaptureTarget,
        scroll_cycles: u32,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), CaptureError>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowClose {
    DriverFinished,
    CycleBound,
    Deadline,
}

pub struct CaptureSession {
    buffer: RawCapture,
    events: mpsc::Receiver<CaptureEvent>,
    scroll_cycles: u32,
    deadline: Instant,
}

impl CaptureSession {
    fn new(events: mpsc::Receiver<CaptureEvent>, config: &CaptureConfig) -> Self {
        Self {
            buffer: RawCapture::default(),
            events,
            scroll_cycles: config.scroll_cycles,
            deadline: Instant::now() + config.deadline(),
        }
    }

    /// Run `driver` against `target` and collect until the window closes.
    ///
    /// A driver error, or a deadline with nothing collected, is fatal. Any
    /// partial capture is returned as-is.
    pub async fn run(
        driver: Arc<dyn CaptureDriver>,
        target: CaptureTarget,
        config: &CaptureConfig,
    ) -> Result<RawCapture, CaptureError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let scroll_cycles = config.scroll_cycles;
        let driver_name = driver.name().to_string();
        let url = target.url.clone();

        info!(url = url.as_str(), driver = driver_name.as_str(), scroll_cycles, "Capture started");

        let handle = tokio::spawn(async move { driver.drive(&target, scroll_cycles, tx).await });

        let mut session = CaptureSession::new(rx, config);
        let close = session.collect().await;

        let driver_result = match close {
            WindowClose::DriverFinished => match handle.await {
                Ok(result) => result,
                Err(e) => Err(CaptureError::Driver(format!("driver task failed: {e}"))),
            },
            WindowClose::CycleBound | WindowClose::Deadline => {
                handle.abort();
                session.drain_queued();
                Ok(())
            }
        };

        let capture = session.buffer;
        if close == WindowClose::Deadline && capture.is_empty() {
            warn!(
                url = url.as_str(),
                driver = driver_name.as_str(),
                "Capture deadline passed with nothing collected"
            );
            return Err(CaptureError::Timeout(config.deadline()));
        }
        if let Err(e) = driver_result {
            if capture.is_empty() {
                return Err(e);
            }
            warn!(url = url.as_str(), error = %e, "Capture driver failed, keeping partial capture");
        }

        if capture.timed_out {
            warn!(
                url = url.as_str(),
                cycles = capture.cycles_completed,
                responses = capture.responses.len(),
                "Capture window hit its deadline, proceeding with partial capture"
            );
        }

        info!(
            url = url.as_str(),
            responses = capture.responses.len(),
            has_state = capture.embedded_state.is_some(),
            has_snapshot = capture.dom_snapshot.is_some(),
            cycles = capture.cycles_completed,
            ?close,
            "Capture closed"
        );

        Ok(capture)
    }

    async fn collect(&mut self) -> WindowClose {
        loop {
            match tokio::time::timeout_at(self.deadline, self.events.recv()).await {
                Ok(Some(event)) => {
                    self.push(event);
                    if self.buffer.cycles_completed >= self.scroll_cycles
                        && self.buffer.dom_snapshot.is_some()
                    {
                        return WindowClose::CycleBound;
                    }
                }
                Ok(None) => return WindowClose::DriverFinished,
                Err(_) => {
                    self.buffer.timed_out = true;
                    return WindowClose::Deadline;
                }
            }
        }
    }

    /// Keep events the driver queued before the window closed.
    fn drain_queued(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.push(event);
        }
    }

    fn push(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Response(response) => {
                debug!(url = ?response.url, bytes = response.body.len(), "Captured response");
                self.buffer.responses.push(response);
            }
            CaptureEvent::EmbeddedState(state) => self.buffer.embedded_state = Some(state),
            CaptureEvent::Snapshot(html) => self.buffer.dom_snapshot = Some(html),
            CaptureEvent::ScrollCycle(n) => {
                self.buffer.cycles_completed = self.buffer.cycles_completed.max(n);
            }
        }
    }
}
