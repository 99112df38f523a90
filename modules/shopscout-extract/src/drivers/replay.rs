// Offline capture from a saved JSON file: the page HTML, the embedded state
// blob and any intercepted responses, replayed into the session in that
// order as if a browser had produced them.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::capture::{CaptureDriver, CaptureEvent, CaptureTarget, CapturedResponse};
use crate::error::CaptureError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplayFile {
    pub html: Option<String>,
    /// Either the serialized blob as a string or the state object itself.
    pub embedded_state: Option<Value>,
    pub responses: Vec<ReplayResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Raw body text as a string, or inline JSON.
    pub body: Value,
}

fn default_content_type() -> String {
    "application/json".to_string()
}

fn value_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

pub struct ReplayDriver {
    file: ReplayFile,
}

impl ReplayDriver {
    pub fn new(file: ReplayFile) -> Self {
        Self { file }
    }

    pub async fn load(path: &Path) -> Result<Self, CaptureError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CaptureError::Replay(format!("{}: {e}", path.display())))?;
        let file: ReplayFile = serde_json::from_str(&content)
            .map_err(|e| CaptureError::Replay(format!("{}: {e}", path.display())))?;
        Ok(Self::new(file))
    }

    fn events(&self, scroll_cycles: u32) -> Vec<CaptureEvent> {
        let mut events: Vec<CaptureEvent> = self
            .file
            .responses
            .iter()
            .map(|r| {
                CaptureEvent::Response(CapturedResponse::new(
                    r.url.clone(),
                    r.content_type.clone(),
                    value_text(r.body.clone()),
                ))
            })
            .collect();
        if let Some(state) = self.file.embedded_state.clone() {
            events.push(CaptureEvent::EmbeddedState(value_text(state)));
        }
        events.extend((1..=scroll_cycles).map(CaptureEvent::ScrollCycle));
        if let Some(html) = self.file.html.clone() {
            events.push(CaptureEvent::Snapshot(html));
        }
        events
    }
}

#[async_trait]
impl CaptureDriver for ReplayDriver {
    async fn drive(
        &self,
        _target: &CaptureTarget,
        scroll_cycles: u32,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), CaptureError> {
        for event in self.events(scroll_cycles) {
            if events.send(event).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "replay"
    }
}
