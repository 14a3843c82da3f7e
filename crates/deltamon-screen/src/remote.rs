//! HTTP adapter for an external vision/automation agent.
//!
//! The agent owns the real screen: template matching, screenshots, OCR and
//! simulated input. It exposes one JSON endpoint per collaborator call:
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | `POST /locate` | `{"template"}` | `{"found", "bounds"?, "confidence"?}` |
//! | `POST /capture` | `{"region"}` | `{"frame_id"}` |
//! | `POST /extract` | `{"frame_id"}` | `{"text", "confidence"}` |
//! | `POST /ui/open-dropdown` | `{"trigger"}` | 2xx |
//! | `POST /ui/scroll` | `{"region"}` | 2xx |
//! | `POST /ui/close-dropdown` | `{"trigger"}` | 2xx |
//! | `POST /ui/switch-account` | `{"account", "position"}` | 2xx |

use chrono::Utc;
use deltamon_core::{AccountId, Rect};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{ScreenError, ScreenResult};
use crate::traits::{
    BoxFuture, Extracted, Frame, Located, RegionLocator, ScreenCapture, TextExtractor, UiDriver,
};

/// Default timeout for agent requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct LocateRequest<'a> {
    template: &'a str,
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    found: bool,
    #[serde(default)]
    bounds: Option<Rect>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RegionRequest {
    region: Rect,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    frame_id: String,
}

#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    frame_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TriggerRequest {
    trigger: Rect,
}

#[derive(Debug, Serialize)]
struct SwitchAccountRequest<'a> {
    account: &'a str,
    position: usize,
}

/// Screen backend talking to a vision agent over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteScreen {
    client: Client,
    base_url: String,
}

impl RemoteScreen {
    /// Create a client for the agent at `base_url` (e.g. `http://127.0.0.1:8765`).
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> ScreenResult<Self> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| ScreenError::Http(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send<B: Serialize>(&self, path: &str, body: &B) -> ScreenResult<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ScreenError::Http(format!("{path}: request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScreenError::Backend(format!("{path}: HTTP {status}: {text}")));
        }
        Ok(response)
    }

    async fn call<B: Serialize, R: DeserializeOwned>(&self, path: &str, body: &B) -> ScreenResult<R> {
        let response = self.send(path, body).await?;
        response
            .json()
            .await
            .map_err(|e| ScreenError::Http(format!("{path}: failed to parse response: {e}")))
    }
}

impl RegionLocator for RemoteScreen {
    fn locate<'a>(&'a self, template: &'a str) -> BoxFuture<'a, ScreenResult<Option<Located>>> {
        Box::pin(async move {
            let resp: LocateResponse = self.call("/locate", &LocateRequest { template }).await?;
            debug!(template, found = resp.found, "Locate response");
            match (resp.found, resp.bounds) {
                (true, Some(bounds)) => Ok(Some(Located {
                    bounds,
                    confidence: resp.confidence.unwrap_or(1.0),
                })),
                (true, None) => Err(ScreenError::Backend(format!(
                    "locate {template}: found without bounds"
                ))),
                (false, _) => Ok(None),
            }
        })
    }
}

impl ScreenCapture for RemoteScreen {
    fn capture(&self, region: Rect) -> BoxFuture<'_, ScreenResult<Frame>> {
        Box::pin(async move {
            let resp: CaptureResponse = self.call("/capture", &RegionRequest { region }).await?;
            Ok(Frame {
                id: resp.frame_id,
                region,
                captured_at: Utc::now(),
            })
        })
    }
}

impl TextExtractor for RemoteScreen {
    fn extract<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, ScreenResult<Extracted>> {
        Box::pin(async move {
            self.call("/extract", &ExtractRequest { frame_id: &frame.id })
                .await
        })
    }
}

impl UiDriver for RemoteScreen {
    fn open_dropdown(&self, trigger: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            self.send("/ui/open-dropdown", &TriggerRequest { trigger })
                .await
                .map(|_| ())
        })
    }

    fn scroll_list(&self, list: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            self.send("/ui/scroll", &RegionRequest { region: list })
                .await
                .map(|_| ())
        })
    }

    fn close_dropdown(&self, trigger: Rect) -> BoxFuture<'_, ScreenResult<()>> {
        Box::pin(async move {
            self.send("/ui/close-dropdown", &TriggerRequest { trigger })
                .await
                .map(|_| ())
        })
    }

    fn switch_account<'a>(
        &'a self,
        account: &'a AccountId,
        position: usize,
    ) -> BoxFuture<'a, ScreenResult<()>> {
        Box::pin(async move {
            let body = SwitchAccountRequest {
                account: account.as_str(),
                position,
            };
            self.send("/ui/switch-account", &body).await.map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_agent() -> String {
        let app = Router::new()
            .route(
                "/locate",
                post(|Json(body): Json<Value>| async move {
                    if body["template"] == "delta_cell" {
                        Json(json!({
                            "found": true,
                            "bounds": {"x": 10, "y": 20, "width": 80, "height": 16},
                            "confidence": 0.93
                        }))
                    } else {
                        Json(json!({"found": false}))
                    }
                }),
            )
            .route(
                "/capture",
                post(|| async { Json(json!({"frame_id": "f-1"})) }),
            )
            .route(
                "/extract",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({"text": format!("text-of-{}", body["frame_id"].as_str().unwrap_or("")), "confidence": 0.88}))
                }),
            )
            .route(
                "/ui/switch-account",
                post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "no window") }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let base = spawn_agent().await;
        let screen = RemoteScreen::new(base, Some(Duration::from_secs(2))).unwrap();
        assert!(!screen.base_url().ends_with('/'));

        let located = screen.locate("delta_cell").await.unwrap().unwrap();
        assert_eq!(located.bounds, Rect::new(10, 20, 80, 16));
        assert!((located.confidence - 0.93).abs() < f64::EPSILON);

        assert!(screen.locate("missing").await.unwrap().is_none());

        let frame = screen.capture(located.bounds).await.unwrap();
        assert_eq!(frame.id, "f-1");

        let extracted = screen.extract(&frame).await.unwrap();
        assert_eq!(extracted.text, "text-of-f-1");
    }

    #[tokio::test]
    async fn test_remote_http_error_is_backend_error() {
        let base = spawn_agent().await;
        let screen = RemoteScreen::new(base, None).unwrap();
        let id = AccountId::new("ACC_1").unwrap();
        let err = screen.switch_account(&id, 0).await.unwrap_err();
        assert!(matches!(err, ScreenError::Backend(ref m) if m.contains("500")));
    }
}
