//! Rundeck REST API client.
//!
//! Authenticates either with an API token header or with a form login whose
//! session cookie is kept in the client's cookie store. A rejected session is
//! forgotten so the next call logs in again.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ExecutionFetcher, FailureEvent, FetchError, RunningExecution};
use crate::config::RundeckConfig;

const AUTH_TOKEN_HEADER: &str = "X-Rundeck-Auth-Token";

enum Credentials {
    Token(String),
    Session { login: String, password: String },
}

/// HTTP client for one Rundeck server.
pub struct RundeckClient {
    http: Client,
    base_url: Url,
    api_version: u32,
    credentials: Credentials,
    session_open: Mutex<bool>,
}

impl RundeckClient {
    pub fn new(config: &RundeckConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(config.url.trim()).map_err(|e| FetchError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidUrl {
                url: config.url.clone(),
                reason: "not a base url".to_string(),
            });
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_sec.max(1)))
            .cookie_store(true)
            .build()?;

        let credentials = match config.api_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Credentials::Token(token.to_string()),
            _ => Credentials::Session {
                login: config.login.clone(),
                password: config.password.clone(),
            },
        };

        Ok(Self {
            http,
            base_url,
            api_version: config.api_version,
            credentials,
            session_open: Mutex::new(false),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "not a base url".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Open a form-login session if none is active. No-op with token auth.
    async fn ensure_session(&self) -> Result<(), FetchError> {
        let Credentials::Session { login, password } = &self.credentials else {
            return Ok(());
        };

        let mut open = self.session_open.lock().await;
        if *open {
            return Ok(());
        }

        let url = self.endpoint(&["j_security_check"])?;
        debug!(url = %url, user = %login, "opening rundeck session");
        let resp = self
            .http
            .post(url)
            .form(&[("j_username", login.as_str()), ("j_password", password.as_str())])
            .send()
            .await?;

        // Rundeck answers a failed login with a redirect to the login or error page.
        let landed = resp.url().path().to_string();
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || landed.contains("/user/error")
            || landed.contains("/user/login")
        {
            warn!(user = %login, status = status.as_u16(), "rundeck login rejected");
            return Err(FetchError::Auth { status: status.as_u16() });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: landed,
            });
        }

        info!(user = %login, "rundeck session opened");
        *open = true;
        Ok(())
    }

    async fn forget_session(&self) {
        *self.session_open.lock().await = false;
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header(reqwest::header::ACCEPT, "application/json");
        match &self.credentials {
            Credentials::Token(token) => req.header(AUTH_TOKEN_HEADER, token),
            Credentials::Session { .. } => req,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, FetchError> {
        self.ensure_session().await?;
        let resp = self.authorize(req).send().await?;
        let resp = self.check_status(resp).await?;

        let body = resp.bytes().await?;
        match serde_json::from_slice::<T>(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                // An expired session is served the HTML login page.
                self.forget_session().await;
                Err(FetchError::Decode(e.to_string()))
            }
        }
    }

    async fn check_status(&self, resp: Response) -> Result<Response, FetchError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.forget_session().await;
            return Err(FetchError::Auth { status: status.as_u16() });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait::async_trait]
impl ExecutionFetcher for RundeckClient {
    async fn get_history(
        &self,
        project: &str,
        event_filter: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<FailureEvent>, FetchError> {
        let version = self.api_version.to_string();
        let url = self.endpoint(&api_path(&version, project, &["history"]))?;
        let req = self.http.get(url).query(&[
            ("statFilter", event_filter.to_string()),
            ("max", limit.to_string()),
            ("offset", offset.to_string()),
        ]);

        let history: HistoryResponse = self.get_json(req).await?;
        let events = history
            .events
            .into_iter()
            .map(HistoryEvent::into_failure_event)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(project, count = events.len(), "fetched failure history");
        Ok(events)
    }

    async fn get_running_executions(&self, project: &str) -> Result<Vec<RunningExecution>, FetchError> {
        let version = self.api_version.to_string();
        let url = self.endpoint(&api_path(&version, project, &["executions", "running"]))?;
        let req = self.http.get(url);

        let running: ExecutionsResponse = self.get_json(req).await?;
        let executions = running
            .executions
            .into_iter()
            .map(ExecutionItem::into_running_execution)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(project, count = executions.len(), "fetched running executions");
        Ok(executions)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    events: Vec<HistoryEvent>,
}

#[derive(Debug, Deserialize)]
struct HistoryEvent {
    #[serde(default)]
    title: String,
    /// Start in epoch milliseconds.
    starttime: Option<i64>,
    #[serde(rename = "date-started")]
    date_started: Option<DateTime<Utc>>,
    execution: ExecutionRef,
}

impl HistoryEvent {
    fn into_failure_event(self) -> Result<FailureEvent, FetchError> {
        let execution_id = self.execution.id.as_i64()?;
        let started_at = self
            .date_started
            .or_else(|| self.starttime.and_then(from_millis))
            .ok_or_else(|| FetchError::Decode(format!("history event {execution_id} has no start date")))?;
        Ok(FailureEvent {
            execution_id,
            started_at,
            title: self.title,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExecutionRef {
    id: WireId,
}

#[derive(Debug, Deserialize)]
struct ExecutionsResponse {
    #[serde(default)]
    executions: Vec<ExecutionItem>,
}

#[derive(Debug, Deserialize)]
struct ExecutionItem {
    id: WireId,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "date-started")]
    date_started: DateStarted,
    #[serde(default)]
    job: Option<JobRef>,
}

impl ExecutionItem {
    fn into_running_execution(self) -> Result<RunningExecution, FetchError> {
        let id = self.id.as_i64()?;
        let started_at = self
            .date_started
            .date
            .or_else(|| self.date_started.unixtime.and_then(from_millis))
            .ok_or_else(|| FetchError::Decode(format!("execution {id} has no start date")))?;
        let description = match self.description {
            Some(d) if !d.trim().is_empty() => d,
            _ => self.job.map(|j| j.name).unwrap_or_default(),
        };
        Ok(RunningExecution {
            id,
            started_at,
            description,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DateStarted {
    unixtime: Option<i64>,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct JobRef {
    #[serde(default)]
    name: String,
}

/// Older API versions serialize ids as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn as_i64(&self) -> Result<i64, FetchError> {
        match self {
            WireId::Number(n) => Ok(*n),
            WireId::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| FetchError::Decode(format!("invalid execution id '{s}'"))),
        }
    }
}

fn api_path<'a>(version: &'a str, project: &'a str, tail: &[&'a str]) -> Vec<&'a str> {
    let mut segments = vec!["api", version, "project", project];
    segments.extend_from_slice(tail);
    segments
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Redirect};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn token_config(url: &str) -> RundeckConfig {
        RundeckConfig {
            url: url.to_string(),
            api_token: Some("secret-token".to_string()),
            project: "Ops".to_string(),
            ..RundeckConfig::default()
        }
    }

    fn token_ok(headers: &HeaderMap) -> bool {
        headers
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "secret-token")
            .unwrap_or(false)
    }

    async fn history(
        Path((_v, project)): Path<(String, String)>,
        Query(q): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        if !token_ok(&headers) {
            return (AxumStatus::FORBIDDEN, Json(json!({"error": true}))).into_response();
        }
        assert_eq!(project, "Ops");
        assert_eq!(q.get("statFilter").map(String::as_str), Some("fail"));
        assert_eq!(q.get("max").map(String::as_str), Some("2"));
        assert_eq!(q.get("offset").map(String::as_str), Some("0"));
        Json(json!({
            "paging": {"count": 2},
            "events": [
                {"title": "backup", "status": "failed", "date-started": "2024-03-01T10:00:00Z",
                 "execution": {"id": 42}},
                {"title": "cleanup", "status": "failed", "starttime": 1709287200000i64,
                 "execution": {"id": "41"}}
            ]
        }))
        .into_response()
    }

    async fn running(headers: HeaderMap) -> impl IntoResponse {
        if !token_ok(&headers) {
            return (AxumStatus::FORBIDDEN, Json(json!({"error": true}))).into_response();
        }
        Json(json!({
            "executions": [
                {"id": 7, "description": "nightly import", "status": "running",
                 "date-started": {"unixtime": 1709287200000i64, "date": "2024-03-01T10:00:00Z"},
                 "job": {"name": "import"}},
                {"id": 8, "description": "", "status": "running",
                 "date-started": {"unixtime": 1709290800000i64},
                 "job": {"name": "export"}}
            ]
        }))
        .into_response()
    }

    fn token_router() -> Router {
        Router::new()
            .route("/api/{v}/project/{project}/history", get(history))
            .route("/api/{v}/project/{project}/executions/running", get(running))
    }

    #[tokio::test]
    async fn test_history_parses_events_in_server_order() {
        let url = spawn_server(token_router()).await;
        let client = RundeckClient::new(&token_config(&url)).unwrap();

        let events = client.get_history("Ops", "fail", 2, 0).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].execution_id, 42);
        assert_eq!(events[0].title, "backup");
        assert_eq!(events[1].execution_id, 41);
        assert_eq!(events[1].started_at, Utc.timestamp_millis_opt(1709287200000).unwrap());
    }

    #[tokio::test]
    async fn test_running_falls_back_to_job_name() {
        let url = spawn_server(token_router()).await;
        let client = RundeckClient::new(&token_config(&url)).unwrap();

        let running = client.get_running_executions("Ops").await.unwrap();

        assert_eq!(running.len(), 2);
        assert_eq!(running[0].id, 7);
        assert_eq!(running[0].description, "nightly import");
        assert_eq!(running[1].description, "export");
        assert_eq!(running[1].started_at, Utc.timestamp_millis_opt(1709290800000).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_token_is_auth_error() {
        let url = spawn_server(token_router()).await;
        let mut cfg = token_config(&url);
        cfg.api_token = Some("nope".to_string());
        let client = RundeckClient::new(&cfg).unwrap();

        let err = client.get_running_executions("Ops").await.unwrap_err();
        assert!(matches!(err, FetchError::Auth { status: 403 }));
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let app = Router::new().route(
            "/api/{v}/project/{project}/executions/running",
            get(|| async { AxumStatus::INTERNAL_SERVER_ERROR }),
        );
        let url = spawn_server(app).await;
        let client = RundeckClient::new(&token_config(&url)).unwrap();

        let err = client.get_running_executions("Ops").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RundeckClient::new(&token_config(&format!("http://{}", addr))).unwrap();
        let err = client.get_running_executions("Ops").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_html_body_is_decode_error() {
        let app = Router::new().route(
            "/api/{v}/project/{project}/executions/running",
            get(|| async { "<html>login</html>" }),
        );
        let url = spawn_server(app).await;
        let client = RundeckClient::new(&token_config(&url)).unwrap();

        let err = client.get_running_executions("Ops").await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_session_login_sets_cookie() {
        let app = Router::new()
            .route(
                "/j_security_check",
                post(|body: String| async move {
                    assert!(body.contains("j_username=ops"));
                    assert!(body.contains("j_password=pw"));
                    ([("set-cookie", "JSESSIONID=abc; Path=/")], "ok")
                }),
            )
            .route(
                "/api/{v}/project/{project}/executions/running",
                get(|headers: HeaderMap| async move {
                    let cookie = headers
                        .get("cookie")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if cookie.contains("JSESSIONID=abc") {
                        Json(json!({"executions": []})).into_response()
                    } else {
                        AxumStatus::FORBIDDEN.into_response()
                    }
                }),
            );
        let url = spawn_server(app).await;
        let cfg = RundeckConfig {
            url,
            login: "ops".to_string(),
            password: "pw".to_string(),
            api_token: None,
            ..RundeckConfig::default()
        };
        let client = RundeckClient::new(&cfg).unwrap();

        let running = client.get_running_executions("Ops").await.unwrap();
        assert!(running.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let app = Router::new()
            .route("/j_security_check", post(|| async { Redirect::to("/user/error") }))
            .route("/user/error", get(|| async { "bad credentials" }));
        let url = spawn_server(app).await;
        let cfg = RundeckConfig {
            url,
            api_token: None,
            ..RundeckConfig::default()
        };
        let client = RundeckClient::new(&cfg).unwrap();

        let err = client.get_history("Ops", "fail", 5, 0).await.unwrap_err();
        assert!(matches!(err, FetchError::Auth { .. }));
    }

    #[test]
    fn test_invalid_base_url() {
        let cfg = RundeckConfig {
            url: "not a url".to_string(),
            ..RundeckConfig::default()
        };
        assert!(matches!(RundeckClient::new(&cfg), Err(FetchError::InvalidUrl { .. })));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let cfg = RundeckConfig {
            url: "http://host:4440/rundeck/".to_string(),
            ..RundeckConfig::default()
        };
        let client = RundeckClient::new(&cfg).unwrap();
        let url = client.endpoint(&["api", "14", "project", "My Project", "history"]).unwrap();
        assert_eq!(url.as_str(), "http://host:4440/rundeck/api/14/project/My%20Project/history");
    }

    #[test]
    fn test_wire_id_variants() {
        let v: Value = json!({"id": "17"});
        let r: ExecutionRef = serde_json::from_value(v).unwrap();
        assert_eq!(r.id.as_i64().unwrap(), 17);
        let bad = WireId::Text("x".to_string());
        assert!(bad.as_i64().is_err());
    }
}
