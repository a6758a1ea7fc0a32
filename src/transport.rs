use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::{Error, Result},
    query::QueryParams,
};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// The backend as seen by the dispatchers: JSON in, JSON envelope out.
///
/// Implementations return the decoded envelope of a successful response and
/// map transport failures to [`Error::Network`] and error responses to
/// [`Error::Http`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value>;

    async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    /// Creates a transport rooted at `base`. Endpoint paths are resolved
    /// below it, so a base of `http://host/review/` keeps its `/review`
    /// prefix.
    pub fn new(mut base: Url, timeout: Option<Duration>) -> Result<Self> {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let mut builder = Client::builder().user_agent(APP_USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Network(format!("invalid endpoint path {path:?}: {e}")))
    }

    async fn send(request: RequestBuilder) -> Result<Value> {
        let resp = request.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if !status.is_success() {
            return Err(Error::Http {
                status: Some(status.as_u16()),
                message: body.as_ref().and_then(error_message),
            });
        }
        let body = body.ok_or_else(|| {
            Error::MalformedResponse(format!("response body of status {status} is not JSON"))
        })?;
        if body.get("success") == Some(&Value::Bool(false)) {
            return Err(Error::Http {
                status: Some(status.as_u16()),
                message: error_message(&body),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        Self::send(self.client.post(url).json(body)).await
    }

    async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let url = self.url(path)?;
        debug!(%url, ?params, "GET");
        Self::send(self.client.get(url).query(params)).await
    }
}

fn error_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Takes the `data` array out of a response envelope.
pub(crate) fn data_array(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(Error::MalformedResponse(format!(
                "`data` is not an array: {other}"
            ))),
            None => Err(Error::MalformedResponse(
                "response has no `data` field".to_string(),
            )),
        },
        other => Err(Error::MalformedResponse(format!(
            "response is not an object: {other}"
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        net::SocketAddr,
        sync::Mutex,
    };

    use serde_json::json;
    use warp::{http::StatusCode, Filter};

    use super::*;

    /// A call the fake transport received.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Post(String, Value),
        Get(String, Vec<(String, String)>),
    }

    /// In-memory backend: canned responses per path, consumed in order.
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        responses: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl FakeTransport {
        pub(crate) fn respond(self, path: &str, response: Result<Value>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(response);
            self
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn next(&self, path: &str) -> Result<Value> {
            self.responses
                .lock()
                .unwrap()
                .get_mut(path)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| {
                    Err(Error::Http {
                        status: Some(404),
                        message: None,
                    })
                })
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Post(path.to_string(), body.clone()));
            self.next(path)
        }

        async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value> {
            let params = params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            self.calls
                .lock()
                .unwrap()
                .push(Call::Get(path.to_string(), params));
            self.next(path)
        }
    }

    /// Serves a small mock of the review backend on an ephemeral port.
    fn spawn_backend() -> SocketAddr {
        let search = warp::post()
            .and(warp::path!("api" / "search"))
            .and(warp::body::json())
            .map(|body: Value| {
                warp::reply::json(&json!({
                    "success": true,
                    "data": [{"text": "echo", "limit": body["limit"], "query": body["query"]}]
                }))
            });
        let bot_rate = warp::get()
            .and(warp::path!("api" / "dashboard" / "bot_rate"))
            .and(warp::query::<HashMap<String, String>>())
            .map(|params: HashMap<String, String>| {
                warp::reply::json(&json!({"success": true, "data": [], "params": params}))
            });
        let broken = warp::path!("api" / "broken").map(|| {
            warp::reply::with_status(
                warp::reply::json(&json!({"success": false, "error": "database error: timeout"})),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        });
        let soft_failure = warp::path!("api" / "soft_failure").map(|| {
            warp::reply::json(&json!({"success": false, "error": "no index loaded"}))
        });
        let bare_500 = warp::path!("api" / "bare").map(|| {
            warp::reply::with_status("internal error", StatusCode::INTERNAL_SERVER_ERROR)
        });
        let not_json = warp::path!("api" / "html").map(|| "<html></html>");

        let routes = search
            .or(bot_rate)
            .or(broken)
            .or(soft_failure)
            .or(bare_500)
            .or(not_json);
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    fn transport(addr: SocketAddr) -> HttpTransport {
        let base = Url::parse(&format!("http://{addr}")).unwrap();
        HttpTransport::new(base, Some(Duration::from_secs(5))).unwrap()
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let http = transport(spawn_backend());
        let body = http
            .post_json("/api/search", &json!({"query": "lipstick", "limit": 3}))
            .await
            .unwrap();
        assert_eq!(body["data"][0]["query"], "lipstick");
        assert_eq!(body["data"][0]["limit"], 3);
    }

    #[tokio::test]
    async fn get_sends_query_params() {
        let http = transport(spawn_backend());
        let filter = crate::query::FilterState {
            start_date: chrono::NaiveDate::from_ymd_opt(2022, 9, 1),
            sentiment: Some(crate::query::Sentiment::Positive),
            ..Default::default()
        };
        let params = crate::query::build_query_params(&filter);
        let body = http
            .get_json("/api/dashboard/bot_rate", &params)
            .await
            .unwrap();
        assert_eq!(
            body["params"],
            json!({"start_date": "2022-09-01", "sentiment": "positive"})
        );
    }

    #[tokio::test]
    async fn error_status_carries_backend_message() {
        let http = transport(spawn_backend());
        let err = http
            .get_json("/api/broken", &QueryParams::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Http {
                status: Some(500),
                message: Some("database error: timeout".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn success_false_is_an_error() {
        let http = transport(spawn_backend());
        let err = http
            .get_json("/api/soft_failure", &QueryParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.user_message("fallback"), "no index loaded");
    }

    #[tokio::test]
    async fn error_status_without_envelope() {
        let http = transport(spawn_backend());
        let err = http
            .get_json("/api/bare", &QueryParams::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Http {
                status: Some(500),
                message: None,
            }
        );
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let http = transport(spawn_backend());
        let err = http
            .get_json("/api/html", &QueryParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        // Bind and drop a listener to get a port nothing listens on.
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let http = transport(addr);
        let err = http
            .post_json("/api/search", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[test]
    fn base_path_is_kept() {
        let base = Url::parse("http://example.com/review").unwrap();
        let http = HttpTransport::new(base, None).unwrap();
        assert_eq!(
            http.url("/api/search").unwrap().as_str(),
            "http://example.com/review/api/search"
        );
    }

    #[test]
    fn data_array_requires_data() {
        assert_eq!(
            data_array(json!({"data": [1, 2]})).unwrap(),
            vec![json!(1), json!(2)]
        );
        assert!(matches!(
            data_array(json!({"success": true})),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            data_array(json!({"data": {"a": 1}})),
            Err(Error::MalformedResponse(_))
        ));
        assert!(matches!(
            data_array(json!([1])),
            Err(Error::MalformedResponse(_))
        ));
    }
}
