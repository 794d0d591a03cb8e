use super::*;
use crate::api::error::ApiError;
use crate::api::types::{Role, RoleInfo, UserProfile};
use crate::session::tests::MemorySession;
use crate::session::{Session, SessionStore};
use crate::tokens::tests::MemoryStore;
use crate::tokens::TokenStore;
use futures::channel::oneshot;
use serde_json::json;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

// =========================================================
// Shared Mock Components
// =========================================================

/// Scripted outcome for one request.
pub enum Scripted {
    Now(Result<HttpResponse, HttpError>),
    /// Response held back until the paired sender fires, so a test
    /// can keep several requests in flight at once.
    Gated(oneshot::Receiver<()>, Result<HttpResponse, HttpError>),
}

pub struct TestContext {
    /// Every request the backend saw, in order.
    log: RefCell<Vec<HttpRequest>>,
    /// Scripted responses per URL, consumed front to back.
    responses: RefCell<HashMap<String, VecDeque<Scripted>>>,
}

impl TestContext {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            log: RefCell::new(Vec::new()),
            responses: RefCell::new(HashMap::new()),
        })
    }

    pub fn mock_response(&self, url: &str, status: u16, body: serde_json::Value) {
        self.push(
            url,
            Scripted::Now(Ok(HttpResponse {
                status,
                body: body.to_string(),
            })),
        );
    }

    pub fn mock_failure(&self, url: &str, err: HttpError) {
        self.push(url, Scripted::Now(Err(err)));
    }

    /// Scripts a response that is withheld until the returned sender fires.
    pub fn mock_gated_response(
        &self,
        url: &str,
        status: u16,
        body: serde_json::Value,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            url,
            Scripted::Gated(
                rx,
                Ok(HttpResponse {
                    status,
                    body: body.to_string(),
                }),
            ),
        );
        tx
    }

    fn push(&self, url: &str, scripted: Scripted) {
        self.responses
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.log
            .borrow()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

pub struct MockHttpBackend {
    pub ctx: Rc<TestContext>,
}

#[async_trait::async_trait(?Send)]
impl HttpBackend for MockHttpBackend {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.ctx.log.borrow_mut().push(req.clone());
        let scripted = self
            .ctx
            .responses
            .borrow_mut()
            .get_mut(&req.url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| panic!("no scripted response for {}", req.url));
        match scripted {
            Scripted::Now(result) => result,
            Scripted::Gated(rx, result) => {
                let _ = rx.await;
                result
            }
        }
    }
}

// =========================================================
// Helpers
// =========================================================

const BASE: &str = "/api";

type TestTransport = AuthorizedTransport<MockHttpBackend, MemorySession, MemoryStore>;

fn setup() -> (
    Rc<TestContext>,
    MemorySession,
    TokenStore<MemoryStore>,
    TestTransport,
) {
    let ctx = TestContext::new();
    let session = MemorySession::new();
    let tokens = TokenStore::new(MemoryStore::new());
    let transport = AuthorizedTransport::new(
        BASE,
        MockHttpBackend {
            ctx: Rc::clone(&ctx),
        },
        session.clone(),
        tokens.clone(),
    );
    (ctx, session, tokens, transport)
}

fn coach_profile() -> UserProfile {
    UserProfile {
        id: "u-1".to_string(),
        full_name: "Dana Brooks".to_string(),
        email: "dana@example.com".to_string(),
        avatar_url: None,
        role: RoleInfo { role: Role::Coach },
    }
}

fn ok_envelope() -> serde_json::Value {
    json!({ "data": [], "message": null })
}

fn refresh_envelope(token: &str) -> serde_json::Value {
    json!({ "data": { "accessToken": token }, "message": null })
}

// =========================================================
// Header injection
// =========================================================

#[tokio::test]
async fn test_attaches_bearer_header_when_token_present() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-1".to_string()), None));

    let url = transport.url("/video");
    ctx.mock_response(&url, 200, ok_envelope());

    let resp = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);

    let sent = ctx.requests_to(&url);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].headers.get("Authorization").map(String::as_str),
        Some("Bearer at-1")
    );
}

#[tokio::test]
async fn test_sends_unauthenticated_when_no_token() {
    let (ctx, _session, _tokens, transport) = setup();

    let url = transport.url("/video");
    ctx.mock_response(&url, 200, ok_envelope());

    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();

    let sent = ctx.requests_to(&url);
    assert!(sent[0].headers.get("Authorization").is_none());
}

#[tokio::test]
async fn test_explicit_authorization_header_untouched() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-1".to_string()), None));

    let url = transport.url("/video");
    ctx.mock_response(&url, 200, ok_envelope());

    let req = HttpRequest::new(&url, HttpMethod::Get).with_header("Authorization", "Bearer custom");
    transport.dispatch(req).await.unwrap();

    let sent = ctx.requests_to(&url);
    assert_eq!(
        sent[0].headers.get("Authorization").map(String::as_str),
        Some("Bearer custom")
    );
}

// =========================================================
// Non-auth responses and transport failures
// =========================================================

#[tokio::test]
async fn test_non_auth_status_passes_through() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-1".to_string()), Some("rt-1".to_string())));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 500, json!({ "message": "boom" }));

    let resp = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();
    assert_eq!(resp.status, 500);
    assert!(ctx.requests_to(&refresh).is_empty());
}

#[tokio::test]
async fn test_network_error_propagates_without_refresh() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-1".to_string()), Some("rt-1".to_string())));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_failure(&url, HttpError::NetworkError("connection reset".to_string()));

    let err = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));

    // Session untouched, no refresh attempted.
    assert_eq!(session.current().access_token.as_deref(), Some("at-1"));
    assert!(ctx.requests_to(&refresh).is_empty());
}

#[tokio::test]
async fn test_timeout_on_original_request_keeps_session() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-1".to_string()), Some("rt-1".to_string())));

    let url = transport.url("/video");
    ctx.mock_failure(&url, HttpError::Timeout);

    let err = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert_eq!(session.current().refresh_token.as_deref(), Some("rt-1"));
}

// =========================================================
// Refresh and replay
// =========================================================

#[tokio::test]
async fn test_401_refreshes_and_replays_once() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));
    tokens.store_pair("at-old", "rt-123");

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "token expired" }));
    ctx.mock_response(&url, 200, ok_envelope());
    ctx.mock_response(&refresh, 200, refresh_envelope("at-456"));

    let resp = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);

    // Exactly one refresh exchange, unauthenticated, carrying the refresh token.
    let refreshes = ctx.requests_to(&refresh);
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].headers.get("Authorization").is_none());
    assert!(refreshes[0].body.as_deref().unwrap().contains("rt-123"));

    // Replay carries the rotated token.
    let sent = ctx.requests_to(&url);
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1].headers.get("Authorization").map(String::as_str),
        Some("Bearer at-456")
    );

    // Only the access token rotates, in session and store alike.
    let after = session.current();
    assert_eq!(after.access_token.as_deref(), Some("at-456"));
    assert_eq!(after.refresh_token.as_deref(), Some("rt-123"));
    assert_eq!(tokens.access_token().as_deref(), Some("at-456"));
    assert_eq!(tokens.refresh_token().as_deref(), Some("rt-123"));
}

#[tokio::test]
async fn test_refresh_preserves_authenticated_user() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::authenticated(
        "at-old".to_string(),
        Some("rt-123".to_string()),
        coach_profile(),
    ));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "token expired" }));
    ctx.mock_response(&url, 200, ok_envelope());
    ctx.mock_response(&refresh, 200, refresh_envelope("at-456"));

    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();

    let after = session.current();
    assert!(after.is_authenticated());
    assert!(after.user.is_some());
    assert_eq!(after.access_token.as_deref(), Some("at-456"));
}

#[tokio::test]
async fn test_replay_happens_at_most_once() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_response(&url, 401, json!({ "message": "still expired" }));
    ctx.mock_response(&refresh, 200, refresh_envelope("at-456"));

    // The replayed response is returned as-is, even when it is another 401.
    let resp = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();
    assert_eq!(resp.status, 401);
    assert_eq!(ctx.requests_to(&url).len(), 2);
    assert_eq!(ctx.requests_to(&refresh).len(), 1);
}

#[tokio::test]
async fn test_refresh_rejected_clears_session_and_surfaces_original_401() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));
    tokens.store_pair("at-old", "rt-123");

    let url = transport.url("/user/profile");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "token expired" }));
    ctx.mock_response(&refresh, 400, json!({ "message": "invalid refresh token" }));

    let err = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();

    // The caller sees the original 401, not a refresh-specific error.
    assert_eq!(
        err,
        ApiError::AuthExpired {
            message: "token expired".to_string()
        }
    );

    // No replay, session and store fully cleared.
    assert_eq!(ctx.requests_to(&url).len(), 1);
    assert_eq!(session.current(), Session::empty());
    assert_eq!(tokens.access_token(), None);
    assert_eq!(tokens.refresh_token(), None);
}

#[tokio::test]
async fn test_refresh_network_failure_clears_session() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));
    tokens.store_pair("at-old", "rt-123");

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_failure(&refresh, HttpError::NetworkError("connection reset".to_string()));

    let err = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired { .. }));
    assert_eq!(session.current(), Session::empty());
    assert_eq!(tokens.refresh_token(), None);
}

#[tokio::test]
async fn test_refresh_timeout_clears_session() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));
    tokens.store_pair("at-old", "rt-123");

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_failure(&refresh, HttpError::Timeout);

    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();
    assert_eq!(session.current(), Session::empty());
    assert_eq!(tokens.access_token(), None);
}

#[tokio::test]
async fn test_missing_refresh_token_rejects_without_network_call() {
    let (ctx, session, _tokens, transport) = setup();
    // Access token present, refresh token absent everywhere.
    session.replace(Session::hydrated(Some("at-old".to_string()), None));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));

    let err = transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::AuthExpired { .. }));
    assert!(ctx.requests_to(&refresh).is_empty());
    assert_eq!(session.current(), Session::empty());
}

#[tokio::test]
async fn test_refresh_token_falls_back_to_store() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(Some("at-old".to_string()), None));
    tokens.set_refresh_token("rt-store");

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_response(&url, 200, ok_envelope());
    ctx.mock_response(&refresh, 200, refresh_envelope("at-456"));

    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();

    let refreshes = ctx.requests_to(&refresh);
    assert_eq!(refreshes.len(), 1);
    assert!(refreshes[0].body.as_deref().unwrap().contains("rt-store"));
}

// =========================================================
// Single-flight
// =========================================================

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_refreshes() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));

    let videos = transport.url("/video");
    let genres = transport.url("/genre");
    let refresh = transport.url("/user/refresh-token");

    ctx.mock_response(&videos, 401, json!({ "message": "expired" }));
    ctx.mock_response(&genres, 401, json!({ "message": "expired" }));
    ctx.mock_response(&videos, 200, ok_envelope());
    ctx.mock_response(&genres, 200, ok_envelope());
    // Hold the refresh back until both requests have hit their 401.
    let release = ctx.mock_gated_response(&refresh, 200, refresh_envelope("at-456"));

    let a = transport.dispatch(HttpRequest::new(&videos, HttpMethod::Get));
    let b = transport.dispatch(HttpRequest::new(&genres, HttpMethod::Get));
    let driver = async move {
        release.send(()).unwrap();
    };

    let (ra, rb, ()) = futures::join!(a, b, driver);
    assert_eq!(ra.unwrap().status, 200);
    assert_eq!(rb.unwrap().status, 200);

    // Exactly one refresh exchange for both callers.
    assert_eq!(ctx.requests_to(&refresh).len(), 1);

    // Both replays carry the token from that single exchange.
    let sent_videos = ctx.requests_to(&videos);
    let sent_genres = ctx.requests_to(&genres);
    assert_eq!(
        sent_videos[1].headers.get("Authorization").map(String::as_str),
        Some("Bearer at-456")
    );
    assert_eq!(
        sent_genres[1].headers.get("Authorization").map(String::as_str),
        Some("Bearer at-456")
    );
}

#[tokio::test]
async fn test_single_flight_failure_fails_all_identically() {
    let (ctx, session, tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-old".to_string()),
        Some("rt-123".to_string()),
    ));
    tokens.store_pair("at-old", "rt-123");

    let videos = transport.url("/video");
    let genres = transport.url("/genre");
    let refresh = transport.url("/user/refresh-token");

    ctx.mock_response(&videos, 401, json!({ "message": "expired" }));
    ctx.mock_response(&genres, 401, json!({ "message": "expired" }));
    let release = ctx.mock_gated_response(&refresh, 400, json!({ "message": "invalid refresh token" }));

    let a = transport.dispatch(HttpRequest::new(&videos, HttpMethod::Get));
    let b = transport.dispatch(HttpRequest::new(&genres, HttpMethod::Get));
    let driver = async move {
        release.send(()).unwrap();
    };

    let (ra, rb, ()) = futures::join!(a, b, driver);
    let ea = ra.unwrap_err();
    let eb = rb.unwrap_err();
    assert_eq!(ea, eb);
    assert!(matches!(ea, ApiError::AuthExpired { .. }));

    assert_eq!(ctx.requests_to(&refresh).len(), 1);
    assert_eq!(session.current(), Session::empty());
    assert_eq!(tokens.refresh_token(), None);
}

#[tokio::test]
async fn test_sequential_refreshes_are_not_coalesced() {
    let (ctx, session, _tokens, transport) = setup();
    session.replace(Session::hydrated(
        Some("at-0".to_string()),
        Some("rt-123".to_string()),
    ));

    let url = transport.url("/video");
    let refresh = transport.url("/user/refresh-token");
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_response(&url, 200, ok_envelope());
    ctx.mock_response(&url, 401, json!({ "message": "expired" }));
    ctx.mock_response(&url, 200, ok_envelope());
    ctx.mock_response(&refresh, 200, refresh_envelope("at-1"));
    ctx.mock_response(&refresh, 200, refresh_envelope("at-2"));

    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();
    transport
        .dispatch(HttpRequest::new(&url, HttpMethod::Get))
        .await
        .unwrap();

    // The in-flight slot was released after the first exchange.
    assert_eq!(ctx.requests_to(&refresh).len(), 2);
    assert_eq!(session.current().access_token.as_deref(), Some("at-2"));
}
