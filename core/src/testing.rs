//! In-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::http::{BodySource, HttpRequest, HttpResponse, ResponseBody};
use crate::transport::Transport;

/// Canned outcome of one transport call.
pub(crate) struct Reply {
    status: u16,
    body: Option<Bytes>,
    failing_body: bool,
    discarded: Arc<AtomicBool>,
    error: Option<String>,
    delay: Option<Duration>,
}

impl Reply {
    pub(crate) fn status(status: u16) -> Self {
        Self {
            status,
            body: None,
            failing_body: false,
            discarded: Arc::new(AtomicBool::new(false)),
            error: None,
            delay: None,
        }
    }

    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self {
            body: Some(Bytes::copy_from_slice(body.as_bytes())),
            ..Self::status(status)
        }
    }

    pub(crate) fn transport_error(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Self::status(0)
        }
    }

    /// Body whose read and discard both fail.
    pub(crate) fn with_failing_body(mut self) -> Self {
        self.failing_body = true;
        self.body.get_or_insert_with(Bytes::new);
        self
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Flag set once the body is discarded.
    pub(crate) fn discard_flag(&self) -> Arc<AtomicBool> {
        self.discarded.clone()
    }
}

struct TrackedBody {
    bytes: Bytes,
    failing: bool,
    discarded: Arc<AtomicBool>,
}

#[async_trait]
impl BodySource for TrackedBody {
    async fn read(self: Box<Self>) -> Result<Bytes, TransportError> {
        if self.failing {
            return Err(TransportError::new("body stream broken"));
        }
        Ok(self.bytes)
    }

    async fn discard(self: Box<Self>) -> Result<(), TransportError> {
        self.discarded.store(true, Ordering::SeqCst);
        if self.failing {
            return Err(TransportError::new("body stream broken"));
        }
        Ok(())
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

/// Transport answering from a queue of replies, falling back to a routing
/// handler when the queue is empty. Every request is recorded.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    handler: Option<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_handler(handler: impl Fn(&HttpRequest) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Some(Box::new(handler)),
            ..Self::default()
        })
    }

    pub(crate) fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Number of recorded requests whose path ends with `suffix`.
    pub(crate) fn count_path(&self, suffix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.uri.path().ends_with(suffix))
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let queued = self.replies.lock().pop_front();
        let reply = match queued {
            Some(reply) => reply,
            None => match &self.handler {
                Some(handler) => handler(&request),
                None => return Err(TransportError::new(format!("no scripted reply for {}", request.uri))),
            },
        };
        self.requests.lock().push(request);

        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = reply.error {
            return Err(TransportError::new(message));
        }

        let mut response = HttpResponse::new(reply.status);
        if let Some(bytes) = reply.body {
            response = response.with_body(ResponseBody::new(TrackedBody {
                bytes,
                failing: reply.failing_body,
                discarded: reply.discarded,
            }));
        }
        Ok(response)
    }
}

/// Scripted session/login/notes service used by the authentication tests.
pub(crate) mod fake_service {
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::auth::AuthenticationOperation;
    use crate::client::ServiceClient;
    use crate::error::{ClientError, Result};
    use crate::http::{HttpMethod, ResponseMeta};
    use crate::operation::{json, Operation, Requirement};
    use crate::renewal::AutoRenewalPolicy;
    use crate::status::{AuthenticableStatus, StatusInitOperation};

    #[derive(Debug, Clone, Default, PartialEq)]
    pub(crate) struct Session {
        pub(crate) id: String,
        pub(crate) token: Option<String>,
    }

    impl AuthenticableStatus for Session {
        fn is_authenticated(&self) -> bool {
            self.token.is_some()
        }

        fn reset_authentication(&mut self) {
            self.token = None;
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub(crate) struct Login {
        pub(crate) user: String,
        pub(crate) password: String,
    }

    impl Login {
        pub(crate) fn new(password: &str) -> Self {
            Self {
                user: "ada".to_string(),
                password: password.to_string(),
            }
        }
    }

    /// Server-side state of the fake service.
    pub(crate) struct Backend {
        pub(crate) password: String,
        pub(crate) tokens: HashSet<String>,
        pub(crate) issued: usize,
        /// Reject every token on the notes endpoint.
        pub(crate) always_expire: bool,
        pub(crate) login_delay: Option<Duration>,
    }

    pub(crate) fn backend() -> Arc<Mutex<Backend>> {
        Arc::new(Mutex::new(Backend {
            password: "secret".to_string(),
            tokens: HashSet::new(),
            issued: 0,
            always_expire: false,
            login_delay: None,
        }))
    }

    pub(crate) fn transport(backend: Arc<Mutex<Backend>>) -> Arc<ScriptedTransport> {
        ScriptedTransport::with_handler(move |request| {
            let mut state = backend.lock();
            match (request.method, request.uri.path()) {
                (HttpMethod::Post, "/api/sessions") => Reply::json(201, r#"{"session":"s-1"}"#),
                (HttpMethod::Post, "/api/sessions/s-1/login") => {
                    let login: Login = match request.body.as_deref().map(serde_json::from_slice::<Login>) {
                        Some(Ok(login)) => login,
                        _ => return Reply::status(400),
                    };
                    if login.password != state.password {
                        return Reply::status(401);
                    }
                    state.issued += 1;
                    let token = format!("t-{}", state.issued);
                    state.tokens.insert(token.clone());
                    let reply = Reply::json(200, &format!(r#"{{"token":"{token}"}}"#));
                    match state.login_delay {
                        Some(delay) => reply.delayed(delay),
                        None => reply,
                    }
                }
                (HttpMethod::Get, "/api/notes") => {
                    let token = request
                        .header_value("authorization")
                        .and_then(|v| v.strip_prefix("Bearer "))
                        .unwrap_or_default();
                    if state.always_expire || !state.tokens.contains(token) {
                        return Reply::json(401, r#"{"error":"invalid token"}"#);
                    }
                    Reply::json(200, r#"["first note"]"#)
                }
                _ => Reply::status(404),
            }
        })
    }

    pub(crate) struct OpenSession;

    impl Operation<Session> for OpenSession {
        type Params = ();
        type Entity = serde_json::Value;
        type Output = Session;

        const REQUIREMENT: Requirement = Requirement::Independent;

        fn method(&self) -> HttpMethod {
            HttpMethod::Post
        }

        fn uri(&self, _params: &(), _status: Option<&Session>) -> Result<String> {
            Ok("sessions".to_string())
        }

        fn parse(&self, body: Bytes) -> Result<serde_json::Value> {
            json::parse(&body)
        }

        fn build_result(&self, entity: Option<serde_json::Value>, _params: &(), _meta: &ResponseMeta) -> Result<Session> {
            let id = entity
                .as_ref()
                .and_then(|v| v["session"].as_str())
                .ok_or_else(|| ClientError::Deserialization("missing session".to_string()))?;
            Ok(Session {
                id: id.to_string(),
                token: None,
            })
        }
    }

    pub(crate) struct SessionInit;

    #[async_trait]
    impl StatusInitOperation<Session> for SessionInit {
        async fn initialize(&self, client: &ServiceClient<Session>) -> Result<Session> {
            client.execute(&OpenSession, &()).await
        }
    }

    pub(crate) struct LoginOp;

    impl Operation<Session> for LoginOp {
        type Params = Login;
        type Entity = serde_json::Value;
        type Output = String;

        const REQUIREMENT: Requirement = Requirement::Status;

        fn method(&self) -> HttpMethod {
            HttpMethod::Post
        }

        fn uri(&self, _params: &Login, status: Option<&Session>) -> Result<String> {
            let session = status.ok_or(ClientError::AuthenticationRequired)?;
            Ok(format!("sessions/{}/login", session.id))
        }

        fn prepare(&self, request: &mut crate::http::HttpRequest, params: &Login, _status: Option<&Session>) -> Result<()> {
            request.json_body(params)?;
            Ok(())
        }

        fn translate_status(&self, meta: &ResponseMeta, _params: &Login) -> Result<String> {
            match meta.status {
                401 => Err(ClientError::CredentialsInvalid),
                _ => Err(crate::operation::status_error(meta, Self::REQUIREMENT)),
            }
        }

        fn parse(&self, body: Bytes) -> Result<serde_json::Value> {
            json::parse(&body)
        }

        fn build_result(&self, entity: Option<serde_json::Value>, _params: &Login, _meta: &ResponseMeta) -> Result<String> {
            entity
                .as_ref()
                .and_then(|v| v["token"].as_str())
                .map(str::to_string)
                .ok_or_else(|| ClientError::Deserialization("missing token".to_string()))
        }
    }

    /// Authentication operation counting its invocations.
    #[derive(Default)]
    pub(crate) struct PasswordAuth {
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) passwords: Arc<Mutex<Vec<String>>>,
        pub(crate) policy: Option<Arc<dyn AutoRenewalPolicy<Session>>>,
    }

    #[async_trait]
    impl AuthenticationOperation<Session, Login> for PasswordAuth {
        async fn authenticate(&self, client: &ServiceClient<Session>, credentials: &Login, status: &mut Session) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.passwords.lock().push(credentials.password.clone());
            let token = client.execute_with_status(&LoginOp, credentials, status).await?;
            status.token = Some(token);
            Ok(())
        }

        fn auto_renewal_policy(&self) -> Option<Arc<dyn AutoRenewalPolicy<Session>>> {
            self.policy.clone()
        }
    }

    pub(crate) struct ListNotes;

    impl Operation<Session> for ListNotes {
        type Params = ();
        type Entity = Vec<String>;
        type Output = Vec<String>;

        const REQUIREMENT: Requirement = Requirement::Authenticated;

        fn method(&self) -> HttpMethod {
            HttpMethod::Get
        }

        fn uri(&self, _params: &(), _status: Option<&Session>) -> Result<String> {
            Ok("notes".to_string())
        }

        fn prepare(&self, request: &mut crate::http::HttpRequest, _params: &(), status: Option<&Session>) -> Result<()> {
            let token = status
                .and_then(|s| s.token.as_deref())
                .ok_or(ClientError::AuthenticationRequired)?;
            request.bearer_auth(token);
            Ok(())
        }

        fn parse(&self, body: Bytes) -> Result<Vec<String>> {
            json::parse(&body)
        }

        fn build_result(&self, entity: Option<Vec<String>>, _params: &(), _meta: &ResponseMeta) -> Result<Vec<String>> {
            Ok(entity.unwrap_or_default())
        }
    }
}
