//! Gmail REST implementation of the send pipeline.
//!
//! Only the draft endpoints are used: the composer autosaves a draft, and the
//! deferred send commits that draft by id. Sending a draft that was already
//! sent fails at the backend instead of producing a second message.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::domain::{DraftRef, HostSessionRef, PipelineError};
use crate::ports::{SendPipeline, SentMessage, TokenProvider};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Fixed bearer token (tests, or a token minted out of band).
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> Result<String, PipelineError> {
        if self.token.trim().is_empty() {
            return Err(PipelineError::Auth("no token configured".into()));
        }
        Ok(self.token.clone())
    }
}

/// A message to be stored as a new draft.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

/// Render `message` as an RFC 822 message with an HTML body.
pub fn build_mime_message(message: &OutgoingMessage) -> String {
    let mut out = String::new();
    for (header, addrs) in [("To", &message.to), ("Cc", &message.cc), ("Bcc", &message.bcc)] {
        if !addrs.is_empty() {
            out.push_str(&format!("{header}: {}\r\n", addrs.join(", ")));
        }
    }
    out.push_str(&format!("Subject: {}\r\n", message.subject));
    out.push_str("Content-Type: text/html; charset=UTF-8\r\n");
    out.push_str("\r\n");
    out.push_str(&message.html_body);
    out
}

/// Base64url without padding, as the `raw` field expects.
pub fn encode_raw(mime: &str) -> String {
    URL_SAFE_NO_PAD.encode(mime.as_bytes())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub payload: Option<GmailPayload>,
}

impl GmailMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GmailPayload {
    #[serde(default)]
    pub headers: Vec<GmailHeader>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailDraft {
    pub id: String,
    #[serde(default)]
    pub message: Option<GmailMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftList {
    #[serde(default)]
    drafts: Vec<GmailDraft>,
}

#[derive(Serialize)]
struct RawMessage<'a> {
    raw: &'a str,
}

#[derive(Serialize)]
struct CreateDraftBody<'a> {
    message: RawMessage<'a>,
}

#[derive(Serialize)]
struct SendDraftBody<'a> {
    id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModifyLabelsBody<'a> {
    add_label_ids: &'a [String],
    remove_label_ids: &'a [String],
}

pub struct GmailPipeline {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GmailPipeline {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(tokens, GMAIL_API_BASE)
    }

    pub fn with_base_url(tokens: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn authed(&self, request: RequestBuilder) -> Result<RequestBuilder, PipelineError> {
        let token = self.tokens.bearer_token().await?;
        Ok(request.bearer_auth(token))
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PipelineError> {
        let response = self
            .authed(request)
            .await?
            .send()
            .await
            .map_err(|e| PipelineError::Transport(e.to_string()))?;
        decode(check(response).await?).await
    }

    /// Most recently updated drafts first.
    pub async fn list_drafts(&self, max_results: u32) -> Result<Vec<GmailDraft>, PipelineError> {
        let request = self
            .client
            .get(self.url("drafts"))
            .query(&[("maxResults", max_results.to_string())]);
        let list: DraftList = self.execute(request).await?;
        Ok(list.drafts)
    }

    pub async fn get_draft(&self, draft: &DraftRef) -> Result<GmailDraft, PipelineError> {
        let request = self
            .client
            .get(self.url(&format!("drafts/{}", draft.as_str())))
            .query(&[("format", "full")]);
        self.execute(request).await
    }

    pub async fn create_draft(&self, message: &OutgoingMessage) -> Result<DraftRef, PipelineError> {
        let raw = encode_raw(&build_mime_message(message));
        let request = self.client.post(self.url("drafts")).json(&CreateDraftBody {
            message: RawMessage { raw: &raw },
        });
        let draft: GmailDraft = self.execute(request).await?;
        debug!(draft = %draft.id, "created draft");
        Ok(DraftRef::new(draft.id))
    }

    pub async fn modify_labels(
        &self,
        message_id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<GmailMessage, PipelineError> {
        let request = self
            .client
            .post(self.url(&format!("messages/{message_id}/modify")))
            .json(&ModifyLabelsBody {
                add_label_ids: add,
                remove_label_ids: remove,
            });
        self.execute(request).await
    }
}

async fn check(response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::Api {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PipelineError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| PipelineError::Transport(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| PipelineError::Decode(e.to_string()))
}

#[async_trait]
impl SendPipeline for GmailPipeline {
    async fn resolve_draft(&self, session: &HostSessionRef) -> Result<DraftRef, PipelineError> {
        if let Some(draft) = session.draft_hint() {
            return Ok(draft);
        }
        // The composer autosaves before send, so the newest draft is the one
        // behind the surface that was just activated.
        let drafts = self.list_drafts(1).await?;
        drafts
            .into_iter()
            .next()
            .map(|d| DraftRef::new(d.id))
            .ok_or_else(|| PipelineError::NoDraft(session.clone()))
    }

    async fn send_draft(&self, draft: &DraftRef) -> Result<SentMessage, PipelineError> {
        let request = self
            .client
            .post(self.url("drafts/send"))
            .json(&SendDraftBody { id: draft.as_str() });
        let message: GmailMessage = self.execute(request).await?;
        info!(draft = %draft, message = %message.id, "draft sent");
        Ok(SentMessage {
            message_id: message.id,
            thread_id: message.thread_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SendOutcome;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[derive(Debug, Clone)]
    struct Seen {
        target: String,
        authorization: Option<String>,
        body: String,
    }

    /// Canned Gmail backend on a loopback port. Each route is matched by
    /// `"METHOD /path"` prefix against the request line; anything else is 404.
    struct Backend {
        base_url: String,
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl Backend {
        async fn start(routes: Vec<(&'static str, u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = seen.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);

                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).await.unwrap();
                    let mut parts = request_line.split_whitespace();
                    let method = parts.next().unwrap_or_default().to_string();
                    let target = parts.next().unwrap_or_default().to_string();

                    let mut content_length = 0usize;
                    let mut authorization = None;
                    loop {
                        let mut line = String::new();
                        reader.read_line(&mut line).await.unwrap();
                        let line = line.trim_end();
                        if line.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            let value = value.trim();
                            if name.eq_ignore_ascii_case("content-length") {
                                content_length = value.parse().unwrap();
                            } else if name.eq_ignore_ascii_case("authorization") {
                                authorization = Some(value.to_string());
                            }
                        }
                    }
                    let mut body = vec![0u8; content_length];
                    reader.read_exact(&mut body).await.unwrap();

                    let request = format!("{method} {target}");
                    let (status, reply) = routes
                        .iter()
                        .find(|(prefix, _, _)| request.starts_with(prefix))
                        .map(|(_, status, reply)| (*status, *reply))
                        .unwrap_or((404, "not found"));
                    log.lock().unwrap().push(Seen {
                        target,
                        authorization,
                        body: String::from_utf8(body).unwrap(),
                    });

                    let response = format!(
                        "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                        reply.len()
                    );
                    let _ = write.write_all(response.as_bytes()).await;
                    let _ = write.shutdown().await;
                }
            });
            Self {
                base_url: format!("http://{addr}"),
                seen,
            }
        }

        fn pipeline(&self, token: &str) -> GmailPipeline {
            GmailPipeline::with_base_url(Arc::new(StaticTokenProvider::new(token)), &self.base_url)
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[test]
    fn mime_message_has_headers_then_blank_line() {
        let mime = build_mime_message(&OutgoingMessage {
            to: vec!["ann@example.com".into(), "bob@example.com".into()],
            bcc: vec!["audit@example.com".into()],
            subject: "Quarterly report".into(),
            html_body: "<p>hi</p>".into(),
            ..Default::default()
        });

        assert_eq!(
            mime,
            "To: ann@example.com, bob@example.com\r\n\
             Bcc: audit@example.com\r\n\
             Subject: Quarterly report\r\n\
             Content-Type: text/html; charset=UTF-8\r\n\
             \r\n\
             <p>hi</p>"
        );
    }

    #[test]
    fn raw_encoding_is_url_safe_without_padding() {
        let encoded = encode_raw("Subject: ü?>\r\n\r\n~~~");
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));

        let decoded = URL_SAFE_NO_PAD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Subject: ü?>\r\n\r\n~~~");
    }

    #[test]
    fn draft_with_full_message_decodes() {
        let json = r#"{
            "id": "r-42",
            "message": {
                "id": "m-1",
                "threadId": "t-1",
                "labelIds": ["DRAFT"],
                "payload": { "headers": [
                    { "name": "Subject", "value": "hello" },
                    { "name": "To", "value": "ann@example.com" }
                ]}
            }
        }"#;
        let draft: GmailDraft = serde_json::from_str(json).unwrap();
        let message = draft.message.unwrap();
        assert_eq!(draft.id, "r-42");
        assert_eq!(message.thread_id.as_deref(), Some("t-1"));
        assert_eq!(message.header("subject"), Some("hello"));
        assert_eq!(message.label_ids, vec!["DRAFT"]);
    }

    #[test]
    fn empty_draft_list_decodes() {
        let list: DraftList = serde_json::from_str(r#"{"resultSizeEstimate": 0}"#).unwrap();
        assert!(list.drafts.is_empty());
    }

    #[tokio::test]
    async fn known_draft_id_resolves_without_a_request() {
        let pipeline = GmailPipeline::with_base_url(
            Arc::new(StaticTokenProvider::new("")),
            "http://127.0.0.1:9",
        );
        let session = HostSessionRef::for_draft(&DraftRef::new("r-7"));
        assert_eq!(
            pipeline.resolve_draft(&session).await.unwrap(),
            DraftRef::new("r-7")
        );
    }

    #[tokio::test]
    async fn send_draft_posts_the_draft_id_with_bearer_auth() {
        let backend = Backend::start(vec![(
            "POST /drafts/send",
            200,
            r#"{"id":"m-9","threadId":"t-3","labelIds":["SENT"]}"#,
        )])
        .await;

        let sent = backend
            .pipeline("tok")
            .send_draft(&DraftRef::new("r-1"))
            .await
            .unwrap();

        assert_eq!(sent.message_id, "m-9");
        assert_eq!(sent.thread_id.as_deref(), Some("t-3"));
        let seen = backend.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].target, "/drafts/send");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok"));
        let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, serde_json::json!({ "id": "r-1" }));
    }

    #[tokio::test]
    async fn unknown_session_resolves_to_the_newest_draft() {
        let backend = Backend::start(vec![(
            "GET /drafts?",
            200,
            r#"{"drafts":[{"id":"r-new","message":{"id":"m-1"}},{"id":"r-old"}]}"#,
        )])
        .await;

        let draft = backend
            .pipeline("tok")
            .resolve_draft(&HostSessionRef::new("compose-1"))
            .await
            .unwrap();

        assert_eq!(draft, DraftRef::new("r-new"));
        assert_eq!(backend.seen()[0].target, "/drafts?maxResults=1");
    }

    #[tokio::test]
    async fn no_drafts_means_no_draft_for_the_session() {
        let backend = Backend::start(vec![("GET /drafts?", 200, r#"{"resultSizeEstimate":0}"#)]).await;

        let err = backend
            .pipeline("tok")
            .resolve_draft(&HostSessionRef::new("compose-1"))
            .await
            .unwrap_err();

        assert_eq!(err, PipelineError::NoDraft(HostSessionRef::new("compose-1")));
    }

    #[tokio::test]
    async fn backend_error_keeps_status_and_body() {
        let backend = Backend::start(vec![("POST /drafts/send", 503, "backend unavailable")]).await;

        let err = backend
            .pipeline("tok")
            .send_draft(&DraftRef::new("r-1"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PipelineError::Api {
                status: 503,
                body: "backend unavailable".into()
            }
        );
        assert_eq!(
            SendOutcome::from(err),
            SendOutcome::failed("backend returned 503: backend unavailable")
        );
    }

    #[tokio::test]
    async fn already_sent_draft_is_a_client_error() {
        let backend = Backend::start(vec![(
            "POST /drafts/send",
            404,
            r#"{"error":{"code":404,"message":"Requested entity was not found."}}"#,
        )])
        .await;

        let err = backend
            .pipeline("tok")
            .send_draft(&DraftRef::new("r-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Api { status: 404, .. }));
    }

    #[tokio::test]
    async fn malformed_success_body_is_a_decode_error() {
        let backend = Backend::start(vec![("POST /drafts/send", 200, "<html>ok</html>")]).await;

        let err = backend
            .pipeline("tok")
            .send_draft(&DraftRef::new("r-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[tokio::test]
    async fn get_draft_asks_for_the_full_format() {
        let backend = Backend::start(vec![(
            "GET /drafts/r-1",
            200,
            r#"{"id":"r-1","message":{"id":"m-1","payload":{"headers":[{"name":"Subject","value":"hi"}]}}}"#,
        )])
        .await;

        let draft = backend.pipeline("tok").get_draft(&DraftRef::new("r-1")).await.unwrap();

        assert_eq!(draft.message.unwrap().header("Subject"), Some("hi"));
        assert_eq!(backend.seen()[0].target, "/drafts/r-1?format=full");
    }

    #[tokio::test]
    async fn list_drafts_passes_the_page_size() {
        let backend = Backend::start(vec![(
            "GET /drafts?",
            200,
            r#"{"drafts":[{"id":"r-1"},{"id":"r-2"}]}"#,
        )])
        .await;

        let drafts = backend.pipeline("tok").list_drafts(5).await.unwrap();

        let ids: Vec<_> = drafts.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-2"]);
        assert_eq!(backend.seen()[0].target, "/drafts?maxResults=5");
    }

    #[tokio::test]
    async fn create_draft_uploads_the_encoded_message() {
        let backend = Backend::start(vec![("POST /drafts", 200, r#"{"id":"r-5"}"#)]).await;
        let message = OutgoingMessage {
            to: vec!["ann@example.com".into()],
            subject: "hello".into(),
            html_body: "<p>hi</p>".into(),
            ..Default::default()
        };

        let draft = backend.pipeline("tok").create_draft(&message).await.unwrap();

        assert_eq!(draft, DraftRef::new("r-5"));
        let seen = backend.seen();
        assert_eq!(seen[0].target, "/drafts");
        let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        let raw = body["message"]["raw"].as_str().unwrap();
        let mime = String::from_utf8(URL_SAFE_NO_PAD.decode(raw).unwrap()).unwrap();
        assert_eq!(mime, build_mime_message(&message));
    }

    #[tokio::test]
    async fn modify_labels_sends_camel_case_label_lists() {
        let backend = Backend::start(vec![(
            "POST /messages/m-1/modify",
            200,
            r#"{"id":"m-1","labelIds":["STARRED"]}"#,
        )])
        .await;

        let message = backend
            .pipeline("tok")
            .modify_labels("m-1", &["STARRED".to_string()], &["UNREAD".to_string()])
            .await
            .unwrap();

        assert_eq!(message.label_ids, vec!["STARRED"]);
        let body: serde_json::Value = serde_json::from_str(&backend.seen()[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "addLabelIds": ["STARRED"], "removeLabelIds": ["UNREAD"] })
        );
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        let backend = Backend::start(vec![]).await;

        let err = backend
            .pipeline("")
            .send_draft(&DraftRef::new("r-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Auth(_)));
        assert!(backend.seen().is_empty());
    }

    #[tokio::test]
    async fn empty_token_is_an_auth_error() {
        let err = StaticTokenProvider::new("  ").bearer_token().await.unwrap_err();
        assert!(matches!(err, PipelineError::Auth(_)));
    }
}
