use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, ClientBuilder, StatusCode};
use url::Url;

use crate::api::MessageGateway;
use crate::api::models::{MessageRecord, MessagesEnvelope, SendErrorBody, SendRequest};
use crate::app::AppConfig;
use crate::error::{InboxError, Result};
use crate::utils::{base_url, endpoint};

pub struct ApiClient {
    pub http: HttpClient,
    pub base: Url,
    fetch_retries: u32,
    retry_base_delay: Duration,
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_builder(config, HttpClient::builder())
    }

    fn with_builder(config: &AppConfig, builder: ClientBuilder) -> Result<Self> {
        let http = builder
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base: base_url(&config.base_url)?,
            fetch_retries: config.fetch_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// Fetch every known message from `GET /test-messages`.
    ///
    /// Transport errors are retried with exponential backoff. An error status
    /// or an unreadable body is not an error: it just means there is nothing
    /// to show.
    pub async fn fetch_messages(&self) -> Result<Vec<MessageRecord>> {
        let url = endpoint(&self.base, "test-messages")?;
        let mut attempt: u32 = 0;
        loop {
            match self.http.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        log::warn!("GET {url} returned HTTP {status}, treating as no data");
                        return Ok(Vec::new());
                    }
                    let body = resp.text().await?;
                    let records = parse_messages_body(&body);
                    log::debug!("fetched {} message records", records.len());
                    return Ok(records);
                }
                Err(e) if attempt < self.fetch_retries => {
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    log::warn!(
                        "GET {url} failed ({e}), retry {attempt}/{} in {delay:?}",
                        self.fetch_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send one text message through `POST /send-message`.
    pub async fn send_message(&self, phone_number: &str, message: &str) -> Result<()> {
        let url = endpoint(&self.base, "send-message")?;
        let payload = SendRequest {
            phone_number: phone_number.to_string(),
            message: message.to_string(),
        };
        let resp = self.http.post(url).json(&payload).send().await?;
        let status = resp.status();
        if status.is_success() {
            log::info!("message to {phone_number} accepted");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let reason = describe_send_error(status, &body);
        log::warn!("message to {phone_number} rejected: {reason}");
        Err(InboxError::Gateway(reason))
    }
}

#[async_trait]
impl MessageGateway for ApiClient {
    async fn fetch_messages(&self) -> Result<Vec<MessageRecord>> {
        ApiClient::fetch_messages(self).await
    }

    async fn send_message(&self, phone_number: &str, message: &str) -> Result<()> {
        ApiClient::send_message(self, phone_number, message).await
    }
}

/// Pull the records out of a `/test-messages` body, skipping anything that
/// does not decode.
pub fn parse_messages_body(body: &str) -> Vec<MessageRecord> {
    let envelope: MessagesEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            log::warn!("messages response is not valid JSON: {e}");
            return Vec::new();
        }
    };
    let Some(raw) = envelope.messages_data.and_then(|data| data.messages) else {
        log::warn!("messages response has no messages_data.messages");
        return Vec::new();
    };
    raw.into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<MessageRecord>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("skipping undecodable message #{i}: {e}");
                None
            }
        })
        .collect()
}

fn describe_send_error(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<SendErrorBody>(body)
        .ok()
        .and_then(SendErrorBody::description)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answers one connection per entry, in order. `None` hangs up without
    /// answering. Returns the base URL and the raw requests received.
    async fn serve(responses: Vec<Option<String>>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                seen.lock().unwrap().push(request);
                if let Some(response) = response {
                    socket.write_all(response.as_bytes()).await.unwrap();
                    let _ = socket.shutdown().await;
                }
            }
        });
        (format!("http://{addr}"), requests)
    }

    // Local test servers must not be routed through a proxy from the environment.
    fn local_client(config: AppConfig) -> ApiClient {
        ApiClient::with_builder(&config, HttpClient::builder().no_proxy()).unwrap()
    }

    fn client_for(base_url: String, fetch_retries: u32) -> ApiClient {
        local_client(AppConfig {
            base_url,
            fetch_retries,
            retry_base_delay_ms: 1,
            ..AppConfig::default()
        })
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_empty_snapshot() {
        let (base, requests) = serve(vec![Some(http_response(
            "502 Bad Gateway",
            "<html>Bad Gateway</html>",
        ))])
        .await;
        let client = client_for(base, 3);

        let records = client.fetch_messages().await.unwrap();
        assert!(records.is_empty());
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("GET /test-messages HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_fetch_decodes_records() {
        let body = r#"{"messages_data":{"messages":[
            {"from":"905551112233","type":"text","text":{"body":"selam"},"timestamp":"1700000000"}
        ]}}"#;
        let (base, _) = serve(vec![Some(http_response("200 OK", body))]).await;
        let client = client_for(base, 0);

        let records = client.fetch_messages().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].counterpart(), Some("905551112233"));
        assert_eq!(records[0].body(), Some("selam"));
    }

    #[tokio::test]
    async fn test_fetch_retries_after_dropped_connection() {
        let body = r#"{"messages_data":{"messages":[]}}"#;
        let (base, requests) = serve(vec![None, Some(http_response("200 OK", body))]).await;
        let client = client_for(base, 2);

        assert!(client.fetch_messages().await.unwrap().is_empty());
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_refused_connection_fails_after_retries() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let client = client_for(format!("http://{addr}"), 2);

        let err = client.fetch_messages().await.unwrap_err();
        assert!(matches!(err, InboxError::Http(ref e) if e.is_connect()), "{err:?}");
    }

    #[tokio::test]
    async fn test_request_timeout_is_applied() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            // Keep the connection open without ever answering.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let client = local_client(AppConfig {
            base_url: format!("http://{addr}"),
            request_timeout_secs: 1,
            fetch_retries: 0,
            ..AppConfig::default()
        });

        let err = client.fetch_messages().await.unwrap_err();
        assert!(matches!(err, InboxError::Http(ref e) if e.is_timeout()), "{err:?}");
    }

    #[tokio::test]
    async fn test_send_posts_phone_number_and_message() {
        let (base, requests) = serve(vec![Some(http_response(
            "200 OK",
            r#"{"status":"success"}"#,
        ))])
        .await;
        let client = client_for(base, 0);

        client.send_message("905551112233", "merhaba").await.unwrap();
        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("POST /send-message HTTP/1.1"));
        let (_, body) = requests[0].split_once("\r\n\r\n").unwrap();
        let body: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "phone_number": "905551112233", "message": "merhaba" })
        );
    }

    #[tokio::test]
    async fn test_send_error_status_uses_message_field() {
        let (base, _) = serve(vec![Some(http_response(
            "400 Bad Request",
            r#"{"status":"error","message":"Mesaj gönderilemedi: invalid number"}"#,
        ))])
        .await;
        let client = client_for(base, 3);

        let err = client.send_message("905551112233", "merhaba").await.unwrap_err();
        assert!(
            matches!(err, InboxError::Gateway(ref reason) if reason == "Mesaj gönderilemedi: invalid number"),
            "{err:?}"
        );
    }

    #[test]
    fn test_parse_messages_body() {
        let body = r#"{
            "channels_status": 200,
            "messages_status": 200,
            "messages_data": {
                "messages": [
                    { "from": "905551112233", "type": "text", "text": { "body": "hi" }, "timestamp": "1700000000" },
                    { "to": "905551112233", "type": "image", "timestamp": 1700000100 },
                    "not a record",
                    { "from": 42, "type": "text" }
                ]
            }
        }"#;
        let records = parse_messages_body(body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].body(), Some("hi"));
        assert_eq!(records[1].kind.as_deref(), Some("image"));
    }

    #[test]
    fn test_parse_messages_body_missing_levels() {
        assert!(parse_messages_body(r#"{ "messages_data": null }"#).is_empty());
        assert!(parse_messages_body(r#"{ "messages_data": {} }"#).is_empty());
        assert!(parse_messages_body(r#"{ "error": "Hata: timeout" }"#).is_empty());
        assert!(parse_messages_body("<html>502</html>").is_empty());
        assert!(parse_messages_body("[]").is_empty());
    }

    #[test]
    fn test_describe_send_error() {
        assert_eq!(
            describe_send_error(
                StatusCode::BAD_REQUEST,
                r#"{"status":"error","message":"Mesaj gönderilemedi: invalid"}"#
            ),
            "Mesaj gönderilemedi: invalid"
        );
        assert_eq!(
            describe_send_error(StatusCode::BAD_REQUEST, r#"{"error":"phone required"}"#),
            "phone required"
        );
        assert_eq!(
            describe_send_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(
            describe_send_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500 Internal Server Error"
        );
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let config = AppConfig {
            base_url: "http://".into(),
            ..AppConfig::default()
        };
        assert!(matches!(ApiClient::new(&config), Err(InboxError::Config(_))));
    }
}
