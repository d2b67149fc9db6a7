//! HTTP implementation of the service traits via `reqwest`.

use crate::{ClientError, RecognitionService, StatsService, TrainingService};
use chrono::NaiveDate;
use reqwest::multipart::{Form, Part};
use rollcall_core::date::ISO_DATE;
use rollcall_core::{AttendanceStats, RecognitionResult, TrainingJobStatus};
use serde::de::DeserializeOwned;
use std::time::Duration;

const RECOGNIZE_PATH: &str = "/recognize_face";
const TRAIN_PATH: &str = "/train_model";
const TRAIN_STATUS_PATH: &str = "/train_status";
const STATS_PATH: &str = "/attendance_stats";

/// Longest error body echoed back in [`ClientError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Client for one attendance server.
#[derive(Clone, Debug)]
pub struct HttpClient {
    base: String,
    http: reqwest::Client,
}

impl HttpClient {
    /// Build a client for `base_url` (e.g. "http://127.0.0.1:5000") with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::BaseUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: base.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.http.get(self.url(path)).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(status_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }
}

fn status_error(status: u16, body: &[u8]) -> ClientError {
    let mut text = String::from_utf8_lossy(body).into_owned();
    if text.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    ClientError::Status { status, body: text }
}

impl RecognitionService for HttpClient {
    async fn recognize(
        &self,
        image: Vec<u8>,
        date: NaiveDate,
    ) -> Result<RecognitionResult, ClientError> {
        let bytes = image.len();
        let part = Part::bytes(image)
            .file_name("snap.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .part("image", part)
            .text("attendance_date", date.format(ISO_DATE).to_string());

        let response = self
            .http
            .post(self.url(RECOGNIZE_PATH))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        tracing::debug!(status = status.as_u16(), bytes, "recognize: response received");

        // The server reports declined frames with a JSON body on 4xx/5xx too.
        match serde_json::from_slice::<RecognitionResult>(&body) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => Err(status_error(status.as_u16(), &body)),
            Err(e) => Err(e.into()),
        }
    }
}

impl TrainingService for HttpClient {
    async fn start_training(&self) -> Result<u16, ClientError> {
        let response = self.http.get(self.url(TRAIN_PATH)).send().await?;
        let status = response.status().as_u16();
        tracing::info!(status, "training trigger answered");
        Ok(status)
    }

    async fn training_status(&self) -> Result<TrainingJobStatus, ClientError> {
        self.get_json(TRAIN_STATUS_PATH).await
    }
}

impl StatsService for HttpClient {
    async fn attendance_stats(&self) -> Result<AttendanceStats, ClientError> {
        self.get_json(STATS_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one canned response; the task yields the raw request.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            request
        });
        (format!("http://{addr}"), handle)
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = sock.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let head = text[..head_end].to_ascii_lowercase();
            let body_len = buf.len() - (head_end + 4);
            if head.contains("transfer-encoding: chunked") {
                if text.ends_with("0\r\n\r\n") {
                    break;
                }
                continue;
            }
            let expected = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if body_len >= expected {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client(base: &str) -> HttpClient {
        HttpClient::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_recognize_sends_multipart_form() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"recognized":true,"student_id":12,"name":"Ana","confidence":0.93}"#,
        )
        .await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let result = client(&base)
            .recognize(vec![0xFF, 0xD8, 0xFF, 0xD9], date)
            .await
            .unwrap();
        assert_eq!(result, RecognitionResult::recognized("12", "Ana", 0.93));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /recognize_face"));
        assert!(request.contains("name=\"image\"; filename=\"snap.jpg\""));
        assert!(request.contains("image/jpeg"));
        assert!(request.contains("name=\"attendance_date\"\r\n\r\n2025-03-14"));
    }

    #[tokio::test]
    async fn test_recognize_reads_declined_body_on_error_status() {
        let (base, _server) =
            serve_once("400 BAD REQUEST", r#"{"recognized":false,"error":"no image"}"#).await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let result = client(&base).recognize(vec![1, 2, 3], date).await.unwrap();
        assert!(!result.recognized);
        assert_eq!(result.error.as_deref(), Some("no image"));
    }

    #[tokio::test]
    async fn test_recognize_non_json_error() {
        let (base, _server) = serve_once("502 Bad Gateway", "upstream down").await;
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let err = client(&base).recognize(vec![1], date).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_start_training_reports_status() {
        let (base, server) = serve_once("202 Accepted", r#"{"status":"started"}"#).await;
        assert_eq!(client(&base).start_training().await.unwrap(), 202);
        assert!(server.await.unwrap().starts_with("GET /train_model"));
    }

    #[tokio::test]
    async fn test_training_status() {
        let (base, _server) = serve_once(
            "200 OK",
            r#"{"running":true,"progress":55,"message":"Training epoch 3"}"#,
        )
        .await;
        let status = client(&base).training_status().await.unwrap();
        assert_eq!(status, TrainingJobStatus::new(true, 55, "Training epoch 3"));
    }

    #[tokio::test]
    async fn test_attendance_stats() {
        let (base, _server) =
            serve_once("200 OK", r#"{"dates":["2025-03-13","2025-03-14"],"counts":[4,7]}"#).await;
        let stats = client(&base).attendance_stats().await.unwrap();
        assert_eq!(stats.counts, vec![4, 7]);
        assert_eq!(stats.dates.len(), 2);
    }

    #[tokio::test]
    async fn test_stats_error_status() {
        let (base, _server) = serve_once("500 Internal Server Error", "boom").await;
        let err = client(&base).attendance_stats().await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, ref body } if body == "boom"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(&format!("http://{addr}"))
            .training_status()
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn test_base_url_validation() {
        assert!(matches!(
            HttpClient::new("localhost:5000", Duration::from_secs(1)),
            Err(ClientError::BaseUrl(_))
        ));
        let c = HttpClient::new("http://host:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(c.url(TRAIN_PATH), "http://host:5000/train_model");
    }
}
