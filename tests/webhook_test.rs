//! Webhook sink contract, exercised against a local mock server.

use page_relay::notify::{FailureReport, JobReport, Notifier, SuccessReport, WebhookNotifier};
use page_relay::text::chunk;
use page_relay::{DeliveryError, ExtractionResult};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn notifier(server: &MockServer) -> WebhookNotifier {
    let url = url::Url::parse(&format!("{}/api/webhooks/1/token", server.uri())).unwrap();
    WebhookNotifier::new(reqwest::Client::new(), url)
        .with_username(Some("page-relay".into()))
        .with_message_delay(Duration::from_millis(5))
}

fn success(text: &str, screenshot: Option<Vec<u8>>) -> JobReport {
    JobReport::Success(SuccessReport {
        job_id: "job-42".into(),
        result: ExtractionResult {
            url: "https://example.com/long-article".into(),
            final_url: None,
            page_title: "Long Article".into(),
            visible_text: text.into(),
            text_source: Some("inner_text".into()),
            truncated: false,
            original_chars: text.chars().count(),
            screenshot,
            resource_count: 17,
            scroll_count: 3,
            elapsed_millis: 4200,
            warnings: vec![],
        },
        chunks: chunk(text, 1900),
    })
}

async fn bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).to_string())
        .collect()
}

#[tokio::test]
async fn test_summary_then_chunks_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(4)
        .mount(&server)
        .await;

    let text = "Paragraph of article text that keeps going. ".repeat(115);
    let outcome = assert_ok!(notifier(&server).deliver(&success(&text, None)).await);
    assert_eq!(outcome.messages_sent, 4);
    assert_eq!(outcome.attachment_bytes, 0);

    let bodies = bodies(&server).await;
    let first: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert!(first["content"].as_str().unwrap().contains("Long Article"));
    assert_eq!(first["username"], "page-relay");
    assert_eq!(first["allowed_mentions"]["parse"], serde_json::json!([]));
    for (i, body) in bodies[1..].iter().enumerate() {
        let v: serde_json::Value = serde_json::from_str(body).unwrap();
        assert!(v["content"].as_str().unwrap().starts_with(&format!("`{}/3`", i + 1)));
    }
}

#[tokio::test]
async fn test_messages_are_spaced_by_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;

    let delay = Duration::from_millis(150);
    let n = notifier(&server).with_message_delay(delay);
    let text = format!("{}\n\n{}", "a".repeat(1500), "b".repeat(1500));

    let started = std::time::Instant::now();
    let outcome = assert_ok!(n.deliver(&success(&text, None)).await);
    assert_eq!(outcome.messages_sent, 3);
    // Two follow-ups, each preceded by a full delay.
    assert!(started.elapsed() >= delay * 2, "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_screenshot_rides_on_first_message_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header_regex("content-type", "^application/json"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let png = vec![0x89, b'P', b'N', b'G', 0, 1, 2, 3];
    let outcome = assert_ok!(notifier(&server).deliver(&success("short page", Some(png.clone()))).await);
    assert_eq!(outcome.messages_sent, 2);
    assert_eq!(outcome.attachment_bytes, png.len());

    let first = &bodies(&server).await[0];
    assert!(first.contains("name=\"payload_json\""));
    assert!(first.contains("filename=\"screenshot.png\""));
}

#[tokio::test]
async fn test_rejection_stops_delivery() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("You are being rate limited."))
        .expect(1)
        .mount(&server)
        .await;

    let err = assert_err!(notifier(&server).deliver(&success(&"word ".repeat(1000), None)).await);
    match err {
        DeliveryError::Rejected { message, status, body } => {
            assert_eq!(message, 0);
            assert_eq!(status, 429);
            assert!(body.contains("rate limited"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_sink_is_transport_error() {
    // Reserve a port, then release it so nothing is listening there.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = url::Url::parse(&format!("http://127.0.0.1:{port}/api/webhooks/1/token")).unwrap();
    let n = WebhookNotifier::new(reqwest::Client::new(), url);

    let err = assert_err!(n.deliver(&success("text", None)).await);
    assert!(matches!(err, DeliveryError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_failure_report_is_single_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let report = JobReport::Failure(FailureReport {
        job_id: "job-7".into(),
        url: "https://slow.example.com/".into(),
        elapsed_millis: 90_013,
        error_kind: "navigation",
        error: "navigation to https://slow.example.com/ failed: timed out after 90000ms".into(),
    });
    let outcome = assert_ok!(notifier(&server).deliver(&report).await);
    assert_eq!(outcome.messages_sent, 1);

    let body: serde_json::Value = serde_json::from_str(&bodies(&server).await[0]).unwrap();
    let content = body["content"].as_str().unwrap();
    assert!(content.contains("https://slow.example.com/"));
    assert!(content.contains("90013ms"));
}
