mod common;

use common::{MockTransport, Reply};
use sessionnet::{
    progress_channel, Client, MultipartOptions, NetError, RequestOptions, SessionConfig,
    UploadOptions, UploadProgress,
};
use std::io::Write;
use tempfile::NamedTempFile;

const BASE: &str = "https://files.example.com";

fn client(mock: &MockTransport) -> Client {
    let client = Client::builder().transport_factory(mock.factory()).build();
    client.create_session(BASE, SessionConfig::default()).unwrap();
    client
}

fn temp_file(len: usize) -> (NamedTempFile, Vec<u8>) {
    let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&content).unwrap();
    file.flush().unwrap();
    (file, content)
}

#[tokio::test]
async fn test_resumed_upload_sends_remaining_bytes() {
    let mock = MockTransport::new();
    mock.on("/upload", Reply::json(201, r#"{"id":"f1"}"#));
    let client = client(&mock);
    let (file, content) = temp_file(300 * 1024);
    let skip = 100 * 1024;

    let (tx, mut rx) = progress_channel();
    let options = UploadOptions::new().skip_bytes(skip as u64).progress(tx);
    let response = client
        .upload(BASE, "/upload", file.path(), "up-1", options)
        .await
        .unwrap();
    assert_eq!(response.code, 201);

    let sent = &mock.requests()[0];
    assert_eq!(sent.method, http::Method::POST);
    assert_eq!(sent.header("content-type"), Some("application/octet-stream"));
    assert_eq!(sent.body, content[skip..]);

    let mut events: Vec<UploadProgress> = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.task_id == "up-1"));
    let percents: Vec<u8> = events.iter().map(|e| e.percent).collect();
    assert_eq!(percents.first(), Some(&33));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
}

#[tokio::test]
async fn test_skip_equal_to_length_sends_empty_body() {
    let mock = MockTransport::new();
    mock.on("/upload", Reply::status(200));
    let client = client(&mock);
    let (file, _) = temp_file(1024);

    let (tx, mut rx) = progress_channel();
    let options = UploadOptions::new().skip_bytes(1024).progress(tx);
    client
        .upload(BASE, "/upload", file.path(), "up-full", options)
        .await
        .unwrap();

    assert!(mock.requests()[0].body.is_empty());
    assert_eq!(rx.recv().await.map(|e| e.percent), Some(100));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_skip_past_end_is_rejected() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let (file, _) = temp_file(10);

    let err = client
        .upload(BASE, "/upload", file.path(), "up-bad", UploadOptions::new().skip_bytes(11))
        .await
        .unwrap_err();

    assert_eq!(err, NetError::InvalidUploadOffset { skip: 11, len: 10 });
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_missing_file_is_unreadable() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let dir = tempfile::tempdir().unwrap();

    let err = client
        .upload(
            BASE,
            "/upload",
            dir.path().join("missing.bin"),
            "up-missing",
            UploadOptions::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FileUnreadable");

    let err = client
        .upload(BASE, "/upload", dir.path(), "up-dir", UploadOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FileUnreadable");
}

#[tokio::test]
async fn test_unknown_session_rejected() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let (file, _) = temp_file(10);

    let err = client
        .upload(
            "https://nowhere.example.com",
            "/upload",
            file.path(),
            "up-x",
            UploadOptions::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_cancel_upload() {
    let mock = MockTransport::new();
    mock.on("/upload", Reply::Hang);
    let client = client(&mock);
    let (file, _) = temp_file(4096);

    let pending = {
        let client = client.clone();
        let path = file.path().to_path_buf();
        tokio::spawn(async move {
            client
                .upload(BASE, "/upload", path, "up-cancel", UploadOptions::new())
                .await
        })
    };
    mock.wait_for_requests(1).await;

    client.cancel_request("up-cancel").unwrap();
    assert_eq!(pending.await.unwrap().unwrap_err(), NetError::Cancelled);
    assert_eq!(
        client.cancel_request("up-cancel"),
        Err(NetError::UnknownTask("up-cancel".into()))
    );
}

#[tokio::test]
async fn test_multipart_upload_framing() {
    let mock = MockTransport::new();
    mock.on("/files", Reply::status(201));
    let client = client(&mock);
    let (file, content) = temp_file(2048);

    let mut multipart = MultipartOptions::default();
    multipart.file_name = Some("report \"q3\".pdf".to_string());
    multipart.content_type = "application/pdf".to_string();
    multipart.fields.insert("channel_id".to_string(), "c1".to_string());
    let options = UploadOptions::new().skip_bytes(48).multipart(multipart);

    client
        .upload(BASE, "/files", file.path(), "up-form", options)
        .await
        .unwrap();

    let sent = &mock.requests()[0];
    let content_type = sent.header("content-type").unwrap();
    let boundary = content_type
        .strip_prefix("multipart/form-data; boundary=")
        .unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"channel_id\"\r\n\r\nc1\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"files\"; \
             filename=\"report \\\"q3\\\".pdf\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    expected.extend_from_slice(&content[48..]);
    expected.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    assert_eq!(sent.body, expected);
}

#[tokio::test]
async fn test_multipart_content_type_with_line_break_rejected() {
    let mock = MockTransport::new();
    let client = client(&mock);
    let (file, _) = temp_file(16);

    let mut multipart = MultipartOptions::default();
    multipart.content_type = "image/png\r\nX-Injected: 1".to_string();
    let err = client
        .upload(
            BASE,
            "/files",
            file.path(),
            "up-crlf",
            UploadOptions::new().multipart(multipart),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "InvalidHeader");
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_upload_keeps_caller_content_type_and_headers() {
    let mock = MockTransport::new();
    mock.on("/raw", Reply::status(200));
    let client = client(&mock);
    let (file, _) = temp_file(16);

    let request = RequestOptions::new()
        .header("Content-Type", "image/png")
        .unwrap()
        .header("X-Upload", "1")
        .unwrap();
    let options = UploadOptions::new().request(request);
    client
        .upload(BASE, "raw", file.path(), "up-png", options)
        .await
        .unwrap();

    let sent = &mock.requests()[0];
    assert_eq!(sent.header("content-type"), Some("image/png"));
    assert_eq!(sent.header("x-upload"), Some("1"));
}

#[tokio::test]
async fn test_upload_options_from_json() {
    let options = UploadOptions::from_json(serde_json::json!({
        "skipBytes": 12,
        "headers": { "X-Client": "mobile" },
        "multipart": { "fieldName": "file", "fields": { "a": "b" } }
    }))
    .unwrap();

    assert_eq!(options.skip_bytes, 12);
    assert_eq!(options.request.headers.get("x-client"), Some("mobile"));
    let multipart = options.multipart.unwrap();
    assert_eq!(multipart.field_name, "file");
    assert_eq!(multipart.content_type, "application/octet-stream");
    assert_eq!(multipart.fields.get("a").map(String::as_str), Some("b"));
}
