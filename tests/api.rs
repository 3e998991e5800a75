use face_relay::{
    config::{BufferConfig, Config, DetectorConfig, LogLevel, ServerConfig},
    AnnotatedImage, Detection, Detector, DetectorError, HttpServer, Region,
};
use reqwest::{header, multipart, StatusCode};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::broadcast;

/// Payloads of the form `faces:<n>:<tag>` yield `n` canned regions and an
/// "annotated" image equal to the payload; `corrupt` fails to decode.
struct ScriptedDetector;

const REGIONS: [Region; 2] = [
    Region {
        x: 10,
        y: 10,
        w: 40,
        h: 40,
    },
    Region {
        x: 100,
        y: 20,
        w: 50,
        h: 50,
    },
];

impl Detector for ScriptedDetector {
    fn detect(&self, image_data: &[u8]) -> Result<Detection, DetectorError> {
        let text = std::str::from_utf8(image_data).map_err(|_| DetectorError::Undecodable)?;
        let count: usize = text
            .strip_prefix("faces:")
            .and_then(|rest| rest.split(':').next())
            .and_then(|n| n.parse().ok())
            .ok_or(DetectorError::Undecodable)?;

        Ok(Detection {
            image: AnnotatedImage::new(image_data.to_vec()),
            regions: REGIONS.iter().copied().cycle().take(count).collect(),
        })
    }
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            max_upload_bytes: 64 * 1024,
        },
        log_level: LogLevel::Debug,
        detector: DetectorConfig {
            cascade_file: "unused.xml".into(),
            cascade_dir: PathBuf::from("."),
            num_instances: 1,
            max_concurrent: 4,
            scale_factor: 1.15,
            min_neighbors: 5,
            min_size: 30,
        },
        buffer: BufferConfig { capacity: 3 },
    }
}

struct TestApp {
    addr: SocketAddr,
    client: reqwest::Client,
    _shutdown_tx: broadcast::Sender<()>,
}

impl TestApp {
    async fn spawn() -> Self {
        let server = HttpServer::new(Arc::new(ScriptedDetector), &test_config())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        server.run(shutdown_rx).await.unwrap();

        Self {
            addr,
            client: reqwest::Client::new(),
            _shutdown_tx: shutdown_tx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn upload(&self, field: &str, payload: &[u8]) -> reqwest::Response {
        let part = multipart::Part::bytes(payload.to_vec())
            .file_name("frame.jpg")
            .mime_str("image/jpeg")
            .unwrap();
        let form = multipart::Form::new().part(field.to_string(), part);
        self.client
            .post(self.url("/detectface"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    async fn detect(&self, payload: &str) -> reqwest::Response {
        self.upload("img", payload.as_bytes()).await
    }

    async fn fetch(&self) -> reqwest::Response {
        self.client.get(self.url("/")).send().await.unwrap()
    }
}

#[tokio::test]
async fn test_detect_two_faces_then_fetch_annotated_image() {
    let app = TestApp::spawn().await;

    let response = app.detect("faces:2:a").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        response.text().await.unwrap(),
        r#"[{"x":10,"y":10,"w":40,"h":40},{"x":100,"y":20,"w":50,"h":50}]"#
    );

    let response = app.fetch().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(&response.bytes().await.unwrap()[..], b"faces:2:a");
}

#[tokio::test]
async fn test_no_faces_returns_empty_list_and_buffers_nothing() {
    let app = TestApp::spawn().await;

    let response = app.detect("faces:0:a").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "[]");

    let response = app.fetch().await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("No image with a recognized object"));
}

#[tokio::test]
async fn test_fetch_returns_frames_in_insertion_order() {
    let app = TestApp::spawn().await;

    for tag in ["a", "b", "c"] {
        let response = app.detect(&format!("faces:1:{}", tag)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    for tag in ["a", "b", "c"] {
        let response = app.fetch().await;
        assert_eq!(response.status(), StatusCode::OK);
        let expected = format!("faces:1:{}", tag);
        assert_eq!(&response.bytes().await.unwrap()[..], expected.as_bytes());
    }
    assert_eq!(
        app.fetch().await.status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_full_buffer_drops_new_frames() {
    let app = TestApp::spawn().await;

    for tag in ["a", "b", "c", "d", "e"] {
        let response = app.detect(&format!("faces:2:{}", tag)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>().await.unwrap()[1]["x"], 100);
    }

    let mut fetched = Vec::new();
    loop {
        let response = app.fetch().await;
        if response.status() != StatusCode::OK {
            break;
        }
        fetched.push(response.bytes().await.unwrap().to_vec());
    }

    assert_eq!(
        fetched,
        vec![
            b"faces:2:a".to_vec(),
            b"faces:2:b".to_vec(),
            b"faces:2:c".to_vec()
        ]
    );
}

#[tokio::test]
async fn test_concurrent_detections_fill_buffer_exactly() {
    let app = Arc::new(TestApp::spawn().await);

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let app = app.clone();
            tokio::spawn(async move { app.detect(&format!("faces:1:{}", i)).await.status() })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let mut fetched = Vec::new();
    loop {
        let response = app.fetch().await;
        if response.status() != StatusCode::OK {
            break;
        }
        fetched.push(response.bytes().await.unwrap().to_vec());
    }

    assert_eq!(fetched.len(), 3);
    fetched.sort();
    fetched.dedup();
    assert_eq!(fetched.len(), 3);
    for frame in fetched {
        assert!(frame.starts_with(b"faces:1:"));
    }
}

#[tokio::test]
async fn test_missing_image_field_is_client_error() {
    let app = TestApp::spawn().await;

    let response = app.upload("picture", b"faces:1:a").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .client
        .post(app.url("/detectface"))
        .body("not a form")
        .send()
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_empty_image_field_is_client_error() {
    let app = TestApp::spawn().await;

    let response = app.upload("img", b"").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let app = TestApp::spawn().await;

    let payload = vec![b'x'; 128 * 1024];
    let response = app.upload("img", &payload).await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_undecodable_image_is_server_error() {
    let app = TestApp::spawn().await;

    let response = app.detect("corrupt").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().contains("decode"));

    assert_eq!(
        app.fetch().await.status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = TestApp::spawn().await;

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.json::<serde_json::Value>().await.unwrap()["status"],
        "Available"
    );

    app.detect("faces:1:a").await;
    let response = app.client.get(app.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().contains("frames_buffered"));
}
