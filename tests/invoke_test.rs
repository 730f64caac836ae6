//! Invocation driver wired the way the binary wires it: configuration file,
//! filesystem-backed storage and an SQS batch event.

use bytes::Bytes;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use serde_json::json;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use thumbnailer::config::Config;
use thumbnailer::observability::Metrics;
use thumbnailer::pipeline::Pipeline;
use thumbnailer::storage::{ObjectStorage, StorageClient};
use thumbnailer::worker::{SqsBatchEvent, handle_batch};

fn write_config(dir: &TempDir) -> Config {
    let path = dir.path().join("thumbnailer.toml");
    let content = format!(
        r#"
[storage]
provider = "local"
root = "{}"

[thumbnail]
bucket = "thumbs"
prefix = "small/"
max_width = 128
max_height = 128
"#,
        dir.path().join("objects").display()
    );
    fs::write(&path, content).unwrap();
    Config::load_from_path(path).unwrap()
}

fn jpeg(width: u32, height: u32) -> Bytes {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([90, 90, 90])))
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(buffer.into_inner())
}

fn sqs_record(message_id: &str, body: String) -> serde_json::Value {
    json!({
        "messageId": message_id,
        "receiptHandle": "AQEB",
        "body": body,
        "attributes": {"ApproximateReceiveCount": "1"},
        "messageAttributes": {},
        "eventSource": "aws:sqs",
        "eventSourceARN": "arn:aws:sqs:us-east-1:123456789012:uploads",
        "awsRegion": "us-east-1"
    })
}

#[tokio::test]
async fn test_invoke_with_local_storage() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);
    let storage = StorageClient::from_config(&config.storage);

    storage
        .upload("raw", "2024/07/holiday photo.jpg", jpeg(512, 256), "image/jpeg")
        .await
        .unwrap();

    let pipeline = Pipeline::from_config(
        &config.thumbnail,
        Arc::new(storage.clone()),
        Arc::new(Metrics::new()),
    )
    .unwrap();

    // Keys arrive URL-encoded in S3 notifications
    let s3_event = json!({"Records": [
        {"s3": {"bucket": {"name": "raw"}, "object": {"key": "2024/07/holiday+photo.jpg"}}}
    ]});
    let relayed = json!({"Type": "Notification", "Message": s3_event.to_string()});
    let input = json!({"Records": [
        sqs_record("direct", s3_event.to_string()),
        sqs_record("relayed", relayed.to_string()),
        sqs_record("missing", json!({"Records": [
            {"s3": {"bucket": {"name": "raw"}, "object": {"key": "nowhere.jpg"}}}
        ]}).to_string()),
    ]});

    let event = SqsBatchEvent::from_json(&input.to_string()).unwrap();
    let response = handle_batch(&pipeline, event).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"batchItemFailures": [{"itemIdentifier": "missing"}]})
    );

    assert!(dir.path().join("objects/thumbs/small").is_dir());
    let written = storage
        .download("thumbs", "small/holiday photo.jpg")
        .await
        .unwrap();
    let thumbnail = image::load_from_memory(&written).unwrap();
    assert_eq!(thumbnail.dimensions(), (128, 64));
}
