//! Object storage for finished batches.
//!
//! [`S3Sink`] writes each batch with a single `put_object` through `aws-sdk-s3`, using the
//! default AWS credential chain. `destination.region` and `destination.endpoint` override the
//! environment, the latter for S3-compatible stores (path-style addressing is forced then).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use event_bucket_core::config::Destination;
use event_bucket_core::contract::RecordSink;
use event_bucket_core::error::SinkError;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct S3Sink {
    client: Client,
}

impl S3Sink {
    #[tracing::instrument(level = "debug", skip(destination), fields(bucket = %destination.bucket))]
    pub async fn new(destination: &Destination) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &destination.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &destination.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let mut s3_cfg = aws_sdk_s3::config::Builder::from(&shared);
        if destination.endpoint.is_some() {
            s3_cfg = s3_cfg.force_path_style(true);
        }

        tracing::info!(
            region = ?shared.region(),
            endpoint = ?destination.endpoint,
            "Initialized S3 sink"
        );
        Self {
            client: Client::from_conf(s3_cfg.build()),
        }
    }
}

#[async_trait]
impl RecordSink for S3Sink {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let bytes = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(NDJSON_CONTENT_TYPE)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                let context = DisplayErrorContext(&e).to_string();
                tracing::error!(error = %context, bucket, key, "S3 put_object failed");
                SinkError::Storage(context)
            })?;
        tracing::info!(bucket, key, bytes, "Uploaded batch to S3");
        Ok(())
    }
}
