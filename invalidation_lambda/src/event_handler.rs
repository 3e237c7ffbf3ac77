use std::collections::HashSet;

use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use aws_sdk_cloudfront::Client as CloudFrontClient;
use lambda_runtime::{tracing, Error, LambdaEvent};

/// CloudFront rejects invalidation batches with more paths than this.
const MAX_PATHS_PER_BATCH: usize = 3000;

/// S3 delivers keys url encoded, with spaces as '+'. CloudFront expects '%20'.
fn invalidation_path(key: &str) -> String {
    format!("/{}", key.replace('+', "%20"))
}

/// one path per record, in event order, without duplicates.
fn invalidation_paths(event: &S3Event) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut paths = vec![];
    for record in &event.records {
        let Some(key) = record.s3.object.key.as_deref() else {
            tracing::warn!("Skipping S3 record without an object key");
            continue;
        };
        let path = invalidation_path(key);
        if seen.insert(path.clone()) {
            paths.push(path);
        }
    }
    paths
}

fn record_identity(record: &S3EventRecord) -> String {
    let bucket = record.s3.bucket.name.as_deref().unwrap_or_default();
    let key = record.s3.object.key.as_deref().unwrap_or_default();
    let version = match &record.s3.object.sequencer {
        Some(sequencer) => sequencer.clone(),
        None => record.event_time.to_rfc3339(),
    };
    format!("{bucket}/{key}/{version}")
}

/// derived only from the event, so a redelivered event produces the same
/// reference and CloudFront does not create a second invalidation.
fn caller_reference(event: &S3Event) -> String {
    let identities: Vec<String> = event.records.iter().map(record_identity).collect();
    let checksum = adler::adler32_slice(identities.join("\n").as_bytes());
    format!("s3-{:08x}-{}", checksum, event.records.len())
}

async fn create_invalidation(
    cloudfront_client: &CloudFrontClient,
    distribution_id: &str,
    caller_reference: String,
    paths: &[String],
) -> Result<String, Error> {
    let paths = Paths::builder()
        .quantity(paths.len() as i32)
        .set_items(Some(paths.to_vec()))
        .build()?;
    let batch = InvalidationBatch::builder()
        .paths(paths)
        .caller_reference(caller_reference)
        .build()?;
    let output = cloudfront_client
        .create_invalidation()
        .distribution_id(distribution_id)
        .invalidation_batch(batch)
        .send()
        .await?;
    Ok(output
        .invalidation()
        .map(|invalidation| invalidation.id().to_string())
        .unwrap_or_default())
}

pub(crate) async fn function_handler(
    event: LambdaEvent<S3Event>,
    cloudfront_client: &CloudFrontClient,
    distribution_id: &str,
) -> Result<(), Error> {
    let payload = event.payload;
    if payload.records.is_empty() {
        tracing::warn!("No records found in S3 event");
        return Ok(());
    }
    let paths = invalidation_paths(&payload);
    if paths.is_empty() {
        tracing::warn!("No object keys found in S3 event");
        return Ok(());
    }
    let reference = caller_reference(&payload);
    for (index, batch) in paths.chunks(MAX_PATHS_PER_BATCH).enumerate() {
        let batch_reference = format!("{reference}-{index}");
        let invalidation_id =
            create_invalidation(cloudfront_client, distribution_id, batch_reference, batch).await?;
        tracing::info!(
            distribution_id,
            invalidation_id = %invalidation_id,
            paths = batch.len(),
            "Created invalidation"
        );
    }
    Ok(())
}
