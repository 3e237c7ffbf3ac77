//! Turns a compiled `bootstrap` executable into the zip artifact the function
//! deploys from, and uploads it to the artifact bucket.

use std::io::{Cursor, Write};
use std::path::Path;

use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use stack_lib::{Result, StackError};
use zip::write::FileOptions;
use zip::CompressionMethod;

/// the provided runtimes execute this file from the root of the archive.
pub const BOOTSTRAP_FILE_NAME: &str = "bootstrap";

fn zip_error(e: zip::result::ZipError) -> StackError {
    StackError::Packaging(e.to_string())
}

/// artifact keys are content addressed, so redeploying an unchanged binary
/// leaves the function untouched.
pub fn artifact_key(function_name: &str, bootstrap: &[u8]) -> String {
    let hash = adler::adler32_slice(bootstrap);
    format!("{function_name}_{hash:08x}.zip")
}

pub fn zip_bootstrap(bootstrap: &[u8]) -> Result<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o755);
    writer.start_file(BOOTSTRAP_FILE_NAME, options).map_err(zip_error)?;
    writer.write_all(bootstrap)?;
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

/// only a missing key means the artifact still has to be uploaded. Any other
/// failure (denied, throttled) is reported instead of retried as an upload.
async fn artifact_exists(client: &S3Client, bucket: &str, key: &str) -> Result<bool> {
    match client.head_object().bucket(bucket).key(key).send().await {
        Ok(_) => Ok(true),
        Err(e) => match e.as_service_error() {
            Some(err) if err.is_not_found() => Ok(false),
            _ => Err(StackError::aws(format!("{}", DisplayErrorContext(&e)))),
        },
    }
}

pub async fn upload_artifact(
    client: &S3Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
) -> Result<()> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/zip")
        .body(ByteStream::from(body))
        .send()
        .await
        .map_err(|e| StackError::aws(format!("{}", DisplayErrorContext(&e))))?;
    Ok(())
}

/// zips the executable at `bootstrap_path` and uploads it unless an
/// identical artifact is already in the bucket. Returns the artifact key.
pub async fn package_and_upload(
    client: &S3Client,
    bucket: &str,
    function_name: &str,
    bootstrap_path: &Path,
) -> Result<String> {
    let bootstrap = std::fs::read(bootstrap_path)?;
    let key = artifact_key(function_name, &bootstrap);
    if artifact_exists(client, bucket, &key).await? {
        tracing::info!(%bucket, %key, "Artifact already uploaded");
        return Ok(key);
    }
    let archive = zip_bootstrap(&bootstrap)?;
    tracing::info!(%bucket, %key, bytes = archive.len(), "Uploading artifact");
    upload_artifact(client, bucket, &key, archive).await?;
    Ok(key)
}
