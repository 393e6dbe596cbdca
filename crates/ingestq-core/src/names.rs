//! Resource name derivation.
//!
//! Every queue, event and ARN used by the provisioner is a pure function of
//! the table name, the ingestion path and the account/region, so re-running
//! the provisioner always targets the same resources.

use crate::error::Error;

/// Extracts the bucket name from an `s3://bucket/prefix...` ingestion path.
///
/// The path must carry at least one `/` after the bucket name; anything
/// else fails with [`Error::InvalidInput`] before any AWS call is made.
pub fn parse_ingestion_uri(uri: &str) -> Result<String, Error> {
    let rest = uri.strip_prefix("s3://").ok_or_else(|| {
        Error::InvalidInput(format!("ingestion path '{}' must start with s3://", uri))
    })?;

    let (bucket, _key) = rest.split_once('/').ok_or_else(|| {
        Error::InvalidInput(format!(
            "ingestion path '{}' must look like s3://<bucket>/<prefix>",
            uri
        ))
    })?;

    if bucket.is_empty() {
        return Err(Error::InvalidInput(format!(
            "ingestion path '{}' has an empty bucket name",
            uri
        )));
    }

    Ok(bucket.to_string())
}

/// Name of the ingestion queue for a table.
pub fn queue_name(table_name: &str) -> String {
    format!("{}-ingestion-queue", table_name)
}

/// Name of the dead letter queue attached to `queue_name`.
pub fn dlq_name(queue_name: &str) -> String {
    format!("{}-dlq", queue_name)
}

/// Synthesizes an SQS queue ARN; the create/get-url calls do not return it.
pub fn queue_arn(region: &str, account_id: &str, queue_name: &str) -> String {
    format!("arn:aws:sqs:{}:{}:{}", region, account_id, queue_name)
}

/// Synthesizes an SQS queue URL, used by teardown which has no create
/// response to take the URL from.
pub fn queue_url(region: &str, account_id: &str, queue_name: &str) -> String {
    format!(
        "https://sqs.{}.amazonaws.com/{}/{}",
        region, account_id, queue_name
    )
}

/// Resource names derived from a provisioning request.
///
/// Derived once up front and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNames {
    /// Bucket parsed from the ingestion path.
    pub bucket: String,
    /// Primary ingestion queue, `{table}-ingestion-queue`.
    pub queue_name: String,
    /// Dead letter queue, `{queue_name}-dlq`.
    pub dlq_name: String,
    /// Bucket notification event id.
    pub event_name: String,
}

impl DerivedNames {
    pub fn for_table(table_name: &str, ingestion_path: &str) -> Result<Self, Error> {
        let bucket = parse_ingestion_uri(ingestion_path)?;
        let queue_name = queue_name(table_name);
        let dlq_name = dlq_name(&queue_name);
        let event_name = format!("{}-event-forward-to--{}", table_name, queue_name);

        Ok(Self {
            bucket,
            queue_name,
            dlq_name,
            event_name,
        })
    }
}
