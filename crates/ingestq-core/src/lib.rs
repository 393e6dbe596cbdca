//! # ingestq-core
//!
//! Core library for provisioning AWS S3 -> SQS ingestion plumbing.
//!
//! Given a declarative payload (ingestion path, table name, account id),
//! this crate derives resource names, creates or looks up the ingestion
//! queue and its dead letter queue, attaches access and redrive policies,
//! and registers an S3 bucket notification pointing at the queue.
//!
//! ## Features
//!
//! - **Idempotent queue creation**: an already-existing queue is a
//!   successful lookup, never a failure, so runs can be safely repeated
//! - **Policy wiring**: S3 -> SQS send permission, DLQ send permission and
//!   the redrive policy linking the two queues
//! - **Bucket notifications**: destructive full-replace registration, plus
//!   an additive merge variant that preserves existing entries
//! - **Best-effort teardown**: per-step outcome reporting, one failing
//!   step never blocks the rest
//!
//! ## Example
//!
//! ```no_run
//! use ingestq::{ProvisionOptions, Provisioner, ProvisioningRequest};
//!
//! # async fn example() -> Result<(), ingestq::Error> {
//! // Load AWS configuration
//! let config = aws_config::from_env().load().await;
//!
//! // Create a provisioner
//! let provisioner = Provisioner::from_config(config)?;
//!
//! let request = ProvisioningRequest {
//!     s3_ingestion_path: "s3://my-bucket/raw/customers/".to_string(),
//!     table_name: "customers".to_string(),
//!     aws_account_id: "043916019468".to_string(),
//! };
//!
//! let summary = provisioner
//!     .provision(&request, &ProvisionOptions::default())
//!     .await?;
//! println!("queue: {} ({})", summary.queue.url, summary.queue.arn);
//! # Ok(())
//! # }
//! ```

mod error;
mod names;
mod policy;
mod provision;
mod retry;

pub use error::{Error, Step};
pub use names::{dlq_name, parse_ingestion_uri, queue_arn, queue_name, queue_url, DerivedNames};
pub use policy::{bucket_source_arn, redrive_policy, send_policy};
pub use provision::*;
pub use retry::with_backoff;
