//! The provisioner: queue creation, policy attachment and bucket wiring.

use crate::error::{Error, Step};
use crate::names::{self, DerivedNames};
use crate::policy;
use crate::retry;
use aws_config::SdkConfig;
use aws_sdk_s3 as s3;
use aws_sdk_sqs as sqs;
use s3::types::{
    Event, FilterRule, FilterRuleName, NotificationConfiguration, NotificationConfigurationFilter,
    QueueConfiguration, S3KeyFilter,
};
use sqs::error::SdkError;
use sqs::operation::set_queue_attributes::SetQueueAttributesError;
use sqs::types::QueueAttributeName;
use std::time::Duration;

/// Messages move to the DLQ after this many failed receives unless the
/// caller overrides it. 1 is aggressive: first failure redrives.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 1;

/// Attempts and initial delay for calls that depend on a just-created
/// queue becoming visible in the control plane.
const CONSISTENCY_ATTEMPTS: u32 = 5;
const CONSISTENCY_BASE_DELAY: Duration = Duration::from_millis(200);

/// The declarative payload driving a provisioning run.
///
/// Field names match the JSON payload: `s3_ingestion_path`, `table_name`,
/// `aws_account_id`. Region and credentials come from the AWS config chain.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProvisioningRequest {
    pub s3_ingestion_path: String,
    pub table_name: String,
    pub aws_account_id: String,
}

/// URL and synthesized ARN of a provisioned queue.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct QueueHandle {
    pub url: String,
    pub arn: String,
}

/// Whether `ensure_queue` created the queue or found it already there.
/// Both are success; re-running the provisioner is expected to be safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExisted,
}

/// Knobs for a provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    /// Receive-count threshold for the redrive policy.
    pub max_receive_count: u32,
    /// Restrict the bucket notification to object keys with this prefix.
    pub prefix: Option<String>,
    /// Provision the queue without a dead letter queue.
    pub skip_dlq: bool,
    /// Upsert into the bucket's existing notification configuration
    /// instead of replacing it wholesale.
    pub merge_notifications: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            prefix: None,
            skip_dlq: false,
            merge_notifications: false,
        }
    }
}

/// Identifiers produced by a successful run, printed to stdout by the CLI.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProvisionSummary {
    pub bucket: String,
    pub queue_name: String,
    pub event_name: String,
    pub queue: QueueHandle,
    pub dlq: Option<QueueHandle>,
}

/// Outcome of one teardown step; `error` is `None` on success.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepOutcome {
    pub step: Step,
    pub resource: String,
    pub error: Option<String>,
}

/// Per-step teardown results. Never collapsed into a single boolean:
/// a failed step does not hide the steps that ran after it.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TeardownReport {
    pub steps: Vec<StepOutcome>,
}

impl TeardownReport {
    fn record<T, E: std::fmt::Display>(
        &mut self,
        step: Step,
        resource: &str,
        result: Result<T, E>,
    ) {
        match result {
            Ok(_) => {
                log::info!("{} succeeded for '{}'", step, resource);
                self.steps.push(StepOutcome {
                    step,
                    resource: resource.to_string(),
                    error: None,
                });
            }
            Err(e) => {
                log::warn!("{} failed for '{}': {}", step, resource, e);
                self.steps.push(StepOutcome {
                    step,
                    resource: resource.to_string(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|outcome| outcome.error.is_some())
    }

    pub fn is_complete(&self) -> bool {
        self.failed_steps().next().is_none()
    }

    /// Converts the report into a result for exit-code purposes, keeping
    /// the per-step detail inside [`Error::PartialTeardown`].
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(Error::PartialTeardown(self))
        }
    }
}

/// Provisions the S3 -> SQS plumbing for one table: primary queue, DLQ,
/// access policies, redrive policy and the bucket notification.
///
/// Holds its own SQS and S3 clients built from an explicit [`SdkConfig`];
/// there is no global credential or region state.
pub struct Provisioner {
    /// The AWS SDK configuration the clients were built from.
    pub config: SdkConfig,
    /// The SQS client instance.
    pub sqs: sqs::Client,
    /// The S3 client instance.
    pub s3: s3::Client,
    region: String,
}

impl Provisioner {
    /// Creates a Provisioner from a pre-built AWS SDK config.
    ///
    /// The config must carry a resolved region, which is needed to
    /// synthesize queue ARNs and URLs.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ingestq::Provisioner;
    ///
    /// # async fn example() -> Result<(), ingestq::Error> {
    /// let config = aws_config::from_env().load().await;
    /// let provisioner = Provisioner::from_config(config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_config(config: SdkConfig) -> Result<Self, Error> {
        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| Error::InvalidInput("no AWS region resolved".to_string()))?;

        Ok(Self {
            sqs: sqs::Client::new(&config),
            s3: s3::Client::new(&config),
            config,
            region,
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Runs the full pipeline for one table.
    ///
    /// Sequence: derive names, ensure the primary queue, attach its send
    /// policy, ensure and wire the DLQ (unless skipped), register the
    /// bucket notification. Safe to re-run: every step either creates the
    /// resource or overwrites it with the same configuration.
    pub async fn provision(
        &self,
        request: &ProvisioningRequest,
        options: &ProvisionOptions,
    ) -> Result<ProvisionSummary, Error> {
        let names = DerivedNames::for_table(&request.table_name, &request.s3_ingestion_path)?;
        let account_id = &request.aws_account_id;

        log::info!(
            "provisioning ingestion plumbing for table '{}' (bucket '{}')",
            request.table_name,
            names.bucket
        );

        let (queue, outcome) = self.ensure_queue(&names.queue_name, account_id).await?;
        if outcome == EnsureOutcome::AlreadyExisted {
            log::info!("queue '{}' already exists, reusing it", names.queue_name);
        }

        self.attach_send_policy(&queue, &names.bucket, account_id)
            .await?;

        let dlq = if options.skip_dlq {
            None
        } else {
            let (dlq, _) = self.ensure_dlq(&names.queue_name, account_id).await?;
            self.attach_dlq_policy(&dlq, account_id).await?;
            self.attach_redrive_policy(&queue.url, &dlq.arn, options.max_receive_count)
                .await?;
            log::debug!(
                "dead letter queue '{}' wired with max receive count {}",
                names.dlq_name,
                options.max_receive_count
            );
            Some(dlq)
        };

        if options.merge_notifications {
            self.merge_bucket_notification(
                &names.bucket,
                &queue.arn,
                &names.event_name,
                options.prefix.as_deref(),
            )
            .await?;
        } else {
            self.register_bucket_notification(
                &names.bucket,
                &queue.arn,
                &names.event_name,
                options.prefix.as_deref(),
            )
            .await?;
        }

        Ok(ProvisionSummary {
            bucket: names.bucket,
            queue_name: names.queue_name,
            event_name: names.event_name,
            queue,
            dlq,
        })
    }

    /// Creates the queue, or looks it up when it already exists.
    ///
    /// The already-exists case is success, reported as
    /// [`EnsureOutcome::AlreadyExisted`]; any other SDK failure becomes a
    /// [`Error::Provider`]. Calling this twice with the same name yields
    /// the same URL both times.
    pub async fn ensure_queue(
        &self,
        name: &str,
        account_id: &str,
    ) -> Result<(QueueHandle, EnsureOutcome), Error> {
        let arn = names::queue_arn(&self.region, account_id, name);

        match self.sqs.create_queue().queue_name(name).send().await {
            Ok(output) => {
                let url = output.queue_url.ok_or_else(|| {
                    Error::provider_msg(Step::CreateQueue, name, "response carried no queue URL")
                })?;
                Ok((QueueHandle { url, arn }, EnsureOutcome::Created))
            }
            Err(e) => {
                let already_exists = e
                    .as_service_error()
                    .map(|se| se.is_queue_name_exists())
                    .unwrap_or(false);
                if !already_exists {
                    return Err(Error::provider(Step::CreateQueue, name, e));
                }

                let output = self
                    .sqs
                    .get_queue_url()
                    .queue_name(name)
                    .send()
                    .await
                    .map_err(|e| Error::provider(Step::LookupQueue, name, e))?;
                let url = output.queue_url.ok_or_else(|| {
                    Error::provider_msg(Step::LookupQueue, name, "response carried no queue URL")
                })?;
                Ok((QueueHandle { url, arn }, EnsureOutcome::AlreadyExisted))
            }
        }
    }

    /// Same contract as [`ensure_queue`](Self::ensure_queue), on the
    /// derived `{base}-dlq` name.
    pub async fn ensure_dlq(
        &self,
        base_queue_name: &str,
        account_id: &str,
    ) -> Result<(QueueHandle, EnsureOutcome), Error> {
        self.ensure_queue(&names::dlq_name(base_queue_name), account_id)
            .await
    }

    /// Attaches the policy allowing S3 to send events from `bucket` into
    /// the queue. Fully replaces the queue's existing policy attribute.
    pub async fn attach_send_policy(
        &self,
        queue: &QueueHandle,
        bucket: &str,
        account_id: &str,
    ) -> Result<(), Error> {
        let document = policy::send_policy(
            &queue.arn,
            account_id,
            "s3.amazonaws.com",
            &policy::bucket_source_arn(bucket),
        );
        self.set_queue_attribute(
            Step::AttachPolicy,
            &queue.url,
            QueueAttributeName::Policy,
            document.to_string(),
        )
        .await
    }

    /// Attaches the policy allowing SQS itself to redrive messages into
    /// the dead letter queue. Fully replaces the existing policy attribute.
    pub async fn attach_dlq_policy(
        &self,
        dlq: &QueueHandle,
        account_id: &str,
    ) -> Result<(), Error> {
        let document = policy::send_policy(&dlq.arn, account_id, "sqs.amazonaws.com", &dlq.arn);
        self.set_queue_attribute(
            Step::AttachPolicy,
            &dlq.url,
            QueueAttributeName::Policy,
            document.to_string(),
        )
        .await
    }

    /// Points the primary queue's redrive policy at the DLQ; messages move
    /// there after `max_receive_count` failed receives.
    pub async fn attach_redrive_policy(
        &self,
        queue_url: &str,
        dlq_arn: &str,
        max_receive_count: u32,
    ) -> Result<(), Error> {
        let document = policy::redrive_policy(dlq_arn, max_receive_count);
        self.set_queue_attribute(
            Step::AttachRedrivePolicy,
            queue_url,
            QueueAttributeName::RedrivePolicy,
            document.to_string(),
        )
        .await
    }

    /// Replaces the bucket's queue-notification configuration with a single
    /// `s3:ObjectCreated:*` entry pointing at `queue_arn`.
    ///
    /// This is destructive: any notification entries previously configured
    /// on the bucket are dropped. Concurrent provisioning runs against the
    /// same bucket must be serialized by the caller or they will overwrite
    /// each other; see [`merge_bucket_notification`](Self::merge_bucket_notification)
    /// for the non-destructive variant.
    pub async fn register_bucket_notification(
        &self,
        bucket: &str,
        queue_arn: &str,
        event_name: &str,
        prefix: Option<&str>,
    ) -> Result<(), Error> {
        let entry = notification_entry(queue_arn, event_name, prefix)
            .map_err(|e| Error::provider(Step::RegisterNotification, bucket, e))?;
        let configuration = NotificationConfiguration::builder()
            .queue_configurations(entry)
            .build();

        self.put_bucket_notification(bucket, configuration).await
    }

    /// Upserts the notification entry by event id, keeping every other
    /// entry (and non-queue targets) the bucket already has.
    pub async fn merge_bucket_notification(
        &self,
        bucket: &str,
        queue_arn: &str,
        event_name: &str,
        prefix: Option<&str>,
    ) -> Result<(), Error> {
        let entry = notification_entry(queue_arn, event_name, prefix)
            .map_err(|e| Error::provider(Step::RegisterNotification, bucket, e))?;

        let current = self
            .s3
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| Error::provider(Step::RegisterNotification, bucket, e))?;

        let mut queues = current.queue_configurations.unwrap_or_default();
        queues.retain(|existing| existing.id() != Some(event_name));
        queues.push(entry);

        let configuration = NotificationConfiguration::builder()
            .set_queue_configurations(Some(queues))
            .set_topic_configurations(current.topic_configurations)
            .set_lambda_function_configurations(current.lambda_function_configurations)
            .set_event_bridge_configuration(current.event_bridge_configuration)
            .build();

        self.put_bucket_notification(bucket, configuration).await
    }

    /// Best-effort removal of previously provisioned resources.
    ///
    /// Deletes the primary queue, clears the bucket's queue notifications
    /// and blanks the queue policy. Each step is independently guarded: a
    /// failure is logged and recorded, and the remaining steps still run.
    /// Blanking the policy only matters when the delete itself failed; the
    /// DLQ is left in place, matching what provisioning created first.
    pub async fn teardown(
        &self,
        account_id: &str,
        queue_name: &str,
        bucket: &str,
    ) -> TeardownReport {
        let mut report = TeardownReport::default();
        let queue_url = names::queue_url(&self.region, account_id, queue_name);

        let deleted = self
            .sqs
            .delete_queue()
            .queue_url(&queue_url)
            .send()
            .await
            .map_err(|e| sdk_error_text(&e));
        report.record(Step::DeleteQueue, queue_name, deleted);

        let cleared = self
            .s3
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(NotificationConfiguration::builder().build())
            .send()
            .await
            .map_err(|e| sdk_error_text(&e));
        report.record(Step::ClearNotifications, bucket, cleared);

        let blanked = self
            .sqs
            .set_queue_attributes()
            .queue_url(&queue_url)
            .attributes(QueueAttributeName::Policy, "")
            .send()
            .await
            .map_err(|e| sdk_error_text(&e));
        report.record(Step::ClearPolicy, queue_name, blanked);

        report
    }

    /// Sets one queue attribute, retrying while the queue is not yet
    /// visible to the control plane.
    async fn set_queue_attribute(
        &self,
        step: Step,
        queue_url: &str,
        name: QueueAttributeName,
        value: String,
    ) -> Result<(), Error> {
        retry::with_backoff(
            CONSISTENCY_ATTEMPTS,
            CONSISTENCY_BASE_DELAY,
            || {
                let request = self
                    .sqs
                    .set_queue_attributes()
                    .queue_url(queue_url)
                    .attributes(name.clone(), value.clone());
                async move { request.send().await }
            },
            queue_not_ready,
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::provider(step, queue_url, e))
    }

    /// Writes the bucket notification configuration, retrying while S3
    /// cannot yet validate the queue destination.
    async fn put_bucket_notification(
        &self,
        bucket: &str,
        configuration: NotificationConfiguration,
    ) -> Result<(), Error> {
        retry::with_backoff(
            CONSISTENCY_ATTEMPTS,
            CONSISTENCY_BASE_DELAY,
            || {
                let request = self
                    .s3
                    .put_bucket_notification_configuration()
                    .bucket(bucket)
                    .notification_configuration(configuration.clone());
                async move { request.send().await }
            },
            destination_not_ready,
        )
        .await
        .map(|_| ())
        .map_err(|e| Error::provider(Step::RegisterNotification, bucket, e))
    }
}

/// Builds the single queue-configuration entry for `s3:ObjectCreated:*`
/// events, with an optional key-prefix filter rule.
fn notification_entry(
    queue_arn: &str,
    event_name: &str,
    prefix: Option<&str>,
) -> Result<QueueConfiguration, s3::error::BuildError> {
    let mut builder = QueueConfiguration::builder()
        .id(event_name)
        .queue_arn(queue_arn)
        .events(Event::from("s3:ObjectCreated:*"));

    if let Some(prefix) = prefix {
        let rule = FilterRule::builder()
            .name(FilterRuleName::Prefix)
            .value(prefix)
            .build();
        builder = builder.filter(
            NotificationConfigurationFilter::builder()
                .key(S3KeyFilter::builder().filter_rules(rule).build())
                .build(),
        );
    }

    builder.build()
}

fn queue_not_ready(err: &SdkError<SetQueueAttributesError>) -> bool {
    err.as_service_error()
        .map(|se| se.is_queue_does_not_exist())
        .unwrap_or(false)
}

fn destination_not_ready(
    err: &SdkError<
        s3::operation::put_bucket_notification_configuration::PutBucketNotificationConfigurationError,
    >,
) -> bool {
    use s3::error::ProvideErrorMetadata;

    // S3 rejects the destination with InvalidArgument until the queue and
    // its policy have propagated
    matches!(
        err.as_service_error().and_then(|se| se.code()),
        Some("InvalidArgument")
    )
}

/// Primary AWS service error message when there is one, the SDK-level
/// error otherwise (timeout, dispatch failure).
fn sdk_error_text<E: std::fmt::Display>(err: &SdkError<E>) -> String {
    match err {
        SdkError::ServiceError(context) => context.err().to_string(),
        other => other.to_string(),
    }
}
