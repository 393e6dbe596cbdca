//! Queue policy documents.
//!
//! Policies are plain `serde_json` values; callers serialize them into the
//! queue's `Policy` / `RedrivePolicy` attributes. Attaching a policy fully
//! replaces whatever policy the queue had, it is not a merge.

use serde_json::{json, Value};

/// Grants `SQS:SendMessage` on `queue_arn` to `principal_service`, scoped
/// to the exact source account and a source ARN pattern.
///
/// Used with `s3.amazonaws.com` and a wildcard-region bucket ARN for the
/// primary queue, and with `sqs.amazonaws.com` and the DLQ's own ARN for
/// the dead letter queue.
pub fn send_policy(
    queue_arn: &str,
    account_id: &str,
    principal_service: &str,
    source_arn: &str,
) -> Value {
    json!({
        "Version": "2012-10-17",
        "Id": format!("{}-send-policy", queue_arn),
        "Statement": [
            {
                "Sid": "allow-send-message",
                "Effect": "Allow",
                "Principal": {
                    "Service": principal_service
                },
                "Action": "SQS:SendMessage",
                "Resource": queue_arn,
                "Condition": {
                    "StringEquals": {
                        "aws:SourceAccount": account_id
                    },
                    "ArnLike": {
                        "aws:SourceArn": source_arn
                    }
                }
            }
        ]
    })
}

/// Source ARN pattern matching the bucket in any region and any account
/// prefix, the shape S3 presents when it sends notifications.
pub fn bucket_source_arn(bucket: &str) -> String {
    format!("arn:aws:s3:*:*:{}", bucket)
}

/// Redrive policy moving messages to `dlq_arn` after `max_receive_count`
/// failed receives.
pub fn redrive_policy(dlq_arn: &str, max_receive_count: u32) -> Value {
    json!({
        "deadLetterTargetArn": dlq_arn,
        "maxReceiveCount": max_receive_count
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_policy_scopes_principal_and_source() {
        let arn = "arn:aws:sqs:us-east-1:043916019468:customers-ingestion-queue";
        let policy = send_policy(
            arn,
            "043916019468",
            "s3.amazonaws.com",
            &bucket_source_arn("my-bucket"),
        );

        assert_eq!(policy["Version"], "2012-10-17");
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Principal"]["Service"], "s3.amazonaws.com");
        assert_eq!(statement["Action"], "SQS:SendMessage");
        assert_eq!(statement["Resource"], arn);
        assert_eq!(
            statement["Condition"]["StringEquals"]["aws:SourceAccount"],
            "043916019468"
        );
        assert_eq!(
            statement["Condition"]["ArnLike"]["aws:SourceArn"],
            "arn:aws:s3:*:*:my-bucket"
        );
    }

    #[test]
    fn dlq_policy_uses_sqs_principal_and_own_arn() {
        let dlq_arn = "arn:aws:sqs:us-east-1:043916019468:customers-ingestion-queue-dlq";
        let policy = send_policy(dlq_arn, "043916019468", "sqs.amazonaws.com", dlq_arn);

        let statement = &policy["Statement"][0];
        assert_eq!(statement["Principal"]["Service"], "sqs.amazonaws.com");
        assert_eq!(statement["Resource"], dlq_arn);
        assert_eq!(statement["Condition"]["ArnLike"]["aws:SourceArn"], dlq_arn);
    }

    #[test]
    fn redrive_policy_round_trips() {
        let dlq_arn = "arn:aws:sqs:us-east-1:043916019468:customers-ingestion-queue-dlq";
        let written = redrive_policy(dlq_arn, 1).to_string();

        // verify by reparsing what would be written to the attribute
        let reparsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed["deadLetterTargetArn"], dlq_arn);
        assert_eq!(reparsed["maxReceiveCount"], 1);
    }
}
