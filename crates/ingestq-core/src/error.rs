use crate::provision::TeardownReport;
use std::fmt;

/// A step of the provisioning or teardown flow, attached to provider
/// errors and teardown reports so failures name the call that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    CreateQueue,
    LookupQueue,
    AttachPolicy,
    AttachRedrivePolicy,
    RegisterNotification,
    DeleteQueue,
    ClearNotifications,
    ClearPolicy,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CreateQueue => "create queue",
            Step::LookupQueue => "look up queue",
            Step::AttachPolicy => "attach queue policy",
            Step::AttachRedrivePolicy => "attach redrive policy",
            Step::RegisterNotification => "register bucket notification",
            Step::DeleteQueue => "delete queue",
            Step::ClearNotifications => "clear bucket notifications",
            Step::ClearPolicy => "clear queue policy",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by the provisioner.
///
/// "Queue already exists" is deliberately absent: it is a successful
/// outcome, reported through [`crate::EnsureOutcome`] instead.
#[derive(Debug)]
pub enum Error {
    /// The payload failed validation; raised before any AWS call is made.
    InvalidInput(String),
    /// An AWS call failed for a reason other than "already exists".
    Provider {
        step: Step,
        resource: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Teardown ran to the end but one or more steps failed.
    PartialTeardown(TeardownReport),
}

impl Error {
    pub(crate) fn provider<E>(step: Step, resource: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Provider {
            step,
            resource: resource.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn provider_msg(
        step: Step,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Provider {
            step,
            resource: resource.into(),
            source: message.into().into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::Provider {
                step,
                resource,
                source,
            } => write!(f, "failed to {} for '{}': {}", step, resource, source),
            Error::PartialTeardown(report) => {
                let failed: Vec<String> = report
                    .failed_steps()
                    .map(|outcome| outcome.step.to_string())
                    .collect();
                write!(
                    f,
                    "teardown incomplete, {} of {} steps failed: {}",
                    failed.len(),
                    report.steps.len(),
                    failed.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Provider { source, .. } => {
                let source: &(dyn std::error::Error + 'static) = source.as_ref();
                Some(source)
            }
            _ => None,
        }
    }
}
