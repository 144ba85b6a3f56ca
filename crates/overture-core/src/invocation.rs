// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Invocation data model.
//!
//! An [`Invocation`] is the persisted unit of state describing one submitted
//! operation, from submission through its terminal state. Records are written
//! as whole JSON objects keyed by id; readers tolerate unknown extra fields
//! so the on-disk format can grow without breaking older readers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

/// The closed set of operations the engine can execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Deploy a service template.
    Deploy,
    /// Tear down the current deployment.
    Undeploy,
    /// Fire a policy trigger against the current deployment.
    Notify,
    /// Update the current deployment to a new template.
    Update,
}

impl OperationType {
    /// Stable lowercase name, as persisted on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Undeploy => "undeploy",
            Self::Notify => "notify",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = CoreError;

    /// Parse an operation name, rejecting anything outside the closed set.
    ///
    /// This is the submission-time validation boundary: string-typed callers
    /// (the transport layer) go through here, so the worker loop only ever
    /// sees valid operations.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deploy" => Ok(Self::Deploy),
            "undeploy" => Ok(Self::Undeploy),
            "notify" => Ok(Self::Notify),
            "update" => Ok(Self::Update),
            other => Err(CoreError::UnknownOperation {
                operation: other.to_string(),
            }),
        }
    }
}

/// Execution state of an invocation.
///
/// Transitions are monotonic along `Pending -> InProgress -> {Success, Failed}`.
/// `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Submitted and persisted, not yet picked up by the worker.
    Pending,
    /// Currently executing. At most one invocation is in this state.
    InProgress,
    /// The engine call completed without error.
    Success,
    /// The engine call failed; `failure_detail` carries the diagnosis.
    Failed,
}

impl InvocationState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A typed operation submission.
///
/// Submissions are validated by construction: an operation outside the closed
/// set, or a deploy without a template, cannot be represented here. This is
/// what the worker receives through the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    /// Deploy a service template.
    Deploy {
        /// Reference to the service template (CSAR name or path).
        service_template: String,
        /// Template input values.
        inputs: BTreeMap<String, Value>,
        /// Start from a clean state, discarding previous instance data.
        clean_state: bool,
    },
    /// Tear down the current deployment.
    Undeploy,
    /// Fire a named policy trigger.
    Notify {
        /// The trigger name.
        trigger: String,
        /// Trigger input values.
        inputs: BTreeMap<String, Value>,
    },
    /// Update the deployment to a new template revision.
    Update {
        /// Reference to the new service template.
        service_template: String,
        /// Template input values.
        inputs: BTreeMap<String, Value>,
    },
}

impl OperationRequest {
    /// The operation kind of this request.
    pub fn operation(&self) -> OperationType {
        match self {
            Self::Deploy { .. } => OperationType::Deploy,
            Self::Undeploy => OperationType::Undeploy,
            Self::Notify { .. } => OperationType::Notify,
            Self::Update { .. } => OperationType::Update,
        }
    }

    /// Flatten this request into the persisted payload shape.
    pub fn payload(&self) -> OperationPayload {
        match self {
            Self::Deploy {
                service_template,
                inputs,
                clean_state,
            } => OperationPayload {
                service_template: Some(service_template.clone()),
                inputs: inputs.clone(),
                trigger: None,
                clean_state: *clean_state,
            },
            Self::Undeploy => OperationPayload::default(),
            Self::Notify { trigger, inputs } => OperationPayload {
                service_template: None,
                inputs: inputs.clone(),
                trigger: Some(trigger.clone()),
                clean_state: false,
            },
            Self::Update {
                service_template,
                inputs,
            } => OperationPayload {
                service_template: Some(service_template.clone()),
                inputs: inputs.clone(),
                trigger: None,
                clean_state: false,
            },
        }
    }

    /// Rebuild a request from a persisted record, for restart recovery.
    ///
    /// Records written through [`submit`](crate::service::InvocationService::submit)
    /// are coherent by construction; a record that lost a required payload
    /// field (hand-edited, or truncated by an interrupted write that still
    /// parsed) is rejected with a validation error.
    pub fn from_record(
        operation: OperationType,
        payload: &OperationPayload,
    ) -> Result<Self, CoreError> {
        let require_template = || {
            payload
                .service_template
                .clone()
                .ok_or_else(|| CoreError::ValidationError {
                    field: "service_template".to_string(),
                    message: format!("required for operation '{}'", operation),
                })
        };

        match operation {
            OperationType::Deploy => Ok(Self::Deploy {
                service_template: require_template()?,
                inputs: payload.inputs.clone(),
                clean_state: payload.clean_state,
            }),
            OperationType::Undeploy => Ok(Self::Undeploy),
            OperationType::Notify => Ok(Self::Notify {
                trigger: payload
                    .trigger
                    .clone()
                    .ok_or_else(|| CoreError::ValidationError {
                        field: "trigger".to_string(),
                        message: "required for operation 'notify'".to_string(),
                    })?,
                inputs: payload.inputs.clone(),
            }),
            OperationType::Update => Ok(Self::Update {
                service_template: require_template()?,
                inputs: payload.inputs.clone(),
            }),
        }
    }
}

/// Operation-specific input, persisted verbatim and passed through to the
/// engine. Opaque to the bookkeeping core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationPayload {
    /// Service template reference (deploy/update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_template: Option<String>,
    /// Input values for the template or trigger.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, Value>,
    /// Trigger name (notify).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// Clean-state flag (deploy).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub clean_state: bool,
}

/// Structured failure description, present only on failed invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Machine-readable failure kind (e.g. `nonzero_exit`).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Source chain, outermost first, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl FailureDetail {
    /// Detail attached to records that were in flight when the process died.
    pub(crate) fn lost_on_restart() -> Self {
        Self {
            kind: "lost_on_restart".to_string(),
            message: "invocation was in progress when the service restarted".to_string(),
            trace: None,
        }
    }

    /// Detail attached to pending records whose payload no longer parses.
    pub(crate) fn invalid_payload(err: &CoreError) -> Self {
        Self {
            kind: "invalid_payload".to_string(),
            message: err.to_string(),
            trace: None,
        }
    }
}

/// The persisted record of one submitted operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique identifier, assigned at submission, never reused.
    pub id: Uuid,
    /// Which operation was requested.
    pub operation: OperationType,
    /// Current state. Mutated only by the worker after submission.
    pub state: InvocationState,
    /// Submission timestamp (UTC, sub-second precision); the history sort key.
    pub submitted_at: DateTime<Utc>,
    /// Operation-specific input, passed through to the engine.
    #[serde(default)]
    pub payload: OperationPayload,
    /// Component name -> lifecycle state, captured when the invocation
    /// reached a terminal state (or computed live for in-progress overlays).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_snapshot: Option<BTreeMap<String, String>>,
    /// Captured standard output of the engine call.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error of the engine call.
    #[serde(default)]
    pub stderr: String,
    /// Failure diagnosis; present iff `state == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<FailureDetail>,
}

impl Invocation {
    /// Build a fresh pending record for a request.
    pub(crate) fn pending(id: Uuid, request: &OperationRequest, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            operation: request.operation(),
            state: InvocationState::Pending,
            submitted_at,
            payload: request.payload(),
            instance_snapshot: None,
            stdout: String::new(),
            stderr: String::new(),
            failure_detail: None,
        }
    }
}
