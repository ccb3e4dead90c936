//! Lifecycle events
//!
//! Autoscaling lifecycle notifications arrive as CloudWatch events. They are
//! validated once at the boundary into a [`LifecycleEvent`]; nothing past this
//! module reads raw JSON.
//!
//! ```json
//! {
//!   "source": "aws.autoscaling",
//!   "detail-type": "EC2 Instance Launch Successful",
//!   "region": "eu-west-1",
//!   "detail": {
//!     "AutoScalingGroupName": "web-prod",
//!     "EC2InstanceId": "i-0abc"
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Event source autoscaling notifications carry
pub const AUTOSCALING_SOURCE: &str = "aws.autoscaling";

/// Detail type of a successful launch
pub const LAUNCH_DETAIL_TYPE: &str = "EC2 Instance Launch Successful";

/// Detail type of a successful termination
pub const TERMINATE_DETAIL_TYPE: &str = "EC2 Instance Terminate Successful";

/// What happened to the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Launch,
    Terminate,
    /// Any other notification; handled as a no-op
    Unknown,
}

impl EventKind {
    /// Classify a CloudWatch `detail-type`
    pub fn from_detail_type(detail_type: &str) -> Self {
        match detail_type {
            LAUNCH_DETAIL_TYPE => EventKind::Launch,
            TERMINATE_DETAIL_TYPE => EventKind::Terminate,
            _ => EventKind::Unknown,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Launch => "launch",
            EventKind::Terminate => "terminate",
            EventKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A validated lifecycle notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    /// Instance the event is about; may be empty for [`EventKind::Unknown`]
    pub instance_id: String,
    /// Autoscaling group name
    pub group_id: String,
    pub region: String,
    pub detail_type: String,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    source: Option<String>,
    #[serde(rename = "detail-type")]
    detail_type: Option<String>,
    region: Option<String>,
    #[serde(default)]
    detail: RawDetail,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetail {
    #[serde(rename = "AutoScalingGroupName")]
    group_name: Option<String>,
    #[serde(rename = "EC2InstanceId")]
    instance_id: Option<String>,
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::invalid_event(format!(
            "missing required field `{}`",
            field
        ))),
    }
}

impl LifecycleEvent {
    /// Build an event directly
    pub fn new(
        kind: EventKind,
        instance_id: impl Into<String>,
        group_id: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        let detail_type = match kind {
            EventKind::Launch => LAUNCH_DETAIL_TYPE,
            EventKind::Terminate => TERMINATE_DETAIL_TYPE,
            EventKind::Unknown => "",
        };

        Self {
            kind,
            instance_id: instance_id.into(),
            group_id: group_id.into(),
            region: region.into(),
            detail_type: detail_type.to_string(),
        }
    }

    /// Parse and validate a CloudWatch event body
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Validate an already-decoded CloudWatch event
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawEvent = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEvent) -> Result<Self> {
        let source = required(raw.source, "source")?;
        if source != AUTOSCALING_SOURCE {
            return Err(Error::invalid_event(format!(
                "not an autoscaling event (source {:?})",
                source
            )));
        }

        let detail_type = required(raw.detail_type, "detail-type")?;
        let kind = EventKind::from_detail_type(&detail_type);
        let region = required(raw.region, "region")?;
        let group_id = required(raw.detail.group_name, "detail.AutoScalingGroupName")?;

        let instance_id = match kind {
            EventKind::Unknown => raw.detail.instance_id.unwrap_or_default(),
            _ => required(raw.detail.instance_id, "detail.EC2InstanceId")?,
        };

        Ok(Self {
            kind,
            instance_id,
            group_id,
            region,
            detail_type,
        })
    }
}
