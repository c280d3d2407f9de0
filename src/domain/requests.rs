//! Protocol Request/Response Records
//!
//! Bodies exchanged between the REST gateway and its clients. Operation
//! failures travel in the `error` field of a response body; an empty string
//! means success. `errorKind` names the failure class alongside it.

use crate::domain::volume::{Source, Volume, VolumeId, VolumeLocator, VolumeSpec};
use serde::{Deserialize, Serialize};

// =============================================================================
// Generic Response
// =============================================================================

/// Response carrying only an operation error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_kind: String,
}

impl VolumeResponse {
    pub fn from_result<T>(result: &crate::error::Result<T>) -> Self {
        match result {
            Ok(_) => Self::default(),
            Err(e) => Self {
                error: e.to_string(),
                error_kind: e.kind().to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_empty()
    }
}

// =============================================================================
// Create
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCreateRequest {
    #[serde(default)]
    pub locator: VolumeLocator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(default)]
    pub spec: VolumeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeCreateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub response: VolumeResponse,
}

// =============================================================================
// Compound Update
// =============================================================================

/// Three-valued toggle distinguishing "leave unchanged" from on/off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeActionParam {
    #[default]
    None,
    On,
    Off,
}

/// Attach and mount toggles applied after any metadata update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStateAction {
    #[serde(default)]
    pub attach: VolumeActionParam,
    #[serde(default)]
    pub mount: VolumeActionParam,
    #[serde(default)]
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locator: Option<VolumeLocator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<VolumeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<VolumeStateAction>,
}

impl VolumeSetRequest {
    pub fn mount(path: impl Into<String>) -> Self {
        Self {
            action: Some(VolumeStateAction {
                mount: VolumeActionParam::On,
                mount_path: path.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn unmount(path: impl Into<String>) -> Self {
        Self {
            action: Some(VolumeStateAction {
                mount: VolumeActionParam::Off,
                mount_path: path.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn attach(param: VolumeActionParam) -> Self {
        Self {
            action: Some(VolumeStateAction {
                attach: param,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSetResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,
    #[serde(flatten)]
    pub response: VolumeResponse,
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapCreateRequest {
    pub id: VolumeId,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub locator: VolumeLocator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapCreateResponse {
    #[serde(flatten)]
    pub volume_create_response: VolumeCreateResponse,
}

// =============================================================================
// Errors
// =============================================================================

/// Transport-level error body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_decodes_toggles() {
        let req: VolumeSetRequest = serde_json::from_str(
            r#"{"locator":{"name":"v2"},"action":{"attach":"off","mount":"on","mountPath":"/mnt/a"}}"#,
        )
        .unwrap();
        assert_eq!(req.locator.unwrap().name, "v2");
        assert!(req.spec.is_none());
        let action = req.action.unwrap();
        assert_eq!(action.attach, VolumeActionParam::Off);
        assert_eq!(action.mount, VolumeActionParam::On);
        assert_eq!(action.mount_path, "/mnt/a");

        let req: VolumeSetRequest = serde_json::from_str(r#"{"action":{}}"#).unwrap();
        let action = req.action.unwrap();
        assert_eq!(action.attach, VolumeActionParam::None);
        assert_eq!(action.mount, VolumeActionParam::None);
    }

    #[test]
    fn test_create_response_embeds_error() {
        let result: crate::error::Result<()> = Err(crate::error::Error::not_supported("x"));
        let resp = VolumeCreateResponse {
            id: String::new(),
            response: VolumeResponse::from_result(&result),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"], "Operation not supported: x");
        assert_eq!(json["errorKind"], "not_supported");
        assert_eq!(json["id"], "");

        let ok = serde_json::to_value(VolumeResponse::from_result(&Ok(()))).unwrap();
        assert_eq!(ok, serde_json::json!({"error": ""}));
    }
}
