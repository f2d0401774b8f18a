use serde::{Deserialize, Serialize};

use crate::domain::TaskId;

/// Multipart field and header names of the submit contract.
pub const FIELD_FILE: &str = "file";
pub const FIELD_WORKERS_DISABLED: &str = "workersDisabled";
pub const FIELD_PASSWORD: &str = "password";
pub const HEADER_CSRF_TOKEN: &str = "X-CSRF-Token";

/// Body returned by the submit endpoint on success (any 2xx status). The
/// service also sends `success: true` and a relative `link` to the result
/// view; only the task identifier is contractual, the rest is tolerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// `workersDisabled` wire encoding: comma-joined worker names, catalog
/// order. An empty disabled set encodes as the empty string.
pub fn encode_disabled_workers(names: &[String]) -> String {
    names.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_response_accepts_service_extras() {
        let body = r#"{"success": true, "taskId": "c0ffee", "link": "/analysis/c0ffee"}"#;
        let response: SubmitResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(response.task_id, TaskId::from("c0ffee"));
        assert_eq!(response.link.as_deref(), Some("/analysis/c0ffee"));
    }

    #[test]
    fn submit_response_requires_task_id() {
        let body = r#"{"success": true}"#;
        assert!(serde_json::from_str::<SubmitResponse>(body).is_err());
    }

    #[test]
    fn disabled_workers_encode_comma_joined() {
        let names = ["legacy".to_string(), "ole".to_string()];
        assert_eq!(encode_disabled_workers(&names), "legacy,ole");
        assert_eq!(encode_disabled_workers(&[]), "");
    }
}
