//! The uniform result envelope returned by every dispatched node.
//!
//! Wire shape is fixed by field presence: `code` only on errors, `metaInfo`
//! only when something was attached.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,

    pub message: String,

    #[serde(default)]
    pub data: Value,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_info: BTreeMap<String, Value>,
}

impl ApiResult {
    pub fn success(message: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            success: true,
            code: None,
            message: message.into(),
            data: data.into(),
            meta_info: BTreeMap::new(),
        }
    }

    pub fn error(code: i64, message: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            success: false,
            code: Some(code),
            message: message.into(),
            data: data.into(),
            meta_info: BTreeMap::new(),
        }
    }

    pub fn set_meta_info(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta_info.insert(key.into(), value.into());
    }

    pub fn with_meta_info(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_meta_info(key, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = ApiResult::success("ok", 42).with_meta_info("usedTime", 1.5);
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"success":true,"message":"ok","data":42,"metaInfo":{"usedTime":1.5}}"#
        );
    }

    #[test]
    fn test_error_shape() {
        let result = ApiResult::error(1001, "bad input", json!({"field": "name"}));
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"success":false,"code":1001,"message":"bad input","data":{"field":"name"}}"#
        );
    }

    #[test]
    fn test_parses_minimal_payload() {
        let parsed: ApiResult = serde_json::from_str(r#"{"success":true,"message":"m"}"#).unwrap();
        assert_eq!(parsed.data, Value::Null);
        assert!(parsed.meta_info.is_empty());
    }
}
