//! Demonstration operations.
//!
//! The source ships a handful of operations (`fetch_api_data`,
//! `dict_to_string`, `json_to_string`, `async_sleep`) that reach out to the
//! network or the filesystem. Real fetch/send/transform operations are
//! external collaborators per spec §1 and are not implemented here. These
//! four are pure or filesystem-local so the Operation Registry has concrete,
//! testable implementations that exercise every Task Executor invariant
//! (retry, parameter binding, output-file relocation) without reaching into
//! out-of-scope territory.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::OperationError;
use crate::registry::Operation;

/// Returns its single parameter `value` unchanged under the key `value`.
/// Grounded on `original_source/operations/data_ops.py::dict_to_string`'s
/// pass-through shape.
pub struct Identity;

#[async_trait]
impl Operation for Identity {
    async fn invoke(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OperationError> {
        let value = params.get("value").cloned().unwrap_or(Value::Null);
        Ok(HashMap::from([("value".to_string(), value)]))
    }

    fn default_parameters(&self) -> HashMap<String, Value> {
        HashMap::from([("value".to_string(), Value::Null)])
    }
}

/// Sleeps for `seconds` then returns `{"slept": true}`. Grounded on
/// `original_source/operations/data_ops.py::async_sleep`.
pub struct SleepFor;

#[async_trait]
impl Operation for SleepFor {
    async fn invoke(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OperationError> {
        let seconds = params
            .get("seconds")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
        Ok(HashMap::from([("slept".to_string(), json!(true))]))
    }

    fn default_parameters(&self) -> HashMap<String, Value> {
        HashMap::from([("seconds".to_string(), json!(0))])
    }
}

/// Uppercases its `text` parameter. Grounded on
/// `original_source/operations/data_ops.py::json_to_string`'s plain string
/// transform shape.
pub struct Uppercase;

#[async_trait]
impl Operation for Uppercase {
    async fn invoke(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OperationError> {
        let text = params
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| OperationError::new("missing required parameter 'text'"))?;
        Ok(HashMap::from([(
            "text".to_string(),
            json!(text.to_uppercase()),
        )]))
    }

    fn default_parameters(&self) -> HashMap<String, Value> {
        HashMap::from([("text".to_string(), Value::Null)])
    }
}

/// Writes `content` to a temporary file and returns the reserved
/// `output_file_path` key, exercising the executor's artifact-relocation
/// path (spec §4.5, scenario 6). Grounded on
/// `original_source/operations/api_ops.py::fetch_api_data`'s
/// write-then-return-path shape.
pub struct WriteFile;

#[async_trait]
impl Operation for WriteFile {
    async fn invoke(
        &self,
        params: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, OperationError> {
        let content = params
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let file_name = params
            .get("file_name")
            .and_then(Value::as_str)
            .unwrap_or("output.txt")
            .to_string();

        let path = std::env::temp_dir().join(format!(
            "taskflow-{}-{}",
            uuid::Uuid::new_v4(),
            file_name
        ));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| OperationError::new(format!("failed to write output file: {e}")))?;

        Ok(HashMap::from([(
            "output_file_path".to_string(),
            json!(path.to_string_lossy().to_string()),
        )]))
    }

    fn default_parameters(&self) -> HashMap<String, Value> {
        HashMap::from([
            ("content".to_string(), json!("")),
            ("file_name".to_string(), json!("output.txt")),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_passes_value_through() {
        let params = HashMap::from([("value".to_string(), json!(42))]);
        let result = Identity.invoke(params).await.unwrap();
        assert_eq!(result["value"], json!(42));
    }

    #[tokio::test]
    async fn uppercase_transforms_text() {
        let params = HashMap::from([("text".to_string(), json!("hello"))]);
        let result = Uppercase.invoke(params).await.unwrap();
        assert_eq!(result["text"], json!("HELLO"));
    }

    #[tokio::test]
    async fn uppercase_fails_without_text() {
        let result = Uppercase.invoke(HashMap::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_file_returns_reserved_key() {
        let params = HashMap::from([("content".to_string(), json!("hi"))]);
        let result = WriteFile.invoke(params).await.unwrap();
        let path = result["output_file_path"].as_str().unwrap();
        assert!(tokio::fs::metadata(path).await.is_ok());
        tokio::fs::remove_file(path).await.ok();
    }
}
