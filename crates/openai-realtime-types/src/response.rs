use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Cancelled,
    Failed,
    Incomplete,
}

/// The `response` object carried by `response.created` and `response.done`.
///
/// Output entries are kept as raw JSON; only their `id` is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseResource {
    pub id: String,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default)]
    pub output: Vec<Value>,
}

impl ResponseResource {
    pub fn output_ids(&self) -> Vec<String> {
        self.output
            .iter()
            .filter_map(|o| o.get("id").and_then(Value::as_str))
            .map(str::to_owned)
            .collect()
    }
}

/// One generation turn, as tracked by the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub id: String,
    pub status: ResponseStatus,
    /// Identifiers of the output items, in the order they were added.
    pub output: Vec<String>,
}

impl From<&ResponseResource> for ResponseRecord {
    fn from(resource: &ResponseResource) -> Self {
        Self {
            id: resource.id.clone(),
            status: resource.status,
            output: resource.output_ids(),
        }
    }
}
