//! StoryContract extraction and validation.
//!
//! A StoryContract lives in the YAML front matter of a story document under
//! the `StoryContract` key. Validation runs it through a JSON Schema and
//! collects every violation rather than stopping at the first.

use crate::error::{Result, SemadError};
use jsonschema::error::ValidationErrorKind;
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::sync::OnceLock;

pub const CONTRACT_KEY: &str = "StoryContract";

pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

// ---------------------------------------------------------------------------
// Typed contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryContract {
    pub version: String,
    pub story_id: String,
    pub epic_id: String,
    #[serde(rename = "apiEndpoints")]
    pub api_endpoints: Vec<ApiEndpoint>,
    #[serde(rename = "filesToModify")]
    pub files_to_modify: Vec<FileToModify>,
    #[serde(rename = "acceptanceCriteriaLinks", default)]
    pub acceptance_criteria_links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    pub method: HttpMethod,
    pub path: String,
    pub description: String,
    pub request_body: Map<String, Value>,
    pub success_response: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileToModify {
    pub path: String,
    pub reason: String,
}

impl StoryContract {
    /// Validate `value` and convert it into a typed contract.
    ///
    /// Fails with `InvalidContract` carrying the formatted diagnostics.
    pub fn from_value(story: &str, value: &Value) -> Result<Self> {
        let report = validate(value);
        if !report.valid {
            return Err(SemadError::InvalidContract {
                story: story.to_string(),
                details: format_errors(&report.errors),
            });
        }
        Ok(serde_json::from_value(value.clone())?)
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Return the raw front-matter block of `document`, if it has one.
///
/// The block must open with a `---` line as the first non-blank line and
/// close with the next `---` line.
pub fn front_matter(document: &str) -> Option<&str> {
    split_front_matter(document).map(|(block, _)| block)
}

/// Split `document` into its front-matter block and the body that follows
/// the closing delimiter.
pub fn split_front_matter(document: &str) -> Option<(&str, &str)> {
    let trimmed = document.trim_start_matches('\u{feff}').trim_start();
    let rest = trimmed.strip_prefix("---")?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Extract the `StoryContract` value from a document's front matter.
///
/// Returns `Ok(None)` when the document has no front matter or the front
/// matter has no `StoryContract` key. Malformed YAML is an error.
pub fn extract_contract(document: &str) -> Result<Option<Value>> {
    extract_contract_named(document, "<document>")
}

/// Read `path` and extract its contract.
pub fn extract_contract_from_file(path: &Path) -> Result<Option<Value>> {
    let document = std::fs::read_to_string(path)?;
    extract_contract_named(&document, &path.display().to_string())
}

fn extract_contract_named(document: &str, origin: &str) -> Result<Option<Value>> {
    let Some(block) = front_matter(document) else {
        return Ok(None);
    };
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(block).map_err(|e| SemadError::ContractParse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
    let Some(contract) = parsed.get(CONTRACT_KEY) else {
        return Ok(None);
    };
    let value = serde_json::to_value(contract).map_err(|e| SemadError::ContractParse {
        origin: origin.to_string(),
        message: format!("StoryContract is not representable as JSON: {e}"),
    })?;
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// What a single validation failure violated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "keyword", rename_all = "snake_case")]
pub enum Violation {
    Required { missing_property: String },
    Enum { allowed_values: Vec<String> },
    Type { expected: String, actual: String },
    Other { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractError {
    /// JSON-pointer path to the offending value (`""` is the contract root).
    pub path: String,
    #[serde(flatten)]
    pub violation: Violation,
}

impl ContractError {
    pub fn keyword(&self) -> &'static str {
        match self.violation {
            Violation::Required { .. } => "required",
            Violation::Enum { .. } => "enum",
            Violation::Type { .. } => "type",
            Violation::Other { .. } => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ContractError>,
}

/// JSON Schema for the `StoryContract` front-matter value.
pub fn contract_schema() -> Value {
    json!({
        "type": "object",
        "required": ["version", "story_id", "epic_id", "apiEndpoints", "filesToModify"],
        "properties": {
            "version": { "type": "string" },
            "story_id": { "type": "string" },
            "epic_id": { "type": "string" },
            "apiEndpoints": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["method", "path", "description", "requestBody", "successResponse"],
                    "properties": {
                        "method": { "type": "string", "enum": HTTP_METHODS },
                        "path": { "type": "string" },
                        "description": { "type": "string" },
                        "requestBody": { "type": "object" },
                        "successResponse": { "type": "object" }
                    }
                }
            },
            "filesToModify": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["path", "reason"],
                    "properties": {
                        "path": { "type": "string" },
                        "reason": { "type": "string" }
                    }
                }
            },
            "acceptanceCriteriaLinks": {
                "type": "array",
                "items": { "type": "string" }
            }
        }
    })
}

struct CompiledSchema {
    schema: Value,
    validator: Validator,
}

fn compiled() -> &'static CompiledSchema {
    static COMPILED: OnceLock<CompiledSchema> = OnceLock::new();
    COMPILED.get_or_init(|| {
        let schema = contract_schema();
        let validator = Validator::new(&schema).unwrap();
        CompiledSchema { schema, validator }
    })
}

pub fn validate(contract: &Value) -> ValidationReport {
    let compiled = compiled();
    let mut errors: Vec<ContractError> = Vec::new();
    let mut required_seen: Vec<String> = Vec::new();

    for err in compiled.validator.iter_errors(contract) {
        let path = normalize_path(&err.instance_path().to_string());
        let node = schema_at(&compiled.schema, &path);
        match err.kind() {
            ValidationErrorKind::Required { .. } => {
                // One entry per missing property, in schema order, however
                // the validator groups them.
                if required_seen.contains(&path) {
                    continue;
                }
                errors.extend(missing_properties(node, contract.pointer(&path)).into_iter().map(
                    |missing_property| ContractError {
                        path: path.clone(),
                        violation: Violation::Required { missing_property },
                    },
                ));
                required_seen.push(path);
            }
            ValidationErrorKind::Enum { .. } => errors.push(ContractError {
                violation: Violation::Enum {
                    allowed_values: string_list(node.and_then(|n| n.get("enum"))),
                },
                path,
            }),
            ValidationErrorKind::Type { .. } => errors.push(ContractError {
                violation: Violation::Type {
                    expected: node
                        .and_then(|n| n.get("type"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                    actual: contract
                        .pointer(&path)
                        .map(json_type_name)
                        .unwrap_or("missing")
                        .to_string(),
                },
                path,
            }),
            _ => errors.push(ContractError {
                violation: Violation::Other {
                    message: err.to_string(),
                },
                path,
            }),
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// The contract root reports as `""`.
fn normalize_path(path: &str) -> String {
    if path == "/" {
        String::new()
    } else {
        path.to_string()
    }
}

/// Walk the schema alongside a JSON-pointer instance path.
fn schema_at<'a>(schema: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('/')
        .skip(1)
        .try_fold(schema, |node, segment| {
            node.get("properties")
                .and_then(|p| p.get(segment))
                .or_else(|| node.get("items"))
        })
}

fn missing_properties(node: Option<&Value>, instance: Option<&Value>) -> Vec<String> {
    let present = instance.and_then(Value::as_object);
    string_list(node.and_then(|n| n.get("required")))
        .into_iter()
        .filter(|key| !present.is_some_and(|obj| obj.contains_key(key)))
        .collect()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Render one human-readable line (or two, for enum/type) per error.
pub fn format_errors(errors: &[ContractError]) -> String {
    if errors.is_empty() {
        return "No errors".to_string();
    }
    errors
        .iter()
        .map(|e| {
            let path = if e.path.is_empty() { "/" } else { &e.path };
            match &e.violation {
                Violation::Required { missing_property } => {
                    format!("Missing required field: {missing_property}")
                }
                Violation::Enum { allowed_values } => format!(
                    "Invalid value at {path}\n  Allowed values: {}",
                    allowed_values.join(", ")
                ),
                Violation::Type { expected, actual } => {
                    format!("Invalid type at {path}\n  expected {expected}, got {actual}")
                }
                Violation::Other { message } => {
                    format!("Validation error at {path}: {message}")
                }
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
