use serde::{Deserialize, Serialize};
use serde_json::Value;

const TEXT_FIELDS: [&str; 2] = ["text", "review_text"];
const REVIEW_ID_FIELD: &str = "review_id";
const CONTENT_TEXT_PREFIX: &str = "text:";

/// A search hit as the backend returns it.
///
/// The backend mixes several record layouts (plain text hits, table chunks,
/// prefixed content), so every field is optional and kept as raw JSON until
/// [`normalize`] resolves it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub table_chunk_fields: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub point_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(default)]
    pub doc_info: Option<Value>,
}

impl RawResult {
    /// Reads one element of a `data` array. Non-object elements become an
    /// empty record.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    fn chunk_fields(&self) -> Option<&[Value]> {
        match self.table_chunk_fields.as_ref()? {
            Value::Array(fields) => Some(fields),
            _ => None,
        }
    }

    fn fallback_id(&self) -> Option<String> {
        self.id
            .as_ref()
            .filter(|v| is_present(v))
            .or_else(|| self.point_id.as_ref().filter(|v| is_present(v)))
            .map(render)
    }
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_f64))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
}

/// The display-ready projection of a [`RawResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub display_text: Option<String>,
    pub id: Option<String>,
    pub score: Option<f64>,
    pub extra_fields: Vec<Field>,
    pub has_doc_info: bool,
}

impl NormalizedResult {
    /// The relevance score, if it is worth showing.
    pub fn relevance(&self) -> Option<f64> {
        self.score.filter(|s| *s > 0.0)
    }

    pub fn relevance_label(&self) -> Option<String> {
        self.relevance().map(|s| format!("{s:.2}"))
    }
}

/// Resolves display text, identifier and extra fields of a raw search hit.
pub fn normalize(raw: &RawResult) -> NormalizedResult {
    let fields = raw.chunk_fields();

    let display_text = raw
        .text
        .as_ref()
        .filter(|v| is_present(v))
        .map(render)
        .or_else(|| fields.and_then(text_from_fields))
        .or_else(|| raw.content.as_ref().and_then(content_text));

    let id = match fields {
        None => raw.fallback_id(),
        Some(fields) => match fields
            .iter()
            .find(|f| field_name(f) == Some(REVIEW_ID_FIELD))
        {
            Some(field) => field_value(field).filter(|v| !v.is_null()).map(render),
            None => raw.fallback_id(),
        },
    };

    let extra_fields = fields
        .unwrap_or_default()
        .iter()
        .filter_map(|f| {
            let name = field_name(f)?;
            if TEXT_FIELDS.contains(&name) {
                return None;
            }
            Some(Field {
                name: name.to_string(),
                value: field_value(f).map(render).unwrap_or_default(),
            })
        })
        .collect();

    NormalizedResult {
        display_text,
        id,
        score: raw.score,
        extra_fields,
        has_doc_info: raw.doc_info.as_ref().is_some_and(|v| !v.is_null()),
    }
}

fn text_from_fields(fields: &[Value]) -> Option<String> {
    let field = fields
        .iter()
        .find(|f| field_name(f).is_some_and(|name| TEXT_FIELDS.contains(&name)))?;
    field_value(field).filter(|v| is_present(v)).map(render)
}

fn content_text(content: &Value) -> Option<String> {
    if !is_present(content) {
        return None;
    }
    match content {
        Value::String(s) => Some(s.strip_prefix(CONTENT_TEXT_PREFIX).unwrap_or(s).to_string()),
        other => Some(render(other)),
    }
}

fn field_name(field: &Value) -> Option<&str> {
    field.get("field_name")?.as_str()
}

fn field_value(field: &Value) -> Option<&Value> {
    field.get("field_value")
}

/// Null, `false`, zero and the empty string count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
