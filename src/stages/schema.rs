// Stage output schemas
// One description used both to instruct the model and to validate its reply

use serde_json::{json, Map, Value};
use std::fmt;

/// Expected shape of a stage's JSON output
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String {
        description: Option<&'static str>,
    },
    Number {
        description: Option<&'static str>,
        /// Inclusive lower bound
        minimum: Option<f64>,
        /// Exclusive lower bound
        exclusive_minimum: Option<f64>,
    },
    Array {
        description: Option<&'static str>,
        items: Box<Schema>,
    },
    /// Object whose listed fields are all required; extra fields are allowed
    Object {
        description: Option<&'static str>,
        fields: Vec<(&'static str, Schema)>,
    },
    /// Any JSON value, validated downstream
    Any {
        description: Option<&'static str>,
    },
}

/// First mismatch found while validating a value
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    /// JSON path of the offending value, e.g. `$.audioMapping.tempo`
    pub path: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl Schema {
    pub fn string() -> Self {
        Schema::String { description: None }
    }

    pub fn number() -> Self {
        Schema::Number {
            description: None,
            minimum: None,
            exclusive_minimum: None,
        }
    }

    /// Number that must be >= `minimum`
    pub fn number_at_least(minimum: f64) -> Self {
        Schema::Number {
            description: None,
            minimum: Some(minimum),
            exclusive_minimum: None,
        }
    }

    /// Number that must be > `bound`
    pub fn number_above(bound: f64) -> Self {
        Schema::Number {
            description: None,
            minimum: None,
            exclusive_minimum: Some(bound),
        }
    }

    pub fn array(items: Schema) -> Self {
        Schema::Array {
            description: None,
            items: Box::new(items),
        }
    }

    pub fn object(fields: Vec<(&'static str, Schema)>) -> Self {
        Schema::Object {
            description: None,
            fields,
        }
    }

    pub fn any() -> Self {
        Schema::Any { description: None }
    }

    /// Attach a human-readable description, forwarded to the model
    pub fn describe(mut self, text: &'static str) -> Self {
        match &mut self {
            Schema::String { description }
            | Schema::Number { description, .. }
            | Schema::Array { description, .. }
            | Schema::Object { description, .. }
            | Schema::Any { description } => *description = Some(text),
        }
        self
    }

    /// Validate `value`, returning the first violation found
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<(), SchemaViolation> {
        let violation = |message: String| SchemaViolation {
            path: path.to_string(),
            message,
        };

        match self {
            Schema::Any { .. } => Ok(()),
            Schema::String { .. } => match value {
                Value::String(_) => Ok(()),
                other => Err(violation(format!("expected string, got {}", type_name(other)))),
            },
            Schema::Number {
                minimum,
                exclusive_minimum,
                ..
            } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| violation(format!("expected number, got {}", type_name(value))))?;
                if let Some(min) = minimum {
                    if n < *min {
                        return Err(violation(format!("{} is below minimum {}", n, min)));
                    }
                }
                if let Some(bound) = exclusive_minimum {
                    if n <= *bound {
                        return Err(violation(format!("{} must be greater than {}", n, bound)));
                    }
                }
                Ok(())
            }
            Schema::Array { items, .. } => {
                let elements = value
                    .as_array()
                    .ok_or_else(|| violation(format!("expected array, got {}", type_name(value))))?;
                for (i, element) in elements.iter().enumerate() {
                    items.validate_at(element, &format!("{}[{}]", path, i))?;
                }
                Ok(())
            }
            Schema::Object { fields, .. } => {
                let object = value
                    .as_object()
                    .ok_or_else(|| violation(format!("expected object, got {}", type_name(value))))?;
                for (name, schema) in fields {
                    let field_path = format!("{}.{}", path, name);
                    match object.get(*name) {
                        Some(field) => schema.validate_at(field, &field_path)?,
                        None => {
                            return Err(SchemaViolation {
                                path: field_path,
                                message: "required field is missing".to_string(),
                            })
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Render as a JSON Schema document
    pub fn to_json_schema(&self) -> Value {
        let (mut rendered, description) = match self {
            Schema::String { description } => (json!({"type": "string"}), description),
            Schema::Number {
                description,
                minimum,
                exclusive_minimum,
            } => {
                let mut number = json!({"type": "number"});
                if let Some(min) = minimum {
                    number["minimum"] = json!(min);
                }
                if let Some(bound) = exclusive_minimum {
                    number["exclusiveMinimum"] = json!(bound);
                }
                (number, description)
            }
            Schema::Array { description, items } => (
                json!({"type": "array", "items": items.to_json_schema()}),
                description,
            ),
            Schema::Object {
                description,
                fields,
            } => {
                let mut properties = Map::new();
                for (name, schema) in fields {
                    properties.insert(name.to_string(), schema.to_json_schema());
                }
                let required: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
                (
                    json!({
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }),
                    description,
                )
            }
            Schema::Any { description } => (json!({}), description),
        };

        if let Some(text) = description {
            rendered["description"] = json!(text);
        }
        rendered
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
