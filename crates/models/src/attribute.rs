use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Value of a user-defined entity attribute.
///
/// Serializes untagged, so a scalar is a JSON string and a list is a JSON
/// array of strings, which is the shape the API stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(String),
    List(Vec<String>),
}

impl AttributeValue {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    /// Coerce an arbitrary JSON value coming from the server.
    ///
    /// Arrays become lists, everything else becomes a scalar; `null` is the
    /// empty scalar.
    pub fn from_wire(value: &Value) -> Self {
        match value {
            Value::Array(items) => Self::List(items.iter().map(scalar_text).collect()),
            other => Self::Scalar(scalar_text(other)),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // nested structures are kept as their JSON text
        other => other.to_string(),
    }
}

/// Ordered attribute map, insertion order is display order.
pub type Attributes = IndexMap<String, AttributeValue>;

/// Transform the raw `attributes` object of an entity record.
pub fn attributes_from_wire(raw: &serde_json::Map<String, Value>) -> Attributes {
    raw.iter()
        .map(|(name, value)| (name.clone(), AttributeValue::from_wire(value)))
        .collect()
}

/// Flat view `{ name, isList, value | items }` used by editing forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AttributeField {
    pub name: String,
    pub is_list: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
}

impl AttributeField {
    pub fn new(name: &str, value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Scalar(s) => Self {
                name: name.to_string(),
                is_list: false,
                value: Some(s.clone()),
                items: None,
            },
            AttributeValue::List(items) => Self {
                name: name.to_string(),
                is_list: true,
                value: None,
                items: Some(items.clone()),
            },
        }
    }
}

pub fn attribute_fields(attributes: &Attributes) -> Vec<AttributeField> {
    attributes
        .iter()
        .map(|(name, value)| AttributeField::new(name, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_from_wire_keeps_order_and_shapes() {
        let raw = json!({
            "العمر": 27,
            "الألقاب": ["الفارس", "حامي البوابة"],
            "الحالة": null,
            "اللون": "أزرق"
        });
        let attrs = attributes_from_wire(raw.as_object().unwrap());

        let names: Vec<_> = attrs.keys().cloned().collect();
        assert_eq!(names, vec!["العمر", "الألقاب", "الحالة", "اللون"]);
        assert_eq!(attrs["العمر"], AttributeValue::Scalar("27".into()));
        assert_eq!(attrs["الحالة"], AttributeValue::Scalar(String::new()));
        assert!(attrs["الألقاب"].is_list());
    }

    #[test]
    fn test_untagged_serialization() {
        let mut attrs = Attributes::new();
        attrs.insert("a".into(), AttributeValue::Scalar("x".into()));
        attrs.insert("b".into(), AttributeValue::List(vec!["1".into(), "2".into()]));
        assert_eq!(
            serde_json::to_value(&attrs).unwrap(),
            json!({ "a": "x", "b": ["1", "2"] })
        );
    }

    #[test]
    fn test_attribute_field_view() {
        let field = AttributeField::new("b", &AttributeValue::List(vec!["1".into()]));
        assert!(field.is_list);
        assert_eq!(field.items.as_deref(), Some(&["1".to_string()][..]));
        assert!(field.value.is_none());
    }
}
