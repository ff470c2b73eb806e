//! Wire and form types for mess records.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// A mess record as owned by the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MessRecord {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub price: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub rating: String,
}

/// Accepts `"50"` and `50` alike; numeric fields are displayed as entered.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Field of the shared create/edit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Name,
    Location,
    Price,
    Rating,
}

impl DraftField {
    pub const ALL: [DraftField; 4] = [
        DraftField::Name,
        DraftField::Location,
        DraftField::Price,
        DraftField::Rating,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "name" => Some(Self::Name),
            "location" => Some(Self::Location),
            "price" => Some(Self::Price),
            "rating" => Some(Self::Rating),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Location => "location",
            Self::Price => "price",
            Self::Rating => "rating",
        }
    }
}

/// Client-local form values, held as typed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub name: String,
    pub location: String,
    pub price: String,
    pub rating: String,
}

impl Draft {
    pub fn from_record(record: &MessRecord) -> Self {
        Self {
            name: record.name.clone(),
            location: record.location.clone(),
            price: record.price.clone(),
            rating: record.rating.clone(),
        }
    }

    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::Name => &self.name,
            DraftField::Location => &self.location,
            DraftField::Price => &self.price,
            DraftField::Rating => &self.rating,
        }
    }

    pub fn set(&mut self, field: DraftField, value: &str) {
        let slot = match field {
            DraftField::Name => &mut self.name,
            DraftField::Location => &mut self.location,
            DraftField::Price => &mut self.price,
            DraftField::Rating => &mut self.rating,
        };
        *slot = value.to_string();
    }

    pub fn is_empty(&self) -> bool {
        DraftField::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    /// Fields left blank. Presence is the only check made before submitting.
    pub fn missing_fields(&self) -> Vec<DraftField> {
        DraftField::ALL
            .iter()
            .copied()
            .filter(|f| self.get(*f).trim().is_empty())
            .collect()
    }

    /// Request body for create and update.
    pub fn to_json(&self) -> Value {
        json!({
            "name": self.name,
            "location": self.location,
            "price": pass_through(&self.price),
            "rating": pass_through(&self.rating),
        })
    }
}

/// Numbers go out as JSON numbers, anything else as the raw text.
fn pass_through(text: &str) -> Value {
    match serde_json::from_str::<serde_json::Number>(text.trim()) {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(text.to_string()),
    }
}
