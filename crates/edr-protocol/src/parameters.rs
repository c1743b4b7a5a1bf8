//! Parameter metadata types for EDR collections.
//!
//! Parameters describe the data variables available within a collection,
//! including their units and descriptive metadata.

use serde::{Deserialize, Serialize};

/// A parameter (observed property) available in a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    /// The type of parameter (always "Parameter").
    #[serde(rename = "type")]
    pub type_: String,

    /// Unique identifier for the parameter.
    pub id: String,

    /// Human-readable label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Longer description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The observed property.
    #[serde(rename = "observedProperty")]
    pub observed_property: ObservedProperty,

    /// Unit of measurement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
}

impl Parameter {
    /// Create a new parameter.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            type_: "Parameter".to_string(),
            id: id.into(),
            label: Some(label.clone()),
            description: None,
            observed_property: ObservedProperty {
                id: None,
                label,
            },
            unit: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        let desc = desc.into();
        if !desc.is_empty() {
            self.description = Some(desc);
        }
        self
    }

    /// Set the CF standard name as the observed property id.
    pub fn with_standard_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.observed_property.id = Some(format!(
                "http://vocab.nerc.ac.uk/standard_name/{}",
                name
            ));
        }
        self
    }

    /// Set the unit from symbol.
    pub fn with_unit_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.unit = Some(Unit::from_symbol(symbol));
        self
    }
}

/// The observed property being measured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservedProperty {
    /// URI identifier for the property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable label.
    pub label: String,
}

/// Unit of measurement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Unit {
    /// Human-readable label for the unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Symbol or abbreviation.
    pub symbol: String,
}

impl Unit {
    /// Create a unit from a symbol string.
    pub fn from_symbol(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let label = match symbol.as_str() {
            "m" => Some("Meters"),
            "s" => Some("Seconds"),
            "degrees" | "deg" | "°" => Some("Degrees"),
            "m/s" | "m s-1" => Some("Meters per second"),
            _ => None,
        };
        Self {
            label: label.map(str::to_string),
            symbol,
        }
    }
}
