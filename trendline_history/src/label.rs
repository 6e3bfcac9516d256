//! Metric labels
//!
//! A label names the quantity to pull out of a snapshot. Labels come in two
//! shapes, decided only by whether the text contains a `/`:
//!
//! * simple, `process_cpu_seconds_total`, matched against lines of the form
//!   `process_cpu_seconds_total 1.5`
//! * complex, `theia_measurements/frontend`, matched against grouped lines of
//!   the form `theia_measurements{id="0",name="frontend"} 1200`

use std::{convert::Infallible, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Separates the family from the series name in a complex label.
pub const SEPARATOR: char = '/';

/// A requested metric label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricLabel {
    /// A plain metric name, `name value`
    Simple(String),
    /// A named series within a metric family, `family{..name="name"..} value`
    Complex {
        /// The metric family, the text before the separator
        family: String,
        /// The series name carried in the `name` attribute
        name: String,
    },
}

impl MetricLabel {
    /// Build a label from its textual form.
    #[must_use]
    pub fn new(label: &str) -> Self {
        match label.split_once(SEPARATOR) {
            Some((family, name)) => Self::Complex {
                family: family.to_string(),
                name: name.to_string(),
            },
            None => Self::Simple(label.to_string()),
        }
    }

    /// The prefix a snapshot line must start with to be considered for this
    /// label.
    #[must_use]
    pub fn expected_line_start(&self) -> String {
        match self {
            Self::Simple(name) => format!("{name} "),
            Self::Complex { family, .. } => format!("{family}{{"),
        }
    }

    /// Whether this label uses the grouped exposition shape.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex { .. })
    }

    /// An identifier safe for use as an HTML element id.
    #[must_use]
    pub fn html_id(&self) -> String {
        self.to_string().replace(SEPARATOR, "_")
    }
}

impl fmt::Display for MetricLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(name) => f.write_str(name),
            Self::Complex { family, name } => write!(f, "{family}{SEPARATOR}{name}"),
        }
    }
}

impl FromStr for MetricLabel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for MetricLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for MetricLabel {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<MetricLabel> for String {
    fn from(value: MetricLabel) -> Self {
        value.to_string()
    }
}
