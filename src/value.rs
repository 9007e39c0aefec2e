//! Attribute values, possibly carrying uncertainty.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A concrete attribute value.
///
/// Real-valued variants carry a units string; an empty string means
/// dimensionless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BaseValue {
    /// A single real number
    NominalReal {
        /// Nominal value
        nominal: f64,
        /// Units
        #[serde(default)]
        units: String,
    },
    /// A real number drawn uniformly from a range
    UniformReal {
        /// Lower end of the range
        lower_bound: f64,
        /// Upper end of the range
        upper_bound: f64,
        /// Units
        #[serde(default)]
        units: String,
    },
    /// A normally distributed real number
    NormalReal {
        /// Mean
        mean: f64,
        /// Standard deviation
        std: f64,
        /// Units
        #[serde(default)]
        units: String,
    },
    /// A single integer
    NominalInteger {
        /// Nominal value
        nominal: i64,
    },
    /// An integer drawn uniformly from a range
    UniformInteger {
        /// Lower end of the range (inclusive)
        lower_bound: i64,
        /// Upper end of the range (inclusive)
        upper_bound: i64,
    },
    /// A single category
    NominalCategorical {
        /// Category name
        category: String,
    },
    /// A probability distribution over categories
    DiscreteCategorical {
        /// Category → probability
        probabilities: BTreeMap<String, f64>,
    },
    /// Component → quantity mapping
    NominalComposition {
        /// Component → quantity
        quantities: BTreeMap<String, f64>,
    },
    /// A chemical formula such as `Al2O3`
    EmpiricalFormula {
        /// Formula text
        formula: String,
    },
    /// Molecular structure as a SMILES string
    Smiles {
        /// SMILES text
        smiles: String,
    },
    /// Molecular structure as an `InChI` string
    Inchi {
        /// `InChI` text
        inchi: String,
    },
    /// Value known to exist but not recorded
    Unknown,
}

impl BaseValue {
    /// Nominal real value with units.
    #[must_use]
    pub fn nominal_real(nominal: f64, units: impl Into<String>) -> Self {
        Self::NominalReal {
            nominal,
            units: units.into(),
        }
    }

    /// Nominal integer value.
    #[must_use]
    pub const fn nominal_integer(nominal: i64) -> Self {
        Self::NominalInteger { nominal }
    }

    /// Nominal categorical value.
    #[must_use]
    pub fn nominal_categorical(category: impl Into<String>) -> Self {
        Self::NominalCategorical {
            category: category.into(),
        }
    }

    /// Units of a real-valued variant, `None` otherwise.
    #[must_use]
    pub fn units(&self) -> Option<&str> {
        match self {
            Self::NominalReal { units, .. }
            | Self::UniformReal { units, .. }
            | Self::NormalReal { units, .. } => Some(units),
            _ => None,
        }
    }

    /// Wire discriminant of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::NominalReal { .. } => "nominal_real",
            Self::UniformReal { .. } => "uniform_real",
            Self::NormalReal { .. } => "normal_real",
            Self::NominalInteger { .. } => "nominal_integer",
            Self::UniformInteger { .. } => "uniform_integer",
            Self::NominalCategorical { .. } => "nominal_categorical",
            Self::DiscreteCategorical { .. } => "discrete_categorical",
            Self::NominalComposition { .. } => "nominal_composition",
            Self::EmpiricalFormula { .. } => "empirical_formula",
            Self::Smiles { .. } => "smiles",
            Self::Inchi { .. } => "inchi",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NominalReal { nominal, units } => write!(f, "{nominal} {units}"),
            Self::UniformReal {
                lower_bound,
                upper_bound,
                units,
            } => write!(f, "U({lower_bound}, {upper_bound}) {units}"),
            Self::NormalReal { mean, std, units } => write!(f, "N({mean}, {std}) {units}"),
            Self::NominalInteger { nominal } => write!(f, "{nominal}"),
            Self::UniformInteger {
                lower_bound,
                upper_bound,
            } => write!(f, "U({lower_bound}..={upper_bound})"),
            Self::NominalCategorical { category } => write!(f, "'{category}'"),
            Self::DiscreteCategorical { probabilities } => {
                let keys: Vec<&str> = probabilities.keys().map(String::as_str).collect();
                write!(f, "{{{}}}", keys.join(", "))
            }
            Self::NominalComposition { quantities } => {
                let keys: Vec<&str> = quantities.keys().map(String::as_str).collect();
                write!(f, "composition[{}]", keys.join(", "))
            }
            Self::EmpiricalFormula { formula } => write!(f, "{formula}"),
            Self::Smiles { smiles } => write!(f, "smiles:{smiles}"),
            Self::Inchi { inchi } => write!(f, "{inchi}"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Element symbols appearing in an empirical formula, e.g. `Al2O3` → `Al`, `O`.
pub(crate) fn formula_elements(formula: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut chars = formula.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_uppercase() {
            let mut symbol = c.to_string();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    symbol.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if !elements.contains(&symbol) {
                elements.push(symbol);
            }
        }
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tag() {
        let value = BaseValue::nominal_real(2.5, "g/cm^3");
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["type"], "nominal_real");
        assert_eq!(json["units"], "g/cm^3");
        assert_eq!(value.type_name(), "nominal_real");
    }

    #[test]
    fn test_unknown_is_unit_variant() {
        let json = serde_json::to_value(BaseValue::Unknown).unwrap();
        assert_eq!(json, serde_json::json!({"type": "unknown"}));
    }

    #[test]
    fn test_formula_elements() {
        assert_eq!(formula_elements("Al2O3"), vec!["Al", "O"]);
        assert_eq!(formula_elements("(NH4)2SO4"), vec!["N", "H", "S", "O"]);
        assert!(formula_elements("").is_empty());
    }

    #[test]
    fn test_missing_units_default_to_dimensionless() {
        let value: BaseValue =
            serde_json::from_value(serde_json::json!({"type": "nominal_real", "nominal": 3}))
                .unwrap();
        assert_eq!(value.units(), Some(""));
    }
}
