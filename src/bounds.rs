//! Declared legal domains for attribute values.
//!
//! A [`Bounds`] is attached to every attribute template. `contains` is the
//! client-side check run before a register call; `includes` checks that an
//! object template's narrowed bounds stay inside the attribute template's.
//!
//! Real-valued containment compares units textually. No unit conversion is
//! attempted, so `"cm"` bounds do not contain a `"mm"` value.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{formula_elements, BaseValue};

/// Legal domain of an attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Bounds {
    /// Closed real interval with units
    RealBounds {
        /// Lower bound (inclusive)
        lower_bound: f64,
        /// Upper bound (inclusive)
        upper_bound: f64,
        /// Units of both ends
        #[serde(default)]
        default_units: String,
    },
    /// Closed integer interval
    IntegerBounds {
        /// Lower bound (inclusive)
        lower_bound: i64,
        /// Upper bound (inclusive)
        upper_bound: i64,
    },
    /// Finite set of categories
    CategoricalBounds {
        /// Allowed categories
        categories: BTreeSet<String>,
    },
    /// Finite set of composition components
    CompositionBounds {
        /// Allowed components
        components: BTreeSet<String>,
    },
    /// Any molecular structure
    MolecularStructureBounds,
}

impl Bounds {
    /// Real interval `[lower, upper]` in `units`.
    #[must_use]
    pub fn real(lower_bound: f64, upper_bound: f64, units: impl Into<String>) -> Self {
        Self::RealBounds {
            lower_bound,
            upper_bound,
            default_units: units.into(),
        }
    }

    /// Integer interval `[lower, upper]`.
    #[must_use]
    pub const fn integer(lower_bound: i64, upper_bound: i64) -> Self {
        Self::IntegerBounds {
            lower_bound,
            upper_bound,
        }
    }

    /// Categorical set.
    #[must_use]
    pub fn categorical<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CategoricalBounds {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// Composition component set.
    #[must_use]
    pub fn composition<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CompositionBounds {
            components: components.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `value` lies inside these bounds.
    ///
    /// An [`BaseValue::Unknown`] value is contained by every bounds; a value
    /// of the wrong kind is contained by none.
    #[must_use]
    pub fn contains(&self, value: &BaseValue) -> bool {
        if matches!(value, BaseValue::Unknown) {
            return true;
        }
        match self {
            Self::RealBounds {
                lower_bound,
                upper_bound,
                default_units,
            } => {
                let within = |x: f64| x >= *lower_bound && x <= *upper_bound;
                match value {
                    BaseValue::NominalReal { nominal, units } => {
                        same_units(units, default_units) && within(*nominal)
                    }
                    BaseValue::UniformReal {
                        lower_bound: lo,
                        upper_bound: hi,
                        units,
                    } => same_units(units, default_units) && within(*lo) && within(*hi),
                    BaseValue::NormalReal { mean, units, .. } => {
                        same_units(units, default_units) && within(*mean)
                    }
                    _ => false,
                }
            }
            Self::IntegerBounds {
                lower_bound,
                upper_bound,
            } => {
                let range = *lower_bound..=*upper_bound;
                match value {
                    BaseValue::NominalInteger { nominal } => range.contains(nominal),
                    BaseValue::UniformInteger {
                        lower_bound: lo,
                        upper_bound: hi,
                    } => range.contains(lo) && range.contains(hi),
                    _ => false,
                }
            }
            Self::CategoricalBounds { categories } => match value {
                BaseValue::NominalCategorical { category } => categories.contains(category),
                BaseValue::DiscreteCategorical { probabilities } => {
                    probabilities.keys().all(|k| categories.contains(k))
                }
                _ => false,
            },
            Self::CompositionBounds { components } => match value {
                BaseValue::NominalComposition { quantities } => {
                    quantities.keys().all(|k| components.contains(k))
                }
                BaseValue::EmpiricalFormula { formula } => formula_elements(formula)
                    .iter()
                    .all(|element| components.contains(element)),
                _ => false,
            },
            Self::MolecularStructureBounds => {
                matches!(value, BaseValue::Smiles { .. } | BaseValue::Inchi { .. })
            }
        }
    }

    /// Whether every value admitted by `other` is admitted by `self`.
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::RealBounds {
                    lower_bound,
                    upper_bound,
                    default_units,
                },
                Self::RealBounds {
                    lower_bound: lo,
                    upper_bound: hi,
                    default_units: units,
                },
            ) => same_units(units, default_units) && lo >= lower_bound && hi <= upper_bound,
            (
                Self::IntegerBounds {
                    lower_bound,
                    upper_bound,
                },
                Self::IntegerBounds {
                    lower_bound: lo,
                    upper_bound: hi,
                },
            ) => lo >= lower_bound && hi <= upper_bound,
            (
                Self::CategoricalBounds { categories },
                Self::CategoricalBounds { categories: other },
            ) => other.is_subset(categories),
            (
                Self::CompositionBounds { components },
                Self::CompositionBounds { components: other },
            ) => other.is_subset(components),
            (Self::MolecularStructureBounds, Self::MolecularStructureBounds) => true,
            _ => false,
        }
    }

    /// Wire discriminant of these bounds.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::RealBounds { .. } => "real_bounds",
            Self::IntegerBounds { .. } => "integer_bounds",
            Self::CategoricalBounds { .. } => "categorical_bounds",
            Self::CompositionBounds { .. } => "composition_bounds",
            Self::MolecularStructureBounds => "molecular_structure_bounds",
        }
    }
}

fn same_units(a: &str, b: &str) -> bool {
    fn normalize(u: &str) -> &str {
        let trimmed = u.trim();
        if trimmed == "dimensionless" {
            ""
        } else {
            trimmed
        }
    }
    normalize(a) == normalize(b)
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RealBounds {
                lower_bound,
                upper_bound,
                default_units,
            } => write!(f, "[{lower_bound}, {upper_bound}] {default_units}"),
            Self::IntegerBounds {
                lower_bound,
                upper_bound,
            } => write!(f, "[{lower_bound}..={upper_bound}]"),
            Self::CategoricalBounds { categories } => {
                let names: Vec<&str> = categories.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
            Self::CompositionBounds { components } => {
                let names: Vec<&str> = components.iter().map(String::as_str).collect();
                write!(f, "composition{{{}}}", names.join(", "))
            }
            Self::MolecularStructureBounds => write!(f, "molecular structure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_real_bounds_contains() {
        let bounds = Bounds::real(0.0, 100.0, "degC");
        assert!(bounds.contains(&BaseValue::nominal_real(25.0, "degC")));
        assert!(bounds.contains(&BaseValue::nominal_real(100.0, "degC")));
        assert!(!bounds.contains(&BaseValue::nominal_real(150.0, "degC")));
        assert!(!bounds.contains(&BaseValue::nominal_real(25.0, "K")));
        assert!(!bounds.contains(&BaseValue::nominal_integer(25)));
    }

    #[test]
    fn test_uniform_real_needs_both_ends() {
        let bounds = Bounds::real(0.0, 1.0, "");
        let inside = BaseValue::UniformReal {
            lower_bound: 0.1,
            upper_bound: 0.9,
            units: String::new(),
        };
        let straddling = BaseValue::UniformReal {
            lower_bound: 0.5,
            upper_bound: 1.5,
            units: String::new(),
        };
        assert!(bounds.contains(&inside));
        assert!(!bounds.contains(&straddling));
    }

    #[test]
    fn test_dimensionless_units_match_empty() {
        let bounds = Bounds::real(0.0, 1.0, "dimensionless");
        assert!(bounds.contains(&BaseValue::nominal_real(0.5, "")));
    }

    #[test]
    fn test_integer_bounds() {
        let bounds = Bounds::integer(1, 10);
        assert!(bounds.contains(&BaseValue::nominal_integer(1)));
        assert!(!bounds.contains(&BaseValue::nominal_integer(11)));
        assert!(!bounds.contains(&BaseValue::UniformInteger {
            lower_bound: 0,
            upper_bound: 5
        }));
    }

    #[test]
    fn test_categorical_bounds() {
        let bounds = Bounds::categorical(["solid", "liquid"]);
        assert!(bounds.contains(&BaseValue::nominal_categorical("solid")));
        assert!(!bounds.contains(&BaseValue::nominal_categorical("gas")));
    }

    #[test]
    fn test_composition_bounds_with_formula() {
        let bounds = Bounds::composition(["Al", "O", "Si"]);
        assert!(bounds.contains(&BaseValue::EmpiricalFormula {
            formula: "Al2O3".to_string()
        }));
        assert!(!bounds.contains(&BaseValue::EmpiricalFormula {
            formula: "Fe2O3".to_string()
        }));
    }

    #[test]
    fn test_molecular_structure_bounds() {
        let bounds = Bounds::MolecularStructureBounds;
        assert!(bounds.contains(&BaseValue::Smiles {
            smiles: "CCO".to_string()
        }));
        assert!(!bounds.contains(&BaseValue::nominal_integer(1)));
    }

    #[test]
    fn test_unknown_always_contained() {
        assert!(Bounds::integer(0, 0).contains(&BaseValue::Unknown));
    }

    #[test]
    fn test_includes() {
        let wide = Bounds::real(0.0, 100.0, "degC");
        assert!(wide.includes(&Bounds::real(10.0, 20.0, "degC")));
        assert!(!wide.includes(&Bounds::real(-10.0, 20.0, "degC")));
        assert!(!wide.includes(&Bounds::integer(0, 1)));
        assert!(Bounds::categorical(["a", "b"]).includes(&Bounds::categorical(["a"])));
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(Bounds::real(0.0, 1.0, "m")).unwrap();
        assert_eq!(json["type"], "real_bounds");
        assert_eq!(json["default_units"], "m");
        let back: Bounds = serde_json::from_value(json).unwrap();
        assert_eq!(back, Bounds::real(0.0, 1.0, "m"));
    }
}
