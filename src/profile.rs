//! User profile types and boundary validation.
//!
//! A [`UserProfile`] is only ever constructed through [`UserProfile::from_json`]
//! (or [`UserProfile::new`], which runs the same checks), so everything
//! downstream can assume ranges and categorical values are valid.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Categorical fields
// ---------------------------------------------------------------------------

/// Declares a closed categorical set whose wire form is its display label.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok($name::$variant),)+
                    _ => Err(format!(
                        "must be one of: {}",
                        [$($label),+].join(", ")
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Biological gender as recorded by the survey.
    Gender {
        Male => "Male",
        Female => "Female",
    }
);

labelled_enum!(
    /// Race/ethnicity category.
    Race {
        MexicanAmerican => "Mexican American",
        OtherHispanic => "Other Hispanic",
        NonHispanicWhite => "Non-Hispanic White",
        NonHispanicBlack => "Non-Hispanic Black",
        OtherRace => "Other Race",
    }
);

labelled_enum!(
    /// Highest education level attained.
    Education {
        LessThan9thGrade => "Less than 9th grade",
        Grade9To11 => "9-11th grade",
        HighSchoolGraduate => "High school graduate",
        SomeCollege => "Some college",
        CollegeGraduate => "College graduate or above",
    }
);

labelled_enum!(
    /// Current marital status.
    MaritalStatus {
        Married => "Married",
        Widowed => "Widowed",
        Divorced => "Divorced",
        Separated => "Separated",
        NeverMarried => "Never married",
        LivingWithPartner => "Living with partner",
    }
);

labelled_enum!(
    CountryOfBirth {
        Us => "US",
        Other => "Other",
    }
);

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

pub const MIN_AGE: i64 = 18;
pub const MAX_AGE: i64 = 120;
/// Weight bounds in kilograms (exclusive).
pub const WEIGHT_RANGE_KG: (f64, f64) = (30.0, 300.0);
/// Height bounds in centimetres (exclusive).
pub const HEIGHT_RANGE_CM: (f64, f64) = (100.0, 250.0);

/// A validated demographic/anthropometric profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub age: u32,
    pub gender: Gender,
    pub race: Race,
    /// Weight in kilograms
    pub weight: f64,
    /// Height in centimetres
    pub height: f64,
    pub education: Education,
    pub marital_status: MaritalStatus,
    pub country_of_birth: CountryOfBirth,
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All field errors found while validating a profile.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("invalid profile: {}", summarize(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }
}

impl UserProfile {
    /// Build a profile from already-typed values, enforcing the numeric ranges.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        age: u32,
        gender: Gender,
        race: Race,
        weight: f64,
        height: f64,
        education: Education,
        marital_status: MaritalStatus,
        country_of_birth: CountryOfBirth,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors { errors: Vec::new() };
        check_age(i64::from(age), &mut errors);
        check_exclusive("weight", weight, WEIGHT_RANGE_KG, &mut errors);
        check_exclusive("height", height, HEIGHT_RANGE_CM, &mut errors);
        if !errors.errors.is_empty() {
            return Err(errors);
        }
        Ok(Self {
            age,
            gender,
            race,
            weight,
            height,
            education,
            marital_status,
            country_of_birth,
        })
    }

    /// Validate a JSON request body, collecting every field-level problem.
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors { errors: Vec::new() };

        let Some(obj) = body.as_object() else {
            errors.push("body", "expected a JSON object");
            return Err(errors);
        };

        let age = match obj.get("age") {
            None => {
                errors.push("age", "field required");
                None
            }
            Some(v) => match integer_value(v) {
                Some(n) if check_age(n, &mut errors) => Some(n as u32),
                Some(_) => None,
                None => {
                    errors.push("age", "value is not a valid integer");
                    None
                }
            },
        };

        let weight = number_field(obj, "weight", WEIGHT_RANGE_KG, &mut errors);
        let height = number_field(obj, "height", HEIGHT_RANGE_CM, &mut errors);
        let gender = label_field::<Gender>(obj, "gender", &mut errors);
        let race = label_field::<Race>(obj, "race", &mut errors);
        let education = label_field::<Education>(obj, "education", &mut errors);
        let marital_status = label_field::<MaritalStatus>(obj, "marital_status", &mut errors);
        let country_of_birth = label_field::<CountryOfBirth>(obj, "country_of_birth", &mut errors);

        match (
            age,
            gender,
            race,
            weight,
            height,
            education,
            marital_status,
            country_of_birth,
        ) {
            (
                Some(age),
                Some(gender),
                Some(race),
                Some(weight),
                Some(height),
                Some(education),
                Some(marital_status),
                Some(country_of_birth),
            ) if errors.errors.is_empty() => Ok(Self {
                age,
                gender,
                race,
                weight,
                height,
                education,
                marital_status,
                country_of_birth,
            }),
            _ => Err(errors),
        }
    }

    /// Body mass index, see [`crate::features::bmi`].
    pub fn bmi(&self) -> f64 {
        crate::features::bmi(self.weight, self.height)
    }

    pub fn is_female(&self) -> bool {
        self.gender == Gender::Female
    }
}

fn check_age(age: i64, errors: &mut ValidationErrors) -> bool {
    if (MIN_AGE..=MAX_AGE).contains(&age) {
        true
    } else {
        errors.push(
            "age",
            format!("must be between {MIN_AGE} and {MAX_AGE} (got {age})"),
        );
        false
    }
}

fn check_exclusive(field: &str, value: f64, (lo, hi): (f64, f64), errors: &mut ValidationErrors) -> bool {
    if value.is_finite() && value > lo && value < hi {
        true
    } else {
        errors.push(field, format!("must be greater than {lo} and less than {hi} (got {value})"));
        false
    }
}

/// Integers, plus floats with no fractional part (`35.0`).
fn integer_value(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

fn number_field(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    range: (f64, f64),
    errors: &mut ValidationErrors,
) -> Option<f64> {
    match obj.get(field) {
        None => {
            errors.push(field, "field required");
            None
        }
        Some(v) => match v.as_f64() {
            Some(n) if check_exclusive(field, n, range, errors) => Some(n),
            Some(_) => None,
            None => {
                errors.push(field, "value is not a valid number");
                None
            }
        },
    }
}

fn label_field<T: FromStr<Err = String>>(
    obj: &serde_json::Map<String, Value>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<T> {
    match obj.get(field) {
        None => {
            errors.push(field, "field required");
            None
        }
        Some(Value::String(s)) => match s.parse::<T>() {
            Ok(v) => Some(v),
            Err(msg) => {
                errors.push(field, msg);
                None
            }
        },
        Some(_) => {
            errors.push(field, "value is not a valid string");
            None
        }
    }
}
