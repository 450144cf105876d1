//! Profile → NHANES feature vector mapping.
//!
//! The model schema is a list of NHANES variable codes loaded from the model
//! directory. Every code is resolved independently through [`FEATURE_RULES`];
//! codes without a rule become `0.0`. Categorical labels go through the code
//! tables below and fall back to a fixed default code when the label is not
//! listed. Nothing in this module can fail.

use serde::Serialize;

use crate::profile::UserProfile;

// ---------------------------------------------------------------------------
// Categorical code tables
// ---------------------------------------------------------------------------

/// Survey codes for RIDRETH3. NHANES has no code 5 in this variable.
pub const RACE_CODES: &[(&str, f64)] = &[
    ("Mexican American", 1.0),
    ("Other Hispanic", 2.0),
    ("Non-Hispanic White", 3.0),
    ("Non-Hispanic Black", 4.0),
    ("Other Race", 6.0),
];

pub const EDUCATION_CODES: &[(&str, f64)] = &[
    ("Less than 9th grade", 1.0),
    ("9-11th grade", 2.0),
    ("High school graduate", 3.0),
    ("Some college", 4.0),
    ("College graduate or above", 5.0),
];

pub const MARITAL_CODES: &[(&str, f64)] = &[
    ("Married", 1.0),
    ("Widowed", 2.0),
    ("Divorced", 3.0),
    ("Separated", 4.0),
    ("Never married", 5.0),
    ("Living with partner", 6.0),
];

pub const GENDER_CODES: &[(&str, f64)] = &[("Male", 1.0), ("Female", 2.0)];

pub const BIRTH_COUNTRY_CODES: &[(&str, f64)] = &[("US", 1.0)];

/// A categorical profile field together with its code table and fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Categorical {
    Gender,
    Race,
    Education,
    MaritalStatus,
    CountryOfBirth,
}

impl Categorical {
    fn table(self) -> &'static [(&'static str, f64)] {
        match self {
            Self::Gender => GENDER_CODES,
            Self::Race => RACE_CODES,
            Self::Education => EDUCATION_CODES,
            Self::MaritalStatus => MARITAL_CODES,
            Self::CountryOfBirth => BIRTH_COUNTRY_CODES,
        }
    }

    /// Code used when a label is missing from the table.
    pub fn default_code(self) -> f64 {
        match self {
            Self::Gender => 2.0,
            Self::Race => 6.0,
            Self::Education => 3.0,
            Self::MaritalStatus => 5.0,
            Self::CountryOfBirth => 2.0,
        }
    }

    fn label(self, profile: &UserProfile) -> &'static str {
        match self {
            Self::Gender => profile.gender.as_str(),
            Self::Race => profile.race.as_str(),
            Self::Education => profile.education.as_str(),
            Self::MaritalStatus => profile.marital_status.as_str(),
            Self::CountryOfBirth => profile.country_of_birth.as_str(),
        }
    }
}

/// Look up the survey code for a categorical label, defaulting silently.
pub fn categorical_code(field: Categorical, label: &str) -> f64 {
    field
        .table()
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, code)| *code)
        .unwrap_or_else(|| field.default_code())
}

/// Body mass index from kilograms and centimetres.
///
/// Both the BMXBMI feature and the lifestyle recommendations call this, so the
/// two always agree to the bit.
pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    let height_m = height_cm / 100.0;
    weight_kg / (height_m * height_m)
}

// ---------------------------------------------------------------------------
// Feature rules
// ---------------------------------------------------------------------------

/// Where a feature's value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureSource {
    Age,
    Weight,
    Height,
    Bmi,
    Code(Categorical),
    /// Survey metadata the user is never asked for.
    Constant(f64),
}

impl FeatureSource {
    fn resolve(self, profile: &UserProfile) -> f64 {
        match self {
            Self::Age => f64::from(profile.age),
            Self::Weight => profile.weight,
            Self::Height => profile.height,
            Self::Bmi => bmi(profile.weight, profile.height),
            Self::Code(field) => categorical_code(field, field.label(profile)),
            Self::Constant(v) => v,
        }
    }
}

/// Value assigned to schema codes that have no rule.
pub const UNMAPPED_FEATURE_VALUE: f64 = 0.0;

/// Code → (source, description). Order is irrelevant; the model schema decides
/// column order.
pub const FEATURE_RULES: &[(&str, FeatureSource, &str)] = &[
    ("RIDAGEYR", FeatureSource::Age, "Age (years)"),
    ("RIAGENDR", FeatureSource::Code(Categorical::Gender), "Gender"),
    ("RIDRETH3", FeatureSource::Code(Categorical::Race), "Race/Ethnicity"),
    ("BMXWT", FeatureSource::Weight, "Weight (kg)"),
    ("BMXHT", FeatureSource::Height, "Height (cm)"),
    ("BMXBMI", FeatureSource::Bmi, "Body Mass Index"),
    ("SDDSRVYR", FeatureSource::Constant(8.0), "Survey Year"),
    ("RIDSTATR", FeatureSource::Constant(2.0), "Interview/Examination Status"),
    ("RIDRETH1", FeatureSource::Code(Categorical::Race), "Race/Ethnicity (Detailed)"),
    ("RIDEXMON", FeatureSource::Constant(6.0), "Examination Month"),
    ("DMQMILIZ", FeatureSource::Constant(1.0), "Military Service"),
    ("DMDBORN4", FeatureSource::Code(Categorical::CountryOfBirth), "Country of Birth"),
    ("DMDCITZN", FeatureSource::Constant(1.0), "Citizenship Status"),
    ("DMDEDUC2", FeatureSource::Code(Categorical::Education), "Education Level"),
    ("DMDMARTL", FeatureSource::Code(Categorical::MaritalStatus), "Marital Status"),
    ("SIALANG", FeatureSource::Constant(1.0), "Interview Language"),
    ("SIAPROXY", FeatureSource::Constant(2.0), "Proxy Used in Interview"),
    ("SIAINTRP", FeatureSource::Constant(2.0), "Interpreter Used"),
    ("FIALANG", FeatureSource::Constant(1.0), "Family Interview Language"),
    ("FIAPROXY", FeatureSource::Constant(2.0), "Family Proxy Used"),
];

fn rule_for(code: &str) -> Option<&'static (&'static str, FeatureSource, &'static str)> {
    FEATURE_RULES.iter().find(|(c, _, _)| *c == code)
}

/// Human-readable description of a feature code, or the code itself.
pub fn describe_feature(code: &str) -> &str {
    rule_for(code).map(|(_, _, desc)| *desc).unwrap_or(code)
}

/// Resolve one schema code against a profile.
pub fn feature_value(code: &str, profile: &UserProfile) -> f64 {
    rule_for(code)
        .map(|(_, source, _)| source.resolve(profile))
        .unwrap_or(UNMAPPED_FEATURE_VALUE)
}

// ---------------------------------------------------------------------------
// Feature vector
// ---------------------------------------------------------------------------

/// A single row of model input, in schema order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == code)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

/// Map a profile onto the model schema, preserving schema order exactly.
pub fn build_feature_vector(profile: &UserProfile, schema: &[String]) -> FeatureVector {
    let values = schema
        .iter()
        .map(|code| feature_value(code, profile))
        .collect();
    FeatureVector {
        names: schema.to_vec(),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CountryOfBirth, Education, Gender, MaritalStatus, Race};

    fn profile() -> UserProfile {
        UserProfile::new(
            35,
            Gender::Female,
            Race::NonHispanicWhite,
            65.0,
            165.0,
            Education::CollegeGraduate,
            MaritalStatus::Married,
            CountryOfBirth::Us,
        )
        .unwrap()
    }

    fn schema(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_schema_order_is_preserved() {
        let codes = schema(&["BMXBMI", "UNKNOWN1", "RIDAGEYR", "SIALANG", "RIAGENDR"]);
        let fv = build_feature_vector(&profile(), &codes);
        assert_eq!(fv.names(), codes.as_slice());
        assert_eq!(fv.len(), 5);
        assert_eq!(fv.values()[1], 0.0);
        assert_eq!(fv.values()[2], 35.0);
        assert_eq!(fv.values()[3], 1.0);
        assert_eq!(fv.values()[4], 2.0);
    }

    #[test]
    fn test_every_known_code_maps() {
        let codes: Vec<String> = FEATURE_RULES.iter().map(|(c, _, _)| c.to_string()).collect();
        let fv = build_feature_vector(&profile(), &codes);
        assert_eq!(fv.get("RIDAGEYR"), Some(35.0));
        assert_eq!(fv.get("BMXWT"), Some(65.0));
        assert_eq!(fv.get("BMXHT"), Some(165.0));
        assert_eq!(fv.get("RIDRETH3"), Some(3.0));
        assert_eq!(fv.get("RIDRETH1"), Some(3.0));
        assert_eq!(fv.get("DMDEDUC2"), Some(5.0));
        assert_eq!(fv.get("DMDMARTL"), Some(1.0));
        assert_eq!(fv.get("DMDBORN4"), Some(1.0));
        assert_eq!(fv.get("SDDSRVYR"), Some(8.0));
        assert_eq!(fv.get("RIDSTATR"), Some(2.0));
        assert_eq!(fv.get("RIDEXMON"), Some(6.0));
        assert_eq!(fv.get("DMQMILIZ"), Some(1.0));
        assert_eq!(fv.get("DMDCITZN"), Some(1.0));
        assert_eq!(fv.get("FIALANG"), Some(1.0));
        assert_eq!(fv.get("SIAPROXY"), Some(2.0));
        assert_eq!(fv.get("SIAINTRP"), Some(2.0));
        assert_eq!(fv.get("FIAPROXY"), Some(2.0));
    }

    #[test]
    fn test_bmi_feature_matches_shared_helper_exactly() {
        let p = profile();
        let fv = build_feature_vector(&p, &schema(&["BMXBMI"]));
        let expected = 65.0 / (1.65 * 1.65);
        assert_eq!(fv.values()[0].to_bits(), p.bmi().to_bits());
        assert!((fv.values()[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_race_label_defaults_to_six() {
        assert_eq!(categorical_code(Categorical::Race, "Martian"), 6.0);
        assert_eq!(categorical_code(Categorical::Race, "Other Hispanic"), 2.0);
    }

    #[test]
    fn test_other_categorical_defaults() {
        assert_eq!(categorical_code(Categorical::Education, "PhD"), 3.0);
        assert_eq!(categorical_code(Categorical::MaritalStatus, "Engaged"), 5.0);
        assert_eq!(categorical_code(Categorical::CountryOfBirth, "Other"), 2.0);
        assert_eq!(categorical_code(Categorical::Gender, "Male"), 1.0);
    }

    #[test]
    fn test_describe_falls_back_to_code() {
        assert_eq!(describe_feature("BMXBMI"), "Body Mass Index");
        assert_eq!(describe_feature("LBXB12"), "LBXB12");
    }

    #[test]
    fn test_empty_schema() {
        let fv = build_feature_vector(&profile(), &[]);
        assert!(fv.is_empty());
        assert_eq!(fv.get("RIDAGEYR"), None);
    }
}
