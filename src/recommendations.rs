//! Rule-based advice derived from predictions and the profile.
//!
//! Rules live in static tables. Nutrient rules fire for every Moderate or High
//! prediction; lifestyle rules run once per request. Every matching rule
//! contributes, in table order, with no de-duplication.

use serde::{Deserialize, Serialize};

use crate::predictor::NutrientPrediction;
use crate::profile::UserProfile;
use crate::scores::RiskCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Medical,
    Dietary,
    Lifestyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn for_risk(category: RiskCategory) -> Self {
        match category {
            RiskCategory::High => Self::High,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: Category,
    pub priority: Priority,
    pub recommendation: String,
    pub rationale: String,
}

/// Which rule group a prediction label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nutrient {
    VitaminB12,
    Iron,
    VitaminD,
}

impl Nutrient {
    /// Resolve from a display label. Checked in order, first match wins.
    pub fn from_label(label: &str) -> Option<Self> {
        if label.contains("B12") {
            Some(Self::VitaminB12)
        } else if label.contains("Iron") || label.contains("Anemia") {
            Some(Self::Iron)
        } else if label.contains("Vitamin D") {
            Some(Self::VitaminD)
        } else {
            None
        }
    }

    fn rules(self) -> &'static [NutrientRule] {
        match self {
            Self::VitaminB12 => B12_RULES,
            Self::Iron => IRON_RULES,
            Self::VitaminD => VITAMIN_D_RULES,
        }
    }
}

// ---------------------------------------------------------------------------
// Nutrient rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Condition {
    Always,
    HighRisk,
    Female,
}

#[derive(Debug, Clone, Copy)]
enum RulePriority {
    FromRisk,
    Fixed(Priority),
}

struct NutrientRule {
    when: Condition,
    category: Category,
    priority: RulePriority,
    recommendation: &'static str,
    /// `{category}` and `{score}` are substituted from the prediction.
    rationale: &'static str,
}

const B12_RULES: &[NutrientRule] = &[
    NutrientRule {
        when: Condition::HighRisk,
        category: Category::Medical,
        priority: RulePriority::FromRisk,
        recommendation: "Discuss B12 testing and possible supplementation with a healthcare professional. \
            High-dose B12 supplements (commonly 1000 μg) are available over-the-counter, \
            but dosage should be clinically guided.",
        rationale: "High predicted risk of B12 deficiency (risk score: {score})",
    },
    NutrientRule {
        when: Condition::Always,
        category: Category::Dietary,
        priority: RulePriority::FromRisk,
        recommendation: "Increase B12-rich foods such as fortified cereals, dairy products, eggs, fish, \
            and lean meats.",
        rationale: "Vitamin B12 is primarily obtained from animal products and fortified foods.",
    },
];

const IRON_RULES: &[NutrientRule] = &[
    NutrientRule {
        when: Condition::Always,
        category: Category::Dietary,
        priority: RulePriority::FromRisk,
        recommendation: "Increase intake of iron-rich foods such as lean red meat, poultry, fish, \
            legumes, dark leafy greens, and fortified cereals.",
        rationale: "{category} predicted risk of anemia/iron deficiency (risk score: {score}).",
    },
    // no dosage advice; supplementation needs clinical assessment
    NutrientRule {
        when: Condition::Female,
        category: Category::Medical,
        priority: RulePriority::FromRisk,
        recommendation: "Consider discussing iron supplementation with a healthcare provider. \
            Women often have higher iron requirements, but supplementation should \
            only be started after clinical evaluation.",
        rationale: "Additional iron needs may occur due to menstrual blood loss.",
    },
    NutrientRule {
        when: Condition::Always,
        category: Category::Dietary,
        priority: RulePriority::Fixed(Priority::Medium),
        recommendation: "Enhance iron absorption by consuming vitamin C-rich foods (e.g., citrus fruits) \
            together with iron-rich meals.",
        rationale: "Vitamin C improves non-heme iron absorption.",
    },
];

// No current target is labelled "Vitamin D".
const VITAMIN_D_RULES: &[NutrientRule] = &[
    NutrientRule {
        when: Condition::Always,
        category: Category::Lifestyle,
        priority: RulePriority::FromRisk,
        recommendation: "Get regular safe sunlight exposure when possible (10–30 minutes depending on skin type). \
            Discuss vitamin D supplementation with a healthcare provider if sunlight exposure is limited.",
        rationale: "{category} predicted risk of vitamin D deficiency (risk score: {score}).",
    },
    NutrientRule {
        when: Condition::Always,
        category: Category::Dietary,
        priority: RulePriority::FromRisk,
        recommendation: "Include vitamin D-rich foods such as fatty fish (e.g., salmon, mackerel), \
            fortified dairy or plant milks, and egg yolks.",
        rationale: "Few foods naturally contain vitamin D.",
    },
];

impl NutrientRule {
    fn applies(&self, prediction: &NutrientPrediction, profile: &UserProfile) -> bool {
        match self.when {
            Condition::Always => true,
            Condition::HighRisk => prediction.risk_category == RiskCategory::High,
            Condition::Female => profile.is_female(),
        }
    }

    fn render(&self, prediction: &NutrientPrediction) -> Recommendation {
        let priority = match self.priority {
            RulePriority::FromRisk => Priority::for_risk(prediction.risk_category),
            RulePriority::Fixed(p) => p,
        };
        let rationale = self
            .rationale
            .replace("{category}", prediction.risk_category.as_str())
            .replace("{score}", &format!("{:.2}", prediction.risk_score));
        Recommendation {
            category: self.category,
            priority,
            recommendation: self.recommendation.to_string(),
            rationale,
        }
    }
}

// ---------------------------------------------------------------------------
// Lifestyle rules
// ---------------------------------------------------------------------------

struct LifestyleRule {
    applies: fn(&UserProfile) -> bool,
    category: Category,
    priority: Priority,
    recommendation: &'static str,
    rationale: fn(&UserProfile) -> String,
}

const UNDERWEIGHT_BMI: f64 = 18.5;
const OVERWEIGHT_BMI: f64 = 25.0;
const OBESE_BMI: f64 = 30.0;
const OLDER_ADULT_AGE: u32 = 65;

const LIFESTYLE_RULES: &[LifestyleRule] = &[
    LifestyleRule {
        applies: |p| p.bmi() < UNDERWEIGHT_BMI,
        category: Category::Lifestyle,
        priority: Priority::Medium,
        recommendation: "Consider speaking with a registered dietitian to develop a healthy weight-gain plan.",
        rationale: |p| format!("BMI of {:.1} is below the healthy range.", p.bmi()),
    },
    LifestyleRule {
        applies: |p| p.bmi() > OVERWEIGHT_BMI,
        category: Category::Lifestyle,
        priority: Priority::Medium,
        recommendation: "Engage in regular physical activity and follow a balanced diet to support healthy \
            weight management.",
        rationale: |p| {
            let bmi = p.bmi();
            let degree = if bmi < OBESE_BMI { "slightly " } else { "" };
            format!("BMI of {bmi:.1} is {degree}above the healthy range.")
        },
    },
    LifestyleRule {
        applies: |p| p.age > OLDER_ADULT_AGE,
        category: Category::Medical,
        priority: Priority::Medium,
        recommendation: "Older adults may benefit from routine screening for vitamin D, B12, and iron status.",
        rationale: |_| "Nutrient absorption and dietary intake often change with age.".to_string(),
    },
    LifestyleRule {
        applies: |_| true,
        category: Category::Lifestyle,
        priority: Priority::Low,
        recommendation: "Maintain a balanced diet with a variety of food groups.",
        rationale: |_| "Dietary diversity supports adequate nutrient intake.".to_string(),
    },
];

/// All recommendations for one request, nutrient rules first.
pub fn generate_recommendations(
    predictions: &[NutrientPrediction],
    profile: &UserProfile,
) -> Vec<Recommendation> {
    let mut out = Vec::new();

    for prediction in predictions {
        if !prediction.risk_category.is_elevated() {
            continue;
        }
        let Some(nutrient) = Nutrient::from_label(&prediction.nutrient) else {
            continue;
        };
        out.extend(
            nutrient
                .rules()
                .iter()
                .filter(|rule| rule.applies(prediction, profile))
                .map(|rule| rule.render(prediction)),
        );
    }

    out.extend(
        LIFESTYLE_RULES
            .iter()
            .filter(|rule| (rule.applies)(profile))
            .map(|rule| Recommendation {
                category: rule.category,
                priority: rule.priority,
                recommendation: rule.recommendation.to_string(),
                rationale: (rule.rationale)(profile),
            }),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CountryOfBirth, Education, Gender, MaritalStatus, Race};

    fn profile(age: u32, gender: Gender, weight: f64, height: f64) -> UserProfile {
        UserProfile::new(
            age,
            gender,
            Race::OtherRace,
            weight,
            height,
            Education::HighSchoolGraduate,
            MaritalStatus::Married,
            CountryOfBirth::Us,
        )
        .unwrap()
    }

    fn prediction(nutrient: &str, risk_score: f64) -> NutrientPrediction {
        NutrientPrediction {
            nutrient: nutrient.to_string(),
            risk_score,
            risk_category: RiskCategory::from_probability(risk_score),
            confidence: risk_score,
            confidence_lower: 0.0,
            confidence_upper: 1.0,
            note: String::new(),
        }
    }

    fn healthy() -> UserProfile {
        // BMI ≈ 22.9
        profile(40, Gender::Male, 70.0, 175.0)
    }

    #[test]
    fn test_low_risk_yields_only_balanced_diet() {
        let recs = generate_recommendations(&[prediction("Vitamin B12", 0.05)], &healthy());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].category, Category::Lifestyle);
        assert_eq!(recs[0].priority, Priority::Low);
        assert_eq!(recs[0].recommendation, "Maintain a balanced diet with a variety of food groups.");
    }

    #[test]
    fn test_high_b12() {
        let recs = generate_recommendations(&[prediction("Vitamin B12", 0.62)], &healthy());
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].category, Category::Medical);
        assert_eq!(recs[0].priority, Priority::High);
        assert_eq!(recs[0].rationale, "High predicted risk of B12 deficiency (risk score: 0.62)");
        assert_eq!(recs[1].category, Category::Dietary);
        assert_eq!(recs[1].priority, Priority::High);
    }

    #[test]
    fn test_moderate_b12_skips_medical() {
        let recs = generate_recommendations(&[prediction("Vitamin B12", 0.2)], &healthy());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].category, Category::Dietary);
        assert_eq!(recs[0].priority, Priority::Medium);
    }

    #[test]
    fn test_female_high_anemia() {
        let p = profile(30, Gender::Female, 60.0, 165.0);
        let recs = generate_recommendations(&[prediction("Anemia Risk", 0.5)], &p);
        let summary: Vec<_> = recs.iter().map(|r| (r.category, r.priority)).collect();
        assert_eq!(
            summary,
            [
                (Category::Dietary, Priority::High),
                (Category::Medical, Priority::High),
                (Category::Dietary, Priority::Medium),
                (Category::Lifestyle, Priority::Low),
            ]
        );
        assert_eq!(
            recs[0].rationale,
            "High predicted risk of anemia/iron deficiency (risk score: 0.50)."
        );
    }

    #[test]
    fn test_male_moderate_iron_has_no_medical() {
        let recs = generate_recommendations(&[prediction("Iron", 0.3)], &healthy());
        assert_eq!(recs.len(), 3);
        assert!(recs.iter().all(|r| r.category != Category::Medical));
        assert!(recs[0].rationale.starts_with("Moderate predicted risk"));
    }

    #[test]
    fn test_vitamin_d_extension() {
        let recs = generate_recommendations(&[prediction("Vitamin D", 0.2)], &healthy());
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].category, Category::Lifestyle);
        assert_eq!(recs[0].priority, Priority::Medium);
        assert_eq!(recs[1].category, Category::Dietary);
    }

    #[test]
    fn test_diabetes_has_no_nutrient_rules() {
        let recs = generate_recommendations(&[prediction("Diabetes Risk (Limited)", 0.9)], &healthy());
        assert_eq!(recs.len(), 1);
        assert_eq!(Nutrient::from_label("Diabetes Risk (Limited)"), None);
    }

    #[test]
    fn test_bmi_rules() {
        // 50 / 1.8^2 ≈ 15.4
        let under = generate_recommendations(&[], &profile(40, Gender::Male, 50.0, 180.0));
        assert_eq!(under.len(), 2);
        assert_eq!(under[0].rationale, "BMI of 15.4 is below the healthy range.");

        // 80 / 1.7^2 ≈ 27.7
        let over = generate_recommendations(&[], &profile(40, Gender::Male, 80.0, 170.0));
        assert_eq!(over[0].rationale, "BMI of 27.7 is slightly above the healthy range.");

        // 100 / 1.7^2 ≈ 34.6
        let obese = generate_recommendations(&[], &profile(40, Gender::Male, 100.0, 170.0));
        assert_eq!(obese[0].rationale, "BMI of 34.6 is above the healthy range.");
    }

    #[test]
    fn test_older_adult_screening() {
        let recs = generate_recommendations(&[], &profile(70, Gender::Female, 70.0, 175.0));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].category, Category::Medical);
        assert_eq!(recs[0].priority, Priority::Medium);
        // exactly 65 does not qualify
        let recs = generate_recommendations(&[], &profile(65, Gender::Female, 70.0, 175.0));
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_deterministic_and_ordered() {
        let p = profile(70, Gender::Female, 100.0, 170.0);
        let preds = [prediction("Vitamin B12", 0.7), prediction("Anemia Risk", 0.3)];
        let a = generate_recommendations(&preds, &p);
        let b = generate_recommendations(&preds, &p);
        assert_eq!(a, b);
        // 2 B12 + 3 iron + bmi + age + balanced
        assert_eq!(a.len(), 8);
        assert_eq!(a.last().unwrap().priority, Priority::Low);
    }
}
