// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calorie and BMI calculator.
//!
//! Base metabolism is Mifflin-St Jeor. The daily rate is base metabolism
//! times the activity coefficient; weight change assumes 250 kcal per kg
//! per month of daily deficit or surplus.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{CalculatorDraft, Gender};

/// `"<age> <height cm> <weight kg>"`, `.` or `,` as decimal separator.
static MEASUREMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:[.,]\d+)?)\s+(\d+(?:[.,]\d+)?)\s+(\d+(?:[.,]\d+)?)$")
        .expect("measurements pattern is valid")
});

const DIGESTION_SHARE: f64 = 0.1;
const KCAL_PER_KG_MONTH: f64 = 250.0;
const ADJUSTMENT_PERCENTS: [u32; 4] = [5, 10, 15, 20];

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Validate)]
pub struct Measurements {
    #[validate(range(min = 10.0, max = 120.0, message = "Age must be 10-120 years"))]
    pub age: f64,
    #[validate(range(min = 100.0, max = 250.0, message = "Height must be 100-250 cm"))]
    pub height_cm: f64,
    #[validate(range(min = 20.0, max = 400.0, message = "Weight must be 20-400 kg"))]
    pub weight_kg: f64,
}

impl Measurements {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let captures = MEASUREMENTS.captures(trimmed).ok_or_else(|| {
            AppError::BadRequest(format!("expected \"<age> <height> <weight>\", got {:?}", trimmed))
        })?;
        let number = |i: usize| -> Result<f64> {
            let value = captures[i].replace(',', ".");
            value
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid number: {}", value)))
        };
        let measurements = Self {
            age: number(1)?,
            height_cm: number(2)?,
            weight_kg: number(3)?,
        };
        measurements
            .validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        Ok(measurements)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BmiRating {
    /// 18.5 to 25
    Good,
    Medium,
    /// 15 and below, or 30 and above
    Bad,
}

/// One row of the deficit or surplus table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CalorieAdjustment {
    pub percent: u32,
    pub kcal: i64,
    pub kg_per_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculatorResult {
    pub bmi: f64,
    pub rating: BmiRating,
    pub base_metabolism_kcal: f64,
    /// Calories to keep the current weight
    pub daily_kcal: f64,
    pub digestion_kcal: f64,
    pub activity_kcal: f64,
    pub deficit: Vec<CalorieAdjustment>,
    pub surplus: Vec<CalorieAdjustment>,
}

/// Round to one decimal, half to even.
fn round1(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

pub fn bmi(weight_kg: f64, height_cm: f64) -> f64 {
    round1(weight_kg / (height_cm / 100.0).powi(2))
}

pub fn rate_bmi(bmi: f64) -> BmiRating {
    if (18.5..=25.0).contains(&bmi) {
        BmiRating::Good
    } else if bmi <= 15.0 || bmi >= 30.0 {
        BmiRating::Bad
    } else {
        BmiRating::Medium
    }
}

pub fn base_metabolism(gender: Gender, m: &Measurements) -> f64 {
    let base = round1(10.0 * m.weight_kg + 6.25 * m.height_cm - 5.0 * m.age);
    match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    }
}

pub fn calculate(draft: CalculatorDraft, m: &Measurements) -> CalculatorResult {
    let bmi = bmi(m.weight_kg, m.height_cm);
    let base = base_metabolism(draft.gender, m);
    let daily = base * draft.activity_level.coefficient();
    let digestion = round1(daily * DIGESTION_SHARE);

    let table = |sign: f64| {
        ADJUSTMENT_PERCENTS
            .iter()
            .map(|&percent| {
                let share = f64::from(percent) / 100.0;
                CalorieAdjustment {
                    percent,
                    kcal: (daily * (1.0 + sign * share)).round_ties_even() as i64,
                    kg_per_month: round1(daily * share / KCAL_PER_KG_MONTH),
                }
            })
            .collect()
    };

    CalculatorResult {
        bmi,
        rating: rate_bmi(bmi),
        base_metabolism_kcal: base,
        daily_kcal: round1(daily),
        digestion_kcal: digestion,
        activity_kcal: round1(daily - base - digestion),
        deficit: table(-1.0),
        surplus: table(1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityLevel;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_moderate_man() {
        let draft = CalculatorDraft {
            gender: Gender::Male,
            activity_level: ActivityLevel::Moderate,
        };
        let result = calculate(draft, &Measurements::parse("20 185 75").unwrap());

        assert!(close(result.bmi, 21.9));
        assert_eq!(result.rating, BmiRating::Good);
        assert!(close(result.base_metabolism_kcal, 1811.2));
        assert!(close(result.daily_kcal, 2807.4));
        assert!(close(result.digestion_kcal, 280.7));
        assert!(close(result.activity_kcal, 715.5));

        assert_eq!(result.deficit[0].percent, 5);
        assert_eq!(result.deficit[0].kcal, 2667);
        assert!(close(result.deficit[0].kg_per_month, 0.6));
        assert_eq!(result.deficit[3].kcal, 2246);
        assert!(close(result.deficit[3].kg_per_month, 2.2));
        assert_eq!(result.surplus[1].kcal, 3088);
        assert!(close(result.surplus[1].kg_per_month, 1.1));
    }

    #[test]
    fn test_gender_term() {
        let m = Measurements::parse("30 170 60,5").unwrap();
        let male = base_metabolism(Gender::Male, &m);
        let female = base_metabolism(Gender::Female, &m);
        assert!(close(male - female, 166.0));
    }

    #[test]
    fn test_bmi_rating_bounds() {
        assert_eq!(rate_bmi(18.5), BmiRating::Good);
        assert_eq!(rate_bmi(25.0), BmiRating::Good);
        assert_eq!(rate_bmi(27.0), BmiRating::Medium);
        assert_eq!(rate_bmi(16.0), BmiRating::Medium);
        assert_eq!(rate_bmi(15.0), BmiRating::Bad);
        assert_eq!(rate_bmi(30.0), BmiRating::Bad);
    }

    #[test]
    fn test_measurements_are_validated() {
        for raw in ["20 185", "20 185 75 1", "-20 185 75", "20 185 5", "abc"] {
            assert!(
                matches!(Measurements::parse(raw), Err(AppError::BadRequest(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
