use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const UNKNOWN_FOOD: &str = "Unknown Food";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoodComponent {
    pub name: String,
    pub calories: f64,
}

/// One nutrition estimate for a meal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionData {
    pub food_name: String,
    pub calories: f64,
    pub fat: f64,
    pub sugar: f64,
    pub components: Vec<FoodComponent>,
}

impl NutritionData {
    /// The sentinel for a meal the model could not identify.
    pub fn unknown() -> Self {
        Self {
            food_name: UNKNOWN_FOOD.to_string(),
            calories: 0.0,
            fat: 0.0,
            sugar: 0.0,
            components: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.food_name == UNKNOWN_FOOD
    }

    /// Only identified meals with a positive calorie estimate are written to the journal.
    pub fn is_journalable(&self) -> bool {
        !self.is_unknown() && self.calories > 0.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(flatten)]
    pub nutrition: NutritionData,
    pub image_base64: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartDataPoint {
    pub name: String,
    pub calories: f64,
    pub fat: f64,
    pub sugar: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportPeriod::Daily => "DAILY",
            ReportPeriod::Weekly => "WEEKLY",
            ReportPeriod::Monthly => "MONTHLY",
        }
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(ReportPeriod::Daily),
            "WEEKLY" => Ok(ReportPeriod::Weekly),
            "MONTHLY" => Ok(ReportPeriod::Monthly),
            other => Err(format!("unknown report period '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub today: ChartDataPoint,
    pub this_week: ChartDataPoint,
    pub this_month: ChartDataPoint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_flat_camel_case_fields() {
        let entry = Entry {
            id: "a1".to_string(),
            timestamp: 1_760_000_000_123,
            nutrition: NutritionData {
                food_name: "Nasi Goreng".to_string(),
                calories: 540.5,
                fat: 21.0,
                sugar: 4.2,
                components: vec![FoodComponent {
                    name: "Fried egg".to_string(),
                    calories: 90.0,
                }],
            },
            image_base64: "data:image/jpeg;base64,AAAA".to_string(),
        };

        let v = serde_json::to_value(&entry).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["calories", "components", "fat", "foodName", "id", "imageBase64", "sugar", "timestamp"]
        );
        assert_eq!(v["foodName"], "Nasi Goreng");
        assert_eq!(v["components"][0]["name"], "Fried egg");
    }

    #[test]
    fn entry_decode_ignores_unknown_fields_and_rejects_missing_ones() {
        let ok = r#"{"id":"x","timestamp":1,"foodName":"Rice","calories":205,"fat":0.4,
            "sugar":0.1,"components":[],"imageBase64":"","mood":"happy"}"#;
        let e: Entry = serde_json::from_str(ok).unwrap();
        assert_eq!(e.nutrition.food_name, "Rice");

        let missing_sugar = r#"{"id":"x","timestamp":1,"foodName":"Rice","calories":205,"fat":0.4,
            "components":[],"imageBase64":""}"#;
        assert!(serde_json::from_str::<Entry>(missing_sugar).is_err());
    }

    #[test]
    fn journal_policy_rejects_unknown_and_zero_calorie_estimates() {
        assert!(!NutritionData::unknown().is_journalable());

        let mut water = NutritionData::unknown();
        water.food_name = "Water".to_string();
        assert!(!water.is_journalable());

        water.calories = 1.0;
        assert!(water.is_journalable());
    }

    #[test]
    fn report_period_parses_case_insensitively() {
        assert_eq!("weekly".parse::<ReportPeriod>(), Ok(ReportPeriod::Weekly));
        assert_eq!(" MONTHLY ".parse::<ReportPeriod>(), Ok(ReportPeriod::Monthly));
        assert!("yearly".parse::<ReportPeriod>().is_err());
        assert_eq!(serde_json::to_string(&ReportPeriod::Daily).unwrap(), "\"DAILY\"");
    }
}
