//! Decoding of the vision model's nutrition reply.
//!
//! The reply is untrusted text. It is checked field by field; anything that does
//! not fit the expected shape becomes [`Estimate::Malformed`], which callers turn
//! into the "Unknown Food" sentinel instead of failing the capture flow.

use serde_json::{Map, Value};
use tracing::warn;

use crate::model::{FoodComponent, NutritionData};

#[derive(Clone, Debug, PartialEq)]
pub enum Estimate {
    Parsed(NutritionData),
    Malformed(String),
}

impl Estimate {
    pub fn into_nutrition(self) -> NutritionData {
        match self {
            Estimate::Parsed(data) => data,
            Estimate::Malformed(reason) => {
                warn!("malformed nutrition estimate: {reason}");
                NutritionData::unknown()
            }
        }
    }
}

pub fn decode_estimate(raw: &str) -> Estimate {
    let text = strip_code_fence(raw);
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(err) => return Estimate::Malformed(format!("invalid json: {err}")),
    };
    let Some(obj) = value.as_object() else {
        return Estimate::Malformed("reply is not a JSON object".to_string());
    };

    let Some(food_name) = obj.get("foodName").and_then(|v| v.as_str()) else {
        return Estimate::Malformed("missing string foodName".to_string());
    };
    let (calories, fat, sugar) = match (
        quantity(obj, "calories"),
        quantity(obj, "fat"),
        quantity(obj, "sugar"),
    ) {
        (Ok(c), Ok(f), Ok(s)) => (c, f, s),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return Estimate::Malformed(e),
    };

    Estimate::Parsed(NutritionData {
        food_name: food_name.to_string(),
        calories,
        fat,
        sugar,
        components: components(obj.get("components")),
    })
}

fn quantity(obj: &Map<String, Value>, key: &str) -> Result<f64, String> {
    match obj.get(key).and_then(|v| v.as_f64()) {
        Some(n) if n.is_finite() && n >= 0.0 => Ok(n),
        Some(n) => Err(format!("{key} out of range: {n}")),
        None => Err(format!("missing numeric {key}")),
    }
}

// Non-conforming items are dropped individually; a non-array value counts as no breakdown.
fn components(value: Option<&Value>) -> Vec<FoodComponent> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| {
                let name = item.get("name")?.as_str()?;
                let calories = item.get("calories")?.as_f64()?;
                (calories.is_finite() && calories >= 0.0).then(|| FoodComponent {
                    name: name.to_string(),
                    calories,
                })
            })
            .collect(),
        Some(other) => {
            warn!("components is not an array, ignoring: {other}");
            Vec::new()
        }
    }
}

/// Removes a surrounding markdown code fence, with or without a `json` tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_full_reply() {
        let raw = r#"{"foodName":"Fruit Salad with Yogurt","calories":250,"fat":5,"sugar":30,
            "components":[{"name":"Apple slices","calories":80},{"name":"Yogurt","calories":60}]}"#;
        let Estimate::Parsed(data) = decode_estimate(raw) else {
            panic!("expected parsed estimate");
        };
        assert_eq!(data.food_name, "Fruit Salad with Yogurt");
        assert_eq!((data.calories, data.fat, data.sugar), (250.0, 5.0, 30.0));
        assert_eq!(data.components.len(), 2);
        assert_eq!(data.components[1].name, "Yogurt");
    }

    #[test]
    fn strips_markdown_fences() {
        let raw = "```json\n{\"foodName\":\"Plain Rice\",\"calories\":205,\"fat\":0.4,\"sugar\":0.1,\"components\":[]}\n```";
        assert!(matches!(decode_estimate(raw), Estimate::Parsed(d) if d.food_name == "Plain Rice"));

        let bare = "```\n{\"foodName\":\"Tea\",\"calories\":2,\"fat\":0,\"sugar\":0}\n```";
        assert!(matches!(decode_estimate(bare), Estimate::Parsed(d) if d.components.is_empty()));
    }

    #[test]
    fn ignores_extra_fields_and_filters_bad_components() {
        let raw = r#"{"foodName":"Bowl","calories":500,"fat":10,"sugar":3,"confidence":0.4,
            "components":[{"name":"Rice","calories":200},{"name":"Egg"},{"name":7,"calories":1},
                          {"name":"Sauce","calories":"40"},{"name":"Beef","calories":300}]}"#;
        let data = decode_estimate(raw).into_nutrition();
        let names: Vec<&str> = data.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Rice", "Beef"]);
    }

    #[test]
    fn non_array_components_become_empty() {
        let raw = r#"{"foodName":"Soup","calories":120,"fat":4,"sugar":2,"components":"broth"}"#;
        let data = decode_estimate(raw).into_nutrition();
        assert_eq!(data.food_name, "Soup");
        assert!(data.components.is_empty());
    }

    #[test]
    fn wrong_types_are_malformed_and_map_to_sentinel() {
        let cases = [
            "Sorry, I can't help with that.",
            "[1,2,3]",
            r#"{"foodName":"Cake","calories":"350","fat":10,"sugar":20}"#,
            r#"{"foodName":"Cake","calories":350,"fat":10}"#,
            r#"{"foodName":null,"calories":350,"fat":10,"sugar":20}"#,
            r#"{"foodName":"Cake","calories":-5,"fat":10,"sugar":20}"#,
        ];
        for raw in cases {
            let est = decode_estimate(raw);
            assert!(matches!(est, Estimate::Malformed(_)), "accepted: {raw}");
            assert_eq!(est.into_nutrition(), NutritionData::unknown());
        }
    }

    #[test]
    fn model_sentinel_decodes_as_unknown() {
        let raw = r#"{"foodName":"Unknown Food","calories":0,"fat":0,"sugar":0,"components":[]}"#;
        let data = decode_estimate(raw).into_nutrition();
        assert!(data.is_unknown());
        assert!(!data.is_journalable());
    }
}
