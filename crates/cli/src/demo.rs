//! Demo weather tools.
//!
//! `fetchWeather` runs freely; `changeWeather` has side effects and is
//! gated behind approval. Both share one [`WeatherTable`].

use runtime::model::{Message, Part, Role, ToolCall};
use runtime::{ApprovalGate, ContactHuman, FnTool, ToolError, ToolSet, ToolSpec};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub const SYSTEM_PROMPT: &str = "You are a weather assistant. Use fetchWeather to look up \
the weather in a city and changeWeather to change it. Changes need a human's approval; \
if one is rejected, explain why using the feedback you were given. When you need \
more information, ask with contact_human.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature: f64,
    pub conditions: String,
}

/// Current weather per city.
#[derive(Debug, Default)]
pub struct WeatherTable {
    cities: Mutex<BTreeMap<String, Weather>>,
}

impl WeatherTable {
    /// A table with a few cities filled in.
    pub fn seeded() -> Self {
        let cities = [
            ("Paris", 18.0, "Cloudy"),
            ("London", 14.0, "Rainy"),
            ("Tokyo", 22.0, "Clear"),
        ]
        .into_iter()
        .map(|(city, temperature, conditions)| {
            let weather = Weather {
                temperature,
                conditions: conditions.to_string(),
            };
            (city.to_string(), weather)
        })
        .collect();
        Self {
            cities: Mutex::new(cities),
        }
    }

    pub fn get(&self, city: &str) -> Result<Option<Weather>, ToolError> {
        Ok(self.lock()?.get(city).cloned())
    }

    /// Replace a city's weather, returning the previous value.
    pub fn set(&self, city: &str, weather: Weather) -> Result<Option<Weather>, ToolError> {
        Ok(self.lock()?.insert(city.to_string(), weather))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Weather>>, ToolError> {
        self.cities
            .lock()
            .map_err(|_| ToolError::Execution("weather table lock poisoned".into()))
    }
}

#[derive(Deserialize)]
struct FetchArgs {
    city: String,
}

#[derive(Deserialize)]
struct ChangeArgs {
    city: String,
    weather: Weather,
}

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

pub fn fetch_weather(table: Arc<WeatherTable>) -> FnTool {
    FnTool::new(
        ToolSpec::new(
            "fetchWeather",
            "Get the current weather in a city",
            json!({
                "type": "object",
                "properties": {"city": {"type": "string"}},
                "required": ["city"]
            }),
        ),
        move |args| {
            let table = table.clone();
            async move {
                let FetchArgs { city } = parse(args)?;
                match table.get(&city)? {
                    Some(weather) => Ok(json!({ "city": city, "weather": weather })),
                    None => Err(ToolError::Execution(format!("no weather known for {city}"))),
                }
            }
        },
    )
}

pub fn change_weather(table: Arc<WeatherTable>) -> FnTool {
    FnTool::new(
        ToolSpec::new(
            "changeWeather",
            "Change the weather in a city",
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "weather": {
                        "type": "object",
                        "properties": {
                            "temperature": {"type": "number"},
                            "conditions": {"type": "string"}
                        },
                        "required": ["temperature", "conditions"]
                    }
                },
                "required": ["city", "weather"]
            }),
        ),
        move |args| {
            let table = table.clone();
            async move {
                let ChangeArgs { city, weather } = parse(args)?;
                let previous = table.set(&city, weather.clone())?;
                tracing::info!(city = %city, conditions = %weather.conditions, "weather changed");
                Ok::<_, ToolError>(json!({ "city": city, "weather": weather, "previous": previous }))
            }
        },
    )
}

/// The demo tool set: fetch runs freely; change and contact_human wait for
/// a human.
pub fn tool_set(table: Arc<WeatherTable>, gate: &ApprovalGate) -> Result<ToolSet, ToolError> {
    let mut tools = ToolSet::new();
    tools.register(fetch_weather(table.clone()))?;
    tools.register_gated(change_weather(table), gate)?;
    tools.register_gated(ContactHuman::new(), gate)?;
    Ok(tools)
}

/// Canned replies for the scripted backend.
///
/// A fresh run asks to make Paris sunny; a resumed run just wraps up.
pub fn script(resuming: bool) -> Vec<Message> {
    if resuming {
        return vec![Message::assistant(
            "I've applied the approver's decision on the weather change.",
        )];
    }
    vec![
        Message::from_parts(
            Role::Assistant,
            vec![
                Part::text("I'll make Paris sunny."),
                Part::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "changeWeather".into(),
                    input: json!({
                        "city": "Paris",
                        "weather": {"temperature": 25, "conditions": "Sunny"}
                    }),
                }),
            ],
        ),
        Message::assistant("Paris is now sunny."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::Tool;

    #[tokio::test]
    async fn fetch_reads_table() {
        let table = Arc::new(WeatherTable::seeded());
        let out = fetch_weather(table.clone())
            .execute(json!({"city": "London"}))
            .await
            .unwrap();
        assert_eq!(out["weather"]["conditions"], "Rainy");

        let err = fetch_weather(table)
            .execute(json!({"city": "Atlantis"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn change_writes_table() {
        let table = Arc::new(WeatherTable::seeded());
        let out = change_weather(table.clone())
            .execute(json!({"city": "Paris", "weather": {"temperature": 25, "conditions": "Sunny"}}))
            .await
            .unwrap();
        assert_eq!(out["previous"]["conditions"], "Cloudy");
        assert_eq!(
            table.get("Paris").unwrap(),
            Some(Weather {
                temperature: 25.0,
                conditions: "Sunny".into()
            })
        );
    }

    #[test]
    fn seeded_table_has_cities() {
        let table = WeatherTable::seeded();
        assert_eq!(table.get("Paris").unwrap().unwrap().conditions, "Cloudy");
        assert_eq!(table.get("Tokyo").unwrap().unwrap().temperature, 22.0);
        assert_eq!(table.get("Atlantis").unwrap(), None);
    }

    #[test]
    fn contact_human_is_gated() {
        let store = Arc::new(storage::MemoryCheckpointStore::new());
        let gateway = Arc::new(approval::MemoryGateway::new());
        let gate = ApprovalGate::new(store, gateway);
        let tools = tool_set(Arc::new(WeatherTable::seeded()), &gate).unwrap();
        assert!(tools.is_gated(runtime::CONTACT_HUMAN));
        assert!(tools.is_gated("changeWeather"));
        assert!(!tools.is_gated("fetchWeather"));
    }

    #[test]
    fn scripted_run_calls_gated_tool() {
        let script = script(false);
        let calls = script[0].tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "changeWeather");
    }
}
