//! Static city data backing the weather and time tools.

use std::collections::HashMap;

use chrono_tz::Tz;

/// What the registry knows about a single city.
#[derive(Debug, Clone, PartialEq)]
pub struct CityEntry {
    pub weather_report: String,
    pub timezone: Tz,
}

/// Read-only lookup table keyed by normalized city name.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// afterwards, so concurrent lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct CityRegistry {
    cities: HashMap<String, CityEntry>,
}

/// Derive a registry key from user text: lowercase, then drop every space.
///
/// Only the space character is removed. Tabs, hyphens and punctuation are
/// kept, so `"new-york"` does not match `"newyork"`.
pub fn normalize_city_key(city: &str) -> String {
    city.to_lowercase().replace(' ', "")
}

impl CityRegistry {
    pub fn new() -> Self {
        Self {
            cities: HashMap::new(),
        }
    }

    /// The three cities the agent ships with.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.insert(
            "New York",
            "The weather in New York is sunny with a temperature of 45 F.",
            chrono_tz::America::New_York,
        );
        registry.insert(
            "London",
            "It's cloudy in London with a temperature of 55 F.",
            chrono_tz::Europe::London,
        );
        registry.insert(
            "Tokyo",
            "Tokyo is experiencing light rain and a temperature of 72 F.",
            chrono_tz::Asia::Tokyo,
        );
        registry
    }

    fn insert(&mut self, city: &str, weather_report: &str, timezone: Tz) {
        self.cities.insert(
            normalize_city_key(city),
            CityEntry {
                weather_report: weather_report.to_string(),
                timezone,
            },
        );
    }

    pub fn lookup(&self, city: &str) -> Option<&CityEntry> {
        self.cities.get(&normalize_city_key(city))
    }

    pub fn weather_report(&self, city: &str) -> Option<&str> {
        self.lookup(city).map(|entry| entry.weather_report.as_str())
    }

    pub fn timezone(&self, city: &str) -> Option<Tz> {
        self.lookup(city).map(|entry| entry.timezone)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cities.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
