//! Lookup behavior of the weather and time tools as seen by callers.

use std::sync::Arc;

use chrono::Utc;
use citycast::{CityRegistry, CityTool, ToolDispatcher, ToolRequest, ToolResult};

fn dispatcher() -> ToolDispatcher {
    ToolDispatcher::new(Arc::new(CityRegistry::builtin()))
}

#[test]
fn every_supported_city_and_variant_returns_its_report() {
    let cases = [
        (
            ["New York", "newyork", " NEW YORK ", "NewYork"],
            "The weather in New York is sunny with a temperature of 45 F.",
        ),
        (
            ["London", "london", "LONDON", " Lon don "],
            "It's cloudy in London with a temperature of 55 F.",
        ),
        (
            ["Tokyo", "tokyo", "TOKYO", "To kyo"],
            "Tokyo is experiencing light rain and a temperature of 72 F.",
        ),
    ];

    let dispatcher = dispatcher();
    for (variants, report) in cases {
        for city in variants {
            assert_eq!(
                dispatcher.get_weather(city),
                ToolResult::success(report),
                "variant {city:?}"
            );
        }
    }
}

#[test]
fn unknown_cities_echo_the_raw_input() {
    let dispatcher = dispatcher();
    for city in ["Paris", "new-york", "Tokyo, Japan", "  Berlin"] {
        match dispatcher.get_weather(city) {
            ToolResult::Error { message } => assert!(
                message.contains(&format!("'{city}'")),
                "{message} should quote {city:?}"
            ),
            other => panic!("expected an error for {city:?}, got {other:?}"),
        }
    }
}

#[test]
fn tokyo_time_matches_the_wall_clock() {
    let before = Utc::now().with_timezone(&chrono_tz::Asia::Tokyo);
    let result = dispatcher().get_current_time("Tokyo");
    let after = Utc::now().with_timezone(&chrono_tz::Asia::Tokyo);

    let expected: Vec<String> = [before, after]
        .iter()
        .map(|t| format!("The current time in Tokyo is {}", t.format("%H:%M")))
        .collect();
    assert!(result.is_success());
    assert!(
        expected.iter().any(|e| e == result.text()),
        "{} not in {expected:?}",
        result.text()
    );
}

#[test]
fn time_report_is_zero_padded_24_hour() {
    let result = dispatcher().get_current_time("london");
    let time = result
        .text()
        .strip_prefix("The current time in london is ")
        .expect("report prefix");
    let bytes = time.as_bytes();
    assert_eq!(bytes.len(), 5);
    assert_eq!(bytes[2], b':');
    let hours: u32 = time[..2].parse().unwrap();
    let minutes: u32 = time[3..].parse().unwrap();
    assert!(hours < 24 && minutes < 60);
}

#[test]
fn empty_input_never_succeeds() {
    let dispatcher = dispatcher();
    for tool in CityTool::ALL {
        assert!(!dispatcher.dispatch(&ToolRequest::new(tool, "")).is_success());
    }
}

#[tokio::test]
async fn concurrent_lookups_share_one_registry() {
    let dispatcher = dispatcher();
    let handles: Vec<_> = (0..32)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                let city = if i % 2 == 0 { "Tokyo" } else { "Nowhere" };
                dispatcher.get_weather(city).is_success()
            })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 16);
}
