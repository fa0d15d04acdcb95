//! Sample plug served by the binary
//!
//! Two versions of a small weather plug. Version `2.0.0` drops the prompt and
//! resource and adds `units`, so both a full and a tools-only version are served.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Config;
use crate::domain::{
    prompt, resource, tool, HandlerError, PromptPayload, PromptReply, ResourcePayload,
    ToolPayload, ToolReturn,
};
use crate::mcp::rpc::McpError;
use crate::registry::{RegistryError, Server, Version};
use crate::schema::Typed;

#[derive(Debug, Deserialize, Serialize)]
struct WeatherQuery {
    city: String,
    #[serde(default = "default_units")]
    units: String,
}

fn default_units() -> String {
    "metric".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
struct SearchQuery {
    query: String,
    #[serde(rename = "_GOOGLE_API_KEY")]
    api_key: String,
}

fn forecast(city: &str, units: &str) -> serde_json::Value {
    let temperature = if units == "imperial" { 70 } else { 21 };
    json!({ "city": city, "temperature": temperature, "units": units, "conditions": "sunny" })
}

fn weather_v1() -> Result<Version, RegistryError> {
    let get_weather = tool("Current weather for a city")
        .input(Typed::<WeatherQuery>::new(json!({
            "type": "object",
            "properties": { "city": { "type": "string", "description": "City name" } },
            "required": ["city"]
        })))
        .cost(1)
        .handle(|payload: ToolPayload| async move {
            let query: WeatherQuery = payload.input_as().map_err(HandlerError::from)?;
            if query.city.trim().is_empty() {
                return Ok::<_, HandlerError>(payload.error("city must not be empty"));
            }
            Ok(ToolReturn::json(&forecast(&query.city, &query.units)))
        });

    let search_web = tool("Search the web")
        .input(Typed::<SearchQuery>::new(json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "_GOOGLE_API_KEY": { "type": "string" }
            },
            "required": ["query", "_GOOGLE_API_KEY"]
        })))
        .cost(5)
        .handle(|payload: ToolPayload| async move {
            let query: SearchQuery = payload.input_as().map_err(HandlerError::from)?;
            Ok::<_, HandlerError>(ToolReturn::json(&json!({
                "query": query.query,
                "authenticated": !query.api_key.is_empty(),
                "results": []
            })))
        });

    let summary = prompt("Summarize the forecast for a city")
        .input(Typed::<WeatherQuery>::new(json!({
            "type": "object",
            "properties": { "city": { "type": "string", "description": "City name" } },
            "required": ["city"]
        })))
        .handle(|payload: PromptPayload| async move {
            let query: WeatherQuery = payload
                .input_as()
                .map_err(|err| payload.invalid_params(err.to_string()))?;
            Ok::<_, McpError>(
                PromptReply::new(format!(
                    "Write a one paragraph weather summary for {}.",
                    query.city
                ))
                .description("Forecast summary"),
            )
        });

    let about = resource("What this plug does")
        .uri("resource://weather/about")
        .mime_type("text/markdown")
        .handle(|_payload: ResourcePayload| async move {
            Ok::<_, McpError>("# Weather plug\n\nCurrent conditions and web search.")
        });

    Version::builder("1.0.0")
        .name("Weather")
        .tool("get_weather", get_weather)
        .tool("search_web", search_web)
        .prompt("forecast_summary", summary)
        .resource("about", about)
        .build()
}

fn weather_v2() -> Result<Version, RegistryError> {
    let get_weather = tool("Current weather for a city, in the requested units")
        .input(Typed::<WeatherQuery>::new(json!({
            "type": "object",
            "properties": {
                "city": { "type": "string" },
                "units": { "type": "string", "enum": ["metric", "imperial"] }
            },
            "required": ["city"]
        })))
        .handle(|payload: ToolPayload| async move {
            let query: WeatherQuery = payload.input_as().map_err(HandlerError::from)?;
            Ok::<_, HandlerError>(ToolReturn::json(&forecast(&query.city, &query.units)))
        });

    let whoami = tool("Session and user ids of the caller").handle(|payload: ToolPayload| async move {
        Ok::<_, HandlerError>(json!({
            "sessionId": payload.session_id(),
            "userId": payload.user_id(),
        }))
    });

    Version::builder("2.0.0")
        .tool("get_weather", get_weather)
        .tool("whoami", whoami)
        .build()
}

pub fn demo_server(config: &Config) -> Result<Server, RegistryError> {
    Server::builder(config.api_token.clone())
        .id(config.plug_id.clone())
        .constants(config.constants.clone())
        .version(weather_v1()?)
        .version(weather_v2()?)
        .build()
}
