//! Command types and their parameters
//!
//! The control plane submits a command name plus a loose JSON parameter
//! object. [`CommandKind::parse`] turns that into a tagged union where each
//! variant carries exactly the fields it needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of command names a vehicle understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandType {
    Arm,
    Disarm,
    Rtl,
    Land,
    Takeoff,
    Goto,
}

impl CommandType {
    pub const ALL: [CommandType; 6] = [
        CommandType::Arm,
        CommandType::Disarm,
        CommandType::Rtl,
        CommandType::Land,
        CommandType::Takeoff,
        CommandType::Goto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Arm => "ARM",
            CommandType::Disarm => "DISARM",
            CommandType::Rtl => "RTL",
            CommandType::Land => "LAND",
            CommandType::Takeoff => "TAKEOFF",
            CommandType::Goto => "GOTO",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        CommandType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| ParamError::UnknownCommand(s.to_string()))
    }
}

/// Parameters for TAKEOFF
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeoffParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Parameters for GOTO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GotoParams {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// A validated command with its type-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "UPPERCASE")]
pub enum CommandKind {
    Arm,
    Disarm,
    Rtl,
    Land,
    Takeoff(TakeoffParams),
    Goto(GotoParams),
}

/// Reasons a command submission is rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("unknown command '{0}' (expected one of ARM, DISARM, RTL, LAND, TAKEOFF, GOTO)")]
    UnknownCommand(String),

    #[error("{command} requires parameter '{field}'")]
    Missing {
        command: CommandType,
        field: &'static str,
    },

    #[error("parameter '{field}' must be numeric")]
    NotNumeric { field: &'static str },

    #[error("parameter '{field}' out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("parameters must be a JSON object")]
    NotAnObject,
}

impl CommandKind {
    /// Validate a command name and its raw parameters
    pub fn parse(command: &str, parameters: Option<&Value>) -> Result<Self, ParamError> {
        let command_type: CommandType = command.parse()?;

        let empty = Map::new();
        let params = match parameters {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(ParamError::NotAnObject),
        };

        let kind = match command_type {
            CommandType::Arm => CommandKind::Arm,
            CommandType::Disarm => CommandKind::Disarm,
            CommandType::Rtl => CommandKind::Rtl,
            CommandType::Land => CommandKind::Land,
            CommandType::Takeoff => CommandKind::Takeoff(TakeoffParams {
                altitude: number(params, "altitude", &["alt"])?,
            }),
            CommandType::Goto => {
                let latitude = number(params, "latitude", &["lat"])?.ok_or(ParamError::Missing {
                    command: command_type,
                    field: "latitude",
                })?;
                let longitude =
                    number(params, "longitude", &["lon", "lng"])?.ok_or(ParamError::Missing {
                        command: command_type,
                        field: "longitude",
                    })?;
                check_range("latitude", latitude, 90.0)?;
                check_range("longitude", longitude, 180.0)?;

                CommandKind::Goto(GotoParams {
                    latitude,
                    longitude,
                    altitude: number(params, "altitude", &["alt"])?,
                })
            }
        };

        Ok(kind)
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            CommandKind::Arm => CommandType::Arm,
            CommandKind::Disarm => CommandType::Disarm,
            CommandKind::Rtl => CommandType::Rtl,
            CommandKind::Land => CommandType::Land,
            CommandKind::Takeoff(_) => CommandType::Takeoff,
            CommandKind::Goto(_) => CommandType::Goto,
        }
    }
}

/// Read a numeric field, accepting JSON numbers and numeric strings
fn number(
    params: &Map<String, Value>,
    field: &'static str,
    aliases: &[&str],
) -> Result<Option<f64>, ParamError> {
    let value = std::iter::once(field)
        .chain(aliases.iter().copied())
        .find_map(|key| params.get(key));

    let parsed = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ParamError::NotNumeric { field }),
    }
}

fn check_range(field: &'static str, value: f64, limit: f64) -> Result<(), ParamError> {
    if value.abs() > limit {
        return Err(ParamError::OutOfRange { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_commands_ignore_parameters() {
        assert_eq!(CommandKind::parse("ARM", None).unwrap(), CommandKind::Arm);
        assert_eq!(
            CommandKind::parse("land", Some(&json!({"speed": 2}))).unwrap(),
            CommandKind::Land
        );
    }

    #[test]
    fn test_unknown_command_rejected() {
        let err = CommandKind::parse("FLIP", None).unwrap_err();
        assert_eq!(err, ParamError::UnknownCommand("FLIP".into()));
    }

    #[test]
    fn test_goto_requires_latitude_and_longitude() {
        let err = CommandKind::parse("GOTO", Some(&json!({"latitude": 37.0}))).unwrap_err();
        assert!(matches!(err, ParamError::Missing { field: "longitude", .. }));

        let err = CommandKind::parse("GOTO", None).unwrap_err();
        assert!(matches!(err, ParamError::Missing { field: "latitude", .. }));
    }

    #[test]
    fn test_goto_accepts_short_names() {
        let kind =
            CommandKind::parse("GOTO", Some(&json!({"lat": 37.7749, "lon": -122.4194}))).unwrap();
        assert_eq!(
            kind,
            CommandKind::Goto(GotoParams {
                latitude: 37.7749,
                longitude: -122.4194,
                altitude: None,
            })
        );
    }

    #[test]
    fn test_goto_rejects_non_numeric() {
        let err = CommandKind::parse("GOTO", Some(&json!({"latitude": "north", "longitude": 1})))
            .unwrap_err();
        assert_eq!(err, ParamError::NotNumeric { field: "latitude" });
    }

    #[test]
    fn test_takeoff_altitude_optional() {
        assert_eq!(
            CommandKind::parse("TAKEOFF", None).unwrap(),
            CommandKind::Takeoff(TakeoffParams { altitude: None })
        );
        assert_eq!(
            CommandKind::parse("TAKEOFF", Some(&json!({"altitude": "10"}))).unwrap(),
            CommandKind::Takeoff(TakeoffParams {
                altitude: Some(10.0)
            })
        );
    }

    #[test]
    fn test_parameters_must_be_object() {
        let err = CommandKind::parse("TAKEOFF", Some(&json!([10]))).unwrap_err();
        assert_eq!(err, ParamError::NotAnObject);
    }

    #[test]
    fn test_kind_serialization_shape() {
        let kind = CommandKind::Goto(GotoParams {
            latitude: 1.0,
            longitude: 2.0,
            altitude: Some(30.0),
        });
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "GOTO");
        assert_eq!(value["parameters"]["altitude"], 30.0);
    }
}
