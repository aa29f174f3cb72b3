/// Default number of decimal places kept in metric values sent to Bedrock.
pub const DEFAULT_ROUNDING_PRECISION: u32 = 2;

/// Errors from reading the function's environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or empty.
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    /// A variable is set but does not parse.
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Bedrock settings, present only when analysis is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedrockConfig {
    pub model_id: String,
    pub region: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
}

/// Environment read once per cold start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub sender: String,
    pub recipient: String,
    pub bedrock: Option<BedrockConfig>,
    pub rounding_precision: u32,
    /// Region the function runs in; SES is called here.
    pub region: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let bedrock = match get("USE_BEDROCK") {
            Some(_) => Some(BedrockConfig {
                model_id: require("BEDROCK_MODEL_ID")?,
                region: require("BEDROCK_REGION")?,
                max_tokens: parse_u32("BEDROCK_MAX_TOKENS", &require("BEDROCK_MAX_TOKENS")?)?,
                anthropic_version: require("ANTHROPIC_VERSION")?,
            }),
            None => None,
        };

        let rounding_precision = match get("METRIC_ROUNDING_PRECISION_FOR_BEDROCK") {
            Some(value) => parse_u32("METRIC_ROUNDING_PRECISION_FOR_BEDROCK", &value)?,
            None => DEFAULT_ROUNDING_PRECISION,
        };

        Ok(Self {
            sender: require("SENDER")?,
            recipient: require("RECIPIENT")?,
            bedrock,
            rounding_precision,
            region: require("AWS_REGION")?,
        })
    }
}

fn parse_u32(name: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    const BASE: &[(&str, &str)] = &[
        ("SENDER", "alarms@example.com"),
        ("RECIPIENT", "oncall@example.com"),
        ("AWS_REGION", "eu-west-1"),
    ];

    #[test]
    fn bedrock_disabled_by_default() {
        let config = Config::from_lookup(lookup(BASE)).unwrap();
        assert_eq!(config.bedrock, None);
        assert_eq!(config.rounding_precision, 2);
        assert_eq!(config.region, "eu-west-1");
    }

    #[test]
    fn bedrock_settings_required_when_enabled() {
        let mut vars = BASE.to_vec();
        vars.push(("USE_BEDROCK", "true"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::Missing("BEDROCK_MODEL_ID"))
        ));

        vars.extend([
            ("BEDROCK_MODEL_ID", "anthropic.claude-3-sonnet-20240229-v1:0"),
            ("BEDROCK_REGION", "us-east-1"),
            ("BEDROCK_MAX_TOKENS", "4000"),
            ("ANTHROPIC_VERSION", "bedrock-2023-05-31"),
            ("METRIC_ROUNDING_PRECISION_FOR_BEDROCK", "3"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        let bedrock = config.bedrock.unwrap();
        assert_eq!(bedrock.max_tokens, 4000);
        assert_eq!(bedrock.region, "us-east-1");
        assert_eq!(config.rounding_precision, 3);
    }

    #[test]
    fn rejects_bad_numbers_and_missing_recipient() {
        let mut vars = BASE.to_vec();
        vars.push(("METRIC_ROUNDING_PRECISION_FOR_BEDROCK", "two"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::Invalid { name: "METRIC_ROUNDING_PRECISION_FOR_BEDROCK", .. })
        ));

        let vars: Vec<_> = BASE.iter().copied().filter(|(k, _)| *k != "RECIPIENT").collect();
        assert!(matches!(Config::from_lookup(lookup(&vars)), Err(ConfigError::Missing("RECIPIENT"))));
    }
}
