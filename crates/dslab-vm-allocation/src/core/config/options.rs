//! Parsing of policy config strings.

use std::collections::HashMap;
use std::str::FromStr;

use crate::core::error::ConfigError;

/// Parses config value string, which consists of two parts - name and options.
/// Example: `StaticThreshold[over=0.8,under=0.2]` parts are name `StaticThreshold` and options string
/// `over=0.8,under=0.2`.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.trim().split_once('[') {
        Some((l, r)) => (l.trim().to_string(), Some(r.replace(']', ""))),
        None => (config_str.trim().to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match option_str.split_once('=') {
            Some((name, value)) => {
                options.insert(name.trim().to_string(), value.trim().to_string());
            }
            None => {
                return Err(ConfigError::BadOption {
                    option: option_str.to_string(),
                    value: String::new(),
                })
            }
        }
    }
    Ok(options)
}

/// Parses options of a config value, an absent options part gives an empty map.
pub fn parse_value_options(options_str: &Option<String>) -> Result<HashMap<String, String>, ConfigError> {
    match options_str {
        Some(s) => parse_options(s),
        None => Ok(HashMap::new()),
    }
}

/// Fails on the first option (in name order) that is not listed in `known`.
pub fn check_options(options: &HashMap<String, String>, known: &[&str]) -> Result<(), ConfigError> {
    match options.iter().filter(|(name, _)| !known.contains(&name.as_str())).min() {
        Some((name, value)) => Err(ConfigError::BadOption {
            option: name.clone(),
            value: value.clone(),
        }),
        None => Ok(()),
    }
}

/// Returns the parsed value of option `name` or `default` if the option is absent.
pub fn get_option<T: FromStr>(options: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError> {
    match options.get(name) {
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::BadOption {
            option: name.to_string(),
            value: value.clone(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_with_options() {
        let (name, options) = parse_config_value("StaticThreshold[over=0.8,under=0.2]");
        assert_eq!(name, "StaticThreshold");
        let options = parse_value_options(&options).unwrap();
        assert_eq!(options.get("over").unwrap(), "0.8");
        assert_eq!(options.get("under").unwrap(), "0.2");
        assert_eq!(options.get("safety"), None);
    }

    #[test]
    fn value_without_options() {
        let (name, options) = parse_config_value(" MinimumUtilization ");
        assert_eq!(name, "MinimumUtilization");
        assert!(options.is_none());
        assert!(parse_value_options(&options).unwrap().is_empty());
    }

    #[test]
    fn typed_option() {
        let options = parse_options("safety=2.5,seed=abc").unwrap();
        assert_eq!(get_option(&options, "safety", 1.).unwrap(), 2.5);
        assert_eq!(get_option(&options, "missing", 7u64).unwrap(), 7);
        assert!(get_option::<u64>(&options, "seed", 0).is_err());
    }

    #[test]
    fn unknown_option() {
        let options = parse_options("over=0.8,ovr=0.5,zz=1").unwrap();
        assert!(check_options(&options, &["over", "ovr", "zz"]).is_ok());
        match check_options(&options, &["over"]) {
            Err(ConfigError::BadOption { option, value }) => {
                assert_eq!(option, "ovr");
                assert_eq!(value, "0.5");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(check_options(&HashMap::new(), &[]).is_ok());
    }

    #[test]
    fn malformed_option() {
        assert!(parse_options("safety").is_err());
    }
}
