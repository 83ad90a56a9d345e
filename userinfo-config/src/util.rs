use std::time::Duration;

use crate::ConfigLoadError;

/// Split a comma separated value, dropping empty segments.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|part| {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

/// Parse a comma separated list of thumbnail edge lengths.
pub fn parse_size_list(
    field: &'static str,
    raw: &str,
) -> Result<Vec<u32>, ConfigLoadError> {
    parse_csv(raw)
        .into_iter()
        .map(|part| {
            part.parse::<u32>().map_err(|_| ConfigLoadError::InvalidValue {
                field,
                value: part.clone(),
                reason: "expected a positive integer".to_string(),
            })
        })
        .collect()
}

/// Parse a human readable duration such as `750ms` or `10s`.
pub fn parse_duration(
    field: &'static str,
    raw: &str,
) -> Result<Duration, ConfigLoadError> {
    humantime::parse_duration(raw.trim()).map_err(|source| {
        ConfigLoadError::InvalidDuration {
            field,
            value: raw.to_string(),
            source,
        }
    })
}

/// Treat blank values the same as unset ones.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
