use super::{ClientConfig, ConfigError};

const VALID_LOG_LEVELS: &[&str] = &[
    "TRACE", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
];

/// Validate the full client config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    validate_platform(config)?;
    validate_http(config)?;
    validate_stream(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_platform(config: &ClientConfig) -> Result<(), ConfigError> {
    let platform = &config.platform;
    if platform.api_key.trim().is_empty() {
        return Err(validation_err("platform.api_key cannot be empty"));
    }
    let url = url::Url::parse(&platform.base_url)
        .map_err(|e| validation_err(format!("platform.base_url is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(validation_err(format!(
            "platform.base_url must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(validation_err("platform.base_url cannot be used as a base URL"));
    }
    if let Some(app_id) = &platform.app_id {
        if app_id.trim().is_empty() {
            return Err(validation_err("platform.app_id cannot be blank when set"));
        }
    }
    Ok(())
}

fn validate_http(config: &ClientConfig) -> Result<(), ConfigError> {
    let http = &config.http;
    if http.timeout == 0 {
        return Err(validation_err("http.timeout must be greater than 0"));
    }
    if http.connect_timeout == 0 {
        return Err(validation_err("http.connect_timeout must be greater than 0"));
    }
    if http.pool_max_idle_per_host == 0 {
        return Err(validation_err(
            "http.pool_max_idle_per_host must be greater than 0",
        ));
    }
    if let Some(proxy) = &http.proxy {
        url::Url::parse(proxy)
            .map_err(|e| validation_err(format!("http.proxy is not a valid URL: {e}")))?;
    }
    Ok(())
}

fn validate_stream(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.stream.max_frame_bytes == 0 {
        return Err(validation_err("stream.max_frame_bytes must be greater than 0"));
    }
    Ok(())
}

fn validate_log_level(config: &ClientConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid, expected one of {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}
