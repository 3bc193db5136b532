//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, DispatchConfig, LogOutput, LoggingConfig, TokenKind};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_dispatch_config(&config.dispatch)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_dispatch_config(dispatch: &DispatchConfig) -> ConfigResult<()> {
    if dispatch.default_deadline_ms == Some(0) {
        return Err(ConfigError::validation(
            "dispatch.default_deadline_ms must be greater than 0 (omit it for no deadline)",
        ));
    }

    if dispatch.tokens.kind == TokenKind::Sequence && dispatch.tokens.prefix.trim().is_empty() {
        return Err(ConfigError::validation(
            "dispatch.tokens.prefix must not be empty for sequence tokens",
        ));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "logging.filters contains an empty target: {target:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_deadline_rejected() {
        let mut config = CourierConfig::default();
        config.dispatch.default_deadline_ms = Some(0);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.dispatch.default_deadline_ms = Some(1);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_sequence_prefix_rejected() {
        let mut config = CourierConfig::default();
        config.dispatch.tokens.prefix = " ".to_string();
        assert!(validate_config(&config).is_ok());

        config.dispatch.tokens.kind = TokenKind::Sequence;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = CourierConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("courier.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
