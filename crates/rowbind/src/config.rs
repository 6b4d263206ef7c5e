//! Template configuration.

use tracing::Level;

/// Configuration for [`crate::Template`].
///
/// Only affects how statements are logged; execution semantics are fixed.
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Whether to emit an event for each prepared SQL string.
    pub log_sql: bool,
    /// Tracing event level for SQL events.
    pub sql_log_level: Level,
    /// Truncate long SQL strings (in chars). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            log_sql: true,
            sql_log_level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TemplateConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable SQL logging.
    pub fn log_sql(mut self, enabled: bool) -> Self {
        self.log_sql = enabled;
        self
    }

    /// Override the tracing event level for SQL events.
    pub fn sql_log_level(mut self, level: Level) -> Self {
        self.sql_log_level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub(crate) fn truncate_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.max_sql_length {
            Some(max) if sql.chars().count() > max => {
                let cut = sql.char_indices().nth(max).map_or(sql.len(), |(i, _)| i);
                format!("{}...", &sql[..cut]).into()
            }
            _ => sql.into(),
        }
    }

    pub(crate) fn emit_sql(&self, sql: &str) {
        if !self.log_sql {
            return;
        }

        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                    _ => tracing::debug!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(sql);
        emit_at_level!(self.sql_log_level, target: "rowbind.sql", sql = %sql, "prepare");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TemplateConfig::default();
        assert!(config.log_sql);
        assert_eq!(config.sql_log_level, Level::DEBUG);
        assert_eq!(config.max_sql_length, Some(200));
    }

    #[test]
    fn test_config_builder() {
        let config = TemplateConfig::new()
            .log_sql(false)
            .sql_log_level(Level::INFO)
            .max_sql_length(10);
        assert!(!config.log_sql);
        assert_eq!(config.sql_log_level, Level::INFO);
        assert_eq!(config.max_sql_length, Some(10));
        assert_eq!(TemplateConfig::new().no_truncate().max_sql_length, None);
    }

    #[test]
    fn test_truncation() {
        let config = TemplateConfig::new().max_sql_length(10);
        assert_eq!(config.truncate_sql("SELECT * FROM users"), "SELECT * F...");
        assert_eq!(config.truncate_sql("SELECT 1"), "SELECT 1");
        assert_eq!(
            TemplateConfig::new().max_sql_length(2).truncate_sql("ééé"),
            "éé..."
        );
    }
}
