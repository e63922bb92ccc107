//! Structured logging helpers
//!
//! Request ids and the filter string handed to `tracing_subscriber`.

pub mod middleware;

pub use middleware::generate_request_id;

/// Build filter directives string from LoggingConfig
///
/// Produces `"<level>,turnstile::<component>=<level>,..."`. Components are
/// emitted in sorted order so the result is stable.
///
/// # Examples
///
/// ```
/// use turnstile::config::{LogFormat, LoggingConfig};
/// use turnstile::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("tracker".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// assert_eq!(build_filter_directives(&config), "info,turnstile::tracker=debug");
/// ```
pub fn build_filter_directives(config: &crate::config::LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",turnstile::{}={}", component, level));
        }
    }

    filter_str
}
