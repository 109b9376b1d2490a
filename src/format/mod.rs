//! Validation and canonical formatting of rule fields.
//!
//! Names are checked against fixed regexes, PromQL expressions are parsed
//! (and optionally pretty-printed) with `promql-parser`, and durations use
//! the Prometheus syntax that accepts day, week and year units.

mod duration;
mod names;
mod promql;

pub use duration::{PromDuration, format_duration, validate_duration};
pub use names::{
    ALERT_NAME_PATTERN, GROUP_NAME_PATTERN, LABEL_NAME_PATTERN, METRIC_NAME_PATTERN,
    validate_alert_name, validate_group_name, validate_label_names, validate_metric_name,
    validate_namespace,
};
pub use promql::{format_promql_expr, validate_promql_expr};

/// Formatting switches threaded through every validator and formatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatOptions {
    /// Pretty-print PromQL expressions so comparisons ignore source layout.
    pub format_promql: bool,
}

impl FormatOptions {
    /// Creates options with PromQL formatting toggled as given.
    #[must_use]
    pub const fn new(format_promql: bool) -> Self {
        Self { format_promql }
    }

    /// Normalizes an expression according to these options.
    ///
    /// With formatting disabled the expression is returned untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if formatting is enabled and the expression does not parse.
    pub fn expr(&self, field: &str, expr: &str) -> crate::error::Result<String> {
        if self.format_promql {
            Ok(format_promql_expr(field, expr)?)
        } else {
            Ok(expr.to_string())
        }
    }
}
