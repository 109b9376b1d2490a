//! PromQL expression validation and pretty-printing.

use promql_parser::parser;

use crate::error::ConfigError;

/// Checks that an expression parses.
///
/// # Errors
///
/// Returns a field error carrying the parser message.
pub fn validate_promql_expr(field: &str, expr: &str) -> Result<(), ConfigError> {
    parser::parse(expr)
        .map(|_| ())
        .map_err(|message| ConfigError::InvalidExpression {
            field: field.to_string(),
            message,
        })
}

/// Parses and pretty-prints an expression, left-trimmed.
///
/// Formatting already formatted text yields the same text.
///
/// # Errors
///
/// Returns a field error if the expression does not parse.
pub fn format_promql_expr(field: &str, expr: &str) -> Result<String, ConfigError> {
    let parsed = parser::parse(expr).map_err(|message| ConfigError::InvalidExpression {
        field: field.to_string(),
        message,
    })?;
    Ok(parsed.prettify().trim_start().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_expressions() {
        for expr in [
            "cpu_usage > 80",
            "sum(rate(http_requests_total[5m])) by (job)",
            r#"up{job="node"} == 0"#,
            "histogram_quantile(0.99, sum by (le) (rate(latency_bucket[5m])))",
        ] {
            assert!(validate_promql_expr("expr", expr).is_ok(), "{expr}");
        }
    }

    #[test]
    fn test_invalid_expression_reports_field() {
        let err = validate_promql_expr("rules[0].expr", "sum(rate(x[5m]").unwrap_err();
        assert!(err.to_string().contains("rules[0].expr"));
    }

    #[test]
    fn test_format_is_idempotent() {
        for expr in [
            "cpu_usage   >   80",
            "sum(rate(http_requests_total[5m])) by (job)",
            "  up == 0",
            r#"rate(node_cpu_seconds_total{mode!="idle"}[1m]) * 100"#,
        ] {
            let once = format_promql_expr("expr", expr).unwrap();
            let twice = format_promql_expr("expr", &once).unwrap();
            assert_eq!(once, twice);
            assert!(!once.starts_with(char::is_whitespace));
        }
    }

    #[test]
    fn test_format_ignores_source_layout() {
        let a = format_promql_expr("expr", "cpu_usage>80").unwrap();
        let b = format_promql_expr("expr", "cpu_usage  >  80").unwrap();
        assert_eq!(a, b);
    }
}
