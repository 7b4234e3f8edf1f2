//! Configuration validation.
//!
//! Checks a config file against the known schema, flags unknown or
//! misspelled fields, and reports retention settings that cannot work.

use std::{collections::HashMap, path::Path};

use crate::{duration::parse_duration_ms, schema::EbbConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "retention", "channels"
    pub category: &'static str,
    /// Dotted path, e.g. "retention.batch_size"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys (e.g. `channel_mapping`); values are not inspected.
    OpenMap,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, OpenMap, Struct};

    Struct(HashMap::from([
        (
            "discord",
            Struct(HashMap::from([("token", Leaf), ("guild_ids", Leaf)])),
        ),
        ("channel_mapping", OpenMap),
        (
            "retention",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("poll_interval", Leaf),
                ("tick_interval", Leaf),
                ("batch_size", Leaf),
                ("fetch_limit", Leaf),
                ("backlog_recheck_unit", Leaf),
                ("delete_timeout", Leaf),
                ("fetch_timeout", Leaf),
                (
                    "lifetime",
                    Struct(HashMap::from([
                        ("days", Leaf),
                        ("hours", Leaf),
                        ("minutes", Leaf),
                        ("seconds", Leaf),
                    ])),
                ),
            ])),
        ),
    ]))
}

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitute = diag + usize::from(ca != *cb);
            row[j + 1] = substitute.min(above + 1).min(row[j] + 1);
            diag = above;
        }
    }
    row[b.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (*c, levenshtein(needle, c)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .min_by_key(|(_, d)| *d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "syntax",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    match crate::loader::load_config(actual_path) {
        Ok(config) => {
            let mut diagnostics = Vec::new();
            if actual_path.extension().is_some_and(|e| e == "toml")
                && let Ok(raw) = std::fs::read_to_string(actual_path)
                && let Ok(value) = toml::from_str::<toml::Value>(&raw)
            {
                check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);
            }
            check_semantics(&config, &mut diagnostics);
            ValidationResult {
                diagnostics,
                config_path,
            }
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                e.to_string(),
            )],
            config_path,
        },
    }
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<EbbConfig>(toml_str) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known: Vec<&str> = fields.keys().copied().collect();

    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => {
                let message = match suggest(key, &known, 3) {
                    Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
                    None => "unknown field".to_string(),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

/// Checks that only make sense on a fully parsed config.
fn check_semantics(config: &EbbConfig, diagnostics: &mut Vec<Diagnostic>) {
    let retention = &config.retention;

    if retention.batch_size == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "retention",
            "retention.batch_size",
            "batch_size must be at least 1",
        ));
    }

    if !(1..=100).contains(&retention.fetch_limit) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "retention",
            "retention.fetch_limit",
            format!(
                "fetch_limit must be between 1 and 100, got {}",
                retention.fetch_limit
            ),
        ));
    }

    for (field, raw) in [
        ("poll_interval", &retention.poll_interval),
        ("tick_interval", &retention.tick_interval),
        ("backlog_recheck_unit", &retention.backlog_recheck_unit),
        ("delete_timeout", &retention.delete_timeout),
        ("fetch_timeout", &retention.fetch_timeout),
    ] {
        if let Err(e) = parse_duration_ms(raw) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "retention",
                format!("retention.{field}"),
                e.to_string(),
            ));
        }
    }

    if let (Ok(unit), Ok(tick)) = (
        parse_duration_ms(&retention.backlog_recheck_unit),
        parse_duration_ms(&retention.tick_interval),
    ) && unit >= tick
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "retention",
            "retention.backlog_recheck_unit",
            format!(
                "backlog_recheck_unit ({}) is not shorter than tick_interval ({}); \
                 a backed-up scheduler will recheck no sooner than a normal tick",
                retention.backlog_recheck_unit, retention.tick_interval
            ),
        ));
    }

    if retention.enabled && retention.lifetime.is_zero() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "retention",
            "retention.lifetime",
            "lifetime is zero; messages are deleted as soon as they are seen",
        ));
    }

    if config.channel_mapping.is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "channels",
            "channel_mapping",
            "no channels mapped; nothing will be monitored",
        ));
    }

    for key in config.channel_mapping.keys() {
        if key.trim().is_empty() || key == "#" {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "channels",
                format!("channel_mapping.{key}"),
                "empty channel reference",
            ));
        }
    }

    for (i, id) in config.discord.guild_ids.iter().enumerate() {
        if !matches!(id.trim().parse::<u64>(), Ok(n) if n > 0) {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "channels",
                format!("discord.guild_ids[{i}]"),
                format!("guild id must be a non-zero numeric snowflake, got {id:?}"),
            ));
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const VALID: &str = r##"
        [discord]
        token = "t"

        [channel_mapping]
        "#general" = "#lobby"

        [retention.lifetime]
        hours = 12
    "##;

    #[test]
    fn valid_config_is_clean() {
        let result = validate_toml_str(VALID);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_short_circuits() {
        let result = validate_toml_str("[retention\nbatch_size = 1");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn misspelled_field_gets_suggestion() {
        let raw = format!("{VALID}\n[retention.extra]\n");
        let result = validate_toml_str(&raw.replace("[retention.extra]", "[retension]"));
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.category == "unknown-field")
            .unwrap();
        assert_eq!(diag.path, "retension");
        assert!(diag.message.contains("did you mean \"retention\""));
    }

    #[test]
    fn channel_mapping_keys_are_open() {
        let result = validate_toml_str(
            "[channel_mapping]\n\"123\" = \"#a\"\n\"#b\" = \"#c\"\n[retention.lifetime]\ndays = 1\n",
        );
        assert_eq!(result.count(Severity::Error), 0);
    }

    #[rstest]
    #[case("[retention]\nbatch_size = 0", "retention.batch_size")]
    #[case("[retention]\nfetch_limit = 0", "retention.fetch_limit")]
    #[case("[retention]\nfetch_limit = 101", "retention.fetch_limit")]
    #[case("[retention]\ntick_interval = \"soon\"", "retention.tick_interval")]
    #[case("[retention]\ndelete_timeout = \"0s\"", "retention.delete_timeout")]
    #[case("[discord]\nguild_ids = [\"12\", \"abc\"]", "discord.guild_ids[1]")]
    fn retention_errors(#[case] raw: &str, #[case] path: &str) {
        let result = validate_toml_str(raw);
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error && d.path == path),
            "{:?}",
            result.diagnostics
        );
    }

    #[rstest]
    #[case("1s", "60s", false)]
    #[case("60s", "60s", true)]
    #[case("2m", "60s", true)]
    fn recheck_unit_must_undercut_tick_interval(
        #[case] unit: &str,
        #[case] tick: &str,
        #[case] warns: bool,
    ) {
        let raw = format!(
            "{VALID}\n[retention]\nbacklog_recheck_unit = \"{unit}\"\ntick_interval = \"{tick}\"\n"
        );
        let result = validate_toml_str(&raw);
        let warned = result.diagnostics.iter().any(|d| {
            d.severity == Severity::Warning && d.path == "retention.backlog_recheck_unit"
        });
        assert_eq!(warned, warns, "{:?}", result.diagnostics);
        assert!(!result.has_errors());
    }

    #[test]
    fn zero_lifetime_and_empty_mapping_warn() {
        let result = validate_toml_str("");
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 2);
    }

    #[test]
    fn type_error_reported() {
        let result = validate_toml_str("[retention]\nbatch_size = \"many\"");
        assert!(result.diagnostics.iter().any(|d| d.category == "type-error"));
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn validate_missing_file_reports_error() {
        let result = validate(Some(Path::new("/nope/ebb.toml")));
        assert!(result.has_errors());
    }
}
