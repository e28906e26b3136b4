//! Helpful error types for CLI commands
//!
//! Every error says what went wrong, what was being attempted, and what to
//! try next.

use marketwatch::MonitorError;
use marketwatch_db::DbError;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(
        mut self,
        suggestions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.suggestions
            .extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    pub fn database_not_found(path: &Path) -> Self {
        Self::new("Database not found")
            .with_context(format!("Expected database at: {}", path.display()))
            .with_suggestions([
                "TRY: marketwatch apply --snapshot <file>   # First scan creates the database"
                    .to_string(),
                "TRY: Pass --database or set MARKETWATCH_DB to point at an existing file"
                    .to_string(),
            ])
    }

    pub fn snapshot_not_found(path: &Path) -> Self {
        Self::new(format!("Snapshot file not found: {}", path.display()))
            .with_context("The capture pipeline writes one JSON snapshot per scan cycle")
            .with_suggestions([
                format!("TRY: Check that the file exists: ls -la {}", path.display()),
                "TRY: Set snapshot_path in ~/.marketwatch/config.toml".to_string(),
            ])
    }

    pub fn invalid_timestamp(input: &str) -> Self {
        Self::new(format!("Invalid timestamp: '{}'", input))
            .with_context("Expected an RFC 3339 timestamp or a relative window")
            .with_suggestions([
                "TRY: --since 2024-01-15T00:00:00Z".to_string(),
                "TRY: --since 24h, --since 7d".to_string(),
            ])
    }

    /// Translate an engine error into something a user can act on
    pub fn from_monitor(err: MonitorError) -> Self {
        match &err {
            MonitorError::Validation(msg) => Self::new("Snapshot rejected")
                .with_context(msg.clone())
                .with_suggestion(
                    "TRY: Every entry needs a non-empty \"seller\" and \"item\"; nothing was applied",
                ),
            MonitorError::Config(msg) => Self::new("Configuration error")
                .with_context(msg.clone())
                .with_suggestion(format!(
                    "TRY: Check {}",
                    marketwatch::MonitorConfig::default_path().display()
                )),
            MonitorError::Feed(msg) => Self::new("Cannot read snapshot").with_context(msg.clone()),
            MonitorError::Storage(DbError::NotFound(what)) if what.starts_with("Database") => {
                Self::new("Database not found")
                    .with_context(what.clone())
                    .with_suggestion(
                        "TRY: marketwatch apply --snapshot <file>   # First scan creates the database",
                    )
            }
            MonitorError::Storage(DbError::SchemaMismatch(msg)) => {
                Self::new("Database layout does not match")
                    .with_context(msg.clone())
                    .with_suggestion(
                        "TRY: Point --database at a Marketwatch database, or start a fresh one",
                    )
            }
            MonitorError::Storage(db) if db.is_transient() => Self::new("Storage error")
                .with_context(db.to_string())
                .with_suggestion("TRY: Ensure the database is not locked by another process"),
            MonitorError::Storage(db) => Self::new("Storage error").with_context(db.to_string()),
        }
    }
}

impl From<MonitorError> for HelpfulError {
    fn from(err: MonitorError) -> Self {
        Self::from_monitor(err)
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
