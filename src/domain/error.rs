//! Domain error and diagnostic types.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// Top-level error type for multitrader.
#[derive(Debug, thiserror::Error)]
pub enum MultitraderError {
    #[error("data error for {symbol}: {reason}")]
    Data { symbol: String, reason: String },

    #[error("signal generation failed for {symbol}: {reason}")]
    SignalGeneration { symbol: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown {kind} '{value}' (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("allocation error: {reason}")]
    Allocation { reason: String },

    #[error("no usable symbols after {stage}")]
    NoUsableSymbols { stage: Stage },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MultitraderError {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            MultitraderError::ConfigParse { .. }
                | MultitraderError::ConfigMissing { .. }
                | MultitraderError::ConfigInvalid { .. }
                | MultitraderError::UnknownVariant { .. }
                | MultitraderError::Allocation { .. }
        )
    }
}

impl From<&MultitraderError> for std::process::ExitCode {
    fn from(err: &MultitraderError) -> Self {
        let code: u8 = match err {
            MultitraderError::Io(_) | MultitraderError::Json(_) => 1,
            MultitraderError::ConfigParse { .. }
            | MultitraderError::ConfigMissing { .. }
            | MultitraderError::ConfigInvalid { .. }
            | MultitraderError::UnknownVariant { .. }
            | MultitraderError::Allocation { .. } => 2,
            MultitraderError::Data { .. }
            | MultitraderError::SignalGeneration { .. }
            | MultitraderError::NoUsableSymbols { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

/// Pipeline stage a diagnostic or fatal error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DataLoad,
    SignalGeneration,
    Alignment,
    Allocation,
    Execution,
    Analytics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DataLoad => "data load",
            Stage::SignalGeneration => "signal generation",
            Stage::Alignment => "timestamp alignment",
            Stage::Allocation => "allocation",
            Stage::Execution => "execution",
            Stage::Analytics => "analytics",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

/// A non-fatal problem recorded during a run.
///
/// Per-symbol and per-tick failures are collected rather than propagated so the
/// orchestrator decides explicitly whether the run can continue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            severity: Severity::Warning,
            symbol: None,
            timestamp: None,
            message: message.into(),
        }
    }

    pub fn info(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            ..Self::warning(stage, message)
        }
    }

    pub fn for_symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn at(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Emit through `tracing` at the matching level.
    pub fn log(&self) {
        let symbol = self.symbol.as_deref().unwrap_or("-");
        match self.severity {
            Severity::Warning => {
                tracing::warn!(stage = %self.stage, symbol, "{}", self.message)
            }
            Severity::Info => tracing::info!(stage = %self.stage, symbol, "{}", self.message),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.stage)?;
        if let Some(symbol) = &self.symbol {
            write!(f, " {symbol}")?;
        }
        if let Some(ts) = &self.timestamp {
            write!(f, " @ {ts}")?;
        }
        write!(f, ": {}", self.message)
    }
}
