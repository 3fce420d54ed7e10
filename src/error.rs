//! Error handling for workbook ingestion and column mapping
//!
//! This module provides:
//! - Stable error codes, used as CLI exit statuses
//! - The `SheetError` taxonomy shared by every library operation
//! - `FailureReport`, the stderr line and hint a failed run prints

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::mapping::Role;

/// Result type for library operations
pub type SheetResult<T> = Result<T, SheetError>;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Stable failure codes. The CLI exits with [`ErrorCode::code`] so scripts
/// can tell a bad file from a bad mapping without parsing stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// Supplied bytes are not a decodable spreadsheet
    ParseError = 10,
    /// Mapping requested a column outside the header range
    InvalidColumnIndex = 11,
    /// Sheet position does not exist in the active workbook
    SheetNotFound = 12,
    /// Header row position does not exist in the raw grid
    InvalidHeaderRow = 13,
    /// Manual value or required role check failed
    ValidationError = 14,
    /// Upload exceeds the configured size limit
    FileTooLarge = 15,
    /// The decode task died before producing a result
    InternalError = 70,
}

/// Exit status for failures that carry no [`SheetError`] (I/O, config).
pub const GENERAL_FAILURE_CODE: u8 = 1;

impl ErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Decode failures are never retried; the user has to supply another file.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::InternalError)
    }

    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "parse_error",
            ErrorCode::InvalidColumnIndex
            | ErrorCode::InvalidHeaderRow
            | ErrorCode::ValidationError => "validation_error",
            ErrorCode::SheetNotFound => "resource_not_found",
            ErrorCode::FileTooLarge => "resource_limit",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SheetError {
    #[error("unable to decode {format} workbook: {message}")]
    Parse { format: String, message: String },

    #[error("column index {index} is outside valid range [0, {header_count})")]
    InvalidColumnIndex { index: usize, header_count: usize },

    #[error("sheet index {index} is outside valid range [0, {sheet_count})")]
    SheetIndexOutOfRange { index: usize, sheet_count: usize },

    #[error("header row {index} is outside valid range [0, {row_count})")]
    HeaderIndexOutOfRange { index: usize, row_count: usize },

    #[error("manual value cannot be empty or whitespace-only")]
    EmptyManualValue,

    #[error("file is {bytes} bytes which exceeds the {limit} byte limit")]
    FileTooLarge { bytes: usize, limit: usize },

    #[error("sheet '{sheet}' is missing a mapped {role} column")]
    MissingRequiredRole { sheet: String, role: Role },

    #[error("decode task failed: {0}")]
    DecodeTask(String),
}

impl SheetError {
    pub fn parse(format: impl Into<String>, message: impl fmt::Display) -> Self {
        SheetError::Parse {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SheetError::Parse { .. } => ErrorCode::ParseError,
            SheetError::InvalidColumnIndex { .. } => ErrorCode::InvalidColumnIndex,
            SheetError::SheetIndexOutOfRange { .. } => ErrorCode::SheetNotFound,
            SheetError::HeaderIndexOutOfRange { .. } => ErrorCode::InvalidHeaderRow,
            SheetError::EmptyManualValue | SheetError::MissingRequiredRole { .. } => {
                ErrorCode::ValidationError
            }
            SheetError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            SheetError::DecodeTask(_) => ErrorCode::InternalError,
        }
    }

    /// Hint shown next to the message when the error reaches a user.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            SheetError::Parse { .. } => {
                Some("Re-export the file as .xlsx or .xls and upload it again".to_string())
            }
            SheetError::InvalidColumnIndex { header_count, .. } => Some(format!(
                "Pick a column between 0 and {}",
                header_count.saturating_sub(1)
            )),
            SheetError::HeaderIndexOutOfRange { .. } => {
                Some("Choose a header row that exists in the sheet".to_string())
            }
            SheetError::FileTooLarge { limit, .. } => Some(format!(
                "Split the workbook into files smaller than {} MB",
                limit / (1024 * 1024)
            )),
            SheetError::MissingRequiredRole { role, .. } => {
                Some(format!("Map a column to {} or exclude the sheet", role))
            }
            _ => None,
        }
    }
}

// =============================================================================
// FAILURE REPORT
// =============================================================================

/// What a failed run prints to stderr and exits with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub exit_code: u8,
    pub category: &'static str,
    pub retryable: bool,
    pub message: String,
    pub suggestion: Option<String>,
}

impl FailureReport {
    /// Classifies by the first [`SheetError`] in the context chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        match err.chain().find_map(|cause| cause.downcast_ref::<SheetError>()) {
            Some(sheet_err) => {
                let code = sheet_err.code();
                Self {
                    exit_code: code.code(),
                    category: code.category(),
                    retryable: code.is_retryable(),
                    message,
                    suggestion: sheet_err.suggestion(),
                }
            }
            None => Self {
                exit_code: GENERAL_FAILURE_CODE,
                category: "runtime_error",
                retryable: false,
                message,
                suggestion: None,
            },
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.category, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  hint: {suggestion}")?;
        }
        Ok(())
    }
}
