use thiserror::Error;

/// Fatal errors for a single compiled file. None of them are recovered from;
/// the driver reports them and moves on to the next file.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("parse error at line {line}, column {column}: expected {expected}")]
    Parse {
        line: usize,
        column: usize,
        expected: String,
    },

    /// A DSL usage whose shape matches none of the known patterns.
    #[error("line {line}: unsupported statement shape `{statement}`; expected {expected}")]
    Structural {
        line: usize,
        statement: String,
        expected: String,
    },

    /// A library type, element type or operation with no backend mapping.
    #[error("line {line}: unsupported type `{type_name}`: {reason}")]
    UnsupportedType {
        line: usize,
        type_name: String,
        reason: String,
    },
}

impl CompileError {
    pub fn structural(line: usize, statement: &str, expected: impl Into<String>) -> Self {
        CompileError::Structural {
            line,
            statement: condense(statement),
            expected: expected.into(),
        }
    }

    pub fn unsupported(line: usize, type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::UnsupportedType {
            line,
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn line(&self) -> usize {
        match self {
            CompileError::Parse { line, .. }
            | CompileError::Structural { line, .. }
            | CompileError::UnsupportedType { line, .. } => *line,
        }
    }
}

pub type CompileResult<T> = std::result::Result<T, CompileError>;

/// Collapses whitespace and trims long statements for error messages.
fn condense(statement: &str) -> String {
    const LIMIT: usize = 96;
    let flat = statement.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > LIMIT {
        let cut: String = flat.chars().take(LIMIT).collect();
        format!("{} ...", cut)
    } else {
        flat
    }
}
