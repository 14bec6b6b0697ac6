//! Error taxonomy: syntax, load, configuration, build diagnostics, internal.
//!
//! Only [`VellumError::Build`] is subject to `keep_going` suppression.

use std::fmt;

/// The parser could not match the grammar at some position.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub token: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "syntax error at line {}, column {} near '{}': {}",
            self.line, self.column, self.token, self.message
        )
    }
}

/// A recipe or module could not be found, read, or folded in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    pub message: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>) -> Self {
        LoadError {
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A command failed while building a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub target: String,
    pub line: usize,
    pub command: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}:{}) failed running {}: '{}'",
            self.target, self.line, self.command, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VellumError {
    Syntax(SyntaxError),
    Load(LoadError),
    /// Missing default target, dependency cycle.
    Config(String),
    Build(Diagnostic),
    /// Engine bug rather than a recipe problem; never suppressed.
    Internal(String),
}

impl VellumError {
    pub fn is_suppressible(&self) -> bool {
        matches!(self, VellumError::Build(_))
    }
}

impl fmt::Display for VellumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VellumError::Syntax(e) => write!(f, "{}", e),
            VellumError::Load(e) => write!(f, "load error: {}", e),
            VellumError::Config(msg) => write!(f, "configuration error: {}", msg),
            VellumError::Build(d) => write!(f, "{}", d),
            VellumError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for VellumError {}

impl From<SyntaxError> for VellumError {
    fn from(err: SyntaxError) -> Self {
        VellumError::Syntax(err)
    }
}

impl From<LoadError> for VellumError {
    fn from(err: LoadError) -> Self {
        VellumError::Load(err)
    }
}

impl From<Diagnostic> for VellumError {
    fn from(err: Diagnostic) -> Self {
        VellumError::Build(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_diagnostic_format() {
        let d = Diagnostic {
            target: "build".to_string(),
            line: 3,
            command: "sh".to_string(),
            message: "exit code 2".to_string(),
        };
        assert_eq!(d.to_string(), "(build:3) failed running sh: 'exit code 2'");
    }

    #[test]
    fn test_error_only_build_is_suppressible() {
        let d = Diagnostic {
            target: "t".to_string(),
            line: 1,
            command: "c".to_string(),
            message: "m".to_string(),
        };
        assert!(VellumError::from(d).is_suppressible());
        assert!(!VellumError::Internal("leak".to_string()).is_suppressible());
        assert!(!VellumError::from(LoadError::new("x")).is_suppressible());
        assert!(!VellumError::Config("x".to_string()).is_suppressible());
    }

    #[test]
    fn test_error_syntax_display() {
        let e = SyntaxError {
            message: "expected ']'".to_string(),
            token: ")".to_string(),
            line: 2,
            column: 7,
        };
        let s = VellumError::from(e).to_string();
        assert!(s.contains("line 2"));
        assert!(s.contains("column 7"));
        assert!(s.contains("expected ']'"));
    }
}
