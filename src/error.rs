use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    InvalidPattern,
    TooDeep,
}

impl QueryErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryErrorCode::InvalidPattern => "invalid_pattern",
            QueryErrorCode::TooDeep => "too_deep",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("expression depth {depth} exceeds maximum allowed depth of {max}")]
    TooDeep { depth: usize, max: usize },
}

impl QueryError {
    pub fn code(&self) -> QueryErrorCode {
        match self {
            QueryError::InvalidPattern { .. } => QueryErrorCode::InvalidPattern,
            QueryError::TooDeep { .. } => QueryErrorCode::TooDeep,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryError, QueryErrorCode};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(QueryErrorCode::InvalidPattern.as_str(), "invalid_pattern");
        assert_eq!(QueryErrorCode::TooDeep.as_str(), "too_deep");
    }

    #[test]
    fn error_code_str_matches_variant_mapping() {
        let err = QueryError::TooDeep { depth: 40, max: 32 };
        assert_eq!(err.code(), QueryErrorCode::TooDeep);
        assert_eq!(err.code_str(), "too_deep");
        assert_eq!(
            err.to_string(),
            "expression depth 40 exceeds maximum allowed depth of 32"
        );
    }
}
