//! Domain error types.

/// A parse error with position information for call-list parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for divtrader.
#[derive(Debug, thiserror::Error)]
pub enum DivtraderError {
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

    #[error(transparent)]
    CallParse(#[from] ParseError),

    #[error("unknown condition '{name}' in rule '{rule}'")]
    UnknownCondition { rule: String, name: String },

    #[error("unknown strategy '{name}' in rule '{rule}'")]
    UnknownStrategy { rule: String, name: String },

    #[error("quote unavailable for {stock_code}: {reason}")]
    QuoteUnavailable { stock_code: String, reason: String },

    #[error("account snapshot unavailable: {reason}")]
    AccountUnavailable { reason: String },

    #[error("invalid price {price} for {stock_code}")]
    InvalidPrice { stock_code: String, price: i64 },

    #[error("order rejected for {stock_code}: {reason}")]
    OrderRejected { stock_code: String, reason: String },

    #[error("corrupt state record {file}: {reason}")]
    StateCorrupt { file: String, reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DivtraderError {
    /// Data errors abort the current cycle only; the next poll retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DivtraderError::QuoteUnavailable { .. }
                | DivtraderError::AccountUnavailable { .. }
                | DivtraderError::InvalidPrice { .. }
                | DivtraderError::OrderRejected { .. }
        )
    }
}

impl From<&DivtraderError> for std::process::ExitCode {
    fn from(err: &DivtraderError) -> Self {
        let code: u8 = match err {
            DivtraderError::Io(_) => 1,
            DivtraderError::ConfigParse { .. }
            | DivtraderError::ConfigMissing { .. }
            | DivtraderError::ConfigInvalid { .. }
            | DivtraderError::CallParse(_)
            | DivtraderError::UnknownCondition { .. }
            | DivtraderError::UnknownStrategy { .. } => 2,
            DivtraderError::QuoteUnavailable { .. }
            | DivtraderError::AccountUnavailable { .. }
            | DivtraderError::InvalidPrice { .. } => 3,
            DivtraderError::OrderRejected { .. } => 4,
            DivtraderError::StateCorrupt { .. }
            | DivtraderError::Json(_)
            | DivtraderError::Csv(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_caret_points_at_position() {
        let err = ParseError {
            message: "expected '('".into(),
            position: 4,
        };
        let rendered = err.display_with_context("abc d");
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "abc d");
        assert_eq!(lines[1], "    ^");
        assert!(lines[2].contains("position 4"));
    }

    #[test]
    fn data_errors_are_transient() {
        let quote = DivtraderError::QuoteUnavailable {
            stock_code: "005930".into(),
            reason: "timeout".into(),
        };
        assert!(quote.is_transient());

        let config = DivtraderError::ConfigMissing {
            section: "engine".into(),
            key: "rules".into(),
        };
        assert!(!config.is_transient());
    }

    #[test]
    fn exit_codes_follow_taxonomy() {
        let missing = DivtraderError::ConfigMissing {
            section: "forced_trade".into(),
            key: "stock_code".into(),
        };
        assert_eq!(
            std::process::ExitCode::from(&missing),
            std::process::ExitCode::from(2)
        );

        let rejected = DivtraderError::OrderRejected {
            stock_code: "005930".into(),
            reason: "insufficient cash".into(),
        };
        assert_eq!(
            std::process::ExitCode::from(&rejected),
            std::process::ExitCode::from(4)
        );
    }
}
