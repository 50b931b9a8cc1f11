use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response json: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_exhaustion_signal(&self) -> bool {
        matches!(self, FetchError::Http { status, .. } if matches!(status, 401 | 403 | 429))
    }

    /// Bad parameters and missing entities never build up a streak.
    pub fn counts_toward_exhaustion(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Transport(_) | FetchError::Decode(_) => true,
            FetchError::Http { status, .. } => *status >= 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream exhausted on {endpoint} after {calls_done}/{calls_total} calls: {reason}")]
pub struct Exhaustion {
    pub endpoint: String,
    pub reason: String,
    pub calls_done: usize,
    pub calls_total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("column `{0}` is declared more than once")]
    DuplicateColumn(String),
    #[error("column `{column}` has no sources")]
    NoSources { column: String },
    #[error("column `{column}` declares more than one {tier} source")]
    DuplicateTier { column: String, tier: String },
    #[error("column `{column}` references unknown endpoint `{endpoint}`")]
    UnknownEndpoint { column: String, endpoint: String },
    #[error("column `{column}`: endpoint `{endpoint}` does not serve {tier} entities")]
    TierMismatch {
        column: String,
        endpoint: String,
        tier: String,
    },
    #[error("column `{column}`: endpoint `{endpoint}` has no result set `{result_set}`")]
    UnknownResultSet {
        column: String,
        endpoint: String,
        result_set: String,
    },
    #[error("column `{column}`: `{subset}` is not a nested subset of `{superset}`")]
    NotASuperset {
        column: String,
        superset: String,
        subset: String,
    },
    #[error("column `{column}`: season type must not be set in config (param `{param}`)")]
    SeasonTypeLiteral { column: String, param: String },
    #[error("column `{column}`: endpoint `{endpoint}` does not accept param `{param}`")]
    UnknownParam {
        column: String,
        endpoint: String,
        param: String,
    },
    #[error("column `{column}`: `{key}` has no category bucket `{value}`")]
    UnknownCategory {
        column: String,
        key: String,
        value: String,
    },
    #[error("column `{column}`: empty field name")]
    EmptyField { column: String },
    #[error("column `{column}`: team rollup needs a player source")]
    RollupWithoutPlayerSource { column: String },
    #[error("no `{0}` column declared")]
    MissingBaseline(&'static str),
    #[error("more than one `{0}` column declared")]
    DuplicateBaseline(&'static str),
    #[error("derived stat `{stat}` references unknown counting column `{input}`")]
    UnknownDerivedInput { stat: String, input: String },
}
