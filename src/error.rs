use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which statistic a club was missing when a prediction was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingData {
    Standing,
    MatchesPlayed,
    Form,
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingData::Standing => write!(f, "no league standing"),
            MissingData::MatchesPlayed => write!(f, "no matches played"),
            MissingData::Form => write!(f, "no completed matches to derive form from"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    /// Per fixture: the batch records it and moves on.
    #[error("insufficient data for club {club_id}: {missing}")]
    InsufficientData { club_id: i64, missing: MissingData },

    /// Per batch: nothing is written.
    #[error("{provider} provider unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl PredictionError {
    pub fn insufficient(club_id: i64, missing: MissingData) -> Self {
        PredictionError::InsufficientData { club_id, missing }
    }

    pub fn unavailable(provider: &str, err: &anyhow::Error) -> Self {
        PredictionError::ProviderUnavailable {
            provider: provider.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// Stable machine-readable tag for API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionError::InsufficientData { .. } => "insufficient_data",
            PredictionError::ProviderUnavailable { .. } => "provider_unavailable",
            PredictionError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_club_and_gap() {
        let e = PredictionError::insufficient(7, MissingData::Form);
        assert_eq!(
            e.to_string(),
            "insufficient data for club 7: no completed matches to derive form from"
        );
        assert_eq!(e.kind(), "insufficient_data");
    }

    #[test]
    fn provider_unavailable_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("loading standings");
        let e = PredictionError::unavailable("standings", &err);
        assert_eq!(
            e.to_string(),
            "standings provider unavailable: loading standings: connection refused"
        );
    }
}
