use thiserror::Error;

/// Error taxonomy shared by every layer of the charging core.
///
/// Adapters map their transport errors into these variants at the boundary,
/// so the coordinator and the HTTP layer only ever match on this enum.
#[derive(Debug, Clone, Error)]
pub enum ChargeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid amount {amount}: minimum is {minimum} minor units")]
    InvalidAmount { amount: i64, minimum: i64 },

    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Station {station_id} is not available ({status})")]
    StationUnavailable { station_id: String, status: String },

    #[error("Gateway error during {operation}: {message}")]
    Gateway {
        operation: &'static str,
        message: String,
        transient: bool,
    },

    #[error("Hardware start failed for station {station_id}: {reason}")]
    HardwareStartFailed { station_id: String, reason: String },

    #[error("Hardware stop failed for station {station_id}: {reason}")]
    HardwareStopFailed { station_id: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ChargeError {
    pub fn not_found(entity: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            field,
            value: value.into(),
        }
    }

    pub fn gateway(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Gateway {
            operation,
            message: message.into(),
            transient: false,
        }
    }

    pub fn gateway_transient(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Gateway {
            operation,
            message: message.into(),
            transient: true,
        }
    }

    /// Whether this error is likely transient (network blip, DB timeout)
    /// and a read may succeed if retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            ChargeError::Gateway { transient, .. } => *transient,
            ChargeError::Persistence(msg) => msg.contains("timed out") || msg.contains("pool"),
            _ => false,
        }
    }

    /// Short machine-readable code used in API responses and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ChargeError::InvalidArgument(_) => "invalid_argument",
            ChargeError::InvalidAmount { .. } => "invalid_amount",
            ChargeError::NotFound { .. } => "not_found",
            ChargeError::StationUnavailable { .. } => "station_unavailable",
            ChargeError::Gateway { .. } => "gateway_error",
            ChargeError::HardwareStartFailed { .. } => "hardware_start_failed",
            ChargeError::HardwareStopFailed { .. } => "hardware_stop_failed",
            ChargeError::InvalidState(_) => "invalid_state",
            ChargeError::Persistence(_) => "persistence_error",
        }
    }
}

impl From<sea_orm::DbErr> for ChargeError {
    fn from(e: sea_orm::DbErr) -> Self {
        ChargeError::Persistence(format!("Database error: {}", e))
    }
}

impl From<serde_json::Error> for ChargeError {
    fn from(e: serde_json::Error) -> Self {
        ChargeError::Persistence(format!("Serialization error: {}", e))
    }
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, ChargeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ChargeError::gateway_transient("list", "connection reset").is_retryable());
        assert!(!ChargeError::gateway("capture", "card declined").is_retryable());
        assert!(!ChargeError::InvalidState("already captured".into()).is_retryable());
    }

    #[test]
    fn db_errors_map_to_persistence() {
        let err: ChargeError = sea_orm::DbErr::Custom("boom".into()).into();
        assert_eq!(err.code(), "persistence_error");
        assert!(err.to_string().contains("boom"));
    }
}
