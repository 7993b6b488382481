use uuid::Uuid;

use crate::payment::PaymentError;
use crate::store::StoreError;

/// Failure taxonomy for event handling.
///
/// Consumers are fail-open: every variant is logged and the delivery is
/// dropped or dead-lettered, never bubbled to a caller. Only transient
/// variants are worth redelivering.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("order {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("notification gateway failure: {0}")]
    Notify(String),

    #[error("undecodable event payload: {0}")]
    Payload(String),
}

impl HandlerError {
    /// Whether a redelivery could plausibly succeed. A missing order or an
    /// interrupted payment wait stays failed no matter how often the event
    /// is redelivered; infrastructure hiccups do not.
    pub fn is_transient(&self) -> bool {
        matches!(self, HandlerError::Store(_) | HandlerError::Notify(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transience_per_variant() {
        assert!(!HandlerError::NotFound(Uuid::new_v4()).is_transient());
        assert!(!HandlerError::Payment(PaymentError::Interrupted).is_transient());
        assert!(!HandlerError::Payload("garbage".into()).is_transient());
        assert!(HandlerError::Store(StoreError::Backend("down".into())).is_transient());
        assert!(HandlerError::Notify("smtp timeout".into()).is_transient());
    }
}
