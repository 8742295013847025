//! Status vocabulary shared by the store, the domain and the worker.

use serde::{Deserialize, Serialize};

/// Error returned when a persisted status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown status value: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// Buyer-visible status of an order.
///
/// ```text
/// Draft ──► Submitted ──► Emailed
/// ```
///
/// Delivery failures are recorded on the delivery job; the order itself
/// stays `Submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    /// Created, items priced, not yet sent to the factory.
    #[default]
    Draft,

    /// Committed by the buyer; delivery to the factory pending.
    Submitted,

    /// The order document reached the factory (terminal).
    Emailed,
}

impl OrderStatus {
    /// Position in the lifecycle. Status only ever moves to a higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Draft => 0,
            OrderStatus::Submitted => 1,
            OrderStatus::Emailed => 2,
        }
    }

    /// Returns true if the order can be submitted in this state.
    pub fn can_submit(&self) -> bool {
        matches!(self, OrderStatus::Draft)
    }

    /// Returns true if delivery can be confirmed in this state.
    pub fn can_mark_emailed(&self) -> bool {
        matches!(self, OrderStatus::Submitted)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Emailed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "Draft",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::Emailed => "Emailed",
        }
    }

    /// Column value used by the relational store.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Emailed => "EMAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "DRAFT" => Ok(OrderStatus::Draft),
            "SUBMITTED" => Ok(OrderStatus::Submitted),
            "EMAILED" => Ok(OrderStatus::Emailed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    /// Accepts both the display name (`Submitted`) and the column value (`SUBMITTED`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::from_db_str(&s.to_ascii_uppercase())
    }
}

/// Status of a delivery job.
///
/// ```text
/// Pending ──► Processing ──┬──► Sent
///    ▲                     ├──► Pending   (attempts remain)
///    └─────────────────────┘    Failed    (attempts exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeliveryJobStatus {
    #[default]
    Pending,
    Processing,
    Sent,
    Failed,
}

impl DeliveryJobStatus {
    /// Returns true if a worker may start an attempt in this state.
    pub fn can_start_attempt(&self) -> bool {
        matches!(self, DeliveryJobStatus::Pending)
    }

    /// Returns true if an attempt is in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DeliveryJobStatus::Processing)
    }

    /// Returns true if no further attempts will ever be made.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryJobStatus::Sent | DeliveryJobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryJobStatus::Pending => "Pending",
            DeliveryJobStatus::Processing => "Processing",
            DeliveryJobStatus::Sent => "Sent",
            DeliveryJobStatus::Failed => "Failed",
        }
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            DeliveryJobStatus::Pending => "PENDING",
            DeliveryJobStatus::Processing => "PROCESSING",
            DeliveryJobStatus::Sent => "SENT",
            DeliveryJobStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "PENDING" => Ok(DeliveryJobStatus::Pending),
            "PROCESSING" => Ok(DeliveryJobStatus::Processing),
            "SENT" => Ok(DeliveryJobStatus::Sent),
            "FAILED" => Ok(DeliveryJobStatus::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for DeliveryJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action names written to the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    SubmitOrder,
    EmailSent,
    EmailFailed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::SubmitOrder => "SUBMIT_ORDER",
            AuditAction::EmailSent => "EMAIL_SENT",
            AuditAction::EmailFailed => "EMAIL_FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "CREATE" => Ok(AuditAction::Create),
            "SUBMIT_ORDER" => Ok(AuditAction::SubmitOrder),
            "EMAIL_SENT" => Ok(AuditAction::EmailSent),
            "EMAIL_FAILED" => Ok(AuditAction::EmailFailed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_status_is_draft() {
        assert_eq!(OrderStatus::default(), OrderStatus::Draft);
    }

    #[test]
    fn test_only_draft_can_submit() {
        assert!(OrderStatus::Draft.can_submit());
        assert!(!OrderStatus::Submitted.can_submit());
        assert!(!OrderStatus::Emailed.can_submit());
    }

    #[test]
    fn test_only_submitted_can_be_emailed() {
        assert!(!OrderStatus::Draft.can_mark_emailed());
        assert!(OrderStatus::Submitted.can_mark_emailed());
        assert!(!OrderStatus::Emailed.can_mark_emailed());
    }

    #[test]
    fn test_rank_is_monotonic_along_lifecycle() {
        assert!(OrderStatus::Draft.rank() < OrderStatus::Submitted.rank());
        assert!(OrderStatus::Submitted.rank() < OrderStatus::Emailed.rank());
    }

    #[test]
    fn test_order_status_db_roundtrip() {
        for status in [OrderStatus::Draft, OrderStatus::Submitted, OrderStatus::Emailed] {
            assert_eq!(OrderStatus::from_db_str(status.as_db_str()), Ok(status));
        }
        assert!(OrderStatus::from_db_str("SHIPPED").is_err());
    }

    #[test]
    fn test_order_status_parses_display_names() {
        assert_eq!("Submitted".parse::<OrderStatus>(), Ok(OrderStatus::Submitted));
        assert_eq!("draft".parse::<OrderStatus>(), Ok(OrderStatus::Draft));
    }

    #[test]
    fn test_job_status_predicates() {
        assert!(DeliveryJobStatus::Pending.can_start_attempt());
        assert!(!DeliveryJobStatus::Processing.can_start_attempt());
        assert!(DeliveryJobStatus::Processing.is_in_flight());
        assert!(DeliveryJobStatus::Sent.is_terminal());
        assert!(DeliveryJobStatus::Failed.is_terminal());
        assert!(!DeliveryJobStatus::Pending.is_terminal());
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(DeliveryJobStatus::Pending.to_string(), "Pending");
        assert_eq!(DeliveryJobStatus::Failed.as_db_str(), "FAILED");
    }

    #[test]
    fn test_audit_action_names() {
        assert_eq!(AuditAction::SubmitOrder.as_str(), "SUBMIT_ORDER");
        assert_eq!(
            serde_json::to_string(&AuditAction::EmailSent).unwrap(),
            "\"EMAIL_SENT\""
        );
        assert_eq!(AuditAction::from_db_str("CREATE"), Ok(AuditAction::Create));
    }
}
