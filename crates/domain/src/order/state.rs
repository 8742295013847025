//! Order lifecycle rules.
//!
//! ```text
//! Draft ──submit──► Submitted ──mark_emailed──► Emailed
//! ```
//!
//! Status only moves forward. A failed delivery is recorded on the delivery
//! job; the order stays `Submitted`.

use common::OrderStatus;

use super::OrderError;

/// A requested change of order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTransition {
    /// The buyer commits the order.
    Submit,

    /// The worker confirmed delivery of the order document.
    MarkEmailed,
}

impl OrderTransition {
    /// The only status this transition may start from.
    pub fn source(&self) -> OrderStatus {
        match self {
            OrderTransition::Submit => OrderStatus::Draft,
            OrderTransition::MarkEmailed => OrderStatus::Submitted,
        }
    }

    pub fn target(&self) -> OrderStatus {
        match self {
            OrderTransition::Submit => OrderStatus::Submitted,
            OrderTransition::MarkEmailed => OrderStatus::Emailed,
        }
    }

    /// Checks the transition from `current` and returns the new status.
    pub fn apply(&self, current: OrderStatus) -> Result<OrderStatus, OrderError> {
        let allowed = match self {
            OrderTransition::Submit => current.can_submit(),
            OrderTransition::MarkEmailed => current.can_mark_emailed(),
        };

        if !allowed {
            return Err(OrderError::InvalidTransition {
                from: current,
                to: self.target(),
            });
        }
        Ok(self.target())
    }

    /// Checks a submission, which additionally needs at least one item.
    ///
    /// The status is checked first, so resubmitting an empty order that was
    /// somehow submitted reports the transition error.
    pub fn check_submit(current: OrderStatus, item_count: usize) -> Result<OrderStatus, OrderError> {
        let next = OrderTransition::Submit.apply(current)?;
        if item_count == 0 {
            return Err(OrderError::EmptyOrder);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_only_from_draft() {
        assert_eq!(
            OrderTransition::Submit.apply(OrderStatus::Draft).unwrap(),
            OrderStatus::Submitted
        );
        assert!(matches!(
            OrderTransition::Submit.apply(OrderStatus::Submitted),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Submitted,
                to: OrderStatus::Submitted
            })
        ));
        assert!(OrderTransition::Submit.apply(OrderStatus::Emailed).is_err());
    }

    #[test]
    fn test_mark_emailed_only_from_submitted() {
        assert!(OrderTransition::MarkEmailed.apply(OrderStatus::Draft).is_err());
        assert_eq!(
            OrderTransition::MarkEmailed
                .apply(OrderStatus::Submitted)
                .unwrap(),
            OrderStatus::Emailed
        );
        assert!(
            OrderTransition::MarkEmailed
                .apply(OrderStatus::Emailed)
                .is_err()
        );
    }

    #[test]
    fn test_no_transition_moves_backwards() {
        for transition in [OrderTransition::Submit, OrderTransition::MarkEmailed] {
            assert!(transition.target().rank() > transition.source().rank());
            for status in [OrderStatus::Draft, OrderStatus::Submitted, OrderStatus::Emailed] {
                if let Ok(next) = transition.apply(status) {
                    assert!(next.rank() > status.rank());
                }
            }
        }
    }

    #[test]
    fn test_empty_draft_cannot_be_submitted() {
        assert!(matches!(
            OrderTransition::check_submit(OrderStatus::Draft, 0),
            Err(OrderError::EmptyOrder)
        ));
        assert!(OrderTransition::check_submit(OrderStatus::Draft, 1).is_ok());
    }

    #[test]
    fn test_resubmission_reports_transition_error_first() {
        assert!(matches!(
            OrderTransition::check_submit(OrderStatus::Submitted, 0),
            Err(OrderError::InvalidTransition { .. })
        ));
    }
}
