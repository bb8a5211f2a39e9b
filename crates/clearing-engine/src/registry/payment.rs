use clearing_types::{Amount, Participant, PaymentId, TokenId};

/// A directed fungible transfer request. Only a fulfilled payment is
/// eligible to enter a settlement cycle.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub id: PaymentId,
    pub sender: Participant,
    pub recipient: Participant,
    pub amount: Amount,
    pub token: TokenId,
    pub fulfilled: bool,
    pub active: bool,
    pub failed_cycles: u32,
}

impl PaymentRequest {
    pub fn new(
        id: PaymentId,
        sender: Participant,
        recipient: Participant,
        amount: Amount,
        token: TokenId,
    ) -> Self {
        Self {
            id,
            sender,
            recipient,
            amount,
            token,
            fulfilled: false,
            active: true,
            failed_cycles: 0,
        }
    }

    pub fn eligible_for_cycle(&self) -> bool {
        self.active && self.fulfilled
    }
}
