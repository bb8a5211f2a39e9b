use clearing_types::{Amount, Participant, SwapId, TokenId};

/// A Payment-versus-Payment swap order: an offer to exchange a fixed amount
/// of one token for a fixed amount of another.
#[derive(Debug, Clone)]
pub struct SwapOrder {
    pub id: SwapId,
    pub maker: Participant,
    pub send_token: TokenId,
    pub send_amount: Amount,
    pub receive_token: TokenId,
    pub receive_amount: Amount,
    pub matched_with: Option<SwapId>,
    pub active: bool,
    pub failed_cycles: u32,
}

impl SwapOrder {
    pub fn new(
        id: SwapId,
        maker: Participant,
        send_token: TokenId,
        send_amount: Amount,
        receive_token: TokenId,
        receive_amount: Amount,
    ) -> Self {
        Self {
            id,
            maker,
            send_token,
            send_amount,
            receive_token,
            receive_amount,
            matched_with: None,
            active: true,
            failed_cycles: 0,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_with.is_some()
    }

    /// Two swaps match iff makers differ, amounts invert exactly, and tokens
    /// invert exactly.
    pub fn inverts(&self, other: &SwapOrder) -> bool {
        self.maker != other.maker
            && self.send_token == other.receive_token
            && self.send_amount == other.receive_amount
            && self.receive_token == other.send_token
            && self.receive_amount == other.send_amount
    }
}
