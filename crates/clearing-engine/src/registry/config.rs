use clearing_types::TokenId;

/// A participant's configured token acceptance and payout preference.
///
/// Invariant: `rank` is a permutation of `accepted` with no duplicates;
/// `preferred == rank[0]` whenever `rank` is set. Both invariants are
/// enforced at construction, not re-checked on every read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    accepted: Vec<TokenId>,
    preferred: TokenId,
    rank: Vec<TokenId>,
}

impl UserConfig {
    /// Configure accepted tokens and a preferred token. The preference rank
    /// is derived deterministically: the preferred token first, the
    /// remaining accepted tokens in the order given.
    pub fn configure_accepted(
        accepted: Vec<TokenId>,
        preferred: TokenId,
    ) -> Result<Self, ConfigError> {
        let rank = derive_rank(&accepted, preferred)?;
        Ok(Self {
            accepted,
            preferred,
            rank,
        })
    }

    /// Configure accepted tokens with an explicit preference rank.
    pub fn configure_ranked(
        accepted: Vec<TokenId>,
        ranked: Vec<TokenId>,
    ) -> Result<Self, ConfigError> {
        if accepted.is_empty() {
            return Err(ConfigError::EmptyAccepted);
        }
        if !is_permutation(&accepted, &ranked) {
            return Err(ConfigError::RankNotPermutation);
        }
        Ok(Self {
            accepted,
            preferred: ranked[0],
            rank: ranked,
        })
    }

    pub fn accepted(&self) -> &[TokenId] {
        &self.accepted
    }

    pub fn preferred(&self) -> TokenId {
        self.preferred
    }

    /// The accepted tokens in preference order, most preferred first.
    pub fn rank(&self) -> &[TokenId] {
        &self.rank
    }

    pub fn accepts(&self, token: TokenId) -> bool {
        self.accepted.contains(&token)
    }
}

fn derive_rank(accepted: &[TokenId], preferred: TokenId) -> Result<Vec<TokenId>, ConfigError> {
    if accepted.is_empty() {
        return Err(ConfigError::EmptyAccepted);
    }
    if !accepted.contains(&preferred) {
        return Err(ConfigError::PreferredNotAccepted);
    }
    let mut rank = vec![preferred];
    rank.extend(accepted.iter().copied().filter(|t| *t != preferred));
    Ok(rank)
}

fn is_permutation(accepted: &[TokenId], ranked: &[TokenId]) -> bool {
    if accepted.len() != ranked.len() {
        return false;
    }
    let mut sorted_accepted = accepted.to_vec();
    let mut sorted_ranked = ranked.to_vec();
    sorted_accepted.sort_by_key(|t| t.0);
    sorted_ranked.sort_by_key(|t| t.0);
    sorted_accepted == sorted_ranked
        && sorted_ranked.windows(2).all(|pair| pair[0] != pair[1])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("accepted token set must be non-empty")]
    EmptyAccepted,
    #[error("preferred token must appear in the accepted set")]
    PreferredNotAccepted,
    #[error("rank must be a duplicate-free permutation of the accepted set")]
    RankNotPermutation,
}
