//! Engine error type and taxonomy.
//!
//! Every failure maps to one of four kinds: validation (malformed input),
//! conflict (the operation is not valid in the current state), not-found,
//! and transient infrastructure. Validation and conflict errors abort the
//! current atomic unit with a full rollback and are surfaced verbatim;
//! transient errors during money/state mutation abort and may be retried by
//! the caller. Price-lookup failures never reach this type — they degrade
//! to fallback pricing inside the resolver.

use dropforge_core::{Cents, DrawError};
use thiserror::Error;

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// The operation conflicts with current state.
    Conflict,
    /// The referenced entity does not exist.
    NotFound,
    /// Infrastructure failure; the operation may be retried.
    Transient,
}

/// Errors from engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    // --- validation ------------------------------------------------------
    /// An amount that must be positive was zero or negative.
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The rejected amount in cents.
        amount: Cents,
    },

    /// A balance adjustment with a zero delta.
    #[error("balance delta must be non-zero")]
    ZeroDelta,

    /// A ledger entry without a reason code.
    #[error("reason is required")]
    EmptyReason,

    /// A campaign without a title.
    #[error("campaign title is required")]
    EmptyTitle,

    /// An unknown reward kind on a campaign or giveaway rule.
    #[error("unknown reward kind: {kind:?}")]
    InvalidRewardKind {
        /// The rejected kind string.
        kind: String,
    },

    /// An unknown inventory item kind.
    #[error("unknown item kind: {kind:?}")]
    InvalidItemKind {
        /// The rejected kind string.
        kind: String,
    },

    /// An inventory item without a name.
    #[error("item name is required")]
    EmptyItemName,

    /// A weight set whose total is not positive.
    #[error("invalid weight set: total weight {total} is not positive")]
    InvalidWeights {
        /// The computed total weight.
        total: i64,
    },

    // --- conflict --------------------------------------------------------
    /// The adjustment would take the balance below zero.
    #[error("insufficient funds: account {account_id} has {balance}, delta {delta}")]
    InsufficientFunds {
        /// The account whose balance was checked.
        account_id: i64,
        /// The balance at check time.
        balance: Cents,
        /// The rejected delta.
        delta: Cents,
    },

    /// Contribution to a campaign that is not open.
    #[error("campaign {campaign_id} is not open for funding (status: {status})")]
    CampaignNotOpen {
        /// The campaign.
        campaign_id: i64,
        /// Its current status.
        status: String,
    },

    /// Case-open on an item that is not an unopened case owned by the
    /// caller.
    #[error("item {item_id} is not an unopened case")]
    ItemNotOpenable {
        /// The item.
        item_id: i64,
    },

    /// Sell on an item that is not in the `available` state.
    #[error("item {item_id} cannot be sold (status: {status})")]
    ItemNotSellable {
        /// The item.
        item_id: i64,
        /// Its current status.
        status: String,
    },

    /// The caller does not own the resource.
    #[error("account {account_id} does not own item {item_id}")]
    NotItemOwner {
        /// The caller.
        account_id: i64,
        /// The item.
        item_id: i64,
    },

    /// The caller does not own the campaign.
    #[error("account {account_id} does not own campaign {campaign_id}")]
    NotCampaignOwner {
        /// The caller.
        account_id: i64,
        /// The campaign.
        campaign_id: i64,
    },

    /// Deletion of a campaign that already holds contributions.
    #[error("campaign {campaign_id} has contributions and cannot be deleted")]
    CampaignHasContributions {
        /// The campaign.
        campaign_id: i64,
    },

    /// The caller does not own the session.
    #[error("account {account_id} does not own session {session_id}")]
    NotSessionOwner {
        /// The caller.
        account_id: i64,
        /// The session.
        session_id: i64,
    },

    /// Contribution to a session-bound campaign by a non-participant.
    #[error("account {account_id} has not joined session {session_id}")]
    NotSessionParticipant {
        /// The caller.
        account_id: i64,
        /// The session the campaign is bound to.
        session_id: i64,
    },

    /// The session is not active.
    #[error("session {session_id} is not active")]
    SessionNotActive {
        /// The session.
        session_id: i64,
    },

    /// Settlement found no contributors to draw from.
    #[error("campaign {campaign_id} has no contributors to draw from")]
    NoContributors {
        /// The campaign.
        campaign_id: i64,
    },

    // --- not found -------------------------------------------------------
    /// Unknown account.
    #[error("account not found: {account_id}")]
    AccountNotFound {
        /// The missing account id.
        account_id: i64,
    },

    /// Unknown campaign.
    #[error("campaign not found: {campaign_id}")]
    CampaignNotFound {
        /// The missing campaign id.
        campaign_id: i64,
    },

    /// Unknown inventory item.
    #[error("item not found: {item_id}")]
    ItemNotFound {
        /// The missing item id.
        item_id: i64,
    },

    /// Unknown session or invite code.
    #[error("session not found: {reference}")]
    SessionNotFound {
        /// Session id or invite code.
        reference: String,
    },

    /// Unknown giveaway rule.
    #[error("giveaway rule not found: {rule_id}")]
    RuleNotFound {
        /// The missing rule id.
        rule_id: i64,
    },

    /// A closed campaign whose settlement round is missing or carries no
    /// winner.
    #[error("settlement record for campaign {campaign_id} is missing or incomplete")]
    SettlementRecordMissing {
        /// The campaign.
        campaign_id: i64,
    },

    // --- transient -------------------------------------------------------
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The random source failed to produce a value.
    #[error("random source failure: {0}")]
    RandomSource(String),
}

impl EngineError {
    /// Classifies this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NonPositiveAmount { .. }
            | Self::ZeroDelta
            | Self::EmptyReason
            | Self::EmptyTitle
            | Self::InvalidRewardKind { .. }
            | Self::InvalidItemKind { .. }
            | Self::EmptyItemName
            | Self::InvalidWeights { .. } => ErrorKind::Validation,

            Self::InsufficientFunds { .. }
            | Self::CampaignNotOpen { .. }
            | Self::ItemNotOpenable { .. }
            | Self::ItemNotSellable { .. }
            | Self::NotItemOwner { .. }
            | Self::NotCampaignOwner { .. }
            | Self::CampaignHasContributions { .. }
            | Self::NotSessionOwner { .. }
            | Self::NotSessionParticipant { .. }
            | Self::SessionNotActive { .. }
            | Self::NoContributors { .. } => ErrorKind::Conflict,

            Self::AccountNotFound { .. }
            | Self::CampaignNotFound { .. }
            | Self::ItemNotFound { .. }
            | Self::SessionNotFound { .. }
            | Self::RuleNotFound { .. }
            | Self::SettlementRecordMissing { .. } => ErrorKind::NotFound,

            Self::Database(_) | Self::RandomSource(_) => ErrorKind::Transient,
        }
    }
}

impl From<DrawError> for EngineError {
    fn from(err: DrawError) -> Self {
        match err {
            DrawError::InvalidWeights { total } => Self::InvalidWeights { total },
            DrawError::RandomSource(detail) => Self::RandomSource(detail),
            // DrawError is non-exhaustive; treat unknown variants as draw
            // infrastructure failures.
            other => Self::RandomSource(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            EngineError::NonPositiveAmount { amount: -5 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::InsufficientFunds {
                account_id: 1,
                balance: 10,
                delta: -20
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::CampaignNotFound { campaign_id: 9 }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::RandomSource("entropy".into()).kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn test_draw_error_mapping() {
        let err: EngineError = DrawError::InvalidWeights { total: 0 }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err: EngineError = DrawError::RandomSource("closed".into()).into();
        assert_eq!(err.kind(), ErrorKind::Transient);
    }
}
