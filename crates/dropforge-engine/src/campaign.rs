//! Crowdfunding campaigns: pooled contributions toward a reward, settled by
//! a contribution-weighted draw.
//!
//! A campaign moves `open -> funded -> closed`. The funding flip commits
//! with the contribution that crossed the target; settlement (draw, prize,
//! close) runs in its own transaction afterwards. A crash between the two
//! leaves a funded campaign with no settlement round, which the reconcile
//! sweep picks up on the next start.

use dropforge_core::{weighted_draw, Cents, EngineConfig, Metadata, RandomSource, WeightEntry};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde_json::json;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::ledger;
use crate::lottery::{self, NewRound, Round};
use crate::session;
use crate::store::{now_ms, Store};

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Accepting contributions.
    Open,
    /// Target reached; awaiting settlement.
    Funded,
    /// Settled.
    Closed,
}

impl CampaignStatus {
    /// Canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Funded => "funded",
            Self::Closed => "closed",
        }
    }

    fn parse(value: &str) -> Self {
        match value {
            "funded" => Self::Funded,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

/// What a campaign (or giveaway rule) pays out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    /// An unopened case granted to the winner's inventory.
    Case,
    /// A skin granted directly to the winner's inventory.
    Skin,
    /// The pooled amount credited to the winner's balance.
    Cash,
}

impl RewardKind {
    /// Canonical storage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Case => "case",
            Self::Skin => "skin",
            Self::Cash => "cash",
        }
    }

    /// Parses a kind from its canonical name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRewardKind`] for anything else.
    pub fn parse(value: &str) -> Result<Self, EngineError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "case" => Ok(Self::Case),
            "skin" => Ok(Self::Skin),
            "cash" => Ok(Self::Cash),
            other => Err(EngineError::InvalidRewardKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// A crowdfunding campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    /// Campaign id.
    pub id: i64,
    /// The account that created the campaign.
    pub owner_id: i64,
    /// The session the campaign is bound to, if any. Session-bound
    /// campaigns only accept contributions from participants.
    pub session_id: Option<i64>,
    /// Title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// What the winner receives.
    pub reward_kind: RewardKind,
    /// Reward item name; empty for cash rewards.
    pub reward_name: String,
    /// Funding target in cents.
    pub target_cents: Cents,
    /// Total contributed so far. May exceed the target.
    pub current_cents: Cents,
    /// Lifecycle status.
    pub status: CampaignStatus,
    /// Creation time in epoch milliseconds.
    pub created_at_ms: i64,
    /// Last mutation time in epoch milliseconds.
    pub updated_at_ms: i64,
}

impl Campaign {
    /// Funding progress in `[0, 1]`, clamped at fully funded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        if self.target_cents <= 0 {
            return 0.0;
        }
        (self.current_cents as f64 / self.target_cents as f64).min(1.0)
    }
}

/// Result of a contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionOutcome {
    /// The campaign after the contribution.
    pub campaign: Campaign,
    /// Whether this contribution crossed the target.
    pub funded: bool,
}

/// Result of settling a funded campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// The recorded draw.
    pub round: Round,
    /// The winning account.
    pub winner_id: i64,
    /// What the winner receives.
    pub reward_kind: RewardKind,
    /// Reward item name; empty for cash.
    pub reward_name: String,
    /// The pooled amount, credited for cash rewards.
    pub pot_cents: Cents,
}

/// Creates a campaign.
///
/// A blank reward name for case and skin rewards falls back to the
/// configured default; cash rewards carry no name.
///
/// # Errors
///
/// Returns validation errors for a blank title or non-positive target,
/// [`EngineError::AccountNotFound`] for an unknown owner, and session
/// errors when the bound session is missing or ended.
#[allow(clippy::too_many_arguments)]
pub fn create_campaign(
    store: &Store,
    config: &EngineConfig,
    owner_id: i64,
    session_id: Option<i64>,
    title: &str,
    description: &str,
    reward_kind: RewardKind,
    reward_name: &str,
    target_cents: Cents,
) -> Result<Campaign, EngineError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::EmptyTitle);
    }
    if target_cents <= 0 {
        return Err(EngineError::NonPositiveAmount {
            amount: target_cents,
        });
    }

    let reward_name = match reward_kind {
        RewardKind::Cash => String::new(),
        RewardKind::Case => default_name(reward_name, &config.default_case_reward),
        RewardKind::Skin => default_name(reward_name, &config.default_skin_reward),
    };

    let conn = store.lock();
    ledger::get_account(&conn, owner_id)?;
    if let Some(session_id) = session_id {
        let s = session::get_session(&conn, session_id)?;
        if s.status != session::SessionStatus::Active {
            return Err(EngineError::SessionNotActive { session_id });
        }
    }

    let now = now_ms();
    conn.execute(
        "INSERT INTO campaigns
             (owner_id, session_id, title, description, reward_kind, reward_name, target_cents,
              current_cents, status, created_at_ms, updated_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 'open', ?8, ?8)",
        params![
            owner_id,
            session_id,
            title,
            description,
            reward_kind.as_str(),
            reward_name,
            target_cents,
            now
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(campaign_id = id, owner_id, target_cents, "campaign created");

    Ok(Campaign {
        id,
        owner_id,
        session_id,
        title: title.to_string(),
        description: description.to_string(),
        reward_kind,
        reward_name,
        target_cents,
        current_cents: 0,
        status: CampaignStatus::Open,
        created_at_ms: now,
        updated_at_ms: now,
    })
}

fn default_name(name: &str, fallback: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

/// Loads a campaign by id.
///
/// # Errors
///
/// Returns [`EngineError::CampaignNotFound`] if the campaign does not
/// exist.
pub fn get_campaign(conn: &Connection, campaign_id: i64) -> Result<Campaign, EngineError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, session_id, title, description, reward_kind, reward_name,
                    target_cents, current_cents, status, created_at_ms, updated_at_ms
             FROM campaigns WHERE id = ?1",
            params![campaign_id],
            row_to_raw,
        )
        .optional()?;
    row.map_or(
        Err(EngineError::CampaignNotFound { campaign_id }),
        raw_to_campaign,
    )
}

/// Lists campaigns, newest first, optionally scoped to one session.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn list_campaigns(
    conn: &Connection,
    session_id: Option<i64>,
    limit: u32,
) -> Result<Vec<Campaign>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, session_id, title, description, reward_kind, reward_name,
                target_cents, current_cents, status, created_at_ms, updated_at_ms
         FROM campaigns
         WHERE (?1 IS NULL OR session_id = ?1)
         ORDER BY created_at_ms DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![session_id, limit], row_to_raw)?;

    let mut campaigns = Vec::new();
    for row in rows {
        campaigns.push(raw_to_campaign(row?)?);
    }
    Ok(campaigns)
}

/// Updates a campaign's title and description. Owner only, while open.
///
/// # Errors
///
/// Returns [`EngineError::NotCampaignOwner`] for a non-owner caller,
/// [`EngineError::CampaignNotOpen`] once funding closed, and
/// [`EngineError::EmptyTitle`] for a blank title.
pub fn update_campaign(
    store: &Store,
    owner_id: i64,
    campaign_id: i64,
    title: &str,
    description: &str,
) -> Result<Campaign, EngineError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(EngineError::EmptyTitle);
    }

    let conn = store.lock();
    let campaign = get_campaign(&conn, campaign_id)?;
    owner_check(&campaign, owner_id)?;
    open_check(&campaign)?;

    conn.execute(
        "UPDATE campaigns SET title = ?2, description = ?3, updated_at_ms = ?4 WHERE id = ?1",
        params![campaign_id, title, description, now_ms()],
    )?;
    get_campaign(&conn, campaign_id)
}

/// Deletes a campaign. Owner only, while open, and only before any money
/// arrives.
///
/// # Errors
///
/// Returns [`EngineError::CampaignHasContributions`] once contributions
/// exist, plus the owner and status errors of [`update_campaign`].
pub fn delete_campaign(
    store: &Store,
    owner_id: i64,
    campaign_id: i64,
) -> Result<(), EngineError> {
    let conn = store.lock();
    let campaign = get_campaign(&conn, campaign_id)?;
    owner_check(&campaign, owner_id)?;
    open_check(&campaign)?;
    if campaign.current_cents > 0 {
        return Err(EngineError::CampaignHasContributions { campaign_id });
    }

    conn.execute("DELETE FROM campaigns WHERE id = ?1", params![campaign_id])?;
    Ok(())
}

fn owner_check(campaign: &Campaign, account_id: i64) -> Result<(), EngineError> {
    if campaign.owner_id == account_id {
        Ok(())
    } else {
        Err(EngineError::NotCampaignOwner {
            account_id,
            campaign_id: campaign.id,
        })
    }
}

fn open_check(campaign: &Campaign) -> Result<(), EngineError> {
    if campaign.status == CampaignStatus::Open {
        Ok(())
    } else {
        Err(EngineError::CampaignNotOpen {
            campaign_id: campaign.id,
            status: campaign.status.as_str().to_string(),
        })
    }
}

/// Contributes `amount` cents to an open campaign.
///
/// One transaction: debit the contributor, record the contribution, bump
/// the campaign total, and flip to `funded` if the target is crossed. The
/// full amount is accepted even when it overshoots the target — the
/// overshoot stays in the pot.
///
/// # Errors
///
/// Returns [`EngineError::NonPositiveAmount`] for a non-positive amount,
/// [`EngineError::CampaignNotOpen`] when funding already closed,
/// [`EngineError::NotSessionParticipant`] when a session-bound campaign is
/// funded by a non-participant, and [`EngineError::InsufficientFunds`] when
/// the contributor cannot cover it.
pub fn contribute(
    store: &Store,
    account_id: i64,
    campaign_id: i64,
    amount: Cents,
) -> Result<ContributionOutcome, EngineError> {
    if amount <= 0 {
        return Err(EngineError::NonPositiveAmount { amount });
    }

    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let campaign = get_campaign(&tx, campaign_id)?;
    open_check(&campaign)?;
    if let Some(session_id) = campaign.session_id {
        let s = session::get_session(&tx, session_id)?;
        if s.status != session::SessionStatus::Active {
            return Err(EngineError::SessionNotActive { session_id });
        }
        if !session::is_participant(&tx, session_id, account_id)? {
            return Err(EngineError::NotSessionParticipant {
                account_id,
                session_id,
            });
        }
    }

    let meta = Metadata::new().with("campaign_id", campaign_id);
    ledger::adjust_balance(&tx, account_id, -amount, ledger::REASON_CASE_CONTRIBUTION, &meta)?;

    let now = now_ms();
    tx.execute(
        "INSERT INTO contributions (campaign_id, account_id, amount_cents, created_at_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![campaign_id, account_id, amount, now],
    )?;

    let current = campaign.current_cents + amount;
    let funded = current >= campaign.target_cents;
    let status = if funded {
        CampaignStatus::Funded
    } else {
        CampaignStatus::Open
    };
    tx.execute(
        "UPDATE campaigns SET current_cents = ?2, status = ?3, updated_at_ms = ?4 WHERE id = ?1",
        params![campaign_id, current, status.as_str(), now],
    )?;
    tx.commit()?;

    if funded {
        info!(campaign_id, current, "campaign funded");
    }

    let campaign = Campaign {
        current_cents: current,
        status,
        updated_at_ms: now,
        ..campaign
    };
    Ok(ContributionOutcome { campaign, funded })
}

/// Per-account contribution totals, the settlement draw weights.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn contribution_weights(
    conn: &Connection,
    campaign_id: i64,
) -> Result<Vec<WeightEntry<i64>>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT account_id, SUM(amount_cents) FROM contributions
         WHERE campaign_id = ?1 GROUP BY account_id ORDER BY account_id",
    )?;
    let rows = stmt.query_map(params![campaign_id], |row| {
        Ok(WeightEntry::new(row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// One contributor's stake in a campaign.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributorShare {
    /// The contributing account.
    pub account_id: i64,
    /// Total contributed by this account.
    pub amount_cents: Cents,
    /// This account's share of the draw, in `[0, 1]`.
    pub win_chance: f64,
}

/// A campaign with its contributor breakdown and settlement round, for
/// display.
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignProgress {
    /// The campaign.
    pub campaign: Campaign,
    /// Per-contributor totals and draw shares.
    pub contributors: Vec<ContributorShare>,
    /// The settlement round, once closed.
    pub round: Option<Round>,
}

/// Assembles the progress view for a campaign.
///
/// # Errors
///
/// Returns [`EngineError::CampaignNotFound`] for an unknown campaign.
#[allow(clippy::cast_precision_loss)]
pub fn progress_view(
    conn: &Connection,
    campaign_id: i64,
) -> Result<CampaignProgress, EngineError> {
    let campaign = get_campaign(conn, campaign_id)?;
    let weights = contribution_weights(conn, campaign_id)?;
    let total: Cents = weights.iter().map(|w| w.weight).sum();

    let contributors = weights
        .into_iter()
        .map(|w| ContributorShare {
            account_id: w.id,
            amount_cents: w.weight,
            win_chance: if total > 0 {
                w.weight as f64 / total as f64
            } else {
                0.0
            },
        })
        .collect();

    let round = lottery::campaign_round(conn, campaign_id)?;
    Ok(CampaignProgress {
        campaign,
        contributors,
        round,
    })
}

/// Settles a funded campaign: draws the winner weighted by contributed
/// cents, records the round, pays cash rewards, and closes the campaign.
///
/// Item rewards (case, skin) are granted by the caller after this commits.
/// Settling an already closed campaign returns its existing round, so the
/// operation is safe to repeat.
///
/// # Errors
///
/// Returns [`EngineError::CampaignNotOpen`] when the campaign is still
/// open, [`EngineError::NoContributors`] if the contribution list is
/// empty (a funded campaign always has at least one), and
/// [`EngineError::SettlementRecordMissing`] when a closed campaign has no
/// usable round to report.
pub fn settle(
    store: &Store,
    campaign_id: i64,
    rng: &dyn RandomSource,
) -> Result<Settlement, EngineError> {
    let mut conn = store.lock();
    let tx = conn.transaction()?;

    let campaign = get_campaign(&tx, campaign_id)?;
    match campaign.status {
        CampaignStatus::Open => {
            return Err(EngineError::CampaignNotOpen {
                campaign_id,
                status: campaign.status.as_str().to_string(),
            });
        }
        CampaignStatus::Closed => {
            let round = lottery::campaign_round(&tx, campaign_id)?
                .ok_or(EngineError::SettlementRecordMissing { campaign_id })?;
            let winner_id = round
                .winner_id
                .ok_or(EngineError::SettlementRecordMissing { campaign_id })?;
            return Ok(Settlement {
                winner_id,
                reward_kind: campaign.reward_kind,
                reward_name: campaign.reward_name,
                pot_cents: campaign.current_cents,
                round,
            });
        }
        CampaignStatus::Funded => {}
    }

    let weights = contribution_weights(&tx, campaign_id)?;
    let Some(&winner_id) = weighted_draw(&weights, rng)? else {
        warn!(campaign_id, "funded campaign has no contributors");
        return Err(EngineError::NoContributors { campaign_id });
    };

    let pot_cents = campaign.current_cents;
    let prize_cents = if campaign.reward_kind == RewardKind::Cash {
        let meta = Metadata::new()
            .with("campaign_id", campaign_id)
            .with("source", "crowdfunding_reward");
        ledger::adjust_balance(&tx, winner_id, pot_cents, ledger::REASON_LOTTERY_REWARD, &meta)?;
        pot_cents
    } else {
        0
    };

    let round = lottery::insert_round(
        &tx,
        NewRound {
            trigger_kind: lottery::TRIGGER_CROWDFUNDING,
            trigger_event_id: None,
            campaign_id: Some(campaign_id),
            session_id: campaign.session_id,
            winner_id: Some(winner_id),
            prize_cents,
            details: json!({
                "reward_kind": campaign.reward_kind.as_str(),
                "reward_name": campaign.reward_name,
                "pot_cents": pot_cents,
                "contributors": weights.len(),
            }),
        },
    )?;

    tx.execute(
        "UPDATE campaigns SET status = 'closed', updated_at_ms = ?2 WHERE id = ?1",
        params![campaign_id, now_ms()],
    )?;
    tx.commit()?;

    info!(campaign_id, winner_id, pot_cents, "campaign settled");
    Ok(Settlement {
        round,
        winner_id,
        reward_kind: campaign.reward_kind,
        reward_name: campaign.reward_name,
        pot_cents,
    })
}

/// Funded campaigns with no settlement round: the crash window between the
/// funding flip and settlement.
///
/// # Errors
///
/// Returns a database error on failure.
pub fn unsettled_funded(conn: &Connection) -> Result<Vec<i64>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT c.id FROM campaigns c
         WHERE c.status = 'funded'
           AND NOT EXISTS (SELECT 1 FROM lottery_rounds r WHERE r.campaign_id = c.id)
         ORDER BY c.id",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

type RawCampaign = (
    i64,
    i64,
    Option<i64>,
    String,
    String,
    String,
    String,
    Cents,
    Cents,
    String,
    i64,
    i64,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawCampaign> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
        row.get(11)?,
    ))
}

fn raw_to_campaign(raw: RawCampaign) -> Result<Campaign, EngineError> {
    let (
        id,
        owner_id,
        session_id,
        title,
        description,
        reward_kind,
        reward_name,
        target_cents,
        current_cents,
        status,
        created_at_ms,
        updated_at_ms,
    ) = raw;
    Ok(Campaign {
        id,
        owner_id,
        session_id,
        title,
        description,
        reward_kind: RewardKind::parse(&reward_kind)?,
        reward_name,
        target_cents,
        current_cents,
        status: CampaignStatus::parse(&status),
        created_at_ms,
        updated_at_ms,
    })
}
