use crate::domain::Decimal;
use crate::error::{AnalyticsError, OrOverflow, Result};
use serde::{Deserialize, Serialize};

use super::{records, FlatState};

/// A single purchase tracked for FIFO cost basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub bought_shares: Decimal,
    /// Shares of this lot not yet consumed by sells. Zero means exhausted.
    pub remaining_shares: Decimal,
    pub entry_price: Decimal,
}

impl Lot {
    pub fn new(shares: Decimal, entry_price: Decimal) -> Self {
        Self {
            bought_shares: shares,
            remaining_shares: shares,
            entry_price,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_shares.is_zero()
    }
}

/// FIFO realized/unrealized profit-and-loss tracker for one position.
///
/// Lots are append-only: exhausted lots stay in place with zero remaining shares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotPnlTracker {
    realized_pnl: Decimal,
    lots: Vec<Lot>,
}

impl LotPnlTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a buy (positive delta) or a sell (negative delta) at `price`.
    ///
    /// # Errors
    /// Returns [`AnalyticsError::Oversell`] if a sell exceeds the shares currently
    /// held, or [`AnalyticsError::Overflow`] if the realized PnL leaves the decimal
    /// range. The tracker is left untouched in both cases.
    pub fn add_transaction(&mut self, share_delta: Decimal, price: Decimal) -> Result<()> {
        if share_delta.is_negative() {
            let requested = -share_delta;
            let available = self.remaining_shares()?;
            if requested > available {
                return Err(AnalyticsError::Oversell {
                    requested,
                    available,
                });
            }
        }
        let shortfall = self.apply(share_delta, price)?;
        debug_assert!(shortfall.is_zero());
        Ok(())
    }

    /// Record a transaction, consuming whatever is held when a sell is too large.
    ///
    /// Returns the unfilled part of the sell (zero when fully covered). The
    /// shortfall contributes nothing to realized PnL.
    pub fn add_transaction_truncating(
        &mut self,
        share_delta: Decimal,
        price: Decimal,
    ) -> Result<Decimal> {
        let shortfall = self.apply(share_delta, price)?;
        if !shortfall.is_zero() {
            tracing::warn!(
                %share_delta,
                %price,
                %shortfall,
                "Sell exceeds tracked shares, truncating"
            );
        }
        Ok(shortfall)
    }

    fn apply(&mut self, share_delta: Decimal, price: Decimal) -> Result<Decimal> {
        if share_delta.is_zero() {
            return Ok(Decimal::zero());
        }

        if share_delta.is_positive() {
            self.lots.push(Lot::new(share_delta, price));
            return Ok(Decimal::zero());
        }

        // Plan the FIFO walk first so an overflow leaves every lot untouched.
        let mut to_sell = -share_delta;
        let mut trx_pnl = Decimal::zero();
        let mut consumption = Vec::new();
        for (idx, lot) in self.lots.iter().enumerate() {
            if to_sell.is_zero() {
                break;
            }
            if lot.is_exhausted() {
                continue;
            }
            let consumed = to_sell.min(lot.remaining_shares);
            let lot_pnl = price
                .checked_sub(lot.entry_price)
                .and_then(|diff| consumed.checked_mul(diff))
                .or_overflow("realized pnl")?;
            trx_pnl = trx_pnl.checked_add(lot_pnl).or_overflow("realized pnl")?;
            to_sell -= consumed;
            consumption.push((idx, consumed));
        }
        let realized_pnl = self
            .realized_pnl
            .checked_add(trx_pnl)
            .or_overflow("realized pnl")?;

        for (idx, consumed) in consumption {
            let lot = &mut self.lots[idx];
            lot.remaining_shares -= consumed;
            tracing::debug!(lot = idx, %consumed, entry_price = %lot.entry_price, "Consumed lot");
        }
        self.realized_pnl = realized_pnl;
        Ok(to_sell)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    /// Paper PnL of the open lots valued at `current_price`.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Result<Decimal> {
        let mut total = Decimal::zero();
        for lot in self.open_lots() {
            let lot_pnl = current_price
                .checked_sub(lot.entry_price)
                .and_then(|diff| lot.remaining_shares.checked_mul(diff))
                .or_overflow("unrealized pnl")?;
            total = total.checked_add(lot_pnl).or_overflow("unrealized pnl")?;
        }
        Ok(total)
    }

    pub fn remaining_shares(&self) -> Result<Decimal> {
        Decimal::checked_sum(self.lots.iter().map(|lot| lot.remaining_shares))
            .or_overflow("remaining shares")
    }

    /// Share-weighted entry price of the open lots, 0 when flat.
    pub fn remaining_shares_avg_entry_price(&self) -> Result<Decimal> {
        let mut weighted = Decimal::zero();
        let mut shares = Decimal::zero();
        for lot in self.open_lots() {
            weighted = lot
                .remaining_shares
                .checked_mul(lot.entry_price)
                .and_then(|cost| weighted.checked_add(cost))
                .or_overflow("avg entry price")?;
            shares = shares
                .checked_add(lot.remaining_shares)
                .or_overflow("avg entry price")?;
        }
        if shares.is_zero() {
            return Ok(Decimal::zero());
        }
        weighted.checked_div(shares).or_overflow("avg entry price")
    }

    pub fn lots(&self) -> &[Lot] {
        &self.lots
    }

    pub fn open_lot_count(&self) -> usize {
        self.open_lots().count()
    }

    pub fn is_flat(&self) -> bool {
        self.open_lots().next().is_none()
    }

    fn open_lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter().filter(|lot| !lot.is_exhausted())
    }
}

impl FlatState for LotPnlTracker {
    const KIND: &'static str = "pnl";

    /// `[realizedPnl, bought1, remaining1, entry1, bought2, ...]`
    fn to_flat(&self) -> Vec<Decimal> {
        let mut out = Vec::with_capacity(1 + self.lots.len() * 3);
        out.push(self.realized_pnl);
        for lot in &self.lots {
            out.push(lot.bought_shares);
            out.push(lot.remaining_shares);
            out.push(lot.entry_price);
        }
        out
    }

    fn from_flat(values: &[Decimal]) -> Result<Self> {
        let Some((realized_pnl, rest)) = values.split_first() else {
            return Ok(Self::new());
        };
        let lots = records(Self::KIND, rest, 3)?
            .map(|chunk| Lot {
                bought_shares: chunk[0],
                remaining_shares: chunk[1],
                entry_price: chunk[2],
            })
            .collect();
        Ok(Self {
            realized_pnl: *realized_pnl,
            lots,
        })
    }
}
