//! Distribution keys (tantièmes): lot shares, prorata percentages and allocations.

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use copro_domain::{
    checked_sum, ensure_money_scale, split_by_weights, Book, DistributionKey, LotId, LotShare,
    ResidenceId, ShareAllocation, MAX_AMOUNT,
};

use crate::{ledger_service::required, CoreError};

/// Where a distribution key is still referenced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyUsage {
    pub budget_lines: Vec<Uuid>,
    pub regularizations: Vec<Uuid>,
}

impl KeyUsage {
    pub fn is_used(&self) -> bool {
        !self.budget_lines.is_empty() || !self.regularizations.is_empty()
    }
}

pub struct DistributionService;

impl DistributionService {
    pub fn create_key(
        book: &mut Book,
        residence_id: ResidenceId,
        code: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<Uuid, CoreError> {
        let code = DistributionKey::normalize_code(&required("key code", code)?);
        let name = required("key name", name)?;
        if book
            .keys
            .iter()
            .any(|key| key.residence_id == residence_id && key.code == code)
        {
            return Err(CoreError::Conflict(format!(
                "distribution key `{code}` already exists"
            )));
        }
        let key = DistributionKey::new(residence_id, &code, name, description);
        let id = key.id;
        info!(key_id = %id, %code, %residence_id, "distribution key created");
        book.keys.push(key);
        book.touch();
        Ok(id)
    }

    pub fn list_keys(book: &Book, residence_id: ResidenceId) -> Vec<&DistributionKey> {
        let mut keys: Vec<_> = book
            .keys
            .iter()
            .filter(|key| key.residence_id == residence_id)
            .collect();
        keys.sort_by(|a, b| a.code.cmp(&b.code));
        keys
    }

    pub fn find_key_by_code<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        code: &str,
    ) -> Option<&'a DistributionKey> {
        let code = DistributionKey::normalize_code(code);
        book.keys
            .iter()
            .find(|key| key.residence_id == residence_id && key.code == code)
    }

    /// Inserts or updates the shares of a lot under a key.
    pub fn set_share(
        book: &mut Book,
        residence_id: ResidenceId,
        key_id: Uuid,
        lot_id: LotId,
        shares: Decimal,
    ) -> Result<(), CoreError> {
        Self::scoped_key(book, residence_id, key_id)?;
        if shares.is_sign_negative() && !shares.is_zero() {
            return Err(CoreError::Validation("shares must not be negative".into()));
        }
        if shares > MAX_AMOUNT {
            return Err(CoreError::Validation(format!(
                "shares must not exceed {MAX_AMOUNT}"
            )));
        }
        match book
            .shares
            .iter_mut()
            .find(|share| share.key_id == key_id && share.lot_id == lot_id)
        {
            Some(existing) => existing.shares = shares,
            None => book.shares.push(LotShare::new(key_id, lot_id, shares)),
        }
        info!(%key_id, %lot_id, %shares, "lot share set");
        book.touch();
        Ok(())
    }

    /// Removes a lot from a key, returning whether a row existed.
    pub fn remove_share(
        book: &mut Book,
        residence_id: ResidenceId,
        key_id: Uuid,
        lot_id: LotId,
    ) -> Result<bool, CoreError> {
        Self::scoped_key(book, residence_id, key_id)?;
        let before = book.shares.len();
        book.shares
            .retain(|share| !(share.key_id == key_id && share.lot_id == lot_id));
        let removed = book.shares.len() != before;
        if removed {
            info!(%key_id, %lot_id, "lot share removed");
            book.touch();
        }
        Ok(removed)
    }

    pub fn shares_of(book: &Book, key_id: Uuid) -> Vec<&LotShare> {
        book.shares
            .iter()
            .filter(|share| share.key_id == key_id)
            .collect()
    }

    pub fn total_shares(book: &Book, key_id: Uuid) -> Result<Decimal, CoreError> {
        Ok(checked_sum(
            book.shares
                .iter()
                .filter(|share| share.key_id == key_id)
                .map(|share| share.shares),
        )?)
    }

    /// `shares(key, lot) / Σ shares(key)`, zero when the key has no shares.
    pub fn percentage(book: &Book, key_id: Uuid, lot_id: LotId) -> Result<Decimal, CoreError> {
        let total = Self::total_shares(book, key_id)?;
        if total.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let lot_shares = checked_sum(
            book.shares
                .iter()
                .filter(|share| share.key_id == key_id && share.lot_id == lot_id)
                .map(|share| share.shares),
        )?;
        Ok(lot_shares / total)
    }

    /// Every lot's ratio under the key, in insertion order.
    pub fn percentages(book: &Book, key_id: Uuid) -> Result<Vec<ShareAllocation>, CoreError> {
        let total = Self::total_shares(book, key_id)?;
        Ok(Self::shares_of(book, key_id)
            .into_iter()
            .map(|share| ShareAllocation {
                lot_id: share.lot_id,
                shares: share.shares,
                percentage: if total.is_zero() {
                    Decimal::ZERO
                } else {
                    share.shares / total
                },
                amount: Decimal::ZERO,
            })
            .collect())
    }

    /// Prorates `amount` across the key's lots to the cent; parts sum to `amount`.
    pub fn allocate(
        book: &Book,
        residence_id: ResidenceId,
        key_id: Uuid,
        amount: Decimal,
    ) -> Result<Vec<ShareAllocation>, CoreError> {
        Self::scoped_key(book, residence_id, key_id)?;
        let amount = ensure_money_scale(amount)?;
        let mut allocations = Self::percentages(book, key_id)?;
        let weights: Vec<Decimal> = allocations.iter().map(|a| a.shares).collect();
        for (allocation, part) in allocations
            .iter_mut()
            .zip(split_by_weights(amount, &weights)?)
        {
            allocation.amount = part;
        }
        Ok(allocations)
    }

    pub fn usage(book: &Book, key_id: Uuid) -> KeyUsage {
        KeyUsage {
            budget_lines: book
                .budget_lines
                .iter()
                .filter(|line| line.distribution_key_id == Some(key_id))
                .map(|line| line.id)
                .collect(),
            regularizations: book
                .regularizations
                .iter()
                .filter(|reg| reg.distribution_key_ids.contains(&key_id))
                .map(|reg| reg.id)
                .collect(),
        }
    }

    /// Deletes a key and its shares unless a budget line or regularization uses it.
    pub fn delete_key(
        book: &mut Book,
        residence_id: ResidenceId,
        key_id: Uuid,
    ) -> Result<(), CoreError> {
        Self::scoped_key(book, residence_id, key_id)?;
        let usage = Self::usage(book, key_id);
        if usage.is_used() {
            return Err(CoreError::InUse {
                entity: "distribution key",
                id: key_id.to_string(),
                reason: format!(
                    "referenced by {} budget line(s) and {} regularization(s)",
                    usage.budget_lines.len(),
                    usage.regularizations.len()
                ),
            });
        }
        book.keys.retain(|key| key.id != key_id);
        book.shares.retain(|share| share.key_id != key_id);
        info!(%key_id, "distribution key deleted");
        book.touch();
        Ok(())
    }

    fn scoped_key<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        key_id: Uuid,
    ) -> Result<&'a DistributionKey, CoreError> {
        book.key(key_id)
            .filter(|key| key.residence_id == residence_id)
            .ok_or_else(|| CoreError::not_found("Distribution key", key_id))
    }
}
