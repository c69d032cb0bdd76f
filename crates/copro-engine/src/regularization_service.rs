//! Year-end charge regularizations per lease.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use copro_domain::{
    checked_total, ensure_money_scale, round_cents, AmountError, Book, DateRange, LeaseId, LotId,
    ReferenceDirectory, Regularization, RegularizationNotice, ResidenceId,
};

use crate::{
    budget_service::BudgetService, context::CallerContext,
    distribution_service::DistributionService, time::Clock, CoreError,
};

/// Caller input for [`RegularizationService::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegularization {
    pub lease_id: LeaseId,
    pub lot_id: Option<LotId>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub provisions_total: Decimal,
    pub actual_charges: Decimal,
}

/// Charges of one lot derived from a budget, with the keys that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedCharges {
    pub amount: Decimal,
    pub key_ids: Vec<Uuid>,
}

pub struct RegularizationService;

impl RegularizationService {
    /// Records a pending regularization; the balance is always derived.
    pub fn create(
        book: &mut Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        input: NewRegularization,
    ) -> Result<Uuid, CoreError> {
        let reg = Self::build(book, ctx, clock, input)?;
        Ok(Self::insert(book, reg))
    }

    /// Σ over the budget's keyed lines with an actual amount of
    /// `actual × percentage(key, lot)`, rounded to cents.
    pub fn compute_charges(
        book: &Book,
        residence_id: ResidenceId,
        lot_id: LotId,
        budget_id: Uuid,
    ) -> Result<ComputedCharges, CoreError> {
        BudgetService::scoped_budget(book, residence_id, budget_id)?;
        let mut amount = Decimal::ZERO;
        let mut key_ids = Vec::new();
        for line in book.lines_of_budget(budget_id) {
            let (Some(key_id), Some(actual)) = (line.distribution_key_id, line.actual_amount)
            else {
                continue;
            };
            let share = actual
                .checked_mul(DistributionService::percentage(book, key_id, lot_id)?)
                .ok_or(AmountError::Overflow)?;
            amount = checked_total(amount, share)?;
            if !key_ids.contains(&key_id) {
                key_ids.push(key_id);
            }
        }
        Ok(ComputedCharges {
            amount: round_cents(amount),
            key_ids,
        })
    }

    /// Creates a regularization over the budget's fiscal year whose actual
    /// charges come from [`Self::compute_charges`].
    pub fn create_from_budget(
        book: &mut Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        lease_id: LeaseId,
        lot_id: LotId,
        budget_id: Uuid,
        provisions_total: Decimal,
    ) -> Result<Uuid, CoreError> {
        let fiscal_year =
            BudgetService::scoped_budget(book, ctx.residence_id, budget_id)?.fiscal_year;
        let period = DateRange::fiscal_year(fiscal_year).ok_or_else(|| {
            CoreError::Validation(format!("fiscal year {fiscal_year} is out of range"))
        })?;
        let charges = Self::compute_charges(book, ctx.residence_id, lot_id, budget_id)?;
        let mut reg = Self::build(
            book,
            ctx,
            clock,
            NewRegularization {
                lease_id,
                lot_id: Some(lot_id),
                period_start: period.start,
                period_end: period.end,
                provisions_total,
                actual_charges: charges.amount,
            },
        )?;
        reg.distribution_key_ids = charges.key_ids;
        Ok(Self::insert(book, reg))
    }

    /// `pending -> sent`.
    pub fn send(
        book: &mut Book,
        residence_id: ResidenceId,
        regularization_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        let reg = Self::scoped_mut(book, residence_id, regularization_id)?;
        reg.mark_sent(clock.now())?;
        info!(%regularization_id, balance = %reg.balance, "regularization sent");
        book.touch();
        Ok(())
    }

    /// `sent -> paid`.
    pub fn mark_paid(
        book: &mut Book,
        residence_id: ResidenceId,
        regularization_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        let reg = Self::scoped_mut(book, residence_id, regularization_id)?;
        reg.mark_paid(clock.now())?;
        info!(%regularization_id, "regularization paid");
        book.touch();
        Ok(())
    }

    pub fn list(book: &Book, residence_id: ResidenceId) -> Vec<&Regularization> {
        let mut regs: Vec<_> = book
            .regularizations
            .iter()
            .filter(|reg| reg.residence_id == residence_id)
            .collect();
        regs.sort_by(|a, b| b.period_end.cmp(&a.period_end));
        regs
    }

    /// Everything the notification collaborator needs to inform the tenant.
    pub fn notice(
        book: &Book,
        residence_id: ResidenceId,
        regularization_id: Uuid,
        directory: &dyn ReferenceDirectory,
    ) -> Result<RegularizationNotice, CoreError> {
        let reg = book
            .regularization(regularization_id)
            .filter(|reg| reg.residence_id == residence_id)
            .ok_or_else(|| CoreError::not_found("Regularization", regularization_id))?;
        let lot = match reg.lot_id {
            Some(lot_id) => directory.lot(lot_id).to_string(),
            None => copro_domain::UNKNOWN_REFERENCE.to_string(),
        };
        Ok(RegularizationNotice {
            regularization_id: reg.id,
            lease_id: reg.lease_id,
            recipient: directory.tenant(reg.lease_id).to_string(),
            lot,
            period_start: reg.period_start,
            period_end: reg.period_end,
            provisions_total: reg.provisions_total,
            actual_charges: reg.actual_charges,
            balance: reg.balance,
            direction: reg.direction(),
            amount: reg.balance.abs(),
            sent_at: reg.sent_at,
        })
    }

    fn build(
        book: &Book,
        ctx: &CallerContext,
        clock: &dyn Clock,
        input: NewRegularization,
    ) -> Result<Regularization, CoreError> {
        if input.period_end <= input.period_start {
            return Err(CoreError::Validation(
                "period end must be after period start".into(),
            ));
        }
        for (field, value) in [
            ("provisions total", input.provisions_total),
            ("actual charges", input.actual_charges),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(CoreError::Validation(format!("{field} must not be negative")));
            }
        }
        let provisions = ensure_money_scale(input.provisions_total)?;
        let actual = ensure_money_scale(input.actual_charges)?;

        if book.regularizations.iter().any(|reg| {
            reg.lease_id == input.lease_id
                && reg.period_start == input.period_start
                && reg.period_end == input.period_end
        }) {
            return Err(CoreError::Conflict(format!(
                "a regularization already exists for this lease from {} to {}",
                input.period_start, input.period_end
            )));
        }

        let mut reg = Regularization::new(
            ctx.residence_id,
            input.lease_id,
            input.period_start,
            input.period_end,
            provisions,
            actual,
            clock.now(),
        );
        reg.lot_id = input.lot_id;
        Ok(reg)
    }

    fn insert(book: &mut Book, reg: Regularization) -> Uuid {
        let id = reg.id;
        info!(
            regularization_id = %id,
            lease_id = %reg.lease_id,
            balance = %reg.balance,
            "regularization created"
        );
        book.regularizations.push(reg);
        book.touch();
        id
    }

    fn scoped_mut<'a>(
        book: &'a mut Book,
        residence_id: ResidenceId,
        regularization_id: Uuid,
    ) -> Result<&'a mut Regularization, CoreError> {
        book.regularization_mut(regularization_id)
            .filter(|reg| reg.residence_id == residence_id)
            .ok_or_else(|| CoreError::not_found("Regularization", regularization_id))
    }
}
