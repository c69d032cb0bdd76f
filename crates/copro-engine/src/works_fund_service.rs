use rust_decimal::Decimal;
use tracing::{info, warn};

use copro_domain::{
    checked_total, ensure_money_scale, funding_progress, required_minimum, Book, ResidenceId,
    UserId, WorksFund, WorksFundContribution, WorksFundStatus, LEGAL_MINIMUM_PERCENTAGE,
};

use crate::{budget_service::BudgetService, time::Clock, CoreError};

pub struct WorksFundService;

impl WorksFundService {
    /// Returns the residence's fund, creating it with `minimum_percentage` if absent.
    ///
    /// The percentage is always checked against the legal floor but only applied
    /// to a new fund; use [`Self::set_minimum_percentage`] to change it.
    pub fn get_or_create(
        book: &mut Book,
        residence_id: ResidenceId,
        minimum_percentage: Decimal,
    ) -> Result<&WorksFund, CoreError> {
        check_percentage(minimum_percentage)?;
        if book.works_fund(residence_id).is_none() {
            info!(%residence_id, %minimum_percentage, "works fund opened");
            book.works_funds
                .push(WorksFund::new(residence_id, minimum_percentage));
            book.touch();
        }
        book.works_fund(residence_id)
            .ok_or_else(|| CoreError::Consistency("works fund vanished after creation".into()))
    }

    pub fn set_minimum_percentage(
        book: &mut Book,
        residence_id: ResidenceId,
        minimum_percentage: Decimal,
    ) -> Result<(), CoreError> {
        check_percentage(minimum_percentage)?;
        let fund = Self::fund_mut(book, residence_id)?;
        fund.minimum_percentage = minimum_percentage;
        info!(%residence_id, %minimum_percentage, "works fund percentage changed");
        book.touch();
        Ok(())
    }

    /// Adds a strictly positive contribution and records it in the history.
    pub fn contribute(
        book: &mut Book,
        residence_id: ResidenceId,
        user_id: UserId,
        amount: Decimal,
        clock: &dyn Clock,
    ) -> Result<Decimal, CoreError> {
        if amount <= Decimal::ZERO {
            return Err(CoreError::Validation(
                "contribution must be greater than zero".into(),
            ));
        }
        let amount = ensure_money_scale(amount)?;
        let today = clock.today();
        let fund = Self::fund_mut(book, residence_id)?;
        fund.balance = checked_total(fund.balance, amount)?;
        fund.last_contribution_date = Some(today);
        fund.contributions.push(WorksFundContribution {
            date: today,
            amount,
            recorded_by: user_id,
        });
        let balance = fund.balance;
        info!(%residence_id, %amount, %balance, "works fund contribution recorded");
        book.touch();
        Ok(balance)
    }

    /// Fund position against the latest voted budget.
    pub fn status(book: &Book, residence_id: ResidenceId) -> Result<WorksFundStatus, CoreError> {
        let fund = book
            .works_fund(residence_id)
            .ok_or_else(|| CoreError::not_found("Works fund", residence_id))?;
        let reference = BudgetService::latest_voted_budget(book, residence_id);
        let reference_total = reference.map_or(Decimal::ZERO, |budget| budget.total_budget);
        let required = required_minimum(reference_total, fund.minimum_percentage);
        let below_minimum = fund.balance < required;
        if below_minimum {
            warn!(%residence_id, balance = %fund.balance, %required, "works fund below legal minimum");
        }
        Ok(WorksFundStatus {
            residence_id,
            balance: fund.balance,
            minimum_percentage: fund.minimum_percentage,
            reference_fiscal_year: reference.map(|budget| budget.fiscal_year),
            reference_budget_total: reference_total,
            required_minimum: required,
            progress: funding_progress(fund.balance, required),
            below_minimum,
        })
    }

    fn fund_mut(book: &mut Book, residence_id: ResidenceId) -> Result<&mut WorksFund, CoreError> {
        book.works_fund_mut(residence_id)
            .ok_or_else(|| CoreError::not_found("Works fund", residence_id))
    }
}

fn check_percentage(minimum_percentage: Decimal) -> Result<(), CoreError> {
    if minimum_percentage < LEGAL_MINIMUM_PERCENTAGE {
        return Err(CoreError::Validation(format!(
            "{minimum_percentage}% is below the legal minimum of {LEGAL_MINIMUM_PERCENTAGE}%"
        )));
    }
    if minimum_percentage > Decimal::ONE_HUNDRED {
        return Err(CoreError::Validation(
            "percentage cannot exceed 100%".into(),
        ));
    }
    Ok(())
}
