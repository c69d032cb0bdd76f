//! Annual budgets: lines, cached totals, lifecycle and budgeted-versus-actual tracking.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use copro_domain::{
    checked_sum, checked_total, ensure_money_scale, split_by_weights, Book, Budget, BudgetLine,
    BudgetStatus, CategoryGroup, CategoryVariance, ChargeCategory, DateRange, ResidenceId,
};

use crate::{ledger_service::required, time::Clock, CoreError};

pub struct BudgetService;

impl BudgetService {
    /// Creates a draft budget. One budget per residence and fiscal year.
    pub fn create_budget(
        book: &mut Book,
        residence_id: ResidenceId,
        fiscal_year: i32,
    ) -> Result<Uuid, CoreError> {
        if !(1900..=9999).contains(&fiscal_year) {
            return Err(CoreError::Validation(format!(
                "fiscal year {fiscal_year} is out of range"
            )));
        }
        if Self::find_by_year(book, residence_id, fiscal_year).is_some() {
            return Err(CoreError::Conflict(format!(
                "a budget for {fiscal_year} already exists"
            )));
        }
        let budget = Budget::new(residence_id, fiscal_year);
        let id = budget.id;
        info!(budget_id = %id, %residence_id, fiscal_year, "budget created");
        book.budgets.push(budget);
        book.touch();
        Ok(id)
    }

    pub fn find_by_year(
        book: &Book,
        residence_id: ResidenceId,
        fiscal_year: i32,
    ) -> Option<&Budget> {
        book.budgets
            .iter()
            .find(|budget| budget.residence_id == residence_id && budget.fiscal_year == fiscal_year)
    }

    pub fn list_budgets(book: &Book, residence_id: ResidenceId) -> Vec<&Budget> {
        let mut budgets: Vec<_> = book
            .budgets
            .iter()
            .filter(|budget| budget.residence_id == residence_id)
            .collect();
        budgets.sort_by_key(|budget| std::cmp::Reverse(budget.fiscal_year));
        budgets
    }

    /// Appends a line and raises the cached total in the same step.
    pub fn add_line(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        label: &str,
        category: ChargeCategory,
        budgeted_amount: Decimal,
    ) -> Result<Uuid, CoreError> {
        Self::scoped_budget(book, residence_id, budget_id)?;
        let label = required("label", label)?;
        if budgeted_amount.is_sign_negative() && !budgeted_amount.is_zero() {
            return Err(CoreError::Validation(
                "budgeted amount must not be negative".into(),
            ));
        }
        let amount = ensure_money_scale(budgeted_amount)?;

        let line = BudgetLine::new(budget_id, label, category, amount);
        let line_id = line.id;
        let budget = Self::budget_mut(book, budget_id)?;
        budget.total_budget = checked_total(budget.total_budget, amount)?;
        budget.version += 1;
        let total = budget.total_budget;
        book.budget_lines.push(line);
        info!(%budget_id, %line_id, %amount, %total, "budget line added");
        book.touch();
        Ok(line_id)
    }

    /// [`Self::add_line`] guarded by the version the caller last read.
    #[allow(clippy::too_many_arguments)]
    pub fn add_line_at_version(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        expected_version: u64,
        label: &str,
        category: ChargeCategory,
        budgeted_amount: Decimal,
    ) -> Result<Uuid, CoreError> {
        Self::check_version(book, residence_id, budget_id, expected_version)?;
        Self::add_line(book, residence_id, budget_id, label, category, budgeted_amount)
    }

    /// Removes a line and lowers the cached total, never below zero.
    pub fn delete_line(
        book: &mut Book,
        residence_id: ResidenceId,
        line_id: Uuid,
    ) -> Result<(), CoreError> {
        let line = book
            .budget_line(line_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Budget line", line_id))?;
        Self::scoped_budget(book, residence_id, line.budget_id)
            .map_err(|_| CoreError::not_found("Budget line", line_id))?;

        let budget = Self::budget_mut(book, line.budget_id)?;
        budget.total_budget = (budget.total_budget - line.budgeted_amount).max(Decimal::ZERO);
        budget.version += 1;
        let total = budget.total_budget;
        book.budget_lines.retain(|candidate| candidate.id != line_id);
        info!(budget_id = %line.budget_id, %line_id, %total, "budget line deleted");
        book.touch();
        Ok(())
    }

    pub fn delete_line_at_version(
        book: &mut Book,
        residence_id: ResidenceId,
        line_id: Uuid,
        expected_version: u64,
    ) -> Result<(), CoreError> {
        let budget_id = book
            .budget_line(line_id)
            .map(|line| line.budget_id)
            .ok_or_else(|| CoreError::not_found("Budget line", line_id))?;
        Self::check_version(book, residence_id, budget_id, expected_version)?;
        Self::delete_line(book, residence_id, line_id)
    }

    /// Attaches (or detaches) the distribution key used to spread a line.
    pub fn assign_key(
        book: &mut Book,
        residence_id: ResidenceId,
        line_id: Uuid,
        key_id: Option<Uuid>,
    ) -> Result<(), CoreError> {
        let budget_id = book
            .budget_line(line_id)
            .map(|line| line.budget_id)
            .ok_or_else(|| CoreError::not_found("Budget line", line_id))?;
        Self::scoped_budget(book, residence_id, budget_id)?;
        if let Some(key_id) = key_id {
            book.key(key_id)
                .filter(|key| key.residence_id == residence_id)
                .ok_or_else(|| CoreError::not_found("Distribution key", key_id))?;
        }
        if let Some(line) = book.budget_lines.iter_mut().find(|line| line.id == line_id) {
            line.distribution_key_id = key_id;
        }
        Self::budget_mut(book, budget_id)?.version += 1;
        book.touch();
        Ok(())
    }

    /// Lines grouped by category, in category order.
    pub fn group_by_category(
        book: &Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<Vec<CategoryGroup>, CoreError> {
        Self::scoped_budget(book, residence_id, budget_id)?;
        let mut groups: BTreeMap<ChargeCategory, CategoryGroup> = BTreeMap::new();
        for line in book.lines_of_budget(budget_id) {
            let group = groups.entry(line.category).or_insert_with(|| CategoryGroup {
                category: line.category,
                lines: Vec::new(),
                category_total: Decimal::ZERO,
            });
            group.category_total = checked_total(group.category_total, line.budgeted_amount)?;
            group.lines.push(line.clone());
        }
        Ok(groups.into_values().collect())
    }

    /// `draft -> voted`, stamping the vote date.
    pub fn vote(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), CoreError> {
        Self::advance(book, residence_id, budget_id, BudgetStatus::Draft)?;
        let budget = Self::budget_mut(book, budget_id)?;
        budget.voted_at = Some(clock.now());
        info!(%budget_id, fiscal_year = budget.fiscal_year, "budget voted");
        book.touch();
        Ok(())
    }

    /// `voted -> active`.
    pub fn activate(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<(), CoreError> {
        Self::advance(book, residence_id, budget_id, BudgetStatus::Voted)?;
        info!(%budget_id, "budget activated");
        book.touch();
        Ok(())
    }

    /// Voted or active budget with the greatest fiscal year.
    pub fn latest_voted_budget(book: &Book, residence_id: ResidenceId) -> Option<&Budget> {
        book.budgets
            .iter()
            .filter(|budget| budget.residence_id == residence_id && budget.is_voted())
            .max_by_key(|budget| budget.fiscal_year)
    }

    /// Ledger actuals per category for the budget's fiscal year.
    pub fn category_actuals(
        book: &Book,
        residence_id: ResidenceId,
        fiscal_year: i32,
    ) -> Result<BTreeMap<ChargeCategory, Decimal>, CoreError> {
        let mut actuals = BTreeMap::new();
        let Some(year) = DateRange::fiscal_year(fiscal_year) else {
            return Ok(actuals);
        };
        for line in book
            .lines
            .iter()
            .filter(|line| line.residence_id == residence_id && year.contains(line.date))
        {
            if let Some(category) = line.category {
                let actual = actuals.entry(category).or_insert(Decimal::ZERO);
                *actual = checked_total(*actual, line.net())?;
            }
        }
        Ok(actuals)
    }

    /// Recomputes every line's actual amount from tagged ledger lines.
    ///
    /// A category's actual is spread over its lines pro rata to their budgeted
    /// amounts, or evenly when they are all zero.
    pub fn refresh_actuals(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<(), CoreError> {
        let fiscal_year = Self::scoped_budget(book, residence_id, budget_id)?.fiscal_year;
        let actuals = Self::category_actuals(book, residence_id, fiscal_year)?;

        let mut by_category: BTreeMap<ChargeCategory, Vec<usize>> = BTreeMap::new();
        for (index, line) in book.budget_lines.iter().enumerate() {
            if line.budget_id == budget_id {
                by_category.entry(line.category).or_default().push(index);
            }
        }

        for (category, indexes) in by_category {
            let actual = actuals.get(&category).copied().unwrap_or(Decimal::ZERO);
            let mut weights: Vec<Decimal> = indexes
                .iter()
                .map(|index| book.budget_lines[*index].budgeted_amount)
                .collect();
            if weights.iter().all(Decimal::is_zero) {
                weights = vec![Decimal::ONE; indexes.len()];
            }
            for (index, part) in indexes.iter().zip(split_by_weights(actual, &weights)?) {
                book.budget_lines[*index].actual_amount = Some(part);
            }
        }

        Self::budget_mut(book, budget_id)?.version += 1;
        info!(%budget_id, "budget actuals refreshed");
        book.touch();
        Ok(())
    }

    /// Budgeted, actual and remaining per category, including categories that
    /// only appear in the ledger.
    pub fn variance(
        book: &Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<Vec<CategoryVariance>, CoreError> {
        let budget = Self::scoped_budget(book, residence_id, budget_id)?;
        let actuals = Self::category_actuals(book, residence_id, budget.fiscal_year)?;

        let mut budgeted: BTreeMap<ChargeCategory, Decimal> = BTreeMap::new();
        for line in book.lines_of_budget(budget_id) {
            let amount = budgeted.entry(line.category).or_insert(Decimal::ZERO);
            *amount = checked_total(*amount, line.budgeted_amount)?;
        }
        for category in actuals.keys() {
            budgeted.entry(*category).or_insert(Decimal::ZERO);
        }

        Ok(budgeted
            .into_iter()
            .map(|(category, amount)| {
                let actual = actuals.get(&category).copied().unwrap_or(Decimal::ZERO);
                CategoryVariance::new(category, amount, actual)
            })
            .collect())
    }

    /// Reports drift between the cached total and the sum of the lines.
    pub fn verify_total(book: &Book, budget_id: Uuid) -> Result<(), CoreError> {
        let budget = book
            .budget(budget_id)
            .ok_or_else(|| CoreError::not_found("Budget", budget_id))?;
        let sum = checked_sum(book.lines_of_budget(budget_id).map(|line| line.budgeted_amount))?;
        if sum != budget.total_budget {
            warn!(%budget_id, cached = %budget.total_budget, %sum, "budget total drift detected");
            return Err(CoreError::Consistency(format!(
                "budget {} total {} differs from the sum of its lines {}",
                budget.fiscal_year, budget.total_budget, sum
            )));
        }
        Ok(())
    }

    pub(crate) fn scoped_budget<'a>(
        book: &'a Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
    ) -> Result<&'a Budget, CoreError> {
        book.budget(budget_id)
            .filter(|budget| budget.residence_id == residence_id)
            .ok_or_else(|| CoreError::not_found("Budget", budget_id))
    }

    fn budget_mut(book: &mut Book, budget_id: Uuid) -> Result<&mut Budget, CoreError> {
        book.budget_mut(budget_id)
            .ok_or_else(|| CoreError::not_found("Budget", budget_id))
    }

    fn check_version(
        book: &Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        expected_version: u64,
    ) -> Result<(), CoreError> {
        let budget = Self::scoped_budget(book, residence_id, budget_id)?;
        if budget.version != expected_version {
            return Err(CoreError::Conflict(format!(
                "budget {} was modified concurrently (version {}, expected {})",
                budget.fiscal_year, budget.version, expected_version
            )));
        }
        Ok(())
    }

    fn advance(
        book: &mut Book,
        residence_id: ResidenceId,
        budget_id: Uuid,
        expected: BudgetStatus,
    ) -> Result<(), CoreError> {
        let current = Self::scoped_budget(book, residence_id, budget_id)?.status;
        let next = current.next().filter(|_| current == expected).ok_or_else(|| {
            CoreError::Conflict(format!("budget is {current}, expected {expected}"))
        })?;
        let budget = Self::budget_mut(book, budget_id)?;
        budget.status = next;
        budget.version += 1;
        Ok(())
    }
}
