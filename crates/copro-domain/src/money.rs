//! Decimal money helpers: parsing, scale checks, formatting and prorated splits.

use std::{fmt, str::FromStr};

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of decimal places carried by every currency amount.
pub const MONEY_SCALE: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Largest absolute amount (and lot share weight) accepted in a book: 10^15.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reasons a textual or decimal amount is refused.
pub enum AmountError {
    Empty,
    Malformed(String),
    TooPrecise(String),
    TooLarge(String),
    Overflow,
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Empty => f.write_str("amount is required"),
            AmountError::Malformed(raw) => write!(f, "`{raw}` is not a valid amount"),
            AmountError::TooPrecise(raw) => {
                write!(f, "`{raw}` has more than {MONEY_SCALE} decimal places")
            }
            AmountError::TooLarge(raw) => write!(f, "`{raw}` exceeds {MAX_AMOUNT}"),
            AmountError::Overflow => f.write_str("amounts add up beyond the supported range"),
        }
    }
}

impl std::error::Error for AmountError {}

/// Parses a user supplied amount.
///
/// Accepts either `.` or `,` as decimal separator and ignores spaces used as
/// thousands separators (`1 234,50`). Anything else is malformed.
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    let compact: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '\u{a0}' | '\u{202f}'))
        .collect();
    if compact.is_empty() {
        return Err(AmountError::Empty);
    }
    if compact.contains(',') && compact.contains('.') {
        return Err(AmountError::Malformed(input.trim().to_string()));
    }
    let normalized = compact.replace(',', ".");
    let value = Decimal::from_str(&normalized)
        .map_err(|_| AmountError::Malformed(input.trim().to_string()))?;
    ensure_money_scale(value).map_err(|err| match err {
        AmountError::TooLarge(_) => AmountError::TooLarge(input.trim().to_string()),
        _ => AmountError::TooPrecise(input.trim().to_string()),
    })
}

/// Checks that `value` has at most two significant decimal places and stays
/// within [`MAX_AMOUNT`], then rescales it to two.
pub fn ensure_money_scale(value: Decimal) -> Result<Decimal, AmountError> {
    if value.abs() > MAX_AMOUNT {
        return Err(AmountError::TooLarge(value.to_string()));
    }
    if value.normalize().scale() > MONEY_SCALE {
        return Err(AmountError::TooPrecise(value.to_string()));
    }
    let mut scaled = value;
    scaled.rescale(MONEY_SCALE);
    Ok(scaled)
}

/// `left + right`, or [`AmountError::Overflow`].
pub fn checked_total(left: Decimal, right: Decimal) -> Result<Decimal, AmountError> {
    left.checked_add(right).ok_or(AmountError::Overflow)
}

/// Sum of `values`, or [`AmountError::Overflow`].
pub fn checked_sum(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AmountError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, value| checked_total(acc, value))
}

/// Rounds to cents, half away from zero.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Formats an amount with two decimals and the given decimal separator.
pub fn format_amount(value: Decimal, decimal_separator: char) -> String {
    let text = format!("{:.2}", round_cents(value));
    if decimal_separator == '.' {
        text
    } else {
        text.replace('.', &decimal_separator.to_string())
    }
}

/// Splits `total` into parts proportional to `weights`, to the cent.
///
/// Uses the largest-remainder method so the parts always sum exactly to the
/// rounded total. Returns zeros when the weights sum to zero.
pub fn split_by_weights(total: Decimal, weights: &[Decimal]) -> Result<Vec<Decimal>, AmountError> {
    let weight_sum = checked_sum(weights.iter().copied())?;
    if weights.is_empty() || weight_sum.is_zero() {
        return Ok(vec![Decimal::ZERO; weights.len()]);
    }

    let negative = total.is_sign_negative();
    let cents = round_cents(total)
        .abs()
        .checked_mul(HUNDRED)
        .ok_or(AmountError::Overflow)?
        .trunc();

    let mut floors = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for weight in weights {
        let exact = cents
            .checked_mul(*weight / weight_sum)
            .ok_or(AmountError::Overflow)?;
        let floor = exact.floor();
        floors.push(floor);
        remainders.push(exact - floor);
    }

    let distributed = checked_sum(floors.iter().copied())?;
    let mut leftover = cents - distributed;
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]).then(a.cmp(b)));
    let mut cursor = 0;
    while leftover > Decimal::ZERO {
        floors[order[cursor % order.len()]] += Decimal::ONE;
        leftover -= Decimal::ONE;
        cursor += 1;
    }
    // Ratio rounding can overshoot by a cent; take it back from the smallest remainders.
    let mut cursor = order.len();
    while leftover < Decimal::ZERO && cursor > 0 {
        cursor -= 1;
        let index = order[cursor];
        if floors[index] > Decimal::ZERO {
            floors[index] -= Decimal::ONE;
            leftover += Decimal::ONE;
        }
    }

    Ok(floors
        .into_iter()
        .map(|part| {
            let mut amount = part / HUNDRED;
            amount.rescale(MONEY_SCALE);
            if negative {
                -amount
            } else {
                amount
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_both_decimal_separators() {
        assert_eq!(parse_amount("150").unwrap(), dec!(150.00));
        assert_eq!(parse_amount(" 12,5 ").unwrap(), dec!(12.50));
        assert_eq!(parse_amount("1 234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_amount("-42").unwrap(), dec!(-42.00));
    }

    #[test]
    fn rejects_malformed_and_overly_precise_input() {
        assert_eq!(parse_amount(""), Err(AmountError::Empty));
        assert!(matches!(parse_amount("abc"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount("1,234.5"), Err(AmountError::Malformed(_))));
        assert!(matches!(parse_amount("0.125"), Err(AmountError::TooPrecise(_))));
        assert_eq!(parse_amount("0.120").unwrap(), dec!(0.12));
    }

    #[test]
    fn formats_with_locale_separator() {
        assert_eq!(format_amount(dec!(150), ','), "150,00");
        assert_eq!(format_amount(dec!(-3.5), '.'), "-3.50");
    }

    #[test]
    fn split_preserves_total_to_the_cent() {
        let parts = split_by_weights(dec!(100), &[dec!(1), dec!(1), dec!(1)]).unwrap();
        assert_eq!(parts, vec![dec!(33.34), dec!(33.33), dec!(33.33)]);
        assert_eq!(parts.iter().copied().sum::<Decimal>(), dec!(100));

        let negative = split_by_weights(dec!(-10), &[dec!(1), dec!(3)]).unwrap();
        assert_eq!(negative, vec![dec!(-2.50), dec!(-7.50)]);
    }

    #[test]
    fn split_with_zero_weights_yields_zeros() {
        assert_eq!(
            split_by_weights(dec!(10), &[Decimal::ZERO, Decimal::ZERO]).unwrap(),
            vec![Decimal::ZERO, Decimal::ZERO]
        );
        assert!(split_by_weights(dec!(10), &[]).unwrap().is_empty());
    }

    #[test]
    fn amounts_beyond_the_ceiling_are_refused() {
        assert_eq!(MAX_AMOUNT, dec!(1_000_000_000_000_000));
        assert_eq!(
            ensure_money_scale(dec!(1_000_000_000_000_000)).unwrap(),
            dec!(1_000_000_000_000_000.00)
        );
        assert!(matches!(
            ensure_money_scale(dec!(50_000_000_000_000_000_000_000_000)),
            Err(AmountError::TooLarge(_))
        ));
        assert!(matches!(
            parse_amount("-1000000000000000,01"),
            Err(AmountError::TooLarge(_))
        ));
    }

    #[test]
    fn checked_helpers_report_overflow_instead_of_panicking() {
        assert_eq!(checked_sum([dec!(1.50), dec!(2.25)]).unwrap(), dec!(3.75));
        assert_eq!(checked_total(Decimal::MAX, Decimal::ONE), Err(AmountError::Overflow));
        assert_eq!(
            split_by_weights(dec!(10), &[Decimal::MAX, Decimal::MAX]),
            Err(AmountError::Overflow)
        );
    }

    #[test]
    fn split_handles_the_largest_amounts_and_weights() {
        let parts = split_by_weights(MAX_AMOUNT, &[MAX_AMOUNT, dec!(1)]).unwrap();
        assert_eq!(checked_sum(parts.iter().copied()).unwrap(), MAX_AMOUNT);
    }
}
