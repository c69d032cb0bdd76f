use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use copro_domain::{format_amount, parse_amount, Book, LotId, ResidenceId};
use copro_engine::{public_api, CoreError};

use crate::cli::error::CommandError;
use crate::cli::registry::CommandRegistry;

pub mod bank;
pub mod book;
pub mod budget;
pub mod config;
pub mod directory;
pub mod fund;
pub mod keys;
pub mod ledger;
pub mod regularization;
pub mod report;
pub mod system;

pub(crate) fn register_all(registry: &mut CommandRegistry) {
    let groups = [
        system::definitions(),
        book::definitions(),
        directory::definitions(),
        ledger::definitions(),
        keys::definitions(),
        budget::definitions(),
        regularization::definitions(),
        bank::definitions(),
        fund::definitions(),
        report::definitions(),
        config::definitions(),
    ];
    for entry in groups.into_iter().flatten() {
        registry.register(entry);
    }
}

/// Positional arguments plus `--name value` options (`--flag` alone maps to "").
pub(crate) struct Args<'a> {
    pub positional: Vec<&'a str>,
    options: HashMap<&'a str, &'a str>,
}

impl<'a> Args<'a> {
    pub fn parse(raw: &[&'a str]) -> Self {
        let mut positional = Vec::new();
        let mut options = HashMap::new();
        let mut iter = raw.iter().copied().peekable();
        while let Some(arg) = iter.next() {
            if let Some(name) = arg.strip_prefix("--") {
                let value = match iter.peek() {
                    Some(next) if !next.starts_with("--") => iter.next().unwrap_or(""),
                    _ => "",
                };
                options.insert(name, value);
            } else {
                positional.push(arg);
            }
        }
        Self {
            positional,
            options,
        }
    }

    pub fn get(&self, idx: usize, usage: &str) -> Result<&'a str, CommandError> {
        self.positional
            .get(idx)
            .copied()
            .ok_or_else(|| usage_error(usage))
    }

    pub fn opt(&self, idx: usize) -> Option<&'a str> {
        self.positional.get(idx).copied()
    }

    pub fn option(&self, name: &str) -> Option<&'a str> {
        self.options
            .get(name)
            .copied()
            .filter(|value| !value.is_empty())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.options.contains_key(name)
    }
}

pub(crate) fn usage_error(usage: &str) -> CommandError {
    CommandError::InvalidArguments(format!("usage: {usage}"))
}

/// Splits `<sub> rest...`, reporting `usage` when nothing was given.
pub(crate) fn split_subcommand<'a, 'b>(
    args: &'b [&'a str],
    usage: &str,
) -> Result<(String, &'b [&'a str]), CommandError> {
    let (first, rest) = args.split_first().ok_or_else(|| usage_error(usage))?;
    Ok((first.to_ascii_lowercase(), rest))
}

pub(crate) fn unknown_subcommand(group: &str, other: &str, available: &str) -> CommandError {
    CommandError::InvalidArguments(format!(
        "unknown {group} subcommand `{other}`. Available: {available}"
    ))
}

pub(crate) fn amount_arg(text: &str) -> Result<Decimal, CommandError> {
    parse_amount(text).map_err(|err| CommandError::Core(err.into()))
}

pub(crate) fn date_arg(text: &str) -> Result<chrono::NaiveDate, CommandError> {
    Ok(public_api::parse_date(text)?)
}

pub(crate) fn year_arg(text: &str) -> Result<i32, CommandError> {
    text.trim().parse::<i32>().map_err(|_| {
        CommandError::InvalidArguments(format!("`{}` is not a fiscal year", text.trim()))
    })
}

pub(crate) fn money(value: Decimal) -> String {
    format_amount(value, ',')
}

pub(crate) fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Resolves a full id or a unique prefix of one among `candidates`.
pub(crate) fn resolve_id(
    candidates: impl IntoIterator<Item = Uuid>,
    text: &str,
    entity: &'static str,
) -> Result<Uuid, CommandError> {
    let needle = text.trim().to_ascii_lowercase().replace('-', "");
    if needle.is_empty() {
        return Err(CommandError::InvalidArguments(format!(
            "missing {} id",
            entity.to_lowercase()
        )));
    }
    let matches: Vec<Uuid> = candidates
        .into_iter()
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(CommandError::Core(CoreError::NotFound {
            entity,
            id: text.trim().to_string(),
        })),
        _ => Err(CommandError::InvalidArguments(format!(
            "{} id `{}` is ambiguous; type more characters",
            entity,
            text.trim()
        ))),
    }
}

pub(crate) fn lot_arg(book: &Book, residence_id: ResidenceId, number: &str) -> Result<LotId, CommandError> {
    book.directory
        .lot_by_number(residence_id, number)
        .ok_or_else(|| {
            CommandError::Core(CoreError::NotFound {
                entity: "Lot",
                id: number.trim().to_string(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_split_from_positionals() {
        let args = Args::parse(&["606", "--lot", "A12", "Facture", "--global"]);
        assert_eq!(args.positional, vec!["606", "Facture"]);
        assert_eq!(args.option("lot"), Some("A12"));
        assert!(args.flag("global"));
        assert_eq!(args.option("global"), None);
    }

    #[test]
    fn short_ids_are_eight_hex_digits() {
        let pattern = regex::Regex::new("^[0-9a-f]{8}$").expect("regex");
        assert!(pattern.is_match(&short_id(Uuid::new_v4())));
    }

    #[test]
    fn ids_resolve_by_unique_prefix() {
        let first = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000001").expect("uuid");
        let second = Uuid::parse_str("a1b2ffff-0000-4000-8000-000000000002").expect("uuid");
        assert_eq!(resolve_id([first, second], "a1b2c3", "Line").expect("unique"), first);
        assert!(matches!(
            resolve_id([first, second], "a1b2", "Line"),
            Err(CommandError::InvalidArguments(_))
        ));
        assert!(matches!(
            resolve_id([first, second], "ffff", "Line"),
            Err(CommandError::Core(CoreError::NotFound { .. }))
        ));
    }
}
