//! Viewing and editing the persisted CLI configuration.

use std::path::PathBuf;

use copro_config::Config;
use rust_decimal::Decimal;

use super::{split_subcommand, unknown_subcommand, usage_error};
use crate::cli::context::{CliMode, ShellContext};
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{self, print_table, section, OutputPreferences};
use crate::cli::registry::CommandEntry;

const KEYS: &str = "locale, currency, page_size, reconciliation_window_days, works_fund_minimum_percentage, csv_delimiter, backup_retention, ui_color_enabled, book_root, backup_root";

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "config",
        "Show or change preferences, back them up and restore them",
        "config show | config set <key> <value> | config backup [note] | config backups | config restore <backup>",
        cmd_config,
    )]
}

fn cmd_config(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "config <show|set|backup|backups|restore> ...")?;
    match sub.as_str() {
        "show" => {
            section("Configuration");
            print_table(&["Key", "Value"], &config_rows(&context.config, context));
            Ok(())
        }
        "set" => {
            let (key, value) = match rest {
                [key, value, ..] => (*key, *value),
                _ => return Err(usage_error("config set <key> <value>")),
            };
            let mut updated = context.config.clone();
            apply_setting(&mut updated, key, value)?;
            updated.validate()?;
            install(context, updated)?;
            io::print_success(format!("`{}` set to `{}`.", key, value));
            Ok(())
        }
        "backup" => {
            let note = if rest.is_empty() {
                None
            } else {
                Some(rest.join(" "))
            };
            let name = context
                .config_manager
                .backup(&context.config, note.as_deref())?;
            io::print_success(format!("Configuration backup `{}` created.", name));
            Ok(())
        }
        "backups" => {
            let rows: Vec<Vec<String>> = context
                .config_manager
                .list_backups()?
                .into_iter()
                .enumerate()
                .map(|(idx, name)| vec![(idx + 1).to_string(), name])
                .collect();
            section("Configuration backups");
            print_table(&["#", "Backup"], &rows);
            Ok(())
        }
        "restore" => {
            let wanted = rest
                .first()
                .ok_or_else(|| usage_error("config restore <backup name|#>"))?;
            let backups = context.config_manager.list_backups()?;
            let name = match wanted.parse::<usize>() {
                Ok(index) if index >= 1 && index <= backups.len() => backups[index - 1].clone(),
                _ => wanted.to_string(),
            };
            if !context.confirm(&format!("Replace the configuration with `{}`?", name))? {
                io::print_info("Restore cancelled.");
                return Ok(());
            }
            let restored = context.config_manager.restore(&name)?;
            install(context, restored)?;
            io::print_success(format!("Configuration `{}` restored.", name));
            Ok(())
        }
        other => Err(unknown_subcommand(
            "config",
            other,
            "show, set, backup, backups, restore",
        )),
    }
}

/// Persists `config` and re-applies what depends on it.
fn install(context: &mut ShellContext, config: Config) -> CommandResult {
    context.config_manager.save(&config)?;
    context.storage = ShellContext::open_storage(&config, &context.home)?;
    output::set_preferences(OutputPreferences {
        plain_output: !config.ui_color_enabled || context.mode == CliMode::Script,
        quiet_mode: false,
    });
    context.config = config;
    Ok(())
}

pub(crate) fn apply_setting(config: &mut Config, key: &str, value: &str) -> CommandResult {
    let invalid = |what: &str| {
        CommandError::InvalidArguments(format!("`{}` is not a valid {}", value, what))
    };
    match key.to_ascii_lowercase().as_str() {
        "locale" => config.locale = value.to_string(),
        "currency" => config.currency = value.to_ascii_uppercase(),
        "page_size" => config.page_size = value.parse().map_err(|_| invalid("page size"))?,
        "reconciliation_window_days" => {
            config.reconciliation_window_days =
                value.parse().map_err(|_| invalid("number of days"))?
        }
        "works_fund_minimum_percentage" => {
            config.works_fund_minimum_percentage = value
                .replace(',', ".")
                .parse::<Decimal>()
                .map_err(|_| invalid("percentage"))?
        }
        "csv_delimiter" => {
            let mut chars = value.chars();
            config.csv_delimiter = match (chars.next(), chars.next()) {
                (Some(ch), None) => ch,
                _ if value.eq_ignore_ascii_case("tab") => '\t',
                _ => return Err(invalid("delimiter")),
            };
        }
        "backup_retention" => {
            config.backup_retention = value.parse().map_err(|_| invalid("retention"))?
        }
        "ui_color_enabled" => {
            config.ui_color_enabled = match value.to_ascii_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => true,
                "false" | "off" | "no" | "0" => false,
                _ => return Err(invalid("switch")),
            }
        }
        "book_root" => config.default_book_root = optional_path(value),
        "backup_root" => config.default_backup_root = optional_path(value),
        _ => {
            return Err(CommandError::InvalidArguments(format!(
                "unknown setting `{}`. Available: {}",
                key, KEYS
            )))
        }
    }
    Ok(())
}

fn optional_path(value: &str) -> Option<PathBuf> {
    match value.trim() {
        "" | "default" => None,
        path => Some(PathBuf::from(path)),
    }
}

fn config_rows(config: &Config, context: &ShellContext) -> Vec<Vec<String>> {
    let row = |key: &str, value: String| vec![key.to_string(), value];
    vec![
        row("locale", config.locale.clone()),
        row("currency", config.currency.clone()),
        row("page_size", config.page_size.to_string()),
        row(
            "reconciliation_window_days",
            config.reconciliation_window_days.to_string(),
        ),
        row(
            "works_fund_minimum_percentage",
            config.works_fund_minimum_percentage.to_string(),
        ),
        row("csv_delimiter", format!("{:?}", config.csv_delimiter)),
        row("backup_retention", config.backup_retention.to_string()),
        row("ui_color_enabled", config.ui_color_enabled.to_string()),
        row(
            "book_root",
            config.resolve_book_root(&context.home).display().to_string(),
        ),
        row(
            "backup_root",
            config.resolve_backup_root(&context.home).display().to_string(),
        ),
        row(
            "last_opened_book",
            config.last_opened_book.clone().unwrap_or_default(),
        ),
    ]
}
