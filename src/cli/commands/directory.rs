//! Local copy of the residence / lot / lease directory kept with the book.

use uuid::Uuid;

use copro_domain::{Book, LeaseEntry, LotEntry, ResidenceId};
use copro_engine::CoreError;

use super::{short_id, split_subcommand, unknown_subcommand, Args};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![
        CommandEntry::new(
            "residence",
            "Register residences and pick the active one",
            "residence add <name> | residence list | residence use <name>",
            cmd_residence,
        ),
        CommandEntry::new(
            "lot",
            "Register lots of the active residence",
            "lot add <number> | lot list",
            cmd_lot,
        ),
        CommandEntry::new(
            "lease",
            "Register tenants of the active residence",
            "lease add <tenant> [--lot <number>] | lease list",
            cmd_lease,
        ),
    ]
}

fn cmd_residence(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    const USAGE: &str = "residence <add|list|use> ...";
    let (sub, rest) = split_subcommand(args, USAGE)?;
    let args = Args::parse(rest);
    match sub.as_str() {
        "add" => {
            let name = args.get(0, "residence add <name>")?.trim().to_string();
            let id = context.mutate(|book| {
                if book.directory.residence_by_name(&name).is_some() {
                    return Err(CoreError::Conflict(format!(
                        "residence `{name}` already exists"
                    )));
                }
                let id = Uuid::new_v4();
                book.directory.residences.insert(id, name.clone());
                book.touch();
                Ok(id)
            })?;
            context.residence = Some(id);
            io::print_success(format!("Residence `{}` added and selected.", name));
            Ok(())
        }
        "list" => {
            let current = context.residence;
            let rows = context.with_book(|book| {
                Ok(book
                    .directory
                    .residences
                    .iter()
                    .map(|(id, name)| {
                        let marker = if Some(*id) == current { "*" } else { "" };
                        vec![marker.to_string(), short_id(*id), name.clone()]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Residences");
            print_table(&["", "Id", "Name"], &rows);
            Ok(())
        }
        "use" | "select" => {
            let name = args.get(0, "residence use <name>")?;
            let id = context.with_book(|book| {
                book.directory.residence_by_name(name).ok_or_else(|| {
                    CommandError::Core(CoreError::NotFound {
                        entity: "Residence",
                        id: name.to_string(),
                    })
                })
            })?;
            context.residence = Some(id);
            io::print_success(format!("Residence `{}` selected.", name));
            Ok(())
        }
        other => Err(unknown_subcommand("residence", other, "add, list, use")),
    }
}

fn cmd_lot(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "lot <add|list> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            let number = args.get(0, "lot add <number>")?.trim().to_string();
            context.mutate(|book| {
                if book.directory.lot_by_number(residence_id, &number).is_some() {
                    return Err(CoreError::Conflict(format!(
                        "lot `{number}` already exists in this residence"
                    )));
                }
                book.directory.lots.insert(
                    Uuid::new_v4(),
                    LotEntry {
                        residence_id,
                        number: number.clone(),
                    },
                );
                book.touch();
                Ok(())
            })?;
            io::print_success(format!("Lot `{}` added.", number));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                let mut rows: Vec<Vec<String>> = book
                    .directory
                    .lots
                    .iter()
                    .filter(|(_, entry)| entry.residence_id == residence_id)
                    .map(|(id, entry)| vec![entry.number.clone(), short_id(*id)])
                    .collect();
                rows.sort();
                Ok(rows)
            })?;
            section("Lots");
            print_table(&["Number", "Id"], &rows);
            Ok(())
        }
        other => Err(unknown_subcommand("lot", other, "add, list")),
    }
}

fn cmd_lease(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, "lease <add|list> ...")?;
    let args = Args::parse(rest);
    let residence_id = context.residence_id()?;
    match sub.as_str() {
        "add" => {
            let tenant = args
                .get(0, "lease add <tenant> [--lot <number>]")?
                .trim()
                .to_string();
            let lot = args.option("lot");
            context.mutate(|book| {
                if book.directory.lease_by_tenant(residence_id, &tenant).is_some() {
                    return Err(CoreError::Conflict(format!(
                        "tenant `{tenant}` already has a lease in this residence"
                    )));
                }
                let lot_id = lot
                    .map(|number| {
                        book.directory
                            .lot_by_number(residence_id, number)
                            .ok_or_else(|| CoreError::NotFound {
                                entity: "Lot",
                                id: number.to_string(),
                            })
                    })
                    .transpose()?;
                book.directory.leases.insert(
                    Uuid::new_v4(),
                    LeaseEntry {
                        residence_id,
                        tenant: tenant.clone(),
                        lot_id,
                    },
                );
                book.touch();
                Ok(())
            })?;
            io::print_success(format!("Lease for `{}` added.", tenant));
            Ok(())
        }
        "list" => {
            let rows = context.with_book(|book| {
                Ok(book
                    .directory
                    .leases
                    .iter()
                    .filter(|(_, entry)| entry.residence_id == residence_id)
                    .map(|(id, entry)| {
                        let lot = entry
                            .lot_id
                            .and_then(|lot| book.directory.lots.get(&lot))
                            .map(|lot| lot.number.clone())
                            .unwrap_or_default();
                        vec![entry.tenant.clone(), lot, short_id(*id)]
                    })
                    .collect::<Vec<_>>())
            })?;
            section("Leases");
            print_table(&["Tenant", "Lot", "Id"], &rows);
            Ok(())
        }
        other => Err(unknown_subcommand("lease", other, "add, list")),
    }
}

/// Tenant lookup shared by the regularization commands.
pub(crate) fn lease_arg(
    book: &Book,
    residence_id: ResidenceId,
    tenant: &str,
) -> Result<Uuid, CommandError> {
    book.directory
        .lease_by_tenant(residence_id, tenant)
        .ok_or_else(|| {
            CommandError::Core(CoreError::NotFound {
                entity: "Lease",
                id: tenant.trim().to_string(),
            })
        })
}
