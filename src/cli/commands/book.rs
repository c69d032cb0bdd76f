//! Book lifecycle: create, load, save, backups, integrity checks.

use copro_engine::{book_warnings, public_api, BookStorage, IntegrityService};

use super::{split_subcommand, unknown_subcommand, usage_error};
use crate::cli::context::ShellContext;
use crate::cli::error::{CommandError, CommandResult};
use crate::cli::io;
use crate::cli::output::{print_table, section};
use crate::cli::registry::CommandEntry;

const USAGE: &str = "book <new|load|save|list|backup|backups|restore|check|delete> ...";

pub(crate) fn definitions() -> Vec<CommandEntry> {
    vec![CommandEntry::new(
        "book",
        "Create, load, save and back up books",
        "book new <name> | book load <name> | book save [name] | book list | book backup [note] | book backups | book restore <backup> | book check | book delete <name>",
        cmd_book,
    )]
}

fn cmd_book(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let (sub, rest) = split_subcommand(args, USAGE)?;
    match sub.as_str() {
        "new" => handle_new(context, rest),
        "load" | "open" => handle_load(context, rest),
        "save" => handle_save(context, rest),
        "list" => handle_list(context),
        "backup" => handle_backup(context, rest),
        "backups" | "list-backups" => handle_list_backups(context),
        "restore" => handle_restore(context, rest),
        "check" => handle_check(context),
        "delete" => handle_delete(context, rest),
        other => Err(unknown_subcommand(
            "book",
            other,
            "new, load, save, list, backup, backups, restore, check, delete",
        )),
    }
}

fn handle_new(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let name = args.first().ok_or_else(|| usage_error("book new <name>"))?;
    let book = public_api::api_create_book(*name);
    context.open_book(name, book);
    io::print_success(format!("New book `{}` created.", name));
    io::print_hint("Add a residence with `residence add <name>`, then `book save`.");
    Ok(())
}

fn handle_load(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let name = args.first().ok_or_else(|| usage_error("book load <name>"))?;
    let book = context.storage.load_book(name)?;
    let label = book.name.clone();
    context.open_book(name, book);
    context.set_last_opened(Some(*name))?;
    io::print_success(format!("Book `{}` loaded.", label));
    Ok(())
}

fn handle_save(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let name = match args.first() {
        Some(name) => name.to_string(),
        None => context
            .book_name
            .clone()
            .ok_or(CommandError::BookNotLoaded)?,
    };
    let storage = &context.storage;
    let revision = context.mutate(|book| {
        storage.save_book(&name, book)?;
        Ok(book.revision)
    })?;
    context.book_name = Some(name.clone());
    context.set_last_opened(Some(&name))?;
    io::print_success(format!("Book saved as `{}` (revision {}).", name, revision));
    Ok(())
}

fn handle_list(context: &mut ShellContext) -> CommandResult {
    let books = context.storage.list_book_metadata()?;
    section("Books");
    let rows: Vec<Vec<String>> = books
        .into_iter()
        .map(|meta| {
            vec![
                meta.slug,
                meta.name,
                meta.residence_count.to_string(),
                meta.line_count.to_string(),
                meta.revision.to_string(),
                meta.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(
        &["File", "Name", "Residences", "Lines", "Revision", "Updated"],
        &rows,
    );
    Ok(())
}

fn handle_backup(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let name = context
        .book_name
        .clone()
        .ok_or(CommandError::BookNotLoaded)?;
    let note = if args.is_empty() {
        None
    } else {
        Some(args.join(" "))
    };
    let snapshot = context.shared()?.snapshot()?;
    let info = context
        .storage
        .backup_book(&name, &snapshot, note.as_deref())?;
    io::print_success(format!("Backup `{}` created.", info.id));
    Ok(())
}

fn handle_list_backups(context: &mut ShellContext) -> CommandResult {
    let name = context
        .book_name
        .clone()
        .ok_or(CommandError::BookNotLoaded)?;
    let backups = context.storage.list_backup_metadata(&name)?;
    section(format!("Backups of {}", name));
    let rows: Vec<Vec<String>> = backups
        .into_iter()
        .enumerate()
        .map(|(idx, meta)| {
            vec![
                (idx + 1).to_string(),
                meta.name,
                meta.created_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "?".into()),
                meta.note.unwrap_or_default(),
                meta.size_bytes.to_string(),
            ]
        })
        .collect();
    print_table(&["#", "Backup", "Created", "Note", "Bytes"], &rows);
    Ok(())
}

fn handle_restore(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let wanted = args
        .first()
        .ok_or_else(|| usage_error("book restore <backup name|#>"))?;
    let name = context
        .book_name
        .clone()
        .ok_or(CommandError::BookNotLoaded)?;
    let backups = context.storage.list_backups(&name)?;
    let chosen = match wanted.parse::<usize>() {
        Ok(index) if index >= 1 && index <= backups.len() => backups.get(index - 1),
        _ => backups.iter().find(|entry| entry.id == *wanted),
    }
    .cloned()
    .ok_or_else(|| CommandError::InvalidArguments(format!("backup `{}` not found", wanted)))?;

    if !context.confirm(&format!("Replace `{}` with backup `{}`?", name, chosen.id))? {
        io::print_info("Restore cancelled.");
        return Ok(());
    }
    let restored = context.storage.restore_backup(&chosen)?;
    context.open_book(&name, restored);
    io::print_success(format!("Backup `{}` restored.", chosen.id));
    Ok(())
}

fn handle_check(context: &mut ShellContext) -> CommandResult {
    let (warnings, issues) = context.with_book(|book| {
        Ok((book_warnings(book), IntegrityService::issues(book)))
    })?;
    if warnings.is_empty() && issues.is_empty() {
        io::print_success("Book is consistent.");
        return Ok(());
    }
    for warning in warnings {
        io::print_warning(warning);
    }
    for issue in issues {
        io::print_warning(issue);
    }
    Ok(())
}

fn handle_delete(context: &mut ShellContext, args: &[&str]) -> CommandResult {
    let name = args.first().ok_or_else(|| usage_error("book delete <name>"))?;
    if !context.confirm(&format!("Delete book `{}` from disk?", name))? {
        io::print_info("Deletion cancelled.");
        return Ok(());
    }
    context.storage.delete_book(name)?;
    if context.book_name.as_deref() == Some(*name) {
        context.book = None;
        context.book_name = None;
        context.residence = None;
        context.set_last_opened(None)?;
    }
    io::print_success(format!("Book `{}` deleted.", name));
    Ok(())
}
