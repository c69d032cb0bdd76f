use std::{
    cmp::Reverse,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use copro_domain::Book;
use copro_engine::{
    storage::{BookBackupInfo, BookStorage},
    CoreError,
};

const BOOK_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = "tmp";
const DEFAULT_RETENTION: usize = 5;

/// Directories holding live books and their backups.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub book_root: PathBuf,
    pub backup_root: PathBuf,
}

/// Filesystem-backed JSON persistence for books and their backups.
#[derive(Debug, Clone)]
pub struct JsonBookStorage {
    books_dir: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
}

impl JsonBookStorage {
    pub fn new(paths: StoragePaths) -> Result<Self, CoreError> {
        Self::with_retention(paths, DEFAULT_RETENTION)
    }

    pub fn with_retention(paths: StoragePaths, retention: usize) -> Result<Self, CoreError> {
        fs::create_dir_all(&paths.book_root)?;
        fs::create_dir_all(&paths.backup_root)?;
        Ok(Self {
            books_dir: paths.book_root,
            backups_dir: paths.backup_root,
            retention: retention.max(1),
        })
    }

    pub fn book_path(&self, name: &str) -> PathBuf {
        self.books_dir
            .join(format!("{}.{}", canonical_name(name), BOOK_EXTENSION))
    }

    pub fn backup_path(&self, name: &str, backup: &str) -> PathBuf {
        self.backup_dir(name).join(backup)
    }

    pub fn list_book_metadata(&self) -> Result<Vec<BookMetadata>, CoreError> {
        let mut entries = Vec::new();
        for slug in self.list_books()? {
            let book = self.load_book(&slug)?;
            entries.push(BookMetadata {
                path: self.book_path(&slug),
                slug,
                name: book.name.clone(),
                created_at: book.created_at,
                updated_at: book.updated_at,
                revision: book.revision,
                residence_count: book.directory.residences.len(),
                line_count: book.lines.len(),
                budget_count: book.budgets.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn list_backup_metadata(&self, name: &str) -> Result<Vec<BackupMetadata>, CoreError> {
        let mut rows = Vec::new();
        for entry in self.list_backups(name)? {
            let size_bytes = fs::metadata(&entry.path)
                .map(|meta| meta.len())
                .unwrap_or(0);
            rows.push(BackupMetadata {
                created_at: parse_backup_timestamp(&entry.id),
                name: entry.id,
                note: entry.note,
                size_bytes,
                path: entry.path,
            });
        }
        rows.sort_by_key(|meta| Reverse(meta.created_at));
        Ok(rows)
    }

    pub fn delete_backup(&self, name: &str, backup_id: &str) -> Result<(), CoreError> {
        let path = self.backup_path(name, backup_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn backup_dir(&self, name: &str) -> PathBuf {
        self.backups_dir.join(canonical_name(name))
    }

    fn write_backup_file(
        &self,
        book: &Book,
        name: &str,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError> {
        let dir = self.backup_dir(name);
        fs::create_dir_all(&dir)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let note = sanitize_backup_note(note);
        let mut stem = format!("{}_{}", canonical_name(name), timestamp);
        if let Some(label) = &note {
            stem.push('_');
            stem.push_str(label);
        }
        let path = unique_path(&dir, &stem);
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Storage("invalid backup file name".into()))?;
        write_atomic(&path, &serialize_book(book)?)?;
        info!(book = %name, backup = %file_name, "backup created");
        self.prune_backups(name)?;
        Ok(BookBackupInfo {
            book: canonical_name(name),
            id: file_name,
            created_at: timestamp,
            note,
            path,
        })
    }

    fn backup_existing_file(&self, name: &str, path: &Path) -> Result<(), CoreError> {
        if !path.exists() {
            return Ok(());
        }
        let dir = self.backup_dir(name);
        fs::create_dir_all(&dir)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let backup_path = unique_path(&dir, &format!("{}_{}", canonical_name(name), timestamp));
        fs::copy(path, &backup_path)?;
        self.prune_backups(name)?;
        Ok(())
    }

    fn prune_backups(&self, name: &str) -> Result<(), CoreError> {
        let entries = self.list_backups(name)?;
        for entry in entries.into_iter().skip(self.retention) {
            debug!(backup = %entry.id, "pruning backup");
            let _ = fs::remove_file(entry.path);
        }
        Ok(())
    }

    fn stored_revision(path: &Path) -> Result<Option<u64>, CoreError> {
        if !path.exists() {
            return Ok(None);
        }
        #[derive(Deserialize)]
        struct RevisionProbe {
            #[serde(default)]
            revision: u64,
        }
        let data = fs::read_to_string(path)?;
        let probe: RevisionProbe = serde_json::from_str(&data)?;
        Ok(Some(probe.revision))
    }
}

impl BookStorage for JsonBookStorage {
    fn save_book(&self, name: &str, book: &mut Book) -> Result<(), CoreError> {
        let path = self.book_path(name);
        if let Some(stored) = Self::stored_revision(&path)? {
            if stored > book.revision {
                return Err(CoreError::Conflict(format!(
                    "book `{}` was saved elsewhere (revision {stored}, yours {}); reload it first",
                    canonical_name(name),
                    book.revision
                )));
            }
            self.backup_existing_file(name, &path)?;
        }
        book.revision += 1;
        let tmp = tmp_path(&path);
        let written = write_atomic(&tmp, &serialize_book(book)?).and_then(|_| {
            fs::rename(&tmp, &path)?;
            Ok(())
        });
        if let Err(err) = written {
            book.revision -= 1;
            return Err(err);
        }
        info!(book = %name, revision = book.revision, "book saved");
        Ok(())
    }

    fn load_book(&self, name: &str) -> Result<Book, CoreError> {
        let path = self.book_path(name);
        if !path.exists() {
            return Err(CoreError::NotFound {
                entity: "Book",
                id: canonical_name(name),
            });
        }
        load_book_from_path(&path)
    }

    fn list_books(&self) -> Result<Vec<String>, CoreError> {
        if !self.books_dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.books_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some(BOOK_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_book(&self, name: &str) -> Result<(), CoreError> {
        let path = self.book_path(name);
        if path.exists() {
            fs::remove_file(path)?;
            info!(book = %name, "book deleted");
        }
        Ok(())
    }

    fn save_book_to_path(&self, book: &Book, path: &Path) -> Result<(), CoreError> {
        if path.starts_with(&self.books_dir) {
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                self.backup_existing_file(stem, path)?;
            }
        }
        save_book_to_path(book, path)
    }

    fn load_book_from_path(&self, path: &Path) -> Result<Book, CoreError> {
        load_book_from_path(path)
    }

    fn backup_book(
        &self,
        name: &str,
        book: &Book,
        note: Option<&str>,
    ) -> Result<BookBackupInfo, CoreError> {
        self.write_backup_file(book, name, note)
    }

    fn list_backups(&self, name: &str) -> Result<Vec<BookBackupInfo>, CoreError> {
        let dir = self.backup_dir(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let book_slug = canonical_name(name);
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BOOK_EXTENSION) {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
                entries.push(BookBackupInfo {
                    book: book_slug.clone(),
                    id: file_name.to_string(),
                    created_at: parse_backup_timestamp(file_name)
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| file_name.to_string()),
                    note: backup_note(&book_slug, file_name),
                    path: path.clone(),
                });
            }
        }
        entries.sort_by(|a, b| {
            parse_backup_timestamp(&b.id)
                .cmp(&parse_backup_timestamp(&a.id))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(entries)
    }

    fn restore_backup(&self, backup: &BookBackupInfo) -> Result<Book, CoreError> {
        if !backup.path.exists() {
            return Err(CoreError::Storage(format!(
                "backup `{}` not found",
                backup.id
            )));
        }
        let mut restored = load_book_from_path(&backup.path)?;
        let target = self.book_path(&backup.book);
        // The restored copy must win over whatever revision is on disk.
        if let Some(stored) = Self::stored_revision(&target)? {
            restored.revision = restored.revision.max(stored);
        }
        self.backup_existing_file(&backup.book, &target)?;
        restored.revision += 1;
        save_book_to_path(&restored, &target)?;
        info!(book = %backup.book, backup = %backup.id, "backup restored");
        Ok(restored)
    }
}

/// Saves a book to an arbitrary path on disk.
pub fn save_book_to_path(book: &Book, path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    write_atomic(&tmp, &serialize_book(book)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Loads a book from the provided filesystem path.
pub fn load_book_from_path(path: &Path) -> Result<Book, CoreError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

#[derive(Debug, Clone)]
pub struct BookMetadata {
    pub slug: String,
    pub name: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
    pub residence_count: usize,
    pub line_count: usize,
    pub budget_count: usize,
}

#[derive(Debug, Clone)]
pub struct BackupMetadata {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

fn canonical_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' => c,
            _ => '_',
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        "book".into()
    } else {
        sanitized
    }
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    if raw.is_empty() {
        return None;
    }
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || matches!(ch, '-' | '.' | '_'))
            && !sanitized.is_empty()
            && !last_dash
        {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-').to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Segments after `<slug>_<date>_<time>` that are not a numeric collision suffix.
fn backup_note(slug: &str, file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(&format!(".{}", BOOK_EXTENSION))?;
    let rest = stem.strip_prefix(slug)?.strip_prefix('_')?;
    let segments: Vec<&str> = rest.split('_').collect();
    segments
        .iter()
        .skip(2)
        .find(|segment| !segment.chars().all(|c| c.is_ascii_digit()))
        .map(|segment| segment.to_string())
}

fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let trimmed = name.strip_suffix(&format!(".{}", BOOK_EXTENSION))?;
    let segments = trimmed.split('_').collect::<Vec<_>>();
    segments.windows(2).rev().find_map(|pair| {
        let (date, time) = (pair[0], pair[1]);
        if !is_digits(date, 8) || !is_digits(time, 6) {
            return None;
        }
        NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S")
            .ok()
            .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
    })
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

/// `<dir>/<stem>.json`, or `<stem>_<n>.json` when that name is taken.
fn unique_path(dir: &Path, stem: &str) -> PathBuf {
    let mut path = dir.join(format!("{stem}.{BOOK_EXTENSION}"));
    let mut counter = 2;
    while path.exists() {
        path = dir.join(format!("{stem}_{counter}.{BOOK_EXTENSION}"));
        counter += 1;
    }
    path
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn serialize_book(book: &Book) -> Result<String, CoreError> {
    Ok(serde_json::to_string_pretty(book)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_names_parse_with_notes_and_suffixes() {
        let at = parse_backup_timestamp("tilleuls_20250301_101500_before-vote_2.json")
            .expect("timestamp");
        assert_eq!(at.to_rfc3339(), "2025-03-01T10:15:00+00:00");
        assert_eq!(
            backup_note("tilleuls", "tilleuls_20250301_101500_before-vote_2.json"),
            Some("before-vote".into())
        );
        assert_eq!(backup_note("tilleuls", "tilleuls_20250301_101500_2.json"), None);
        assert!(parse_backup_timestamp("notes.json").is_none());
    }

    #[test]
    fn names_are_canonicalized() {
        assert_eq!(canonical_name(" Les Tilleuls "), "les_tilleuls");
        assert_eq!(canonical_name("???"), "book");
        assert_eq!(sanitize_backup_note(Some("Before vote.")), Some("before-vote".into()));
    }
}
