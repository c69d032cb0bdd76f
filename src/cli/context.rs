//! Shell state, dispatch, and error reporting.

use std::path::PathBuf;

use dialoguer::theme::ColorfulTheme;
use strsim::levenshtein;
use tracing::debug;
use uuid::Uuid;

use copro_config::{Config, ConfigManager};
use copro_domain::{Book, ResidenceId, UserId};
use copro_engine::{book_warnings, BookStorage, CallerContext, CoreError, SharedBook, SystemClock};
use copro_storage_json::{JsonBookStorage, StoragePaths};

use super::commands;
use super::error::{CliError, CommandError, CommandResult, LoopControl};
use super::io as cli_io;
use super::output::{self, OutputPreferences};
use super::registry::{CommandEntry, CommandRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliMode {
    Interactive,
    Script,
}

pub struct ShellContext {
    pub mode: CliMode,
    pub registry: CommandRegistry,
    pub theme: ColorfulTheme,
    pub storage: JsonBookStorage,
    pub config_manager: ConfigManager,
    pub config: Config,
    pub home: PathBuf,
    pub book: Option<SharedBook>,
    pub book_name: Option<String>,
    pub residence: Option<ResidenceId>,
    pub user_id: UserId,
    pub clock: SystemClock,
    pub last_command: Option<String>,
    pub running: bool,
}

impl ShellContext {
    pub fn new(mode: CliMode) -> Result<Self, CliError> {
        Self::with_home(mode, ConfigManager::home_dir())
    }

    pub fn with_home(mode: CliMode, home: PathBuf) -> Result<Self, CliError> {
        let mut registry = CommandRegistry::new();
        commands::register_all(&mut registry);

        let config_manager = ConfigManager::with_base_dir(home.clone())?;
        let config = config_manager.load()?;
        let storage = Self::open_storage(&config, &home)?;
        output::set_preferences(OutputPreferences {
            plain_output: !config.ui_color_enabled || mode == CliMode::Script,
            quiet_mode: false,
        });

        let mut context = ShellContext {
            mode,
            registry,
            theme: ColorfulTheme::default(),
            storage,
            config_manager,
            config,
            home,
            book: None,
            book_name: None,
            residence: None,
            user_id: Uuid::new_v4(),
            clock: SystemClock,
            last_command: None,
            running: true,
        };
        context.auto_load_last();
        Ok(context)
    }

    pub(crate) fn open_storage(
        config: &Config,
        home: &std::path::Path,
    ) -> Result<JsonBookStorage, CoreError> {
        JsonBookStorage::with_retention(
            StoragePaths {
                book_root: config.resolve_book_root(home),
                backup_root: config.resolve_backup_root(home),
            },
            config.backup_retention,
        )
    }

    fn auto_load_last(&mut self) {
        if self.mode != CliMode::Interactive {
            return;
        }
        let Some(name) = self.config.last_opened_book.clone() else {
            return;
        };
        if let Ok(book) = self.storage.load_book(&name) {
            self.open_book(&name, book);
            cli_io::print_success(format!("Automatically loaded last book `{}`.", name));
        }
    }

    pub(crate) fn open_book(&mut self, name: &str, book: Book) {
        for warning in book_warnings(&book) {
            cli_io::print_warning(warning);
        }
        self.residence = if book.directory.residences.len() == 1 {
            book.directory.residences.keys().next().copied()
        } else {
            None
        };
        self.book = Some(SharedBook::new(book));
        self.book_name = Some(name.to_string());
    }

    pub fn mode(&self) -> CliMode {
        self.mode
    }

    pub fn command_names(&self) -> Vec<&'static str> {
        self.registry.names().collect()
    }

    pub fn command(&self, name: &str) -> Option<&CommandEntry> {
        self.registry.get(name)
    }

    pub fn prompt(&self) -> String {
        match (&self.book_name, self.residence_label()) {
            (Some(book), Some(residence)) => format!("copro [{book} / {residence}] > "),
            (Some(book), None) => format!("copro [{book}] > "),
            _ => "copro > ".to_string(),
        }
    }

    fn residence_label(&self) -> Option<String> {
        let residence = self.residence?;
        self.book
            .as_ref()?
            .read(|book| book.directory.residences.get(&residence).cloned())
            .ok()
            .flatten()
    }

    pub(crate) fn shared(&self) -> Result<&SharedBook, CommandError> {
        self.book.as_ref().ok_or(CommandError::BookNotLoaded)
    }

    pub(crate) fn residence_id(&self) -> Result<ResidenceId, CommandError> {
        self.shared()?;
        self.residence.ok_or(CommandError::ResidenceNotSelected)
    }

    pub(crate) fn caller(&self) -> Result<CallerContext, CommandError> {
        Ok(CallerContext::new(self.residence_id()?, self.user_id))
    }

    /// Runs a read-only closure against the loaded book.
    pub(crate) fn with_book<T>(
        &self,
        f: impl FnOnce(&Book) -> Result<T, CommandError>,
    ) -> Result<T, CommandError> {
        self.shared()?.read(f)?
    }

    /// Applies a mutation to the loaded book; nothing is kept when it fails.
    pub(crate) fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Book) -> Result<T, CoreError>,
    ) -> Result<T, CommandError> {
        Ok(self.shared()?.transact(f)?)
    }

    pub(crate) fn persist_config(&self) -> CommandResult {
        self.config_manager.save(&self.config)?;
        Ok(())
    }

    pub(crate) fn set_last_opened(&mut self, name: Option<&str>) -> CommandResult {
        self.config.last_opened_book = name.map(str::to_string);
        self.persist_config()
    }

    pub(crate) fn dispatch(
        &mut self,
        command: &str,
        raw: &str,
        args: &[&str],
    ) -> Result<LoopControl, CommandError> {
        if let Some(handler) = self.registry.handler(command) {
            match handler(self, args) {
                Ok(()) => Ok(LoopControl::Continue),
                Err(CommandError::ExitRequested) => Ok(LoopControl::Exit),
                Err(err) => Err(err),
            }
        } else {
            self.suggest_command(raw);
            Ok(LoopControl::Continue)
        }
    }

    pub(crate) fn suggest_command(&self, input: &str) {
        cli_io::print_warning(format!(
            "Unknown command `{}`. Type `help` to see available commands.",
            input
        ));

        let needle = input.to_lowercase();
        let best = self
            .registry
            .names()
            .map(|name| (levenshtein(name, &needle), name))
            .min_by_key(|(distance, _)| *distance);

        if let Some((distance, name)) = best {
            if distance <= 3 {
                cli_io::print_info(format!("Suggestion: `{}`?", name));
            }
        }
    }

    pub(crate) fn confirm_exit(&self) -> Result<bool, CliError> {
        if self.mode == CliMode::Script {
            return Ok(true);
        }
        Ok(cli_io::confirm_action(&self.theme, "Exit shell?", true)?)
    }

    /// Asks before destructive actions; script mode always proceeds.
    pub(crate) fn confirm(&self, prompt: &str) -> Result<bool, CommandError> {
        if self.mode == CliMode::Script {
            return Ok(true);
        }
        cli_io::confirm_action(&self.theme, prompt, false)
    }

    pub(crate) fn report_error(&self, err: CommandError) -> Result<(), CliError> {
        match err {
            CommandError::ExitRequested => {}
            CommandError::InvalidArguments(message) => {
                cli_io::print_error(&message);
                cli_io::print_hint("Use `help <command>` for usage details.");
            }
            CommandError::BookNotLoaded => {
                cli_io::print_error(CommandError::BookNotLoaded);
                cli_io::print_hint("Try `book new \"Cabinet Martin\"` to get started.");
            }
            CommandError::Core(core) => {
                debug!(error = %core, "command failed");
                cli_io::print_error(core.user_message());
                match &core {
                    CoreError::NotFound { entity, .. } => {
                        cli_io::print_hint(format!(
                            "No matching {} in this book.",
                            entity.to_lowercase()
                        ));
                    }
                    CoreError::InUse { reason, .. } => cli_io::print_hint(reason),
                    _ => {}
                }
            }
            other => cli_io::print_error(other),
        }
        Ok(())
    }

    pub(crate) fn print_warning(&self, message: &str) {
        cli_io::print_warning(message);
    }
}
