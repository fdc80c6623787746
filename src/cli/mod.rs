use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ConfigLoader;
use crate::session::{AutoConfirm, Confirm};
use crate::storage;

pub mod commands;

use self::commands::{
    BookmarkArgs, Clock, FilterArgs, HiddenArgs, HideArgs, HideGroupArgs, Output, SearchArgs,
    StdinConfirm, Style, UnhideArgs, ViewArgs, VisitArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "bmrank",
    version,
    about = "Rank bookmarks and history by how often and when you use them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over BMRANK_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over BMRANK_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Answer yes to every confirmation prompt
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the ranked list (default)
    View(ViewArgs),
    /// Set the search text and print the list
    Search(SearchArgs),
    /// Change filters, grouping or sort order and print the list
    Filter(FilterArgs),
    /// Record a completed navigation
    Visit(VisitArgs),
    /// Create or import bookmarks
    Bookmark(BookmarkArgs),
    /// Hide an item, or its whole domain
    Hide(HideArgs),
    /// Hide every item in a group of the current view
    HideGroup(HideGroupArgs),
    /// List hidden items
    Hidden(HiddenArgs),
    /// Show a hidden item again
    Unhide(UnhideArgs),
    /// Clear hidden items, filters and search text
    Reset,
    /// Forget all tracked bookmark usage
    ClearUsage,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("BMRANK_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("BMRANK_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(loader.paths(), &config.storage)?;

    let clock = Clock::system();
    let output = Output {
        clock,
        style: Style::detect(),
    };
    let mut confirm: Box<dyn Confirm> = if cli.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(StdinConfirm)
    };

    let command = cli.command.unwrap_or(Commands::View(ViewArgs::default()));
    let printed = match command {
        Commands::View(args) => commands::run_view(&storage, &config, &args, &output),
        Commands::Search(args) => commands::run_search(&storage, &config, &args, &output),
        Commands::Filter(args) => commands::run_filter(&storage, &config, &args, &output),
        Commands::Visit(args) => commands::run_visit(&storage, &args, &clock),
        Commands::Bookmark(args) => commands::run_bookmark(&storage, &args, &clock),
        Commands::Hide(args) => {
            commands::run_hide(&storage, &config, &args, confirm.as_mut(), &clock)
        }
        Commands::HideGroup(args) => {
            commands::run_hide_group(&storage, &config, &args, confirm.as_mut(), &clock)
        }
        Commands::Hidden(args) => commands::run_hidden(&storage, &args),
        Commands::Unhide(args) => commands::run_unhide(&storage, &config, &args, &clock),
        Commands::Reset => commands::run_reset(&storage, &config, confirm.as_mut(), &clock),
        Commands::ClearUsage => {
            commands::run_clear_usage(&storage, &config, confirm.as_mut(), &clock)
        }
    }?;
    print!("{printed}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_views_at_info_level() {
        let cli = Cli::try_parse_from(["bmrank"]).expect("parse");
        assert_eq!(cli.log_level, "info");
        assert!(!cli.yes);
        assert!(cli.command.is_none());
    }

    #[test]
    fn filter_flags_parse_into_typed_values() {
        let cli = Cli::try_parse_from([
            "bmrank", "--yes", "filter", "--group", "domain", "--sort", "Frequency", "--recent",
            "true", "--window", "30",
        ])
        .expect("parse");
        assert!(cli.yes);
        let Some(Commands::Filter(args)) = cli.command else {
            panic!("expected filter command");
        };
        assert_eq!(args.group, Some(crate::ranking::GroupMode::Domain));
        assert_eq!(args.sort, Some(crate::ranking::SortKey::Frequency));
        assert_eq!(args.recent, Some(true));
        assert_eq!(args.window, Some(30));
        assert_eq!(args.bookmarks, None);
    }
}
