use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use time::OffsetDateTime;

use crate::catalog::last_visit_from_history;
use crate::config::AppConfig;
use crate::hidden::{HiddenSet, HideScope};
use crate::highlight::{build_highlight_regex, highlight};
use crate::labels::{meta_text, time_ago, EMPTY_HINT, EMPTY_TITLE};
use crate::model::{now_millis, BookmarkNode};
use crate::ranking::{FilterState, GroupKind, GroupMode, RankedItem, SortKey};
use crate::session::{ActionOutcome, Confirm, PopupSession};
use crate::storage::StorageHandle;
use crate::stores::BookmarkStore;
use crate::urls::{favicon_url, folder_url};
use crate::usage::UsageTracker;

const DEFAULT_PARENT: &str = "1";

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Print each item's favicon URL
    #[arg(long)]
    pub icons: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Search text; an empty value clears the search
    #[arg()]
    pub text: Vec<String>,
    #[command(flatten)]
    pub view: ViewArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Include bookmarks
    #[arg(long)]
    pub bookmarks: Option<bool>,
    /// Include history-only items
    #[arg(long)]
    pub history: Option<bool>,
    /// Keep frequently visited items
    #[arg(long)]
    pub frequent: Option<bool>,
    /// Keep recently visited items
    #[arg(long)]
    pub recent: Option<bool>,
    /// Mark items usually visited around this time of day
    #[arg(long)]
    pub time_of_day: Option<bool>,
    /// Time-of-day window in minutes
    #[arg(long)]
    pub window: Option<u32>,
    /// Group by none, domain, path or title
    #[arg(long)]
    pub group: Option<GroupMode>,
    /// Sort by frequency or recency
    #[arg(long)]
    pub sort: Option<SortKey>,
    #[command(flatten)]
    pub view: ViewArgs,
}

#[derive(Args, Debug, Clone)]
pub struct VisitArgs {
    pub url: String,
    /// Page title (defaults to the URL)
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BookmarkCommand {
    /// Create a bookmark
    Add(BookmarkAddArgs),
    /// Create a folder
    Folder(FolderArgs),
    /// Replace all bookmarks with a JSON tree export
    Import(ImportArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BookmarkAddArgs {
    pub url: String,
    pub title: String,
    /// Parent folder id
    #[arg(long, default_value = DEFAULT_PARENT)]
    pub parent: String,
}

#[derive(Args, Debug, Clone)]
pub struct FolderArgs {
    pub title: String,
    /// Parent folder id
    #[arg(long, default_value = DEFAULT_PARENT)]
    pub parent: String,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// JSON file holding the root node, or an array whose first element is the root
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct BookmarkArgs {
    #[command(subcommand)]
    pub command: BookmarkCommand,
}

#[derive(Args, Debug, Clone)]
pub struct HideArgs {
    /// URL or item id to hide
    pub target: String,
    /// Hide every item on the same domain
    #[arg(long)]
    pub domain: bool,
}

#[derive(Args, Debug, Clone)]
pub struct HideGroupArgs {
    /// Group key as printed in the grouped view
    pub key: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct HiddenArgs {
    /// Only list keys containing this text
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UnhideArgs {
    /// Key as listed by `hidden`
    pub key: String,
}

/// The two clocks every command needs: epoch millis for storage, local time for time-of-day.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub now: i64,
    pub local: OffsetDateTime,
}

impl Clock {
    pub fn system() -> Self {
        let local = OffsetDateTime::now_local().unwrap_or_else(|err| {
            tracing::debug!(?err, "local offset unavailable, using UTC");
            OffsetDateTime::now_utc()
        });
        Self {
            now: now_millis(),
            local,
        }
    }

    pub fn at(local: OffsetDateTime) -> Self {
        Self {
            now: (local.unix_timestamp_nanos() / 1_000_000) as i64,
            local,
        }
    }
}

/// Emphasis markers wrapped around search hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    pub open: &'static str,
    pub close: &'static str,
}

impl Style {
    pub const PLAIN: Style = Style { open: "", close: "" };

    pub fn detect() -> Self {
        if atty::is(atty::Stream::Stdout) {
            Style {
                open: "\x1b[1m",
                close: "\x1b[0m",
            }
        } else {
            Self::PLAIN
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub clock: Clock,
    pub style: Style,
}

/// Asks on the terminal; without one every prompt is declined.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> bool {
        if !atty::is(atty::Stream::Stdin) {
            tracing::warn!(question, "no terminal to confirm on; pass --yes to proceed");
            return false;
        }
        match prompt(&format!("{question} [y/N]")) {
            Ok(answer) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(err) => {
                tracing::warn!(?err, "failed to read confirmation");
                false
            }
        }
    }
}

pub fn run_view(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &ViewArgs,
    output: &Output,
) -> Result<String> {
    with_session(storage, config, args, output, |_| Ok(()))
}

pub fn run_search(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &SearchArgs,
    output: &Output,
) -> Result<String> {
    let text = args.text.join(" ");
    with_session(storage, config, &args.view, output, |session| {
        session.set_search_text(text.trim());
        Ok(())
    })
}

pub fn run_filter(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &FilterArgs,
    output: &Output,
) -> Result<String> {
    if args.window == Some(0) {
        bail!("time-of-day window must be at least one minute");
    }
    with_session(storage, config, &args.view, output, |session| {
        let state = apply_filter_args(session.filter_state(), args);
        session.set_filter_state(state);
        Ok(())
    })
}

fn apply_filter_args(current: &FilterState, args: &FilterArgs) -> FilterState {
    FilterState {
        show_bookmarks: args.bookmarks.unwrap_or(current.show_bookmarks),
        show_history: args.history.unwrap_or(current.show_history),
        show_frequent: args.frequent.unwrap_or(current.show_frequent),
        show_recent: args.recent.unwrap_or(current.show_recent),
        time_of_day: args.time_of_day.unwrap_or(current.time_of_day),
        time_window_minutes: args.window.unwrap_or(current.time_window_minutes),
        group_by: args.group.unwrap_or(current.group_by),
        sort_by: args.sort.unwrap_or(current.sort_by),
    }
}

/// Navigation-complete event: append the visit, then count it against matching bookmarks.
pub fn run_visit(storage: &StorageHandle, args: &VisitArgs, clock: &Clock) -> Result<String> {
    let url = args.url.trim();
    if url.is_empty() {
        bail!("url cannot be empty");
    }
    let title = args.title.as_deref().unwrap_or(url);
    let previous = last_visit_from_history(storage, url);
    storage
        .record_visit(url, title, clock.now)
        .context("recording visit")?;
    let touched = UsageTracker::new(storage, storage).record_use(url, clock.now);

    let mut notes = Vec::new();
    if let Some(previous) = previous {
        notes.push(format!("last visited {}", time_ago(previous, clock.now)));
    }
    if touched > 0 {
        notes.push(format!("{touched} usage records updated"));
    }
    Ok(if notes.is_empty() {
        format!("Recorded visit to {url}\n")
    } else {
        format!("Recorded visit to {url} ({})\n", notes.join(", "))
    })
}

pub fn run_bookmark(storage: &StorageHandle, args: &BookmarkArgs, clock: &Clock) -> Result<String> {
    match &args.command {
        BookmarkCommand::Add(args) => {
            let title = args.title.trim();
            if title.is_empty() {
                bail!("bookmark title cannot be empty");
            }
            let id = storage
                .create_bookmark(&args.parent, title, Some(args.url.trim()), clock.now)
                .context("creating bookmark")?;
            if let Some(node) = BookmarkStore::get(storage, &id)? {
                UsageTracker::new(storage, storage).on_bookmark_created(&node, clock.now);
            }
            Ok(format!("Created bookmark #{id}\n"))
        }
        BookmarkCommand::Folder(args) => {
            let title = args.title.trim();
            if title.is_empty() {
                bail!("folder title cannot be empty");
            }
            let id = storage
                .create_bookmark(&args.parent, title, None, clock.now)
                .context("creating folder")?;
            Ok(format!("Created folder #{id}\n"))
        }
        BookmarkCommand::Import(args) => {
            let raw = fs::read_to_string(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let root = parse_export(&raw)
                .with_context(|| format!("parsing {}", args.file.display()))?;
            let imported = storage.import_tree(&root)?;
            Ok(format!("Imported {imported} bookmarks and folders\n"))
        }
    }
}

fn parse_export(raw: &str) -> Result<BookmarkNode> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let root = match value {
        serde_json::Value::Array(mut nodes) => {
            if nodes.is_empty() {
                bail!("export contains no nodes");
            }
            nodes.swap_remove(0)
        }
        other => other,
    };
    Ok(serde_json::from_value(root)?)
}

pub fn run_hide(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &HideArgs,
    confirm: &mut dyn Confirm,
    clock: &Clock,
) -> Result<String> {
    let mut session = PopupSession::open(storage, config, clock.now)?;
    let scope = if args.domain {
        HideScope::Domain
    } else {
        HideScope::Item
    };
    let key = session.resolve_key(args.target.trim(), scope);
    let outcome = session.hide(key.clone(), confirm);
    Ok(describe(outcome, format!("Hidden {key}")))
}

pub fn run_hide_group(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &HideGroupArgs,
    confirm: &mut dyn Confirm,
    clock: &Clock,
) -> Result<String> {
    let mut session = PopupSession::open(storage, config, clock.now)?;
    let view = session.view(clock.local);
    let Some(group) = view
        .groups
        .into_iter()
        .find(|group| group.key() == Some(args.key.as_str()))
    else {
        bail!(
            "no group named '{}' in the current view (grouping by {})",
            args.key,
            session.filter_state().group_by
        );
    };
    let count = group.items.len();
    let outcome = session.hide_group(&group, confirm);
    Ok(describe(outcome, format!("Hidden {count} items in {}", args.key)))
}

pub fn run_hidden(storage: &StorageHandle, args: &HiddenArgs) -> Result<String> {
    let hidden = HiddenSet::load(storage)?;
    let keys = hidden.search(args.filter.as_deref().unwrap_or(""));
    if keys.is_empty() {
        return Ok("No hidden items.\n".to_string());
    }
    let mut out = String::new();
    for key in keys {
        let _ = writeln!(&mut out, "{key}");
    }
    Ok(out)
}

pub fn run_unhide(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &UnhideArgs,
    clock: &Clock,
) -> Result<String> {
    let mut session = PopupSession::open(storage, config, clock.now)?;
    let key = session.hidden_key(&args.key);
    let outcome = session.unignore(&key);
    Ok(describe(outcome, format!("Unhidden {key}")))
}

pub fn run_reset(
    storage: &StorageHandle,
    config: &AppConfig,
    confirm: &mut dyn Confirm,
    clock: &Clock,
) -> Result<String> {
    let mut session = PopupSession::open(storage, config, clock.now)?;
    let outcome = session.reset(confirm);
    Ok(describe(outcome, "Settings reset".to_string()))
}

pub fn run_clear_usage(
    storage: &StorageHandle,
    config: &AppConfig,
    confirm: &mut dyn Confirm,
    clock: &Clock,
) -> Result<String> {
    let mut session = PopupSession::open(storage, config, clock.now)?;
    let outcome = session.clear_usage(confirm, clock.now)?;
    Ok(describe(outcome, "Usage history cleared".to_string()))
}

fn describe(outcome: ActionOutcome, applied: String) -> String {
    match outcome {
        ActionOutcome::Applied => format!("{applied}\n"),
        ActionOutcome::Cancelled => "Cancelled.\n".to_string(),
        ActionOutcome::Unchanged => "Nothing to change.\n".to_string(),
    }
}

/// Opens a session, applies `update`, and renders the view. A failed initial
/// load renders the error panel instead.
fn with_session<F>(
    storage: &StorageHandle,
    config: &AppConfig,
    args: &ViewArgs,
    output: &Output,
    update: F,
) -> Result<String>
where
    F: FnOnce(&mut PopupSession<'_, StorageHandle>) -> Result<()>,
{
    let mut session = match PopupSession::open(storage, config, output.clock.now) {
        Ok(session) => session,
        Err(err) => {
            tracing::error!(?err, "initial load failed");
            return Ok(render_error(&err));
        }
    };
    update(&mut session)?;
    Ok(render_session(&session, args, output))
}

fn render_error(err: &anyhow::Error) -> String {
    format!("Error\n  Failed to load bookmarks: {}\n", err.root_cause())
}

fn render_session(session: &PopupSession<'_, StorageHandle>, args: &ViewArgs, output: &Output) -> String {
    let view = session.view(output.clock.local);
    let state = session.filter_state();
    let regex = build_highlight_regex(session.search_text());
    let mut out = String::new();
    let _ = writeln!(
        &mut out,
        "Showing {} of {} items (sort: {}, group: {})",
        view.visible, view.total, state.sort_by, state.group_by
    );
    if !session.search_text().is_empty() {
        let _ = writeln!(&mut out, "Search: {}", session.search_text());
    }
    if view.is_empty() {
        let _ = writeln!(&mut out, "\n{EMPTY_TITLE}\n{EMPTY_HINT}");
        return out;
    }

    for group in &view.groups {
        match &group.kind {
            GroupKind::Folders => {
                let _ = writeln!(&mut out, "\nFolders");
            }
            GroupKind::Bucket(key) => {
                let _ = writeln!(&mut out, "\n[{key}]");
            }
            GroupKind::Single => {}
        }
        for ranked in group.shown() {
            write_item(&mut out, ranked, regex.as_ref(), args, output);
        }
        if group.hidden_count() > 0 {
            let _ = writeln!(&mut out, "    +{} more", group.hidden_count());
        }
    }
    out
}

fn write_item(
    out: &mut String,
    ranked: &RankedItem,
    regex: Option<&regex::Regex>,
    args: &ViewArgs,
    output: &Output,
) {
    let item = &ranked.item;
    let marker = if ranked.matches_time_of_day() { "◷ " } else { "  " };
    let title = highlight(&item.title, regex, output.style.open, output.style.close);
    let _ = writeln!(out, "{marker}{title}");
    let target = match &item.url {
        Some(url) => url.clone(),
        None => item
            .id
            .bookmark_id()
            .map(folder_url)
            .unwrap_or_default(),
    };
    let _ = writeln!(out, "    {target}");
    if !item.path.is_empty() {
        let _ = writeln!(out, "    in {}", item.path);
    }
    let _ = writeln!(out, "    {}", meta_text(item, output.clock.now));
    if args.icons {
        if let Some(url) = &item.url {
            let icon = favicon_url(url);
            if !icon.is_empty() {
                let _ = writeln!(out, "    icon {icon}");
            }
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{label} ")?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}
