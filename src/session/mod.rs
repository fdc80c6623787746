//! Per-popup session state: built when the list opens, dropped when it closes.

use anyhow::{Context, Result};
use time::OffsetDateTime;

use crate::catalog::load_catalog;
use crate::config::AppConfig;
use crate::hidden::{HiddenSet, HideScope, SuppressionKey, HIDDEN_KEY};
use crate::model::Item;
use crate::ranking::{
    compute_view, FilterState, View, ViewContext, ViewGroup, FILTER_STATE_KEY, SEARCH_TEXT_KEY,
};
use crate::stores::{load_entry, save_entry, BookmarkStore, HistoryStore, KeyValueStore, StoreResult};
use crate::urls::domain_key;
use crate::usage::{UsageMap, UsageTracker};

mod confirm;

pub use confirm::{AutoConfirm, Confirm};

/// Everything a session needs from the host.
pub trait Platform: BookmarkStore + HistoryStore + KeyValueStore {}

impl<T: BookmarkStore + HistoryStore + KeyValueStore + ?Sized> Platform for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// The user declined the confirmation; nothing changed.
    Cancelled,
    /// Nothing to do (key already present or absent).
    Unchanged,
}

pub struct PopupSession<'a, P: Platform + ?Sized> {
    platform: &'a P,
    config: &'a AppConfig,
    items: Vec<Item>,
    usage: UsageMap,
    hidden: HiddenSet,
    filter: FilterState,
    search_text: String,
}

impl<'a, P: Platform + ?Sized> PopupSession<'a, P> {
    /// Loads persisted state and the catalog. Only the bookmark tree read can fail.
    pub fn open(platform: &'a P, config: &'a AppConfig, now: i64) -> Result<Self> {
        let usage = or_default(UsageMap::load(platform), "usage map");
        let hidden = or_default(HiddenSet::load(platform), "hidden items");
        let filter = or_default(FilterState::load(platform), "filter state");
        let search_text = or_default(load_entry::<String, _>(platform, SEARCH_TEXT_KEY), "search text")
            .unwrap_or_default();
        let items = load_catalog(platform, platform, &usage, config, now)
            .context("failed to load bookmarks")?;
        tracing::debug!(
            items = items.len(),
            usage = usage.len(),
            hidden = hidden.len(),
            "opened session"
        );
        Ok(Self {
            platform,
            config,
            items,
            usage,
            hidden,
            filter,
            search_text,
        })
    }

    /// Re-reads usage and the catalog, keeping filter, search and hidden state.
    pub fn reload(&mut self, now: i64) -> Result<()> {
        self.usage = or_default(UsageMap::load(self.platform), "usage map");
        self.items = load_catalog(self.platform, self.platform, &self.usage, self.config, now)
            .context("failed to load bookmarks")?;
        Ok(())
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn usage(&self) -> &UsageMap {
        &self.usage
    }

    pub fn hidden(&self) -> &HiddenSet {
        &self.hidden
    }

    pub fn filter_state(&self) -> &FilterState {
        &self.filter
    }

    pub fn search_text(&self) -> &str {
        &self.search_text
    }

    pub fn set_filter_state(&mut self, state: FilterState) {
        self.filter = state;
        warn_on_err(self.filter.save(self.platform), "filter state");
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search_text = text.into();
        warn_on_err(
            save_entry(self.platform, SEARCH_TEXT_KEY, &self.search_text),
            "search text",
        );
    }

    pub fn view(&self, now: OffsetDateTime) -> View {
        let ctx = ViewContext {
            options: &self.config.ranking,
            now,
        };
        compute_view(&self.items, &self.filter, &self.hidden, &self.search_text, &ctx)
    }

    /// Looks an item up by URL or by its displayed id.
    pub fn find(&self, target: &str) -> Option<&Item> {
        self.items
            .iter()
            .find(|item| item.url.as_deref() == Some(target) || item.id.to_string() == target)
    }

    /// The key that hides `target` at `scope`, whether or not it is loaded.
    pub fn resolve_key(&self, target: &str, scope: HideScope) -> SuppressionKey {
        match (self.find(target), scope) {
            (Some(item), _) => SuppressionKey::for_item(item, scope),
            (None, HideScope::Domain) => SuppressionKey::Domain(domain_key(target)),
            (None, HideScope::Item) => SuppressionKey::parse(target),
        }
    }

    pub fn hide(&mut self, key: SuppressionKey, confirm: &mut dyn Confirm) -> ActionOutcome {
        if self.hidden.contains(&key) {
            return ActionOutcome::Unchanged;
        }
        if !confirm.confirm(&format!("Hide {key} from the list?")) {
            return ActionOutcome::Cancelled;
        }
        tracing::info!(%key, "hiding item");
        self.hidden.insert(key);
        warn_on_err(self.hidden.save(self.platform), "hidden items");
        ActionOutcome::Applied
    }

    /// Hides every member of `group` in one batch.
    pub fn hide_group(&mut self, group: &ViewGroup, confirm: &mut dyn Confirm) -> ActionOutcome {
        let keys: Vec<SuppressionKey> = group
            .suppression_keys()
            .into_iter()
            .filter(|key| !self.hidden.contains(key))
            .collect();
        if keys.is_empty() {
            return ActionOutcome::Unchanged;
        }
        let label = group.key().unwrap_or("this group");
        if !confirm.confirm(&format!("Hide all {} items in {label}?", keys.len())) {
            return ActionOutcome::Cancelled;
        }
        let added = self.hidden.extend(keys);
        tracing::info!(added, group = label, "hiding group");
        warn_on_err(self.hidden.save(self.platform), "hidden items");
        ActionOutcome::Applied
    }

    pub fn unignore(&mut self, key: &SuppressionKey) -> ActionOutcome {
        if !self.hidden.remove(key) {
            return ActionOutcome::Unchanged;
        }
        tracing::info!(%key, "unignored item");
        warn_on_err(self.hidden.save(self.platform), "hidden items");
        ActionOutcome::Applied
    }

    /// The hidden key whose listed text is exactly `raw`, or `raw` parsed as a new key.
    pub fn hidden_key(&self, raw: &str) -> SuppressionKey {
        let raw = raw.trim();
        self.hidden
            .iter()
            .find(|key| key.to_string() == raw)
            .cloned()
            .unwrap_or_else(|| SuppressionKey::parse(raw))
    }

    /// Keys in the settings list whose text contains `filter`.
    pub fn hidden_keys(&self, filter: &str) -> Vec<&SuppressionKey> {
        self.hidden.search(filter)
    }

    /// Clears hidden items, filter state and search text together.
    pub fn reset(&mut self, confirm: &mut dyn Confirm) -> ActionOutcome {
        if !confirm.confirm("Reset all settings and show every hidden item again?") {
            return ActionOutcome::Cancelled;
        }
        self.hidden.clear();
        self.filter = FilterState::default();
        self.search_text.clear();
        warn_on_err(
            self.platform.remove(&[HIDDEN_KEY, FILTER_STATE_KEY, SEARCH_TEXT_KEY]),
            "settings",
        );
        tracing::info!("reset settings");
        ActionOutcome::Applied
    }

    /// Discards every usage record and reloads the catalog without it.
    pub fn clear_usage(&mut self, confirm: &mut dyn Confirm, now: i64) -> Result<ActionOutcome> {
        if !confirm.confirm("Are you sure you want to clear the usage history?") {
            return Ok(ActionOutcome::Cancelled);
        }
        warn_on_err(
            UsageTracker::new(self.platform, self.platform).clear(),
            "usage map",
        );
        self.reload(now)?;
        Ok(ActionOutcome::Applied)
    }
}

fn or_default<T: Default>(result: StoreResult<T>, what: &str) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load {what}, using defaults");
            T::default()
        }
    }
}

fn warn_on_err(result: StoreResult<()>, what: &str) {
    if let Err(err) = result {
        tracing::warn!(error = %err, "failed to persist {what}");
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::model::{ItemKind, MILLIS_PER_DAY};
    use crate::ranking::{GroupMode, SortKey};
    use crate::storage::testing::temp_storage;
    use crate::storage::StorageHandle;

    const NOW: OffsetDateTime = datetime!(2024-06-01 12:00 UTC);

    fn now_ms() -> i64 {
        (NOW.unix_timestamp_nanos() / 1_000_000) as i64
    }

    fn seed(storage: &StorageHandle) -> Result<()> {
        let now = now_ms();
        storage.create_bookmark("1", "Docs", Some("https://docs.rs/"), now - 30 * MILLIS_PER_DAY)?;
        storage.create_bookmark("1", "News A", Some("https://news.example/a"), now)?;
        storage.create_bookmark("2", "News B", Some("https://news.example/b"), now)?;
        for offset in 1..=3 {
            storage.record_visit("https://docs.rs/", "Docs", now - offset * 1_000)?;
        }
        storage.record_visit("https://news.example/a", "News A", now - 5_000)?;
        storage.record_visit("https://news.example/b", "News B", now - 6_000)?;
        storage.record_visit("https://only.example/", "Only history", now - 7_000)?;
        Ok(())
    }

    fn titles(view: &View) -> Vec<String> {
        view.groups
            .iter()
            .flat_map(|group| group.items.iter().map(|r| r.item.title.clone()))
            .collect()
    }

    #[test]
    fn filter_state_defaults_and_round_trips() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        let config = AppConfig::default();
        {
            let session = PopupSession::open(&storage, &config, now_ms())?;
            assert_eq!(session.filter_state(), &FilterState::default());
            assert_eq!(session.filter_state().group_by, GroupMode::None);
        }

        let custom = FilterState {
            show_bookmarks: false,
            show_history: true,
            show_frequent: true,
            show_recent: true,
            time_of_day: true,
            time_window_minutes: 45,
            group_by: GroupMode::Title,
            sort_by: SortKey::Frequency,
        };
        {
            let mut session = PopupSession::open(&storage, &config, now_ms())?;
            session.set_filter_state(custom.clone());
            session.set_search_text("news");
        }
        let reopened = PopupSession::open(&storage, &config, now_ms())?;
        assert_eq!(reopened.filter_state(), &custom);
        assert_eq!(reopened.search_text(), "news");
        Ok(())
    }

    #[test]
    fn session_view_merges_and_ranks() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        session.set_filter_state(FilterState {
            sort_by: SortKey::Frequency,
            ..FilterState::default()
        });

        let view = session.view(NOW);
        let titles = titles(&view);
        assert_eq!(titles[0], "Docs");
        assert!(titles.contains(&"Only history".to_string()));
        assert_eq!(titles.iter().filter(|t| t.as_str() == "Docs").count(), 1);
        assert_eq!(titles.last().map(String::as_str), Some("Other Bookmarks"));
        Ok(())
    }

    #[test]
    fn domain_hide_is_confirmed_and_persisted() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        let key = session.resolve_key("https://news.example/a", HideScope::Domain);
        assert_eq!(key, SuppressionKey::Domain("news.example".into()));

        let mut decline = |_: &str| false;
        assert_eq!(session.hide(key.clone(), &mut decline), ActionOutcome::Cancelled);
        assert!(session.hidden().is_empty());

        assert_eq!(session.hide(key.clone(), &mut AutoConfirm), ActionOutcome::Applied);
        assert_eq!(session.hide(key.clone(), &mut AutoConfirm), ActionOutcome::Unchanged);
        assert!(!titles(&session.view(NOW)).iter().any(|t| t.starts_with("News")));

        storage.create_bookmark("1", "News C", Some("https://news.example/c"), now_ms())?;
        storage.record_visit("https://news.example/c", "News C", now_ms())?;
        let mut reopened = PopupSession::open(&storage, &config, now_ms())?;
        assert!(!titles(&reopened.view(NOW)).iter().any(|t| t.starts_with("News")));

        assert_eq!(reopened.unignore(&key), ActionOutcome::Applied);
        assert!(titles(&reopened.view(NOW)).iter().any(|t| t == "News C"));
        Ok(())
    }

    #[test]
    fn group_hide_suppresses_all_members() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        session.set_filter_state(FilterState {
            group_by: GroupMode::Domain,
            ..FilterState::default()
        });
        let view = session.view(NOW);
        let news = view
            .groups
            .iter()
            .find(|group| group.key() == Some("news.example"))
            .expect("news group")
            .clone();
        assert_eq!(news.hidden_count(), 1);

        assert_eq!(session.hide_group(&news, &mut AutoConfirm), ActionOutcome::Applied);
        assert_eq!(session.hidden().len(), 2);
        assert!(session.view(NOW).groups.iter().all(|g| g.key() != Some("news.example")));
        Ok(())
    }

    #[test]
    fn reset_clears_hidden_and_filters_together() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        session.hide(SuppressionKey::Url("https://docs.rs/".into()), &mut AutoConfirm);
        session.set_filter_state(FilterState {
            show_history: false,
            ..FilterState::default()
        });
        session.set_search_text("docs");

        assert_eq!(session.reset(&mut |_: &str| false), ActionOutcome::Cancelled);
        assert_eq!(session.hidden().len(), 1);

        assert_eq!(session.reset(&mut AutoConfirm), ActionOutcome::Applied);
        let reopened = PopupSession::open(&storage, &config, now_ms())?;
        assert!(reopened.hidden().is_empty());
        assert_eq!(reopened.filter_state(), &FilterState::default());
        assert_eq!(reopened.search_text(), "");
        Ok(())
    }

    #[test]
    fn clear_usage_reloads_without_tracked_counts() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        UsageTracker::new(&storage, &storage).record_use("https://docs.rs/", now_ms());
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        assert!(!session.usage().is_empty());
        let docs = session.find("https://docs.rs/").expect("docs");
        assert_eq!(docs.use_count, 1);
        assert_eq!(docs.kind, ItemKind::Bookmark);

        assert_eq!(
            session.clear_usage(&mut |_: &str| false, now_ms())?,
            ActionOutcome::Cancelled
        );
        assert!(!session.usage().is_empty());

        assert_eq!(session.clear_usage(&mut AutoConfirm, now_ms())?, ActionOutcome::Applied);
        assert!(session.usage().is_empty());
        assert_eq!(session.find("https://docs.rs/").map(|i| i.use_count), Some(0));
        Ok(())
    }

    #[test]
    fn unloaded_domain_target_is_normalised() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        let key = session.resolve_key("News.Example", HideScope::Domain);
        assert_eq!(key, SuppressionKey::Domain("news.example".into()));

        session.hide(key, &mut AutoConfirm);
        assert!(!titles(&session.view(NOW)).iter().any(|t| t.starts_with("News")));
        Ok(())
    }

    #[test]
    fn bookmarklet_can_be_unhidden_by_its_listed_text() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        let bookmarklet = "javascript:(function(){document.body.style.zoom=2})()";
        storage.create_bookmark("1", "Zoom", Some(bookmarklet), now_ms())?;
        storage.record_visit(bookmarklet, "Zoom", now_ms())?;
        let config = AppConfig::default();
        let mut session = PopupSession::open(&storage, &config, now_ms())?;
        let key = session.resolve_key(bookmarklet, HideScope::Item);
        assert_eq!(key, SuppressionKey::Url(bookmarklet.into()));
        session.hide(key, &mut AutoConfirm);
        assert!(!titles(&session.view(NOW)).contains(&"Zoom".to_string()));

        let listed = session.hidden_keys("zoom")[0].to_string();
        let key = session.hidden_key(&listed);
        assert_eq!(session.unignore(&key), ActionOutcome::Applied);
        assert!(titles(&session.view(NOW)).contains(&"Zoom".to_string()));
        Ok(())
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        seed(&storage)?;
        storage.with_connection(|conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES ('hiddenItems', '{not json')",
                [],
            )?;
            conn.execute(
                "INSERT INTO kv (key, value) VALUES ('filterState', '\"grouped\"')",
                [],
            )?;
            conn.execute(
                "INSERT INTO kv (key, value) VALUES ('bookmarkUsage', '[1, 2')",
                [],
            )?;
            Ok(())
        })?;
        assert!(HiddenSet::load(&storage).is_err());
        assert!(FilterState::load(&storage).is_err());

        let config = AppConfig::default();
        let session = PopupSession::open(&storage, &config, now_ms())?;
        assert!(session.hidden().is_empty());
        assert!(session.usage().is_empty());
        assert_eq!(session.filter_state(), &FilterState::default());
        assert!(titles(&session.view(NOW)).contains(&"Docs".to_string()));
        Ok(())
    }

    #[test]
    fn missing_bookmark_root_fails_the_initial_load() -> Result<()> {
        let (_temp, storage) = temp_storage()?;
        storage.with_connection(|conn| {
            conn.execute("DELETE FROM bookmarks", [])?;
            Ok(())
        })?;
        let config = AppConfig::default();
        let err = PopupSession::open(&storage, &config, now_ms())
            .err()
            .expect("load should fail");
        assert!(err.to_string().contains("failed to load bookmarks"));
        Ok(())
    }
}
