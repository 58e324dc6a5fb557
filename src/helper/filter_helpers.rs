use crate::models::{Article, Category};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Queries shorter than this never reach the server search.
pub const MIN_SEARCH_CHARS: usize = 2;
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn days(self) -> i64 {
        match self {
            TimeRange::Day => 1,
            TimeRange::Week => 7,
            TimeRange::Month => 30,
            TimeRange::Year => 365,
        }
    }

    /// Canonical query value.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
            TimeRange::Year => "365d",
        }
    }

    /// `None` for "all" and for anything unrecognised.
    pub fn parse(value: &str) -> Option<TimeRange> {
        match value.trim().to_lowercase().as_str() {
            "24h" | "1d" | "day" | "today" => Some(TimeRange::Day),
            "7d" | "week" => Some(TimeRange::Week),
            "30d" | "month" => Some(TimeRange::Month),
            "365d" | "1y" | "year" => Some(TimeRange::Year),
            _ => None,
        }
    }
}

/// Listing filters. `None`/empty fields place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub category: Option<Category>,
    pub country: Option<String>,
    pub time_range: Option<TimeRange>,
    pub video_only: bool,
    pub query: String,
}

impl FilterState {
    /// Builds a state from loosely-typed request values. Invalid values become pass-through.
    pub fn from_params(
        category: Option<&str>,
        country: Option<&str>,
        range: Option<&str>,
        video: Option<&str>,
        query: Option<&str>,
    ) -> Self {
        FilterState {
            category: category.and_then(Category::parse_label),
            country: country
                .map(|c| c.trim())
                .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
                .map(|c| c.to_string()),
            time_range: range.and_then(TimeRange::parse),
            video_only: video.map_or(false, |v| matches!(v.trim(), "1" | "true" | "yes" | "on")),
            query: query.unwrap_or_default().trim().to_string(),
        }
    }

    pub fn search_query(&self) -> Option<&str> {
        if needs_server_search(&self.query) {
            Some(self.query.trim())
        } else {
            None
        }
    }
}

pub fn needs_server_search(query: &str) -> bool {
    query.trim().chars().count() >= MIN_SEARCH_CHARS
}

/// Case-insensitive text match used by the server-side search.
pub fn matches_query(article: &Article, query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    [&article.title, &article.excerpt, &article.content]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
        || article
            .countries
            .iter()
            .chain(article.organizations.iter())
            .any(|tag| tag.to_lowercase().contains(&needle))
}

type Stage<'s> = Box<dyn Fn(&Article) -> bool + 's>;

fn stages<'s>(state: &'s FilterState, now: DateTime<Utc>) -> Vec<Stage<'s>> {
    let mut stages: Vec<Stage<'s>> = Vec::new();
    if let Some(category) = state.category {
        stages.push(Box::new(move |a: &Article| a.category == category));
    }
    if let Some(country) = state.country.as_deref() {
        stages.push(Box::new(move |a: &Article| a.lists_country(country)));
    }
    if let Some(range) = state.time_range {
        let cutoff = now - ChronoDuration::days(range.days());
        stages.push(Box::new(move |a: &Article| a.display_date() >= cutoff));
    }
    if state.video_only {
        stages.push(Box::new(|a: &Article| a.has_video()));
    }
    stages
}

/// Runs category, country, date and media predicates in that order. The result
/// keeps the input's relative order; an empty stage ends the pipeline early.
pub fn apply_filters<'a>(
    articles: &'a [Article],
    state: &FilterState,
    now: DateTime<Utc>,
) -> Vec<&'a Article> {
    let mut current: Vec<&Article> = articles.iter().collect();
    for stage in stages(state, now) {
        if current.is_empty() {
            break;
        }
        current.retain(|a| stage(*a));
    }
    current
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

pub fn page_window<T: Clone>(items: &[T], visible: usize) -> Page<T> {
    let shown = visible.min(items.len());
    Page {
        items: items[..shown].to_vec(),
        total: items.len(),
        has_more: shown < items.len(),
    }
}

/// A server search the caller should run. Only the newest ticket's results are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTicket {
    pub seq: u64,
    pub query: String,
}

/// Listing state for one reader: filters, a debounced search and a growing page window.
/// Time is supplied by the caller.
pub struct FilterSession {
    base: Vec<Article>,
    search_results: Option<Vec<Article>>,
    state: FilterState,
    page_size: usize,
    visible: usize,
    debounce: Duration,
    pending_query: Option<(String, Instant)>,
    latest_seq: u64,
}

impl FilterSession {
    pub fn new(base: Vec<Article>, page_size: usize, debounce: Duration) -> Self {
        let page_size = page_size.max(1);
        FilterSession {
            base,
            search_results: None,
            state: FilterState::default(),
            page_size,
            visible: page_size,
            debounce,
            pending_query: None,
            latest_seq: 0,
        }
    }

    /// Installs a state whose search (if any) is already reflected in `base`.
    pub fn with_state(mut self, state: FilterState) -> Self {
        self.state = state;
        self.reset_window();
        self
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn visible_len(&self) -> usize {
        self.visible
    }

    fn reset_window(&mut self) {
        self.visible = self.page_size;
    }

    pub fn set_category(&mut self, category: Option<Category>) {
        self.state.category = category;
        self.reset_window();
    }

    pub fn set_country(&mut self, country: Option<String>) {
        self.state.country = country.filter(|c| !c.trim().is_empty());
        self.reset_window();
    }

    pub fn set_time_range(&mut self, range: Option<TimeRange>) {
        self.state.time_range = range;
        self.reset_window();
    }

    pub fn set_video_only(&mut self, video_only: bool) {
        self.state.video_only = video_only;
        self.reset_window();
    }

    /// Records a keystroke. Short queries drop any search and return to the base list.
    pub fn set_query(&mut self, query: &str, now: Instant) {
        self.state.query = query.to_string();
        self.reset_window();
        if needs_server_search(query) {
            self.pending_query = Some((query.trim().to_string(), now + self.debounce));
        } else {
            self.pending_query = None;
            self.search_results = None;
            // Anything still in flight is now stale.
            self.latest_seq += 1;
        }
    }

    /// Issues a search once the debounce interval has passed without newer input.
    pub fn poll_search(&mut self, now: Instant) -> Option<SearchTicket> {
        let due = matches!(&self.pending_query, Some((_, deadline)) if now >= *deadline);
        if !due {
            return None;
        }
        let (query, _) = self.pending_query.take()?;
        self.latest_seq += 1;
        Some(SearchTicket { seq: self.latest_seq, query })
    }

    /// Installs server results unless a newer search or query has superseded `ticket`.
    pub fn accept_search_results(&mut self, ticket: &SearchTicket, results: Vec<Article>) -> bool {
        if ticket.seq != self.latest_seq || self.state.query.trim() != ticket.query {
            log::debug!("Discarding stale search results for '{}' (seq {})", ticket.query, ticket.seq);
            return false;
        }
        self.search_results = Some(results);
        self.reset_window();
        true
    }

    pub fn load_more(&mut self) {
        self.visible += self.page_size;
    }

    pub fn filtered(&self, now: DateTime<Utc>) -> Vec<&Article> {
        let source = match (&self.search_results, needs_server_search(&self.state.query)) {
            (Some(results), true) => results.as_slice(),
            _ => self.base.as_slice(),
        };
        apply_filters(source, &self.state, now)
    }

    pub fn page(&self, now: DateTime<Utc>) -> Page<Article> {
        let filtered: Vec<Article> = self.filtered(now).into_iter().cloned().collect();
        page_window(&filtered, self.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, Engagement, Locale};
    use std::collections::BTreeSet;

    fn article(n: usize, category: Category, age_days: i64, country: &str, video: bool) -> Article {
        let now = Utc::now();
        Article {
            id: format!("a{}", n),
            group_id: format!("g{}", n),
            locale: Locale::En,
            title: format!("Article {}", n),
            excerpt: String::new(),
            raw_content: String::new(),
            content: format!("content {}", n),
            category,
            countries: [country.to_string()].into_iter().collect(),
            organizations: BTreeSet::new(),
            image_url: None,
            video_url: video.then(|| "https://video.example/v.mp4".to_string()),
            status: ArticleStatus::Published,
            scheduled_at: None,
            engagement: Engagement::default(),
            created_at: now - ChronoDuration::days(age_days),
            updated_at: now,
            published_at: Some(now - ChronoDuration::days(age_days)),
        }
    }

    fn fixture() -> Vec<Article> {
        vec![
            article(0, Category::Political, 0, "Syria", false),
            article(1, Category::Military, 1, "Iraq", true),
            article(2, Category::Economic, 2, "Syria", false),
            article(3, Category::Political, 3, "Lebanon", false),
            article(4, Category::Military, 5, "Syria", false),
            article(5, Category::Analysis, 8, "Iraq", true),
            article(6, Category::Security, 10, "Yemen", false),
            article(7, Category::Humanitarian, 20, "Syria", false),
            article(8, Category::Military, 40, "Yemen", true),
            article(9, Category::Diplomatic, 400, "Iraq", false),
        ]
    }

    fn ids(articles: &[&Article]) -> Vec<String> {
        articles.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn military_filter_returns_the_three_in_order() {
        let articles = fixture();
        let state = FilterState { category: Some(Category::Military), ..Default::default() };
        let result = apply_filters(&articles, &state, Utc::now());
        assert_eq!(ids(&result), vec!["a1", "a4", "a8"]);
    }

    #[test]
    fn result_is_an_order_preserving_subsequence() {
        let articles = fixture();
        let states = [
            FilterState::default(),
            FilterState { country: Some("syria".into()), ..Default::default() },
            FilterState { time_range: Some(TimeRange::Month), video_only: true, ..Default::default() },
            FilterState { category: Some(Category::Political), country: Some("Lebanon".into()), ..Default::default() },
        ];
        for state in states {
            let result = apply_filters(&articles, &state, Utc::now());
            let positions: Vec<usize> = result
                .iter()
                .map(|a| articles.iter().position(|b| b.id == a.id).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", state);
        }
    }

    #[test]
    fn stages_compose() {
        let articles = fixture();
        let state = FilterState {
            category: Some(Category::Military),
            time_range: Some(TimeRange::Week),
            ..Default::default()
        };
        assert_eq!(ids(&apply_filters(&articles, &state, Utc::now())), vec!["a1", "a4"]);

        let state = FilterState { video_only: true, country: Some("Iraq".into()), ..Default::default() };
        assert_eq!(ids(&apply_filters(&articles, &state, Utc::now())), vec!["a1", "a5"]);
    }

    #[test]
    fn invalid_params_are_pass_through() {
        let state = FilterState::from_params(Some("sports"), Some("all"), Some("forever"), Some("maybe"), Some(" "));
        assert_eq!(state, FilterState::default());
        let articles = fixture();
        assert_eq!(apply_filters(&articles, &state, Utc::now()).len(), articles.len());
    }

    #[test]
    fn single_character_query_never_searches() {
        let mut session = FilterSession::new(fixture(), 4, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        session.set_query("a", t0);
        assert_eq!(session.poll_search(t0 + Duration::from_secs(5)), None);
        assert_eq!(session.page(Utc::now()).total, 10);
        assert!(!needs_server_search("a"));
        assert!(needs_server_search("ab"));
    }

    #[test]
    fn search_is_debounced() {
        let mut session = FilterSession::new(fixture(), 4, DEFAULT_SEARCH_DEBOUNCE);
        let t0 = Instant::now();
        session.set_query("sy", t0);
        session.set_query("syr", t0 + Duration::from_millis(200));
        assert_eq!(session.poll_search(t0 + Duration::from_millis(400)), None);
        let ticket = session.poll_search(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(ticket.query, "syr");
        assert_eq!(session.poll_search(t0 + Duration::from_millis(900)), None);
    }

    #[test]
    fn stale_results_are_discarded() {
        let articles = fixture();
        let mut session = FilterSession::new(articles.clone(), 4, Duration::ZERO);
        let t0 = Instant::now();
        session.set_query("old", t0);
        let old = session.poll_search(t0).unwrap();
        session.set_query("new", t0);
        let new = session.poll_search(t0).unwrap();

        assert!(!session.accept_search_results(&old, vec![articles[0].clone()]));
        assert!(session.accept_search_results(&new, vec![articles[1].clone(), articles[2].clone()]));
        assert_eq!(session.page(Utc::now()).total, 2);

        // Clearing the query falls back to the base list and invalidates the ticket.
        session.set_query("", t0);
        assert!(!session.accept_search_results(&new, vec![]));
        assert_eq!(session.page(Utc::now()).total, 10);
    }

    #[test]
    fn filters_still_apply_to_search_results() {
        let articles = fixture();
        let mut session = FilterSession::new(articles.clone(), 10, Duration::ZERO);
        let t0 = Instant::now();
        session.set_query("iraq", t0);
        let ticket = session.poll_search(t0).unwrap();
        let results: Vec<Article> = articles.iter().filter(|a| a.lists_country("Iraq")).cloned().collect();
        assert!(session.accept_search_results(&ticket, results));
        session.set_video_only(true);
        let page = session.page(Utc::now());
        assert_eq!(page.items.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["a1", "a5"]);
    }

    #[test]
    fn load_more_grows_and_filter_change_resets() {
        let mut session = FilterSession::new(fixture(), 3, DEFAULT_SEARCH_DEBOUNCE);
        let now = Utc::now();
        let first = session.page(now);
        assert_eq!(first.items.len(), 3);
        assert!(first.has_more);

        session.load_more();
        session.load_more();
        assert_eq!(session.page(now).items.len(), 9);
        session.load_more();
        let last = session.page(now);
        assert_eq!(last.items.len(), 10);
        assert!(!last.has_more);

        session.set_category(Some(Category::Military));
        assert_eq!(session.visible_len(), 3);
        assert_eq!(session.page(now).items.len(), 3);
    }

    #[test]
    fn text_match_covers_tags() {
        let articles = fixture();
        assert!(matches_query(&articles[6], "yem"));
        assert!(matches_query(&articles[0], "ARTICLE 0"));
        assert!(!matches_query(&articles[0], "nothing like this"));
    }
}
