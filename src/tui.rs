use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::api::ApiClient;
use crate::bookmark::{self, BookmarkError};
use crate::feed::{FeedErrorKind, FeedState, PostFeed, RefreshKey};
use crate::filter::{ActiveOnly, FilterSelection, FilterStore, SortOrder};
use crate::models::Post;
use crate::pagination::PageWindow;
use crate::session::Session;
use crate::taxonomy::{self, DomainCode, DomainEntry, RoleCategory, RoleCode, RoleEntry, DOMAINS, ROLE_CATEGORIES};

const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Filters,
    Posts,
}

/// One selectable line of the filter panel.
#[derive(Debug, Clone, Copy)]
enum FilterRow {
    Category(&'static RoleCategory),
    Role(&'static RoleEntry),
    AllDomains,
    Domain(&'static DomainEntry),
    Status,
    Sort,
    Reset,
}

fn filter_rows() -> Vec<FilterRow> {
    let mut rows = Vec::new();
    for category in ROLE_CATEGORIES {
        rows.push(FilterRow::Category(category));
        // single-role categories toggle through their header
        if category.roles.len() > 1 {
            rows.extend(category.roles.iter().map(FilterRow::Role));
        }
    }
    rows.push(FilterRow::AllDomains);
    rows.extend(DOMAINS.iter().map(FilterRow::Domain));
    rows.push(FilterRow::Status);
    rows.push(FilterRow::Sort);
    rows.push(FilterRow::Reset);
    rows
}

fn group_mark(selected: usize, total: usize) -> &'static str {
    if selected == 0 {
        "[ ]"
    } else if selected == total {
        "[x]"
    } else {
        "[-]"
    }
}

fn mark(on: bool) -> &'static str {
    if on { "[x]" } else { "[ ]" }
}

impl FilterRow {
    fn label(&self, selection: &FilterSelection) -> String {
        match self {
            FilterRow::Category(category) => {
                let picked = category
                    .codes()
                    .filter(|code| selection.roles.contains(code))
                    .count();
                format!("{} {}", group_mark(picked, category.roles.len()), category.label)
            }
            FilterRow::Role(role) => {
                let on = selection.roles.contains(&RoleCode::new(role.code));
                format!("    {} {}", mark(on), role.label)
            }
            FilterRow::AllDomains => {
                let picked = taxonomy::all_domains()
                    .filter(|code| selection.domains.contains(code))
                    .count();
                format!("{} All domains", group_mark(picked, DOMAINS.len()))
            }
            FilterRow::Domain(domain) => {
                let on = selection.domains.contains(&DomainCode::new(domain.code));
                format!("    {} {}", mark(on), domain.label)
            }
            FilterRow::Status => format!("Status: {}", selection.active_only.label()),
            FilterRow::Sort => format!("Sort: {}", selection.sort_order.label()),
            FilterRow::Reset => "Reset filters".to_string(),
        }
    }

    /// Rows belonging to a group that differs from its default are emphasised.
    fn changed(&self, selection: &FilterSelection) -> bool {
        match self {
            FilterRow::Category(_) | FilterRow::Role(_) => selection.roles_changed(),
            FilterRow::AllDomains | FilterRow::Domain(_) => selection.domains_changed(),
            FilterRow::Status => selection.status_changed(),
            FilterRow::Sort => selection.sort_changed(),
            FilterRow::Reset => false,
        }
    }
}

struct Notice {
    text: String,
    is_error: bool,
}

struct BookmarkOutcome {
    post: Post,
    result: Result<bool, BookmarkError>,
}

/// Handles the browser needs to reach the runtime and the server.
struct Services {
    api: ApiClient,
    session: Session,
    refresh: RefreshKey,
    handle: Handle,
    outcomes: mpsc::UnboundedSender<BookmarkOutcome>,
}

struct AppState {
    store: FilterStore,
    rows: Vec<FilterRow>,
    feed: FeedState,
    focus: Focus,
    selected_row: usize,
    selected_post: usize,
    scroll_offset: u16,
    notice: Option<Notice>,
    expiry_handled: bool,
    today: NaiveDate,
}

impl AppState {
    fn new(store: FilterStore) -> Self {
        Self {
            store,
            rows: filter_rows(),
            feed: FeedState::default(),
            focus: Focus::Posts,
            selected_row: 0,
            selected_post: 0,
            scroll_offset: 0,
            notice: None,
            expiry_handled: false,
            today: chrono::Local::now().date_naive(),
        }
    }

    fn current_post(&self) -> Option<&Post> {
        self.feed.posts.get(self.selected_post)
    }

    fn info(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice { text: text.into(), is_error: false });
    }

    fn error(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice { text: text.into(), is_error: true });
    }

    fn apply_feed(&mut self, next: FeedState, services: &Services) {
        let same_posts = self.feed.posts.len() == next.posts.len()
            && self.feed.posts.iter().zip(&next.posts).all(|(a, b)| a.id == b.id);
        if !same_posts {
            self.selected_post = 0;
            self.scroll_offset = 0;
        }

        match &next.error {
            Some(error) if error.kind == FeedErrorKind::AuthExpired => {
                if !self.expiry_handled {
                    self.expiry_handled = true;
                    services.session.expire();
                    self.error("Session expired. Log in again with `hasha login`.");
                    // re-fetch anonymously
                    services.refresh.bump();
                }
            }
            Some(_) => {}
            None => self.expiry_handled = false,
        }
        self.feed = next;
    }

    fn next(&mut self) {
        match self.focus {
            Focus::Posts => {
                if self.selected_post + 1 < self.feed.posts.len() {
                    self.selected_post += 1;
                    self.scroll_offset = 0;
                }
            }
            Focus::Filters => {
                if self.selected_row + 1 < self.rows.len() {
                    self.selected_row += 1;
                }
            }
        }
    }

    fn prev(&mut self) {
        match self.focus {
            Focus::Posts => {
                if self.selected_post > 0 {
                    self.selected_post -= 1;
                    self.scroll_offset = 0;
                }
            }
            Focus::Filters => self.selected_row = self.selected_row.saturating_sub(1),
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn activate_row(&mut self) {
        let Some(row) = self.rows.get(self.selected_row).copied() else { return };
        match row {
            FilterRow::Category(category) => self.store.toggle_category_all(category),
            FilterRow::Role(role) => self.store.toggle_role(RoleCode::new(role.code)),
            FilterRow::AllDomains => self.store.toggle_all_domains(),
            FilterRow::Domain(domain) => self.store.toggle_domain(DomainCode::new(domain.code)),
            FilterRow::Status => {
                let next = match self.store.selection().active_only {
                    ActiveOnly::Unset => ActiveOnly::True,
                    ActiveOnly::True => ActiveOnly::Unset,
                };
                self.store.set_active_only(next);
            }
            FilterRow::Sort => {
                let next = match self.store.selection().sort_order {
                    SortOrder::Recent => SortOrder::DeadlineSoon,
                    SortOrder::DeadlineSoon => SortOrder::Recent,
                };
                self.store.set_sort_order(next);
            }
            FilterRow::Reset => self.reset(),
        }
    }

    fn reset(&mut self) {
        if self.store.reset_all() {
            self.info("Filters reset");
        } else {
            self.info("Filters are already at their defaults");
        }
    }

    fn clear_domains(&mut self) {
        if !self.store.clear_domains() {
            self.info("No domain filter to clear");
        }
    }

    fn window(&self) -> Option<PageWindow> {
        PageWindow::new(self.store.selection().page, self.feed.last_page)
    }

    fn next_page(&mut self) {
        if let Some(page) = self.window().and_then(|w| w.next()) {
            self.store.set_page(page);
        }
    }

    fn prev_page(&mut self) {
        if let Some(page) = self.window().and_then(|w| w.prev()) {
            self.store.set_page(page);
        }
    }

    /// Flips the flag locally and lets a background task reconcile with the
    /// server; the outcome comes back through `services.outcomes`.
    fn toggle_bookmark(&mut self, services: &Services) {
        let Some(post) = self.feed.posts.get_mut(self.selected_post) else { return };
        let mut pending = post.clone();
        post.is_bookmarked = !post.is_bookmarked;

        let api = services.api.clone();
        let session = services.session.clone();
        let refresh = services.refresh.clone();
        let outcomes = services.outcomes.clone();
        services.handle.spawn(async move {
            let result = bookmark::toggle_bookmark(&api, &session, &mut pending, &refresh).await;
            let _ = outcomes.send(BookmarkOutcome { post: pending, result });
        });
    }

    fn apply_bookmark(&mut self, outcome: BookmarkOutcome, services: &Services) {
        if let Some(post) = self.feed.posts.iter_mut().find(|p| p.id == outcome.post.id) {
            post.is_bookmarked = outcome.post.is_bookmarked;
        }
        match outcome.result {
            Ok(true) => self.info(format!("Bookmarked {}", outcome.post.company_name)),
            Ok(false) => self.info(format!("Removed bookmark for {}", outcome.post.company_name)),
            Err(e) if e.is_auth_expired() => {
                services.session.expire();
                self.error("Session expired. Log in again with `hasha login`.");
            }
            Err(e) => self.error(e.to_string()),
        }
    }
}

pub fn run_browse(store: FilterStore, api: ApiClient, session: Session) -> Result<()> {
    let handle = Handle::current();
    let refresh = RefreshKey::new();
    let feed = PostFeed::new(Arc::new(api.clone()));
    let feed_rx = feed.subscribe();
    let runner = handle.spawn(feed.run(store.subscribe(), refresh.subscribe()));
    let (outcomes, outcome_rx) = mpsc::unbounded_channel();

    let services = Services { api, session, refresh, handle, outcomes };
    let mut state = AppState::new(store);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, &services, feed_rx, outcome_rx);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    runner.abort();
    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    services: &Services,
    mut feed_rx: watch::Receiver<FeedState>,
    mut outcome_rx: mpsc::UnboundedReceiver<BookmarkOutcome>,
) -> Result<()> {
    let mut post_list = ListState::default();
    let mut filter_list = ListState::default();

    loop {
        if feed_rx.has_changed().unwrap_or(false) {
            let next = feed_rx.borrow_and_update().clone();
            state.apply_feed(next, services);
        }
        while let Ok(outcome) = outcome_rx.try_recv() {
            state.apply_bookmark(outcome, services);
        }

        post_list.select((!state.feed.posts.is_empty()).then_some(state.selected_post));
        filter_list.select(Some(state.selected_row));
        terminal.draw(|frame| draw(frame, state, &mut filter_list, &mut post_list))?;

        if !event::poll(TICK)? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Tab => {
                    state.focus = match state.focus {
                        Focus::Filters => Focus::Posts,
                        Focus::Posts => Focus::Filters,
                    };
                }
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Right | KeyCode::Char('l') => state.next_page(),
                KeyCode::Left | KeyCode::Char('h') => state.prev_page(),
                KeyCode::Enter | KeyCode::Char(' ') => match state.focus {
                    Focus::Filters => state.activate_row(),
                    Focus::Posts => state.toggle_bookmark(services),
                },
                KeyCode::Char('b') => state.toggle_bookmark(services),
                KeyCode::Char('x') => state.reset(),
                KeyCode::Char('c') => state.clear_domains(),
                KeyCode::Char('r') => services.refresh.bump(),
                _ => {}
            }
        }
    }
    Ok(())
}

fn panel(title: String, focused: bool) -> Block<'static> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default().borders(Borders::ALL).border_style(style).title(title)
}

fn draw(frame: &mut Frame, state: &AppState, filter_list: &mut ListState, post_list: &mut ListState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Percentage(40),
        ])
        .split(rows[0]);

    let selection = state.store.selection();

    // Left panel: filters
    let items: Vec<ListItem> = state
        .rows
        .iter()
        .map(|row| {
            let style = if row.changed(selection) {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(row.label(selection), style))
        })
        .collect();
    let filters = List::new(items)
        .block(panel(" Filters ".to_string(), state.focus == Focus::Filters))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(filters, columns[0], filter_list);

    // Middle panel: posts
    let items: Vec<ListItem> = state
        .feed
        .posts
        .iter()
        .map(|post| {
            let star = if post.is_bookmarked { "*" } else { " " };
            ListItem::new(format!(
                "{} {:<12} {} | {}",
                star,
                post.employment_end_date.label(state.today),
                crate::truncate(&post.company_name, 16),
                crate::truncate(&post.position_title, 24)
            ))
        })
        .collect();
    let title = if state.feed.is_loading {
        format!(" Posts ({}) loading... ", state.feed.posts.len())
    } else {
        format!(" Posts ({}) ", state.feed.posts.len())
    };
    let posts = List::new(items)
        .block(panel(title, state.focus == Focus::Posts))
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(posts, columns[1], post_list);

    // Right panel: post detail
    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail, columns[2]);

    // Status line: pagination, the latest notice, then any feed error
    let mut spans = Vec::new();
    if let Some(window) = state.window() {
        spans.push(Span::raw(format!(" {} ", window.render())));
    }
    if let Some(notice) = &state.notice {
        let color = if notice.is_error { Color::Red } else { Color::Green };
        spans.push(Span::styled(format!(" {}", notice.text), Style::default().fg(color)));
    }
    if let Some(error) = &state.feed.error {
        spans.push(Span::styled(format!(" {}", error.message), Style::default().fg(Color::Red)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), rows[1]);

    let help = Paragraph::new(
        " tab:focus  j/k:navigate  enter:toggle  b:bookmark  h/l:page  x:reset  c:clear domains  r:refresh  q:quit",
    )
    .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, rows[2]);
}

fn build_detail(state: &AppState) -> Text<'_> {
    let Some(post) = state.current_post() else {
        let text = if state.feed.is_loading {
            "Loading..."
        } else {
            "No postings match these filters"
        };
        return Text::raw(text);
    };

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        post.position_title.as_str(),
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", post.company_name)));
    lines.push(Line::from(""));

    let deadline_style = match post.employment_end_date.days_left(state.today) {
        Some(days) if days < 0 => Style::default().fg(Color::DarkGray),
        Some(days) if days <= 7 => Style::default().fg(Color::Red),
        Some(_) => Style::default().fg(Color::Yellow),
        None => Style::default().fg(Color::Green),
    };
    lines.push(Line::from(vec![
        Span::raw("Deadline: "),
        Span::styled(post.employment_end_date.label(state.today), deadline_style),
    ]));
    lines.push(Line::from(format!("Role: {}", taxonomy::position_label(&post.position_type))));
    let domain = taxonomy::domain_label(&DomainCode::new(post.domain.as_str()))
        .unwrap_or(post.domain.as_str());
    lines.push(Line::from(format!("Domain: {}", domain)));
    if post.head_count > 0 {
        lines.push(Line::from(format!("Openings: {}", post.head_count)));
    }
    if post.is_bookmarked {
        lines.push(Line::from(Span::styled("Bookmarked", Style::default().fg(Color::Cyan))));
    }

    if !post.slogan.is_empty() {
        lines.push(Line::from(""));
        for line in textwrap::fill(&post.slogan, 60).lines() {
            lines.push(Line::from(line.to_string()));
        }
    }

    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::config::Config;
    use crate::feed::FeedError;
    use crate::storage::{MemoryLocation, MemoryStore};
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use url::Url;

    fn labels(selection: &FilterSelection) -> Vec<String> {
        filter_rows().iter().map(|row| row.label(selection)).collect()
    }

    fn empty_state() -> AppState {
        AppState::new(FilterStore::load(
            Arc::new(MemoryLocation::new("")),
            Arc::new(MemoryStore::new()),
        ))
    }

    fn services(session: Session) -> Services {
        let config = Config {
            api_url: Url::parse("http://localhost:1/").unwrap(),
            timeout: Duration::from_secs(1),
            data_dir: std::env::temp_dir(),
        };
        let (outcomes, _) = mpsc::unbounded_channel();
        Services {
            api: ApiClient::new(&config, session.clone()).unwrap(),
            session,
            refresh: RefreshKey::new(),
            handle: Handle::current(),
            outcomes,
        }
    }

    fn expired_feed() -> FeedState {
        FeedState {
            error: Some(FeedError::from(&ApiError::Unauthorized)),
            ..FeedState::default()
        }
    }

    #[test]
    fn test_status_line_keeps_feed_error_beside_notice() {
        let mut state = empty_state();
        state.info("Filters reset");
        state.feed.error = Some(FeedError {
            kind: FeedErrorKind::Request,
            message: "Failed to load posts: boom".into(),
        });

        let mut terminal = Terminal::new(TestBackend::new(200, 20)).unwrap();
        let mut filter_list = ListState::default();
        let mut post_list = ListState::default();
        terminal
            .draw(|frame| draw(frame, &state, &mut filter_list, &mut post_list))
            .unwrap();

        let screen: String = terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect();
        assert!(screen.contains("Filters reset"));
        assert!(screen.contains("Failed to load posts: boom"));
    }

    #[tokio::test]
    async fn test_expired_feed_clears_credential_once() {
        let session = Session::new(Arc::new(MemoryStore::new()));
        session.store("jwt").unwrap();
        let services = services(session.clone());
        let mut state = empty_state();

        state.apply_feed(expired_feed(), &services);
        assert!(!session.is_authenticated());
        assert_eq!(services.refresh.current(), 1);
        assert!(state.notice.as_ref().is_some_and(|n| n.is_error));

        // the anonymous re-fetch failing the same way must not loop
        session.store("jwt").unwrap();
        state.apply_feed(expired_feed(), &services);
        assert!(session.is_authenticated());
        assert_eq!(services.refresh.current(), 1);

        // a successful load re-arms the guard
        state.apply_feed(FeedState::default(), &services);
        state.apply_feed(expired_feed(), &services);
        assert!(!session.is_authenticated());
        assert_eq!(services.refresh.current(), 2);
    }

    #[test]
    fn test_rows_cover_every_role_and_domain() {
        let rows = filter_rows();
        let roles = rows
            .iter()
            .filter(|r| matches!(r, FilterRow::Role(_)))
            .count();
        let domains = rows
            .iter()
            .filter(|r| matches!(r, FilterRow::Domain(_)))
            .count();
        // only the development category lists its roles individually
        assert_eq!(roles, 5);
        assert_eq!(domains, DOMAINS.len());
        assert!(matches!(rows.last(), Some(FilterRow::Reset)));
    }

    #[test]
    fn test_category_mark_reflects_partial_selection() {
        let mut selection = FilterSelection::default();
        assert!(labels(&selection).contains(&"[ ] 개발".to_string()));

        selection.roles.push(RoleCode::new("FRONT"));
        let shown = labels(&selection);
        assert!(shown.contains(&"[-] 개발".to_string()));
        assert!(shown.contains(&"    [x] 프론트엔드 개발".to_string()));

        selection.roles = taxonomy::category("dev").unwrap().codes().collect();
        assert!(labels(&selection).contains(&"[x] 개발".to_string()));
    }

    #[test]
    fn test_changed_rows_follow_selection_flags() {
        let selection = FilterSelection {
            sort_order: SortOrder::DeadlineSoon,
            ..FilterSelection::default()
        };
        let rows = filter_rows();
        let changed: Vec<bool> = rows.iter().map(|r| r.changed(&selection)).collect();
        let sort_index = rows
            .iter()
            .position(|r| matches!(r, FilterRow::Sort))
            .unwrap();
        assert!(changed[sort_index]);
        assert_eq!(changed.iter().filter(|c| **c).count(), 1);
    }
}
