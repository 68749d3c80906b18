mod api;
mod bookmark;
mod config;
mod feed;
mod filter;
mod models;
mod pagination;
mod profile;
mod query;
mod session;
mod storage;
mod taxonomy;
mod tui;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use api::{ApiClient, ApiError};
use bookmark::BookmarkError;
use config::Config;
use feed::RefreshKey;
use filter::{ActiveOnly, FilterSelection, FilterStore, SortOrder};
use models::Post;
use pagination::PageWindow;
use profile::{ProfileDraft, SignupForm};
use session::Session;
use storage::{FileLocation, FileStore, KeyValueStore, Location};
use taxonomy::{DomainCode, RoleCode};

#[derive(Parser)]
#[command(name = "hasha")]
#[command(about = "Internship listings - filter, bookmark, and keep your applicant profile")]
struct Cli {
    /// API base URL (overrides HASHA_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List postings for the current filters and page
    Posts {
        /// Open a shared filter link (a URL or its query string) first
        #[arg(long)]
        open: Option<String>,
    },

    /// Change or show the filter selection
    Filter {
        #[command(subcommand)]
        command: FilterCommands,
    },

    /// Go to a page: a page number, `next` or `prev`
    Page {
        target: String,
    },

    /// Print the shareable query string for the current filters
    Link,

    /// Toggle the bookmark on a posting from the current page
    Bookmark {
        /// Posting ID
        post_id: String,
    },

    /// Remove a bookmark by posting ID
    Unbookmark {
        /// Posting ID
        post_id: String,
    },

    /// List bookmarked postings
    Bookmarks,

    /// Log in and keep the credential for later commands
    Login {
        /// Full school email address
        #[arg(short, long)]
        email: String,

        /// Password (prompted when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Log out and forget the stored credential
    Logout,

    /// Create an applicant account
    Signup {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Part of the school email before the @
        #[arg(short, long)]
        email: String,

        /// Password (prompted twice when omitted)
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Show the logged-in user
    Me,

    /// Show or edit the applicant profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Interactive browser
    Browse,
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Show the current selection
    Show,

    /// Toggle one role (e.g. FRONT, BACKEND, DESIGN)
    Role {
        code: String,
    },

    /// Select or clear every role in a category (dev, planning, design, marketing)
    Category {
        key: String,
    },

    /// Toggle one business domain (e.g. FINTECH, B2B)
    Domain {
        code: String,
    },

    /// Select every domain, or clear them when all are selected
    AllDomains,

    /// Clear the domain selection
    ClearDomains,

    /// Posting status filter
    Status {
        #[arg(value_enum)]
        value: StatusArg,
    },

    /// Sort order
    Sort {
        #[arg(value_enum)]
        value: SortArg,
    },

    /// Reset domains, status and sort
    Reset,
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the applicant profile
    Show,

    /// Create or replace the applicant profile
    Set {
        /// Enrollment year (two or four digits)
        #[arg(short, long)]
        year: String,

        /// Department; repeat for a double major
        #[arg(short, long = "department", required = true)]
        departments: Vec<String>,

        /// Storage key of the uploaded CV (a PDF)
        #[arg(short, long)]
        cv: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Any,
    Open,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Recent,
    Deadline,
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Maps credential failures to user-facing errors, clearing a credential the
/// server rejected.
fn check_auth<T>(session: &Session, result: Result<T, ApiError>) -> Result<T> {
    match result {
        Err(ApiError::Unauthorized) => {
            session.expire();
            Err(anyhow!("Session expired. Log in again with `hasha login`."))
        }
        Err(ApiError::NoToken) => Err(anyhow!("Not logged in. Run `hasha login` first.")),
        other => Ok(other?),
    }
}

/// Codes already in the selection (for instance from a shared link) can
/// always be toggled off, even when the taxonomy does not know them.
fn resolve_role(selection: &FilterSelection, typed: &str) -> Result<RoleCode> {
    if let Some(code) = selection
        .roles
        .iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(typed))
    {
        return Ok(code.clone());
    }
    let code = RoleCode::new(typed.to_ascii_uppercase());
    if !code.is_known() {
        bail!("Unknown role '{}'", code);
    }
    Ok(code)
}

fn resolve_domain(selection: &FilterSelection, typed: &str) -> Result<DomainCode> {
    if let Some(code) = selection
        .domains
        .iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(typed))
    {
        return Ok(code.clone());
    }
    let code = DomainCode::new(typed.to_ascii_uppercase());
    if !code.is_known() {
        bail!("Unknown domain '{}'", code);
    }
    Ok(code)
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}: ", label);
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Accepts either a bare query string or a full link and returns the query.
fn shared_query(link: &str) -> &str {
    match link.split_once('?') {
        Some((_, query)) => query,
        None => link,
    }
}

fn print_posts(posts: &[Post], today: NaiveDate) {
    if posts.is_empty() {
        println!("No postings found.");
        return;
    }
    println!(
        "{:<8} {:<12} {:<18} {:<28} {:<14} {}",
        "ID", "DEADLINE", "COMPANY", "TITLE", "ROLE", "SAVED"
    );
    println!("{}", "-".repeat(88));
    for post in posts {
        println!(
            "{:<8} {:<12} {:<18} {:<28} {:<14} {}",
            truncate(&post.id, 8),
            post.employment_end_date.label(today),
            truncate(&post.company_name, 16),
            truncate(&post.position_title, 26),
            truncate(&taxonomy::position_label(&post.position_type), 12),
            if post.is_bookmarked { "*" } else { "" }
        );
    }
}

fn print_filters(selection: &FilterSelection) {
    let changed = |flag: bool| if flag { " (changed)" } else { "" };

    let roles = if selection.roles.is_empty() {
        "all".to_string()
    } else {
        selection
            .roles
            .iter()
            .map(|r| taxonomy::role_label(r).unwrap_or(r.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let domains = if selection.domains.is_empty() {
        "all".to_string()
    } else {
        selection
            .domains
            .iter()
            .map(|d| taxonomy::domain_label(d).unwrap_or(d.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("Roles:   {}{}", roles, changed(selection.roles_changed()));
    println!("Domains: {}{}", domains, changed(selection.domains_changed()));
    println!("Status:  {}{}", selection.active_only.label(), changed(selection.status_changed()));
    println!("Sort:    {}{}", selection.sort_order.label(), changed(selection.sort_changed()));
    println!("Page:    {}", selection.page + 1);
}

async fn list_page(api: &ApiClient, session: &Session, selection: &FilterSelection) -> Result<()> {
    let page = check_auth(session, api.fetch_posts(selection).await)?;
    print_posts(&page.posts, chrono::Local::now().date_naive());
    if let Some(window) = PageWindow::new(selection.page, page.paginator.last_page) {
        println!("\n{}", window.render());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // the browser owns the terminal, so it stays quiet unless RUST_LOG asks otherwise
    init_logging(if matches!(cli.command, Commands::Browse) { "off" } else { "warn" });

    let config = Config::load(cli.api_url.as_deref())?;
    let file_store = FileStore::open(config.storage_path())?;
    tracing::debug!(path = %file_store.path().display(), "using local storage");
    let storage: Arc<dyn KeyValueStore> = Arc::new(file_store);
    let location: Arc<dyn Location> = Arc::new(FileLocation::open(config.location_path())?);
    let session = Session::new(storage.clone());
    let api = ApiClient::new(&config, session.clone())?;

    match cli.command {
        Commands::Posts { open } => {
            if let Some(link) = open {
                location.replace_query(shared_query(&link))?;
            }
            let store = FilterStore::load(location, storage);
            list_page(&api, &session, store.selection()).await?;
        }

        Commands::Filter { command } => {
            let mut store = FilterStore::load(location, storage);
            match command {
                FilterCommands::Show => {}

                FilterCommands::Role { code } => {
                    let code = resolve_role(store.selection(), &code)?;
                    store.toggle_role(code);
                }

                FilterCommands::Category { key } => {
                    let category = taxonomy::category(&key)
                        .ok_or_else(|| anyhow!("Unknown role category '{}'", key))?;
                    store.toggle_category_all(category);
                }

                FilterCommands::Domain { code } => {
                    let code = resolve_domain(store.selection(), &code)?;
                    store.toggle_domain(code);
                }

                FilterCommands::AllDomains => store.toggle_all_domains(),

                FilterCommands::ClearDomains => {
                    if !store.clear_domains() {
                        println!("No domain filter to clear.");
                    }
                }

                FilterCommands::Status { value } => store.set_active_only(match value {
                    StatusArg::Any => ActiveOnly::Unset,
                    StatusArg::Open => ActiveOnly::True,
                }),

                FilterCommands::Sort { value } => store.set_sort_order(match value {
                    SortArg::Recent => SortOrder::Recent,
                    SortArg::Deadline => SortOrder::DeadlineSoon,
                }),

                FilterCommands::Reset => {
                    if !store.reset_all() {
                        println!("Filters are already at their defaults.");
                    }
                }
            }
            print_filters(store.selection());
        }

        Commands::Page { target } => {
            let mut store = FilterStore::load(location, storage);
            let current = store.selection().page;
            let last_page = check_auth(&session, api.fetch_posts(store.selection()).await)?
                .paginator
                .last_page;
            let window = PageWindow::new(current, last_page);

            let page = match target.as_str() {
                "next" => window
                    .and_then(|w| w.next())
                    .ok_or_else(|| anyhow!("Already on the last page"))?,
                "prev" => window
                    .and_then(|w| w.prev())
                    .ok_or_else(|| anyhow!("Already on the first page"))?,
                number => {
                    let n: u32 = number
                        .parse()
                        .with_context(|| format!("Expected a page number, `next` or `prev`, got '{}'", number))?;
                    if n == 0 || n > last_page.max(1) {
                        bail!("Page {} is out of range (1-{})", n, last_page.max(1));
                    }
                    n - 1
                }
            };
            store.set_page(page);
            list_page(&api, &session, store.selection()).await?;
        }

        Commands::Link => {
            let store = FilterStore::load(location, storage);
            println!("?{}", store.selection().to_query());
        }

        Commands::Bookmark { post_id } => {
            let store = FilterStore::load(location, storage);
            let page = check_auth(&session, api.fetch_posts(store.selection()).await)?;
            let mut post = page
                .posts
                .into_iter()
                .find(|p| p.id == post_id)
                .ok_or_else(|| {
                    anyhow!("Posting {} is not on the current page; use `hasha unbookmark` to remove a saved one", post_id)
                })?;

            let refresh = RefreshKey::new();
            match bookmark::toggle_bookmark(&api, &session, &mut post, &refresh).await {
                Ok(true) => println!("Bookmarked {} ({}).", post.company_name, post.position_title),
                Ok(false) => println!("Removed bookmark for {} ({}).", post.company_name, post.position_title),
                Err(BookmarkError::LoginRequired) => bail!("Log in to bookmark postings: `hasha login`"),
                Err(e) if e.is_auth_expired() => {
                    session.expire();
                    bail!("Session expired. Log in again with `hasha login`.");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Commands::Unbookmark { post_id } => {
            check_auth(&session, api.unbookmark(&post_id).await)?;
            println!("Removed bookmark for posting {}.", post_id);
        }

        Commands::Bookmarks => {
            let posts = check_auth(&session, api.bookmarks().await)?;
            print_posts(&posts, chrono::Local::now().date_naive());
        }

        Commands::Login { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt("Password")?,
            };
            let token = api.login(&email, &password).await?;
            session.store(&token)?;
            println!("Logged in as {}.", email);
        }

        Commands::Logout => {
            if !session.is_authenticated() {
                println!("Not logged in.");
            } else {
                if let Err(e) = api.logout().await {
                    tracing::warn!("server logout failed, clearing local credential anyway: {e}");
                }
                session.clear()?;
                println!("Logged out.");
            }
        }

        Commands::Signup { name, email, password } => {
            let (password, confirm) = match password {
                Some(p) => (p.clone(), p),
                None => (prompt("Password")?, prompt("Confirm password")?),
            };
            let form = SignupForm {
                name,
                email_local: email,
                password,
                confirm,
            };
            let request = form.validate()?;
            let token = api.signup(&request).await?;
            session.store(&token)?;
            println!("Account created for {}.", request.info.email);
        }

        Commands::Me => {
            let user = check_auth(&session, api.me().await)?;
            println!("Name:  {}", user.name.as_deref().unwrap_or("-"));
            println!("Email: {}", user.email.as_deref().unwrap_or("-"));
        }

        Commands::Profile { command } => match command {
            ProfileCommands::Show => match check_auth(&session, api.profile().await)? {
                Some(profile) => {
                    if let Some(name) = &profile.name {
                        println!("Name:        {}", name);
                    }
                    if let Some(email) = &profile.email {
                        println!("Email:       {}", email);
                    }
                    println!("Enrolled:    {}", profile.enroll_year);
                    println!("Departments: {}", profile.departments().join(", "));
                    println!("CV:          {}", profile.cv_key.as_deref().unwrap_or("-"));
                }
                None => {
                    println!("No profile yet. Create one with `hasha profile set`.");
                }
            },

            ProfileCommands::Set { year, departments, cv } => {
                let draft = ProfileDraft {
                    enroll_year: year,
                    departments,
                    cv_key: cv,
                };
                let update = draft.validate_now()?;
                check_auth(&session, api.save_profile(&update).await)?;
                println!("Profile saved.");
            }
        },

        Commands::Browse => {
            let store = FilterStore::load(location, storage);
            tokio::task::block_in_place(|| tui::run_browse(store, api, session))?;
        }
    }

    Ok(())
}

/// Shortens `s` to at most `max` characters.
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::{MemoryLocation, MemoryStore};

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("Waffle", 10), "Waffle");
        assert_eq!(truncate("와플스튜디오 인턴십", 6), "와플스...");
    }

    #[test]
    fn test_shared_query_accepts_links() {
        assert_eq!(
            shared_query("https://example.com/?positionTypes=APP&page=1"),
            "positionTypes=APP&page=1"
        );
        assert_eq!(shared_query("order=1"), "order=1");
    }

    #[test]
    fn test_selected_unknown_codes_can_be_toggled_off() {
        let mut store = FilterStore::load(
            Arc::new(MemoryLocation::new("positionTypes=CHEF&domains=SPACE")),
            Arc::new(MemoryStore::new()),
        );

        let role = resolve_role(store.selection(), "chef").unwrap();
        store.toggle_role(role);
        assert!(store.selection().roles.is_empty());

        let domain = resolve_domain(store.selection(), "SPACE").unwrap();
        store.toggle_domain(domain);
        assert!(store.selection().domains.is_empty());

        assert!(resolve_role(store.selection(), "chef").is_err());
        assert!(resolve_domain(store.selection(), "space").is_err());
        assert_eq!(resolve_role(store.selection(), "front").unwrap(), RoleCode::new("FRONT"));
    }

    #[test]
    fn test_check_auth_expires_rejected_credential() {
        let session = Session::new(Arc::new(MemoryStore::new()));
        session.store("jwt").unwrap();

        assert_eq!(check_auth(&session, Ok::<_, ApiError>(7)).unwrap(), 7);
        assert!(session.is_authenticated());

        let err = check_auth::<()>(&session, Err(ApiError::Unauthorized)).unwrap_err();
        assert!(err.to_string().contains("Session expired"));
        assert!(!session.is_authenticated());

        let err = check_auth::<()>(&session, Err(ApiError::NoToken)).unwrap_err();
        assert!(err.to_string().contains("Not logged in"));
    }

    #[test]
    fn test_cli_parses_filter_commands() {
        let cli = Cli::try_parse_from(["hasha", "--api-url", "http://localhost:1", "filter", "sort", "deadline"])
            .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://localhost:1"));
        assert!(matches!(
            cli.command,
            Commands::Filter { command: FilterCommands::Sort { value: SortArg::Deadline } }
        ));

        assert!(Cli::try_parse_from(["hasha", "filter", "status", "closed"]).is_err());
    }
}
