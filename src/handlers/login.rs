use crate::chrome::{BrowserSessionManager, PageClient, SessionStore};
use crate::output::text;
use crate::{Config, Result, utils};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginCommand {
    /// Load the stored session into the browser and reload.
    Login,
    /// Persist the browser's current session and exit.
    Save,
    Finish,
}

impl LoginCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "login" => Some(Self::Login),
            "save" => Some(Self::Save),
            "finish" => Some(Self::Finish),
            _ => None,
        }
    }
}

const GUIDE: &[(&str, &str)] = &[
    ("login", "apply the stored session cookies and reload"),
    ("save", "save the current session cookies and exit"),
    ("finish", "exit without saving"),
];

fn print_guide() {
    for (command, help) in GUIDE {
        println!("{}", text::bullet(&format!("{:<8} {}", command, help)));
    }
}

fn prompt() {
    print!(">> ");
    std::io::stdout().flush().ok();
}

/// Opens a visible browser so the user can sign in by hand, then stores the
/// resulting session for later harvests.
pub async fn handle_login(config: Arc<Config>) -> Result<()> {
    let mut visible = (*config).clone();
    visible.browser.headless = false;
    let config = Arc::new(visible);

    let sessions = SessionStore::new(config.storage.cookie_dir());
    utils::ensure_dirs(&[sessions.dir().to_path_buf()])?;

    let manager = BrowserSessionManager::launch(config.clone()).await?;
    let outcome = run_prompt(&manager, &sessions, &config).await;

    if let Err(e) = manager.close().await {
        tracing::warn!("{}", e);
    }
    outcome
}

async fn run_prompt(
    manager: &BrowserSessionManager,
    sessions: &SessionStore,
    config: &Config,
) -> Result<()> {
    let listing = manager.listing();
    let base_url = &config.collection.base_url;
    listing.navigate(base_url).await?;

    println!("{}", text::info("Sign in within the browser window, then enter a command"));
    print_guide();
    prompt();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match LoginCommand::parse(&line) {
            Some(LoginCommand::Login) => {
                let cookies = sessions.load()?;
                listing.set_cookies(&cookies).await?;
                listing.navigate(base_url).await?;
                let applied = text::count(cookies.len(), "cookie");
                println!("{}", text::success(&format!("Applied {}", applied)));
            }
            Some(LoginCommand::Save) => {
                listing.navigate(base_url).await?;
                let cookies = listing.cookies().await?;
                let written = sessions.save(&cookies)?;
                println!(
                    "{}",
                    text::success(&format!(
                        "Saved {} to {}",
                        text::count(written, "cookie"),
                        sessions.dir().display()
                    ))
                );
                return Ok(());
            }
            Some(LoginCommand::Finish) => return Ok(()),
            None => print_guide(),
        }
        prompt();
    }

    Ok(())
}
