use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use lib::auth::AuthController;
use lib::conversation::{Conversation, ReplyMeta};
use lib::credentials::{credential_path, CredentialStore};
use lib::directory::{time_ago, SessionDirectory};

#[derive(Parser)]
#[command(name = "pustaka")]
#[command(about = "Pustaka CLI — library assistant chat", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: PUSTAKA_CONFIG_PATH or ~/.pustaka/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Log in and store the session token.
    Login {
        /// Email address (prompted when omitted).
        #[arg(long)]
        email: Option<String>,

        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Register a new account (logs in on success).
    Register {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Forget the stored session token.
    Logout {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show the signed-in user.
    Whoami {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Update display name and email.
    Profile {
        /// New display name (prompted when omitted).
        #[arg(long)]
        name: Option<String>,

        /// New email address (prompted when omitted).
        #[arg(long)]
        email: Option<String>,

        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Change the account password.
    Password {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List saved conversations.
    Sessions {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the library assistant (interactive).
    Chat {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Optional existing session id to continue.
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("pustaka {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Login { email, config }) => run_login(email, config).await,
        Some(Commands::Register { config }) => run_register(config).await,
        Some(Commands::Logout { config }) => run_logout(config),
        Some(Commands::Whoami { config }) => run_whoami(config).await,
        Some(Commands::Profile {
            name,
            email,
            config,
        }) => run_profile(name, email, config).await,
        Some(Commands::Password { config }) => run_password(config).await,
        Some(Commands::Sessions { config }) => run_sessions(config).await,
        Some(Commands::Chat { config, session }) => run_chat(config, session).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Wired-up core: auth controller, session directory, and conversation over
/// one shared credential store and API client.
struct App {
    auth: AuthController,
    directory: Arc<SessionDirectory>,
    conversation: Conversation,
}

/// Load config, open the credential store, and resolve any stored identity.
/// The returned app is never in a "token present but identity unknown" state.
async fn bootstrap(config_path: Option<PathBuf>) -> anyhow::Result<App> {
    let (config, path) = lib::config::load_config(config_path)?;
    let credentials = Arc::new(CredentialStore::open(credential_path(&path)));
    let api = lib::api::ApiClient::new(lib::config::resolve_api_url(&config), credentials.clone());
    let auth = AuthController::new(api.clone(), credentials.clone());
    auth.initialize().await;
    let directory = Arc::new(SessionDirectory::new(api.clone(), credentials.clone()));
    let conversation = Conversation::new(api, directory.clone(), credentials, config.chat.clone());
    Ok(App {
        auth,
        directory,
        conversation,
    })
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::config::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_login(email: Option<String>, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    let email = match email {
        Some(e) => e,
        None => dialoguer::Input::new().with_prompt("Email").interact_text()?,
    };
    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .interact()?;
    app.auth.login(&email, &password).await?;
    if let Some(user) = app.auth.current_user() {
        println!("logged in as {} <{}>", user.full_name, user.email);
    }
    Ok(())
}

async fn run_register(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    let full_name: String = dialoguer::Input::new()
        .with_prompt("Full name")
        .interact_text()?;
    let email: String = dialoguer::Input::new().with_prompt("Email").interact_text()?;
    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "passwords do not match")
        .interact()?;
    app.auth.register(&full_name, &email, &password).await?;
    println!("registered and logged in as {}", email);
    Ok(())
}

fn run_logout(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    // Pure local operation: no identity resolution, no network.
    let (_config, path) = lib::config::load_config(config_path)?;
    let credentials = CredentialStore::open(credential_path(&path));
    credentials.clear();
    println!("logged out");
    Ok(())
}

async fn run_whoami(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    match app.auth.current_user() {
        Some(user) => println!("{} <{}> (id {})", user.full_name, user.email, user.id),
        None => println!("not logged in"),
    }
    Ok(())
}

async fn run_profile(
    name: Option<String>,
    email: Option<String>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    let Some(user) = app.auth.current_user() else {
        anyhow::bail!("not logged in; run `pustaka login` first");
    };
    let name = match name {
        Some(n) => n,
        None => dialoguer::Input::new()
            .with_prompt("Full name")
            .with_initial_text(user.full_name.clone())
            .interact_text()?,
    };
    let email = match email {
        Some(e) => e,
        None => dialoguer::Input::new()
            .with_prompt("Email")
            .with_initial_text(user.email.clone())
            .interact_text()?,
    };
    app.auth.update_profile(&name, &email).await?;
    println!("profile updated");
    Ok(())
}

async fn run_password(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    if app.auth.current_user().is_none() {
        anyhow::bail!("not logged in; run `pustaka login` first");
    }
    let current = dialoguer::Password::new()
        .with_prompt("Current password")
        .interact()?;
    // New password confirmation is checked here, before the library call.
    let new = dialoguer::Password::new()
        .with_prompt("New password")
        .with_confirmation("Confirm new password", "passwords do not match")
        .interact()?;
    app.auth.update_password(&current, &new).await?;
    println!("password updated");
    Ok(())
}

async fn run_sessions(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let app = bootstrap(config_path).await?;
    if app.auth.current_user().is_none() {
        anyhow::bail!("not logged in; run `pustaka login` first");
    }
    app.directory.refresh().await?;
    let sessions = app.directory.sessions();
    if sessions.is_empty() {
        println!("no saved conversations");
        return Ok(());
    }
    let now = chrono::Utc::now();
    for s in sessions {
        let title = if s.title.is_empty() {
            "(untitled)"
        } else {
            s.title.as_str()
        };
        println!(
            "{}  {}  — {} ({} messages)",
            s.id,
            title,
            time_ago(&s.updated_at, now),
            s.message_count
        );
    }
    Ok(())
}

async fn run_chat(config_path: Option<PathBuf>, session: Option<String>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let app = bootstrap(config_path).await?;
    if let Some(user) = app.auth.current_user() {
        println!("chatting as {} (conversations are saved)", user.full_name);
    } else {
        println!("chatting anonymously (conversation will not be saved)");
    }
    if let Some(id) = session {
        app.conversation.select_conversation(&id).await?;
        render_thread(&app.conversation.thread());
    }
    println!("type /exit to quit, /new for a fresh conversation, /sessions to list, /open <id> to switch");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/new") {
            app.conversation.new_conversation();
            println!("(new conversation)");
            continue;
        }
        if input.eq_ignore_ascii_case("/sessions") {
            if let Err(e) = app.directory.refresh().await {
                eprintln!("could not list sessions: {}", e);
                continue;
            }
            for s in app.directory.sessions() {
                println!("  {}  {}", s.id, s.title);
            }
            continue;
        }
        if let Some(id) = input.strip_prefix("/open ") {
            match app.conversation.select_conversation(id.trim()).await {
                Ok(()) => render_thread(&app.conversation.thread()),
                Err(e) => eprintln!("could not open session: {}", e),
            }
            continue;
        }

        app.conversation.send_message(input).await;
        if let Some(reply) = app.conversation.thread().messages.last() {
            print_message(reply);
        }
    }

    Ok(())
}

fn render_thread(thread: &lib::conversation::Thread) {
    for m in &thread.messages {
        if m.from_bot {
            print_message(m);
        } else {
            println!("> {}", m.text);
        }
    }
}

fn print_message(m: &lib::conversation::Message) {
    println!("< {}", m.text.trim());
    if let Some(meta) = &m.meta {
        println!("  [{}]", meta_line(meta));
    }
}

fn meta_line(meta: &ReplyMeta) -> String {
    let mut parts = Vec::new();
    match (&meta.source, meta.score) {
        (Some(source), Some(score)) => parts.push(format!("sumber: {} ({:.2})", source, score)),
        (Some(source), None) => parts.push(format!("sumber: {}", source)),
        (None, Some(score)) => parts.push(format!("skor: {:.2}", score)),
        (None, None) => {}
    }
    match (&meta.intent, meta.confidence) {
        (Some(intent), Some(pct)) => parts.push(format!("intent: {} ({:.0}%)", intent, pct)),
        (Some(intent), None) => parts.push(format!("intent: {}", intent)),
        (None, Some(pct)) => parts.push(format!("intent: {:.0}%", pct)),
        (None, None) => {}
    }
    parts.join(" | ")
}
