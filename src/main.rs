use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use postboard::api::{ApiClient, ApiError};
use postboard::auth::{AuthError, AuthMachine};
use postboard::config::{ClientConfig, ConfigError};
use postboard::oauth::{OAuthError, OAuthRedirect};
use postboard::posts::{PostError, PostStore};
use postboard::store::{FileStore, SessionStore};
use postboard::types::{LoginRequest, PostDraft, Provider, RegisterRequest};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Post(#[from] PostError),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "postboard", about = "Postboard session and feed CLI")]
struct Cli {
    /// Backend origin; overrides `POSTBOARD_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Session file; overrides `POSTBOARD_STORE_PATH`.
    #[arg(long)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account. Does not log in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        username: String,
        #[arg(long, env = "POSTBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Log in with username and password.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "POSTBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session. Local state is cleared even if the server is unreachable.
    Logout,
    /// Ask the server who the stored session belongs to.
    Whoami,
    /// Print the session as rehydrated from the store, without contacting the server.
    Status,
    /// Print the URL that starts an OAuth login.
    OauthUrl { provider: String },
    /// Complete an OAuth login from the redirect URL the browser landed on.
    OauthCallback { url: String },
    Posts(PostsCommand),
}

#[derive(Args, Debug)]
struct PostsCommand {
    #[command(subcommand)]
    command: PostsSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostsSubcommand {
    List,
    Create(DraftArgs),
    Update {
        id: String,
        #[command(flatten)]
        draft: DraftArgs,
    },
    Delete {
        id: String,
    },
}

#[derive(Args, Debug)]
struct DraftArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
    #[arg(long)]
    image: Option<String>,
}

impl From<DraftArgs> for PostDraft {
    fn from(args: DraftArgs) -> Self {
        Self { title: args.title, content: args.content, image: args.image }
    }
}

struct Context {
    config: ClientConfig,
    auth: AuthMachine,
    posts: PostStore,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(path) = cli.store_path {
        config = config.with_store_path(path);
    }

    let store: Arc<dyn SessionStore> = Arc::new(FileStore::new(&config.store_path));
    let gateway = Arc::new(ApiClient::new(&config, store.clone())?);
    let ctx = Context {
        auth: AuthMachine::new(store, gateway.clone()),
        posts: PostStore::new(gateway),
        config,
    };

    run(&ctx, cli.command).await
}

async fn run(ctx: &Context, command: Command) -> Result<(), CliError> {
    match command {
        Command::Register { name, username, password } => {
            let message = ctx
                .auth
                .register(&RegisterRequest { name, username, password })
                .await?;
            print_json(&serde_json::json!({
                "message": message.unwrap_or_else(|| "Registration successful! Please login with your credentials.".to_owned()),
            }))
        }
        Command::Login { username, password } => {
            let user = ctx.auth.login(&LoginRequest { username, password }).await?;
            print_json(&user)
        }
        Command::Logout => {
            ctx.auth.logout().await;
            print_json(&ctx.auth.snapshot())
        }
        Command::Whoami => {
            let user = ctx.auth.fetch_current_user().await?;
            print_json(&user)
        }
        Command::Status => print_json(&ctx.auth.snapshot()),
        Command::OauthUrl { provider } => {
            let url = ctx
                .auth
                .begin_oauth(Provider::from(provider.as_str()), &ctx.config.api_base_url)?;
            println!("{url}");
            Ok(())
        }
        Command::OauthCallback { url } => {
            let landing = OAuthRedirect::from_url(&url)?.complete(&ctx.auth)?;
            tracing::debug!(path = landing.path, "oauth landing complete");
            print_json(&ctx.auth.snapshot())
        }
        Command::Posts(posts) => run_posts(ctx, posts).await,
    }
}

async fn run_posts(ctx: &Context, posts: PostsCommand) -> Result<(), CliError> {
    match posts.command {
        PostsSubcommand::List => print_json(&ctx.posts.load_all().await?),
        PostsSubcommand::Create(draft) => print_json(&ctx.posts.create(draft.into()).await?),
        PostsSubcommand::Update { id, draft } => print_json(&ctx.posts.update(&id, draft.into()).await?),
        PostsSubcommand::Delete { id } => {
            ctx.posts.delete(&id).await?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
