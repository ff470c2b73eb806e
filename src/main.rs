mod activity;
mod app;
mod auth;
mod cli;
mod config;
mod envelope;
mod error;
mod http;
mod manager;
mod models;
mod session;

use anyhow::Result;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mess", about = "Terminal client for the mess management API")]
pub struct Args {
    #[arg(short = 'c', long, help = "Run one command and exit (e.g. \"list\")")]
    pub command: Option<String>,

    #[arg(long, env = "MESS_API_URL", help = "API base URL")]
    pub base_url: Option<String>,

    #[arg(long, value_name = "MS", help = "Request timeout in milliseconds")]
    pub timeout_ms: Option<u64>,

    #[arg(long, env = "MESS_STORAGE", help = "Session storage file")]
    pub storage: Option<PathBuf>,

    #[arg(
        long,
        value_name = "POLICY",
        help = "After registering: autoLogin or manualLogin"
    )]
    pub register_policy: Option<String>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Print the effective configuration and exit")]
    pub show_config: bool,

    #[arg(long, help = "Answer yes to delete confirmations")]
    pub yes: bool,

    #[arg(long, help = "Keep the session token in memory only")]
    pub no_persist: bool,

    #[arg(long, help = "Do not write an activity log")]
    pub no_log: bool,

    #[arg(long, help = "Verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Debug output (print HTTP details and settings)")]
    pub debug: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: {:#}; using defaults", e);
            config::Config::default()
        })
    };

    // CLI overrides
    if let Some(base_url) = &args.base_url {
        cfg.api.base_url = base_url.clone();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        cfg.api.timeout_ms = timeout_ms;
    }
    if let Some(storage) = &args.storage {
        cfg.session.storage_path = storage.clone();
    }
    if let Some(policy_str) = &args.register_policy {
        if let Some(policy) = auth::RegisterPolicy::from_str(policy_str) {
            cfg.auth.register_policy = policy;
        } else {
            return Err(anyhow::anyhow!(
                "Invalid register policy: {}. Use: autoLogin, manualLogin",
                policy_str
            ));
        }
    }
    if args.no_log {
        cfg.log.enabled = false;
    }

    if let Err(errors) = cfg.validate() {
        let lines: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(anyhow::anyhow!("Invalid configuration:\n  {}", lines.join("\n  ")));
    }

    if args.show_config {
        print!("{}", cfg.to_toml()?);
        return Ok(());
    }

    if args.debug {
        eprintln!("[DEBUG] API: {}", cfg.api.base_url);
        eprintln!("[DEBUG] Timeout: {}ms", cfg.api.timeout_ms);
        eprintln!("[DEBUG] Storage: {}", cfg.session.storage_path.display());
        eprintln!("[DEBUG] Register policy: {}", cfg.auth.register_policy.as_str());
    }

    let run_id = uuid::Uuid::new_v4().to_string();
    let log = if cfg.log.enabled {
        let log_path = cfg.log.dir.join(format!("{}.jsonl", run_id));
        activity::ActivityLog::new(&log_path, &run_id).unwrap_or_else(|e| {
            eprintln!("Warning: {:#}; activity log disabled", e);
            activity::ActivityLog::disabled()
        })
    } else {
        activity::ActivityLog::disabled()
    };
    let log = Rc::new(log);

    let store: Box<dyn session::TokenStore> = if args.no_persist {
        Box::new(session::MemoryTokenStore::default())
    } else {
        Box::new(session::FileTokenStore::new(
            &cfg.session.storage_path,
            &cfg.session.token_key,
        ))
    };
    let session = Rc::new(session::Session::new(store, log.clone()));

    let transport = http::UreqTransport::new(Duration::from_millis(cfg.api.timeout_ms));
    let api = http::ApiClient::new(&cfg.api.base_url, Box::new(transport), session, log)
        .with_debug(args.debug);
    let auth_flow = auth::AuthFlow::new(
        cfg.auth.register_policy,
        Duration::from_millis(cfg.auth.notice_ttl_ms),
    );

    let mut app = app::App::new(api, auth_flow);
    app.start();

    let ctx = cli::Context {
        args,
        history_path: config::state_dir().join("history"),
        config: cfg,
        app: RefCell::new(app),
        run_id,
    };

    if let Some(command) = ctx.args.command.clone() {
        cli::run_once(&ctx, &command)
    } else {
        cli::run_repl(ctx)
    }
}
