use crate::{
    app::{App, View},
    auth::{AuthMode, AuthOutcome},
    config::Config,
    manager::{DeleteOutcome, MessManager, SubmitOutcome},
    models::{DraftField, MessRecord},
    Args,
};
use anyhow::{anyhow, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;

const STRENGTH_BAR_WIDTH: usize = 20;

/// What happens after a command has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Ran, but the server or the form check rejected it
    Failed,
    Exit,
}

pub struct Context {
    pub args: Args,
    pub config: Config,
    pub app: RefCell<App>,
    pub run_id: String,
    pub history_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Exit,
    Config,
    Mode,
    Strength(String),
    Login {
        email: String,
        password: String,
    },
    Register {
        name: String,
        email: String,
        password: String,
        confirm_password: String,
    },
    List,
    Show,
    Set {
        field: String,
        value: String,
    },
    Submit,
    Edit(String),
    Cancel,
    Delete(String),
    Logout,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let words = shell_words::split(line).map_err(|e| anyhow!("Invalid quoting: {}", e))?;
    let Some((name, rest)) = words.split_first() else {
        return Err(anyhow!("Empty command"));
    };
    let name = name.trim_start_matches('/').to_lowercase();

    let usage = |text: &str| anyhow!("Usage: {}", text);

    let cmd = match (name.as_str(), rest) {
        ("help" | "?", _) => Command::Help,
        ("status", _) => Command::Status,
        ("exit" | "quit", _) => Command::Exit,
        ("config", _) => Command::Config,
        ("mode" | "toggle", _) => Command::Mode,
        ("strength", [password]) => Command::Strength(password.clone()),
        ("strength", _) => return Err(usage("strength <password>")),
        ("login", [email, password]) => Command::Login {
            email: email.clone(),
            password: password.clone(),
        },
        ("login", _) => return Err(usage("login <email> <password>")),
        ("register", [name, email, password, confirm]) => Command::Register {
            name: name.clone(),
            email: email.clone(),
            password: password.clone(),
            confirm_password: confirm.clone(),
        },
        ("register", _) => return Err(usage("register <name> <email> <password> <confirm>")),
        ("list" | "ls" | "reload", _) => Command::List,
        ("show" | "draft", _) => Command::Show,
        ("set", [field, value @ ..]) if !value.is_empty() => Command::Set {
            field: field.clone(),
            value: value.join(" "),
        },
        ("set", _) => return Err(usage("set <name|location|price|rating> <value>")),
        ("add" | "submit" | "save", _) => Command::Submit,
        ("edit", [id]) => Command::Edit(id.clone()),
        ("edit", _) => return Err(usage("edit <id>")),
        ("cancel", _) => Command::Cancel,
        ("delete" | "rm", [id]) => Command::Delete(id.clone()),
        ("delete" | "rm", _) => return Err(usage("delete <id>")),
        ("logout", _) => Command::Logout,
        (other, _) => return Err(anyhow!("Unknown command: {} (try 'help')", other)),
    };
    Ok(cmd)
}

pub fn run_once(ctx: &Context, line: &str) -> Result<()> {
    let cmd = parse_command(line)?;
    let name = command_name(&cmd);
    let flow = execute(ctx, cmd)?;
    report(ctx);
    if flow == Flow::Failed {
        return Err(anyhow!("{} failed", name));
    }
    Ok(())
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let _ = rl.load_history(&ctx.history_path);

    println!("mess - type help for commands, exit to quit");
    println!("API: {}", ctx.config.api.base_url);
    render_view(&ctx);

    loop {
        let prompt_text = prompt(&ctx.app.borrow());
        match rl.readline(&prompt_text) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Lines carrying passwords stay out of the history file
                if !is_sensitive(line) {
                    rl.add_history_entry(line)?;
                }

                let view_before = ctx.app.borrow().view();
                match parse_command(line).and_then(|cmd| execute(&ctx, cmd)) {
                    Ok(Flow::Exit) => break,
                    Ok(Flow::Continue | Flow::Failed) => {}
                    Err(e) => eprintln!("Error: {}", e),
                }
                report(&ctx);
                if ctx.app.borrow().view() != view_before {
                    render_view(&ctx);
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(parent) = ctx.history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&ctx.history_path);
    Ok(())
}

fn is_sensitive(line: &str) -> bool {
    let first = line
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| matches!(c, '/' | '\'' | '"'))
        .to_lowercase();
    matches!(first.as_str(), "login" | "register" | "strength")
}

fn prompt(app: &App) -> String {
    match app.view() {
        View::Login => match app.auth().mode() {
            AuthMode::Login => "mess:login> ".to_string(),
            AuthMode::Register => "mess:register> ".to_string(),
        },
        View::Dashboard => match app.manager().editing_id() {
            Some(id) => format!("mess:dashboard [editing {}]> ", id),
            None => "mess:dashboard> ".to_string(),
        },
    }
}

fn verbose(ctx: &Context, message: &str) {
    if ctx.args.verbose || ctx.args.debug {
        eprintln!("[VERBOSE] {}", message);
    }
}

/// Run one command.
fn execute(ctx: &Context, cmd: Command) -> Result<Flow> {
    verbose(ctx, &format!("command: {}", command_name(&cmd)));
    let mut app = ctx.app.borrow_mut();

    match cmd {
        Command::Exit => return Ok(Flow::Exit),
        Command::Help => print_help(app.view()),
        Command::Status => {
            println!("View: {}", app.view().as_str());
            println!("API: {}", app.api().base_url());
            println!(
                "Logged in: {}",
                if app.api().session().is_authenticated() {
                    "yes"
                } else {
                    "no"
                }
            );
            println!("Register policy: {}", app.auth().policy().as_str());
            println!("Storage: {}", ctx.config.session.storage_path.display());
            println!("Run: {}", ctx.run_id);
            if let Some(path) = &app.api().log().path {
                println!("Activity log: {}", path.display());
            }
        }
        Command::Config => print!("{}", ctx.config.to_toml()?),
        Command::Mode => {
            app.toggle_auth_mode()?;
            println!("Mode: {}", app.auth().mode().as_str());
        }
        Command::Strength(password) => {
            if app.view() != View::Login {
                return Err(anyhow!("Already logged in. Use 'logout' first."));
            }
            let strength = app.auth().strength(&password).ok_or_else(|| {
                anyhow!("Password strength is rated while registering. Use 'mode' to switch.")
            })?;
            println!("{}", strength.bar(STRENGTH_BAR_WIDTH));
        }
        Command::Login { email, password } => {
            if app.view() == View::Login && app.auth().mode() == AuthMode::Register {
                app.toggle_auth_mode()?;
            }
            if app.login(&email, &password)? != AuthOutcome::Authenticated {
                return Ok(Flow::Failed);
            }
            println!("Logged in as {}", email);
        }
        Command::Register {
            name,
            email,
            password,
            confirm_password,
        } => {
            if app.view() == View::Login && app.auth().mode() == AuthMode::Login {
                app.toggle_auth_mode()?;
            }
            if let Some(strength) = app.auth().strength(&password) {
                println!("Password strength: {}", strength.bar(STRENGTH_BAR_WIDTH));
            }
            match app.register(&name, &email, &password, &confirm_password)? {
                AuthOutcome::Authenticated => println!("Registered and logged in as {}", email),
                AuthOutcome::Registered => {}
                AuthOutcome::Failed => return Ok(Flow::Failed),
            }
        }
        Command::List => {
            app.reload()?;
            if app.view() != View::Dashboard || app.manager().error().is_some() {
                return Ok(Flow::Failed);
            }
            print!("{}", render_records(app.manager().records()));
        }
        Command::Show => {
            if app.view() != View::Dashboard {
                return Err(anyhow!("Not logged in. Use 'login' or 'register' first."));
            }
            print!("{}", render_draft(app.manager()));
        }
        Command::Set { field, value } => app.set_field(&field, &value)?,
        Command::Submit => match app.submit()? {
            SubmitOutcome::Created => println!("Mess added"),
            SubmitOutcome::Updated(id) => println!("Mess {} updated", id),
            SubmitOutcome::Invalid | SubmitOutcome::Failed => return Ok(Flow::Failed),
        },
        Command::Edit(id) => {
            app.edit(&id)?;
            print!("{}", render_draft(app.manager()));
        }
        Command::Cancel => {
            app.cancel_edit()?;
            println!("Edit cancelled");
        }
        Command::Delete(id) => {
            let auto_yes = ctx.args.yes;
            match app.delete(&id, |prompt| confirm(prompt, auto_yes))? {
                DeleteOutcome::Deleted => println!("Mess {} deleted", id),
                DeleteOutcome::Declined => println!("Not deleted"),
                DeleteOutcome::Failed => return Ok(Flow::Failed),
            }
        }
        Command::Logout => {
            app.logout()?;
            println!("Logged out");
        }
    }
    Ok(Flow::Continue)
}

fn command_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::Help => "help",
        Command::Status => "status",
        Command::Exit => "exit",
        Command::Config => "config",
        Command::Mode => "mode",
        Command::Strength(_) => "strength",
        Command::Login { .. } => "login",
        Command::Register { .. } => "register",
        Command::List => "list",
        Command::Show => "show",
        Command::Set { .. } => "set",
        Command::Submit => "submit",
        Command::Edit(_) => "edit",
        Command::Cancel => "cancel",
        Command::Delete(_) => "delete",
        Command::Logout => "logout",
    }
}

/// Ask on stdin; anything but y/yes declines.
fn confirm(prompt: &str, auto_yes: bool) -> bool {
    if auto_yes {
        return true;
    }

    print!("{} [y/N]: ", prompt);
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_ok() {
        let input = input.trim().to_lowercase();
        input == "y" || input == "yes"
    } else {
        false
    }
}

/// Print whatever the last command left behind: forced view changes,
/// inline errors and notices.
fn report(ctx: &Context) {
    let mut app = ctx.app.borrow_mut();
    if let Some(banner) = app.take_banner() {
        println!("{}", banner);
    }
    match app.view() {
        View::Login => {
            if let Some(error) = app.auth().error() {
                eprintln!("Error: {}", error);
            }
            if let Some(notice) = app.auth().notice() {
                println!("{}", notice);
            }
        }
        View::Dashboard => {
            if let Some(error) = app.manager().error() {
                eprintln!("Error: {}", error);
            }
        }
    }
}

fn render_view(ctx: &Context) {
    let app = ctx.app.borrow();
    match app.view() {
        View::Login => {
            println!("-- {} --", app.auth().mode().as_str());
            println!("Use 'login <email> <password>' or 'register <name> <email> <password> <confirm>'");
        }
        View::Dashboard => {
            println!("-- Mess Management Panel --");
            if app.manager().is_loading() {
                println!("Loading...");
            } else {
                print!("{}", render_records(app.manager().records()));
            }
        }
    }
}

fn print_help(view: View) {
    println!("Commands:");
    println!("  help                 - show commands");
    println!("  status               - show session info");
    println!("  config               - show effective configuration");
    println!("  exit                 - quit");
    match view {
        View::Login => {
            println!("Login:");
            println!("  login <email> <password>");
            println!("  register <name> <email> <password> <confirm>");
            println!("  mode                 - toggle login/register form");
            println!("  strength <password>  - rate a password");
        }
        View::Dashboard => {
            println!("Dashboard:");
            println!("  list                 - reload and show all messes");
            println!("  show                 - show the form");
            println!("  set <field> <value>  - fill a form field (name, location, price, rating)");
            println!("  add                  - save the form (update when editing)");
            println!("  edit <id>            - load a mess into the form");
            println!("  cancel               - leave edit mode");
            println!("  delete <id>          - delete a mess (asks first)");
            println!("  logout");
        }
    }
}

/// One line per record, in server order.
pub fn render_records(records: &[MessRecord]) -> String {
    if records.is_empty() {
        return "No messes yet.\n".to_string();
    }

    let id_width = records
        .iter()
        .map(|r| r.id.chars().count())
        .max()
        .unwrap_or(2)
        .max(2);
    let name_width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut out = format!(
        "{:<id_width$}  {:<name_width$}  {:>8}  {:>6}  {}\n",
        "ID", "NAME", "PRICE", "RATING", "LOCATION"
    );
    for r in records {
        out.push_str(&format!(
            "{:<id_width$}  {:<name_width$}  {:>8}  {:>6}  {}\n",
            r.id, r.name, r.price, r.rating, r.location
        ));
    }
    out
}

pub fn render_draft(manager: &MessManager) -> String {
    let mut out = match manager.editing_id() {
        Some(id) => format!("Editing mess {}:\n", id),
        None if manager.draft().is_empty() => {
            "New mess (fill it with 'set <field> <value>'):\n".to_string()
        }
        None => "New mess:\n".to_string(),
    };
    for field in DraftField::ALL {
        out.push_str(&format!(
            "  {:<9} {}\n",
            format!("{}:", field.as_str()),
            manager.draft().get(field)
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthFlow, RegisterPolicy};
    use crate::http::testing::{client, RecordingTransport};
    use clap::Parser;
    use serde_json::json;
    use std::time::Duration;

    fn context(transport: &RecordingTransport) -> Context {
        let app = App::new(
            client(transport),
            AuthFlow::new(RegisterPolicy::AutoLogin, Duration::from_secs(3)),
        );
        Context {
            args: Args::parse_from(["mess", "--yes"]),
            config: Config::default(),
            app: RefCell::new(app),
            run_id: "run-test".to_string(),
            history_path: PathBuf::from("history"),
        }
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parse_command("login a@b.c 's3cret pw'").unwrap(),
            Command::Login {
                email: "a@b.c".to_string(),
                password: "s3cret pw".to_string()
            }
        );
        assert!(parse_command("login a@b.c").is_err());
    }

    #[test]
    fn test_parse_register() {
        let cmd = parse_command("register \"Asha Rao\" a@b.c Ab1@23 Ab1@23").unwrap();
        assert_eq!(
            cmd,
            Command::Register {
                name: "Asha Rao".to_string(),
                email: "a@b.c".to_string(),
                password: "Ab1@23".to_string(),
                confirm_password: "Ab1@23".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_set_joins_value() {
        assert_eq!(
            parse_command("set location Block B, North Campus").unwrap(),
            Command::Set {
                field: "location".to_string(),
                value: "Block B, North Campus".to_string()
            }
        );
        assert!(parse_command("set price").is_err());
    }

    #[test]
    fn test_parse_aliases_and_slash() {
        assert_eq!(parse_command("/quit").unwrap(), Command::Exit);
        assert_eq!(parse_command("ls").unwrap(), Command::List);
        assert_eq!(parse_command("save").unwrap(), Command::Submit);
        assert_eq!(parse_command("rm m1").unwrap(), Command::Delete("m1".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("").is_err());
        assert!(parse_command("login 'unterminated").is_err());
        let err = parse_command("frobnicate").unwrap_err();
        assert!(err.to_string().contains("Unknown command"));
    }

    #[test]
    fn test_sensitive_lines() {
        assert!(is_sensitive("login a@b.c pw"));
        assert!(is_sensitive("REGISTER a b c d"));
        assert!(!is_sensitive("list"));
    }

    #[test]
    fn test_sensitive_lines_match_parsed_commands() {
        let lines = [
            "/login a@b.c hunter2",
            "/Register a b c d",
            "'login' a@b.c hunter2",
            "/strength hunter2",
        ];
        for line in lines {
            assert!(matches!(
                parse_command(line).unwrap(),
                Command::Login { .. } | Command::Register { .. } | Command::Strength(_)
            ));
            assert!(is_sensitive(line), "{} should stay out of history", line);
        }
        assert!(!is_sensitive("/list"));
    }

    #[test]
    fn test_render_records() {
        let records = vec![
            MessRecord {
                id: "m1".to_string(),
                name: "Annapurna".to_string(),
                location: "Block B".to_string(),
                price: "80".to_string(),
                rating: "4".to_string(),
            },
            MessRecord {
                id: "m2".to_string(),
                name: "Cafe".to_string(),
                location: "X".to_string(),
                price: "50".to_string(),
                rating: "4.5".to_string(),
            },
        ];
        let out = render_records(&records);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with("m1  Annapurna"));
        assert!(lines[2].contains("Cafe"));
        assert!(lines[2].ends_with("X"));
    }

    #[test]
    fn test_render_empty_list() {
        assert_eq!(render_records(&[]), "No messes yet.\n");
    }

    #[test]
    fn test_run_once_reports_rejected_login() {
        let transport = RecordingTransport::new();
        let ctx = context(&transport);
        transport.reply(401, json!({"message": "Invalid credentials"}));

        let err = run_once(&ctx, "login a@b.c nope").unwrap_err();
        assert_eq!(err.to_string(), "login failed");
        assert_eq!(ctx.app.borrow().view(), View::Login);
    }

    #[test]
    fn test_run_once_reports_failed_submit() {
        let transport = RecordingTransport::new();
        let ctx = context(&transport);
        transport
            .reply(200, json!({"token": "t1"}))
            .reply(200, json!([]));
        run_once(&ctx, "login a@b.c secret").unwrap();

        // Empty draft never reaches the server
        assert!(run_once(&ctx, "add").is_err());

        for line in ["set name Cafe", "set location X", "set price 50", "set rating 4"] {
            run_once(&ctx, line).unwrap();
        }
        transport.reply(500, json!({"message": "db down"}));
        assert!(run_once(&ctx, "add").is_err());
        assert_eq!(ctx.app.borrow().manager().draft().get(DraftField::Name), "Cafe");

        transport.reply(201, json!({"id": "m1"})).reply(200, json!([]));
        run_once(&ctx, "add").unwrap();
    }

    #[test]
    fn test_strength_only_while_registering() {
        let transport = RecordingTransport::new();
        let ctx = context(&transport);

        assert!(run_once(&ctx, "strength Ab1@23").is_err());
        run_once(&ctx, "mode").unwrap();
        run_once(&ctx, "strength Ab1@23").unwrap();
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_render_empty_draft() {
        let manager = MessManager::new();
        assert!(render_draft(&manager).starts_with("New mess (fill it with"));
    }

    #[test]
    fn test_render_draft_modes() {
        let mut manager = MessManager::new();
        manager.set_field("name", "Cafe").unwrap();
        let out = render_draft(&manager);
        assert!(out.starts_with("New mess:"));
        assert!(out.contains("name:     Cafe"));

        let record = MessRecord {
            id: "m2".to_string(),
            name: "Cafe".to_string(),
            location: "X".to_string(),
            price: "50".to_string(),
            rating: "4".to_string(),
        };
        manager.begin_edit(&record);
        assert!(render_draft(&manager).starts_with("Editing mess m2:"));
    }
}
