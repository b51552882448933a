//! Command implementations for the CLI interface.
//!
//! Every handler works on a signed-in [`Session`] and reports failures as the
//! same single sentence the board would show. Notifications produced while a
//! command runs are printed when it finishes.

use std::io::{self, BufRead, Write};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::Subcommand;
use clap_complete::{generate, Shell};

use gestora::error::WorkflowError;
use gestora::fields::*;
use gestora::report;
use gestora::session::Session;
use gestora::state::AppState;
use gestora::task::{Deadline, Task, TaskDraft, TaskFilter};
use gestora::user::{User, UserDraft};

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and remember the session.
    Login {
        /// Account email; defaults to the last one used.
        email: Option<String>,
        /// Password; prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// Create an account.
    Register {
        name: String,
        email: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Ask for a password reset link.
    ForgotPassword { email: String },

    /// Choose a password for a new account from its setup token.
    SetupPassword {
        token: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// Choose a new password from a reset token.
    ResetPassword {
        token: String,
        #[arg(long)]
        password: Option<String>,
    },

    /// List the tasks you can see.
    List {
        /// Filter by status.
        #[arg(long, value_enum)]
        status: Option<Status>,
        /// Case-insensitive title search.
        #[arg(long)]
        search: Option<String>,
    },

    /// View a task by ID or title.
    View { id: String },

    /// Create a task (administrators).
    Add {
        title: String,
        /// Responsible user: ID or email.
        #[arg(long)]
        responsible: String,
        /// Participant: ID or email. May be repeated.
        #[arg(long = "with")]
        participants: Vec<String>,
        #[arg(long)]
        desc: Option<String>,
        /// Start: "now", "today", "tomorrow", "in Nd", YYYY-MM-DD or "YYYY-MM-DD HH:MM".
        #[arg(long, default_value = "now")]
        start: String,
        /// Deadline in days.
        #[arg(long, conflicts_with = "hours")]
        days: Option<u32>,
        /// Deadline in hours.
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Change fields on a task.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long)]
        responsible: Option<String>,
        /// Replace the participants. May be repeated.
        #[arg(long = "with")]
        participants: Vec<String>,
        /// Remove every participant.
        #[arg(long, conflicts_with = "participants")]
        clear_participants: bool,
        #[arg(long)]
        start: Option<String>,
        #[arg(long, conflicts_with = "hours")]
        days: Option<u32>,
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Delete a task (administrators).
    Delete { id: String },

    /// Move a task one step forward.
    Advance { id: String },

    /// Move a task one step back.
    Regress { id: String },

    /// Comment on a task.
    Comment { id: String, text: String },

    /// Manage users (administrators).
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Totals for the tasks you can see.
    Dashboard,

    /// Compliance per employee (administrators).
    Report,

    /// Recent activity on the tasks you can see.
    Activity {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Open the kanban board.
    Board,

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    List,
    Add {
        name: String,
        email: String,
        #[arg(long, value_enum, default_value_t = Role::Employee)]
        role: Role,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    Edit {
        /// User ID or email.
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_enum)]
        role: Option<Role>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    Delete {
        /// User ID or email.
        id: String,
    },
}

impl Commands {
    /// Commands that work without a session.
    pub fn is_public(&self) -> bool {
        matches!(
            self,
            Commands::Login { .. }
                | Commands::Logout
                | Commands::Register { .. }
                | Commands::ForgotPassword { .. }
                | Commands::SetupPassword { .. }
                | Commands::ResetPassword { .. }
                | Commands::Completions { .. }
        )
    }
}

/// Turn a workflow failure into its displayable sentence.
pub trait Shown<T> {
    fn shown(self, lang: Language) -> Result<T>;
}

impl<T> Shown<T> for std::result::Result<T, WorkflowError> {
    fn shown(self, lang: Language) -> Result<T> {
        self.map_err(|e| anyhow!(e.user_message(lang)))
    }
}

// ----------------------------------------------------------------------
// Input helpers
// ----------------------------------------------------------------------

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Password from the flag, or prompted (twice when `confirm` is set).
fn password(given: Option<String>, confirm: bool) -> Result<(String, String)> {
    if let Some(pw) = given {
        return Ok((pw.clone(), pw));
    }
    let pw = prompt("Password")?;
    let again = if confirm { prompt("Repeat password")? } else { pw.clone() };
    Ok((pw, again))
}

/// Parse a start time: "now", "today", "tomorrow", "in Nd", YYYY-MM-DD or "YYYY-MM-DD HH:MM" (local).
pub fn parse_start(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim().to_lowercase();
    let midnight = |d: NaiveDate| -> Result<DateTime<Utc>> {
        let naive = d.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("invalid date"))?;
        local_to_utc(naive)
    };
    let today = Local::now().date_naive();
    match raw.as_str() {
        "now" => return Ok(Utc::now()),
        "today" => return midnight(today),
        "tomorrow" => return midnight(today + Duration::days(1)),
        _ => {}
    }
    if let Some(days) = raw.strip_prefix("in ").and_then(|r| r.strip_suffix('d')) {
        let n: i64 = days.trim().parse().with_context(|| format!("invalid day count '{days}'"))?;
        return midnight(today + Duration::days(n));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M") {
        return local_to_utc(t);
    }
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .with_context(|| format!("unrecognised start '{raw}'"))?;
    midnight(date)
}

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("{naive} does not exist in the local time zone"))
}

fn deadline(days: Option<u32>, hours: Option<u32>) -> Option<Deadline> {
    hours.map(Deadline::hours).or(days.map(Deadline::days))
}

/// A user by ID or email; unknown keys are passed through as IDs.
fn user_key(state: &AppState, key: &str) -> String {
    state
        .users
        .iter()
        .find(|u| u.id == key || u.email.eq_ignore_ascii_case(key))
        .map_or_else(|| key.to_string(), |u| u.id.clone())
}

/// A task by exact ID, else by unique case-insensitive title.
fn resolve_task(session: &Session, key: &str) -> Result<String> {
    let visible = session.visible_tasks(&TaskFilter::default());
    if let Some(t) = visible.iter().find(|t| t.id == key) {
        return Ok(t.id.clone());
    }
    let needle = key.to_lowercase();
    let matches: Vec<&&Task> = visible.iter().filter(|t| t.title.to_lowercase() == needle).collect();
    match matches.as_slice() {
        [one] => Ok(one.id.clone()),
        [] => bail!("No task matches '{key}'."),
        _ => bail!("'{key}' matches {} tasks; use the ID.", matches.len()),
    }
}

// ----------------------------------------------------------------------
// Output helpers
// ----------------------------------------------------------------------

/// Truncate a string to a maximum width, adding ellipsis if needed.
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// "in 3d", "5h ago", "now".
pub fn format_relative(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = at - now;
    let (amount, future) = if delta >= Duration::zero() { (delta, true) } else { (-delta, false) };
    let text = if amount.num_days() >= 1 {
        format!("{}d", amount.num_days())
    } else if amount.num_hours() >= 1 {
        format!("{}h", amount.num_hours())
    } else if amount.num_minutes() >= 1 {
        format!("{}m", amount.num_minutes())
    } else {
        return "now".into();
    };
    if future {
        format!("in {text}")
    } else {
        format!("{text} ago")
    }
}

fn print_tasks(tasks: &[&Task], state: &AppState, lang: Language) {
    println!("{:<8} {:<13} {:<10} {:<16} {}", "ID", "Status", "Due", "Responsible", "Title");
    let now = Utc::now();
    for t in tasks {
        let mut due = format_relative(t.delivery_at(), now);
        if t.is_overdue(now) && t.status != Status::Overdue {
            due.push('!');
        }
        println!(
            "{:<8} {:<13} {:<10} {:<16} {}",
            truncate(&t.id, 8),
            t.status.label(lang),
            due,
            truncate(state.user_name(&t.responsible_id), 16),
            t.title
        );
    }
}

fn print_user(u: &User) {
    println!("ID:          {}", u.id);
    println!("Name:        {}", u.name);
    println!("Email:       {}", u.email);
    println!("Role:        {}", u.role.as_str());
    println!("Position:    {}", u.position.as_deref().unwrap_or("-"));
    println!("Department:  {}", u.department.as_deref().unwrap_or("-"));
    println!("Phone:       {}", u.phone.as_deref().unwrap_or("-"));
}

/// Print what the command left in the signed-in user's notifications.
pub fn print_notifications(session: &Session) {
    for n in session.my_notifications().iter().rev() {
        let tag = match n.severity {
            Severity::Success => "ok",
            Severity::Info => "info",
            Severity::Error => "error",
        };
        eprintln!("[{tag}] {}", n.message);
    }
}

// ----------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------

pub async fn cmd_login(session: &mut Session, email: Option<String>, pw: Option<String>) -> Result<()> {
    let lang = session.language();
    let email = match email.or_else(|| session.remembered_email()) {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let (pw, _) = password(pw, false)?;
    let user = session.login(&email, &pw).await.shown(lang)?;
    println!("Signed in as {} ({}).", user.name, user.role.as_str());
    if user.must_change_password {
        println!("Your password must be changed: use the setup link you received.");
    }
    Ok(())
}

pub fn cmd_logout(session: &mut Session) {
    session.logout();
    println!("Signed out.");
}

pub fn cmd_whoami(session: &Session) -> Result<()> {
    let user = session.user().ok_or_else(|| anyhow!(WorkflowError::NotSignedIn.user_message(session.language())))?;
    print_user(user);
    Ok(())
}

pub async fn cmd_register(session: &mut Session, name: String, email: String, pw: Option<String>) -> Result<()> {
    let lang = session.language();
    let (pw, again) = password(pw, true)?;
    session.register(&name, &email, &pw, &again).await.shown(lang)?;
    println!("Account created for {email}. You can now sign in.");
    Ok(())
}

pub async fn cmd_forgot_password(session: &mut Session, email: String) -> Result<()> {
    let lang = session.language();
    session.forgot_password(&email).await.shown(lang)?;
    println!("If {email} has an account, a reset link is on its way.");
    Ok(())
}

pub async fn cmd_set_password(session: &mut Session, token: String, pw: Option<String>, reset: bool) -> Result<()> {
    let lang = session.language();
    let check = session.validate_token(&token).await.shown(lang)?;
    if !check.valid {
        bail!("This link is invalid or has expired.");
    }
    let (pw, again) = password(pw, true)?;
    if reset {
        session.reset_password(&token, &pw, &again).await.shown(lang)?;
    } else {
        session.setup_password(&token, &pw, &again).await.shown(lang)?;
    }
    match check.email {
        Some(email) => println!("Password saved. Sign in with `gst login {email}`."),
        None => println!("Password saved."),
    }
    Ok(())
}

pub fn cmd_list(session: &Session, status: Option<Status>, search: Option<String>) {
    let filter = TaskFilter { search, status };
    let mut tasks = session.visible_tasks(&filter);
    tasks.sort_by_key(|t| (t.status == Status::Closed, t.delivery_at()));
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    print_tasks(&tasks, session.state(), session.language());
}

pub fn cmd_view(session: &Session, id: String) -> Result<()> {
    let lang = session.language();
    let id = resolve_task(session, &id)?;
    let state = session.state();
    let task = state.task(&id).ok_or_else(|| anyhow!("Task {id} not found."))?;
    let now = Utc::now();
    let local = |t: DateTime<Utc>| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();

    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", task.status.label(lang));
    println!("Responsible:  {}", state.user_name(&task.responsible_id));
    let participants: Vec<&str> = task.participants.iter().map(|p| state.user_name(p)).collect();
    println!("Participants: {}", if participants.is_empty() { "-".into() } else { participants.join(", ") });
    println!("Start:        {}", local(task.start));
    println!(
        "Delivery:     {} ({})",
        local(task.delivery_at()),
        format_relative(task.delivery_at(), now)
    );
    if let Some(closed) = task.closed_at {
        println!("Finished:     {}", local(closed));
    }
    println!("Updated:      {}", local(task.updated_at));
    println!("Description:\n{}\n", if task.description.is_empty() { "-" } else { task.description.as_str() });

    let moves = session.moves(task);
    let show = |s: Option<Status>| s.map_or("-".to_string(), |s| s.label(lang).to_string());
    println!("Next step:    {}   Previous step: {}", show(moves.advance), show(moves.regress));

    if !task.comments.is_empty() {
        println!("\nComments:");
        for c in &task.comments {
            println!("  {} {}: {}", local(c.created_at), c.author, c.text);
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_add(
    session: &mut Session,
    title: String,
    responsible: String,
    participants: Vec<String>,
    desc: Option<String>,
    start: String,
    days: Option<u32>,
    hours: Option<u32>,
) -> Result<()> {
    let lang = session.language();
    let state = session.state();
    let draft = TaskDraft {
        title,
        description: desc.unwrap_or_default(),
        start: parse_start(&start)?,
        deadline: deadline(days, hours).unwrap_or(Deadline::days(0)),
        responsible_id: user_key(state, &responsible),
        participants: participants.iter().map(|p| user_key(state, p)).collect(),
    };
    let task = session.create_task(&draft).await.shown(lang)?;
    println!("Created task {} \"{}\".", task.id, task.title);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_edit(
    session: &mut Session,
    id: String,
    title: Option<String>,
    desc: Option<String>,
    responsible: Option<String>,
    participants: Vec<String>,
    clear_participants: bool,
    start: Option<String>,
    days: Option<u32>,
    hours: Option<u32>,
) -> Result<()> {
    let lang = session.language();
    let id = resolve_task(session, &id)?;
    let state = session.state();
    let task = state.task(&id).ok_or_else(|| anyhow!("Task {id} not found."))?;
    let mut draft = TaskDraft::from_task(task);
    if let Some(title) = title {
        draft.title = title;
    }
    if let Some(desc) = desc {
        draft.description = desc;
    }
    if let Some(responsible) = responsible {
        draft.responsible_id = user_key(state, &responsible);
    }
    if clear_participants {
        draft.participants.clear();
    } else if !participants.is_empty() {
        draft.participants = participants.iter().map(|p| user_key(state, p)).collect();
    }
    if let Some(start) = start {
        draft.start = parse_start(&start)?;
    }
    if let Some(deadline) = deadline(days, hours) {
        draft.deadline = deadline;
    }
    let task = session.update_task(&id, &draft).await.shown(lang)?;
    println!("Updated task {} \"{}\".", task.id, task.title);
    Ok(())
}

pub async fn cmd_delete(session: &mut Session, id: String) -> Result<()> {
    let lang = session.language();
    let id = resolve_task(session, &id)?;
    session.delete_task(&id).await.shown(lang)?;
    Ok(())
}

pub async fn cmd_move(session: &mut Session, id: String, forward: bool) -> Result<()> {
    let lang = session.language();
    let id = resolve_task(session, &id)?;
    let task = if forward {
        session.advance(&id).await
    } else {
        session.regress(&id).await
    }
    .shown(lang)?;
    println!("{} is now {}.", task.title, task.status.label(lang));
    Ok(())
}

pub async fn cmd_comment(session: &mut Session, id: String, text: String) -> Result<()> {
    let lang = session.language();
    let id = resolve_task(session, &id)?;
    session.add_comment(&id, &text).await.shown(lang)?;
    Ok(())
}

pub async fn cmd_users(session: &mut Session, action: UsersAction) -> Result<()> {
    let lang = session.language();
    if !session.user().is_some_and(User::is_admin) {
        return Err(WorkflowError::AdminRequired).shown(lang);
    }
    match action {
        UsersAction::List => {
            println!("{:<8} {:<9} {:<24} {}", "ID", "Role", "Name", "Email");
            for u in &session.state().users {
                println!("{:<8} {:<9} {:<24} {}", truncate(&u.id, 8), u.role.as_str(), truncate(&u.name, 24), u.email);
            }
        }
        UsersAction::Add { name, email, role, position, department, phone } => {
            let draft = UserDraft { name, email, role, position, department, phone };
            let user = session.create_user(&draft).await.shown(lang)?;
            println!("Created user {} ({}).", user.name, user.id);
        }
        UsersAction::Edit { id, name, email, role, position, department, phone } => {
            let id = user_key(session.state(), &id);
            let user = session
                .state()
                .find_user(&id)
                .ok_or_else(|| anyhow!(WorkflowError::UserNotFound(id.clone()).user_message(lang)))?;
            let mut draft = UserDraft::from_user(user);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(email) = email {
                draft.email = email;
            }
            if let Some(role) = role {
                draft.role = role;
            }
            if position.is_some() {
                draft.position = position;
            }
            if department.is_some() {
                draft.department = department;
            }
            if phone.is_some() {
                draft.phone = phone;
            }
            session.update_user(&id, &draft).await.shown(lang)?;
        }
        UsersAction::Delete { id } => {
            let id = user_key(session.state(), &id);
            session.delete_user(&id).await.shown(lang)?;
        }
    }
    Ok(())
}

pub fn cmd_dashboard(session: &Session) {
    let lang = session.language();
    let tasks: Vec<Task> = session.visible_tasks(&TaskFilter::default()).into_iter().cloned().collect();
    let stats = report::dashboard(&tasks);
    println!("Total:       {}", stats.total);
    println!("Active:      {}", stats.active);
    println!("Overdue:     {}", stats.overdue);
    println!("Completed:   {}", stats.completed);
    println!("Compliance:  {}%", stats.compliance_rate);
    println!();
    for row in &stats.by_status {
        println!("  {:<13} {:>4}  {:>3}%", row.status.label(lang), row.count, row.percentage);
    }
}

pub fn cmd_report(session: &Session) -> Result<()> {
    let lang = session.language();
    if !session.user().is_some_and(User::is_admin) {
        return Err(WorkflowError::AdminRequired).shown(lang);
    }
    let state = session.state();
    let rows = report::employee_reports(&state.tasks, &state.users);
    println!(
        "{:<24} {:>5} {:>5} {:>8} {:>7} {:>7} {:>6}",
        "Name", "Total", "Done", "Pending", "Active", "Overdue", "Rate"
    );
    for r in rows {
        println!(
            "{:<24} {:>5} {:>5} {:>8} {:>7} {:>7} {:>5}%",
            truncate(&r.name, 24),
            r.total,
            r.completed,
            r.pending,
            r.in_progress,
            r.overdue,
            r.compliance_rate
        );
    }
    Ok(())
}

pub fn cmd_activity(session: &Session, limit: usize) {
    let lang = session.language();
    let entries = session.visible_activity();
    if entries.is_empty() {
        println!("No activity yet.");
        return;
    }
    let now = Utc::now();
    for a in entries.into_iter().take(limit) {
        println!("{:<9} {:<16} {}", format_relative(a.created_at, now), truncate(&a.user_name, 16), a.summary(lang));
    }
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}
