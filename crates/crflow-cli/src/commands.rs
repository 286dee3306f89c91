//! CLI command implementations

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use crflow_core::blob::{FsBlobStore, sanitize_file_name};
use crflow_core::dashboard::RoleView;
use crflow_core::document::MarkdownApprovalGenerator;
use crflow_core::notify::StoreNotifier;
use crflow_core::progress::MilestoneState;
use crflow_core::store::{JsonlStore, UserFilter};
use crflow_core::{
    ChangeRequest, Config, Decision, Engine, FormData, ListQuery, NewAttachment, Role, Status, User,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Opened store plus the engine wired over it
pub struct Ctx {
    engine: Engine,
    store: Arc<JsonlStore>,
    json: bool,
    actor: Option<String>,
}

impl Ctx {
    pub fn open(json: bool, actor: Option<String>) -> Result<Self> {
        let store = Arc::new(JsonlStore::open()?);
        let config = store.config()?;
        tracing::debug!(dir = %store.crflow_dir().display(), "store opened");
        if !config.display.colors {
            colored::control::set_override(false);
        }

        let blobs = Arc::new(FsBlobStore::new(store.blobs_dir()));
        let notifier = Arc::new(StoreNotifier::new(store.clone()));
        let generator = Arc::new(MarkdownApprovalGenerator::new(store.clone(), blobs.clone()));
        let engine = Engine::new(store.clone(), notifier, generator, blobs, config);

        Ok(Self {
            engine,
            store,
            json,
            actor,
        })
    }

    async fn actor(&self) -> Result<User> {
        let Some(ref key) = self.actor else {
            bail!("No actor given. Pass --as <email|id> or set CRFLOW_ACTOR");
        };
        Ok(self.engine.resolve_user(key).await?)
    }

    fn date(&self, at: &DateTime<Utc>) -> String {
        at.format(&self.engine.config().display.date_format).to_string()
    }

    fn short_title<'a>(&self, cr: &'a ChangeRequest) -> std::borrow::Cow<'a, str> {
        let max = self.engine.config().display.max_title_length;
        let title = cr.title();
        if title.chars().count() <= max {
            title.into()
        } else {
            let cut: String = title.chars().take(max.saturating_sub(1)).collect();
            format!("{}…", cut).into()
        }
    }
}

fn status_colored(status: Status) -> ColoredString {
    let label = status.as_str();
    match status {
        Status::Draft => label.white(),
        Status::PendingManager | Status::PendingVp => label.yellow(),
        Status::RevisionManager | Status::RevisionVp => label.magenta(),
        Status::RejectedManager | Status::RejectedVp => label.red(),
        Status::Approved | Status::AssignedDev => label.blue(),
        Status::Completed => label.green(),
        Status::Deleted => label.dimmed(),
    }
}

fn read_form(path: &Path) -> Result<FormData> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Form file {} is not valid form JSON", path.display()))
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "md" => "text/markdown",
        _ => "application/octet-stream",
    }
}

/// Print `cr` as JSON, or a one-line confirmation
fn report(ctx: &Ctx, cr: &ChangeRequest, verb: &str) -> Result<()> {
    if ctx.json {
        println!("{}", serde_json::to_string(cr)?);
    } else {
        println!(
            "{} {} {} [{}]",
            "✓".green(),
            verb,
            cr.id.cyan(),
            status_colored(cr.status())
        );
        if let Some(role) = cr.current_approver_role() {
            println!("  Waiting on: {}", role);
        }
    }
    Ok(())
}

pub fn init(json: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let store = JsonlStore::init(&root)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "path": store.crflow_dir().display().to_string() })
        );
    } else {
        println!(
            "{} Initialized crflow in {}",
            "✓".green(),
            store.crflow_dir().display()
        );
        println!("  Next: crflow user add <email> <name> --role <ROLE>");
    }
    Ok(())
}

pub async fn user_add(
    ctx: &Ctx,
    email: &str,
    name: &str,
    role: &str,
    division: Option<String>,
) -> Result<()> {
    let role: Role = role.parse()?;
    let user = ctx.engine.register_user(email, name, role, division).await?;
    if ctx.json {
        println!("{}", serde_json::to_string(&user)?);
    } else {
        println!("{} Registered {} ({})", "✓".green(), user.email.cyan(), user.role);
        println!("  ID: {}", user.id);
    }
    Ok(())
}

#[derive(Tabled)]
struct UserRow {
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Division")]
    division: String,
}

pub async fn user_list(ctx: &Ctx, role: Option<String>, division: Option<String>) -> Result<()> {
    let filter = UserFilter {
        role: role.map(|r| r.parse()).transpose()?,
        division,
        ids: None,
    };
    let mut users = ctx.engine.users(&filter).await?;
    users.sort_by(|a, b| a.role.as_str().cmp(b.role.as_str()).then(a.email.cmp(&b.email)));

    if ctx.json {
        println!("{}", serde_json::to_string(&users)?);
    } else if users.is_empty() {
        println!("No users found");
    } else {
        let rows = users.into_iter().map(|u| UserRow {
            email: u.email,
            name: u.name,
            role: u.role.to_string(),
            division: u.division.unwrap_or_default(),
        });
        println!("{}", Table::new(rows).with(Style::rounded()));
    }
    Ok(())
}

pub async fn create(ctx: &Ctx, form: &Path) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.create(&actor, read_form(form)?).await?;
    report(ctx, &cr, "Created")
}

#[derive(Tabled)]
struct CrRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub async fn list(
    ctx: &Ctx,
    status: Option<String>,
    search: Option<String>,
    sort: &str,
    order: &str,
    page: usize,
    limit: Option<usize>,
) -> Result<()> {
    let actor = ctx.actor().await?;
    let query = ListQuery {
        status: status.map(|s| s.parse()).transpose()?,
        search,
        sort: sort.parse()?,
        order: order.parse()?,
        page,
        limit,
    };
    let page = ctx.engine.list(&actor, &query).await?;

    if ctx.json {
        println!("{}", serde_json::to_string(&page)?);
    } else if page.items.is_empty() {
        println!("No change requests found");
    } else {
        let rows: Vec<_> = page
            .items
            .iter()
            .map(|cr| CrRow {
                id: cr.id.clone(),
                status: cr.status().to_string(),
                title: ctx.short_title(cr).into_owned(),
                updated: ctx.date(&cr.updated_at),
            })
            .collect();
        println!("{}", Table::new(rows).with(Style::rounded()));
        println!(
            "Page {} of {} ({} total)",
            page.page,
            page.pages().max(1),
            page.total
        );
    }
    Ok(())
}

pub async fn show(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let detail = ctx.engine.get(&actor, id).await?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let cr = &detail.cr;
    let form = &cr.form_data;
    println!("{} {}", cr.id.cyan().bold(), form.title.bold());
    println!();
    println!("Status:      {}", status_colored(cr.status()));
    if let Some(role) = cr.current_approver_role() {
        println!("Waiting on:  {}", role);
    }
    println!("Owner:       {}", cr.owner_id);
    println!("Division:    {}", cr.owner_division.as_deref().unwrap_or("-"));
    println!("Target date: {}", form.target_date);
    println!(
        "Revisions:   manager {}, VP {}",
        cr.manager_revision_count, cr.vp_revision_count
    );
    println!("Created:     {}", ctx.date(&cr.created_at));
    println!("Updated:     {}", ctx.date(&cr.updated_at));

    for (label, value) in [
        ("Business area", &form.business_area),
        ("Impact", &form.category_impact),
        ("Impact description", &form.impact_description),
        ("Background", &form.background),
        ("Objective", &form.objective),
        ("Service explanation", &form.service_explanation),
        ("Services needed", &form.services_needed),
    ] {
        if !value.trim().is_empty() {
            println!();
            println!("{}", format!("{}:", label).bold());
            println!("{}", value);
        }
    }

    if !detail.approval_log.is_empty() {
        println!();
        println!("{}", "History:".bold());
        for entry in &detail.approval_log {
            println!(
                "  {} {} {} {}",
                ctx.date(&entry.created_at).dimmed(),
                entry.action,
                entry.approver_role,
                entry.approver_id
            );
            if !entry.notes.is_empty() {
                println!("      {}", entry.notes);
            }
        }
    }

    if !detail.assignments.is_empty() {
        println!();
        println!("{}", "Developers:".bold());
        for a in &detail.assignments {
            println!("  {} (by {})", a.developer_id, a.assigned_by_id);
        }
    }

    if !detail.documents.is_empty() {
        println!();
        println!("{}", "Documents:".bold());
        for doc in &detail.documents {
            println!(
                "  #{} {} [{}] {} bytes",
                doc.id, doc.file_name, doc.file_type, doc.file_size
            );
        }
    }
    Ok(())
}

pub async fn edit(ctx: &Ctx, id: &str, form: &Path) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.edit(&actor, id, read_form(form)?).await?;
    report(ctx, &cr, "Updated")
}

pub async fn delete(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.delete(&actor, id).await?;
    report(ctx, &cr, "Deleted")
}

pub async fn submit(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.submit(&actor, id).await?;
    report(ctx, &cr, "Submitted")
}

pub async fn resubmit(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.resubmit(&actor, id).await?;
    report(ctx, &cr, "Resubmitted")
}

pub async fn decide(ctx: &Ctx, id: &str, decision: Decision) -> Result<()> {
    let actor = ctx.actor().await?;
    let verb = match decision {
        Decision::Approve { .. } => "Approved",
        Decision::Reject { .. } => "Rejected",
        Decision::RequestRevision { .. } => "Sent back for revision:",
    };
    let cr = ctx.engine.decide(&actor, id, decision).await?;
    report(ctx, &cr, verb)
}

pub async fn assign(ctx: &Ctx, id: &str, devs: &[String], notes: Option<String>) -> Result<()> {
    let actor = ctx.actor().await?;
    let mut ids = Vec::with_capacity(devs.len());
    for dev in devs {
        ids.push(ctx.engine.resolve_user(dev).await?.id);
    }
    let cr = ctx.engine.assign_developers(&actor, id, &ids, notes).await?;
    report(ctx, &cr, "Assigned")
}

pub async fn complete(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let cr = ctx.engine.complete(&actor, id).await?;
    report(ctx, &cr, "Completed")
}

pub async fn progress(ctx: &Ctx, id: &str) -> Result<()> {
    let actor = ctx.actor().await?;
    let progress = ctx.engine.progress(&actor, id).await?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
        return Ok(());
    }

    println!(
        "{} [{}]",
        progress.cr_id.cyan().bold(),
        status_colored(progress.current_status)
    );
    for step in &progress.steps {
        let marker = match step.state {
            MilestoneState::Completed => "●".green(),
            MilestoneState::Current => "◐".yellow(),
            MilestoneState::Pending => "○".dimmed(),
        };
        let mut line = format!("{} {}. {}", marker, step.step, step.name);
        if let Some(ref at) = step.timestamp {
            line.push_str(&format!("  {}", ctx.date(at).dimmed()));
        }
        if let Some(ref approver) = step.approver {
            line.push_str(&format!("  by {}", approver));
        }
        if !step.developers.is_empty() {
            line.push_str(&format!("  to {}", step.developers.join(", ")));
        }
        println!("{}", line);
    }
    Ok(())
}

pub async fn attach(ctx: &Ctx, id: &str, path: &Path, mime: Option<String>) -> Result<()> {
    let actor = ctx.actor().await?;
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Attachment path has no file name")?
        .to_string();
    let upload = NewAttachment {
        mime_type: mime.unwrap_or_else(|| guess_mime(path).to_string()),
        file_name,
        bytes,
    };
    let doc = ctx.engine.add_attachment(&actor, id, upload).await?;

    if ctx.json {
        println!("{}", serde_json::to_string(&doc)?);
    } else {
        println!(
            "{} Attached {} to {} as #{}",
            "✓".green(),
            doc.file_name,
            id.cyan(),
            doc.id
        );
    }
    Ok(())
}

pub async fn detach(ctx: &Ctx, id: &str, document: u64) -> Result<()> {
    let actor = ctx.actor().await?;
    ctx.engine.remove_attachment(&actor, id, document).await?;
    if ctx.json {
        println!("{}", serde_json::json!({ "cr_id": id, "document_id": document }));
    } else {
        println!("{} Removed document #{} from {}", "✓".green(), document, id.cyan());
    }
    Ok(())
}

#[derive(Serialize)]
struct Downloaded<'a> {
    cr_id: &'a str,
    document_id: u64,
    path: String,
    bytes: usize,
}

/// Stored names come from uploads; only the base name is used locally
fn default_output(file_name: &str) -> PathBuf {
    PathBuf::from(sanitize_file_name(file_name))
}

pub async fn download(ctx: &Ctx, id: &str, document: u64, output: Option<PathBuf>) -> Result<()> {
    let actor = ctx.actor().await?;
    let (doc, bytes) = ctx.engine.download_document(&actor, id, document).await?;
    let path = output.unwrap_or_else(|| default_output(&doc.file_name));
    std::fs::write(&path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;

    if ctx.json {
        let out = Downloaded {
            cr_id: id,
            document_id: doc.id,
            path: path.display().to_string(),
            bytes: bytes.len(),
        };
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("{} Saved {} ({} bytes)", "✓".green(), path.display(), bytes.len());
    }
    Ok(())
}

fn print_summaries<'a>(ctx: &Ctx, heading: &str, items: impl IntoIterator<Item = &'a crflow_core::dashboard::CrSummary>) {
    let mut items = items.into_iter().peekable();
    if items.peek().is_none() {
        return;
    }
    println!();
    println!("{}", heading.bold());
    for cr in items {
        println!(
            "  {} [{}] {}  {}",
            cr.id.cyan(),
            status_colored(cr.status),
            cr.title,
            ctx.date(&cr.updated_at).dimmed()
        );
    }
}

pub async fn dashboard(ctx: &Ctx) -> Result<()> {
    let actor = ctx.actor().await?;
    let dashboard = ctx.engine.dashboard(&actor).await?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    println!("{} ({})", dashboard.name.bold(), dashboard.role);
    match dashboard.view {
        RoleView::User { stats, recent } => {
            println!(
                "Total {}  Draft {}  Pending {}  Revision {}  Approved {}  Rejected {}  Completed {}",
                stats.total,
                stats.draft,
                stats.pending,
                stats.revision,
                stats.approved,
                stats.rejected,
                stats.completed
            );
            print_summaries(ctx, "Recent:", &recent);
        }
        RoleView::Manager { stats, pending } => {
            println!(
                "Pending approval {}  Division total {}  Approved {}  Rejected {}",
                stats.pending_approval, stats.total_division, stats.approved, stats.rejected
            );
            print_summaries(ctx, "Waiting for you:", &pending);
        }
        RoleView::Vp { stats, pending } => {
            println!(
                "Pending approval {}  Total {}  Approved {}  Assigned {}  Completed {}",
                stats.pending_approval, stats.total_all, stats.approved, stats.assigned, stats.completed
            );
            print_summaries(ctx, "Waiting for you:", &pending);
        }
        RoleView::ManagerIt {
            stats,
            workload,
            need_mapping,
        } => {
            println!(
                "Need mapping {}  Assignments {}",
                stats.need_mapping, stats.total_assigned
            );
            if !workload.is_empty() {
                println!();
                println!("{}", "Workload:".bold());
                for w in &workload {
                    println!("  {:<24} {}", w.developer, w.assigned_crs);
                }
            }
            print_summaries(ctx, "Need developers:", &need_mapping);
        }
        RoleView::Dev { stats, assigned } => {
            println!(
                "Assigned {}  In progress {}  Completed {}",
                stats.assigned, stats.in_progress, stats.completed
            );
            print_summaries(ctx, "Assigned to you:", assigned.iter().map(|a| &a.cr));
        }
    }
    Ok(())
}

pub async fn inbox(ctx: &Ctx, unread_only: bool) -> Result<()> {
    let actor = ctx.actor().await?;
    let inbox = ctx.engine.inbox(&actor, unread_only).await?;

    if ctx.json {
        println!("{}", serde_json::to_string(&inbox)?);
    } else if inbox.items.is_empty() {
        println!("No notifications");
    } else {
        for n in &inbox.items {
            let title = if n.is_read {
                n.title.normal()
            } else {
                n.title.bold()
            };
            println!(
                "#{:<4} {} {}  {}",
                n.id,
                title,
                n.related_id.as_deref().unwrap_or("").cyan(),
                ctx.date(&n.created_at).dimmed()
            );
            println!("      {}", n.message);
        }
        println!();
        println!("{} unread", inbox.unread);
    }
    Ok(())
}

pub async fn inbox_read(ctx: &Ctx, id: u64) -> Result<()> {
    let actor = ctx.actor().await?;
    ctx.engine.mark_read(&actor, id).await?;
    if !ctx.json {
        println!("{} Marked #{} as read", "✓".green(), id);
    }
    Ok(())
}

pub async fn inbox_read_all(ctx: &Ctx) -> Result<()> {
    let actor = ctx.actor().await?;
    let count = ctx.engine.mark_all_read(&actor).await?;
    if ctx.json {
        println!("{}", serde_json::json!({ "marked": count }));
    } else {
        println!("{} Marked {} notifications as read", "✓".green(), count);
    }
    Ok(())
}

pub fn config_show(ctx: &Ctx) -> Result<()> {
    let config: &Config = ctx.engine.config();

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!("  ({})", ctx.store.config_path().display());
    println!();
    println!("id_prefix = \"{}\"", config.id_prefix);
    println!();
    println!("[workflow]");
    println!("resubmit_routing = \"{}\"", config.workflow.resubmit_routing);
    println!("min_decision_notes = {}", config.workflow.min_decision_notes);
    println!();
    println!("[attachments]");
    println!("max_per_cr = {}", config.attachments.max_per_cr);
    println!("max_file_size = {}", config.attachments.max_file_size);
    println!(
        "allowed_mime_types = [{}]",
        config
            .attachments
            .allowed_mime_types
            .iter()
            .map(|m| format!("\"{}\"", m))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("[list]");
    println!("default_limit = {}", config.list.default_limit);
    println!("max_limit = {}", config.list.max_limit);
    println!();
    println!("[display]");
    println!("colors = {}", config.display.colors);
    println!("date_format = \"{}\"", config.display.date_format);
    println!("max_title_length = {}", config.display.max_title_length);
    Ok(())
}
