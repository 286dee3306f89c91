//! crflow - Change request approval workflow
//!
//! Records live as JSONL files in .crflow/, attachments under .crflow/blobs/.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "crflow")]
#[command(about = "Change request approval workflow")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (email or id)
    #[arg(long = "as", global = true, env = "CRFLOW_ACTOR")]
    actor: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a crflow store in the current directory
    Init,

    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Create a draft change request
    Create {
        /// JSON file with the form data
        #[arg(short, long)]
        form: PathBuf,
    },

    /// List change requests visible to you
    List {
        /// Filter by status (e.g. PENDING_MANAGER)
        #[arg(short, long)]
        status: Option<String>,

        /// Match id or title
        #[arg(short = 'q', long)]
        search: Option<String>,

        /// Sort field (created_at, updated_at, id)
        #[arg(long, default_value = "created_at")]
        sort: String,

        /// Sort order (asc, desc)
        #[arg(long, default_value = "desc")]
        order: String,

        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Page size
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a change request with its history
    Show {
        /// Change request ID
        id: String,
    },

    /// Replace the form data of a draft or revision
    Edit {
        /// Change request ID
        id: String,

        /// JSON file with the new form data
        #[arg(short, long)]
        form: PathBuf,
    },

    /// Delete a draft
    Delete {
        /// Change request ID
        id: String,
    },

    /// Submit a draft for manager approval
    Submit {
        /// Change request ID
        id: String,
    },

    /// Resubmit after a revision request
    Resubmit {
        /// Change request ID
        id: String,
    },

    /// Approve at your review stage
    Approve {
        /// Change request ID
        id: String,

        /// Optional approval notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Reject at your review stage (final)
    Reject {
        /// Change request ID
        id: String,

        /// Reason, at least 50 characters
        #[arg(short, long)]
        notes: String,
    },

    /// Send back to the owner for revision
    Revise {
        /// Change request ID
        id: String,

        /// Instructions, at least 50 characters
        #[arg(short, long)]
        notes: String,
    },

    /// Assign an approved request to developers
    Assign {
        /// Change request ID
        id: String,

        /// Developer (email or id); repeat for several
        #[arg(short, long = "dev", required = true)]
        devs: Vec<String>,

        /// Notes for the developers
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Mark assigned work as completed
    Complete {
        /// Change request ID
        id: String,
    },

    /// Show approval milestones
    Progress {
        /// Change request ID
        id: String,
    },

    /// Attach a file to a draft or revision
    Attach {
        /// Change request ID
        id: String,

        /// File to upload
        path: PathBuf,

        /// MIME type (guessed from the extension when omitted)
        #[arg(long)]
        mime: Option<String>,
    },

    /// Remove an attachment
    Detach {
        /// Change request ID
        id: String,

        /// Document ID
        document: u64,
    },

    /// Save a document to disk
    Download {
        /// Change request ID
        id: String,

        /// Document ID
        document: u64,

        /// Output path (defaults to the stored file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Role-specific summary
    Dashboard,

    /// Your notifications
    Inbox {
        #[command(subcommand)]
        command: Option<InboxCommands>,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        email: String,

        /// Display name
        name: String,

        /// USER, MANAGER, VP, MANAGER_IT or DEV
        #[arg(short, long, default_value = "USER")]
        role: String,

        /// Organizational division
        #[arg(short, long)]
        division: Option<String>,
    },

    /// List users
    List {
        /// Filter by role
        #[arg(short, long)]
        role: Option<String>,

        /// Filter by division
        #[arg(short, long)]
        division: Option<String>,
    },
}

#[derive(Subcommand)]
enum InboxCommands {
    /// List notifications
    List {
        /// Only unread ones
        #[arg(short, long)]
        unread: bool,
    },
    /// Mark one notification as read
    Read {
        /// Notification ID
        id: u64,
    },
    /// Mark every notification as read
    ReadAll,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let Cli {
        command,
        json,
        actor,
    } = Cli::parse();
    let open = || commands::Ctx::open(json, actor.clone());

    match command {
        Commands::Init => commands::init(json),
        Commands::User { command } => match command {
            UserCommands::Add {
                email,
                name,
                role,
                division,
            } => commands::user_add(&open()?, &email, &name, &role, division).await,
            UserCommands::List { role, division } => {
                commands::user_list(&open()?, role, division).await
            }
        },
        Commands::Create { form } => commands::create(&open()?, &form).await,
        Commands::List {
            status,
            search,
            sort,
            order,
            page,
            limit,
        } => commands::list(&open()?, status, search, &sort, &order, page, limit).await,
        Commands::Show { id } => commands::show(&open()?, &id).await,
        Commands::Edit { id, form } => commands::edit(&open()?, &id, &form).await,
        Commands::Delete { id } => commands::delete(&open()?, &id).await,
        Commands::Submit { id } => commands::submit(&open()?, &id).await,
        Commands::Resubmit { id } => commands::resubmit(&open()?, &id).await,
        Commands::Approve { id, notes } => {
            commands::decide(&open()?, &id, crflow_core::Decision::Approve { notes }).await
        }
        Commands::Reject { id, notes } => {
            commands::decide(&open()?, &id, crflow_core::Decision::Reject { notes }).await
        }
        Commands::Revise { id, notes } => {
            commands::decide(&open()?, &id, crflow_core::Decision::RequestRevision { notes }).await
        }
        Commands::Assign { id, devs, notes } => commands::assign(&open()?, &id, &devs, notes).await,
        Commands::Complete { id } => commands::complete(&open()?, &id).await,
        Commands::Progress { id } => commands::progress(&open()?, &id).await,
        Commands::Attach { id, path, mime } => commands::attach(&open()?, &id, &path, mime).await,
        Commands::Detach { id, document } => commands::detach(&open()?, &id, document).await,
        Commands::Download {
            id,
            document,
            output,
        } => commands::download(&open()?, &id, document, output).await,
        Commands::Dashboard => commands::dashboard(&open()?).await,
        Commands::Inbox { command } => match command {
            Some(InboxCommands::List { unread }) => commands::inbox(&open()?, unread).await,
            Some(InboxCommands::Read { id }) => commands::inbox_read(&open()?, id).await,
            Some(InboxCommands::ReadAll) => commands::inbox_read_all(&open()?).await,
            None => commands::inbox(&open()?, false).await,
        },
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => commands::config_show(&open()?),
        },
    }
}
