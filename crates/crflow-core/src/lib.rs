//! crflow-core: Change request approval workflow
//!
//! Data model, access rules, the lifecycle engine and its collaborators
//! (record store, notifier, approval document generator, blob storage).
//! Change requests move through a fixed chain: owner, division manager, VP,
//! IT manager, developers.

pub mod access;
pub mod approval;
pub mod blob;
pub mod config;
pub mod dashboard;
pub mod document;
pub mod engine;
pub mod error;
pub mod id;
pub mod notify;
pub mod progress;
pub mod request;
pub mod store;
pub mod user;

pub use approval::{ApprovalAction, ApprovalLogEntry, DeveloperAssignment};
pub use config::{Config, ResubmitRouting};
pub use dashboard::Dashboard;
pub use document::{Document, FileType, NewAttachment};
pub use engine::{CrDetail, Decision, Engine, Inbox, ListQuery, Page, SortField, SortOrder};
pub use error::{Error, FieldError, StoreError};
pub use notify::{Notification, NotificationKind, Payload};
pub use progress::{Milestone, MilestoneState, Progress};
pub use request::{ChangeRequest, CrPatch, FormData, Stage, Status};
pub use user::{Role, User};

/// Result type for crflow operations
pub type Result<T> = std::result::Result<T, Error>;
