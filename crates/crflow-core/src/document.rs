//! Stored documents and the approval sheet generator

use crate::approval::ApprovalAction;
use crate::blob::BlobStore;
use crate::store::RecordStore;
use crate::{ChangeRequest, Error, Result, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::sync::Arc;

/// What a stored document is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    /// Uploaded by the owner
    Attachment,
    /// Produced on final approval
    PdfApproval,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Attachment => write!(f, "ATTACHMENT"),
            FileType::PdfApproval => write!(f, "PDF_APPROVAL"),
        }
    }
}

/// Metadata for a blob attached to a change request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned
    #[serde(default)]
    pub id: u64,
    pub cr_id: String,
    pub file_name: String,
    /// Blob store reference
    pub file_path: String,
    pub file_size: u64,
    pub mime_type: String,
    pub file_type: FileType,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        cr_id: &str,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
        file_type: FileType,
    ) -> Self {
        Self {
            id: 0,
            cr_id: cr_id.to_string(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            file_size,
            mime_type: mime_type.into(),
            file_type,
            uploaded_at: Utc::now(),
        }
    }
}

/// An upload as received from the owner
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Produces the approval document once a request is fully approved
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate_approval_document(&self, cr_id: &str) -> Result<Document>;
}

/// Renders a Markdown approval sheet into the blob store
pub struct MarkdownApprovalGenerator {
    store: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
}

impl MarkdownApprovalGenerator {
    pub fn new(store: Arc<dyn RecordStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    async fn render(&self, cr: &ChangeRequest) -> Result<String> {
        let owner = self.store.get_user(&cr.owner_id).await?;
        let log = self.store.approval_log(&cr.id).await?;

        let mut approvals = Vec::new();
        for entry in log.iter().filter(|e| e.action == ApprovalAction::Approve) {
            let name = self
                .store
                .get_user(&entry.approver_id)
                .await?
                .map(|u| u.name)
                .unwrap_or_else(|| entry.approver_id.clone());
            approvals.push((name, entry));
        }

        render_sheet(cr, owner.as_ref(), &approvals, Utc::now())
            .map_err(|e| Error::Other(format!("Failed to render approval sheet: {}", e)))
    }
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() { "-" } else { value }
}

fn render_sheet(
    cr: &ChangeRequest,
    owner: Option<&User>,
    approvals: &[(String, &crate::ApprovalLogEntry)],
    printed_at: DateTime<Utc>,
) -> std::result::Result<String, std::fmt::Error> {
    let form = &cr.form_data;
    let mut out = String::new();

    writeln!(out, "# Change Request Approval\n")?;
    writeln!(out, "CR number: {}  ", cr.id)?;
    writeln!(out, "Date: {}\n", printed_at.format("%Y-%m-%d"))?;

    writeln!(out, "## Requester\n")?;
    writeln!(out, "- Name: {}", owner.map_or("-", |u| u.name.as_str()))?;
    writeln!(out, "- Email: {}", owner.map_or("-", |u| u.email.as_str()))?;
    writeln!(
        out,
        "- Division: {}\n",
        cr.owner_division.as_deref().unwrap_or("-")
    )?;

    writeln!(out, "## Details\n")?;
    writeln!(out, "- Title: {}", or_dash(&form.title))?;
    writeln!(out, "- Target date: {}", or_dash(&form.target_date))?;
    writeln!(out, "- Business area: {}", or_dash(&form.business_area))?;
    writeln!(out, "- Category impact: {}\n", or_dash(&form.category_impact))?;
    for (heading, body) in [
        ("Impact description", &form.impact_description),
        ("Background", &form.background),
        ("Objective", &form.objective),
        ("Service explanation", &form.service_explanation),
        ("Services needed", &form.services_needed),
    ] {
        writeln!(out, "### {}\n\n{}\n", heading, or_dash(body))?;
    }

    writeln!(out, "## Approvals\n")?;
    writeln!(out, "| No | Approver | Role | Date |")?;
    writeln!(out, "|----|----------|------|------|")?;
    for (n, (name, entry)) in approvals.iter().enumerate() {
        writeln!(
            out,
            "| {} | {} | {} | {} |",
            n + 1,
            name,
            entry.approver_role,
            entry.created_at.format("%Y-%m-%d %H:%M")
        )?;
    }

    writeln!(
        out,
        "\n_Generated automatically on {}._",
        printed_at.format("%Y-%m-%d %H:%M UTC")
    )?;
    Ok(out)
}

#[async_trait]
impl DocumentGenerator for MarkdownApprovalGenerator {
    async fn generate_approval_document(&self, cr_id: &str) -> Result<Document> {
        let cr = self
            .store
            .get_cr(cr_id)
            .await?
            .ok_or_else(|| Error::not_found("Change request", cr_id))?;

        let sheet = self.render(&cr).await?;
        let file_name = format!("{}-approval.md", cr.id);
        let reference = self
            .blobs
            .put(&format!("approvals/{}", file_name), sheet.as_bytes())
            .await?;

        let document = Document::new(
            &cr.id,
            file_name,
            reference,
            sheet.len() as u64,
            "text/markdown",
            FileType::PdfApproval,
        );
        Ok(self.store.insert_document(document).await?)
    }
}
