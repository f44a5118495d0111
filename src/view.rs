//! Terminal viewer: `desk load`, `desk review`, and `desk export`.
//!
//! Each command drives a [`ViewerSession`] against a [`DeskBackend`] and
//! prints to stdout. Diagnostics go through `tracing` on stderr.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use review_desk_core::review::ReviewRequest;
use review_desk_core::DeskError;
use review_desk_core::viewer::{
    LoadOutcome, LoadTicket, ReviewAction, ViewFilters, ViewerProfile, ViewerSession,
};

use crate::backend::DeskBackend;

/// Widest a grid cell may print before it is cut.
const MAX_CELL: usize = 32;

async fn run_ticket(
    session: &mut ViewerSession,
    backend: &dyn DeskBackend,
    ticket: LoadTicket,
) -> Result<usize> {
    let result = backend.load(&ticket.request).await;
    match session.finish_load(&ticket, result) {
        LoadOutcome::Applied { rows } => Ok(rows),
        LoadOutcome::Failed(message) => bail!("load failed: {}", message),
        LoadOutcome::Stale => bail!("load superseded"),
    }
}

/// Loads one document by id into the session.
///
/// With `preview_only`, a collection that is not on the read allow-list is
/// skipped rather than refused: a review only needs the preview, and the
/// review allow-list is enforced by the review itself.
async fn lookup(
    session: &mut ViewerSession,
    backend: &dyn DeskBackend,
    id: &str,
    preview_only: bool,
) -> Result<()> {
    let ticket = session.begin_lookup(id);
    let result = backend.load(&ticket.request).await;
    if let (true, Err(e)) = (preview_only, &result) {
        if let Some(DeskError::UnauthorizedCollection(collection)) = e.downcast_ref::<DeskError>() {
            tracing::debug!(%collection, "collection not readable; reviewing without preview");
            return Ok(());
        }
    }
    match session.finish_load(&ticket, result) {
        LoadOutcome::Applied { .. } => {}
        LoadOutcome::Failed(message) => bail!("load failed: {}", message),
        LoadOutcome::Stale => bail!("load superseded"),
    }
    if session.row(id).is_none() {
        bail!(
            "document not found: {}/{}",
            session.profile().collection,
            id
        );
    }
    Ok(())
}

fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_CELL {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_CELL - 1).collect();
    format!("{}…", cut)
}

/// Renders the loaded rows as a fixed-width grid.
///
/// Columns are the id, the review state, then the viewer's headline fields
/// (or every scalar column when none are configured). Sequence fields are
/// summarized by length in the last column.
pub fn render_grid(session: &ViewerSession) -> String {
    let profile = session.profile();
    let columns: Vec<String> = if profile.headline_fields.is_empty() {
        session.scalar_columns().to_vec()
    } else {
        profile.headline_fields.clone()
    };

    let mut header = vec!["ID".to_string(), "REVIEWED".to_string()];
    header.extend(columns.iter().map(|c| c.to_uppercase()));
    header.push("LISTS".to_string());

    let mut lines = vec![header];
    for row in session.rows() {
        let reviewed = match (&row.review.reviewed, &row.review.reviewed_by) {
            (true, Some(by)) => format!("yes ({})", by),
            (true, None) => "yes".to_string(),
            (false, _) => "no".to_string(),
        };
        let mut cells = vec![row.id.clone(), reviewed];
        for col in &columns {
            cells.push(row.get(col).map(|v| v.display()).unwrap_or_default());
        }
        let lists: Vec<String> = row
            .sequences()
            .map(|(name, items)| format!("{}({})", name, items.len()))
            .collect();
        cells.push(lists.join(" "));
        lines.push(cells.iter().map(|c| clip(c)).collect());
    }

    let widths: Vec<usize> = (0..lines[0].len())
        .map(|i| {
            lines
                .iter()
                .map(|l| l.get(i).map_or(0, |c| c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    lines
        .iter()
        .map(|cells| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run_load(
    backend: &dyn DeskBackend,
    profile: ViewerProfile,
    filters: &ViewFilters,
    json: bool,
) -> Result<()> {
    let mut session = ViewerSession::new(profile);
    let ticket = session.begin_load(filters)?;
    tracing::debug!(backend = %backend.describe(), request = ?ticket.request, "loading");
    let rows = run_ticket(&mut session, backend, ticket).await?;

    if json {
        let docs: Vec<_> = session.rows().iter().map(|r| r.to_document()).collect();
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if rows == 0 {
        println!("No documents found.");
        return Ok(());
    }
    println!("{}", render_grid(&session));
    println!();
    println!("{} document(s) from {}", rows, session.profile().collection);
    Ok(())
}

/// Asks a yes/no question; anything but `y`/`yes` is a no.
pub fn confirm(prompt: &str, input: &mut impl BufRead, out: &mut impl Write) -> Result<bool> {
    write!(out, "{} [y/N] ", prompt)?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

pub struct ReviewOptions {
    pub reviewer: Option<String>,
    pub assume_yes: bool,
    pub force: bool,
}

pub async fn run_review(
    backend: &dyn DeskBackend,
    profile: ViewerProfile,
    id: &str,
    opts: &ReviewOptions,
) -> Result<()> {
    let mut session = ViewerSession::new(profile);
    lookup(&mut session, backend, id, true).await?;

    let (prompt, request) = match session.review_action(id, opts.reviewer.as_deref()) {
        ReviewAction::Unavailable => {
            tracing::warn!("no reviewer identity; pass --reviewer or set [client].reviewer");
            return Ok(());
        }
        ReviewAction::AlreadyReviewed {
            reviewed_by,
            reviewed_at,
        } if !opts.force => {
            println!(
                "{} already reviewed by {} at {} (use --force to review again)",
                id,
                reviewed_by.as_deref().unwrap_or("unknown"),
                reviewed_at.as_deref().unwrap_or("unknown")
            );
            return Ok(());
        }
        ReviewAction::AlreadyReviewed { .. } => {
            let profile = session.profile();
            let reviewer = opts.reviewer.as_deref().unwrap_or_default().trim();
            (
                profile.confirm_prompt.clone(),
                ReviewRequest::new(profile.collection.clone(), id, reviewer),
            )
        }
        ReviewAction::Offer { prompt, request } => (prompt, request),
    };

    if !opts.assume_yes {
        if !atty::is(atty::Stream::Stdin) {
            bail!("confirmation required; pass --yes when stdin is not a terminal");
        }
        let stdin = std::io::stdin();
        let accepted = confirm(&prompt, &mut stdin.lock(), &mut std::io::stdout())?;
        if !accepted {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let receipt = backend.review(&request).await?;
    session.apply_review(&request, &receipt);
    println!(
        "reviewed {}/{} by {} at {}",
        request.collection, request.id, request.reviewed_by, receipt.reviewed_at
    );
    Ok(())
}

/// Writes every record list of one document as CSV into `out_dir`.
///
/// Returns the paths written.
pub async fn run_export(
    backend: &dyn DeskBackend,
    profile: ViewerProfile,
    id: &str,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut session = ViewerSession::new(profile);
    lookup(&mut session, backend, id, false).await?;

    let files = session.export_csv(id).unwrap_or_default();
    if files.is_empty() {
        println!("{} has no record lists to export.", id);
        return Ok(Vec::new());
    }

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = out_dir.join(&file.file_name);
        std::fs::write(&path, file.contents.as_bytes())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
