// One upload run: resolve the deposition, plan the files, then upload
// them one at a time in plan order. Resolution and planning errors end
// the run straight away; upload failures are handled by the uploader's
// retry loop, and a cancellation stops the run before the next file.

use crate::api::{DepositionApi, DepositionId, FileTransport};
use crate::planner;
use crate::resolver::{self, Resolution};
use crate::uploader::{UploadConfirmation, Uploader};
use anyhow::Result;
use std::path::Path;

/// Inputs of a run, as given on the command line.
#[derive(Debug, Clone)]
pub struct SessionRequest<'a> {
    pub deposition_id: Option<&'a str>,
    pub directory: &'a Path,
    pub overwrite: bool,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub deposition_id: DepositionId,
    pub created: bool,
    pub uploaded: Vec<UploadConfirmation>,
    pub skipped: usize,
    pub total_bytes: u64,
    pub attempts: u32,
}

/// Run the whole pipeline against `api`, uploading through `uploader`.
/// `title` is only asked for when a new deposition has to be created.
pub fn run<A, F>(
    api: &A,
    request: &SessionRequest<'_>,
    title: F,
    uploader: &Uploader<'_, A>,
) -> Result<SessionReport>
where
    A: DepositionApi + FileTransport + ?Sized,
    F: FnOnce() -> Result<String>,
{
    if request.deposition_id.is_none() {
        println!("Creating new deposition...");
    }
    let resolution = resolver::resolve(api, request.deposition_id, title)?;
    let created = resolution.created();
    match &resolution {
        Resolution::Found(d) => println!("Found deposition with ID: {}: {}", d.id, d.title),
        Resolution::Created(d) => println!("Created new deposition with ID: {}.", d.id),
    }
    let deposition = resolution.into_deposition();

    let planner::Plan { files, skipped } = planner::plan(
        request.directory,
        request.overwrite,
        &deposition.existing_files,
    )?;

    println!(
        "Uploading {} files to deposition ID: {}...",
        files.len(),
        deposition.id
    );
    let listing: Vec<String> = files.iter().map(|f| f.path.display().to_string()).collect();
    println!("Files: {:?}", listing);

    let mut uploaded = Vec::with_capacity(files.len());
    for file in &files {
        println!("Uploading {}...", file.path.display());
        let confirmation = uploader.upload(&deposition.bucket_url, &file.path)?;
        tracing::info!(
            path = %file.path.display(),
            attempts = confirmation.attempts,
            checksum = confirmation.file.checksum.as_deref().unwrap_or("-"),
            "file uploaded"
        );
        uploaded.push(confirmation);
    }

    println!(
        "All files uploaded successfully to deposition ID: {}",
        deposition.id
    );

    Ok(SessionReport {
        deposition_id: deposition.id,
        created,
        total_bytes: uploaded.iter().map(|u| u.size).sum(),
        attempts: uploaded.iter().map(|u| u.attempts).sum(),
        skipped: skipped.len(),
        uploaded,
    })
}
