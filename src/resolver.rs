// Deposition resolution: reuse the deposition the user named, or create a
// fresh one. Failures here are configuration problems (wrong id, bad
// token) and are never retried.

use crate::api::{DepositionApi, DepositionId, DepositionRecord};
use crate::error::ResolveError;

/// The deposition the run uploads into. The file list is a snapshot taken
/// once and only used to decide what to skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposition {
    pub id: DepositionId,
    pub title: String,
    pub bucket_url: String,
    pub existing_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(Deposition),
    Created(Deposition),
}

impl Resolution {
    pub fn deposition(&self) -> &Deposition {
        match self {
            Resolution::Found(d) | Resolution::Created(d) => d,
        }
    }

    pub fn into_deposition(self) -> Deposition {
        match self {
            Resolution::Found(d) | Resolution::Created(d) => d,
        }
    }

    pub fn created(&self) -> bool {
        matches!(self, Resolution::Created(_))
    }
}

/// Fetch deposition `id`, or create a new dataset deposition when `id` is
/// `None`. `title` is only called in the second case.
pub fn resolve<A, F>(api: &A, id: Option<&str>, title: F) -> Result<Resolution, ResolveError>
where
    A: DepositionApi + ?Sized,
    F: FnOnce() -> anyhow::Result<String>,
{
    match id {
        Some(id) => {
            let record = api.get_deposition(id).map_err(|source| ResolveError::Lookup {
                id: id.to_string(),
                source,
            })?;
            Ok(Resolution::Found(into_deposition(record)?))
        }
        None => {
            let title = title().map_err(ResolveError::Title)?;
            let title = title.trim();
            if title.is_empty() {
                return Err(ResolveError::EmptyTitle);
            }
            let record = api
                .create_deposition(title)
                .map_err(|source| ResolveError::Create { source })?;
            let mut deposition = into_deposition(record)?;
            // A deposition created a moment ago holds nothing yet.
            deposition.existing_files.clear();
            Ok(Resolution::Created(deposition))
        }
    }
}

fn into_deposition(record: DepositionRecord) -> Result<Deposition, ResolveError> {
    let title = record.title();
    let existing_files = record.filenames();
    let bucket_url = record.links.bucket.ok_or_else(|| ResolveError::MissingBucket {
        id: record.id.to_string(),
    })?;
    Ok(Deposition {
        id: record.id,
        title,
        bucket_url,
        existing_files,
    })
}
