//! Streaming an archive into the store

use crate::store::ImageStore;
use crate::{DockhandError, Result};
use std::path::Path;
use tracing::debug;

/// Stream an archive into the store and interpret its completion message.
///
/// The store signals load failure inside the response body rather than at
/// the transport level: the transport call can succeed while the body
/// carries an embedded error. The first such message fails the operation,
/// passed through verbatim. The full response is collected before
/// inspection.
pub async fn load_archive<S: ImageStore + ?Sized>(store: &S, archive: &Path) -> Result<()> {
    let messages = store.load_archive(archive).await?;

    for message in &messages {
        if let Some(text) = message.stream.as_deref() {
            debug!("{}", text.trim_end());
        }
        if let Some(error) = message.error_message() {
            return Err(DockhandError::LoadRejected(error.to_string()));
        }
    }

    Ok(())
}
