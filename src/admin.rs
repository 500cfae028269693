//! Studio management for admin sessions.

use std::sync::Arc;

use tracing::info;

use crate::calendar::SharedBackend;
use crate::error::DeskError;
use crate::limits::{MAX_STUDIO_NAME_LEN, MAX_STUDIO_TEXT_LEN};
use crate::model::*;
use crate::notify::{Notice, NotifyHub};

const ADMIN_REQUIRED: &str = "You don't have permission to access this page";

pub struct StudioAdmin {
    backend: SharedBackend,
    notify: Arc<NotifyHub>,
}

fn validate_draft(draft: &StudioDraft) -> Result<(), DeskError> {
    if draft.name.trim().is_empty() {
        return Err(DeskError::Invalid("studio name is required"));
    }
    if draft.capacity == 0 {
        return Err(DeskError::Invalid("capacity must be at least 1"));
    }
    if draft.name.len() > MAX_STUDIO_NAME_LEN {
        return Err(DeskError::LimitExceeded("studio name too long"));
    }
    if [&draft.description, &draft.image_url, &draft.location]
        .iter()
        .any(|s| s.len() > MAX_STUDIO_TEXT_LEN)
    {
        return Err(DeskError::LimitExceeded("studio text too long"));
    }
    Ok(())
}

impl StudioAdmin {
    pub fn new(backend: SharedBackend, session: &Session, notify: Arc<NotifyHub>) -> Result<Self, DeskError> {
        if !session.is_admin() {
            let err = DeskError::Unauthorized(ADMIN_REQUIRED);
            notify.send(Notice::error(err.notice_title(), err.to_string()));
            return Err(err);
        }
        Ok(Self { backend, notify })
    }

    pub async fn list(&self) -> Result<Vec<Studio>, DeskError> {
        self.backend.list_studios().await.map_err(|e| {
            self.notify
                .send(Notice::error("Error", format!("Failed to load studios: {e}")));
            DeskError::Remote(e)
        })
    }

    pub async fn create(&self, draft: StudioDraft) -> Result<Studio, DeskError> {
        self.check(&draft)?;
        match self.backend.insert_studio(draft).await {
            Ok(studio) => {
                info!("studio {} created", studio.id);
                self.notify.send(Notice::success("Studio created successfully"));
                Ok(studio)
            }
            Err(e) => Err(self.failed("create", e)),
        }
    }

    pub async fn update(&self, id: StudioId, draft: StudioDraft) -> Result<Studio, DeskError> {
        self.check(&draft)?;
        match self.backend.update_studio(id, draft).await {
            Ok(studio) => {
                info!("studio {id} updated");
                self.notify.send(Notice::success("Studio updated successfully"));
                Ok(studio)
            }
            Err(e) => Err(self.failed("update", e)),
        }
    }

    /// Deleting a studio also drops its bookings.
    pub async fn delete(&self, id: StudioId) -> Result<(), DeskError> {
        match self.backend.delete_studio(id).await {
            Ok(()) => {
                info!("studio {id} deleted");
                self.notify.send(Notice::success("Studio deleted successfully"));
                Ok(())
            }
            Err(e) => Err(self.failed("delete", e)),
        }
    }

    fn check(&self, draft: &StudioDraft) -> Result<(), DeskError> {
        validate_draft(draft).inspect_err(|err| {
            self.notify.send(Notice::error(err.notice_title(), err.to_string()));
        })
    }

    fn failed(&self, action: &str, e: crate::backend::BackendError) -> DeskError {
        self.notify
            .send(Notice::error("Error", format!("Failed to {action} studio: {e}")));
        DeskError::Remote(e)
    }
}
