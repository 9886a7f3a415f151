//! Shared cursor pagination helpers.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ReviewQueueCursorPayload {
    submitted_at: OffsetDateTime,
    id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CatalogCursorPayload {
    published_at: OffsetDateTime,
    id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct EnrollmentCursorPayload {
    created_at: OffsetDateTime,
    id: Uuid,
}

/// Cursor for walking the review queue in submission order (oldest first).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewQueueCursor {
    submitted_at: OffsetDateTime,
    id: Uuid,
}

/// Cursor for paginating the published catalog in reverse chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCursor {
    published_at: OffsetDateTime,
    id: Uuid,
}

/// Cursor for paginating a course's enrollments in reverse chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentCursor {
    created_at: OffsetDateTime,
    id: Uuid,
}

impl ReviewQueueCursor {
    pub fn new(submitted_at: OffsetDateTime, id: Uuid) -> Self {
        Self { submitted_at, id }
    }

    pub fn submitted_at(&self) -> OffsetDateTime {
        self.submitted_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> String {
        let payload = ReviewQueueCursorPayload {
            submitted_at: self.submitted_at,
            id: self.id,
        };
        let serialized = serde_json::to_vec(&payload)
            .expect("serializing review queue cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: ReviewQueueCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            submitted_at: payload.submitted_at,
            id: payload.id,
        })
    }
}

impl CatalogCursor {
    pub fn new(published_at: OffsetDateTime, id: Uuid) -> Self {
        Self { published_at, id }
    }

    pub fn published_at(&self) -> OffsetDateTime {
        self.published_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> String {
        let payload = CatalogCursorPayload {
            published_at: self.published_at,
            id: self.id,
        };
        let serialized = serde_json::to_vec(&payload)
            .expect("serializing catalog cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: CatalogCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            published_at: payload.published_at,
            id: payload.id,
        })
    }
}

impl EnrollmentCursor {
    pub fn new(created_at: OffsetDateTime, id: Uuid) -> Self {
        Self { created_at, id }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn encode(&self) -> String {
        let payload = EnrollmentCursorPayload {
            created_at: self.created_at,
            id: self.id,
        };
        let serialized = serde_json::to_vec(&payload)
            .expect("serializing enrollment cursor payload should succeed");
        URL_SAFE_NO_PAD.encode(serialized)
    }

    pub fn decode(cursor: &str) -> Result<Self, PaginationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        let payload: EnrollmentCursorPayload = serde_json::from_slice(&bytes)
            .map_err(|err| PaginationError::InvalidCursor(err.to_string()))?;
        Ok(Self {
            created_at: payload.created_at,
            id: payload.id,
        })
    }
}

/// Cursor-aware pagination request.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<C> {
    pub limit: u32,
    pub cursor: Option<C>,
}

impl<C> PageRequest<C> {
    pub fn new(limit: u32, cursor: Option<C>) -> Self {
        Self { limit, cursor }
    }
}

/// Cursor-aware page result.
#[derive(Debug, Clone, Serialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }

    pub fn new(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }
}

#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}
