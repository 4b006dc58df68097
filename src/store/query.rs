use uuid::Uuid;

use crate::{
    error::StoreError,
    models::comment::Comment,
    store::repository::{NodeRepository, Page, ScanFilter},
};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Ordering for flat listings. `id` breaks ties in the same direction, so every
/// ordering is total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    CreatedAsc,
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
}

impl SortKey {
    /// Parses a sort key. Unknown or missing keys fall back to `CreatedAsc`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("created_asc" | "created_at_asc") => SortKey::CreatedAsc,
            Some("created_desc" | "created_at_desc") => SortKey::CreatedDesc,
            Some("updated_asc" | "updated_at_asc") => SortKey::UpdatedAsc,
            Some("updated_desc" | "updated_at_desc") => SortKey::UpdatedDesc,
            _ => SortKey::default(),
        }
    }

    /// `ORDER BY` body, shared by both SQL backends.
    pub fn order_by(self) -> &'static str {
        match self {
            SortKey::CreatedAsc => "created_at ASC, id ASC",
            SortKey::CreatedDesc => "created_at DESC, id DESC",
            SortKey::UpdatedAsc => "updated_at ASC, id ASC",
            SortKey::UpdatedDesc => "updated_at DESC, id DESC",
        }
    }
}

/// Caller-facing listing request, before normalization.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub parent_id: Option<Uuid>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn children_of(parent_id: Uuid) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    /// Resolves defaults: blank search means no filter, limit falls back to
    /// 10 and is capped at 100, offset falls back to 0.
    pub fn normalize(&self) -> (ScanFilter, SortKey, Page) {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        let limit = match self.limit {
            Some(l) if l > 0 => l.min(MAX_LIMIT),
            _ => DEFAULT_LIMIT,
        };
        let offset = self.offset.filter(|o| *o >= 0).unwrap_or(0);

        (
            ScanFilter {
                parent_id: self.parent_id,
                search,
            },
            SortKey::parse(self.sort.as_deref()),
            Page { limit, offset },
        )
    }
}

/// Flat listing. An empty result is success.
pub async fn list(
    repo: &dyn NodeRepository,
    query: &ListQuery,
) -> Result<Vec<Comment>, StoreError> {
    let (filter, sort, page) = query.normalize();
    repo.scan(&filter, sort, page).await
}
