//! Filtered, sorted views over the loop store.
//!
//! The sort column is interpolated into SQL, so it only ever comes from
//! the closed [`SortField`] set. Unknown sort or order values fall back
//! silently instead of erroring.

use serde::Deserialize;

use super::LoopStatus;

/// Columns a listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    EndDate,
    Sale,
    Status,
    Type,
}

impl SortField {
    /// Unknown values map to `CreatedAt`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "end_date" => SortField::EndDate,
            "sale" => SortField::Sale,
            "status" => SortField::Status,
            "type" => SortField::Type,
            _ => SortField::CreatedAt,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::EndDate => "end_date",
            SortField::Sale => "sale",
            SortField::Status => "status",
            SortField::Type => "type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Unknown values map to `Desc`.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Status condition of a listing. Aliases resolve to a known status;
/// anything else is still matched exactly, so it simply finds nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusFilter {
    Is(LoopStatus),
    Unrecognized(String),
}

impl StatusFilter {
    pub fn parse(raw: &str) -> Self {
        match LoopStatus::parse(raw) {
            Some(status) => StatusFilter::Is(status),
            None => StatusFilter::Unrecognized(raw.to_string()),
        }
    }

    /// Value bound against the `status` column.
    pub fn as_str(&self) -> &str {
        match self {
            StatusFilter::Is(status) => status.as_str(),
            StatusFilter::Unrecognized(raw) => raw,
        }
    }
}

/// Raw listing parameters as they arrive in a query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoopQueryParams {
    pub archived: Option<bool>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub loop_type: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub limit: Option<u32>,
}

/// A normalized listing request. All filters are AND-combined.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopQuery {
    /// `false` lists live loops, `true` lists the archive.
    pub archived: bool,
    pub status: Option<StatusFilter>,
    pub loop_type: Option<String>,
    pub creator_id: Option<i64>,
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: Option<u32>,
}

impl LoopQuery {
    /// Normalizes raw parameters. Bad sort/order values fall back to the
    /// defaults.
    pub fn from_params(params: &LoopQueryParams) -> Self {
        Self {
            archived: params.archived.unwrap_or(false),
            status: non_blank(params.status.as_deref()).map(StatusFilter::parse),
            loop_type: non_blank(params.loop_type.as_deref()).map(str::to_string),
            creator_id: None,
            search: non_blank(params.search.as_deref()).map(str::to_string),
            sort: params
                .sort
                .as_deref()
                .map(SortField::parse)
                .unwrap_or_default(),
            order: params
                .order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
            limit: params.limit.filter(|l| *l > 0),
        }
    }

    /// Restricts the view to loops owned by `creator_id`.
    pub fn owned_by(mut self, creator_id: i64) -> Self {
        self.creator_id = Some(creator_id);
        self
    }

    /// `ORDER BY` clause for the `l` table alias. Ties break on id so
    /// paging through equal sort keys is stable.
    pub fn order_clause(&self) -> String {
        format!(
            "ORDER BY l.{col} {dir}, l.id {dir}",
            col = self.sort.column(),
            dir = self.order.keyword()
        )
    }

    /// `LIKE` pattern for the search term with wildcards escaped (`\` escape).
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_deref().map(|term| {
            let mut escaped = String::with_capacity(term.len() + 2);
            escaped.push('%');
            for c in term.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
