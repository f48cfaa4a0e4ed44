//! The users table: row type, typed filters, fixture and query evaluation.

use std::borrow::Cow;
use std::cmp::Ordering;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tablesync_core::{FetchResult, FilterKey, FilterSet, FilterValue, Filters, SortOrder, TableState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Moderator => "moderator",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    Inactive,
    Pending,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Inactive => "inactive",
            Status::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: Status,
    pub department: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Text value of a sortable column. Accepts the wire name of each field.
    pub fn sort_text(&self, field: &str) -> Option<Cow<'_, str>> {
        let text = match field {
            "id" => Cow::Borrowed(self.id.as_str()),
            "name" => Cow::Borrowed(self.name.as_str()),
            "email" => Cow::Borrowed(self.email.as_str()),
            "role" => Cow::Borrowed(self.role.as_str()),
            "status" => Cow::Borrowed(self.status.as_str()),
            "department" => Cow::Borrowed(self.department.as_str()),
            "createdAt" | "created_at" => Cow::Owned(self.created_at.to_rfc3339()),
            _ => return None,
        };
        Some(text)
    }

    fn matches_search(&self, needle: &str) -> bool {
        [&self.name, &self.email, &self.department]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

// ── Filters ────────────────────────────────────────────────────────

pub const STATUS: FilterKey = FilterKey::from_static("status");
pub const ROLE: FilterKey = FilterKey::from_static("role");
pub const DEPARTMENT: FilterKey = FilterKey::from_static("department");

/// The filters the users endpoint understands. Other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilters {
    pub status: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
}

impl FilterSet for UserFilters {
    fn from_filters(filters: &Filters) -> Self {
        let text = |key: &FilterKey| filters.get(key.as_str()).map(FilterValue::to_query);
        Self {
            status: text(&STATUS),
            role: text(&ROLE),
            department: text(&DEPARTMENT),
        }
    }

    fn to_filters(&self) -> Filters {
        let mut filters = Filters::new();
        filters.set(&STATUS, self.status.clone().map(FilterValue::from));
        filters.set(&ROLE, self.role.clone().map(FilterValue::from));
        filters.set(&DEPARTMENT, self.department.clone().map(FilterValue::from));
        filters
    }
}

impl UserFilters {
    fn matches(&self, user: &User) -> bool {
        let exact = |want: &Option<String>, have: &str| want.as_deref().is_none_or(|w| w == have);
        exact(&self.status, user.status.as_str())
            && exact(&self.role, user.role.as_str())
            && exact(&self.department, &user.department)
    }
}

// ── Query evaluation ───────────────────────────────────────────────

/// Case-insensitive first, then exact, so the order is total and stable.
fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Search, filter, sort and slice `users` for one table state.
///
/// Sorting is stable; an unknown sort column leaves the order as it was.
/// A page past the end yields no rows.
pub fn query_users(users: &[User], state: &TableState<UserFilters>) -> FetchResult<User> {
    let needle = state.search.to_lowercase();
    let mut hits: Vec<&User> = users
        .iter()
        .filter(|u| needle.is_empty() || u.matches_search(&needle))
        .filter(|u| state.filters.matches(u))
        .collect();

    if !state.sort_by.is_empty() {
        let field = state.sort_by.as_str();
        hits.sort_by(|a, b| match (a.sort_text(field), b.sort_text(field)) {
            (Some(x), Some(y)) => {
                let ord = compare_text(&x, &y);
                match state.sort_order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            }
            _ => Ordering::Equal,
        });
    }

    let total = hits.len() as u64;
    let limit = state.limit.max(1);
    let start = (state.page.max(1) as usize - 1).saturating_mul(limit as usize);
    let data = hits
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .cloned()
        .collect();
    FetchResult::new(data, total, state.page, limit)
}

// ── Fixture ────────────────────────────────────────────────────────

const FIRST_NAMES: [&str; 24] = [
    "Ada", "Alan", "Barbara", "Brian", "Claude", "Dennis", "Donald", "Edsger", "Frances",
    "Grace", "Guido", "Hedy", "John", "Ken", "Leslie", "Linus", "Margaret", "Niklaus", "Radia",
    "Rasmus", "Sophie", "Tim", "Whitfield", "Yukihiro",
];

const LAST_NAMES: [&str; 20] = [
    "Allen", "Backus", "Cerf", "Dijkstra", "Engelbart", "Floyd", "Goldberg", "Hamilton",
    "Hopper", "Kay", "Knuth", "Lamport", "Liskov", "McCarthy", "Perlman", "Ritchie", "Shannon",
    "Thompson", "Turing", "Wirth",
];

pub const DEPARTMENTS: [&str; 10] = [
    "Engineering",
    "Marketing",
    "Sales",
    "Human Resources",
    "Finance",
    "Operations",
    "Customer Support",
    "Product",
    "Design",
    "Legal",
];

/// Deterministic users fixture. Every 25 consecutive rows hold 6 active,
/// 10 inactive and 9 pending users.
pub fn generate_users(count: usize) -> Vec<User> {
    let anchor = Utc
        .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();

    (0..count)
        .map(|i| {
            let first = FIRST_NAMES[(i * 7 + i / FIRST_NAMES.len()) % FIRST_NAMES.len()];
            let last = LAST_NAMES[(i * 11 + i / 3) % LAST_NAMES.len()];
            let role = match i % 10 {
                0 => Role::Admin,
                1 | 2 => Role::Moderator,
                _ => Role::User,
            };
            let status = match i % 25 {
                0..=5 => Status::Active,
                6..=15 => Status::Inactive,
                _ => Status::Pending,
            };
            let hours_ago = ((i * 7919) % (730 * 24)) as i64;

            User {
                id: format!("user-{}", i + 1),
                name: format!("{first} {last}"),
                email: format!(
                    "{}.{}{}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase(),
                    i
                ),
                role,
                status,
                department: DEPARTMENTS[(i * 3 + i / 10) % DEPARTMENTS.len()].to_string(),
                created_at: anchor - TimeDelta::hours(hours_ago),
            }
        })
        .collect()
}
