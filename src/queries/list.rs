use rusqlite::types::Value;
use rusqlite::params_from_iter;
use serde::Serialize;

use super::QueryError;
use crate::db::clients::CLIENT_COLUMNS;
use crate::db::{ClientDb, DbClient};

pub const DEFAULT_PER_PAGE: usize = 25;

/// Rows whose canonical key is shared by at least one other row.
const IN_DUPLICATE_GROUP: &str = "canonical_key(company_name, email, phone_number) IN (
        SELECT canonical_key(company_name, email, phone_number)
        FROM clients GROUP BY 1 HAVING COUNT(*) > 1
    )";

/// Columns the listing may be ordered by. Unknown names fall back to `id`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Id,
    CompanyName,
    Email,
    PhoneNumber,
    CreatedAt,
    UpdatedAt,
}

impl SortColumn {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "company_name" => Self::CompanyName,
            "email" => Self::Email,
            "phone_number" => Self::PhoneNumber,
            "created_at" => Self::CreatedAt,
            "updated_at" => Self::UpdatedAt,
            _ => Self::Id,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CompanyName => "company_name",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// `asc`/`desc` in any case; anything else is `Desc`.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientFilter {
    pub search: Option<String>,
    pub duplicates_only: bool,
    pub sort_by: SortColumn,
    pub sort_direction: SortDirection,
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl Default for ClientFilter {
    fn default() -> Self {
        Self {
            search: None,
            duplicates_only: false,
            sort_by: SortColumn::default(),
            sort_direction: SortDirection::default(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientPage {
    pub data: Vec<DbClient>,
    pub total: i64,
    pub page: usize,
    pub per_page: usize,
    pub last_page: usize,
}

/// Filtered, sorted, paginated listing of the client table.
pub fn list_clients(db: &ClientDb, filter: &ClientFilter) -> Result<ClientPage, QueryError> {
    let per_page = filter.per_page.max(1);
    let page = filter.page.max(1);

    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(company_name LIKE ?1 OR email LIKE ?1 OR phone_number LIKE ?1)");
        values.push(Value::Text(format!("%{search}%")));
    }
    if filter.duplicates_only {
        clauses.push(IN_DUPLICATE_GROUP);
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = db.conn_ref().query_row(
        &format!("SELECT COUNT(*) FROM clients {where_sql}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let last_page = (total.max(0) as usize).div_ceil(per_page).max(1);
    let offset = (page - 1)
        .checked_mul(per_page)
        .and_then(|n| i64::try_from(n).ok())
        .filter(|n| *n < total);
    let Some(offset) = offset else {
        return Ok(ClientPage {
            data: Vec::new(),
            total,
            page,
            per_page,
            last_page,
        });
    };

    // Ties on the sort column are broken by id so pages are stable.
    let limit_param = values.len() + 1;
    let sql = format!(
        "SELECT {CLIENT_COLUMNS} FROM clients {where_sql}
         ORDER BY {col} {dir}, id {dir}
         LIMIT ?{limit_param} OFFSET ?{offset_param}",
        col = filter.sort_by.column(),
        dir = filter.sort_direction.sql(),
        offset_param = limit_param + 1,
    );
    values.push(Value::Integer(i64::try_from(per_page).unwrap_or(i64::MAX)));
    values.push(Value::Integer(offset));

    let mut stmt = db.conn_ref().prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), ClientDb::map_client_row)?;
    let data = rows.collect::<Result<Vec<_>, _>>()?;

    Ok(ClientPage {
        data,
        total,
        page,
        per_page,
        last_page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_db, NewClient};

    fn seed(db: &ClientDb) -> Vec<i64> {
        let rows = [
            ("Beta Corp", Some("ops@beta.io"), None),
            ("Acme", Some("a@acme.com"), Some("555-0100")),
            ("acme", Some("A@ACME.COM"), Some("5550100")),
            ("Gamma", None, Some("777")),
        ];
        let clients: Vec<NewClient> = rows
            .iter()
            .map(|(c, e, p)| NewClient {
                company_name: c.to_string(),
                email: e.map(str::to_string),
                phone_number: p.map(str::to_string),
                meta: None,
            })
            .collect();
        db.insert_clients(&clients, "seed", "2025-01-01T00:00:00+00:00")
            .expect("seed")
    }

    #[test]
    fn test_default_sort_is_id_desc() {
        let db = test_db();
        let ids = seed(&db);
        let page = list_clients(&db, &ClientFilter::default()).expect("list");
        assert_eq!(page.total, 4);
        assert_eq!(page.last_page, 1);
        let got: Vec<i64> = page.data.iter().map(|c| c.id).collect();
        let mut want = ids.clone();
        want.reverse();
        assert_eq!(got, want);
    }

    #[test]
    fn test_search_and_sort_by_company() {
        let db = test_db();
        seed(&db);
        let filter = ClientFilter {
            search: Some("acme".to_string()),
            sort_by: SortColumn::parse("company_name"),
            sort_direction: SortDirection::parse("ASC"),
            ..ClientFilter::default()
        };
        let page = list_clients(&db, &filter).expect("list");
        assert_eq!(page.total, 2);
        assert!(page
            .data
            .iter()
            .all(|c| c.company_name.eq_ignore_ascii_case("acme")));
    }

    #[test]
    fn test_search_matches_phone() {
        let db = test_db();
        seed(&db);
        let filter = ClientFilter {
            search: Some("777".to_string()),
            ..ClientFilter::default()
        };
        let page = list_clients(&db, &filter).expect("list");
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].company_name, "Gamma");
    }

    #[test]
    fn test_unknown_sort_falls_back() {
        assert_eq!(SortColumn::parse("password; DROP TABLE"), SortColumn::Id);
        assert_eq!(SortDirection::parse("sideways"), SortDirection::Desc);
    }

    #[test]
    fn test_duplicates_only() {
        let db = test_db();
        let ids = seed(&db);
        let filter = ClientFilter {
            duplicates_only: true,
            sort_direction: SortDirection::Asc,
            ..ClientFilter::default()
        };
        let page = list_clients(&db, &filter).expect("list");
        assert_eq!(
            page.data.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![ids[1], ids[2]]
        );
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let db = test_db();
        seed(&db);
        for page in [3, usize::MAX, (i64::MAX / 25) as usize + 2] {
            let filter = ClientFilter {
                page,
                ..ClientFilter::default()
            };
            let result = list_clients(&db, &filter).expect("list");
            assert!(result.data.is_empty(), "page {page}");
            assert_eq!(result.total, 4);
            assert_eq!(result.last_page, 1);
        }
    }

    #[test]
    fn test_huge_per_page_returns_everything() {
        let db = test_db();
        seed(&db);
        let filter = ClientFilter {
            per_page: usize::MAX,
            search: Some("acme".to_string()),
            ..ClientFilter::default()
        };
        let page = list_clients(&db, &filter).expect("list");
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.last_page, 1);
    }

    #[test]
    fn test_pagination() {
        let db = test_db();
        let ids = seed(&db);
        let filter = ClientFilter {
            per_page: 3,
            page: 2,
            sort_direction: SortDirection::Asc,
            ..ClientFilter::default()
        };
        let page = list_clients(&db, &filter).expect("list");
        assert_eq!(page.last_page, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].id, ids[3]);
    }
}
