//! Database query operations for Klinika
//!
//! Every resource shares one set of generic queries. A [`PgResource`] impl
//! supplies the relation to read from, the writable columns and the values to
//! bind for them; the functions here build the SQL with [`QueryBuilder`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use klinika_core::{
    Error, Key, Page, PageRequest, RecordId, Resource, Result,
    resource::validate_payload,
    types::{
        Block, HelpCenter, HelpCenterCategory, Reservation, Role, ServiceDesk, Specialization,
        User,
    },
};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    BlockRow, HelpCenterCategoryRow, HelpCenterRow, ReservationRow, ServiceDeskRow,
    SpecializationRow, UserAccountRow,
};

/// A value bound to one writable column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// `INTEGER`
    Int(i32),
    /// Nullable `INTEGER`
    NullableInt(Option<i32>),
    /// `VARCHAR`
    Text(String),
    /// `UUID`
    Uuid(Uuid),
    /// Nullable `UUID`
    NullableUuid(Option<Uuid>),
    /// `DATE`
    Date(NaiveDate),
    /// `TIMESTAMPTZ`
    Timestamp(DateTime<Utc>),
}

impl From<Key> for SqlValue {
    fn from(key: Key) -> Self {
        match key {
            Key::Int(id) => Self::Int(id),
            Key::Uuid(id) => Self::Uuid(id),
        }
    }
}

/// A resource stored in `PostgreSQL`
#[async_trait]
pub trait PgResource: Resource {
    /// Row type decoded from [`PgResource::SOURCE`]
    type Row: for<'r> FromRow<'r, PgRow> + Send + Unpin;

    /// Relation rows are read from, a table or a view
    const SOURCE: &'static str;

    /// Writable columns of [`Resource::TABLE`], excluding `id`
    const COLUMNS: &'static [&'static str];

    /// Columns matched by the search term
    const SEARCH_COLUMNS: &'static [&'static str];

    /// Values for [`PgResource::COLUMNS`], in the same order
    fn values(&self) -> Vec<SqlValue>;

    /// Convert a decoded row into the entity
    ///
    /// # Errors
    ///
    /// Returns an error if the row holds a value the entity cannot represent.
    fn from_row(row: Self::Row) -> Result<Self>;

    /// Write rows that live outside [`Resource::TABLE`], inside the same transaction
    async fn after_write(&self, _conn: &mut PgConnection) -> Result<()> {
        Ok(())
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: SqlValue) {
    match value {
        SqlValue::Int(v) => {
            qb.push_bind(v);
        }
        SqlValue::NullableInt(v) => {
            qb.push_bind(v);
        }
        SqlValue::Text(v) => {
            qb.push_bind(v);
        }
        SqlValue::Uuid(v) => {
            qb.push_bind(v);
        }
        SqlValue::NullableUuid(v) => {
            qb.push_bind(v);
        }
        SqlValue::Date(v) => {
            qb.push_bind(v);
        }
        SqlValue::Timestamp(v) => {
            qb.push_bind(v);
        }
    }
}

fn push_key(qb: &mut QueryBuilder<'_, Postgres>, key: Key) {
    push_value(qb, SqlValue::from(key));
}

/// Bind keys of one type as a single array parameter
fn push_key_array(qb: &mut QueryBuilder<'_, Postgres>, keys: &[Key]) {
    let ints: Option<Vec<i32>> = keys
        .iter()
        .map(|key| match key {
            Key::Int(id) => Some(*id),
            Key::Uuid(_) => None,
        })
        .collect();
    if let Some(ints) = ints {
        qb.push_bind(ints);
        return;
    }
    let uuids: Vec<Uuid> = keys
        .iter()
        .filter_map(|key| match key {
            Key::Uuid(id) => Some(*id),
            Key::Int(_) => None,
        })
        .collect();
    qb.push_bind(uuids);
}

fn row_id<I: RecordId>(row: &PgRow) -> Result<I> {
    let key = if I::SEQUENTIAL {
        Key::Int(row.try_get("id").map_err(|e| Error::Database(e.to_string()))?)
    } else {
        Key::Uuid(row.try_get("id").map_err(|e| Error::Database(e.to_string()))?)
    };
    I::from_key(key).ok_or_else(|| Error::Database(format!("unexpected id type {key}")))
}

/// Escape `%`, `_` and `\` so the term matches literally inside `ILIKE`
#[must_use]
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, columns: &[&str], term: Option<&str>) {
    let Some(term) = term else {
        return;
    };
    if columns.is_empty() {
        return;
    }
    let pattern = format!("%{}%", escape_like(term));
    qb.push(" WHERE (");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column);
        qb.push(" ILIKE ");
        qb.push_bind(pattern.clone());
    }
    qb.push(")");
}

fn to_camel_case(snake: &str) -> String {
    let mut out = String::with_capacity(snake.len());
    let mut upper = false;
    for c in snake.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Payload field named by a constraint such as `help_centers_category_id_fkey`
#[must_use]
pub fn constraint_field(table: &str, constraint: &str) -> String {
    let column = ["_fkey", "_key", "_check", "_pkey"]
        .iter()
        .find_map(|suffix| constraint.strip_suffix(suffix))
        .unwrap_or(constraint);
    let column = column
        .strip_prefix(table)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(column);
    to_camel_case(column)
}

/// Map a sqlx error, turning constraint violations into validation errors
#[must_use]
pub fn map_db_error(table: &str, err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        let field = db
            .constraint()
            .map_or_else(|| "payload".to_string(), |c| constraint_field(table, c));
        match db.code().as_deref() {
            Some("23503") => return Error::validation(field, "referenced record does not exist"),
            Some("23505") => return Error::validation(field, "value is already taken"),
            Some("23514") => return Error::validation(field, "value is not allowed"),
            _ => {}
        }
    }
    Error::Database(err.to_string())
}

async fn fetch_by_id<R: PgResource>(conn: &mut PgConnection, id: R::Id) -> Result<R> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {} WHERE id = ", R::SOURCE));
    push_key(&mut qb, id.key());

    let row = qb
        .build_query_as::<R::Row>()
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    row.map_or_else(|| Err(Error::not_found(R::NAME, id)), R::from_row)
}

/// Fetch one page of records, filtered by the request's search term
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn paginate<R: PgResource>(pool: &PgPool, request: &PageRequest) -> Result<Page<R>> {
    let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", R::SOURCE));
    push_search(&mut count, R::SEARCH_COLUMNS, request.search_term());
    let total: i64 = count
        .build_query_scalar()
        .fetch_one(pool)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    let (limit, offset) = request.to_sql();
    let mut select = QueryBuilder::new(format!("SELECT * FROM {}", R::SOURCE));
    push_search(&mut select, R::SEARCH_COLUMNS, request.search_term());
    select.push(" ORDER BY id LIMIT ");
    select.push_bind(limit);
    select.push(" OFFSET ");
    select.push_bind(offset);

    let rows = select
        .build_query_as::<R::Row>()
        .fetch_all(pool)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;
    let data = rows
        .into_iter()
        .map(R::from_row)
        .collect::<Result<Vec<_>>>()?;

    debug!(resource = R::NAME, total, returned = data.len(), "Fetched page");
    Ok(Page::new(data, u64::try_from(total).unwrap_or(0), request))
}

/// Fetch every record, ordered by id
///
/// # Errors
///
/// Returns an error if the database query fails.
pub async fn list_all<R: PgResource>(pool: &PgPool) -> Result<Vec<R>> {
    let mut select = QueryBuilder::new(format!("SELECT * FROM {} ORDER BY id", R::SOURCE));
    let rows = select
        .build_query_as::<R::Row>()
        .fetch_all(pool)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;
    rows.into_iter().map(R::from_row).collect()
}

/// Find a record by id
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no record has this id.
pub async fn find_by_id<R: PgResource>(pool: &PgPool, id: R::Id) -> Result<R> {
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
    fetch_by_id::<R>(&mut conn, id).await
}

/// Validate a payload and insert the resulting record
///
/// # Errors
///
/// Returns a validation error for an invalid payload, a missing referenced
/// record or a duplicate unique value.
pub async fn insert<R: PgResource>(pool: &PgPool, payload: R::Payload) -> Result<R> {
    validate_payload(&payload)?;
    let draft = R::create(R::Id::assign(0), payload, Utc::now())?;

    let mut columns: Vec<&str> = Vec::with_capacity(R::COLUMNS.len() + 1);
    let mut values = Vec::with_capacity(R::COLUMNS.len() + 1);
    if !R::Id::SEQUENTIAL {
        columns.push("id");
        values.push(SqlValue::from(draft.id().key()));
    }
    columns.extend_from_slice(R::COLUMNS);
    values.extend(draft.values());

    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", R::TABLE));
    qb.push(columns.join(", "));
    qb.push(") VALUES (");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(") RETURNING id");

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let row = qb
        .build()
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    let id = if R::Id::SEQUENTIAL {
        let raw: i32 = row
            .try_get("id")
            .map_err(|e| Error::Database(e.to_string()))?;
        R::Id::from_key(Key::Int(raw))
            .ok_or_else(|| Error::Database(format!("unexpected id type for {}", R::NAME)))?
    } else {
        draft.id()
    };

    draft.after_write(&mut tx).await?;
    let created = fetch_by_id::<R>(&mut tx, id).await?;

    tx.commit()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(created)
}

/// Validate a payload and overwrite the record's mutable fields
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no record has this id, or a validation error.
pub async fn update<R: PgResource>(pool: &PgPool, id: R::Id, payload: R::Payload) -> Result<R> {
    validate_payload(&payload)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    let mut record = fetch_by_id::<R>(&mut tx, id).await?;
    record.apply(payload)?;

    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", R::TABLE));
    for (i, (column, value)) in R::COLUMNS.iter().zip(record.values()).enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(*column);
        qb.push(" = ");
        push_value(&mut qb, value);
    }
    qb.push(" WHERE id = ");
    push_key(&mut qb, id.key());

    qb.build()
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    record.after_write(&mut tx).await?;
    let updated = fetch_by_id::<R>(&mut tx, id).await?;

    tx.commit()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    Ok(updated)
}

/// Delete a record; dependants go with it through `ON DELETE CASCADE`
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no record has this id.
pub async fn delete<R: PgResource>(pool: &PgPool, id: R::Id) -> Result<()> {
    let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ", R::TABLE));
    push_key(&mut qb, id.key());

    let result = qb
        .build()
        .execute(pool)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    if result.rows_affected() == 0 {
        return Err(Error::not_found(R::NAME, id));
    }
    Ok(())
}

/// Delete several records in one transaction
///
/// All-or-nothing: if any id is missing nothing is deleted and the first
/// missing id is reported. Duplicate ids count once.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for the first missing id.
pub async fn bulk_delete<R: PgResource>(pool: &PgPool, ids: &[R::Id]) -> Result<u64> {
    let unique: BTreeSet<R::Id> = ids.iter().copied().collect();
    if unique.is_empty() {
        return Ok(0);
    }
    let keys: Vec<Key> = unique.iter().map(RecordId::key).collect();

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    // Check the whole set first; cascades may remove requested rows mid-delete
    let mut qb = QueryBuilder::new(format!("SELECT id FROM {} WHERE id = ANY(", R::TABLE));
    push_key_array(&mut qb, &keys);
    qb.push(") FOR UPDATE");
    let rows = qb
        .build()
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    let mut found = BTreeSet::new();
    for row in &rows {
        found.insert(row_id::<R::Id>(row)?);
    }
    if let Some(missing) = unique.iter().find(|id| !found.contains(*id)) {
        return Err(Error::not_found(R::NAME, missing));
    }

    let mut qb = QueryBuilder::new(format!("DELETE FROM {} WHERE id = ANY(", R::TABLE));
    push_key_array(&mut qb, &keys);
    qb.push(")");
    let result = qb
        .build()
        .execute(&mut *tx)
        .await
        .map_err(|e| map_db_error(R::TABLE, e))?;

    tx.commit()
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

    debug!("Bulk deleted {} {} rows", result.rows_affected(), R::NAME);
    Ok(u64::try_from(unique.len()).unwrap_or(u64::MAX))
}

#[async_trait]
impl PgResource for HelpCenterCategory {
    type Row = HelpCenterCategoryRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &["name", "created_by", "creation_date"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "created_by"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.created_by.clone()),
            SqlValue::Timestamp(self.creation_date),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}

#[async_trait]
impl PgResource for HelpCenter {
    type Row = HelpCenterRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "name",
        "email",
        "subject",
        "message",
        "creation_date",
        "category_id",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "email", "subject", "message"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.subject.clone()),
            SqlValue::Text(self.message.clone()),
            SqlValue::Timestamp(self.creation_date),
            SqlValue::Int(self.category_id),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}

#[async_trait]
impl PgResource for Specialization {
    type Row = SpecializationRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &["name", "created_by", "creation_date"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "created_by"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.created_by.clone()),
            SqlValue::Timestamp(self.creation_date),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}

#[async_trait]
impl PgResource for Block {
    type Row = BlockRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &["name", "parent_block_id", "specialization_id"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::NullableInt(self.parent_block_id),
            SqlValue::Int(self.specialization_id),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}

#[async_trait]
impl PgResource for ServiceDesk {
    type Row = ServiceDeskRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &["name", "email", "operating_hours", "block_id"];
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "email", "operating_hours"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.name.clone()),
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.operating_hours.clone()),
            SqlValue::Int(self.block_id),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}

#[async_trait]
impl PgResource for User {
    type Row = UserAccountRow;

    const SOURCE: &'static str = "user_accounts";
    const COLUMNS: &'static [&'static str] = &[
        "email",
        "first_name",
        "last_name",
        "gender",
        "birth_date",
        "role",
        "password_hash",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["email", "first_name", "last_name"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(self.email.clone()),
            SqlValue::Text(self.first_name.clone()),
            SqlValue::Text(self.last_name.clone()),
            SqlValue::Text(self.gender.clone()),
            SqlValue::Date(self.birth_date),
            SqlValue::Text(self.role.as_str().to_string()),
            SqlValue::Text(self.password_hash.clone()),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Self::try_from(row)
    }

    /// Keep exactly one profile row, the one for the current role
    async fn after_write(&self, conn: &mut PgConnection) -> Result<()> {
        for role in Role::ALL {
            if role == self.role {
                continue;
            }
            let sql = format!("DELETE FROM {} WHERE id = $1", role.profile_table());
            sqlx::query(&sql)
                .bind(self.id)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_db_error(role.profile_table(), e))?;
        }

        let table = self.role.profile_table();
        let sql = match self.role {
            Role::Patient => {
                format!("INSERT INTO {table} (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            }
            Role::PrimaryCareDoctor | Role::SpecializedDoctor => format!(
                "INSERT INTO {table} (id, specialization_id) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET specialization_id = EXCLUDED.specialization_id"
            ),
            Role::Administrator => format!(
                "INSERT INTO {table} (id, service_desk_id) VALUES ($1, $2) \
                 ON CONFLICT (id) DO UPDATE SET service_desk_id = EXCLUDED.service_desk_id"
            ),
        };

        let query = sqlx::query(&sql).bind(self.id);
        let query = match self.role {
            Role::Patient => query,
            Role::PrimaryCareDoctor | Role::SpecializedDoctor => query.bind(self.specialization_id),
            Role::Administrator => query.bind(self.service_desk_id),
        };
        query
            .execute(&mut *conn)
            .await
            .map_err(|e| map_db_error(table, e))?;

        Ok(())
    }
}

#[async_trait]
impl PgResource for Reservation {
    type Row = ReservationRow;

    const SOURCE: &'static str = Self::TABLE;
    const COLUMNS: &'static [&'static str] = &[
        "patient_id",
        "specialization_id",
        "doctor_id",
        "reason_of_consult",
        "appointment_date",
        "creation_date",
    ];
    const SEARCH_COLUMNS: &'static [&'static str] = &["reason_of_consult"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.patient_id),
            SqlValue::Int(self.specialization_id),
            SqlValue::NullableUuid(self.doctor_id),
            SqlValue::Text(self.reason_of_consult.clone()),
            SqlValue::Timestamp(self.appointment_date),
            SqlValue::Timestamp(self.creation_date),
        ]
    }

    fn from_row(row: Self::Row) -> Result<Self> {
        Ok(row.into())
    }
}
