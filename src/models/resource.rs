use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use sqlx::{FromRow, MySql, MySqlPool, QueryBuilder, mysql::MySqlRow};
use validator::Validate;

use crate::errors::AppResult;
use crate::utils::api_features::{ApiFeatures, Column};

/// A table exposed through the generic CRUD handlers.
///
/// Implementors describe how rows are selected and turned into public
/// documents (`hydrate` is where related records get populated); the
/// provided methods do the querying.
#[async_trait]
pub trait Resource: Serialize + Send + Sync + Sized + 'static {
    type Row: for<'r> FromRow<'r, MySqlRow> + Send + Unpin;
    type Update: DeserializeOwned + Validate + Send + 'static;

    const TABLE: &'static str;
    /// Column list for `SELECT`; secrets never appear here.
    const SELECT: &'static str;
    /// Columns clients may filter and sort on.
    const COLUMNS: &'static [Column];
    /// Predicate applied to every read (hidden or deactivated records).
    const SCOPE: Option<&'static str> = None;

    async fn hydrate(db: &MySqlPool, rows: Vec<Self::Row>) -> AppResult<Vec<Self>>;

    /// Applies a partial update. Returns `false` when no such record exists.
    async fn apply_update(db: &MySqlPool, id: i64, payload: Self::Update) -> AppResult<bool>;

    /// Returns `false` when no such record exists.
    async fn remove(db: &MySqlPool, id: i64) -> AppResult<bool> {
        let mut qb = QueryBuilder::<MySql>::new(format!("DELETE FROM {} WHERE id = ", Self::TABLE));
        qb.push_bind(id);
        if let Some(scope) = Self::SCOPE {
            qb.push(" AND ").push(scope);
        }
        let result = qb.build().execute(db).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_many(
        db: &MySqlPool,
        features: &ApiFeatures,
        parent: Option<(&'static str, i64)>,
    ) -> AppResult<Vec<Self>> {
        let mut qb = features.build_select(Self::SELECT, Self::TABLE, Self::SCOPE, parent);
        let rows = qb.build_query_as::<Self::Row>().fetch_all(db).await?;
        Self::hydrate(db, rows).await
    }

    /// `SELECT .. WHERE id = ?`, narrowed by `SCOPE` when `scoped` is set.
    fn select_by_id(id: i64, scoped: bool) -> QueryBuilder<'static, MySql> {
        let mut qb = QueryBuilder::<MySql>::new(format!(
            "SELECT {} FROM {} WHERE id = ",
            Self::SELECT,
            Self::TABLE
        ));
        qb.push_bind(id);
        if let Some(scope) = Self::SCOPE.filter(|_| scoped) {
            qb.push(" AND ").push(scope);
        }
        qb
    }

    async fn fetch_by_id(db: &MySqlPool, id: i64, scoped: bool) -> AppResult<Option<Self>> {
        let mut qb = Self::select_by_id(id, scoped);
        let row = qb.build_query_as::<Self::Row>().fetch_optional(db).await?;
        match row {
            Some(row) => Ok(Self::hydrate(db, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_id(db: &MySqlPool, id: i64) -> AppResult<Option<Self>> {
        Self::fetch_by_id(db, id, true).await
    }

    /// Reads a record back right after writing it. A write may move the
    /// record out of scope (a tour turned secret) and must still answer with it.
    async fn find_written(db: &MySqlPool, id: i64) -> AppResult<Option<Self>> {
        Self::fetch_by_id(db, id, false).await
    }

    /// `find_by_id` plus whatever a single-document read populates (a tour's reviews).
    async fn find_one_populated(db: &MySqlPool, id: i64) -> AppResult<Option<Self>> {
        Self::find_by_id(db, id).await
    }
}

/// Resources the generic `create_one` handler may insert.
#[async_trait]
pub trait Creatable: Resource {
    type Create: DeserializeOwned + Validate + Send + 'static;

    /// Inserts the record and returns its id.
    async fn insert(db: &MySqlPool, payload: Self::Create) -> AppResult<i64>;
}

/// Appends `(?, ?, ...)` for an id list. Callers guarantee `ids` is non-empty.
pub fn push_id_list<'a>(qb: &mut QueryBuilder<'a, MySql>, ids: &[i64]) {
    qb.push("(");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

pub fn unique_ids(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
