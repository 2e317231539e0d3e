//! Read/update surface over the synced tables, consumed by UI collaborators

use crate::conf::serialization::now_millis;
use crate::conf::store::entities::{
    blocks, hashtags, my_schedule, rooms, sessions, speakers, tags, videos,
};
use anyhow::{Context, Result};
use sea_orm::{
    DatabaseConnection, DbBackend, EntityTrait, FromQueryResult, QueryOrder, Statement, Value,
};
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

#[derive(Debug, FromQueryResult)]
struct CountResult {
    n: i64,
}

pub struct ScheduleQueries {
    db: DatabaseConnection,
    pool: Pool<Sqlite>,
}

impl ScheduleQueries {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            db: crate::conf::db::sea_orm_connection(&pool),
            pool,
        }
    }

    /// All sessions by start time, then grouping order
    pub async fn sessions(&self) -> Result<Vec<sessions::Model>> {
        sessions::Entity::find()
            .order_by_asc(sessions::Column::StartMillis)
            .order_by_asc(sessions::Column::GroupingOrder)
            .order_by_asc(sessions::Column::Title)
            .all(&self.db)
            .await
            .context("failed to list sessions")
    }

    pub async fn session(&self, id: &str) -> Result<Option<sessions::Model>> {
        sessions::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("failed to load session {}", id))
    }

    pub async fn speakers(&self) -> Result<Vec<speakers::Model>> {
        speakers::Entity::find()
            .order_by_asc(speakers::Column::Name)
            .all(&self.db)
            .await
            .context("failed to list speakers")
    }

    pub async fn speaker(&self, id: &str) -> Result<Option<speakers::Model>> {
        speakers::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("failed to load speaker {}", id))
    }

    pub async fn rooms(&self) -> Result<Vec<rooms::Model>> {
        rooms::Entity::find()
            .order_by_asc(rooms::Column::Name)
            .all(&self.db)
            .await
            .context("failed to list rooms")
    }

    pub async fn room(&self, id: &str) -> Result<Option<rooms::Model>> {
        rooms::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("failed to load room {}", id))
    }

    pub async fn tags(&self) -> Result<Vec<tags::Model>> {
        tags::Entity::find()
            .order_by_asc(tags::Column::Category)
            .order_by_asc(tags::Column::OrderInCategory)
            .order_by_asc(tags::Column::Name)
            .all(&self.db)
            .await
            .context("failed to list tags")
    }

    pub async fn tag(&self, id: &str) -> Result<Option<tags::Model>> {
        tags::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("failed to load tag {}", id))
    }

    pub async fn blocks(&self) -> Result<Vec<blocks::Model>> {
        blocks::Entity::find()
            .order_by_asc(blocks::Column::StartMillis)
            .all(&self.db)
            .await
            .context("failed to list blocks")
    }

    pub async fn hashtags(&self) -> Result<Vec<hashtags::Model>> {
        hashtags::Entity::find()
            .order_by_asc(hashtags::Column::Ordering)
            .all(&self.db)
            .await
            .context("failed to list hashtags")
    }

    pub async fn videos(&self) -> Result<Vec<videos::Model>> {
        videos::Entity::find()
            .order_by_desc(videos::Column::Year)
            .order_by_asc(videos::Column::Title)
            .all(&self.db)
            .await
            .context("failed to list videos")
    }

    pub async fn speakers_of_session(&self, session_id: &str) -> Result<Vec<speakers::Model>> {
        let sql = r#"
            SELECT sp.* FROM speakers sp
            INNER JOIN session_speakers ss ON ss.speaker_id = sp.id
            WHERE ss.session_id = ?
            ORDER BY sp.name
        "#;
        speakers::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            vec![session_id.into()],
        ))
        .all(&self.db)
        .await
        .with_context(|| format!("failed to load speakers of session {}", session_id))
    }

    pub async fn tags_of_session(&self, session_id: &str) -> Result<Vec<tags::Model>> {
        let sql = r#"
            SELECT t.* FROM tags t
            INNER JOIN session_tags st ON st.tag_id = t.id
            WHERE st.session_id = ?
            ORDER BY t.category, t.order_in_category
        "#;
        tags::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            vec![session_id.into()],
        ))
        .all(&self.db)
        .await
        .with_context(|| format!("failed to load tags of session {}", session_id))
    }

    /// Number of distinct categories among `tag_ids`, never less than 1
    pub async fn categories_in_use(&self, tag_ids: &[String]) -> Result<i64> {
        if tag_ids.is_empty() {
            return Ok(1);
        }
        let sql = format!(
            "SELECT COUNT(DISTINCT category) AS n FROM tags WHERE id IN ({})",
            placeholders(tag_ids.len())
        );
        let count = CountResult::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            string_values(tag_ids),
        ))
        .one(&self.db)
        .await
        .context("failed to count tag categories")?
        .map(|r| r.n)
        .unwrap_or(0);
        Ok(count.max(1))
    }

    /// Sessions carrying at least one selected tag in every category in use.
    ///
    /// Tags of the same category are OR-ed, categories are AND-ed. An empty
    /// selection returns every session.
    pub async fn sessions_with_tags(&self, tag_ids: &[String]) -> Result<Vec<sessions::Model>> {
        if tag_ids.is_empty() {
            return self.sessions().await;
        }
        let categories = self.categories_in_use(tag_ids).await?;
        let sql = format!(
            r#"
            SELECT s.* FROM sessions s
            INNER JOIN session_tags st ON st.session_id = s.id
            INNER JOIN tags t ON t.id = st.tag_id
            WHERE st.tag_id IN ({})
            GROUP BY s.id
            HAVING COUNT(DISTINCT t.category) >= ?
            ORDER BY s.start_millis, s.grouping_order, s.title
            "#,
            placeholders(tag_ids.len())
        );
        let mut values = string_values(tag_ids);
        values.push(categories.into());

        let found = sessions::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            values,
        ))
        .all(&self.db)
        .await
        .context("failed to filter sessions by tags")?;
        debug!(
            "[Queries] {} sessions match {} tags over {} categories",
            found.len(),
            tag_ids.len(),
            categories
        );
        Ok(found)
    }

    /// Case-insensitive substring search over the session search index
    pub async fn search_sessions(&self, query: &str) -> Result<Vec<sessions::Model>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let sql = r#"
            SELECT s.* FROM sessions s
            INNER JOIN search_index si ON si.session_id = s.id
            WHERE si.body LIKE '%' || ? || '%'
            ORDER BY s.start_millis, s.title
        "#;
        sessions::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            vec![needle.into()],
        ))
        .all(&self.db)
        .await
        .context("failed to search sessions")
    }

    /// Add or remove a session from the attendee's schedule
    pub async fn set_in_schedule(&self, session_id: &str, in_schedule: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO my_schedule (session_id, in_schedule, updated_millis)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                in_schedule = excluded.in_schedule,
                updated_millis = excluded.updated_millis
            "#,
        )
        .bind(session_id)
        .bind(if in_schedule { 1 } else { 0 })
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update schedule for {}", session_id))?;
        info!("[Queries] session {} in schedule: {}", session_id, in_schedule);
        Ok(())
    }

    pub async fn is_in_schedule(&self, session_id: &str) -> Result<bool> {
        let row = my_schedule::Entity::find_by_id(session_id.to_string())
            .one(&self.db)
            .await
            .with_context(|| format!("failed to load schedule of {}", session_id))?;
        Ok(row.map(|r| r.in_schedule != 0).unwrap_or(false))
    }

    /// Sessions in the attendee's schedule that still exist
    pub async fn my_schedule(&self) -> Result<Vec<sessions::Model>> {
        let sql = r#"
            SELECT s.* FROM sessions s
            INNER JOIN my_schedule ms ON ms.session_id = s.id
            WHERE ms.in_schedule = 1
            ORDER BY s.start_millis, s.title
        "#;
        sessions::Model::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            Vec::<Value>::new(),
        ))
        .all(&self.db)
        .await
        .context("failed to load my schedule")
    }
}

/// Rebuild `search_index` from the sessions table; returns the number of rows indexed
pub async fn rebuild_search_index(pool: &Pool<Sqlite>) -> Result<u64> {
    let mut tx = pool.begin().await.context("failed to begin search index rebuild")?;
    sqlx::query("DELETE FROM search_index")
        .execute(&mut *tx)
        .await
        .context("failed to clear search index")?;
    let result = sqlx::query(
        r#"
        INSERT INTO search_index (session_id, body)
        SELECT id, lower(title || ' ' || description || ' ' || speaker_names || ' '
                         || hashtag || ' ' || replace(tags, ',', ' '))
        FROM sessions
        "#,
    )
    .execute(&mut *tx)
    .await
    .context("failed to fill search index")?;
    tx.commit().await.context("failed to commit search index")?;
    Ok(result.rows_affected())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn string_values(values: &[String]) -> Vec<Value> {
    values.iter().map(|v| v.clone().into()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::batch::{ConferenceDataImporter, ImportMode};
    use crate::conf::db::memory_pool;
    use crate::conf::parser::ParserConfig;
    use crate::conf::store::dao::{ApplyOrigin, ScheduleStore};
    use crate::conf::store::listener::SearchIndexUpdater;
    use std::sync::Arc;

    fn conference() -> serde_json::Value {
        serde_json::json!({
            "tags": [
                {"tag": "TOPIC_ANDROID", "category": "TOPIC", "name": "Android"},
                {"tag": "TOPIC_CHROME", "category": "TOPIC", "name": "Chrome"},
                {"tag": "TYPE_SESSION", "category": "TYPE", "name": "Session", "order_in_category": 2}
            ],
            "speakers": [{"id": "sp1", "name": "Ada Lovelace"}],
            "sessions": [
                {"id": "s1", "title": "Android internals", "tags": ["TOPIC_ANDROID", "TYPE_SESSION"], "speakers": ["sp1"]},
                {"id": "s2", "title": "Chrome apps", "tags": ["TOPIC_CHROME"]},
                {"id": "s3", "title": "Lunch"}
            ]
        })
    }

    async fn load(body: serde_json::Value, mode: ImportMode) -> (ScheduleStore, ScheduleQueries) {
        let pool = memory_pool().await;
        let store = ScheduleStore::new(pool.clone())
            .with_listener(Arc::new(SearchIndexUpdater::new(pool.clone())));
        apply(&store, body, mode).await;
        (store, ScheduleQueries::new(pool))
    }

    async fn apply(store: &ScheduleStore, body: serde_json::Value, mode: ImportMode) {
        let mut imp = ConferenceDataImporter::new(ParserConfig::new());
        imp.add_body("conf.json", &body.to_string()).unwrap();
        let (batch, _) = imp.build_batch(store, mode).await.unwrap();
        store.apply(&batch, ApplyOrigin::Sync).await.unwrap();
    }

    fn ids(sessions: &[sessions::Model]) -> Vec<&str> {
        sessions.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn tag_filter_ands_categories_and_ors_within_one() {
        let (_store, q) = load(conference(), ImportMode::Full).await;

        let any_topic = q
            .sessions_with_tags(&["TOPIC_ANDROID".into(), "TOPIC_CHROME".into()])
            .await
            .unwrap();
        assert_eq!(ids(&any_topic), vec!["s1", "s2"]);

        let topic_and_type = q
            .sessions_with_tags(&["TOPIC_CHROME".into(), "TYPE_SESSION".into()])
            .await
            .unwrap();
        assert!(topic_and_type.is_empty());

        assert_eq!(q.sessions_with_tags(&[]).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn categories_in_use_never_drops_below_one() {
        let (_store, q) = load(conference(), ImportMode::Full).await;
        assert_eq!(q.categories_in_use(&[]).await.unwrap(), 1);
        assert_eq!(q.categories_in_use(&["UNKNOWN".into()]).await.unwrap(), 1);
        assert_eq!(
            q.categories_in_use(&["TOPIC_CHROME".into(), "TYPE_SESSION".into()])
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn session_detail_joins_speakers_and_tags() {
        let (_store, q) = load(conference(), ImportMode::Full).await;
        let s1 = q.session("s1").await.unwrap().unwrap();
        assert_eq!(s1.speaker_names, "Ada Lovelace");
        assert_eq!(s1.grouping_order, 2);
        assert_eq!(q.speakers_of_session("s1").await.unwrap().len(), 1);
        assert_eq!(q.tags_of_session("s1").await.unwrap().len(), 2);
        assert!(q.session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_index_follows_session_changes() {
        let (_store, q) = load(conference(), ImportMode::Full).await;
        assert_eq!(ids(&q.search_sessions("LOVELACE").await.unwrap()), vec!["s1"]);
        assert_eq!(ids(&q.search_sessions("chrome").await.unwrap()), vec!["s2"]);
        assert!(q.search_sessions("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn schedule_survives_full_reload() {
        let (store, q) = load(conference(), ImportMode::Full).await;
        q.set_in_schedule("s2", true).await.unwrap();
        q.set_in_schedule("s3", true).await.unwrap();
        q.set_in_schedule("s3", false).await.unwrap();

        apply(&store, conference(), ImportMode::Full).await;

        assert!(q.is_in_schedule("s2").await.unwrap());
        assert!(!q.is_in_schedule("s3").await.unwrap());
        assert_eq!(ids(&q.my_schedule().await.unwrap()), vec!["s2"]);
    }
}
