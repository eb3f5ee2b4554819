use std::path::Path;

use rusqlite::{Connection, params};

use cm_core::{ContentItem, Engagement, Features, Opinion, ResponseTone, Scores};

use crate::error::{Result, StoreError};
use crate::schema;

/// Row counts for the stats command.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoreStats {
    pub items: u64,
    pub opinions: u64,
    pub users: u64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Items ---

    /// Insert a saved cast. A second save of the same (id, saved_by) pair
    /// reports [`StoreError::Duplicate`] so the caller can answer
    /// "already saved" instead of failing.
    pub fn insert_item(&self, item: &ContentItem) -> Result<()> {
        let embeds = serde_json::to_string(&item.embeds)?;
        let features = item
            .features
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let scores = item.scores.as_ref().map(serde_json::to_string).transpose()?;

        self.conn
            .execute(
                "INSERT INTO items (id, author, saved_by, body, timestamp, likes, replies, recasts, embeds, features, scores)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id,
                    item.author,
                    item.saved_by,
                    item.text,
                    item.timestamp as i64,
                    item.engagement.likes,
                    item.engagement.replies,
                    item.engagement.recasts,
                    embeds,
                    features,
                    scores,
                ],
            )
            .map_err(|e| map_constraint(e, &item.id, &item.saved_by))?;
        Ok(())
    }

    /// Fetch one saved cast by id. When several users saved the same cast,
    /// the earliest save wins.
    pub fn get_item(&self, id: &str) -> Result<ContentItem> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 ORDER BY rowid LIMIT 1"
        ))?;
        let row = stmt.query_row([id], item_row).ok();
        match row {
            Some(raw) => raw_to_item(raw),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    pub fn get_item_for(&self, id: &str, saved_by: &str) -> Result<ContentItem> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1 AND saved_by = ?2"
        ))?;
        let row = stmt.query_row(params![id, saved_by], item_row).ok();
        match row {
            Some(raw) => raw_to_item(raw),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Every saved cast, newest first.
    pub fn all_items(&self) -> Result<Vec<ContentItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY timestamp DESC, id ASC"
        ))?;
        let rows: Vec<ItemRow> = stmt
            .query_map([], item_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(raw_to_item).collect()
    }

    /// One user's saves, newest first, capped at `limit`.
    pub fn items_saved_by(&self, user: &str, limit: usize) -> Result<Vec<ContentItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE saved_by = ?1
             ORDER BY timestamp DESC, id ASC LIMIT ?2"
        ))?;
        let rows: Vec<ItemRow> = stmt
            .query_map(params![user, limit as i64], item_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(raw_to_item).collect()
    }

    /// Replace the stored analysis for one saved cast. Raw fields never
    /// change here; only the derived columns are touched.
    pub fn update_analysis(
        &self,
        id: &str,
        saved_by: &str,
        features: &Features,
        scores: &Scores,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE items SET features = ?1, scores = ?2 WHERE id = ?3 AND saved_by = ?4",
            params![
                serde_json::to_string(features)?,
                serde_json::to_string(scores)?,
                id,
                saved_by,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn delete_item(&self, id: &str, saved_by: &str) -> Result<()> {
        let changed = self.conn.execute(
            "DELETE FROM items WHERE id = ?1 AND saved_by = ?2",
            params![id, saved_by],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    // --- Opinions ---

    pub fn insert_opinion(&self, opinion: &Opinion) -> Result<()> {
        self.conn.execute(
            "INSERT INTO opinions (id, content_id, requested_by, opinion_text, confidence,
                                   response_tone, topic_analysis, reasoning, sources_used,
                                   web_research_summary, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                opinion.id,
                opinion.content_id,
                opinion.requested_by,
                opinion.opinion_text,
                opinion.confidence_score,
                opinion.response_tone.as_str(),
                serde_json::to_string(&opinion.topic_analysis)?,
                serde_json::to_string(&opinion.reasoning)?,
                serde_json::to_string(&opinion.sources_used)?,
                opinion.web_research_summary,
                opinion.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_opinion(&self, id: &str) -> Result<Opinion> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPINION_COLUMNS} FROM opinions WHERE id = ?1"
        ))?;
        let row = stmt.query_row([id], opinion_row).ok();
        match row {
            Some(raw) => raw_to_opinion(raw),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Opinions recorded for one cast, oldest first.
    pub fn opinions_for(&self, content_id: &str) -> Result<Vec<Opinion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OPINION_COLUMNS} FROM opinions WHERE content_id = ?1 ORDER BY created_at, id"
        ))?;
        let rows: Vec<OpinionRow> = stmt
            .query_map([content_id], opinion_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(raw_to_opinion).collect()
    }

    /// Apply a feedback delta to a stored opinion's confidence, clamped to
    /// [0, 1]. Returns the updated value.
    pub fn adjust_opinion_confidence(&self, id: &str, delta: f64) -> Result<f64> {
        let tx = self.conn.unchecked_transaction()?;
        let current: Option<f64> = tx
            .query_row("SELECT confidence FROM opinions WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .ok();
        let Some(current) = current else {
            return Err(StoreError::NotFound { id: id.to_string() });
        };

        let updated = (current + delta).clamp(0.0, 1.0);
        tx.execute(
            "UPDATE opinions SET confidence = ?1 WHERE id = ?2",
            params![updated, id],
        )?;
        tx.commit()?;
        Ok(updated)
    }

    // --- Stats ---

    pub fn stats(&self) -> Result<StoreStats> {
        let items: i64 = self
            .conn
            .query_row("SELECT count(*) FROM items", [], |row| row.get(0))?;
        let opinions: i64 = self
            .conn
            .query_row("SELECT count(*) FROM opinions", [], |row| row.get(0))?;
        let users: i64 = self.conn.query_row(
            "SELECT count(DISTINCT saved_by) FROM items",
            [],
            |row| row.get(0),
        )?;
        Ok(StoreStats {
            items: items as u64,
            opinions: opinions as u64,
            users: users as u64,
        })
    }
}

// ---- row mapping ----

const ITEM_COLUMNS: &str =
    "id, author, saved_by, body, timestamp, likes, replies, recasts, embeds, features, scores";

type ItemRow = (
    String,
    String,
    String,
    String,
    i64,
    u32,
    u32,
    u32,
    String,
    Option<String>,
    Option<String>,
);

fn item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn raw_to_item(raw: ItemRow) -> Result<ContentItem> {
    let (id, author, saved_by, body, timestamp, likes, replies, recasts, embeds, features, scores) =
        raw;
    let mut item = ContentItem::new(
        &id,
        &author,
        &saved_by,
        &body,
        timestamp.max(0) as u64,
        Engagement::new(likes, replies, recasts),
    );
    item.embeds = serde_json::from_str(&embeds)?;
    item.features = features.as_deref().map(serde_json::from_str).transpose()?;
    item.scores = scores.as_deref().map(serde_json::from_str).transpose()?;
    Ok(item)
}

const OPINION_COLUMNS: &str = "id, content_id, requested_by, opinion_text, confidence, \
     response_tone, topic_analysis, reasoning, sources_used, web_research_summary, created_at";

type OpinionRow = (
    String,
    String,
    String,
    String,
    f64,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
);

fn opinion_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<OpinionRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn raw_to_opinion(raw: OpinionRow) -> Result<Opinion> {
    let (
        id,
        content_id,
        requested_by,
        opinion_text,
        confidence_score,
        tone,
        topic_analysis,
        reasoning,
        sources_used,
        web_research_summary,
        created_at,
    ) = raw;
    let response_tone: ResponseTone = tone
        .parse()
        .map_err(|e: String| StoreError::InvalidData(e))?;
    Ok(Opinion {
        id,
        content_id,
        requested_by,
        opinion_text,
        confidence_score,
        response_tone,
        topic_analysis: serde_json::from_str(&topic_analysis)?,
        reasoning: serde_json::from_str(&reasoning)?,
        sources_used: serde_json::from_str(&sources_used)?,
        web_research_summary,
        created_at: created_at.max(0) as u64,
    })
}

/// Map a primary-key collision onto the typed duplicate error; everything
/// else passes through as a raw SQLite failure.
fn map_constraint(e: rusqlite::Error, id: &str, saved_by: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Duplicate {
                id: id.to_string(),
                saved_by: saved_by.to_string(),
            }
        }
        _ => StoreError::Sqlite(e),
    }
}
