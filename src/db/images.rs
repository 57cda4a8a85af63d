//! Image record persistence.
//!
//! Rows are keyed by the dedup address derived from the page URL tail,
//! so re-ingesting the same page overwrites metadata in place. The
//! `stored_file` and `del_flag` columns belong to the downstream
//! download/publish side and are never touched by an upsert.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;

use super::{Database, ImageRecord, ImageTag, NewImage};

impl Database {
    /// Insert or update an image record together with its tag list
    ///
    /// The image row and its tags are written atomically. Tags are
    /// replaced wholesale; positions follow the order of `image.tags`.
    pub async fn upsert_image(&self, image: &NewImage) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = Self::write_image_rows(&mut conn, image).await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::QueryFailed(format!(
                            "Failed to commit image upsert: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        Ok(())
    }

    /// Write the image row and replace its tags
    async fn write_image_rows(conn: &mut SqliteConnection, image: &NewImage) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let visible: i32 = if image.visible { 1 } else { 0 };

        sqlx::query(
            r#"
            INSERT INTO images (
                pixiv_addr, illust_id, author, author_id, title,
                visible, need_download, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(pixiv_addr) DO UPDATE SET
                illust_id = excluded.illust_id,
                author = excluded.author,
                author_id = excluded.author_id,
                title = excluded.title,
                visible = excluded.visible,
                need_download = excluded.need_download,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&image.pixiv_addr)
        .bind(&image.illust_id)
        .bind(&image.author)
        .bind(&image.author_id)
        .bind(&image.title)
        .bind(visible)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to upsert image: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM image_tags WHERE pixiv_addr = ?")
            .bind(&image.pixiv_addr)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear image tags: {}",
                    e
                )))
            })?;

        if image.tags.is_empty() {
            return Ok(());
        }

        let mut query_builder = sqlx::QueryBuilder::new(
            "INSERT INTO image_tags (pixiv_addr, position, name, translation, visible) ",
        );

        query_builder.push_values(image.tags.iter().enumerate(), |mut b, (position, tag)| {
            b.push_bind(&image.pixiv_addr)
                .push_bind(position as i32)
                .push_bind(&tag.name)
                .push_bind(&tag.translation)
                .push_bind(if tag.visible { 1i32 } else { 0i32 });
        });

        let query = query_builder.build();
        query.execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert image tags: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get an image record by its dedup address
    pub async fn find_image(&self, pixiv_addr: &str) -> Result<Option<ImageRecord>> {
        let row = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT
                pixiv_addr, illust_id, author, author_id, title,
                visible, need_download, stored_file, del_flag,
                created_at, updated_at
            FROM images
            WHERE pixiv_addr = ?
            "#,
        )
        .bind(pixiv_addr)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get image: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Check whether a page was already fetched and stored
    ///
    /// True only when a record exists with a non-empty stored file
    /// reference. Records that were upserted but never stored still
    /// return false, so the page gets another fetch attempt.
    pub async fn image_is_stored(&self, pixiv_addr: &str) -> Result<bool> {
        let exists: i64 = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM images
                WHERE pixiv_addr = ? AND stored_file IS NOT NULL AND stored_file != ''
            )
            "#,
        )
        .bind(pixiv_addr)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to check stored image: {}",
                e
            )))
        })?;

        Ok(exists != 0)
    }

    /// Record where a fetched page was stored
    pub async fn set_stored_file(&self, pixiv_addr: &str, stored_file: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            "UPDATE images SET stored_file = ?, need_download = 0, updated_at = ? WHERE pixiv_addr = ?",
        )
        .bind(stored_file)
        .bind(now)
        .bind(pixiv_addr)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to set stored file: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// List an image's tags in position order
    pub async fn list_image_tags(&self, pixiv_addr: &str) -> Result<Vec<ImageTag>> {
        let rows = sqlx::query_as::<_, ImageTag>(
            r#"
            SELECT pixiv_addr, position, name, translation, visible
            FROM image_tags
            WHERE pixiv_addr = ?
            ORDER BY position ASC
            "#,
        )
        .bind(pixiv_addr)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list image tags: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List all image records for an illustration
    pub async fn list_images_for_illust(&self, illust_id: &str) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query_as::<_, ImageRecord>(
            r#"
            SELECT
                pixiv_addr, illust_id, author, author_id, title,
                visible, need_download, stored_file, del_flag,
                created_at, updated_at
            FROM images
            WHERE illust_id = ?
            ORDER BY pixiv_addr ASC
            "#,
        )
        .bind(illust_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list images for illust: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
