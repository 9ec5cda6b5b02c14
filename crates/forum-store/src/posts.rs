use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::database::Database;
use crate::error::StoreError;

/// Category value that means "no filter".
pub const ALL_CATEGORIES: &str = "All";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
    pub created_at: String,
}

pub struct PostRepo {
    db: Database,
}

impl PostRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, post), fields(category = %post.category))]
    pub fn create(&self, post: &NewPost) -> Result<PostRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (title, content, category, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![post.title, post.content, post.category, now],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        info!(post_id = id, "post created");

        Ok(PostRow {
            id,
            title: post.title.clone(),
            content: post.content.clone(),
            category: post.category.clone(),
            created_at: now,
        })
    }

    /// List posts, newest first. `None` or `"All"` returns every category.
    #[instrument(skip(self))]
    pub fn list(&self, category: Option<&str>) -> Result<Vec<PostRow>, StoreError> {
        let category = category.filter(|c| !c.is_empty() && *c != ALL_CATEGORIES);

        self.db.with_conn(|conn| {
            let map_row = |row: &rusqlite::Row<'_>| {
                Ok(PostRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    content: row.get(2)?,
                    category: row.get(3)?,
                    created_at: row.get(4)?,
                })
            };

            let rows = match category {
                Some(category) => conn
                    .prepare(
                        "SELECT id, title, content, category, created_at FROM posts
                         WHERE category = ?1 ORDER BY created_at DESC, id DESC",
                    )?
                    .query_map([category], map_row)?
                    .collect::<Result<Vec<_>, _>>()?,
                None => conn
                    .prepare(
                        "SELECT id, title, content, category, created_at FROM posts
                         ORDER BY created_at DESC, id DESC",
                    )?
                    .query_map([], map_row)?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })
    }

    /// Delete a post by ID.
    #[instrument(skip(self))]
    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let affected = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])?))?;

        if affected == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }
        info!(post_id = id, "post deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_repo() -> PostRepo {
        PostRepo::new(Database::in_memory().unwrap())
    }

    fn post(title: &str, category: &str) -> NewPost {
        NewPost {
            title: title.into(),
            content: format!("{title} body"),
            category: category.into(),
        }
    }

    #[test]
    fn create_assigns_increasing_ids() {
        let repo = test_repo();
        let a = repo.create(&post("first", "news")).unwrap();
        let b = repo.create(&post("second", "news")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.content, "first body");
    }

    #[test]
    fn list_all_newest_first() {
        let repo = test_repo();
        repo.create(&post("first", "news")).unwrap();
        repo.create(&post("second", "tech")).unwrap();

        let all = repo.list(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "second");

        let also_all = repo.list(Some(ALL_CATEGORIES)).unwrap();
        assert_eq!(all, also_all);
    }

    #[test]
    fn list_filters_by_category() {
        let repo = test_repo();
        repo.create(&post("a", "news")).unwrap();
        repo.create(&post("b", "tech")).unwrap();
        repo.create(&post("c", "news")).unwrap();

        let news = repo.list(Some("news")).unwrap();
        assert_eq!(news.len(), 2);
        assert!(news.iter().all(|p| p.category == "news"));

        assert!(repo.list(Some("sports")).unwrap().is_empty());
    }

    #[test]
    fn empty_category_means_all() {
        let repo = test_repo();
        repo.create(&post("a", "news")).unwrap();
        assert_eq!(repo.list(Some("")).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_post() {
        let repo = test_repo();
        let created = repo.create(&post("gone", "news")).unwrap();
        repo.delete(created.id).unwrap();
        assert!(repo.list(None).unwrap().is_empty());
    }

    #[test]
    fn delete_unknown_is_not_found() {
        let repo = test_repo();
        assert!(matches!(repo.delete(99), Err(StoreError::NotFound(_))));
    }
}
