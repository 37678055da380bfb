// SPDX-License-Identifier: Apache-2.0

use crate::schema::next_counter;
use crate::{DocumentStore, StoreError};
use ricebook_model::{
    next_comment_id, ArticleDoc, ArticleId, CommentDoc, CommentId, Username,
};
use rusqlite::{params, params_from_iter, OptionalExtension};

impl DocumentStore {
    /// Insert a new article under the next value of the `article_id`
    /// counter. Allocation and insert share a transaction, so ids stay
    /// gapless and strictly increasing in commit order.
    pub fn create_article(
        &self,
        author: &Username,
        text: String,
        image: Option<String>,
        now_ms: u64,
    ) -> Result<ArticleDoc, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let id = ArticleId::from_u64(next_counter(&tx, "article_id")?);
            let article = ArticleDoc {
                id,
                author: author.clone(),
                text,
                image,
                date: now_ms,
                comments: Vec::new(),
            };
            article
                .validate()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            tx.execute(
                "INSERT INTO articles (id, author, date, doc) VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_u64() as i64,
                    author.as_str(),
                    now_ms as i64,
                    serde_json::to_string(&article)?,
                ],
            )?;
            tx.commit()?;
            Ok(article)
        })
    }

    pub fn article(&self, id: ArticleId) -> Result<Option<ArticleDoc>, StoreError> {
        self.with_conn(|conn| {
            let doc: Option<String> = conn
                .query_row(
                    "SELECT doc FROM articles WHERE id = ?1",
                    params![id.as_u64() as i64],
                    |row| row.get(0),
                )
                .optional()?;
            doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .transpose()
        })
    }

    pub fn articles_by_author(
        &self,
        author: &Username,
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT doc FROM articles WHERE author = ?1
                 ORDER BY date DESC, id DESC LIMIT {limit}"
            ))?;
            let rows = stmt
                .query_map(params![author.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .collect()
        })
    }

    /// Newest-first articles over a set of authors. This is the feed query:
    /// the caller passes the session user plus everyone they follow.
    pub fn articles_by_authors(
        &self,
        authors: &[&str],
        limit: usize,
    ) -> Result<Vec<ArticleDoc>, StoreError> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let placeholders = (1..=authors.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(",");
            let mut stmt = conn.prepare(&format!(
                "SELECT doc FROM articles WHERE author IN ({placeholders})
                 ORDER BY date DESC, id DESC LIMIT {limit}"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(authors.iter()), |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter()
                .map(|d| serde_json::from_str(&d).map_err(StoreError::from))
                .collect()
        })
    }

    pub fn edit_article_text(
        &self,
        id: ArticleId,
        text: String,
    ) -> Result<ArticleDoc, StoreError> {
        self.modify_article(id, move |article| {
            article.text = text;
            Ok(())
        })
    }

    /// Append a comment with id `max(existing) + 1`. The read, allocation,
    /// and write share one transaction, which is what keeps per-article
    /// comment ids unique under concurrent commenting.
    pub fn append_comment(
        &self,
        id: ArticleId,
        author: &Username,
        body: String,
        avatar: Option<String>,
        now_ms: u64,
    ) -> Result<ArticleDoc, StoreError> {
        let author = author.clone();
        self.modify_article(id, move |article| {
            let comment = CommentDoc {
                id: next_comment_id(&article.comments),
                author,
                body,
                date: now_ms,
                avatar,
            };
            comment
                .validate()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            article.comments.push(comment);
            Ok(())
        })
    }

    pub fn edit_comment_body(
        &self,
        id: ArticleId,
        comment_id: CommentId,
        body: String,
    ) -> Result<ArticleDoc, StoreError> {
        self.modify_article(id, move |article| {
            let comment = article
                .comment_mut(comment_id)
                .ok_or(StoreError::NotFound("comment"))?;
            comment.body = body;
            comment
                .validate()
                .map_err(|e| StoreError::Corrupt(e.to_string()))
        })
    }

    fn modify_article(
        &self,
        id: ArticleId,
        f: impl FnOnce(&mut ArticleDoc) -> Result<(), StoreError>,
    ) -> Result<ArticleDoc, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let doc: Option<String> = tx
                .query_row(
                    "SELECT doc FROM articles WHERE id = ?1",
                    params![id.as_u64() as i64],
                    |row| row.get(0),
                )
                .optional()?;
            let mut article: ArticleDoc =
                serde_json::from_str(&doc.ok_or(StoreError::NotFound("article"))?)?;
            f(&mut article)?;
            article
                .validate()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            tx.execute(
                "UPDATE articles SET doc = ?1 WHERE id = ?2",
                params![serde_json::to_string(&article)?, id.as_u64() as i64],
            )?;
            tx.commit()?;
            Ok(article)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DocumentStore {
        DocumentStore::open_in_memory().expect("store")
    }

    fn username(name: &str) -> Username {
        Username::parse(name).expect("username")
    }

    #[test]
    fn article_ids_are_strictly_increasing() {
        let store = store();
        let a = store
            .create_article(&username("alice"), "one".to_string(), None, 10)
            .expect("a");
        let b = store
            .create_article(&username("alice"), "two".to_string(), None, 20)
            .expect("b");
        assert_eq!(a.id.as_u64(), 1);
        assert_eq!(b.id.as_u64(), 2);
    }

    #[test]
    fn by_author_and_by_id_lookups() {
        let store = store();
        store
            .create_article(&username("alice"), "one".to_string(), None, 10)
            .expect("a");
        store
            .create_article(&username("bob"), "two".to_string(), None, 20)
            .expect("b");
        let alice_articles = store
            .articles_by_author(&username("alice"), 50)
            .expect("by author");
        assert_eq!(alice_articles.len(), 1);
        assert_eq!(alice_articles[0].text, "one");
        assert!(store
            .article(ArticleId::from_u64(2))
            .expect("by id")
            .is_some());
        assert!(store
            .article(ArticleId::from_u64(99))
            .expect("by id")
            .is_none());
    }

    #[test]
    fn feed_is_newest_first_across_authors() {
        let store = store();
        store
            .create_article(&username("alice"), "a1".to_string(), None, 10)
            .expect("a1");
        store
            .create_article(&username("bob"), "b1".to_string(), None, 30)
            .expect("b1");
        store
            .create_article(&username("carol"), "c1".to_string(), None, 20)
            .expect("c1");

        let feed = store
            .articles_by_authors(&["alice", "bob"], 50)
            .expect("feed");
        let texts: Vec<&str> = feed.iter().map(|a| a.text.as_str()).collect();
        assert_eq!(texts, vec!["b1", "a1"], "carol is not followed");
    }

    #[test]
    fn feed_ties_break_by_id_desc() {
        let store = store();
        store
            .create_article(&username("alice"), "first".to_string(), None, 10)
            .expect("first");
        store
            .create_article(&username("alice"), "second".to_string(), None, 10)
            .expect("second");
        let feed = store.articles_by_authors(&["alice"], 50).expect("feed");
        assert_eq!(feed[0].text, "second");
        assert_eq!(feed[1].text, "first");
    }

    #[test]
    fn feed_limit_applies() {
        let store = store();
        for i in 0..5 {
            store
                .create_article(&username("alice"), format!("t{i}"), None, i)
                .expect("create");
        }
        let feed = store.articles_by_authors(&["alice"], 2).expect("feed");
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].text, "t4");
    }

    #[test]
    fn comment_ids_are_max_plus_one_per_article() {
        let store = store();
        let article = store
            .create_article(&username("alice"), "post".to_string(), None, 0)
            .expect("create");
        let after_one = store
            .append_comment(article.id, &username("bob"), "hi".to_string(), None, 1)
            .expect("c1");
        assert_eq!(after_one.comments[0].id.as_u64(), 1);
        let after_two = store
            .append_comment(article.id, &username("carol"), "yo".to_string(), None, 2)
            .expect("c2");
        assert_eq!(after_two.comments[1].id.as_u64(), 2);

        let other = store
            .create_article(&username("bob"), "other".to_string(), None, 3)
            .expect("other");
        let other_after = store
            .append_comment(other.id, &username("alice"), "first".to_string(), None, 4)
            .expect("c");
        assert_eq!(other_after.comments[0].id.as_u64(), 1, "ids are per-article");
    }

    #[test]
    fn edit_paths_and_missing_targets() {
        let store = store();
        let article = store
            .create_article(&username("alice"), "post".to_string(), None, 0)
            .expect("create");
        let edited = store
            .edit_article_text(article.id, "edited".to_string())
            .expect("edit");
        assert_eq!(edited.text, "edited");

        store
            .append_comment(article.id, &username("bob"), "hi".to_string(), None, 1)
            .expect("comment");
        let edited = store
            .edit_comment_body(article.id, CommentId::from_u64(1), "better".to_string())
            .expect("edit comment");
        assert_eq!(edited.comments[0].body, "better");

        assert_eq!(
            store
                .edit_comment_body(article.id, CommentId::from_u64(9), "x".to_string())
                .expect_err("missing comment"),
            StoreError::NotFound("comment")
        );
        assert_eq!(
            store
                .edit_article_text(ArticleId::from_u64(99), "x".to_string())
                .expect_err("missing article"),
            StoreError::NotFound("article")
        );
    }
}
