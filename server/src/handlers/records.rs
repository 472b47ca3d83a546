//! Record handlers - CRUD over one collection.

use crate::db::{Collections, ID_FIELD};
use crate::error::{AppError, Result};
use serde_json::Value;
use syncstore_engine::{Pagination, Record};

/// Hard cap on the page size a client may ask for.
pub const MAX_PAGE_LIMIT: u64 = 1000;

/// Collection names are path segments made of `[A-Za-z0-9_-]`.
fn check_collection(collection: &str) -> Result<()> {
    let valid = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid collection name {collection:?}"
        )))
    }
}

fn not_found(collection: &str, id: &str) -> AppError {
    AppError::NotFound(format!("{collection}/{id}"))
}

/// List records. Without a `limit` the whole collection from `offset` on is
/// returned; a larger limit than [`MAX_PAGE_LIMIT`] is clamped.
pub fn handle_list(db: &Collections, collection: &str, page: Pagination) -> Result<Vec<Record>> {
    check_collection(collection)?;
    let limit = page.limit.map(|limit| limit.min(MAX_PAGE_LIMIT));
    Ok(db.list(collection, Pagination::new(limit, page.offset)))
}

pub fn handle_get(db: &Collections, collection: &str, id: &str) -> Result<Record> {
    check_collection(collection)?;
    db.get(collection, id)
        .ok_or_else(|| not_found(collection, id))
}

pub fn handle_create(db: &Collections, collection: &str, record: Record) -> Result<Record> {
    check_collection(collection)?;
    let created = db.insert(collection, record);
    tracing::info!(collection, total = db.len(collection), "record stored");
    Ok(created)
}

/// Replace a record. A body id, if present, must match the path id.
pub fn handle_replace(
    db: &Collections,
    collection: &str,
    id: &str,
    record: Record,
) -> Result<Record> {
    check_collection(collection)?;
    match record.get(ID_FIELD) {
        None | Some(Value::Null) => {}
        Some(Value::String(body_id)) if body_id == id => {}
        Some(other) => {
            return Err(AppError::BadRequest(format!(
                "body id {other} does not match path id {id:?}"
            )))
        }
    }
    db.replace(collection, id, record)
        .ok_or_else(|| not_found(collection, id))
}

pub fn handle_delete(db: &Collections, collection: &str, id: &str) -> Result<()> {
    check_collection(collection)?;
    if db.remove(collection, id) {
        Ok(())
    } else {
        Err(not_found(collection, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn collection_names_are_validated() {
        assert!(check_collection("todo_items-2").is_ok());
        assert!(matches!(
            check_collection("bad name"),
            Err(AppError::BadRequest(_))
        ));
        assert!(check_collection("").is_err());
    }

    #[test]
    fn list_without_limit_returns_everything() {
        let db = Collections::new();
        for i in 0..150 {
            db.insert("todos", record(json!({"n": i})));
        }

        let all = handle_list(&db, "todos", Pagination::default()).unwrap();
        assert_eq!(all.len(), 150);

        let tail = handle_list(&db, "todos", Pagination::new(None, 140)).unwrap();
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0]["n"], json!(140));
    }

    #[test]
    fn list_clamps_large_limits() {
        let db = Collections::new();
        for i in 0..(MAX_PAGE_LIMIT + 5) {
            db.insert("todos", record(json!({"n": i})));
        }

        let page = handle_list(&db, "todos", Pagination::new(Some(5000), 0)).unwrap();
        assert_eq!(page.len() as u64, MAX_PAGE_LIMIT);

        let page = handle_list(&db, "todos", Pagination::new(Some(5000), 1000)).unwrap();
        assert_eq!(page.len(), 5);
    }

    #[test]
    fn replace_rejects_mismatched_body_id() {
        let db = Collections::new();
        let created = handle_create(&db, "todos", record(json!({"title": "a"}))).unwrap();
        let id = created["id"].as_str().unwrap();

        let err = handle_replace(&db, "todos", id, record(json!({"id": "other"}))).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let ok = handle_replace(&db, "todos", id, record(json!({"id": id, "title": "b"}))).unwrap();
        assert_eq!(ok["title"], json!("b"));
    }

    #[test]
    fn missing_records_are_not_found() {
        let db = Collections::new();
        assert!(matches!(
            handle_get(&db, "todos", "nope"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            handle_delete(&db, "todos", "nope"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            handle_replace(&db, "todos", "nope", Record::new()),
            Err(AppError::NotFound(_))
        ));
    }
}
