//! Migration steps for the hearth inventory database
//!
//! New releases append steps here. Never edit or reorder a step that has
//! shipped.

use crate::migration::{MigrationStep, SqlMigration};

/// Name given to items whose name was missing before it became required
pub const UNTITLED_ITEM: &str = "Untitled item";

const CREATE_INVENTORY: SqlMigration = SqlMigration::new(
    "0001_create_inventory",
    &[
        "CREATE TABLE locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )",
        "CREATE TABLE categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT,
            location_id INTEGER REFERENCES locations(id) ON DELETE SET NULL,
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            purchase_price_cents INTEGER,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )",
        "CREATE INDEX idx_items_location ON items(location_id)",
        "CREATE TABLE attachments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
            blob_path TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            byte_size INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )",
        "CREATE INDEX idx_attachments_item ON attachments(item_id)",
    ],
);

const ITEMS_ADD_SERIAL_NUMBER: SqlMigration = SqlMigration::new(
    "0002_items_add_serial_number",
    &["ALTER TABLE items ADD COLUMN serial_number TEXT"],
);

// Backfill takes everything after the last '/' of the blob path
const ATTACHMENTS_ORIGINAL_FILENAME: SqlMigration = SqlMigration::new(
    "0003_attachments_original_filename",
    &[
        "ALTER TABLE attachments ADD COLUMN original_filename TEXT",
        "UPDATE attachments
         SET original_filename =
             substr(blob_path, length(rtrim(blob_path, replace(blob_path, '/', ''))) + 1)
         WHERE original_filename IS NULL",
    ],
);

const ITEMS_REQUIRE_NAME: SqlMigration = SqlMigration::new(
    "0004_items_require_name",
    &[
        "CREATE TABLE items_new (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            location_id INTEGER REFERENCES locations(id) ON DELETE SET NULL,
            category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
            purchase_price_cents INTEGER,
            serial_number TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )",
        "INSERT INTO items_new
            (id, name, location_id, category_id, purchase_price_cents, serial_number, created_at)
         SELECT id, COALESCE(NULLIF(trim(name), ''), 'Untitled item'), location_id, category_id,
                purchase_price_cents, serial_number, created_at
         FROM items",
        "DROP TABLE items",
        "ALTER TABLE items_new RENAME TO items",
        "CREATE INDEX idx_items_location ON items(location_id)",
    ],
);

const RENAME_LOCATIONS_TO_ROOMS: SqlMigration = SqlMigration::new(
    "0005_rename_locations_to_rooms",
    &[
        "ALTER TABLE locations RENAME TO rooms",
        "ALTER TABLE items RENAME COLUMN location_id TO room_id",
        "DROP INDEX idx_items_location",
        "CREATE INDEX idx_items_room ON items(room_id)",
    ],
);

/// Every step, in application order
pub fn all_steps() -> Vec<Box<dyn MigrationStep>> {
    vec![
        Box::new(CREATE_INVENTORY),
        Box::new(ITEMS_ADD_SERIAL_NUMBER),
        Box::new(ATTACHMENTS_ORIGINAL_FILENAME),
        Box::new(ITEMS_REQUIRE_NAME),
        Box::new(RENAME_LOCATIONS_TO_ROOMS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::migration::MigrationEngine;
    use sqlx::SqlitePool;

    async fn columns(pool: &SqlitePool, table: &str) -> Vec<(String, bool)> {
        sqlx::query_as("SELECT name, \"notnull\" FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_identifiers_are_ascending() {
        let steps = all_steps();
        let ids: Vec<&str> = steps.iter().map(|s| s.identifier()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_final_schema() {
        let pool = memory_pool().await.unwrap();
        MigrationEngine::new(pool.clone())
            .apply(&all_steps())
            .await
            .unwrap();

        let items = columns(&pool, "items").await;
        assert!(items.contains(&("name".to_string(), true)));
        assert!(items.iter().any(|(c, _)| c == "room_id"));
        assert!(!items.iter().any(|(c, _)| c == "location_id"));
        assert!(items.iter().any(|(c, _)| c == "serial_number"));

        let parents: Vec<String> =
            sqlx::query_scalar("SELECT \"table\" FROM pragma_foreign_key_list('items') ORDER BY \"table\"")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(parents, vec!["categories", "rooms"]);
    }

    #[tokio::test]
    async fn test_existing_rows_survive_upgrade() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());

        // A database created by a release that shipped the first two steps
        let shipped: Vec<Box<dyn MigrationStep>> =
            vec![Box::new(CREATE_INVENTORY), Box::new(ITEMS_ADD_SERIAL_NUMBER)];
        engine.apply(&shipped).await.unwrap();

        for sql in [
            "INSERT INTO locations (id, name) VALUES (1, 'Garage')",
            "INSERT INTO items (id, name, location_id) VALUES (1, 'Drill', 1)",
            "INSERT INTO items (id, name, location_id) VALUES (2, NULL, 1)",
            "INSERT INTO items (id, name) VALUES (3, '   ')",
            "INSERT INTO attachments (item_id, blob_path, mime_type, byte_size)
             VALUES (1, '2024/03/0123456789abcdef.jpg', 'image/jpeg', 512)",
        ] {
            sqlx::query(sql).execute(&pool).await.unwrap();
        }

        let report = engine.apply(&all_steps()).await.unwrap();
        assert_eq!(
            report.applied,
            vec![
                "0003_attachments_original_filename",
                "0004_items_require_name",
                "0005_rename_locations_to_rooms",
            ]
        );

        let items: Vec<(i64, String, Option<i64>)> =
            sqlx::query_as("SELECT id, name, room_id FROM items ORDER BY id")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(
            items,
            vec![
                (1, "Drill".to_string(), Some(1)),
                (2, UNTITLED_ITEM.to_string(), Some(1)),
                (3, UNTITLED_ITEM.to_string(), None),
            ]
        );

        // The rebuild of items must not cascade into attachments
        let attachment: (i64, String) =
            sqlx::query_as("SELECT item_id, original_filename FROM attachments")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(attachment, (1, "0123456789abcdef.jpg".to_string()));

        let room: String = sqlx::query_scalar("SELECT name FROM rooms WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(room, "Garage");
    }

    #[tokio::test]
    async fn test_backfill_handles_paths_without_directories() {
        let pool = memory_pool().await.unwrap();
        let engine = MigrationEngine::new(pool.clone());
        let first: Vec<Box<dyn MigrationStep>> =
            vec![Box::new(CREATE_INVENTORY), Box::new(ITEMS_ADD_SERIAL_NUMBER)];
        engine.apply(&first).await.unwrap();

        sqlx::query("INSERT INTO items (id, name) VALUES (1, 'Lamp')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO attachments (item_id, blob_path, mime_type, byte_size)
             VALUES (1, 'legacy.pdf', 'application/pdf', 10)",
        )
        .execute(&pool)
        .await
        .unwrap();

        engine.apply(&all_steps()).await.unwrap();
        let name: String = sqlx::query_scalar("SELECT original_filename FROM attachments")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "legacy.pdf");
    }
}
