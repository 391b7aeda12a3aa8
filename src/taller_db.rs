use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const ADMIN_RESET_CONFIRM_PHRASE: &str = "RESET AGENDA";

// Delete order matters: jobs reference equipment, equipment references
// clients.
const ADMIN_DATA_TABLES: &[&str] = &["jobs", "equipment", "clients", "import_jobs"];

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!("../db/migrations/0001_init.sql"),
    ),
    (
        "0002_import_jobs.sql",
        include_str!("../db/migrations/0002_import_jobs.sql"),
    ),
];

const REQUIRED_TABLES: &[&str] = &["clients", "equipment", "jobs", "import_jobs"];

#[derive(Debug, Serialize)]
pub struct TallerDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub schema_migrations_table_exists: bool,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct TallerDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

#[derive(Debug, Serialize)]
pub struct AdminDbStatsSummary {
    pub table_count: usize,
    pub total_rows: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminDbTableCountRow {
    pub table: String,
    pub row_count: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminDbStatsResult {
    pub db_path: String,
    pub confirm_phrase: String,
    pub summary: AdminDbStatsSummary,
    pub rows: Vec<AdminDbTableCountRow>,
}

#[derive(Debug, Serialize)]
pub struct AdminResetSummary {
    pub table_count: usize,
    pub total_rows_before: i64,
    pub total_rows_after: i64,
    pub deleted_rows: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminResetResult {
    pub db_path: String,
    pub confirm_phrase: String,
    pub summary: AdminResetSummary,
    pub before_rows: Vec<AdminDbTableCountRow>,
    pub after_rows: Vec<AdminDbTableCountRow>,
}

#[derive(Debug, Deserialize)]
pub struct AdminResetRequest {
    pub confirm_text: Option<String>,
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn has_schema_migrations_table(conn: &Connection) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v != 0)?;
    Ok(exists)
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn list_non_system_tables(conn: &Connection) -> Result<HashSet<String>, String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .map_err(|e| format!("No se pudo leer sqlite_master: {e}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| format!("No se pudo consultar sqlite_master: {e}"))?;
    let mut names = HashSet::new();
    for row in rows {
        names.insert(row.map_err(|e| format!("No se pudo leer el nombre de tabla: {e}"))?);
    }
    Ok(names)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Verify that an already-open connection points at a database with the
/// schema the import needs. Called before every write path so that a
/// half-migrated or foreign file fails fast with a clear message.
pub fn ensure_schema_ready(conn: &Connection) -> Result<(), String> {
    let existing = list_non_system_tables(conn)?;
    let missing = REQUIRED_TABLES
        .iter()
        .filter(|table| !existing.contains(**table))
        .map(|table| (*table).to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(format!(
            "La base de datos no tiene las tablas necesarias: {}. Ejecute las migraciones primero.",
            missing.join(", ")
        ));
    }
    Ok(())
}

pub fn inspect_status_at_path(db_path: &Path) -> Result<TallerDbStatus, String> {
    let migration_files = MIGRATIONS
        .iter()
        .map(|(v, _)| (*v).to_string())
        .collect::<Vec<_>>();
    let exists = db_path.exists();
    if !exists {
        return Ok(TallerDbStatus {
            db_path: db_path.to_string_lossy().to_string(),
            exists: false,
            migration_files: migration_files.clone(),
            applied_versions: Vec::new(),
            pending_versions: migration_files,
            schema_migrations_table_exists: false,
            ready: false,
        });
    }

    let conn =
        Connection::open(db_path).map_err(|e| format!("No se pudo abrir la base de datos: {e}"))?;
    let schema_table_exists = has_schema_migrations_table(&conn)
        .map_err(|e| format!("No se pudo verificar schema_migrations: {e}"))?;

    let applied_versions = if schema_table_exists {
        load_applied_versions(&conn)
            .map_err(|e| format!("No se pudo leer schema_migrations: {e}"))?
    } else {
        Vec::new()
    };
    let applied_set = applied_versions.iter().cloned().collect::<HashSet<_>>();
    let pending_versions = migration_files
        .iter()
        .filter(|v| !applied_set.contains(*v))
        .cloned()
        .collect::<Vec<_>>();

    Ok(TallerDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists: true,
        migration_files,
        applied_versions,
        pending_versions: pending_versions.clone(),
        schema_migrations_table_exists: schema_table_exists,
        ready: pending_versions.is_empty(),
    })
}

pub fn apply_embedded_migrations(db_path: &Path) -> Result<TallerDbMigrateResult, String> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("No se pudo crear el directorio de la base de datos: {e}"))?;
    }

    let mut conn =
        Connection::open(db_path).map_err(|e| format!("No se pudo abrir la base de datos: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("No se pudo activar foreign_keys: {e}"))?;
    ensure_schema_migrations_table(&conn)
        .map_err(|e| format!("No se pudo inicializar schema_migrations: {e}"))?;

    let already = load_applied_versions(&conn)
        .map_err(|e| format!("No se pudieron leer las migraciones aplicadas: {e}"))?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .map_err(|e| format!("No se pudo iniciar la transacción de migración ({version}): {e}"))?;
        tx.execute_batch(sql)
            .map_err(|e| format!("Falló la migración ({version}): {e}"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .map_err(|e| format!("No se pudo registrar la migración ({version}): {e}"))?;
        tx.commit()
            .map_err(|e| format!("No se pudo confirmar la migración ({version}): {e}"))?;
        applied_now.push((*version).to_string());
    }

    let final_applied_total = load_applied_versions(&conn)
        .map_err(|e| format!("No se pudo leer el resultado de las migraciones: {e}"))?
        .len();
    let pending_total = MIGRATIONS.len().saturating_sub(final_applied_total);

    Ok(TallerDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
        applied_total: final_applied_total,
        pending_total,
    })
}

fn build_admin_table_counts(
    conn: &Connection,
    tables: &[String],
) -> Result<Vec<AdminDbTableCountRow>, String> {
    let mut rows = Vec::new();
    for table in tables {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row_count = conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map_err(|e| format!("No se pudo contar las filas de {table}: {e}"))?;
        rows.push(AdminDbTableCountRow {
            table: table.clone(),
            row_count,
        });
    }
    Ok(rows)
}

pub fn query_admin_db_stats_at_path(db_path: &Path) -> Result<AdminDbStatsResult, String> {
    if !db_path.exists() {
        return Err(format!(
            "La base de datos no existe: {}",
            db_path.to_string_lossy()
        ));
    }

    let conn =
        Connection::open(db_path).map_err(|e| format!("No se pudo abrir la base de datos: {e}"))?;
    let existing = list_non_system_tables(&conn)?;
    let tables = ADMIN_DATA_TABLES
        .iter()
        .filter(|name| existing.contains(**name))
        .map(|name| (*name).to_string())
        .collect::<Vec<_>>();

    let rows = build_admin_table_counts(&conn, &tables)?;
    let total_rows = rows.iter().map(|r| r.row_count).sum::<i64>();

    Ok(AdminDbStatsResult {
        db_path: db_path.to_string_lossy().to_string(),
        confirm_phrase: ADMIN_RESET_CONFIRM_PHRASE.to_string(),
        summary: AdminDbStatsSummary {
            table_count: rows.len(),
            total_rows,
        },
        rows,
    })
}

pub fn reset_admin_db_data_at_path(
    db_path: &Path,
    confirm_text: &str,
) -> Result<AdminResetResult, String> {
    if confirm_text.trim() != ADMIN_RESET_CONFIRM_PHRASE {
        return Err(format!(
            "confirm_text incorrecto, escriba: {}",
            ADMIN_RESET_CONFIRM_PHRASE
        ));
    }
    if !db_path.exists() {
        return Err(format!(
            "La base de datos no existe: {}",
            db_path.to_string_lossy()
        ));
    }

    let mut conn =
        Connection::open(db_path).map_err(|e| format!("No se pudo abrir la base de datos: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("No se pudo activar foreign_keys: {e}"))?;

    let existing = list_non_system_tables(&conn)?;
    let tables = ADMIN_DATA_TABLES
        .iter()
        .filter(|name| existing.contains(**name))
        .map(|name| (*name).to_string())
        .collect::<Vec<_>>();

    let before_rows = build_admin_table_counts(&conn, &tables)?;
    {
        let tx = conn
            .transaction()
            .map_err(|e| format!("No se pudo iniciar la transacción de reseteo: {e}"))?;
        for table in &tables {
            let sql = format!("DELETE FROM {}", quote_ident(table));
            tx.execute(&sql, [])
                .map_err(|e| format!("No se pudo vaciar la tabla {table}: {e}"))?;
        }
        tx.commit()
            .map_err(|e| format!("No se pudo confirmar el reseteo: {e}"))?;
    }
    let after_rows = build_admin_table_counts(&conn, &tables)?;

    let total_before = before_rows.iter().map(|r| r.row_count).sum::<i64>();
    let total_after = after_rows.iter().map(|r| r.row_count).sum::<i64>();

    Ok(AdminResetResult {
        db_path: db_path.to_string_lossy().to_string(),
        confirm_phrase: ADMIN_RESET_CONFIRM_PHRASE.to_string(),
        summary: AdminResetSummary {
            table_count: tables.len(),
            total_rows_before: total_before,
            total_rows_after: total_after,
            deleted_rows: total_before - total_after,
        },
        before_rows,
        after_rows,
    })
}
