use calamine::{open_workbook_auto, Reader};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

use crate::column_roles::classify_columns;
use crate::reconcile::{reconcile_groups, ImportReport};
use crate::row_grouping::{build_groups, EquipmentGroup};
use crate::sheet_region::{clean_cell, detect_region, SheetGrid};
use crate::taller_db;

pub const DEFAULT_SOURCE_TYPE: &str = "planilla_excel";
const ERROR_SAMPLE_LIMIT: usize = 20;
const PREVIEW_GROUP_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ImportPreviewRequest {
    pub source_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRunRequest {
    pub source_path: Option<String>,
    pub source_type: Option<String>,
}

/// Everything the heuristic pipeline extracted from one file, before any
/// database work.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub groups: Vec<EquipmentGroup>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ParseOutcome {
    pub fn total_entries(&self) -> usize {
        self.groups.iter().map(|g| g.trabajos.len()).sum()
    }
}

pub fn resolve_source_path_text(source_path: Option<String>) -> Result<String, String> {
    let path = source_path.unwrap_or_default();
    let path = path.trim().to_string();
    if path.is_empty() {
        return Err("source_path es obligatorio".to_string());
    }
    Ok(path)
}

fn read_csv_grid(path: &Path) -> Result<SheetGrid, String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("No se pudo leer el CSV: {e}"))?;

    let mut rows = Vec::new();
    for rec in reader.records() {
        let rec = rec.map_err(|e| format!("No se pudo leer una fila del CSV: {e}"))?;
        rows.push(rec.iter().map(|cell| cell.to_string()).collect());
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Planilla".to_string());
    Ok(SheetGrid::from_rows(&name, rows))
}

fn read_workbook_grids(path: &Path) -> Result<Vec<SheetGrid>, String> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("No se pudo abrir el archivo Excel: {e}"))?;
    let sheet_names = workbook.sheet_names().to_owned();
    if sheet_names.is_empty() {
        return Err("El archivo Excel no tiene hojas".to_string());
    }

    let mut grids = Vec::new();
    for sheet_name in sheet_names {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| format!("No se pudo leer la hoja '{sheet_name}': {e}"))?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| clean_cell(&cell.to_string())).collect())
            .collect::<Vec<Vec<String>>>();
        grids.push(SheetGrid {
            name: sheet_name,
            rows,
        });
    }
    Ok(grids)
}

/// Load a file into sheet grids. The sheet name (CSV: the file stem)
/// becomes the owner of every equipment found in it.
pub fn load_sheet_grids(path: &Path) -> Result<Vec<SheetGrid>, String> {
    if !path.exists() {
        return Err(format!("No se encontró el archivo: {}", path.to_string_lossy()));
    }
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(vec![read_csv_grid(path)?]),
        "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => read_workbook_grids(path),
        other => Err(format!(
            "Formato de archivo no soportado: '{other}'. Use xlsx, xls o csv."
        )),
    }
}

/// Run the full heuristic pipeline over already-loaded grids: region
/// detection, column classification and row grouping, collecting
/// per-sheet warnings along the way.
pub fn parse_sheets(grids: &[SheetGrid]) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for grid in grids {
        let Some(detection) = detect_region(grid) else {
            outcome
                .warnings
                .push(format!("La hoja '{}' está vacía, se omite", grid.name));
            continue;
        };
        if !detection.header_detected {
            outcome.warnings.push(format!(
                "No se detectaron encabezados claros en la hoja '{}', se usa la primera fila",
                grid.name
            ));
        }
        if !detection.region.has_data_rows() {
            outcome.warnings.push(format!(
                "La hoja '{}' no tiene filas de datos, se omite",
                grid.name
            ));
            continue;
        }

        let roles = classify_columns(grid, &detection.region);
        let grouping = build_groups(grid, &detection.region, &roles);
        outcome.warnings.extend(grouping.warnings);
        if grouping.groups.is_empty() {
            outcome.warnings.push(format!(
                "No se encontraron registros válidos en la hoja '{}'",
                grid.name
            ));
            continue;
        }
        outcome.groups.extend(grouping.groups);
    }
    outcome
}

pub fn parse_workbook_at_path(path: &Path) -> Result<ParseOutcome, String> {
    let grids = load_sheet_grids(path)?;
    Ok(parse_sheets(&grids))
}

fn group_preview_json(group: &EquipmentGroup) -> Value {
    json!({
        "propietario": group.propietario,
        "equipo": group.nombre,
        "trabajos": group.trabajos.iter().map(|t| json!({
            "fecha": t.fecha.format("%Y-%m-%d").to_string(),
            "descripcion": t.descripcion,
            "presupuesto_cents": t.presupuesto_cents,
        })).collect::<Vec<_>>(),
    })
}

/// Parse a file and report what an import would do, without touching any
/// database.
pub fn import_preview_at_path(file_path: &Path) -> Result<Value, String> {
    let parsed = parse_workbook_at_path(file_path)?;
    let preview_groups = parsed
        .groups
        .iter()
        .take(PREVIEW_GROUP_LIMIT)
        .map(group_preview_json)
        .collect::<Vec<_>>();

    Ok(json!({
        "file": file_path.to_string_lossy().to_string(),
        "group_count": parsed.groups.len(),
        "entry_count": parsed.total_entries(),
        "error_count": parsed.errors.len(),
        "warning_count": parsed.warnings.len(),
        "errors": parsed.errors.iter().take(ERROR_SAMPLE_LIMIT).cloned().collect::<Vec<_>>(),
        "warnings": parsed.warnings.iter().take(ERROR_SAMPLE_LIMIT).cloned().collect::<Vec<_>>(),
        "preview_groups": preview_groups,
    }))
}

/// Parse a file and reconcile it into the database at `db_path`,
/// recording the run in import_jobs.
pub fn import_file_at_db_path(
    db_path: &Path,
    file_path: &Path,
    source_type: &str,
) -> Result<Value, String> {
    let parsed = parse_workbook_at_path(file_path)?;

    let conn =
        Connection::open(db_path).map_err(|e| format!("No se pudo abrir la base de datos: {e}"))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("No se pudo activar foreign_keys: {e}"))?;
    taller_db::ensure_schema_ready(&conn)?;

    let file_text = file_path.to_string_lossy().to_string();
    let job_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let metadata_json = serde_json::to_string(&json!({
        "source_type": source_type,
        "source_file": file_text,
        "group_count": parsed.groups.len(),
        "entry_count": parsed.total_entries(),
    }))
    .map_err(|e| format!("No se pudo serializar los metadatos de la importación: {e}"))?;

    conn.execute(
        r#"
        INSERT INTO import_jobs(id, source_type, source_file, status, started_at, total_count, imported_count, error_count, metadata_json)
        VALUES (?1, ?2, ?3, 'running', ?4, 0, 0, 0, ?5)
        "#,
        params![job_id, source_type, file_text, started_at, metadata_json],
    )
    .map_err(|e| format!("No se pudo registrar la importación: {e}"))?;

    let report = reconcile_groups(&conn, &parsed.groups);

    let total_count = parsed.total_entries() as i64;
    let error_count = (parsed.errors.len() + report.errors.len()) as i64;
    let mut error_samples = parsed
        .errors
        .iter()
        .take(ERROR_SAMPLE_LIMIT)
        .cloned()
        .collect::<Vec<_>>();
    for err in &report.errors {
        if error_samples.len() >= ERROR_SAMPLE_LIMIT {
            break;
        }
        error_samples.push(err.clone());
    }
    let error_message = if error_samples.is_empty() {
        None
    } else {
        Some(error_samples.join("\n"))
    };

    let finished_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    conn.execute(
        r#"
        UPDATE import_jobs
        SET status='success',
            finished_at=?1,
            total_count=?2,
            imported_count=?3,
            error_count=?4,
            error_message=?5
        WHERE id=?6
        "#,
        params![
            finished_at,
            total_count,
            report.entries_imported,
            error_count,
            error_message,
            job_id
        ],
    )
    .map_err(|e| format!("No se pudo actualizar el estado de la importación: {e}"))?;

    Ok(import_summary_json(
        db_path,
        &file_text,
        source_type,
        &job_id,
        &parsed,
        &report,
        &error_samples,
    ))
}

fn import_summary_json(
    db_path: &Path,
    file_text: &str,
    source_type: &str,
    job_id: &str,
    parsed: &ParseOutcome,
    report: &ImportReport,
    error_samples: &[String],
) -> Value {
    json!({
        "db_path": db_path.to_string_lossy().to_string(),
        "file": file_text,
        "source_type": source_type,
        "import_job_id": job_id,
        "total_count": parsed.total_entries(),
        "groups_imported": report.groups_imported,
        "entries_imported": report.entries_imported,
        "entries_skipped": report.entries_skipped,
        "clients_created": report.clients_created,
        "equipment_created": report.equipment_created,
        "error_count": parsed.errors.len() + report.errors.len(),
        "errors": error_samples,
        "warnings": parsed.warnings.iter()
            .chain(report.warnings.iter())
            .take(ERROR_SAMPLE_LIMIT)
            .cloned()
            .collect::<Vec<_>>(),
    })
}
