use std::sync::OnceLock;

use chrono::Datelike;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::dates;
use crate::row_grouping::{EquipmentGroup, WorkEntry};

const DEFAULT_MARCA: &str = "Sin especificar";
const DEDUP_DESCRIPTION_PREFIX_CHARS: usize = 50;

/// Outcome of writing parsed groups into the database. Errors here are
/// per-group: one bad group never aborts the rest of the import.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub groups_imported: i64,
    pub entries_imported: i64,
    pub entries_skipped: i64,
    pub clients_created: i64,
    pub equipment_created: i64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, PartialEq)]
struct EquipmentIdentity {
    marca: String,
    modelo: String,
    anio: i32,
    n_serie: String,
}

fn marca_modelo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)[\s\-]+([A-Za-z0-9\-]+)").expect("regex marca y modelo")
    })
}

fn anio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("regex año"))
}

/// Split a free-form equipment cell ("SCANIA 113 2004") into brand,
/// model and year, and derive a stable synthetic serial number so the
/// same planilla imported twice resolves to the same equipment row.
fn derive_identity(nombre: &str, propietario: &str) -> EquipmentIdentity {
    let nombre = nombre.trim();
    let (marca, modelo) = match marca_modelo_re().captures(nombre) {
        Some(caps) => (caps[1].to_string(), caps[2].to_string()),
        None => (DEFAULT_MARCA.to_string(), nombre.to_string()),
    };
    let anio = anio_re()
        .find(nombre)
        .and_then(|m| m.as_str().parse::<i32>().ok())
        .unwrap_or_else(|| dates::today().year());
    let n_serie = synthesize_serial(&marca, &modelo, propietario);
    EquipmentIdentity {
        marca,
        modelo,
        anio,
        n_serie,
    }
}

fn synthesize_serial(marca: &str, modelo: &str, propietario: &str) -> String {
    let seed = format!(
        "agenda-taller:equipo:{}:{}:{}",
        marca.to_lowercase(),
        modelo.to_lowercase(),
        propietario.to_lowercase()
    );
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_URL, seed.as_bytes())
        .simple()
        .to_string();
    format!("IMP-{}", &digest[..12])
}

/// Returns (client id, created?).
fn find_or_create_client(conn: &Connection, nombre: &str) -> Result<(i64, bool), String> {
    let existing = conn
        .query_row(
            "SELECT id FROM clients WHERE nombre = ?1",
            [nombre],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map_err(|e| format!("No se pudo buscar el cliente '{nombre}': {e}"))?;
    if let Some(id) = existing {
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO clients (nombre, tipo_cliente, fecha_registro, activo, notas) \
         VALUES (?1, 'Particular', ?2, 1, 'Cliente creado automáticamente durante la importación de planillas')",
        rusqlite::params![nombre, dates::today().format("%Y-%m-%d").to_string()],
    )
    .map_err(|e| format!("No se pudo crear el cliente '{nombre}': {e}"))?;
    Ok((conn.last_insert_rowid(), true))
}

/// Returns (equipment id, created?). Identity is (marca, modelo,
/// propietario); an existing row missing its client link gets adopted.
fn find_or_create_equipment(
    conn: &Connection,
    identity: &EquipmentIdentity,
    propietario: &str,
    cliente_id: i64,
    nombre_original: &str,
) -> Result<(i64, bool), String> {
    let existing = conn
        .query_row(
            "SELECT id, cliente_id FROM equipment WHERE marca = ?1 AND modelo = ?2 AND propietario = ?3",
            rusqlite::params![identity.marca, identity.modelo, propietario],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .optional()
        .map_err(|e| format!("No se pudo buscar el equipo '{nombre_original}': {e}"))?;

    if let Some((id, linked_client)) = existing {
        if linked_client.is_none() {
            conn.execute(
                "UPDATE equipment SET cliente_id = ?1, updated_at = datetime('now') WHERE id = ?2",
                rusqlite::params![cliente_id, id],
            )
            .map_err(|e| format!("No se pudo vincular el equipo '{nombre_original}' al cliente: {e}"))?;
        }
        return Ok((id, false));
    }

    conn.execute(
        "INSERT INTO equipment (marca, modelo, anio, n_serie, propietario, cliente_id, notes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            identity.marca,
            identity.modelo,
            identity.anio,
            identity.n_serie,
            propietario,
            cliente_id,
            format!("Importado desde planilla - Nombre original: {nombre_original}"),
        ],
    )
    .map_err(|e| format!("No se pudo crear el equipo '{nombre_original}': {e}"))?;
    Ok((conn.last_insert_rowid(), true))
}

/// A job already in the store counts as the same work when equipment and
/// date match and the stored description contains the first 50 characters
/// of the incoming one. Stored descriptions may be longer than what a
/// re-import produces, so containment is the stable signal.
fn job_exists(
    conn: &Connection,
    equipment_id: i64,
    fecha: &str,
    descripcion: &str,
) -> Result<bool, String> {
    let prefix = descripcion
        .chars()
        .take(DEDUP_DESCRIPTION_PREFIX_CHARS)
        .collect::<String>();
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM jobs \
         WHERE equipment_id = ?1 AND date_done = ?2 \
           AND instr(description, ?3) > 0)",
        rusqlite::params![equipment_id, fecha, prefix],
        |row| row.get::<_, i64>(0),
    )
    .map(|v| v != 0)
    .map_err(|e| format!("No se pudo verificar trabajos duplicados: {e}"))
}

fn insert_job(conn: &Connection, equipment_id: i64, entry: &WorkEntry) -> Result<(), String> {
    conn.execute(
        "INSERT INTO jobs (equipment_id, date_done, description, budget_cents, notes) \
         VALUES (?1, ?2, ?3, ?4, 'Importado desde planilla')",
        rusqlite::params![
            equipment_id,
            entry.fecha.format("%Y-%m-%d").to_string(),
            entry.descripcion,
            entry.presupuesto_cents,
        ],
    )
    .map_err(|e| format!("No se pudo insertar el trabajo: {e}"))?;
    Ok(())
}

struct GroupOutcome {
    entries_imported: i64,
    entries_skipped: i64,
    client_created: bool,
    equipment_created: bool,
}

fn reconcile_group(conn: &Connection, group: &EquipmentGroup) -> Result<GroupOutcome, String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("No se pudo iniciar la transacción: {e}"))?;

    let identity = derive_identity(&group.nombre, &group.propietario);
    let (cliente_id, client_created) = find_or_create_client(&tx, &group.propietario)?;
    let (equipment_id, equipment_created) =
        find_or_create_equipment(&tx, &identity, &group.propietario, cliente_id, &group.nombre)?;

    let mut entries_imported = 0_i64;
    let mut entries_skipped = 0_i64;
    for entry in &group.trabajos {
        let fecha = entry.fecha.format("%Y-%m-%d").to_string();
        if job_exists(&tx, equipment_id, &fecha, &entry.descripcion)? {
            entries_skipped += 1;
        } else {
            insert_job(&tx, equipment_id, entry)?;
            entries_imported += 1;
        }
    }

    tx.commit()
        .map_err(|e| format!("No se pudo confirmar la transacción: {e}"))?;
    Ok(GroupOutcome {
        entries_imported,
        entries_skipped,
        client_created,
        equipment_created,
    })
}

/// Write every parsed group into the store. Re-running the same input is
/// a no-op: clients and equipment resolve by identity and jobs dedup by
/// (equipment, date, description prefix).
pub fn reconcile_groups(conn: &Connection, groups: &[EquipmentGroup]) -> ImportReport {
    let mut report = ImportReport::default();
    for group in groups {
        match reconcile_group(conn, group) {
            Ok(outcome) => {
                report.groups_imported += 1;
                report.entries_imported += outcome.entries_imported;
                report.entries_skipped += outcome.entries_skipped;
                if outcome.client_created {
                    report.clients_created += 1;
                }
                if outcome.equipment_created {
                    report.equipment_created += 1;
                }
            }
            Err(err) => {
                report.errors.push(format!(
                    "Error importando el equipo '{}' de '{}': {err}",
                    group.nombre, group.propietario
                ));
            }
        }
    }
    report
}
