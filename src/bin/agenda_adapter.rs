use agenda_taller_lib::{
    apply_embedded_migrations, import_file_at_db_path, import_preview_at_path,
    inspect_status_at_path, query_admin_db_stats_at_path, reset_admin_db_data_at_path,
    resolve_source_path_text, AdminResetRequest, ImportPreviewRequest, ImportRunRequest,
    DEFAULT_SOURCE_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct AdapterRequest {
    schema_version: u64,
    case: Option<AdapterCaseMeta>,
    endpoint: AdapterEndpoint,
    query: Value,
    dataset: AdapterDataset,
}

#[derive(Debug, Deserialize)]
struct AdapterCaseMeta {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterEndpoint {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdapterDataset {
    db_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct AdapterErrorBody {
    category: String,
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum AdapterResponse {
    #[serde(rename = "success")]
    Success { payload: Value },
    #[serde(rename = "error")]
    Error { error: AdapterErrorBody },
}

fn classify_error_message(message: &str) -> String {
    let validation_keywords = [
        "es obligatorio",
        "confirm_text incorrecto",
        "Formato de archivo no soportado",
        "No se encontró el archivo",
        "no tiene las tablas necesarias",
    ];
    if validation_keywords.iter().any(|k| message.contains(k)) {
        return "VALIDATION_ERROR".to_string();
    }

    let no_data_keywords = [
        "está vacía",
        "no tiene hojas",
        "No se encontraron registros",
        "La base de datos no existe",
    ];
    if no_data_keywords.iter().any(|k| message.contains(k)) {
        return "NO_DATA_ERROR".to_string();
    }

    "UNKNOWN_ERROR".to_string()
}

fn error_response(
    category: impl Into<String>,
    message: impl Into<String>,
    error_type: impl Into<String>,
) -> AdapterResponse {
    AdapterResponse::Error {
        error: AdapterErrorBody {
            category: category.into(),
            message: message.into(),
            error_type: error_type.into(),
        },
    }
}

fn parse_bool_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}

fn read_stdin_json() -> Result<Value, String> {
    let mut raw = String::new();
    io::stdin()
        .read_to_string(&mut raw)
        .map_err(|e| format!("No se pudo leer stdin: {e}"))?;
    if raw.trim().is_empty() {
        return Err("empty stdin request".to_string());
    }
    serde_json::from_str::<Value>(&raw).map_err(|e| format!("invalid JSON request: {e}"))
}

fn to_payload<T: Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| format!("No se pudo serializar la respuesta: {e}"))
}

fn require_db_path(dataset: &AdapterDataset) -> Result<&str, String> {
    dataset
        .db_path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.dataset.db_path missing".to_string())
}

fn dispatch(req: AdapterRequest) -> Result<Value, String> {
    if req.schema_version != 1 {
        return Err(format!(
            "unsupported schema_version: {}",
            req.schema_version
        ));
    }

    let path = req
        .endpoint
        .path
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "request.endpoint.path missing".to_string())?;

    match path {
        "/api/import/preview" => {
            let query_req: ImportPreviewRequest = serde_json::from_value(req.query)
                .map_err(|e| format!("request.query invalid for import/preview: {e}"))?;
            let source_path = resolve_source_path_text(query_req.source_path)?;
            import_preview_at_path(Path::new(&source_path))
        }
        "/api/import/run" => {
            let db_path = require_db_path(&req.dataset)?;
            let query_req: ImportRunRequest = serde_json::from_value(req.query)
                .map_err(|e| format!("request.query invalid for import/run: {e}"))?;
            let source_path = resolve_source_path_text(query_req.source_path)?;
            let source_type = query_req
                .source_type
                .unwrap_or_else(|| DEFAULT_SOURCE_TYPE.to_string());
            let source_type = source_type.trim();
            if source_type.is_empty() {
                return Err("source_type es obligatorio".to_string());
            }
            import_file_at_db_path(Path::new(db_path), Path::new(&source_path), source_type)
        }
        "/api/db/status" => {
            let db_path = require_db_path(&req.dataset)?;
            to_payload(inspect_status_at_path(Path::new(db_path))?)
        }
        "/api/db/migrate" => {
            let db_path = require_db_path(&req.dataset)?;
            to_payload(apply_embedded_migrations(Path::new(db_path))?)
        }
        "/api/db/admin-stats" => {
            let db_path = require_db_path(&req.dataset)?;
            to_payload(query_admin_db_stats_at_path(Path::new(db_path))?)
        }
        "/api/db/admin-reset" => {
            let db_path = require_db_path(&req.dataset)?;
            let query_req: AdminResetRequest = serde_json::from_value(req.query)
                .map_err(|e| format!("request.query invalid for db/admin-reset: {e}"))?;
            to_payload(reset_admin_db_data_at_path(
                Path::new(db_path),
                query_req.confirm_text.unwrap_or_default().as_str(),
            )?)
        }
        _ => Err(format!("unsupported endpoint path: {path}")),
    }
}

fn main() {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let pretty = parse_bool_flag(&args, "--pretty");
    let verbose = parse_bool_flag(&args, "--verbose");

    let resp = match read_stdin_json()
        .and_then(|v| {
            serde_json::from_value::<AdapterRequest>(v)
                .map_err(|e| format!("request root invalid: {e}"))
        })
        .and_then(|req| {
            if verbose {
                if let Some(case_meta) = &req.case {
                    if let Some(case_id) = &case_meta.id {
                        eprintln!("[agenda_adapter] case={case_id}");
                    }
                }
                if let Some(path) = req.endpoint.path.as_deref() {
                    eprintln!("[agenda_adapter] endpoint={path}");
                }
                if let Some(db_path) = req.dataset.db_path.as_deref() {
                    eprintln!("[agenda_adapter] db={db_path}");
                }
            }
            dispatch(req)
        }) {
        Ok(payload) => AdapterResponse::Success { payload },
        Err(message) => {
            let category = if message.starts_with("unsupported endpoint path:") {
                "UNSUPPORTED_ENDPOINT".to_string()
            } else if message.starts_with("unsupported schema_version:")
                || message.starts_with("request.")
                || message.starts_with("invalid JSON request:")
                || message == "empty stdin request"
            {
                "ADAPTER_PROTOCOL_ERROR".to_string()
            } else {
                classify_error_message(&message)
            };
            error_response(category, message, "AdapterError")
        }
    };

    let out = if pretty {
        serde_json::to_string_pretty(&resp)
    } else {
        serde_json::to_string(&resp)
    }
    .unwrap_or_else(|e| {
        json!({
            "status": "error",
            "error": {
                "category": "ADAPTER_PROTOCOL_ERROR",
                "message": format!("serialize response failed: {e}"),
                "type": "SerializeError",
            }
        })
        .to_string()
    });

    print!("{out}");
}
