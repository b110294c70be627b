use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const LEVELS: [&str; 3] = ["shs", "college", "both"];

fn subjects_from_params(v: Option<&serde_json::Value>) -> Result<Vec<String>, String> {
    let Some(v) = v else {
        return Ok(Vec::new());
    };
    let Some(arr) = v.as_array() else {
        return Err("subjects must be an array of strings".to_string());
    };
    let mut out = Vec::new();
    for item in arr {
        let Some(s) = item.as_str() else {
            return Err("subjects must be an array of strings".to_string());
        };
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|x: &String| x == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn teacher_row_json(
    id: String,
    name: String,
    department: String,
    level: String,
    is_active: bool,
    subjects_raw: String,
) -> serde_json::Value {
    let subjects: Vec<String> = serde_json::from_str(&subjects_raw).unwrap_or_default();
    json!({
        "id": id,
        "name": name,
        "department": department,
        "level": level,
        "isActive": is_active,
        "subjects": subjects
    })
}

fn handle_teachers_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let include_inactive = req
        .params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let sql = if include_inactive {
        "SELECT id, name, department, level, is_active, subjects FROM teachers ORDER BY name"
    } else {
        "SELECT id, name, department, level, is_active, subjects FROM teachers
         WHERE is_active = 1 ORDER BY name"
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |r| {
            Ok(teacher_row_json(
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get::<_, i64>(4)? != 0,
                r.get(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_teachers_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing name", None),
    };
    if name.is_empty() {
        return err(&req.id, "bad_params", "teacher name is required", None);
    }
    let department = match req.params.get("department").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return err(&req.id, "bad_params", "missing department", None),
    };
    if department.is_empty() {
        return err(&req.id, "bad_params", "department is required", None);
    }
    let level = req
        .params
        .get("level")
        .and_then(|v| v.as_str())
        .unwrap_or("both")
        .to_string();
    if !LEVELS.contains(&level.as_str()) {
        return err(
            &req.id,
            "bad_params",
            "level must be one of: shs, college, both",
            None,
        );
    }
    let subjects = match subjects_from_params(req.params.get("subjects")) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };

    let teacher_id = Uuid::new_v4().to_string();
    let subjects_raw = serde_json::to_string(&subjects).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, name, department, level, is_active, subjects)
         VALUES(?, ?, ?, ?, 1, ?)",
        (&teacher_id, &name, &department, &level, &subjects_raw),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    ok(&req.id, json!({ "teacherId": teacher_id, "name": name }))
}

fn handle_teachers_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [&teacher_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    for (key, value) in patch {
        let result = match key.as_str() {
            "name" | "department" => {
                let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("{} must be a non-empty string", key),
                        None,
                    );
                };
                let sql = if key == "name" {
                    "UPDATE teachers SET name = ? WHERE id = ?"
                } else {
                    "UPDATE teachers SET department = ? WHERE id = ?"
                };
                conn.execute(sql, (s, &teacher_id))
            }
            "level" => {
                let Some(s) = value.as_str().filter(|s| LEVELS.contains(s)) else {
                    return err(
                        &req.id,
                        "bad_params",
                        "level must be one of: shs, college, both",
                        None,
                    );
                };
                conn.execute("UPDATE teachers SET level = ? WHERE id = ?", (s, &teacher_id))
            }
            "subjects" => {
                let subjects = match subjects_from_params(Some(value)) {
                    Ok(v) => v,
                    Err(msg) => return err(&req.id, "bad_params", msg, None),
                };
                let raw = serde_json::to_string(&subjects).unwrap_or_else(|_| "[]".to_string());
                conn.execute(
                    "UPDATE teachers SET subjects = ? WHERE id = ?",
                    (&raw, &teacher_id),
                )
            }
            _ => return err(&req.id, "bad_params", format!("unknown field: {}", key), None),
        };
        if let Err(e) = result {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_teachers_deactivate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teacher_id = match req.params.get("teacherId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing teacherId", None),
    };

    // Teachers are deactivated, never deleted; evaluation records keep
    // pointing at the row.
    let updated = match conn.execute(
        "UPDATE teachers SET is_active = 0 WHERE id = ?",
        [&teacher_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_update_failed", e.to_string(), None),
    };
    if updated == 0 {
        return err(&req.id, "not_found", "teacher not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "teachers.list" => Some(handle_teachers_list(state, req)),
        "teachers.create" => Some(handle_teachers_create(state, req)),
        "teachers.update" => Some(handle_teachers_update(state, req)),
        "teachers.deactivate" => Some(handle_teachers_deactivate(state, req)),
        _ => None,
    }
}
