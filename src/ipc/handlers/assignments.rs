use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    match req.params.get(key).and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(err(
            &req.id,
            "bad_params",
            format!("missing {}", key),
            None,
        )),
    }
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let level = req.params.get("level").and_then(|v| v.as_str());
    let strand_course = req.params.get("strandCourse").and_then(|v| v.as_str());
    let section = req.params.get("section").and_then(|v| v.as_str());

    let mut sql = String::from(
        "SELECT a.id, a.teacher_id, t.name, a.subject, a.level, a.strand_course, a.section
         FROM teacher_assignments a
         LEFT JOIN teachers t ON t.id = a.teacher_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(v) = level {
        sql.push_str(" AND a.level = ?");
        binds.push(v.to_string());
    }
    if let Some(v) = strand_course {
        sql.push_str(" AND a.strand_course = ?");
        binds.push(v.to_string());
    }
    if let Some(v) = section {
        sql.push_str(" AND a.section = ?");
        binds.push(v.to_string());
    }
    sql.push_str(" ORDER BY a.rowid");

    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "teacherId": r.get::<_, String>(1)?,
                "teacherName": r.get::<_, Option<String>>(2)?.unwrap_or_else(|| "Unknown".to_string()),
                "subject": r.get::<_, String>(3)?,
                "level": r.get::<_, String>(4)?,
                "strandCourse": r.get::<_, String>(5)?,
                "section": r.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let level = match required_str(req, "level") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let strand_course = match required_str(req, "strandCourse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let section = match required_str(req, "section") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let active: Option<i64> = match conn
        .query_row(
            "SELECT is_active FROM teachers WHERE id = ?",
            [&teacher_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match active {
        None => return err(&req.id, "not_found", "teacher not found", None),
        Some(0) => return err(&req.id, "bad_params", "teacher is inactive", None),
        Some(_) => {}
    }

    // A subject is bound at most once to a given cohort.
    let duplicate: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM teacher_assignments
             WHERE subject = ? AND level = ? AND strand_course = ? AND section = ?",
            (&subject, &level, &strand_course, &section),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if duplicate.is_some() {
        return err(
            &req.id,
            "bad_params",
            "this subject is already assigned to this section",
            None,
        );
    }

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO teacher_assignments(id, teacher_id, subject, level, strand_course, section)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &teacher_id,
            &subject,
            &level,
            &strand_course,
            &section,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teacher_assignments" })),
        );
    }

    ok(&req.id, json!({ "assignmentId": assignment_id }))
}

fn handle_assignments_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let deleted = match conn.execute(
        "DELETE FROM teacher_assignments WHERE id = ?",
        [&assignment_id],
    ) {
        Ok(n) => n,
        Err(e) => return err(&req.id, "db_delete_failed", e.to_string(), None),
    };
    if deleted == 0 {
        return err(&req.id, "not_found", "assignment not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.remove" => Some(handle_assignments_remove(state, req)),
        _ => None,
    }
}
