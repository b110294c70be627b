use crate::export;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, EvalRecord, TeacherReport};
use log::warn;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

/// Pull every evaluation with the live teacher row joined in. Records whose
/// answers no longer parse are skipped, not fatal.
fn load_records(conn: &Connection) -> anyhow::Result<Vec<EvalRecord>> {
    let mut stmt = conn.prepare(
        "SELECT t.name, t.department, e.answers
         FROM evaluations e
         LEFT JOIN teachers t ON t.id = e.teacher_id
         ORDER BY e.rowid",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for (teacher_name, department, answers_raw) in rows {
        match serde_json::from_str::<serde_json::Value>(&answers_raw) {
            Ok(serde_json::Value::Object(answers)) => records.push(EvalRecord {
                teacher_name,
                department,
                answers,
            }),
            _ => warn!("skipping evaluation with unparseable answers"),
        }
    }
    Ok(records)
}

fn filtered<'a>(
    teachers: &'a [TeacherReport],
    req: &Request,
) -> Vec<&'a TeacherReport> {
    let department = req.params.get("department").and_then(|v| v.as_str());
    let teacher = req.params.get("teacher").and_then(|v| v.as_str());
    report::filter_view(teachers, department, teacher)
}

fn handle_reports_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let records = match load_records(conn) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let teachers = report::aggregate(&records);
    let view = filtered(&teachers, req);
    let stats = report::overall_stats(&teachers);

    ok(
        &req.id,
        json!({
            "teachers": view,
            "stats": stats
        }),
    )
}

fn out_path_param(req: &Request) -> Result<PathBuf, serde_json::Value> {
    match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(p) if !p.trim().is_empty() => Ok(PathBuf::from(p)),
        _ => Err(err(&req.id, "bad_params", "missing outPath", None)),
    }
}

fn handle_export(
    state: &mut AppState,
    req: &Request,
    write: fn(&[&TeacherReport], &std::path::Path) -> anyhow::Result<export::ExportSummary>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match out_path_param(req) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    let records = match load_records(conn) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let teachers = report::aggregate(&records);
    let view = filtered(&teachers, req);

    match write(&view, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "rows": summary.rows,
                "sha256": summary.sha256
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.summary" => Some(handle_reports_summary(state, req)),
        "reports.exportCsv" => Some(handle_export(state, req, export::export_ratings_csv)),
        "reports.exportDocument" => {
            Some(handle_export(state, req, export::export_ratings_document))
        }
        _ => None,
    }
}
