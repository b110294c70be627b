use crate::db::{settings_get_json, settings_set_json};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

const COLLECTIONS: [&str; 4] = ["strands", "courses", "questions", "filterWords"];

fn collection_key(collection: &str) -> String {
    format!("config.{}", collection)
}

fn cohort(id: &str, sections: &[&str], subjects: &[&str]) -> Value {
    json!({ "id": id, "name": id, "sections": sections, "subjects": subjects })
}

/// Seed values carried over from the first deployment. A fresh store answers
/// its first `config.get` with exactly these.
fn defaults(collection: &str) -> Value {
    match collection {
        "strands" => json!([
            cohort(
                "ABM",
                &["9-1", "9-2", "8-1"],
                &["Business Math", "Entrepreneurship", "Business Ethics"],
            ),
            cohort(
                "GAS",
                &["9-1", "9-2", "8-1"],
                &["General Mathematics", "Earth Science", "Physical Science"],
            ),
            cohort(
                "HUMSS",
                &["9-1", "9-2", "9-3", "9-4", "8-1", "8-2"],
                &[
                    "Philippine Politics",
                    "Community Engagement",
                    "Media and Information Literacy",
                ],
            ),
            cohort(
                "TVL",
                &["9-1", "8-1"],
                &["Technical Drafting", "Computer Programming", "Electronics"],
            ),
        ]),
        "courses" => json!([
            cohort(
                "BSIT",
                &["1-1", "2-1", "3-1", "4-1"],
                &["Programming", "Database Systems", "Web Development", "System Analysis"],
            ),
            cohort(
                "ACT",
                &["1-1", "2-1"],
                &["Financial Accounting", "Cost Accounting", "Taxation"],
            ),
            cohort(
                "BSE",
                &["1-1", "2-1", "3-1", "4-1"],
                &["Educational Psychology", "Curriculum Development", "Teaching Methods"],
            ),
        ]),
        "questions" => json!([
            {
                "id": "1",
                "text": "How would you rate the teacher's overall performance?",
                "category": "Overall"
            },
            {
                "id": "2",
                "text": "How clear were the teacher's explanations?",
                "category": "Teaching Quality"
            },
            {
                "id": "3",
                "text": "How well did the teacher manage classroom time?",
                "category": "Time Management"
            },
            {
                "id": "4",
                "text": "How approachable was the teacher for questions?",
                "category": "Accessibility"
            }
        ]),
        "filterWords" => json!([
            "excellent",
            "good",
            "great",
            "amazing",
            "poor",
            "bad",
            "terrible",
            "disappointing"
        ]),
        _ => json!([]),
    }
}

/// Load a collection, seeding the defaults on first access so subsequent
/// reads come back from the store.
fn load_collection(conn: &Connection, collection: &str) -> anyhow::Result<Vec<Value>> {
    if let Some(Value::Array(entries)) = settings_get_json(conn, &collection_key(collection))? {
        return Ok(entries);
    }
    let seeded = defaults(collection);
    settings_set_json(conn, &collection_key(collection), &seeded)?;
    match seeded {
        Value::Array(entries) => Ok(entries),
        _ => Ok(Vec::new()),
    }
}

fn store_collection(
    conn: &Connection,
    collection: &str,
    entries: &[Value],
) -> anyhow::Result<()> {
    settings_set_json(conn, &collection_key(collection), &Value::Array(entries.to_vec()))
}

fn collection_param(req: &Request) -> Result<String, serde_json::Value> {
    match req.params.get("collection").and_then(|v| v.as_str()) {
        Some(c) if COLLECTIONS.contains(&c) => Ok(c.to_string()),
        Some(c) => Err(err(
            &req.id,
            "bad_params",
            format!("unknown collection: {}", c),
            None,
        )),
        None => Err(err(&req.id, "bad_params", "missing collection", None)),
    }
}

fn handle_config_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let collection = match collection_param(req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    match load_collection(conn, &collection) {
        Ok(entries) => ok(&req.id, json!({ "collection": collection, "entries": entries })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn non_empty_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn coerce_string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn string_list(entry: &Value, key: &str) -> Vec<String> {
    entry.get(key).map(coerce_string_list).unwrap_or_default()
}

fn handle_config_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let collection = match collection_param(req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let Some(entry) = req.params.get("entry") else {
        return err(&req.id, "bad_params", "missing entry", None);
    };

    let mut entries = match load_collection(conn, &collection) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let added = match collection.as_str() {
        "strands" | "courses" => {
            let Some(name) = non_empty_field(entry, "name") else {
                return err(&req.id, "bad_params", "name is required", None);
            };
            json!({
                "id": Uuid::new_v4().to_string(),
                "name": name,
                "sections": string_list(entry, "sections"),
                "subjects": string_list(entry, "subjects")
            })
        }
        "questions" => {
            let Some(text) = non_empty_field(entry, "text") else {
                return err(&req.id, "bad_params", "question text is required", None);
            };
            let category =
                non_empty_field(entry, "category").unwrap_or_else(|| "Overall".to_string());
            json!({
                "id": Uuid::new_v4().to_string(),
                "text": text,
                "category": category
            })
        }
        "filterWords" => {
            let Some(word) = non_empty_field(entry, "word") else {
                return err(&req.id, "bad_params", "keyword is required", None);
            };
            let word = word.to_lowercase();
            let exists = entries.iter().any(|w| w.as_str() == Some(word.as_str()));
            if exists {
                return err(&req.id, "bad_params", "keyword already exists", None);
            }
            Value::String(word)
        }
        _ => unreachable!(),
    };

    entries.push(added.clone());
    if let Err(e) = store_collection(conn, &collection, &entries) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "entry": added }))
}

fn handle_config_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let collection = match collection_param(req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if collection == "filterWords" {
        return err(
            &req.id,
            "bad_params",
            "keywords are added and removed, not edited",
            None,
        );
    }
    let Some(id) = req.params.get("id").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let editable: &[&str] = match collection.as_str() {
        "questions" => &["text", "category"],
        _ => &["name", "sections", "subjects"],
    };
    for key in patch.keys() {
        if !editable.contains(&key.as_str()) {
            return err(&req.id, "bad_params", format!("unknown field: {}", key), None);
        }
    }

    let mut entries = match load_collection(conn, &collection) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(target) = entries
        .iter_mut()
        .find(|e| e.get("id").and_then(|v| v.as_str()) == Some(id))
    else {
        return err(&req.id, "not_found", "entry not found", None);
    };

    for (key, value) in patch {
        match key.as_str() {
            "name" | "text" => {
                let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(
                        &req.id,
                        "bad_params",
                        format!("{} must be a non-empty string", key),
                        None,
                    );
                };
                target[key.as_str()] = json!(s);
            }
            "category" => {
                let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
                    return err(&req.id, "bad_params", "category must be a non-empty string", None);
                };
                target["category"] = json!(s);
            }
            "sections" | "subjects" => {
                target[key.as_str()] = json!(coerce_string_list(value));
            }
            _ => unreachable!(),
        }
    }
    let updated = target.clone();

    if let Err(e) = store_collection(conn, &collection, &entries) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "entry": updated }))
}

fn handle_config_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let collection = match collection_param(req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut entries = match load_collection(conn, &collection) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let before = entries.len();

    if collection == "filterWords" {
        let Some(word) = req.params.get("word").and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", "missing word", None);
        };
        let word = word.trim().to_lowercase();
        entries.retain(|w| w.as_str() != Some(word.as_str()));
    } else {
        let Some(id) = req.params.get("id").and_then(|v| v.as_str()) else {
            return err(&req.id, "bad_params", "missing id", None);
        };
        entries.retain(|e| e.get("id").and_then(|v| v.as_str()) != Some(id));
    }

    if entries.len() == before {
        return err(&req.id, "not_found", "entry not found", None);
    }
    if let Err(e) = store_collection(conn, &collection, &entries) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

const SEMESTER_KEY: &str = "config.semester";

fn semester_defaults() -> Value {
    json!({
        "semester": "1st Semester",
        "evaluationDate": Local::now().format("%Y-%m-%d").to_string()
    })
}

fn handle_semester_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match settings_get_json(conn, SEMESTER_KEY) {
        Ok(Some(config)) => ok(&req.id, config),
        Ok(None) => {
            let seeded = semester_defaults();
            if let Err(e) = settings_set_json(conn, SEMESTER_KEY, &seeded) {
                return err(&req.id, "db_update_failed", e.to_string(), None);
            }
            ok(&req.id, seeded)
        }
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_semester_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(semester) = req
        .params
        .get("semester")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return err(&req.id, "bad_params", "missing semester", None);
    };
    let Some(evaluation_date) = req
        .params
        .get("evaluationDate")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return err(&req.id, "bad_params", "missing evaluationDate", None);
    };

    let config = json!({ "semester": semester, "evaluationDate": evaluation_date });
    if let Err(e) = settings_set_json(conn, SEMESTER_KEY, &config) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, config)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "config.get" => Some(handle_config_get(state, req)),
        "config.add" => Some(handle_config_add(state, req)),
        "config.update" => Some(handle_config_update(state, req)),
        "config.remove" => Some(handle_config_remove(state, req)),
        "semester.get" => Some(handle_semester_get(state, req)),
        "semester.update" => Some(handle_semester_update(state, req)),
        _ => None,
    }
}
