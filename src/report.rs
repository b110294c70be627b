use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The five fixed rating categories every answer ultimately lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Teaching,
    Content,
    Management,
    Communication,
    Preparedness,
}

pub const ALL_CATEGORIES: [Category; 5] = [
    Category::Teaching,
    Category::Content,
    Category::Management,
    Category::Communication,
    Category::Preparedness,
];

impl Category {
    /// Static contiguous-range table for numbered questionnaires:
    /// q1-q4 teaching, q5-q8 content, q9-q12 management, q13-q16
    /// communication, q17-q20 preparedness. Anything outside the table
    /// falls back to teaching, matching the deployed questionnaires.
    pub fn for_question(index: u32) -> Category {
        match index {
            1..=4 => Category::Teaching,
            5..=8 => Category::Content,
            9..=12 => Category::Management,
            13..=16 => Category::Communication,
            17..=20 => Category::Preparedness,
            _ => Category::Teaching,
        }
    }

    fn legacy_field(self) -> &'static str {
        match self {
            Category::Teaching => "teachingEffectiveness",
            Category::Content => "courseContent",
            Category::Management => "classroomManagement",
            Category::Communication => "communication",
            Category::Preparedness => "preparedness",
        }
    }
}

/// One raw evaluation record as read from the store. `teacher_name` is None
/// when the teacher row could not be resolved.
#[derive(Debug, Clone)]
pub struct EvalRecord {
    pub teacher_name: Option<String>,
    pub department: Option<String>,
    pub answers: Map<String, Value>,
}

/// An answer map is either the numbered questionnaire (q1..q20) or the legacy
/// fixed five-field shape. Classified before normalization so the statistics
/// below never branch on key shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSheet {
    Numbered,
    Legacy,
}

fn numbered_index(key: &str) -> Option<u32> {
    let rest = key.strip_prefix('q')?;
    if rest.is_empty() {
        return None;
    }
    rest.parse::<u32>().ok()
}

pub fn classify(answers: &Map<String, Value>) -> AnswerSheet {
    if answers.keys().any(|k| numbered_index(k).is_some()) {
        AnswerSheet::Numbered
    } else {
        AnswerSheet::Legacy
    }
}

/// Answers arrive as JSON numbers or numeric strings (legacy records were
/// string-valued). Anything else is excluded from its category sum.
fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Reduce one answer map to canonical (category, value) pairs. All format
/// branching lives here.
pub fn normalize(answers: &Map<String, Value>) -> Vec<(Category, f64)> {
    let mut out = Vec::new();
    match classify(answers) {
        AnswerSheet::Numbered => {
            for (key, value) in answers {
                let Some(index) = numbered_index(key) else {
                    continue;
                };
                if let Some(v) = numeric_value(value) {
                    out.push((Category::for_question(index), v));
                }
            }
        }
        AnswerSheet::Legacy => {
            for cat in ALL_CATEGORIES {
                if let Some(v) = answers.get(cat.legacy_field()).and_then(numeric_value) {
                    out.push((cat, v));
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRatings {
    pub teaching: f64,
    pub content: f64,
    pub management: f64,
    pub communication: f64,
    pub preparedness: f64,
}

impl CategoryRatings {
    fn get(&self, cat: Category) -> f64 {
        match cat {
            Category::Teaching => self.teaching,
            Category::Content => self.content,
            Category::Management => self.management,
            Category::Communication => self.communication,
            Category::Preparedness => self.preparedness,
        }
    }

    fn set(&mut self, cat: Category, v: f64) {
        match cat {
            Category::Teaching => self.teaching = v,
            Category::Content => self.content = v,
            Category::Management => self.management = v,
            Category::Communication => self.communication = v,
            Category::Preparedness => self.preparedness = v,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherReport {
    pub name: String,
    pub department: String,
    pub ratings: CategoryRatings,
    pub average_rating: f64,
    pub students: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherHighlight {
    pub name: String,
    pub average_rating: f64,
    pub students: usize,
}

impl TeacherHighlight {
    fn placeholder() -> Self {
        TeacherHighlight {
            name: "N/A".to_string(),
            average_rating: 0.0,
            students: 0,
        }
    }

    fn from_report(r: &TeacherReport) -> Self {
        TeacherHighlight {
            name: r.name.clone(),
            average_rating: r.average_rating,
            students: r.students,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub average_rating: f64,
    pub total_evaluations: usize,
    pub highest_rated_teacher: TeacherHighlight,
    pub lowest_rated_teacher: TeacherHighlight,
}

#[derive(Debug, Default)]
struct TeacherAccumulator {
    department: Option<String>,
    sums: HashMap<Category, f64>,
    counts: HashMap<Category, usize>,
    records: usize,
}

impl TeacherAccumulator {
    fn add_record(&mut self, record: &EvalRecord) {
        if self.department.is_none() {
            self.department = record.department.clone();
        }
        for (cat, value) in normalize(&record.answers) {
            *self.sums.entry(cat).or_insert(0.0) += value;
            *self.counts.entry(cat).or_insert(0) += 1;
        }
        self.records += 1;
    }
}

/// Group records by teacher name and reduce each group to per-category
/// averages plus an overall average over the non-zero categories. Grouping
/// order is first encounter, which also fixes tie-breaking downstream.
pub fn aggregate(records: &[EvalRecord]) -> Vec<TeacherReport> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, TeacherAccumulator> = HashMap::new();

    for record in records {
        let name = record
            .teacher_name
            .clone()
            .unwrap_or_else(|| "Unknown Teacher".to_string());
        if !groups.contains_key(&name) {
            order.push(name.clone());
        }
        groups.entry(name).or_default().add_record(record);
    }

    order
        .into_iter()
        .map(|name| {
            let acc = groups.remove(&name).unwrap_or_default();
            let mut ratings = CategoryRatings::default();
            for cat in ALL_CATEGORIES {
                let count = acc.counts.get(&cat).copied().unwrap_or(0);
                let avg = if count > 0 {
                    acc.sums.get(&cat).copied().unwrap_or(0.0) / count as f64
                } else {
                    0.0
                };
                ratings.set(cat, avg);
            }

            // Zero-count categories are excluded, not averaged in as 0.
            let non_zero: Vec<f64> = ALL_CATEGORIES
                .iter()
                .map(|c| ratings.get(*c))
                .filter(|v| *v > 0.0)
                .collect();
            let average_rating = if non_zero.is_empty() {
                0.0
            } else {
                non_zero.iter().sum::<f64>() / non_zero.len() as f64
            };

            TeacherReport {
                name,
                department: acc.department.unwrap_or_else(|| "General".to_string()),
                ratings,
                average_rating,
                students: acc.records,
            }
        })
        .collect()
}

/// System-wide rollup over already-aggregated teacher rows. Ties on the
/// highest/lowest slots go to the first occurrence (stable sort).
pub fn overall_stats(teachers: &[TeacherReport]) -> OverallStats {
    if teachers.is_empty() {
        return OverallStats {
            average_rating: 0.0,
            total_evaluations: 0,
            highest_rated_teacher: TeacherHighlight::placeholder(),
            lowest_rated_teacher: TeacherHighlight::placeholder(),
        };
    }

    let mut sorted: Vec<&TeacherReport> = teachers.iter().collect();
    sorted.sort_by(|a, b| {
        b.average_rating
            .partial_cmp(&a.average_rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    OverallStats {
        average_rating: teachers.iter().map(|t| t.average_rating).sum::<f64>()
            / teachers.len() as f64,
        total_evaluations: teachers.iter().map(|t| t.students).sum(),
        highest_rated_teacher: TeacherHighlight::from_report(sorted[0]),
        lowest_rated_teacher: TeacherHighlight::from_report(sorted[sorted.len() - 1]),
    }
}

/// Post-hoc view filter over aggregated rows; never feeds back into the
/// aggregation itself.
pub fn filter_view<'a>(
    teachers: &'a [TeacherReport],
    department: Option<&str>,
    teacher: Option<&str>,
) -> Vec<&'a TeacherReport> {
    teachers
        .iter()
        .filter(|t| department.map(|d| t.department == d).unwrap_or(true))
        .filter(|t| teacher.map(|n| t.name == n).unwrap_or(true))
        .collect()
}

/// One-decimal display formatting used by both export formats.
pub fn fmt1(v: f64) -> String {
    format!("{:.1}", v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, answers: Value) -> EvalRecord {
        EvalRecord {
            teacher_name: Some(name.to_string()),
            department: Some("College".to_string()),
            answers: answers.as_object().expect("answers object").clone(),
        }
    }

    #[test]
    fn legacy_two_fields_average_over_non_zero_categories() {
        let records = vec![record(
            "A",
            json!({ "teachingEffectiveness": "4", "courseContent": "5" }),
        )];
        let teachers = aggregate(&records);
        assert_eq!(teachers.len(), 1);
        let t = &teachers[0];
        assert_eq!(t.ratings.teaching, 4.0);
        assert_eq!(t.ratings.content, 5.0);
        assert_eq!(t.ratings.management, 0.0);
        assert_eq!(t.ratings.communication, 0.0);
        assert_eq!(t.ratings.preparedness, 0.0);
        assert_eq!(t.average_rating, 4.5);
    }

    #[test]
    fn numbered_all_teaching_leaves_other_categories_at_zero() {
        let records = vec![record(
            "B",
            json!({ "q1": 5, "q2": 5, "q3": 5, "q4": 5 }),
        )];
        let teachers = aggregate(&records);
        let t = &teachers[0];
        assert_eq!(t.ratings.teaching, 5.0);
        assert_eq!(t.ratings.content, 0.0);
        assert_eq!(t.average_rating, 5.0);
    }

    #[test]
    fn any_numbered_key_wins_over_legacy_fields() {
        // Mixed map: presence of a q-key makes the record numbered format.
        let answers = json!({ "q5": 4, "teachingEffectiveness": "1" });
        let map = answers.as_object().unwrap();
        assert_eq!(classify(map), AnswerSheet::Numbered);
        let pairs = normalize(map);
        assert_eq!(pairs, vec![(Category::Content, 4.0)]);
    }

    #[test]
    fn non_numeric_answers_are_excluded() {
        let records = vec![record("C", json!({ "q1": "n/a", "q2": "4", "q3": null }))];
        let teachers = aggregate(&records);
        assert_eq!(teachers[0].ratings.teaching, 4.0);
    }

    #[test]
    fn question_range_table() {
        assert_eq!(Category::for_question(1), Category::Teaching);
        assert_eq!(Category::for_question(4), Category::Teaching);
        assert_eq!(Category::for_question(5), Category::Content);
        assert_eq!(Category::for_question(12), Category::Management);
        assert_eq!(Category::for_question(13), Category::Communication);
        assert_eq!(Category::for_question(20), Category::Preparedness);
        assert_eq!(Category::for_question(21), Category::Teaching);
    }

    #[test]
    fn unknown_teacher_fallback_groups_unresolved_records() {
        let mut rec = record("ignored", json!({ "q1": 3 }));
        rec.teacher_name = None;
        rec.department = None;
        let teachers = aggregate(&[rec]);
        assert_eq!(teachers[0].name, "Unknown Teacher");
        assert_eq!(teachers[0].department, "General");
    }

    #[test]
    fn empty_teacher_is_independent_of_others() {
        let records = vec![
            record("Rated", json!({ "q1": 4, "q5": 4 })),
            record("Empty", json!({ "q1": "not a number" })),
        ];
        let teachers = aggregate(&records);
        assert_eq!(teachers.len(), 2);
        assert_eq!(teachers[0].average_rating, 4.0);
        assert_eq!(teachers[1].average_rating, 0.0);
        // The empty teacher still counts one record.
        assert_eq!(teachers[1].students, 1);
    }

    #[test]
    fn overall_stats_default_placeholder() {
        let stats = overall_stats(&[]);
        assert_eq!(stats.highest_rated_teacher.name, "N/A");
        assert_eq!(stats.lowest_rated_teacher.average_rating, 0.0);
        assert_eq!(stats.total_evaluations, 0);
    }

    #[test]
    fn overall_stats_ties_keep_first_occurrence() {
        let records = vec![
            record("First", json!({ "q1": 4 })),
            record("Second", json!({ "q1": 4 })),
        ];
        let teachers = aggregate(&records);
        let stats = overall_stats(&teachers);
        assert_eq!(stats.highest_rated_teacher.name, "First");
        assert_eq!(stats.lowest_rated_teacher.name, "Second");
        assert_eq!(stats.total_evaluations, 2);
        assert_eq!(stats.average_rating, 4.0);
    }

    #[test]
    fn view_filter_does_not_touch_aggregates() {
        let mut shs = record("S", json!({ "q1": 3 }));
        shs.department = Some("Senior High School".to_string());
        let college = record("C", json!({ "q1": 5 }));
        let teachers = aggregate(&[shs, college]);

        let filtered = filter_view(&teachers, Some("College"), None);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "C");
        // Underlying aggregation unchanged.
        assert_eq!(teachers.len(), 2);

        let by_name = filter_view(&teachers, None, Some("S"));
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].average_rating, 3.0);
    }

    #[test]
    fn fmt1_rounds_to_one_decimal() {
        assert_eq!(fmt1(4.25), "4.2");
        assert_eq!(fmt1(4.55), "4.5");
        assert_eq!(fmt1(5.0), "5.0");
    }
}
