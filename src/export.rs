use anyhow::Context;
use chrono::Local;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::report::{fmt1, TeacherReport};

const COLUMNS: [&str; 8] = [
    "Teacher Name",
    "Teaching",
    "Content",
    "Management",
    "Communication",
    "Preparedness",
    "Average",
    "Students",
];

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub rows: usize,
    pub sha256: String,
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn row_cells(t: &TeacherReport) -> [String; 8] {
    [
        t.name.clone(),
        fmt1(t.ratings.teaching),
        fmt1(t.ratings.content),
        fmt1(t.ratings.management),
        fmt1(t.ratings.communication),
        fmt1(t.ratings.preparedness),
        fmt1(t.average_rating),
        t.students.to_string(),
    ]
}

fn file_digest(path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read back {}", path.to_string_lossy()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Spreadsheet export: the filtered report rows as CSV, every rating rounded
/// to one decimal place. Formatting only; the aggregation already happened.
pub fn export_ratings_csv(rows: &[&TeacherReport], out_path: &Path) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let mut csv = COLUMNS.join(",");
    csv.push('\n');
    for t in rows {
        let cells = row_cells(t);
        let line: Vec<String> = cells.iter().map(|c| csv_quote(c)).collect();
        csv.push_str(&line.join(","));
        csv.push('\n');
    }

    std::fs::write(out_path, csv)
        .with_context(|| format!("failed to write {}", out_path.to_string_lossy()))?;

    Ok(ExportSummary {
        rows: rows.len(),
        sha256: file_digest(out_path)?,
    })
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn docx_paragraph(text: &str) -> String {
    format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", xml_escape(text))
}

fn docx_table_row(cells: &[String]) -> String {
    let mut row = String::from("<w:tr>");
    for cell in cells {
        row.push_str(&format!("<w:tc>{}</w:tc>", docx_paragraph(cell)));
    }
    row.push_str("</w:tr>");
    row
}

const CONTENT_TYPES_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">",
    "<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>",
    "<Default Extension=\"xml\" ContentType=\"application/xml\"/>",
    "<Override PartName=\"/word/document.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml\"/>",
    "</Types>",
);

const RELS_XML: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
    "<Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    "<Relationship Id=\"rId1\" ",
    "Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" ",
    "Target=\"word/document.xml\"/>",
    "</Relationships>",
);

/// Tabular document export: the same filtered rows as a minimal docx (a zip
/// container with one document part).
pub fn export_ratings_document(
    rows: &[&TeacherReport],
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let mut body = String::new();
    body.push_str(&docx_paragraph("Teacher Ratings"));
    let header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    let mut table = String::from("<w:tbl>");
    table.push_str(&docx_table_row(&header));
    for t in rows {
        table.push_str(&docx_table_row(&row_cells(t)));
    }
    table.push_str("</w:tbl>");
    body.push_str(&table);
    body.push_str(&docx_paragraph(&format!(
        "Generated on {}",
        Local::now().format("%Y-%m-%d")
    )));

    let document = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>",
            "<w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">",
            "<w:body>{}</w:body></w:document>",
        ),
        body
    );

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", opts)
        .context("failed to start content types entry")?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())
        .context("failed to write content types entry")?;

    zip.start_file("_rels/.rels", opts)
        .context("failed to start rels entry")?;
    zip.write_all(RELS_XML.as_bytes())
        .context("failed to write rels entry")?;

    zip.start_file("word/document.xml", opts)
        .context("failed to start document entry")?;
    zip.write_all(document.as_bytes())
        .context("failed to write document entry")?;

    zip.finish().context("failed to finalize document")?;

    Ok(ExportSummary {
        rows: rows.len(),
        sha256: file_digest(out_path)?,
    })
}
