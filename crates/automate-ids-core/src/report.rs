//! # Report Module
//!
//! Renders an `Assessment` as a downloadable file.
//!
//! | Format | Content |
//! |--------|---------|
//! | JSON   | criteria plus `missing` / `invalid` / `passing` object lists |
//! | HTML   | standalone page with one table row per object |
//! | PDF    | Helvetica text pages, 60 lines per A4 page |
//!
//! Rows are listed missing first, then invalid, then passing.

use crate::assessment::{AssessedObject, Assessment};
use crate::error::Result;
use crate::evaluator::Outcome;
use crate::inputs::ReportFormat;
use serde::Serialize;
use serde_json::json;

/// Column header shared by the HTML and PDF reports.
pub const HEADER: [&str; 5] = ["Name", "Type", "Family", "ID", "Status"];

/// Lines per PDF page.
pub const PDF_LINES_PER_PAGE: usize = 60;

const GROUP_ORDER: [Outcome; 3] = [Outcome::Missing, Outcome::Invalid, Outcome::Passing];

/// What the report was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criteria {
    pub category: String,
    pub property: String,
    pub rule: String,
}

impl Criteria {
    pub fn new(category: &str, property: &str, rule: &str) -> Self {
        Self {
            category: category.to_string(),
            property: property.to_string(),
            rule: rule.to_string(),
        }
    }

    /// `Windows - OmniClass Number - 23.30.20`
    pub fn title(&self) -> String {
        format!("{} - {} - {}", self.category, self.property, self.rule)
    }
}

impl From<(&str, &str, &str)> for Criteria {
    fn from((category, property, rule): (&str, &str, &str)) -> Self {
        Self::new(category, property, rule)
    }
}

/// Render a report in the requested format.
pub fn render(assessment: &Assessment, format: ReportFormat, criteria: &Criteria) -> Result<Vec<u8>> {
    match format {
        ReportFormat::Json => render_json(assessment, criteria),
        ReportFormat::Html => Ok(render_html(assessment, criteria).into_bytes()),
        ReportFormat::Pdf => Ok(render_pdf(assessment, criteria)),
    }
}

fn ordered_rows(assessment: &Assessment) -> impl Iterator<Item = &AssessedObject> {
    GROUP_ORDER
        .into_iter()
        .flat_map(move |outcome| assessment.group(outcome))
}

fn row_cells(object: &AssessedObject) -> [&str; 5] {
    [
        object.info.name.as_str(),
        object.info.type_name.as_str(),
        object.info.family.as_str(),
        object.info.id.as_str(),
        object.outcome.title(),
    ]
}

// =============================================================================
// JSON
// =============================================================================

/// JSON report with four-space indentation.
pub fn render_json(assessment: &Assessment, criteria: &Criteria) -> Result<Vec<u8>> {
    let value = json!({
        "Assessment Criteria": {
            "Category": criteria.category,
            "Property": criteria.property,
            "Value": criteria.rule,
        },
        "Results": {
            "missing": assessment.infos(Outcome::Missing),
            "invalid": assessment.infos(Outcome::Invalid),
            "passing": assessment.infos(Outcome::Passing),
        },
    });

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

// =============================================================================
// HTML
// =============================================================================

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Standalone HTML page.
pub fn render_html(assessment: &Assessment, criteria: &Criteria) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n<title>Report</title>\n");
    html.push_str(
        "<style>\nbody { font-family: Helvetica, Arial, sans-serif; margin: 2em; }\n\
         table { border-collapse: collapse; width: 100%; }\n\
         th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }\n\
         tr.missing td:last-child { color: #b00020; }\n\
         tr.invalid td:last-child { color: #c77700; }\n\
         tr.passing td:last-child { color: #2e7d32; }\n</style>\n",
    );
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>Report: {}</h1>\n", escape_html(&criteria.title())));
    html.push_str(&format!("<p>{}</p>\n", escape_html(&assessment.rate_message())));

    html.push_str("<table>\n<thead><tr>");
    for column in HEADER {
        html.push_str(&format!("<th>{}</th>", column));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for object in ordered_rows(assessment) {
        html.push_str(&format!("<tr class=\"{}\">", object.outcome.as_str()));
        for cell in row_cells(object) {
            html.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

// =============================================================================
// PDF
// =============================================================================

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN: u32 = 40;
const FONT_SIZE: u32 = 9;
const LEADING: u32 = 13;

/// Text lines of the PDF report, before pagination.
pub fn pdf_lines(assessment: &Assessment, criteria: &Criteria) -> Vec<String> {
    let mut lines = vec![
        "Report".to_string(),
        format!(
            "Category: {} | Property: {} | Rule: {}",
            criteria.category, criteria.property, criteria.rule
        ),
        assessment.rate_message(),
        String::new(),
        HEADER.join(" | "),
    ];
    lines.extend(ordered_rows(assessment).map(|object| row_cells(object).join(" | ")));
    lines
}

/// Encode a line as a PDF literal string body (Latin-1, escaped).
fn pdf_string(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            '\t' => out.push(b' '),
            c if c.is_control() => out.push(b'?'),
            c => match u8::try_from(u32::from(c)) {
                Ok(byte) => out.push(byte),
                Err(_) => out.push(b'?'),
            },
        }
    }
    out
}

fn page_stream(lines: &[String]) -> Vec<u8> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut stream = Vec::new();
    stream.extend_from_slice(
        format!("BT\n/F1 {} Tf\n{} TL\n{} {} Td\n", FONT_SIZE, LEADING, MARGIN, top).as_bytes(),
    );
    for line in lines {
        stream.push(b'(');
        stream.extend_from_slice(&pdf_string(line));
        stream.extend_from_slice(b") Tj T*\n");
    }
    stream.extend_from_slice(b"ET\n");
    stream
}

/// Minimal PDF writer: numbered objects followed by a cross-reference table.
struct PdfWriter {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    /// Write object `number` (1-based, in order) with a dictionary body.
    fn object(&mut self, body: &str) {
        self.offsets.push(self.out.len());
        let number = self.offsets.len();
        self.out
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }

    fn stream(&mut self, data: &[u8]) {
        self.offsets.push(self.out.len());
        let number = self.offsets.len();
        self.out.extend_from_slice(
            format!("{} 0 obj\n<< /Length {} >>\nstream\n", number, data.len()).as_bytes(),
        );
        self.out.extend_from_slice(data);
        self.out.extend_from_slice(b"endstream\nendobj\n");
    }

    fn finish(mut self, root: usize) -> Vec<u8> {
        let xref = self.out.len();
        let size = self.offsets.len() + 1;
        let mut table = format!("xref\n0 {}\n0000000000 65535 f \n", size);
        for offset in &self.offsets {
            table.push_str(&format!("{:010} 00000 n \n", offset));
        }
        table.push_str(&format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            size, root, xref
        ));
        self.out.extend_from_slice(table.as_bytes());
        self.out
    }
}

/// PDF report bytes.
pub fn render_pdf(assessment: &Assessment, criteria: &Criteria) -> Vec<u8> {
    let lines = pdf_lines(assessment, criteria);
    let pages: Vec<&[String]> = lines.chunks(PDF_LINES_PER_PAGE).collect();

    // 1 catalog, 2 page tree, 3 font, then (page, content) pairs.
    let page_number = |index: usize| 4 + index * 2;
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", page_number(i)))
        .collect();

    let mut pdf = PdfWriter::new();
    pdf.object("<< /Type /Catalog /Pages 2 0 R >>");
    pdf.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages.len()
    ));
    pdf.object("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    for (index, page) in pages.iter().enumerate() {
        pdf.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            page_number(index) + 1
        ));
        pdf.stream(&page_stream(page));
    }
    pdf.finish(1)
}

// =============================================================================
// TESTS
// =============================================================================
