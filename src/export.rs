use printpdf::{BuiltinFont, Mm, PdfDocument};
use rocket::http::ContentType;
use rocket::response::Response;
use std::io::{BufWriter, Cursor};

use crate::error::AppError;
use crate::models::EntryRow;

pub const CSV_HEADERS: [&str; 11] = [
    "ID",
    "Child",
    "Date/Time",
    "Trigger",
    "Behaviour",
    "Intensity",
    "Duration (min)",
    "Resolution",
    "Outcome",
    "Notes",
    "Recorded By",
];

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

// A4 layout, all in millimetres from the top of the page.
const PAGE_WIDTH_MM: f64 = 210.0;
const PAGE_HEIGHT_MM: f64 = 297.0;
const MARGIN_LEFT_MM: f64 = 15.0;
const TOP_MM: f64 = 20.0;
const BOTTOM_MARGIN_MM: f64 = 40.0;
const LINE_STEP_MM: f64 = 6.0;
const BLOCK_GAP_MM: f64 = 10.0;
const TEXT_WIDTH_MM: f64 = 180.0;

const TITLE_PT: f64 = 16.0;
const BODY_PT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Pdf,
}

impl ExportFormat {
    /// Absent selector defaults to CSV; anything else is a client error.
    pub fn parse(value: Option<&str>) -> Result<Self, AppError> {
        match value.unwrap_or("csv") {
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(AppError::BadRequest(format!(
                "Invalid format '{}'. Use csv or pdf",
                other
            ))),
        }
    }
}

/// A rendered export delivered as a file download.
pub struct Download {
    pub content_type: ContentType,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl<'r> rocket::response::Responder<'r, 'static> for Download {
    fn respond_to(self, _req: &'r rocket::Request<'_>) -> rocket::response::Result<'static> {
        Response::build()
            .header(self.content_type)
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", self.filename),
            )
            .sized_body(self.bytes.len(), Cursor::new(self.bytes))
            .ok()
    }
}

/// Render the result set as CSV. Every cell is quote-wrapped with internal
/// quotes doubled; the header row is always present.
pub fn render_csv(entries: &[EntryRow]) -> Result<String, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;

    for entry in entries {
        writer.write_record([
            entry.id.to_string(),
            entry.kid_name.clone(),
            entry.event_date.format(DATE_FORMAT).to_string(),
            entry.trigger.clone().unwrap_or_default(),
            entry.behaviour.clone().unwrap_or_default(),
            entry.intensity.clone().unwrap_or_default(),
            entry
                .duration_minutes
                .map(|d| d.to_string())
                .unwrap_or_default(),
            entry.resolution.clone().unwrap_or_default(),
            entry.outcome.clone().unwrap_or_default(),
            entry.notes.clone().unwrap_or_default(),
            entry.username.clone(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV rendering failed: {}", e)))?;

    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("CSV was not UTF-8: {}", e)))
}

/// One positioned line of PDF text; `y_mm` is measured from the page top.
pub struct PdfLine {
    pub text: String,
    pub size: f64,
    pub y_mm: f64,
}

pub type PdfPage = Vec<PdfLine>;

/// Split text to fit `max_width_mm` at the given font size, breaking on
/// whitespace. Widths use an approximation of Helvetica metrics: the average
/// glyph is close to half an em (1 pt = 0.352778 mm). Words wider than a
/// whole line are hard-split.
pub fn split_to_width(text: &str, font_size_pt: f64, max_width_mm: f64) -> Vec<String> {
    let glyph_mm = font_size_pt * 0.5 * 0.352_778;
    let max_chars = ((max_width_mm / glyph_mm).floor() as usize).max(1);

    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;

        while word.chars().count() > max_chars {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max_chars).collect();
            word = &word[head.len()..];
            lines.push(head);
        }

        if current.is_empty() {
            current = word.to_string();
        } else if current.chars().count() + 1 + word.chars().count() <= max_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

fn entry_block(entry: &EntryRow) -> Vec<String> {
    let or_na = |field: &Option<String>| field.clone().unwrap_or_else(|| "N/A".to_string());

    let mut block = vec![
        format!("Entry #{} - {}", entry.id, entry.kid_name),
        format!("Date: {}", entry.event_date.format(DATE_FORMAT)),
        format!("Trigger: {}", or_na(&entry.trigger)),
        format!("Behaviour: {}", or_na(&entry.behaviour)),
        format!("Intensity: {}", or_na(&entry.intensity)),
        format!(
            "Duration: {} minutes",
            entry
                .duration_minutes
                .map(|d| d.to_string())
                .unwrap_or_else(|| "N/A".to_string())
        ),
        format!("Outcome: {}", or_na(&entry.outcome)),
    ];

    if let Some(resolution) = &entry.resolution {
        block.extend(split_to_width(
            &format!("Resolution: {}", resolution),
            BODY_PT,
            TEXT_WIDTH_MM,
        ));
    }

    if let Some(notes) = &entry.notes {
        block.extend(split_to_width(
            &format!("Notes: {}", notes),
            BODY_PT,
            TEXT_WIDTH_MM,
        ));
    }

    block.push(format!("Recorded by: {}", entry.username));
    block
}

/// Lay entries out into pages, breaking whenever the cursor would cross the
/// bottom margin. Separated from rendering so pagination can be checked
/// without parsing PDF bytes.
pub fn layout_entries(entries: &[EntryRow]) -> Vec<PdfPage> {
    let limit = PAGE_HEIGHT_MM - BOTTOM_MARGIN_MM;

    let mut pages: Vec<PdfPage> = vec![Vec::new()];
    let mut y = TOP_MM;

    pages[0].push(PdfLine {
        text: "Behaviour Journal Entries".to_string(),
        size: TITLE_PT,
        y_mm: y,
    });
    y += BLOCK_GAP_MM;

    for entry in entries {
        for text in entry_block(entry) {
            if y > limit {
                pages.push(Vec::new());
                y = TOP_MM;
            }

            // pages is never empty, last() always succeeds
            if let Some(page) = pages.last_mut() {
                page.push(PdfLine {
                    text,
                    size: BODY_PT,
                    y_mm: y,
                });
            }
            y += LINE_STEP_MM;
        }

        y += BLOCK_GAP_MM - LINE_STEP_MM;
    }

    pages
}

/// Render the result set as a paginated PDF document.
pub fn render_pdf(entries: &[EntryRow]) -> Result<Vec<u8>, AppError> {
    let pages = layout_entries(entries);

    let (doc, first_page, first_layer) = PdfDocument::new(
        "Behaviour Journal Entries",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| AppError::Internal(format!("PDF rendering failed: {}", e)))?;

    let mut page_refs = vec![(first_page, first_layer)];
    for _ in 1..pages.len() {
        page_refs.push(doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1"));
    }

    for (lines, (page_index, layer_index)) in pages.iter().zip(&page_refs) {
        let layer = doc.get_page(*page_index).get_layer(*layer_index);
        for line in lines {
            layer.use_text(
                line.text.clone(),
                line.size,
                Mm(MARGIN_LEFT_MM),
                Mm(PAGE_HEIGHT_MM - line.y_mm),
                &font,
            );
        }
    }

    let mut bytes = Vec::new();
    {
        let mut writer = BufWriter::new(&mut bytes);
        doc.save(&mut writer)
            .map_err(|e| AppError::Internal(format!("PDF rendering failed: {}", e)))?;
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::models::EntryRow;

    fn sample_entry(id: i64, notes: Option<&str>) -> EntryRow {
        EntryRow {
            id,
            kid_id: 1,
            user_id: 1,
            event_date: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
            trigger: Some("Transition".to_string()),
            behaviour: Some("Crying".to_string()),
            intensity: Some("Low".to_string()),
            duration_minutes: Some(5),
            resolution: None,
            outcome: Some("Resolved".to_string()),
            notes: notes.map(String::from),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 35, 0).unwrap(),
            kid_name: "Alice".to_string(),
            username: "casey".to_string(),
        }
    }

    #[test]
    fn test_csv_doubles_embedded_quotes() {
        let entries = vec![sample_entry(1, Some(r#"He said "no" twice"#))];
        let csv = render_csv(&entries).expect("CSV should render");

        assert!(csv.contains(r#""He said ""no"" twice""#));
    }

    #[test]
    fn test_csv_quotes_every_field_and_includes_header() {
        let entries = vec![sample_entry(1, None)];
        let csv = render_csv(&entries).expect("CSV should render");
        let mut lines = csv.lines();

        let header = lines.next().expect("header row missing");
        assert_eq!(
            header,
            r#""ID","Child","Date/Time","Trigger","Behaviour","Intensity","Duration (min)","Resolution","Outcome","Notes","Recorded By""#
        );

        let row = lines.next().expect("data row missing");
        assert!(row.starts_with(r#""1","Alice","2024-01-15 10:30","#));
        for field in row.split(',') {
            assert!(field.starts_with('"') && field.ends_with('"'));
        }
    }

    #[test]
    fn test_csv_header_present_for_empty_result() {
        let csv = render_csv(&[]).expect("CSV should render");
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_split_to_width_wraps_long_text() {
        let text = "word ".repeat(60);
        let lines = split_to_width(&text, BODY_PT, TEXT_WIDTH_MM);

        assert!(lines.len() > 1);

        let glyph_mm = BODY_PT * 0.5 * 0.352_778;
        let max_chars = (TEXT_WIDTH_MM / glyph_mm).floor() as usize;
        for line in &lines {
            assert!(line.chars().count() <= max_chars);
        }
    }

    #[test]
    fn test_split_to_width_hard_splits_oversized_words() {
        let text = "a".repeat(500);
        let lines = split_to_width(&text, BODY_PT, TEXT_WIDTH_MM);

        assert!(lines.len() > 1);
        assert_eq!(
            lines.iter().map(|l| l.chars().count()).sum::<usize>(),
            500
        );
    }

    #[test]
    fn test_layout_breaks_pages_at_bottom_margin() {
        let entries: Vec<EntryRow> = (1..=60)
            .map(|id| sample_entry(id, Some("A note that needs some room")))
            .collect();

        let pages = layout_entries(&entries);
        assert!(pages.len() > 1, "60 entries should not fit on one page");

        for page in &pages {
            assert!(!page.is_empty());
            for line in page {
                assert!(line.y_mm <= PAGE_HEIGHT_MM - BOTTOM_MARGIN_MM);
                assert!(line.y_mm >= TOP_MM);
            }
        }
    }

    #[test]
    fn test_layout_single_page_for_few_entries() {
        let pages = layout_entries(&[sample_entry(1, None)]);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0][0].size, TITLE_PT);
    }

    #[test]
    fn test_render_pdf_produces_a_pdf() {
        let bytes = render_pdf(&[sample_entry(1, None)]).expect("PDF should render");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(ExportFormat::parse(None).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("csv")).unwrap(), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse(Some("pdf")).unwrap(), ExportFormat::Pdf);
        assert!(matches!(
            ExportFormat::parse(Some("xlsx")),
            Err(AppError::BadRequest(_))
        ));
    }
}
