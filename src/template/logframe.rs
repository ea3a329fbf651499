use serde::Deserialize;

use crate::docx::document::DocxDocument;
use crate::docx::table::{inches, TableGrid};
use crate::docx::wml::{self, RunStyle};
use crate::docx::xml::XmlElement;
use crate::template::records::lenient_text;

pub const HEADERS: [&str; 6] = [
    "Hierarchy of Targeted Results",
    "Objectively Verifiable Indicators (OVI)",
    "Baseline Data",
    "Targets",
    "Data Collection Methods",
    "Responsibility to Collect Data",
];

const COL_WIDTHS_IN: [f32; 6] = [2.1, 1.9, 1.2, 1.2, 1.5, 1.5];
const FONT: &str = "Arial";
const SIZE_PT: f32 = 9.0;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogframeEntry {
    #[serde(default, deserialize_with = "lenient_text")]
    pub hierarchy: String,
    #[serde(default, alias = "objectively_verifiable_indicators", deserialize_with = "lenient_text")]
    pub ovi: String,
    #[serde(default, alias = "baseline_data", deserialize_with = "lenient_text")]
    pub baseline: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub targets: String,
    #[serde(default, alias = "data_collection_methods", deserialize_with = "lenient_text")]
    pub methods: String,
    #[serde(default, alias = "responsibility_to_collect_data", deserialize_with = "lenient_text")]
    pub responsibility: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct LogframeData {
    #[serde(default, alias = "intermediate_outcomes")]
    pub intermediate: Vec<LogframeEntry>,
    #[serde(default, alias = "immediate_outcomes")]
    pub immediate: Vec<LogframeEntry>,
    #[serde(default)]
    pub outputs: Vec<LogframeEntry>,
}

impl LogframeData {
    /// Sections in table order with their headings.
    pub fn sections(&self) -> [(&'static str, &[LogframeEntry]); 3] {
        [
            ("Intermediate Outcome:", self.intermediate.as_slice()),
            ("Immediate Outcome:", self.immediate.as_slice()),
            ("Outputs:", self.outputs.as_slice()),
        ]
    }

    pub fn row_count(&self) -> usize {
        1 + self.intermediate.len() + self.immediate.len() + self.outputs.len()
    }
}

/// Who owns the document the logframes are written into.
pub enum LogframeMode<'a> {
    /// A fresh document, from `template` or blank, serialized on completion.
    Standalone { template: Option<&'a [u8]> },
    /// A caller-owned document; nothing is serialized.
    Append(&'a mut DocxDocument),
}

fn line_paragraphs(text: &str, style: &RunStyle) -> Vec<XmlElement> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| wml::text_paragraph(l, Some(style)))
        .collect()
}

/// Builds the table. The row count is fixed before any cell is written.
pub fn logframe_table(data: &LogframeData) -> XmlElement {
    let widths: Vec<u32> = COL_WIDTHS_IN.iter().map(|w| inches(*w)).collect();
    let mut grid = TableGrid::new(data.row_count(), HEADERS.len(), &widths);
    let plain = RunStyle::default().font(FONT).size(SIZE_PT);
    let bold = plain.clone().bold();

    for (c, title) in HEADERS.iter().enumerate() {
        grid.cell_mut(0, c).set_text(title, Some(&bold));
    }

    let mut r = 1;
    for (heading, entries) in data.sections() {
        for (i, entry) in entries.iter().enumerate() {
            let label = grid.cell_mut(r, 0);
            label.clear();
            if i == 0 {
                label.push_paragraph(wml::text_paragraph(heading, Some(&bold)));
            }
            for p in line_paragraphs(&entry.hierarchy, &plain) {
                label.push_paragraph(p);
            }

            let columns = [
                &entry.ovi,
                &entry.baseline,
                &entry.targets,
                &entry.methods,
                &entry.responsibility,
            ];
            for (offset, text) in columns.into_iter().enumerate() {
                let cell = grid.cell_mut(r, offset + 1);
                cell.clear();
                for p in line_paragraphs(text, &plain) {
                    cell.push_paragraph(p);
                }
            }
            r += 1;
        }
    }
    grid.to_element()
}

/// Appends one logframe table at the end of the body.
pub fn build_logframe_table(doc: &mut DocxDocument, data: &LogframeData) {
    doc.ensure_table_grid_style();
    doc.append_block(logframe_table(data));
    log::debug!("appended logframe table with {} row(s)", data.row_count());
}

/// Appends every logframe, separating consecutive tables with two blank paragraphs.
pub fn append_logframes(doc: &mut DocxDocument, data: &[LogframeData]) {
    for (i, lf) in data.iter().enumerate() {
        if i > 0 {
            doc.append_block(wml::new_paragraph());
            doc.append_block(wml::new_paragraph());
        }
        build_logframe_table(doc, lf);
    }
}

/// Writes `data` according to `mode`. Only a standalone run returns bytes.
pub fn write_logframes(mode: LogframeMode<'_>, data: &[LogframeData]) -> anyhow::Result<Option<Vec<u8>>> {
    match mode {
        LogframeMode::Standalone { template } => {
            let mut doc = match template {
                Some(bytes) => DocxDocument::from_bytes(bytes)?,
                None => DocxDocument::blank()?,
            };
            append_logframes(&mut doc, data);
            Ok(Some(doc.to_bytes()?))
        }
        LogframeMode::Append(doc) => {
            append_logframes(doc, data);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::table::{cell_at, cell_paragraph_texts, table_rows};

    fn entry(h: &str) -> LogframeEntry {
        LogframeEntry {
            hierarchy: h.to_string(),
            ovi: "Indicator 1\n\nIndicator 2".to_string(),
            ..Default::default()
        }
    }

    fn sample() -> LogframeData {
        LogframeData {
            intermediate: vec![entry("a"), entry("b")],
            immediate: vec![entry("c")],
            outputs: vec![],
        }
    }

    #[test]
    fn rows_and_section_headings() {
        let tbl = logframe_table(&sample());
        assert_eq!(table_rows(&tbl).len(), 4);

        let label = |r: usize| cell_paragraph_texts(cell_at(&tbl, r, 0).expect("label"));
        assert_eq!(label(1), vec!["Intermediate Outcome:", "a"]);
        assert_eq!(label(2), vec!["b"]);
        assert_eq!(label(3), vec!["Immediate Outcome:", "c"]);

        assert_eq!(
            cell_paragraph_texts(cell_at(&tbl, 0, 5).expect("header")),
            vec![HEADERS[5]]
        );
        assert_eq!(
            cell_paragraph_texts(cell_at(&tbl, 1, 1).expect("ovi")),
            vec!["Indicator 1", "Indicator 2"]
        );
        // Empty fields still leave a valid cell.
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 1, 2).expect("baseline")), vec![""]);
    }

    #[test]
    fn header_row_is_bold() {
        let tbl = logframe_table(&LogframeData::default());
        assert_eq!(table_rows(&tbl).len(), 1);
        let rpr = cell_at(&tbl, 0, 0)
            .expect("cell")
            .descendants()
            .into_iter()
            .find(|e| e.name == "w:rPr")
            .expect("rPr");
        assert!(rpr.child("w:b").is_some());
    }

    #[test]
    fn appended_logframes_are_separated_by_two_blank_paragraphs() {
        let mut doc = DocxDocument::blank().expect("blank");
        let out = write_logframes(LogframeMode::Append(&mut doc), &[sample(), sample()]).expect("write");
        assert!(out.is_none());
        let names: Vec<&str> = doc.body().elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:tbl", "w:p", "w:p", "w:tbl", "w:sectPr"]);
    }

    #[test]
    fn standalone_mode_returns_a_loadable_package() {
        let bytes = write_logframes(LogframeMode::Standalone { template: None }, &[sample()])
            .expect("write")
            .expect("bytes");
        let doc = DocxDocument::from_bytes(&bytes).expect("reload");
        assert_eq!(doc.tables().len(), 1);
        assert!(doc.has_style(wml::TABLE_GRID_STYLE));
    }

    #[test]
    fn accepts_long_field_names() {
        let data: LogframeData = serde_json::from_str(
            r#"{"intermediate_outcomes": [{"hierarchy": "x", "baseline_data": 12}], "outputs": []}"#,
        )
        .expect("parse");
        assert_eq!(data.intermediate[0].baseline, "12");
        assert_eq!(data.row_count(), 2);
    }
}
