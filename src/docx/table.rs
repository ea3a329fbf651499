use crate::docx::wml::{self, RunStyle};
use crate::docx::xml::XmlElement;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VMerge {
    Restart,
    Continue,
}

#[derive(Clone, Debug)]
pub struct GridCell {
    paragraphs: Vec<XmlElement>,
    span: usize,
    covered: bool,
    v_merge: Option<VMerge>,
}

impl GridCell {
    fn new() -> Self {
        Self {
            paragraphs: vec![wml::new_paragraph()],
            span: 1,
            covered: false,
            v_merge: None,
        }
    }

    /// Replaces the cell content with a single paragraph holding `text`.
    pub fn set_text(&mut self, text: &str, style: Option<&RunStyle>) {
        self.paragraphs = vec![wml::text_paragraph(text, style)];
    }

    pub fn clear(&mut self) {
        self.paragraphs.clear();
    }

    pub fn push_paragraph(&mut self, p: XmlElement) {
        self.paragraphs.push(p);
    }
}

/// Row and column counts are fixed at creation; merges only change how the
/// existing slots are emitted.
pub struct TableGrid {
    rows: usize,
    cols: usize,
    col_widths: Vec<u32>,
    cells: Vec<Vec<GridCell>>,
}

impl TableGrid {
    /// `col_widths` are twips; missing trailing widths repeat the last one.
    pub fn new(rows: usize, cols: usize, col_widths: &[u32]) -> Self {
        let fallback = col_widths.last().copied().unwrap_or(wml::TWIPS_PER_INCH);
        let col_widths = (0..cols)
            .map(|c| col_widths.get(c).copied().unwrap_or(fallback))
            .collect();
        Self {
            rows,
            cols,
            col_widths,
            cells: (0..rows)
                .map(|_| (0..cols).map(|_| GridCell::new()).collect())
                .collect(),
        }
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> &mut GridCell {
        &mut self.cells[row][col]
    }

    /// Merges `span` cells of `row` starting at `col` into one.
    pub fn merge_across(&mut self, row: usize, col: usize, span: usize) {
        let span = span.clamp(1, self.cols - col);
        self.cells[row][col].span = span;
        for c in col + 1..col + span {
            self.cells[row][c].covered = true;
        }
    }

    /// Merges `span` cells of `col` starting at `row` into one.
    pub fn merge_down(&mut self, row: usize, col: usize, span: usize) {
        let span = span.clamp(1, self.rows - row);
        if span == 1 {
            return;
        }
        self.cells[row][col].v_merge = Some(VMerge::Restart);
        for r in row + 1..row + span {
            let cell = &mut self.cells[r][col];
            cell.v_merge = Some(VMerge::Continue);
            cell.paragraphs = vec![wml::new_paragraph()];
        }
    }

    pub fn to_element(&self) -> XmlElement {
        let total: u32 = self.col_widths.iter().sum();
        let tbl_pr = XmlElement::new("w:tblPr")
            .with_child(XmlElement::new("w:tblStyle").with_attr("w:val", wml::TABLE_GRID_STYLE))
            .with_child(
                XmlElement::new("w:tblW")
                    .with_attr("w:w", &total.to_string())
                    .with_attr("w:type", "dxa"),
            )
            .with_child(XmlElement::new("w:tblLayout").with_attr("w:type", "fixed"))
            .with_child(
                XmlElement::new("w:tblLook")
                    .with_attr("w:val", "04A0")
                    .with_attr("w:firstRow", "1")
                    .with_attr("w:lastRow", "0")
                    .with_attr("w:firstColumn", "1")
                    .with_attr("w:lastColumn", "0")
                    .with_attr("w:noHBand", "0")
                    .with_attr("w:noVBand", "1"),
            );

        let mut grid = XmlElement::new("w:tblGrid");
        for w in &self.col_widths {
            grid = grid.with_child(XmlElement::new("w:gridCol").with_attr("w:w", &w.to_string()));
        }

        let mut tbl = XmlElement::new("w:tbl").with_child(tbl_pr).with_child(grid);
        for row in &self.cells {
            let mut tr = XmlElement::new("w:tr");
            for (c, cell) in row.iter().enumerate() {
                if cell.covered {
                    continue;
                }
                let width: u32 = self.col_widths[c..c + cell.span].iter().sum();
                let mut tc_pr = XmlElement::new("w:tcPr").with_child(
                    XmlElement::new("w:tcW")
                        .with_attr("w:w", &width.to_string())
                        .with_attr("w:type", "dxa"),
                );
                if cell.span > 1 {
                    tc_pr = tc_pr.with_child(
                        XmlElement::new("w:gridSpan").with_attr("w:val", &cell.span.to_string()),
                    );
                }
                match cell.v_merge {
                    Some(VMerge::Restart) => {
                        tc_pr = tc_pr.with_child(XmlElement::new("w:vMerge").with_attr("w:val", "restart"));
                    }
                    Some(VMerge::Continue) => {
                        tc_pr = tc_pr.with_child(XmlElement::new("w:vMerge"));
                    }
                    None => {}
                }
                let mut tc = XmlElement::new("w:tc").with_child(tc_pr);
                if cell.paragraphs.is_empty() {
                    // A cell must end with a paragraph.
                    tc = tc.with_child(wml::new_paragraph());
                } else {
                    for p in &cell.paragraphs {
                        tc = tc.with_child(p.clone());
                    }
                }
                tr = tr.with_child(tc);
            }
            tbl = tbl.with_child(tr);
        }
        tbl
    }
}

pub fn inches(value: f32) -> u32 {
    (value * wml::TWIPS_PER_INCH as f32).round() as u32
}

pub fn table_rows(tbl: &XmlElement) -> Vec<&XmlElement> {
    tbl.children_named("w:tr").collect()
}

pub fn row_cells(tr: &XmlElement) -> Vec<&XmlElement> {
    tr.children_named("w:tc").collect()
}

/// Physical cell `col` of row `row` (merged cells count once).
pub fn cell_at(tbl: &XmlElement, row: usize, col: usize) -> Option<&XmlElement> {
    let tr = table_rows(tbl).into_iter().nth(row)?;
    row_cells(tr).into_iter().nth(col)
}

/// Paragraph texts of a cell, one entry per paragraph.
pub fn cell_paragraph_texts(tc: &XmlElement) -> Vec<String> {
    tc.children_named("w:p").map(wml::paragraph_text).collect()
}
