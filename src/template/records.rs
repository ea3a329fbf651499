use serde::de::Deserializer;
use serde::Deserialize;
use serde_json::Value;

use crate::docx::document::DocxDocument;
use crate::docx::table::{inches, TableGrid};
use crate::docx::wml::{self, RunStyle};
use crate::docx::xml::XmlElement;
use crate::template::blocks::append_table;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// One bullet paragraph per item, each followed by a blank paragraph.
    List,
    /// Label merged over two rows with `INTERNAL` / `EXTERNAL` sub-labels.
    Users,
}

#[derive(Clone, Copy, Debug)]
pub struct SchemaRow {
    pub label: &'static str,
    pub key: &'static str,
    pub kind: FieldKind,
}

const fn row(label: &'static str, key: &'static str, kind: FieldKind) -> SchemaRow {
    SchemaRow { label, key, kind }
}

#[derive(Debug)]
pub struct RecordSchema {
    pub name: &'static str,
    pub cols: usize,
    /// Columns covered by a label; the value always sits in the last column.
    pub label_span: usize,
    pub col_widths_in: &'static [f32],
    pub rows: &'static [SchemaRow],
    /// Keys whose value renders bold.
    pub bold_values: &'static [&'static str],
    pub font: &'static str,
    pub size_pt: f32,
}

impl RecordSchema {
    pub fn table_rows(&self) -> usize {
        self.rows
            .iter()
            .map(|r| if r.kind == FieldKind::Users { 2 } else { 1 })
            .sum()
    }

    fn label_style(&self) -> RunStyle {
        RunStyle::default().font(self.font).size(self.size_pt).bold()
    }

    fn value_style(&self, key: &str) -> RunStyle {
        let style = RunStyle::default().font(self.font).size(self.size_pt);
        if self.bold_values.contains(&key) {
            style.bold()
        } else {
            style
        }
    }
}

pub static SYSTEM_SCHEMA: RecordSchema = RecordSchema {
    name: "system inventory",
    cols: 3,
    label_span: 2,
    col_widths_in: &[1.3, 1.2, 4.0],
    rows: &[
        row("NAME OF INFORMATION SYSTEM/ SUB-SYSTEM", "name", FieldKind::Text),
        row("DESCRIPTION", "description", FieldKind::List),
        row("STATUS", "status", FieldKind::Text),
        row("DEVELOPMENT STRATEGY", "development_strategy", FieldKind::Text),
        row("COMPUTING SCHEME", "computing_scheme", FieldKind::Text),
        row("USERS", "users", FieldKind::Users),
        row("OWNER", "owner", FieldKind::Text),
    ],
    bold_values: &[],
    font: "Arial",
    size_pt: 10.0,
};

pub static DATABASE_SCHEMA: RecordSchema = RecordSchema {
    name: "database inventory",
    cols: 3,
    label_span: 2,
    col_widths_in: &[1.3, 1.2, 4.0],
    rows: &[
        row("NAME OF DATABASE", "name", FieldKind::Text),
        row("GENERAL CONTENTS/DESCRIPTION", "general_contents", FieldKind::List),
        row("STATUS", "status", FieldKind::Text),
        row("INFORMATION SYSTEMS SERVED", "info_systems_served", FieldKind::Text),
        row("DATA ARCHIVING/STORAGE MEDIA", "data_archiving", FieldKind::Text),
        row("USERS", "users", FieldKind::Users),
        row("OWNER", "owner", FieldKind::Text),
    ],
    bold_values: &[],
    font: "Arial",
    size_pt: 10.0,
};

pub static PROJECT_SCHEMA: RecordSchema = RecordSchema {
    name: "project",
    cols: 2,
    label_span: 1,
    col_widths_in: &[2.0, 4.5],
    rows: &[
        row("A.1 NAME/TITLE", "name", FieldKind::Text),
        row("A.2 OBJECTIVES", "objectives", FieldKind::Text),
        row("A.3 DURATION", "duration", FieldKind::Text),
        row("A.4 DELIVERABLES", "deliverables", FieldKind::List),
    ],
    bold_values: &[],
    font: "Arial",
    size_pt: 10.0,
};

pub static PROJECT_LONG_SCHEMA: RecordSchema = RecordSchema {
    name: "project (long form)",
    cols: 2,
    label_span: 1,
    col_widths_in: &[2.0, 4.5],
    rows: &[
        row("A.1 NAME/TITLE", "name", FieldKind::Text),
        row("A.2 OBJECTIVES", "objectives", FieldKind::Text),
        row("A.3 DURATION", "duration", FieldKind::Text),
        row("A.4 DELIVERABLES", "deliverables", FieldKind::List),
        row("A.5 LEAD AGENCY", "lead_agency", FieldKind::Text),
        row("A.6 IMPLEMENTING AGENCIES", "implementing_agencies", FieldKind::Text),
    ],
    bold_values: &["name"],
    font: "Arial",
    size_pt: 10.0,
};

/// A value looked up by schema key.
#[derive(Clone, Copy, Debug)]
pub enum FieldValue<'a> {
    Text(&'a str),
    List(&'a [String]),
    Users {
        internal: &'a [String],
        external: &'a str,
    },
}

pub trait TableRecord {
    fn schema() -> &'static RecordSchema;

    fn name(&self) -> &str;

    fn field(&self, key: &str) -> FieldValue<'_>;
}

fn unknown_field(schema: &RecordSchema, key: &str) -> FieldValue<'static> {
    log::warn!("{} record has no field {key}; left blank", schema.name);
    FieldValue::Text("")
}

/// Accepts strings, numbers and booleans; `null` becomes empty.
pub fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Accepts a list or a single newline-separated string; items are trimmed and
/// blank items dropped.
pub fn list_or_lines<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    let raw: Vec<String> = match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => s.split('\n').map(str::to_string).collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    };
    Ok(raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SystemRecord {
    #[serde(alias = "name_of_system", deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "list_or_lines")]
    pub description: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub development_strategy: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub computing_scheme: String,
    #[serde(default, deserialize_with = "list_or_lines")]
    pub users_internal: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub users_external: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub owner: String,
}

impl TableRecord for SystemRecord {
    fn schema() -> &'static RecordSchema {
        &SYSTEM_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field(&self, key: &str) -> FieldValue<'_> {
        match key {
            "name" => FieldValue::Text(&self.name),
            "description" => FieldValue::List(&self.description),
            "status" => FieldValue::Text(&self.status),
            "development_strategy" => FieldValue::Text(&self.development_strategy),
            "computing_scheme" => FieldValue::Text(&self.computing_scheme),
            "users" => FieldValue::Users {
                internal: &self.users_internal,
                external: &self.users_external,
            },
            "owner" => FieldValue::Text(&self.owner),
            other => unknown_field(Self::schema(), other),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DatabaseRecord {
    #[serde(alias = "name_of_database", deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "list_or_lines")]
    pub general_contents: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub info_systems_served: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub data_archiving: String,
    #[serde(default, deserialize_with = "list_or_lines")]
    pub users_internal: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub users_external: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub owner: String,
}

impl TableRecord for DatabaseRecord {
    fn schema() -> &'static RecordSchema {
        &DATABASE_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field(&self, key: &str) -> FieldValue<'_> {
        match key {
            "name" => FieldValue::Text(&self.name),
            "general_contents" => FieldValue::List(&self.general_contents),
            "status" => FieldValue::Text(&self.status),
            "info_systems_served" => FieldValue::Text(&self.info_systems_served),
            "data_archiving" => FieldValue::Text(&self.data_archiving),
            "users" => FieldValue::Users {
                internal: &self.users_internal,
                external: &self.users_external,
            },
            "owner" => FieldValue::Text(&self.owner),
            other => unknown_field(Self::schema(), other),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProjectRecord {
    #[serde(deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub objectives: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub duration: String,
    #[serde(default, deserialize_with = "list_or_lines")]
    pub deliverables: Vec<String>,
}

impl TableRecord for ProjectRecord {
    fn schema() -> &'static RecordSchema {
        &PROJECT_SCHEMA
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn field(&self, key: &str) -> FieldValue<'_> {
        match key {
            "name" => FieldValue::Text(&self.name),
            "objectives" => FieldValue::Text(&self.objectives),
            "duration" => FieldValue::Text(&self.duration),
            "deliverables" => FieldValue::List(&self.deliverables),
            other => unknown_field(Self::schema(), other),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProjectLongRecord {
    #[serde(flatten)]
    pub project: ProjectRecord,
    #[serde(default, deserialize_with = "lenient_text")]
    pub lead_agency: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub implementing_agencies: String,
}

impl TableRecord for ProjectLongRecord {
    fn schema() -> &'static RecordSchema {
        &PROJECT_LONG_SCHEMA
    }

    fn name(&self) -> &str {
        &self.project.name
    }

    fn field(&self, key: &str) -> FieldValue<'_> {
        match key {
            "lead_agency" => FieldValue::Text(&self.lead_agency),
            "implementing_agencies" => FieldValue::Text(&self.implementing_agencies),
            other => self.project.field(other),
        }
    }
}

fn fill_list(grid: &mut TableGrid, r: usize, c: usize, items: &[String], style: &RunStyle) {
    let cell = grid.cell_mut(r, c);
    cell.clear();
    for item in items {
        cell.push_paragraph(wml::bullet_paragraph(item, Some(style)));
        cell.push_paragraph(wml::new_paragraph());
    }
}

/// Builds the table for one record without attaching it to a document.
pub fn build_record_table<R: TableRecord>(record: &R) -> XmlElement {
    let schema = R::schema();
    let widths: Vec<u32> = schema.col_widths_in.iter().map(|w| inches(*w)).collect();
    let mut grid = TableGrid::new(schema.table_rows(), schema.cols, &widths);
    let value_col = schema.cols - 1;
    let label_style = schema.label_style();

    let mut r = 0;
    for entry in schema.rows {
        let value_style = schema.value_style(entry.key);
        match (entry.kind, record.field(entry.key)) {
            (FieldKind::Users, FieldValue::Users { internal, external }) => {
                grid.merge_down(r, 0, 2);
                grid.cell_mut(r, 0).set_text(entry.label, Some(&label_style));
                grid.cell_mut(r, 1).set_text("INTERNAL", Some(&label_style));
                grid.cell_mut(r, value_col)
                    .set_text(&internal.join("\n"), Some(&value_style));
                grid.cell_mut(r + 1, 1).set_text("EXTERNAL", Some(&label_style));
                grid.cell_mut(r + 1, value_col)
                    .set_text(external, Some(&value_style));
                r += 2;
                continue;
            }
            (_, FieldValue::List(items)) => {
                fill_list(&mut grid, r, value_col, items, &value_style);
            }
            (_, FieldValue::Text(text)) => {
                grid.cell_mut(r, value_col).set_text(text, Some(&value_style));
            }
            (_, FieldValue::Users { internal, .. }) => {
                fill_list(&mut grid, r, value_col, internal, &value_style);
            }
        }
        if schema.label_span > 1 {
            grid.merge_across(r, 0, schema.label_span);
        }
        grid.cell_mut(r, 0).set_text(entry.label, Some(&label_style));
        r += 1;
    }
    grid.to_element()
}

/// Appends one table per record, each followed by a blank paragraph. Returns the
/// number of tables appended.
pub fn build_record_tables<R: TableRecord>(doc: &mut DocxDocument, records: &[R]) -> usize {
    for record in records {
        append_table(doc, build_record_table(record));
    }
    log::debug!("appended {} {} table(s)", records.len(), R::schema().name);
    records.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::table::{cell_at, cell_paragraph_texts, row_cells, table_rows};
    use crate::docx::testing::{p, FixtureDoc};

    fn systems() -> Vec<SystemRecord> {
        serde_json::from_str(
            r#"[
                {"name_of_system": "HRIS", "description": "Payroll\n\n  Leave tracking ", "status": "Operational",
                 "users_internal": ["HR", "Finance"], "users_external": "None", "owner": "HRMD"},
                {"name": "Docs", "description": ["Archive"], "status": 3}
            ]"#,
        )
        .expect("parse systems")
    }

    #[test]
    fn list_fields_accept_strings_and_arrays() {
        let recs = systems();
        assert_eq!(recs[0].description, vec!["Payroll", "Leave tracking"]);
        assert_eq!(recs[1].description, vec!["Archive"]);
        assert_eq!(recs[1].status, "3");
    }

    fn is_blank(value: FieldValue<'_>) -> bool {
        match value {
            FieldValue::Text(t) => t.is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Users { internal, external } => internal.is_empty() && external.is_empty(),
        }
    }

    fn every_key_resolves<R: TableRecord>(record: &R) {
        let mut texts = Vec::new();
        for entry in R::schema().rows {
            let value = record.field(entry.key);
            assert!(!is_blank(value), "{} maps to nothing", entry.key);
            if let FieldValue::Text(t) = value {
                texts.push(t.to_string());
            }
        }
        let distinct: std::collections::BTreeSet<&String> = texts.iter().collect();
        assert_eq!(distinct.len(), texts.len(), "two keys share one value");
        assert!(is_blank(record.field("no_such_key")));
    }

    #[test]
    fn every_schema_key_has_its_own_field() {
        let system: SystemRecord = serde_json::from_value(serde_json::json!({
            "name": "n", "description": ["d"], "status": "s", "development_strategy": "ds",
            "computing_scheme": "cs", "users_internal": ["ui"], "users_external": "ue", "owner": "o"
        }))
        .expect("system");
        every_key_resolves(&system);

        let database: DatabaseRecord = serde_json::from_value(serde_json::json!({
            "name": "n", "general_contents": ["g"], "status": "s", "info_systems_served": "i",
            "data_archiving": "a", "users_internal": ["ui"], "users_external": "ue", "owner": "o"
        }))
        .expect("database");
        every_key_resolves(&database);

        let project: ProjectLongRecord = serde_json::from_value(serde_json::json!({
            "name": "n", "objectives": "ob", "duration": "du", "deliverables": ["de"],
            "lead_agency": "la", "implementing_agencies": "ia"
        }))
        .expect("project");
        every_key_resolves(&project);
        every_key_resolves(&project.project);
    }

    #[test]
    fn record_name_is_required() {
        let res: Result<ProjectRecord, _> = serde_json::from_str(r#"{"objectives": "x"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn one_table_per_record_with_fixed_shape() {
        let mut doc = DocxDocument::from_bytes(&FixtureDoc::new(&p("Systems")).bytes()).expect("load");
        let recs = systems();
        assert_eq!(build_record_tables(&mut doc, &recs), 2);

        let tables = doc.tables();
        assert_eq!(tables.len(), 2);
        for tbl in &tables {
            assert_eq!(table_rows(tbl).len(), 8);
            let grid_cols = tbl.child("w:tblGrid").expect("grid").children_named("w:gridCol").count();
            assert_eq!(grid_cols, 3);
        }
        let names: Vec<&str> = doc.body().elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:p", "w:tbl", "w:p", "w:tbl", "w:p", "w:sectPr"]);
        assert!(doc.has_style(wml::BULLET_STYLE));
        assert!(doc.has_style(wml::TABLE_GRID_STYLE));
    }

    #[test]
    fn system_table_layout() {
        let tbl = build_record_table(&systems()[0]);
        let rows = table_rows(&tbl);
        // Label rows merge the first two columns.
        assert_eq!(row_cells(rows[0]).len(), 2);
        assert_eq!(
            cell_paragraph_texts(cell_at(&tbl, 0, 0).expect("label")),
            vec!["NAME OF INFORMATION SYSTEM/ SUB-SYSTEM"]
        );
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 0, 1).expect("value")), vec!["HRIS"]);

        let desc = cell_paragraph_texts(cell_at(&tbl, 1, 1).expect("desc"));
        assert_eq!(desc, vec!["Payroll", "", "Leave tracking", ""]);

        // USERS spans rows 5 and 6 with INTERNAL / EXTERNAL sub-labels.
        assert_eq!(row_cells(rows[5]).len(), 3);
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 5, 0).expect("users")), vec!["USERS"]);
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 5, 1).expect("int")), vec!["INTERNAL"]);
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 5, 2).expect("int v")), vec!["HR\nFinance"]);
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 6, 1).expect("ext")), vec!["EXTERNAL"]);
        let continued = cell_at(&tbl, 6, 0)
            .and_then(|tc| tc.child("w:tcPr"))
            .and_then(|pr| pr.child("w:vMerge"))
            .expect("vMerge continue");
        assert_eq!(continued.attr("w:val"), None);
        assert_eq!(cell_paragraph_texts(cell_at(&tbl, 7, 0).expect("owner")), vec!["OWNER"]);
    }

    #[test]
    fn long_project_name_is_bold() {
        let rec: ProjectLongRecord = serde_json::from_str(
            r#"{"name": "NICTHS", "deliverables": "Portal\nReports", "lead_agency": "DICT"}"#,
        )
        .expect("parse");
        let tbl = build_record_table(&rec);
        assert_eq!(table_rows(&tbl).len(), 6);
        let name_cell = cell_at(&tbl, 0, 1).expect("name");
        let rpr = name_cell
            .descendants()
            .into_iter()
            .find(|e| e.name == "w:rPr")
            .expect("rPr");
        assert!(rpr.child("w:b").is_some());
        assert_eq!(
            cell_paragraph_texts(cell_at(&tbl, 4, 0).expect("lead")),
            vec!["A.5 LEAD AGENCY"]
        );

        let short: ProjectRecord = serde_json::from_str(r#"{"name": "X"}"#).expect("parse");
        let tbl = build_record_table(&short);
        assert_eq!(table_rows(&tbl).len(), 4);
        let name_rpr = cell_at(&tbl, 0, 1)
            .expect("name")
            .descendants()
            .into_iter()
            .find(|e| e.name == "w:rPr")
            .expect("rPr");
        assert!(name_rpr.child("w:b").is_none());
        // Empty deliverables still leave a paragraph in the cell.
        assert_eq!(cell_at(&tbl, 3, 1).expect("cell").children_named("w:p").count(), 1);
    }
}
