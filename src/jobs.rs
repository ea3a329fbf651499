use std::collections::BTreeMap;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::compose::{self, BreakPolicy};
use crate::config::AppConfig;
use crate::docx::document::DocxDocument;
use crate::docx::drawing::{inspect_image, ImageExtent};
use crate::error::{AssembleError, Origin, Result, Stage, StageExt};
use crate::forms::{self, ImagePart, Upload};
use crate::template::logframe::{self, LogframeData, LogframeMode};
use crate::template::placeholder::{self, Replacements};
use crate::template::records::{
    build_record_tables, list_or_lines, DatabaseRecord, ProjectLongRecord, ProjectRecord,
    SystemRecord, TableRecord,
};
use crate::template::{insert_bullet_list, insert_image, ImageTarget};

/// Content type of every assembled output.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub const MERGE_MIN_DOCS: usize = 2;
pub const MERGE_MAX_DOCS: usize = 5;

/// Items for one bullet anchor: a list or a newline-separated string.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListItems(#[serde(deserialize_with = "list_or_lines")] pub Vec<String>);

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FillData {
    #[serde(default)]
    pub values: Map<String, Value>,
    #[serde(default)]
    pub lists: BTreeMap<String, ListItems>,
    /// Base64 images keyed by anchor name.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Base64 images keyed by the tag or alias of a picture content control.
    #[serde(default)]
    pub picture_controls: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    System,
    Database,
    Project,
    ProjectLong,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(v: OneOrMany<T>) -> Self {
        match v {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

fn parse_json<T: DeserializeOwned>(what: &str, json: &[u8]) -> Result<T> {
    serde_json::from_slice(json).map_err(|e| AssembleError::schema(format!("{what}: {e}")))
}

fn load_docx(what: &str, origin: Origin, bytes: &[u8]) -> Result<DocxDocument> {
    DocxDocument::from_bytes(bytes).map_err(|cause| AssembleError::load(what, origin, cause))
}

fn load_or_blank(template: Option<&[u8]>) -> Result<DocxDocument> {
    match template {
        Some(bytes) => load_docx("template", Origin::Server, bytes),
        None => DocxDocument::blank()
            .map_err(|cause| AssembleError::load("blank document", Origin::Server, cause)),
    }
}

fn save(doc: &DocxDocument) -> Result<Vec<u8>> {
    doc.to_bytes().map_err(AssembleError::Serialize)
}

fn decode_checked_image(label: &str, encoded: &str) -> Result<Vec<u8>> {
    let bytes = forms::decode_base64_image(encoded)
        .map_err(|e| AssembleError::schema(format!("image {label}: {e:#}")))?;
    check_image(label, &bytes)?;
    Ok(bytes)
}

fn check_image(label: &str, bytes: &[u8]) -> Result<()> {
    inspect_image(bytes)
        .map(|_| ())
        .map_err(|e| AssembleError::schema(format!("image {label}: {e:#}")))
}

/// Fills scalar placeholders, bullet anchors and images into `template`.
pub fn fill(template: &[u8], data_json: &[u8], cfg: &AppConfig) -> Result<Vec<u8>> {
    let data: FillData = parse_json("fill data", data_json)?;

    let mut replacements = Replacements::with_policies(cfg.policy_table());
    for (key, value) in &data.values {
        let text = forms::scalar_text(value)
            .ok_or_else(|| AssembleError::schema(format!("value {key} must be a scalar")))?;
        replacements.insert(key.clone(), text);
    }
    let mut images = Vec::with_capacity(data.images.len() + data.picture_controls.len());
    for (anchor, encoded) in &data.images {
        let bytes = decode_checked_image(anchor, encoded)?;
        images.push((ImageTarget::Anchor(anchor.clone()), bytes));
    }
    for (tag, encoded) in &data.picture_controls {
        let bytes = decode_checked_image(tag, encoded)?;
        images.push((ImageTarget::PictureControl { tag: Some(tag.clone()) }, bytes));
    }

    let mut doc = load_docx("template", Origin::Server, template)?;

    // Block anchors first so their tokens are gone before scalar substitution.
    for (anchor, items) in &data.lists {
        insert_bullet_list(&mut doc, anchor, &items.0);
    }
    let extent = ImageExtent::Width(cfg.image_width_in());
    for (target, bytes) in &images {
        insert_image(&mut doc, target, bytes, extent)
            .with_context(|| format!("insert image at {target:?}"))
            .stage(Stage::Transform)?;
    }
    let report = placeholder::resolve(&mut doc, &replacements);
    log::info!(
        "fill: {} substitution(s), {} list(s), {} image(s)",
        report.replaced,
        data.lists.len(),
        images.len()
    );
    save(&doc)
}

fn record_tables<R: TableRecord + DeserializeOwned>(
    template: Option<&[u8]>,
    records_json: &[u8],
) -> Result<Vec<u8>> {
    let records: Vec<R> = parse_json::<OneOrMany<R>>(R::schema().name, records_json)?.into();
    let mut doc = load_or_blank(template)?;
    let n = build_record_tables(&mut doc, &records);
    log::info!("tables: {n} {} table(s)", R::schema().name);
    save(&doc)
}

/// One record table per submitted record, appended to `template` or a blank document.
pub fn tables(template: Option<&[u8]>, kind: RecordKind, records_json: &[u8]) -> Result<Vec<u8>> {
    match kind {
        RecordKind::System => record_tables::<SystemRecord>(template, records_json),
        RecordKind::Database => record_tables::<DatabaseRecord>(template, records_json),
        RecordKind::Project => record_tables::<ProjectRecord>(template, records_json),
        RecordKind::ProjectLong => record_tables::<ProjectLongRecord>(template, records_json),
    }
}

pub fn logframes(template: Option<&[u8]>, data_json: &[u8]) -> Result<Vec<u8>> {
    let data: Vec<LogframeData> = parse_json::<OneOrMany<LogframeData>>("logframe", data_json)?.into();
    let mut doc = load_or_blank(template)?;
    logframe::write_logframes(LogframeMode::Append(&mut doc), &data).stage(Stage::Transform)?;
    log::info!("logframe: {} table(s)", data.len());
    save(&doc)
}

pub fn merge(uploads: &[Upload], policy: BreakPolicy) -> Result<Vec<u8>> {
    if !(MERGE_MIN_DOCS..=MERGE_MAX_DOCS).contains(&uploads.len()) {
        return Err(AssembleError::schema(format!(
            "merge needs {MERGE_MIN_DOCS} to {MERGE_MAX_DOCS} documents, got {}",
            uploads.len()
        )));
    }
    let docs = uploads
        .iter()
        .map(|u| load_docx(&u.file_name, Origin::Client, &u.bytes))
        .collect::<Result<Vec<_>>>()?;
    let merged = compose::merge(docs, policy).stage(Stage::Transform)?;
    log::info!("merge: {} document(s) with {policy:?}", uploads.len());
    save(&merged)
}

/// Places the uploaded images at the fixed anchors of an image-part template.
pub fn image_part(template: &Upload, images: Vec<Upload>, width_in: f32) -> Result<Vec<u8>> {
    let part = ImagePart::from_template_name(&template.file_name).ok_or_else(|| {
        AssembleError::schema(format!("invalid template file: {}", template.file_name))
    })?;
    let mapped = part.map_images(images)?;
    for (anchor, image) in &mapped {
        check_image(&format!("{anchor} ({})", image.file_name), &image.bytes)?;
    }

    let mut doc = load_docx(&template.file_name, Origin::Client, &template.bytes)?;
    for (anchor, image) in &mapped {
        let target = ImageTarget::Anchor(anchor.to_string());
        insert_image(&mut doc, &target, &image.bytes, ImageExtent::Width(width_in))
            .with_context(|| format!("insert {} at {anchor}", image.file_name))
            .stage(Stage::Transform)?;
    }
    log::info!("{}: placed {} image(s)", part.label(), mapped.len());
    save(&doc)
}

/// Part I.B: formatted scalars plus the organizational structure image.
pub fn part_ib(template: &[u8], data_json: &[u8], cfg: &AppConfig) -> Result<Vec<u8>> {
    let data: Map<String, Value> = parse_json("part I.B data", data_json)?;
    let image = forms::part_ib_image(&data)
        .map_err(|e| AssembleError::schema(format!("{:#}", e)))?;
    if let Some(bytes) = &image {
        check_image(forms::ORG_STRUCTURE_KEY, bytes)?;
    }
    let replacements = forms::part_ib_replacements(&data, cfg.policy_table());

    let mut doc = load_docx("template", Origin::Server, template)?;
    if let Some(bytes) = &image {
        let target = ImageTarget::InlineAnchor(forms::ORG_STRUCTURE_KEY.to_string());
        insert_image(&mut doc, &target, bytes, cfg.part_ib_extent())
            .context("insert organizational structure")
            .stage(Stage::Transform)?;
    }
    let report = placeholder::resolve(&mut doc, &replacements);
    log::info!("part I.B: {} substitution(s)", report.replaced);
    save(&doc)
}
