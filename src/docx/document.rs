use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::docx::drawing::{inspect_image, ImageInfo};
use crate::docx::package::{DocxEntry, DocxPackage};
use crate::docx::rels::{
    normalize_target, ContentTypes, Relationship, Relationships, CONTENT_TYPES_NS,
    CT_NUMBERING, CT_STYLES, RELS_NS, REL_IMAGE, REL_NUMBERING, REL_STYLES,
};
use crate::docx::wml::{self, BULLET_STYLE, R_NS, TABLE_GRID_STYLE, WP_NS, W_NS};
use crate::docx::xml::{XmlDocument, XmlElement, XmlNode};

pub const MAIN_PART: &str = "word/document.xml";
pub const MAIN_RELS: &str = "word/_rels/document.xml.rels";
pub const CONTENT_TYPES: &str = "[Content_Types].xml";

const REL_HEADER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
const REL_FOOTER: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

static EMPTY_BODY: Lazy<XmlElement> = Lazy::new(|| XmlElement::new("w:body"));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderFooterKind {
    Header,
    Footer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderFooterVariant {
    Default,
    First,
    Even,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderFooterRef {
    pub section_index: usize,
    pub kind: HeaderFooterKind,
    pub variant: HeaderFooterVariant,
    pub part_name: String,
}

/// A loaded .docx package with its main document, styles, numbering and
/// header/footer parts parsed into mutable trees.
pub struct DocxDocument {
    package: DocxPackage,
    pub document: XmlDocument,
    pub rels: Relationships,
    pub content_types: ContentTypes,
    pub styles: Option<XmlDocument>,
    pub numbering: Option<XmlDocument>,
    parts: HashMap<String, XmlDocument>,
}

impl DocxDocument {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let pkg = DocxPackage::read(path)?;
        Self::from_package(pkg).with_context(|| format!("load docx: {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Self::from_package(DocxPackage::from_bytes(bytes)?)
    }

    /// A minimal A4 portrait document with a default `Normal` paragraph style.
    pub fn blank() -> anyhow::Result<Self> {
        const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
        let content_types = format!(
            r#"{DECL}<Types xmlns="{CONTENT_TYPES_NS}"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="{CT_STYLES}"/></Types>"#
        );
        let root_rels = format!(
            r#"{DECL}<Relationships xmlns="{RELS_NS}"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#
        );
        let doc_rels = format!(
            r#"{DECL}<Relationships xmlns="{RELS_NS}"><Relationship Id="rId1" Type="{REL_STYLES}" Target="styles.xml"/></Relationships>"#
        );
        let document = format!(
            r#"{DECL}<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:body><w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr></w:body></w:document>"#
        );
        let styles = format!(
            r#"{DECL}<w:styles xmlns:w="{W_NS}"><w:docDefaults/><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style></w:styles>"#
        );
        let package = DocxPackage::from_entries([
            DocxEntry::new(CONTENT_TYPES, content_types.into_bytes()),
            DocxEntry::new("_rels/.rels", root_rels.into_bytes()),
            DocxEntry::new(MAIN_PART, document.into_bytes()),
            DocxEntry::new(MAIN_RELS, doc_rels.into_bytes()),
            DocxEntry::new("word/styles.xml", styles.into_bytes()),
        ]);
        Self::from_package(package)
    }

    fn from_package(mut package: DocxPackage) -> anyhow::Result<Self> {
        let doc_bytes = &package
            .entry(MAIN_PART)
            .ok_or_else(|| anyhow!("missing {MAIN_PART}"))?
            .data;
        let document = XmlDocument::parse(MAIN_PART, doc_bytes)?;
        if document.root.child("w:body").is_none() {
            return Err(anyhow!("{MAIN_PART} has no w:body"));
        }

        let ct_bytes = &package
            .entry(CONTENT_TYPES)
            .ok_or_else(|| anyhow!("missing {CONTENT_TYPES}"))?
            .data;
        let content_types = ContentTypes {
            doc: XmlDocument::parse(CONTENT_TYPES, ct_bytes)?,
        };

        let rels = match package.entry(MAIN_RELS).filter(|e| !e.data.is_empty()) {
            Some(ent) => Relationships {
                doc: XmlDocument::parse(MAIN_RELS, &ent.data)?,
            },
            None => Relationships::empty(MAIN_RELS),
        };
        if !package.contains(MAIN_RELS) {
            package.put(MAIN_RELS, Vec::new());
        }

        let load_related = |rel_type: &str| -> anyhow::Result<Option<XmlDocument>> {
            let Some(rel) = rels.find_by_type(rel_type) else {
                return Ok(None);
            };
            let name = normalize_target("word/", &rel.target);
            match package.entry(&name) {
                Some(ent) if !ent.data.is_empty() => Ok(Some(XmlDocument::parse(&name, &ent.data)?)),
                _ => Ok(None),
            }
        };
        let styles = load_related(REL_STYLES)?;
        let numbering = load_related(REL_NUMBERING)?;

        let mut parts = HashMap::new();
        for rel in rels.iter() {
            if rel.external || (rel.rel_type != REL_HEADER && rel.rel_type != REL_FOOTER) {
                continue;
            }
            let name = normalize_target("word/", &rel.target);
            if let Some(ent) = package.entry(&name) {
                if !ent.data.is_empty() {
                    parts.insert(name.clone(), XmlDocument::parse(&name, &ent.data)?);
                }
            }
        }

        Ok(Self {
            package,
            document,
            rels,
            content_types,
            styles,
            numbering,
            parts,
        })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut replacements: HashMap<String, Vec<u8>> = HashMap::new();
        replacements.insert(MAIN_PART.to_string(), self.document.to_bytes()?);
        replacements.insert(CONTENT_TYPES.to_string(), self.content_types.doc.to_bytes()?);
        replacements.insert(MAIN_RELS.to_string(), self.rels.doc.to_bytes()?);
        for doc in self.styles.iter().chain(self.numbering.iter()).chain(self.parts.values()) {
            replacements.insert(doc.name.clone(), doc.to_bytes()?);
        }
        self.package.to_bytes(&replacements)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("write docx: {}", path.display()))
    }

    /// Raw bytes of a package entry (media, embedded objects).
    pub fn entry_data(&self, name: &str) -> Option<&[u8]> {
        self.package.entry(name).map(|e| e.data.as_slice())
    }

    pub fn body(&self) -> &XmlElement {
        self.document.root.child("w:body").unwrap_or(&EMPTY_BODY)
    }

    pub fn body_mut(&mut self) -> &mut XmlElement {
        if self.document.root.position("w:body").is_none() {
            self.document.root.children.push(XmlElement::new("w:body").into());
        }
        let idx = self.document.root.position("w:body").unwrap_or_default();
        match &mut self.document.root.children[idx] {
            XmlNode::Element(el) => el,
            _ => unreachable!("position() only matches elements"),
        }
    }

    /// Top-level body paragraphs in document order.
    pub fn paragraphs(&self) -> Vec<&XmlElement> {
        self.body().children_named("w:p").collect()
    }

    pub fn tables(&self) -> Vec<&XmlElement> {
        self.body().children_named("w:tbl").collect()
    }

    /// Inserts `node` as child `index` of the body element at `parent_path`
    /// (an empty path is the body itself).
    pub fn insert_block(&mut self, parent_path: &[usize], index: usize, node: XmlElement) -> anyhow::Result<()> {
        let parent = self
            .body_mut()
            .element_at_mut(parent_path)
            .ok_or_else(|| anyhow!("no element at body path {parent_path:?}"))?;
        let index = index.min(parent.children.len());
        parent.children.insert(index, node.into());
        Ok(())
    }

    pub fn remove_block(&mut self, path: &[usize]) -> anyhow::Result<XmlElement> {
        let (last, parent_path) = path
            .split_last()
            .ok_or_else(|| anyhow!("cannot remove the body itself"))?;
        let parent = self
            .body_mut()
            .element_at_mut(parent_path)
            .ok_or_else(|| anyhow!("no element at body path {parent_path:?}"))?;
        if parent.children.get(*last).and_then(XmlNode::as_element).is_none() {
            return Err(anyhow!("no element at body path {path:?}"));
        }
        match parent.children.remove(*last) {
            XmlNode::Element(el) => Ok(el),
            _ => unreachable!("checked above"),
        }
    }

    /// Appends a block after all existing content, keeping the body `w:sectPr` last.
    pub fn append_block(&mut self, node: XmlElement) {
        let body = self.body_mut();
        let at = wml::block_end(body);
        body.children.insert(at, node.into());
    }

    /// Header/footer references of every section, in document order.
    pub fn header_footer_refs(&self) -> Vec<HeaderFooterRef> {
        let mut sect_prs: Vec<&XmlElement> = Vec::new();
        for block in self.body().elements() {
            match block.name.as_str() {
                "w:p" => {
                    if let Some(s) = block.child("w:pPr").and_then(|p| p.child("w:sectPr")) {
                        sect_prs.push(s);
                    }
                }
                "w:sectPr" => sect_prs.push(block),
                _ => {}
            }
        }

        let mut out = Vec::new();
        for (section_index, sect) in sect_prs.into_iter().enumerate() {
            for el in sect.elements() {
                let kind = match el.name.as_str() {
                    "w:headerReference" => HeaderFooterKind::Header,
                    "w:footerReference" => HeaderFooterKind::Footer,
                    _ => continue,
                };
                let variant = match el.attr("w:type").unwrap_or("default") {
                    "first" => HeaderFooterVariant::First,
                    "even" => HeaderFooterVariant::Even,
                    _ => HeaderFooterVariant::Default,
                };
                let Some(rel) = el.attr("r:id").and_then(|id| self.rels.get(id)) else {
                    continue;
                };
                out.push(HeaderFooterRef {
                    section_index,
                    kind,
                    variant,
                    part_name: normalize_target("word/", &rel.target),
                });
            }
        }
        out
    }

    pub fn part(&self, name: &str) -> Option<&XmlDocument> {
        self.parts.get(name)
    }

    pub fn part_mut(&mut self, name: &str) -> Option<&mut XmlDocument> {
        self.parts.get_mut(name)
    }

    pub fn has_style(&self, style_id: &str) -> bool {
        self.style_ids().contains(style_id)
    }

    pub fn style_ids(&self) -> BTreeSet<String> {
        self.styles
            .iter()
            .flat_map(|s| s.root.children_named("w:style"))
            .filter_map(|s| s.attr("w:styleId").map(str::to_string))
            .collect()
    }

    /// Style id whose display name is `name`.
    pub fn style_id_for_name(&self, name: &str) -> Option<String> {
        self.styles
            .iter()
            .flat_map(|s| s.root.children_named("w:style"))
            .find(|s| {
                s.child("w:name")
                    .and_then(|n| n.attr("w:val"))
                    .is_some_and(|v| v.eq_ignore_ascii_case(name))
            })
            .and_then(|s| s.attr("w:styleId").map(str::to_string))
    }

    pub fn default_paragraph_style(&self) -> Option<String> {
        self.styles
            .iter()
            .flat_map(|s| s.root.children_named("w:style"))
            .find(|s| {
                s.attr("w:type") == Some("paragraph")
                    && matches!(s.attr("w:default"), Some("1") | Some("true") | Some("on"))
            })
            .and_then(|s| s.attr("w:styleId").map(str::to_string))
    }

    pub(crate) fn ensure_styles_part(&mut self) -> &mut XmlDocument {
        if self.styles.is_none() {
            let name = "word/styles.xml";
            let root = XmlElement::new("w:styles")
                .with_attr("xmlns:w", W_NS)
                .with_child(XmlElement::new("w:docDefaults"));
            self.package.put(name, Vec::new());
            self.rels.add(REL_STYLES, "styles.xml", false);
            self.content_types.ensure_override(name, CT_STYLES);
            self.styles = Some(XmlDocument::new(name, root));
        }
        self.styles.get_or_insert_with(|| XmlDocument::new("word/styles.xml", XmlElement::new("w:styles")))
    }

    pub(crate) fn ensure_numbering_part(&mut self) -> &mut XmlDocument {
        if self.numbering.is_none() {
            let name = "word/numbering.xml";
            let root = XmlElement::new("w:numbering").with_attr("xmlns:w", W_NS);
            self.package.put(name, Vec::new());
            self.rels.add(REL_NUMBERING, "numbering.xml", false);
            self.content_types.ensure_override(name, CT_NUMBERING);
            self.numbering = Some(XmlDocument::new(name, root));
        }
        self.numbering
            .get_or_insert_with(|| XmlDocument::new("word/numbering.xml", XmlElement::new("w:numbering")))
    }

    /// Makes sure `ListBullet` exists, backed by a bullet numbering definition.
    pub fn ensure_bullet_style(&mut self) {
        if self.has_style(BULLET_STYLE) {
            return;
        }
        let numbering = self.ensure_numbering_part();
        let next = |name: &str, attr: &str| {
            numbering
                .root
                .children_named(name)
                .filter_map(|e| e.attr(attr).and_then(|v| v.parse::<u32>().ok()))
                .max()
                .map_or(1, |m| m + 1)
        };
        let abstract_id = next("w:abstractNum", "w:abstractNumId").to_string();
        let num_id = next("w:num", "w:numId").to_string();

        let lvl = XmlElement::new("w:lvl")
            .with_attr("w:ilvl", "0")
            .with_child(XmlElement::new("w:start").with_attr("w:val", "1"))
            .with_child(XmlElement::new("w:numFmt").with_attr("w:val", "bullet"))
            .with_child(XmlElement::new("w:lvlText").with_attr("w:val", "\u{2022}"))
            .with_child(XmlElement::new("w:lvlJc").with_attr("w:val", "left"))
            .with_child(
                XmlElement::new("w:pPr").with_child(
                    XmlElement::new("w:ind")
                        .with_attr("w:left", "360")
                        .with_attr("w:hanging", "360"),
                ),
            );
        let abstract_num = XmlElement::new("w:abstractNum")
            .with_attr("w:abstractNumId", &abstract_id)
            .with_child(XmlElement::new("w:multiLevelType").with_attr("w:val", "singleLevel"))
            .with_child(lvl);
        let num = XmlElement::new("w:num")
            .with_attr("w:numId", &num_id)
            .with_child(XmlElement::new("w:abstractNumId").with_attr("w:val", &abstract_id));
        let at = numbering.root.position("w:num").unwrap_or(numbering.root.children.len());
        numbering.root.children.insert(at, abstract_num.into());
        numbering.root.children.push(num.into());

        let based_on = self.default_paragraph_style();
        let mut style = XmlElement::new("w:style")
            .with_attr("w:type", "paragraph")
            .with_attr("w:styleId", BULLET_STYLE)
            .with_child(XmlElement::new("w:name").with_attr("w:val", "List Bullet"));
        if let Some(base) = based_on {
            style = style.with_child(XmlElement::new("w:basedOn").with_attr("w:val", &base));
        }
        style = style.with_child(
            XmlElement::new("w:pPr").with_child(
                XmlElement::new("w:numPr")
                    .with_child(XmlElement::new("w:ilvl").with_attr("w:val", "0"))
                    .with_child(XmlElement::new("w:numId").with_attr("w:val", &num_id)),
            ),
        );
        self.ensure_styles_part().root.children.push(style.into());
        log::debug!("added {BULLET_STYLE} style backed by numId {num_id}");
    }

    pub fn ensure_table_grid_style(&mut self) {
        if self.has_style(TABLE_GRID_STYLE) {
            return;
        }
        let mut borders = XmlElement::new("w:tblBorders");
        for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            borders = borders.with_child(
                XmlElement::new(side)
                    .with_attr("w:val", "single")
                    .with_attr("w:sz", "4")
                    .with_attr("w:space", "0")
                    .with_attr("w:color", "auto"),
            );
        }
        let style = XmlElement::new("w:style")
            .with_attr("w:type", "table")
            .with_attr("w:styleId", TABLE_GRID_STYLE)
            .with_child(XmlElement::new("w:name").with_attr("w:val", "Table Grid"))
            .with_child(XmlElement::new("w:tblPr").with_child(borders));
        self.ensure_styles_part().root.children.push(style.into());
    }

    pub fn ensure_drawing_namespaces(&mut self) {
        let root = &mut self.document.root;
        for (prefix, ns) in [("xmlns:r", R_NS), ("xmlns:wp", WP_NS)] {
            if root.attr(prefix).is_none() {
                root.set_attr(prefix, ns);
            }
        }
    }

    /// Stores `bytes` as a media part (deduplicated by content hash) and returns the
    /// relationship id pointing at it.
    pub fn add_image(&mut self, bytes: &[u8]) -> anyhow::Result<(String, ImageInfo)> {
        let info = inspect_image(bytes)?;
        let digest = hex::encode(Sha256::digest(bytes));
        let target = format!("media/image-{}.{}", &digest[..16], info.extension);
        let entry_name = format!("word/{target}");

        if let Some(rel) = self
            .rels
            .iter()
            .find(|r| r.rel_type == REL_IMAGE && normalize_target("word/", &r.target) == entry_name)
        {
            return Ok((rel.id, info));
        }
        self.package.put(&entry_name, bytes.to_vec());
        self.content_types.ensure_default(info.extension, info.content_type);
        let id = self.rels.add(REL_IMAGE, &target, false);
        log::debug!("registered {entry_name} as {id}");
        Ok((id, info))
    }

    /// Re-registers relationship `rel` of `other` in this package and returns the new id.
    /// Internal targets are copied under a content-addressed name next to the original
    /// location; nested relationships of the copied part are not followed. Header and
    /// footer parts are taken from their edited trees and stay editable here.
    pub fn import_relationship(&mut self, other: &DocxDocument, rel: &Relationship) -> Option<String> {
        if rel.external {
            return Some(self.rels.add(&rel.rel_type, &rel.target, true));
        }
        let source = normalize_target("word/", &rel.target);
        let edited = other.parts.get(&source).and_then(|part| part.to_bytes().ok());
        let Some(data) = edited.or_else(|| other.entry_data(&source).map(<[u8]>::to_vec)) else {
            log::warn!("relationship {} points at missing part {source}", rel.id);
            return None;
        };
        let digest = hex::encode(Sha256::digest(&data));
        let rel_target = source.strip_prefix("word/").unwrap_or(&source);
        let (dir, file) = rel_target.rsplit_once('/').map_or(("", rel_target), |(d, f)| (d, f));
        let (stem, ext) = file.rsplit_once('.').unwrap_or((file, "bin"));
        let new_target = if dir.is_empty() {
            format!("{stem}-{}.{ext}", &digest[..12])
        } else {
            format!("{dir}/{stem}-{}.{ext}", &digest[..12])
        };
        let entry_name = format!("word/{new_target}");

        if let Some(existing) = self
            .rels
            .iter()
            .find(|r| r.rel_type == rel.rel_type && normalize_target("word/", &r.target) == entry_name)
        {
            return Some(existing.id);
        }

        let (own_dir, own_file) = source.rsplit_once('/').unwrap_or(("", source.as_str()));
        let nested_rels = format!("{own_dir}/_rels/{own_file}.rels");
        if other.package.contains(&nested_rels) {
            log::warn!("{source} has its own relationships; they are not carried over");
        }

        if rel.rel_type == REL_HEADER || rel.rel_type == REL_FOOTER {
            match XmlDocument::parse(&entry_name, &data) {
                Ok(part) => {
                    self.parts.insert(entry_name.clone(), part);
                }
                Err(e) => log::warn!("{entry_name} is not well-formed: {e:#}"),
            }
        }
        self.package.put(&entry_name, data);
        match other.content_types.content_type_for(&source) {
            Some(ct) if other.content_types.has_default(ext) && !source.ends_with(".xml") => {
                self.content_types.ensure_default(ext, &ct);
            }
            Some(ct) => self.content_types.ensure_override(&entry_name, &ct),
            None => log::warn!("no content type known for {source}"),
        }
        Some(self.rels.add(&rel.rel_type, &new_target, false))
    }

    /// Next free drawing object id (`wp:docPr/@id`) in the main document.
    pub fn next_drawing_id(&self) -> u32 {
        max_drawing_id(&self.document.root) + 1
    }
}

pub fn max_drawing_id(root: &XmlElement) -> u32 {
    root.descendants()
        .into_iter()
        .filter(|e| e.name == "wp:docPr")
        .filter_map(|e| e.attr("id").and_then(|v| v.parse::<u32>().ok()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testing::{p, paragraph_style_def, png, FixtureDoc};

    #[test]
    fn blank_document_round_trips() {
        let doc = DocxDocument::blank().expect("blank");
        assert!(doc.paragraphs().is_empty());
        assert_eq!(doc.default_paragraph_style().as_deref(), Some("Normal"));
        let bytes = doc.to_bytes().expect("save");
        let again = DocxDocument::from_bytes(&bytes).expect("reload");
        assert!(again.body().child("w:sectPr").is_some());
    }

    #[test]
    fn corrupt_bytes_fail_to_load() {
        assert!(DocxDocument::from_bytes(b"definitely not a zip").is_err());
    }

    #[test]
    fn exposes_paragraphs_and_header_footer_parts() {
        let bytes = FixtureDoc::new(&format!("{}{}", p("one"), p("two")))
            .header(&p("head"))
            .footer(&p("foot"))
            .bytes();
        let doc = DocxDocument::from_bytes(&bytes).expect("load");
        let texts: Vec<String> = doc.paragraphs().into_iter().map(wml::paragraph_text).collect();
        assert_eq!(texts, vec!["one", "two"]);

        let refs = doc.header_footer_refs();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, HeaderFooterKind::Header);
        assert_eq!(refs[0].variant, HeaderFooterVariant::Default);
        assert_eq!(refs[0].part_name, "word/header1.xml");
        let header = doc.part("word/header1.xml").expect("header part");
        assert_eq!(header.root.name, "w:hdr");
    }

    #[test]
    fn header_footer_refs_report_first_and_even_variants() {
        let bytes = FixtureDoc::new(&p("x"))
            .header(&p("any page"))
            .header_for("first", &p("cover"))
            .footer_for("even", &p("left pages"))
            .sect_pr(r#"<w:pgSz w:w="11906" w:h="16838"/><w:titlePg/>"#)
            .bytes();
        let doc = DocxDocument::from_bytes(&bytes).expect("load");
        let refs = doc.header_footer_refs();
        let seen: Vec<(HeaderFooterKind, HeaderFooterVariant, &str)> = refs
            .iter()
            .map(|r| (r.kind, r.variant, r.part_name.as_str()))
            .collect();
        assert_eq!(
            seen,
            vec![
                (HeaderFooterKind::Header, HeaderFooterVariant::Default, "word/header1.xml"),
                (HeaderFooterKind::Header, HeaderFooterVariant::First, "word/header2.xml"),
                (HeaderFooterKind::Footer, HeaderFooterVariant::Even, "word/footer1.xml"),
            ]
        );
        assert!(refs.iter().all(|r| r.section_index == 0));
        assert!(doc.part("word/header2.xml").is_some());
        assert!(doc.part("word/footer1.xml").is_some());
    }

    #[test]
    fn untouched_document_serializes_stably() {
        let bytes = FixtureDoc::new(&p("x")).styles(&paragraph_style_def("Normal", "Normal", "")).bytes();
        let once = DocxDocument::from_bytes(&bytes).expect("load").to_bytes().expect("save");
        let reloaded = DocxDocument::from_bytes(&once).expect("reload");
        let twice = reloaded.to_bytes().expect("save again");
        let a = DocxDocument::from_bytes(&once).expect("a").document.to_bytes().expect("a xml");
        let b = DocxDocument::from_bytes(&twice).expect("b").document.to_bytes().expect("b xml");
        assert_eq!(a, b);
    }

    #[test]
    fn append_block_keeps_section_properties_last() {
        let bytes = FixtureDoc::new(&p("x")).bytes();
        let mut doc = DocxDocument::from_bytes(&bytes).expect("load");
        doc.append_block(wml::text_paragraph("tail", None));
        let names: Vec<&str> = doc.body().elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:p", "w:p", "w:sectPr"]);
    }

    #[test]
    fn bullet_style_is_created_with_numbering() {
        let bytes = FixtureDoc::new(&p("x")).bytes();
        let mut doc = DocxDocument::from_bytes(&bytes).expect("load");
        doc.ensure_bullet_style();
        doc.ensure_bullet_style();
        assert!(doc.has_style(BULLET_STYLE));
        let numbering = doc.numbering.as_ref().expect("numbering part");
        assert_eq!(numbering.root.children_named("w:num").count(), 1);

        let saved = doc.to_bytes().expect("save");
        let reloaded = DocxDocument::from_bytes(&saved).expect("reload");
        assert!(reloaded.has_style(BULLET_STYLE));
        assert!(reloaded.numbering.is_some());
    }

    #[test]
    fn identical_images_share_one_media_part() {
        let bytes = FixtureDoc::new(&p("x")).bytes();
        let mut doc = DocxDocument::from_bytes(&bytes).expect("load");
        let img = png(4, 2);
        let (a, info) = doc.add_image(&img).expect("add");
        let (b, _) = doc.add_image(&img).expect("add again");
        assert_eq!(a, b);
        assert_eq!((info.width_px, info.height_px), (4, 2));
        assert!(doc.content_types.has_default("png"));
    }

    #[test]
    fn remove_and_insert_blocks_by_path() {
        let bytes = FixtureDoc::new(&format!("{}{}", p("a"), p("b"))).bytes();
        let mut doc = DocxDocument::from_bytes(&bytes).expect("load");
        let removed = doc.remove_block(&[0]).expect("remove");
        assert_eq!(wml::paragraph_text(&removed), "a");
        doc.insert_block(&[], 1, removed).expect("insert");
        let texts: Vec<String> = doc.paragraphs().into_iter().map(wml::paragraph_text).collect();
        assert_eq!(texts, vec!["b", "a"]);
    }
}
