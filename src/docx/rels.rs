use crate::docx::xml::{XmlDocument, XmlElement};

pub const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const CONTENT_TYPES_NS: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

pub const REL_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_STYLES: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
pub const REL_NUMBERING: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";

pub const CT_STYLES: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
pub const CT_NUMBERING: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

/// A `*.rels` part. Targets are kept as written (relative to the owning part's folder).
pub struct Relationships {
    pub doc: XmlDocument,
}

impl Relationships {
    pub fn empty(name: &str) -> Self {
        let root = XmlElement::new("Relationships").with_attr("xmlns", RELS_NS);
        Self {
            doc: XmlDocument::new(name, root),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Relationship> + '_ {
        self.doc.root.children_named("Relationship").filter_map(|el| {
            let id = el.attr("Id")?.trim().to_string();
            let target = el.attr("Target")?.trim().to_string();
            if id.is_empty() || target.is_empty() {
                return None;
            }
            Some(Relationship {
                id,
                rel_type: el.attr("Type").unwrap_or("").to_string(),
                target,
                external: el.attr("TargetMode") == Some("External"),
            })
        })
    }

    pub fn get(&self, id: &str) -> Option<Relationship> {
        self.iter().find(|r| r.id == id)
    }

    pub fn find_by_type(&self, rel_type: &str) -> Option<Relationship> {
        self.iter().find(|r| r.rel_type == rel_type)
    }

    /// Smallest free `rIdN`.
    pub fn next_id(&self) -> String {
        let max = self
            .iter()
            .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
            .max()
            .unwrap_or(0);
        format!("rId{}", max + 1)
    }

    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let id = self.next_id();
        let mut el = XmlElement::new("Relationship")
            .with_attr("Id", &id)
            .with_attr("Type", rel_type)
            .with_attr("Target", target);
        if external {
            el.set_attr("TargetMode", "External");
        }
        self.doc.root.children.push(el.into());
        id
    }
}

/// Resolves a relationship target of `word/document.xml` (or any part under `word/`)
/// to a package entry name.
pub fn normalize_target(base: &str, target: &str) -> String {
    let t = target.replace('\\', "/");
    if let Some(abs) = t.strip_prefix('/') {
        return abs.to_string();
    }
    if t.starts_with("../") {
        // Only parts directly under the package root are addressed this way.
        return t.trim_start_matches("../").to_string();
    }
    format!("{base}{t}")
}

pub struct ContentTypes {
    pub doc: XmlDocument,
}

impl ContentTypes {
    pub fn has_default(&self, extension: &str) -> bool {
        self.doc.root.children_named("Default").any(|el| {
            el.attr("Extension")
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
    }

    pub fn ensure_default(&mut self, extension: &str, content_type: &str) {
        if self.has_default(extension) {
            return;
        }
        let el = XmlElement::new("Default")
            .with_attr("Extension", extension)
            .with_attr("ContentType", content_type);
        // Defaults precede Overrides.
        let at = self.doc.root.position("Override").unwrap_or(self.doc.root.children.len());
        self.doc.root.children.insert(at, el.into());
    }

    /// Content type of a package entry: its Override, else the Default for its extension.
    pub fn content_type_for(&self, entry_name: &str) -> Option<String> {
        let part_name = format!("/{}", entry_name.trim_start_matches('/'));
        let by_override = self
            .doc
            .root
            .children_named("Override")
            .find(|el| el.attr("PartName") == Some(part_name.as_str()))
            .and_then(|el| el.attr("ContentType"));
        if let Some(ct) = by_override {
            return Some(ct.to_string());
        }
        let ext = entry_name.rsplit_once('.').map(|(_, e)| e)?;
        self.doc
            .root
            .children_named("Default")
            .find(|el| el.attr("Extension").is_some_and(|e| e.eq_ignore_ascii_case(ext)))
            .and_then(|el| el.attr("ContentType"))
            .map(str::to_string)
    }

    pub fn ensure_override(&mut self, part_name: &str, content_type: &str) {
        let part_name = format!("/{}", part_name.trim_start_matches('/'));
        let exists = self
            .doc
            .root
            .children_named("Override")
            .any(|el| el.attr("PartName") == Some(part_name.as_str()));
        if exists {
            return;
        }
        let el = XmlElement::new("Override")
            .with_attr("PartName", &part_name)
            .with_attr("ContentType", content_type);
        self.doc.root.children.push(el.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_skips_existing() {
        let mut rels = Relationships::empty("word/_rels/document.xml.rels");
        assert_eq!(rels.add(REL_STYLES, "styles.xml", false), "rId1");
        assert_eq!(rels.add(REL_IMAGE, "media/a.png", false), "rId2");
        assert_eq!(rels.get("rId2").map(|r| r.target), Some("media/a.png".to_string()));
    }

    #[test]
    fn targets_resolve_against_word_folder() {
        assert_eq!(normalize_target("word/", "media/image1.png"), "word/media/image1.png");
        assert_eq!(normalize_target("word/", "/word/header1.xml"), "word/header1.xml");
        assert_eq!(normalize_target("word/", "../customXml/item1.xml"), "customXml/item1.xml");
    }

    #[test]
    fn content_type_defaults_go_before_overrides() {
        let root = XmlElement::new("Types")
            .with_attr("xmlns", CONTENT_TYPES_NS)
            .with_child(XmlElement::new("Override").with_attr("PartName", "/word/document.xml"));
        let mut ct = ContentTypes {
            doc: XmlDocument::new("[Content_Types].xml", root),
        };
        ct.ensure_default("png", "image/png");
        ct.ensure_default("PNG", "image/png");
        assert_eq!(ct.doc.root.children.len(), 2);
        assert_eq!(ct.doc.root.elements().next().map(|e| e.name.as_str()), Some("Default"));
        assert_eq!(ct.content_type_for("word/media/x.Png").as_deref(), Some("image/png"));
        assert_eq!(ct.content_type_for("word/other.bin"), None);
    }
}
