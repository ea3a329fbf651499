use crate::docx::document::DocxDocument;
use crate::docx::drawing::{extent_emu, inline_picture, ImageExtent};
use crate::docx::wml;
use crate::docx::xml::XmlElement;
use crate::template::placeholder::token;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageTarget {
    /// The first paragraph containing `${name}`; its runs are cleared and the
    /// picture becomes its only content.
    Anchor(String),
    /// Like [`ImageTarget::Anchor`], but only the token is removed and the rest of
    /// the paragraph text stays.
    InlineAnchor(String),
    /// The first content control already holding a picture, optionally matched by
    /// its tag or alias.
    PictureControl { tag: Option<String> },
}

/// Body path of the first paragraph (at any depth) whose text contains `${name}`.
pub fn find_anchor(doc: &DocxDocument, name: &str) -> Option<Vec<usize>> {
    let tok = token(name);
    doc.body()
        .find_path(&|el| el.name == "w:p" && wml::paragraph_text(el).contains(&tok))
}

/// Replaces the anchor paragraph with one `ListBullet` paragraph per item.
pub fn insert_bullet_list(doc: &mut DocxDocument, anchor: &str, items: &[String]) -> bool {
    let Some(path) = find_anchor(doc, anchor) else {
        log::warn!("anchor ${{{anchor}}} not found; bullet list skipped");
        return false;
    };
    let Some((&index, parent_path)) = path.split_last() else {
        return false;
    };
    if !items.is_empty() {
        doc.ensure_bullet_style();
    }

    let body = doc.body_mut();
    let Some(parent) = body.element_at_mut(parent_path) else {
        log::warn!("anchor ${{{anchor}}} parent vanished; bullet list skipped");
        return false;
    };
    parent.children.remove(index);
    for (offset, item) in items.iter().enumerate() {
        parent
            .children
            .insert(index + offset, wml::bullet_paragraph(item, None).into());
    }
    if parent.name == "w:tc" && parent.child("w:p").is_none() {
        parent.children.insert(index, wml::new_paragraph().into());
    }
    log::debug!("inserted {} bullet item(s) at ${{{anchor}}}", items.len());
    true
}

/// Places one picture at `target`. Fails only when `image` is not a supported
/// image; a missing target yields `Ok(false)`.
pub fn insert_image(
    doc: &mut DocxDocument,
    target: &ImageTarget,
    image: &[u8],
    extent: ImageExtent,
) -> anyhow::Result<bool> {
    let found = match target {
        ImageTarget::Anchor(name) | ImageTarget::InlineAnchor(name) => find_anchor(doc, name),
        ImageTarget::PictureControl { tag } => find_picture_control(doc.body(), tag.as_deref()),
    };
    let Some(path) = found else {
        log::warn!("image target {target:?} not found; image skipped");
        return Ok(false);
    };

    let (rel_id, info) = doc.add_image(image)?;
    doc.ensure_drawing_namespaces();
    let doc_pr_id = doc.next_drawing_id();
    let (cx, cy) = extent_emu(extent, &info);
    let drawing = inline_picture(&rel_id, doc_pr_id, &format!("Picture {doc_pr_id}"), cx, cy);
    let picture_run = XmlElement::new("w:r").with_child(drawing);

    let run_level = path.len() >= 2
        && doc
            .body()
            .element_at(&path[..path.len() - 1])
            .is_some_and(|parent| parent.name == "w:p");
    let Some(el) = doc.body_mut().element_at_mut(&path) else {
        return Ok(false);
    };
    match target {
        ImageTarget::Anchor(_) => {
            el.children.retain(|c| c.is_element("w:pPr"));
            el.children.push(picture_run.into());
        }
        ImageTarget::InlineAnchor(name) => {
            strip_token(el, &token(name));
            el.children.push(picture_run.into());
        }
        ImageTarget::PictureControl { .. } => {
            let content = wml::ensure_first_child(el, "w:sdtContent");
            content.children.clear();
            if run_level {
                content.children.push(picture_run.into());
            } else {
                content
                    .children
                    .push(wml::new_paragraph().with_child(picture_run).into());
            }
        }
    }
    log::debug!("inserted {}x{} {} image as {rel_id}", info.width_px, info.height_px, info.extension);
    Ok(true)
}

fn find_picture_control(body: &XmlElement, tag: Option<&str>) -> Option<Vec<usize>> {
    body.find_path(&|el| {
        if el.name != "w:sdt" {
            return false;
        }
        let has_picture = el
            .child("w:sdtContent")
            .is_some_and(|c| c.has_descendant("w:drawing") || c.has_descendant("w:pict"));
        if !has_picture {
            return false;
        }
        let Some(tag) = tag else {
            return true;
        };
        el.child("w:sdtPr").is_some_and(|pr| {
            ["w:tag", "w:alias"]
                .iter()
                .any(|n| pr.child(n).and_then(|e| e.attr("w:val")) == Some(tag))
        })
    })
}

/// Removes `tok` from a paragraph, in place when it sits in one run, otherwise by
/// collapsing the text into the first run.
fn strip_token(p: &mut XmlElement, tok: &str) {
    let mut in_run = false;
    for run in p.children_named_mut("w:r") {
        let text = wml::run_text(run);
        if text.contains(tok) {
            wml::set_run_text(run, &text.replace(tok, ""));
            in_run = true;
        }
    }
    if in_run {
        return;
    }
    let text = wml::paragraph_text(p).replace(tok, "");
    let mut first = true;
    for run in p.children_named_mut("w:r") {
        wml::set_run_text(run, if first { text.as_str() } else { "" });
        first = false;
    }
}

pub fn append_table(doc: &mut DocxDocument, table: XmlElement) {
    let uses_grid = table
        .child("w:tblPr")
        .and_then(|pr| pr.child("w:tblStyle"))
        .and_then(|s| s.attr("w:val"))
        == Some(wml::TABLE_GRID_STYLE);
    if uses_grid {
        doc.ensure_table_grid_style();
    }
    if table.has_descendant("w:pStyle") {
        let wants_bullets = table
            .descendants()
            .into_iter()
            .any(|e| e.name == "w:pStyle" && e.attr("w:val") == Some(wml::BULLET_STYLE));
        if wants_bullets {
            doc.ensure_bullet_style();
        }
    }
    doc.append_block(table);
    doc.append_block(wml::new_paragraph());
}
