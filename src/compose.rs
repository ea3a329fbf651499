use std::collections::{BTreeSet, HashMap};

use anyhow::anyhow;

use crate::docx::document::{max_drawing_id, DocxDocument};
use crate::docx::wml;
use crate::docx::xml::{XmlElement, XmlNode};

/// Seam marker placed between two merged documents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakPolicy {
    /// Trim trailing blank paragraphs, then end the section on a "next page" break.
    #[default]
    SectionBreak,
    /// Append a paragraph holding an empty run and an explicit page break.
    PageBreakRun,
}

const SECTPR_ORDER: &[&str] = &[
    "w:headerReference", "w:footerReference", "w:footnotePr", "w:endnotePr", "w:type",
    "w:pgSz", "w:pgMar", "w:paperSrc", "w:pgBorders", "w:lnNumType", "w:pgNumType",
    "w:cols", "w:formProt", "w:vAlign", "w:noEndnote", "w:titlePg", "w:textDirection",
    "w:bidi", "w:rtlGutter", "w:docGrid", "w:printerSettings", "w:sectPrChange",
];

/// Appends `docs[1..]` to `docs[0]` in order and returns the merged document.
pub fn merge(docs: Vec<DocxDocument>, policy: BreakPolicy) -> anyhow::Result<DocxDocument> {
    let mut iter = docs.into_iter();
    let mut master = iter.next().ok_or_else(|| anyhow!("nothing to merge"))?;
    for (i, other) in iter.enumerate() {
        append_document(&mut master, other, policy);
        log::debug!("appended document {} to master", i + 2);
    }
    Ok(master)
}

/// Appends one document to `master` behind a break.
///
/// Under [`BreakPolicy::SectionBreak`] the appended content keeps its own page
/// layout: its final `w:sectPr` becomes the master's, while the seam paragraph
/// carries the section properties the master content had so far.
pub fn append_document(master: &mut DocxDocument, mut other: DocxDocument, policy: BreakPolicy) {
    match policy {
        BreakPolicy::SectionBreak => {
            trim_trailing_blank_paragraphs(master);
            insert_section_break(master);
        }
        BreakPolicy::PageBreakRun => master.append_block(wml::page_break_paragraph()),
    }

    merge_styles(master, &other);
    merge_numbering(master, &other);
    adopt_namespaces(&mut master.document.root, &other.document.root);

    let body = other.body_mut();
    let end = wml::block_end(body);
    let mut blocks: Vec<XmlNode> = body.children.drain(..end).collect();
    let mut tail = match policy {
        BreakPolicy::SectionBreak => other.body().child("w:sectPr").cloned(),
        BreakPolicy::PageBreakRun => None,
    };

    let mut rel_map: HashMap<String, Option<String>> = HashMap::new();
    let mut next_drawing = max_drawing_id(&master.document.root) + 1;
    let moved = blocks
        .iter_mut()
        .filter_map(XmlNode::as_element_mut)
        .chain(tail.as_mut());
    for el in moved {
        visit_mut(el, &mut |e| {
            for (key, value) in e.attrs.iter_mut() {
                if !key.starts_with("r:") {
                    continue;
                }
                let mapped = rel_map.entry(value.clone()).or_insert_with(|| {
                    let rel = other.rels.get(value.as_str())?;
                    master.import_relationship(&other, &rel)
                });
                if let Some(new_id) = mapped {
                    *value = new_id.clone();
                }
            }
            if e.name == "wp:docPr" {
                e.set_attr("id", &next_drawing.to_string());
                next_drawing += 1;
            }
        });
    }
    if blocks.iter().any(|n| n.as_element().is_some_and(|e| e.has_descendant("wp:docPr"))) {
        master.ensure_drawing_namespaces();
    }

    let master_body = master.body_mut();
    let at = wml::block_end(master_body);
    master_body.children.splice(at..at, blocks);
    if let Some(sect_pr) = tail {
        match master_body.position("w:sectPr") {
            Some(idx) => master_body.children[idx] = sect_pr.into(),
            None => master_body.children.push(sect_pr.into()),
        }
    }

    restamp_paragraph_styles(master);
}

/// Declares on `target` every prefix `source` declares and `target` lacks, and
/// unions the `mc:Ignorable` prefix lists.
fn adopt_namespaces(target: &mut XmlElement, source: &XmlElement) {
    let mut added = 0;
    for (key, value) in &source.attrs {
        if key.starts_with("xmlns:") && target.attr(key).is_none() {
            target.attrs.push((key.clone(), value.clone()));
            added += 1;
        }
    }
    if let Some(theirs) = source.attr("mc:Ignorable") {
        let mut prefixes: Vec<String> = target
            .attr("mc:Ignorable")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        for prefix in theirs.split_whitespace() {
            if !prefixes.iter().any(|p| p == prefix) {
                prefixes.push(prefix.to_string());
            }
        }
        target.set_attr("mc:Ignorable", &prefixes.join(" "));
    }
    if added > 0 {
        log::debug!("declared {added} namespace prefix(es) from the appended document");
    }
}

fn visit_mut(el: &mut XmlElement, f: &mut dyn FnMut(&mut XmlElement)) {
    f(el);
    el.for_each_descendant_mut(f);
}

pub fn trim_trailing_blank_paragraphs(doc: &mut DocxDocument) {
    let body = doc.body_mut();
    loop {
        let end = wml::block_end(body);
        let last = body.children[..end].iter().rposition(|c| c.as_element().is_some());
        match last {
            Some(i) if body.children[i].as_element().is_some_and(|p| p.name == "w:p" && wml::is_blank_paragraph(p)) => {
                body.children.remove(i);
            }
            _ => break,
        }
    }
}

/// Ends the master's content with a next-page section break that carries the
/// master's own section properties.
fn insert_section_break(master: &mut DocxDocument) {
    let mut sect_pr = master
        .body()
        .child("w:sectPr")
        .cloned()
        .unwrap_or_else(|| XmlElement::new("w:sectPr"));
    wml::insert_ordered(
        &mut sect_pr,
        XmlElement::new("w:type").with_attr("w:val", "nextPage"),
        SECTPR_ORDER,
    );

    let body = master.body_mut();
    let end = wml::block_end(body);
    let last = body.children[..end].iter().rposition(|c| c.as_element().is_some());
    let ends_with_paragraph = last.is_some_and(|i| body.children[i].is_element("w:p"));
    if !ends_with_paragraph {
        body.children.insert(end, wml::new_paragraph().into());
    }
    let end = wml::block_end(body);
    let Some(idx) = body.children[..end].iter().rposition(|c| c.is_element("w:p")) else {
        return;
    };
    if let Some(p) = body.children[idx].as_element_mut() {
        wml::set_section_break(p, sect_pr);
    }
}

/// Copies styles whose id the master does not define. The master keeps its own
/// definition on collision.
fn merge_styles(master: &mut DocxDocument, other: &DocxDocument) {
    let Some(other_styles) = other.styles.as_ref() else {
        return;
    };
    if master.styles.is_none() {
        master.ensure_styles_part().root = other_styles.root.clone();
        return;
    }
    let existing = master.style_ids();
    let mut added = 0;
    let incoming: Vec<XmlElement> = other_styles
        .root
        .children_named("w:style")
        .filter(|s| s.attr("w:styleId").is_some_and(|id| !existing.contains(id)))
        .cloned()
        .collect();
    let target = master.ensure_styles_part();
    adopt_namespaces(&mut target.root, &other_styles.root);
    for style in incoming {
        target.root.children.push(style.into());
        added += 1;
    }
    log::debug!("merged {added} style definition(s)");
}

/// Appends every abstract and concrete numbering definition. Colliding ids are
/// reported and left as they are.
fn merge_numbering(master: &mut DocxDocument, other: &DocxDocument) {
    let Some(other_numbering) = other.numbering.as_ref() else {
        return;
    };
    if master.numbering.is_none() {
        master.ensure_numbering_part().root = other_numbering.root.clone();
        return;
    }
    let numbering = master.ensure_numbering_part();
    adopt_namespaces(&mut numbering.root, &other_numbering.root);
    let ids = |name: &str, attr: &str, root: &XmlElement| -> BTreeSet<String> {
        root.children_named(name)
            .filter_map(|e| e.attr(attr).map(str::to_string))
            .collect()
    };
    let abstract_ids = ids("w:abstractNum", "w:abstractNumId", &numbering.root);
    let num_ids = ids("w:num", "w:numId", &numbering.root);

    for abs in other_numbering.root.children_named("w:abstractNum") {
        if let Some(id) = abs.attr("w:abstractNumId").filter(|id| abstract_ids.contains(*id)) {
            log::warn!("abstractNum id {id} defined by both merged documents");
        }
        let at = numbering
            .root
            .position("w:num")
            .or_else(|| numbering.root.position("w:numIdMacAtCleanup"))
            .unwrap_or(numbering.root.children.len());
        numbering.root.children.insert(at, abs.clone().into());
    }
    for num in other_numbering.root.children_named("w:num") {
        if let Some(id) = num.attr("w:numId").filter(|id| num_ids.contains(*id)) {
            log::warn!("num id {id} defined by both merged documents");
        }
        let at = numbering
            .root
            .position("w:numIdMacAtCleanup")
            .unwrap_or(numbering.root.children.len());
        numbering.root.children.insert(at, num.clone().into());
    }
}

/// Gives every top-level body paragraph exactly one resolvable `w:pStyle`.
pub fn restamp_paragraph_styles(doc: &mut DocxDocument) {
    let ids = doc.style_ids();
    let default = doc.default_paragraph_style();
    let mut by_name: HashMap<String, Option<String>> = HashMap::new();

    let mut resolved: Vec<Option<String>> = Vec::new();
    for p in doc.paragraphs() {
        let id = match wml::paragraph_style(p) {
            Some(v) if ids.contains(v) => Some(v.to_string()),
            Some(v) => by_name
                .entry(v.to_string())
                .or_insert_with(|| doc.style_id_for_name(v))
                .clone()
                .or_else(|| default.clone()),
            None => default.clone(),
        };
        resolved.push(id);
    }

    let body = doc.body_mut();
    let mut i = 0;
    for p in body.children_named_mut("w:p") {
        let Some(id) = resolved.get(i) else {
            break;
        };
        i += 1;
        let current: Vec<&str> = p
            .child("w:pPr")
            .map(|ppr| {
                ppr.children_named("w:pStyle")
                    .filter_map(|s| s.attr("w:val"))
                    .collect()
            })
            .unwrap_or_default();
        match id {
            Some(id) if current != [id.as_str()] => wml::set_paragraph_style(p, id),
            Some(_) => {}
            None => {
                if let Some(ppr) = p.child_mut("w:pPr") {
                    ppr.remove_children_named("w:pStyle");
                }
            }
        }
    }
}
