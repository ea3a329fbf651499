use serde::Deserialize;

use crate::docx::xml::{XmlElement, XmlNode};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";

pub const BULLET_STYLE: &str = "ListBullet";
pub const TABLE_GRID_STYLE: &str = "TableGrid";

/// 1 inch in twentieths of a point.
pub const TWIPS_PER_INCH: u32 = 1440;

const PPR_ORDER: &[&str] = &[
    "w:pStyle", "w:keepNext", "w:keepLines", "w:pageBreakBefore", "w:framePr",
    "w:widowControl", "w:numPr", "w:suppressLineNumbers", "w:pBdr", "w:shd", "w:tabs",
    "w:suppressAutoHyphens", "w:kinsoku", "w:wordWrap", "w:overflowPunct", "w:topLinePunct",
    "w:autoSpaceDE", "w:autoSpaceDN", "w:bidi", "w:adjustRightInd", "w:snapToGrid",
    "w:spacing", "w:ind", "w:contextualSpacing", "w:mirrorIndents", "w:suppressOverlap",
    "w:jc", "w:textDirection", "w:textAlignment", "w:textboxTightWrap", "w:outlineLvl",
    "w:divId", "w:cnfStyle", "w:rPr", "w:sectPr", "w:pPrChange",
];

const RPR_ORDER: &[&str] = &[
    "w:rStyle", "w:rFonts", "w:b", "w:bCs", "w:i", "w:iCs", "w:caps", "w:smallCaps",
    "w:strike", "w:dstrike", "w:outline", "w:shadow", "w:emboss", "w:imprint", "w:noProof",
    "w:snapToGrid", "w:vanish", "w:webHidden", "w:color", "w:spacing", "w:w", "w:kern",
    "w:position", "w:sz", "w:szCs", "w:highlight", "w:u", "w:effect", "w:bdr", "w:shd",
    "w:fitText", "w:vertAlign", "w:rtl", "w:cs", "w:em", "w:lang", "w:eastAsianLayout",
    "w:specVanish", "w:oMath",
];

/// Run-level formatting. `None` leaves the template's value in place.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RunStyle {
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default, rename = "size")]
    pub size_pt: Option<f32>,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub italic: Option<bool>,
    /// Hex RGB, e.g. `"1F3864"`.
    #[serde(default)]
    pub color: Option<String>,
}

impl RunStyle {
    pub fn font(mut self, name: &str) -> Self {
        self.font = Some(name.to_string());
        self
    }

    pub fn size(mut self, pt: f32) -> Self {
        self.size_pt = Some(pt);
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = Some(true);
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = Some(true);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == RunStyle::default()
    }

    pub fn apply(&self, run: &mut XmlElement) {
        if self.is_empty() {
            return;
        }
        let rpr = ensure_first_child(run, "w:rPr");
        if let Some(font) = self.font.as_deref() {
            let fonts = XmlElement::new("w:rFonts")
                .with_attr("w:ascii", font)
                .with_attr("w:hAnsi", font)
                .with_attr("w:cs", font)
                .with_attr("w:eastAsia", font);
            insert_ordered(rpr, fonts, RPR_ORDER);
        }
        if let Some(bold) = self.bold {
            insert_ordered(rpr, toggle("w:b", bold), RPR_ORDER);
            insert_ordered(rpr, toggle("w:bCs", bold), RPR_ORDER);
        }
        if let Some(italic) = self.italic {
            insert_ordered(rpr, toggle("w:i", italic), RPR_ORDER);
            insert_ordered(rpr, toggle("w:iCs", italic), RPR_ORDER);
        }
        if let Some(color) = self.color.as_deref() {
            let color = color.trim_start_matches('#');
            insert_ordered(rpr, XmlElement::new("w:color").with_attr("w:val", color), RPR_ORDER);
        }
        if let Some(pt) = self.size_pt {
            let half_points = (pt * 2.0).round().max(1.0) as u32;
            let v = half_points.to_string();
            insert_ordered(rpr, XmlElement::new("w:sz").with_attr("w:val", &v), RPR_ORDER);
            insert_ordered(rpr, XmlElement::new("w:szCs").with_attr("w:val", &v), RPR_ORDER);
        }
    }
}

fn toggle(name: &str, on: bool) -> XmlElement {
    let el = XmlElement::new(name);
    if on {
        el
    } else {
        el.with_attr("w:val", "0")
    }
}

/// Returns the child `name`, creating it as the first child when missing.
pub fn ensure_first_child<'a>(parent: &'a mut XmlElement, name: &str) -> &'a mut XmlElement {
    let idx = match parent.position(name) {
        Some(i) => i,
        None => {
            parent.children.insert(0, XmlElement::new(name).into());
            0
        }
    };
    parent.children[idx]
        .as_element_mut()
        .expect("position() only returns element indices")
}

/// Inserts `child` into `parent` following the schema sequence `order`, replacing an
/// existing element of the same name.
pub fn insert_ordered(parent: &mut XmlElement, child: XmlElement, order: &[&str]) {
    if let Some(i) = parent.position(&child.name) {
        parent.children[i] = child.into();
        return;
    }
    let rank = |name: &str| order.iter().position(|n| *n == name);
    let at = match rank(&child.name) {
        Some(mine) => parent
            .children
            .iter()
            .position(|c| {
                c.as_element()
                    .and_then(|e| rank(&e.name))
                    .is_some_and(|r| r > mine)
            })
            .unwrap_or(parent.children.len()),
        None => parent.children.len(),
    };
    parent.children.insert(at, child.into());
}

pub fn ppr_mut(p: &mut XmlElement) -> &mut XmlElement {
    ensure_first_child(p, "w:pPr")
}

pub fn set_ppr_child(p: &mut XmlElement, child: XmlElement) {
    insert_ordered(ppr_mut(p), child, PPR_ORDER);
}

pub fn paragraph_style(p: &XmlElement) -> Option<&str> {
    p.child("w:pPr")?.child("w:pStyle")?.attr("w:val")
}

pub fn set_paragraph_style(p: &mut XmlElement, style_id: &str) {
    let ppr = ppr_mut(p);
    ppr.remove_children_named("w:pStyle");
    insert_ordered(ppr, XmlElement::new("w:pStyle").with_attr("w:val", style_id), PPR_ORDER);
}

pub fn set_left_indent(p: &mut XmlElement, twips: u32) {
    let ppr = ppr_mut(p);
    let mut ind = ppr.child("w:ind").cloned().unwrap_or_else(|| XmlElement::new("w:ind"));
    ind.set_attr("w:left", &twips.to_string());
    ind.remove_attr("w:start");
    insert_ordered(ppr, ind, PPR_ORDER);
}

pub fn set_section_break(p: &mut XmlElement, sect_pr: XmlElement) {
    set_ppr_child(p, sect_pr);
}

pub fn runs(p: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    p.children_named("w:r")
}

pub fn run_text(r: &XmlElement) -> String {
    let mut out = String::new();
    for c in r.elements() {
        match c.name.as_str() {
            "w:t" => {
                for t in &c.children {
                    if let XmlNode::Text(s) = t {
                        out.push_str(s);
                    }
                }
            }
            "w:tab" | "w:ptab" => out.push('\t'),
            "w:cr" => out.push('\n'),
            "w:br" => {
                if c.attr("w:type").unwrap_or("textWrapping") == "textWrapping" {
                    out.push('\n');
                }
            }
            "w:noBreakHyphen" => out.push('-'),
            _ => {}
        }
    }
    out
}

/// Concatenated text of the paragraph's direct runs.
pub fn paragraph_text(p: &XmlElement) -> String {
    runs(p).map(run_text).collect()
}

/// Replaces the text content of a run, keeping its `w:rPr`. `\n` and `\t` become
/// `w:br` / `w:tab`.
pub fn set_run_text(r: &mut XmlElement, text: &str) {
    r.children.retain(|c| match c {
        XmlNode::Element(e) => !matches!(
            e.name.as_str(),
            "w:t" | "w:tab" | "w:ptab" | "w:br" | "w:cr" | "w:noBreakHyphen" | "w:softHyphen"
        ),
        _ => false,
    });
    for (li, line) in text.split('\n').enumerate() {
        if li > 0 {
            r.children.push(XmlElement::new("w:br").into());
        }
        for (ti, chunk) in line.split('\t').enumerate() {
            if ti > 0 {
                r.children.push(XmlElement::new("w:tab").into());
            }
            if !chunk.is_empty() {
                r.children.push(text_element(chunk).into());
            }
        }
    }
}

fn text_element(text: &str) -> XmlElement {
    let mut t = XmlElement::new("w:t");
    if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
        t.set_attr("xml:space", "preserve");
    }
    t.with_text(text)
}

pub fn new_run(text: &str, style: Option<&RunStyle>) -> XmlElement {
    let mut r = XmlElement::new("w:r");
    if let Some(style) = style {
        style.apply(&mut r);
    }
    set_run_text(&mut r, text);
    r
}

pub fn new_paragraph() -> XmlElement {
    XmlElement::new("w:p")
}

pub fn text_paragraph(text: &str, style: Option<&RunStyle>) -> XmlElement {
    let mut p = new_paragraph();
    if !text.is_empty() {
        p.children.push(new_run(text, style).into());
    }
    p
}

pub fn bullet_paragraph(text: &str, style: Option<&RunStyle>) -> XmlElement {
    let mut p = text_paragraph(text, style);
    set_paragraph_style(&mut p, BULLET_STYLE);
    set_left_indent(&mut p, 0);
    p
}

pub fn page_break_paragraph() -> XmlElement {
    new_paragraph()
        .with_child(XmlElement::new("w:r"))
        .with_child(XmlElement::new("w:r").with_child(XmlElement::new("w:br").with_attr("w:type", "page")))
}

/// No visible text and nothing structural (drawings, objects, section breaks).
pub fn is_blank_paragraph(p: &XmlElement) -> bool {
    if !paragraph_text(p).trim().is_empty() {
        return false;
    }
    let structural = ["w:drawing", "w:pict", "w:object", "w:sectPr", "w:fldChar", "w:fldSimple"];
    !structural.iter().any(|n| p.has_descendant(n))
}

/// Block children that carry content, i.e. everything but the trailing body `w:sectPr`.
pub fn block_end(body: &XmlElement) -> usize {
    match body.children.iter().rposition(|c| c.as_element().is_some()) {
        Some(i) if body.children[i].is_element("w:sectPr") => i,
        _ => body.children.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_text_round_trips_breaks_and_tabs() {
        let mut r = XmlElement::new("w:r");
        set_run_text(&mut r, "a\tb\nc ");
        assert_eq!(run_text(&r), "a\tb\nc ");
        let last_t = r.children_named("w:t").last().expect("w:t");
        assert_eq!(last_t.attr("xml:space"), Some("preserve"));
    }

    #[test]
    fn run_style_orders_properties() {
        let mut r = new_run("x", None);
        RunStyle::default().size(14.0).font("Arial").bold().apply(&mut r);
        let rpr = r.child("w:rPr").expect("rPr");
        let names: Vec<&str> = rpr.elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["w:rFonts", "w:b", "w:bCs", "w:sz", "w:szCs"]);
        assert_eq!(rpr.child("w:sz").and_then(|e| e.attr("w:val")), Some("28"));
        assert_eq!(r.elements().next().map(|e| e.name.as_str()), Some("w:rPr"));
    }

    #[test]
    fn bullet_paragraph_has_style_and_zero_indent() {
        let p = bullet_paragraph("Item", None);
        assert_eq!(paragraph_style(&p), Some(BULLET_STYLE));
        let ind = p.child("w:pPr").and_then(|ppr| ppr.child("w:ind")).expect("ind");
        assert_eq!(ind.attr("w:left"), Some("0"));
        assert_eq!(paragraph_text(&p), "Item");
    }

    #[test]
    fn section_break_goes_after_style() {
        let mut p = text_paragraph("x", None);
        set_section_break(&mut p, XmlElement::new("w:sectPr"));
        set_paragraph_style(&mut p, "Normal");
        let names: Vec<&str> = p
            .child("w:pPr")
            .expect("pPr")
            .elements()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["w:pStyle", "w:sectPr"]);
    }

    #[test]
    fn drawing_paragraph_is_not_blank() {
        let p = new_paragraph().with_child(XmlElement::new("w:r").with_child(XmlElement::new("w:drawing")));
        assert!(!is_blank_paragraph(&p));
        assert!(is_blank_paragraph(&text_paragraph("  ", None)));
    }
}
