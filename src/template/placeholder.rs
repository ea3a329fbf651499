use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::docx::document::DocxDocument;
use crate::docx::wml::{self, RunStyle};
use crate::docx::xml::{XmlElement, XmlNode};

pub static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").expect("placeholder regex"));

pub fn token(name: &str) -> String {
    format!("${{{name}}}")
}

/// How a key's value is written back into its paragraph.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ReplacePolicy {
    /// Replace inside each run, keeping run formatting.
    #[default]
    InRun,
    /// Blank every run and write the whole paragraph text into the first one.
    CollapseToFirstRun,
    /// Drop every run and write the text into one new run with `style`.
    /// `quoted` wraps the value in quotation marks and forces italics.
    Restyle { style: RunStyle, quoted: bool },
}

impl ReplacePolicy {
    fn strength(&self) -> u8 {
        match self {
            ReplacePolicy::InRun => 0,
            ReplacePolicy::CollapseToFirstRun => 1,
            ReplacePolicy::Restyle { .. } => 2,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PolicyTable {
    default: ReplacePolicy,
    per_key: HashMap<String, ReplacePolicy>,
}

impl PolicyTable {
    pub fn new(default: ReplacePolicy) -> Self {
        Self {
            default,
            per_key: HashMap::new(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, policy: ReplacePolicy) {
        self.per_key.insert(key.into(), policy);
    }

    pub fn get(&self, key: &str) -> &ReplacePolicy {
        self.per_key.get(key).unwrap_or(&self.default)
    }
}

/// Scalar values keyed by placeholder name, plus the policy for each key.
#[derive(Clone, Debug, Default)]
pub struct Replacements {
    values: BTreeMap<String, String>,
    pub policies: PolicyTable,
}

impl Replacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policies(policies: PolicyTable) -> Self {
        Self {
            values: BTreeMap::new(),
            policies,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn set_policy(&mut self, key: impl Into<String>, policy: ReplacePolicy) {
        self.policies.set(key, policy);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Value as written into the document, i.e. quoted when its policy asks for it.
    fn rendered(&self, key: &str) -> Option<String> {
        let value = self.get(key)?;
        Some(match self.policies.get(key) {
            ReplacePolicy::Restyle { quoted: true, .. } => format!("\"{value}\""),
            _ => value.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Replacements {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut out = Replacements::new();
        for (k, v) in iter {
            out.insert(k, v);
        }
        out
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub replaced: usize,
    pub paragraphs: usize,
    /// Token names seen in the document with no value.
    pub unresolved: BTreeSet<String>,
}

/// Substitutes every known `${name}` token. Body paragraphs are visited in
/// document order (nested table and content-control paragraphs included), then
/// each referenced header/footer part.
pub fn resolve(doc: &mut DocxDocument, replacements: &Replacements) -> ResolveReport {
    let mut report = ResolveReport::default();
    if replacements.is_empty() {
        return report;
    }

    resolve_tree(doc.body_mut(), replacements, &mut report);

    let mut part_names: Vec<String> = Vec::new();
    for r in doc.header_footer_refs() {
        if !part_names.contains(&r.part_name) {
            part_names.push(r.part_name);
        }
    }
    for name in part_names {
        if let Some(part) = doc.part_mut(&name) {
            resolve_tree(&mut part.root, replacements, &mut report);
        }
    }

    if !report.unresolved.is_empty() {
        log::warn!(
            "unresolved placeholders left in document: {}",
            report.unresolved.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    log::debug!(
        "resolved {} placeholder(s) in {} paragraph(s)",
        report.replaced,
        report.paragraphs
    );
    report
}

fn resolve_tree(root: &mut XmlElement, replacements: &Replacements, report: &mut ResolveReport) {
    root.for_each_descendant_mut(&mut |el| {
        if el.name == "w:p" {
            resolve_paragraph(el, replacements, report);
        }
    });
}

/// Run text spans of a paragraph's direct runs: `(child index, start, end)` in
/// bytes of the concatenated paragraph text.
fn run_spans(p: &XmlElement) -> Vec<(usize, usize, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    for (i, c) in p.children.iter().enumerate() {
        if let XmlNode::Element(r) = c {
            if r.name == "w:r" {
                let len = wml::run_text(r).len();
                out.push((i, pos, pos + len));
                pos += len;
            }
        }
    }
    out
}

fn resolve_paragraph(p: &mut XmlElement, replacements: &Replacements, report: &mut ResolveReport) {
    let text = wml::paragraph_text(p);
    if !text.contains("${") {
        return;
    }

    let mut hits: Vec<(usize, usize, String)> = Vec::new();
    for caps in TOKEN_RE.captures_iter(&text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if replacements.get(name.as_str()).is_some() {
            hits.push((whole.start(), whole.end(), name.as_str().to_string()));
        } else {
            report.unresolved.insert(name.as_str().to_string());
        }
    }
    if hits.is_empty() {
        return;
    }

    let substitute = |s: &str| {
        TOKEN_RE
            .replace_all(s, |caps: &Captures| {
                replacements
                    .rendered(&caps[1])
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    };

    let mut policy = &ReplacePolicy::InRun;
    for (_, _, name) in &hits {
        let candidate = replacements.policies.get(name);
        if candidate.strength() > policy.strength() {
            policy = candidate;
        }
    }

    let spans = run_spans(p);
    let split = hits.iter().any(|(start, end, _)| {
        !spans
            .iter()
            .any(|(_, s, e)| *s <= *start && *end <= *e)
    });

    match policy {
        ReplacePolicy::InRun if !split => {
            for (idx, _, _) in spans {
                let Some(run) = p.children[idx].as_element_mut() else {
                    continue;
                };
                let before = wml::run_text(run);
                if !TOKEN_RE.is_match(&before) {
                    continue;
                }
                let after = substitute(&before);
                if after != before {
                    wml::set_run_text(run, &after);
                }
            }
        }
        ReplacePolicy::InRun | ReplacePolicy::CollapseToFirstRun => {
            if split {
                log::debug!("placeholder split across runs; collapsing paragraph into first run");
            }
            collapse_into_first_run(p, &substitute(&text));
        }
        ReplacePolicy::Restyle { style, quoted } => {
            let mut style = style.clone();
            if *quoted {
                style.italic = Some(true);
            }
            restyle(p, &substitute(&text), &style);
        }
    }

    for (_, _, name) in &hits {
        log::debug!("substituted ${{{name}}}");
    }
    report.replaced += hits.len();
    report.paragraphs += 1;
}

fn collapse_into_first_run(p: &mut XmlElement, text: &str) {
    let mut first = true;
    for run in p.children_named_mut("w:r") {
        if first {
            wml::set_run_text(run, text);
            first = false;
        } else {
            wml::set_run_text(run, "");
        }
    }
    if first {
        p.children.push(wml::new_run(text, None).into());
    }
}

fn restyle(p: &mut XmlElement, text: &str, style: &RunStyle) {
    let at = p.position("w:r").unwrap_or(p.children.len());
    p.remove_children_named("w:r");
    let at = at.min(p.children.len());
    p.children.insert(at, wml::new_run(text, Some(style)).into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testing::{p, FixtureDoc};

    fn load(body: &str) -> DocxDocument {
        DocxDocument::from_bytes(&FixtureDoc::new(body).bytes()).expect("load")
    }

    fn texts(doc: &DocxDocument) -> Vec<String> {
        doc.paragraphs().into_iter().map(wml::paragraph_text).collect()
    }

    #[test]
    fn in_run_replace_keeps_run_formatting() {
        let body = r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Title: ${title}</w:t></w:r></w:p>"#;
        let mut doc = load(body);
        let repl: Replacements = [("title", "Plan")].into_iter().collect();
        let report = resolve(&mut doc, &repl);
        assert_eq!(report.replaced, 1);
        assert_eq!(texts(&doc), vec!["Title: Plan"]);
        let run = doc.paragraphs()[0].child("w:r").expect("run");
        assert!(run.child("w:rPr").and_then(|r| r.child("w:b")).is_some());
    }

    #[test]
    fn all_occurrences_in_a_paragraph_are_replaced() {
        let mut doc = load(&p("${a} and ${a} or ${b}"));
        let repl: Replacements = [("a", "x"), ("b", "y")].into_iter().collect();
        resolve(&mut doc, &repl);
        assert_eq!(texts(&doc), vec!["x and x or y"]);
    }

    #[test]
    fn split_token_collapses_into_first_run() {
        let body = r#"<w:p><w:r><w:rPr><w:i/></w:rPr><w:t>Agency: ${ag</w:t></w:r><w:r><w:t>ency}!</w:t></w:r></w:p>"#;
        let mut doc = load(body);
        let repl: Replacements = [("agency", "DICT")].into_iter().collect();
        resolve(&mut doc, &repl);
        let para = doc.paragraphs()[0];
        let runs: Vec<String> = wml::runs(para).map(wml::run_text).collect();
        assert_eq!(runs, vec!["Agency: DICT!".to_string(), String::new()]);
        assert!(para.child("w:r").and_then(|r| r.child("w:rPr")).is_some());
    }

    #[test]
    fn restyle_quoted_wraps_and_italicizes() {
        let mut doc = load(&p("${vision}"));
        let mut repl = Replacements::new();
        repl.insert("vision", "A digital nation");
        repl.set_policy(
            "vision",
            ReplacePolicy::Restyle {
                style: RunStyle::default().font("Arial").size(12.0),
                quoted: true,
            },
        );
        resolve(&mut doc, &repl);
        let para = doc.paragraphs()[0];
        assert_eq!(wml::paragraph_text(para), "\"A digital nation\"");
        let rpr = para.child("w:r").and_then(|r| r.child("w:rPr")).expect("rPr");
        assert!(rpr.child("w:i").is_some());
        assert_eq!(rpr.child("w:rFonts").and_then(|f| f.attr("w:ascii")), Some("Arial"));
    }

    #[test]
    fn strongest_policy_wins_for_the_paragraph() {
        let body = r#"<w:p><w:r><w:t>${a}</w:t></w:r><w:r><w:t> - ${b}</w:t></w:r></w:p>"#;
        let mut doc = load(body);
        let mut repl: Replacements = [("a", "1"), ("b", "2")].into_iter().collect();
        repl.set_policy("b", ReplacePolicy::CollapseToFirstRun);
        resolve(&mut doc, &repl);
        let runs: Vec<String> = wml::runs(doc.paragraphs()[0]).map(wml::run_text).collect();
        assert_eq!(runs, vec!["1 - 2".to_string(), String::new()]);
    }

    #[test]
    fn values_are_not_rescanned() {
        let mut doc = load(&p("${a}"));
        let repl: Replacements = [("a", "${b}"), ("b", "boom")].into_iter().collect();
        resolve(&mut doc, &repl);
        assert_eq!(texts(&doc), vec!["${b}"]);
    }

    #[test]
    fn missing_and_unknown_keys_are_no_ops() {
        let mut doc = load(&p("Hello ${name}"));
        let before = doc.to_bytes().expect("save");
        let repl: Replacements = [("missingKey", "x")].into_iter().collect();
        let report = resolve(&mut doc, &repl);
        assert_eq!(report.replaced, 0);
        assert!(report.unresolved.contains("name"));
        assert_eq!(texts(&doc), vec!["Hello ${name}"]);
        assert_eq!(doc.document.to_bytes().expect("xml"), {
            let reloaded = DocxDocument::from_bytes(&before).expect("reload");
            reloaded.document.to_bytes().expect("xml")
        });
    }

    #[test]
    fn resolving_empty_map_after_fill_is_byte_identical() {
        let mut doc = load(&p("${title}"));
        let repl: Replacements = [("title", "Plan ${x}")].into_iter().collect();
        resolve(&mut doc, &repl);
        let filled = doc.to_bytes().expect("save");

        let mut again = DocxDocument::from_bytes(&filled).expect("reload");
        let baseline = again.to_bytes().expect("baseline");
        resolve(&mut again, &Replacements::new());
        assert_eq!(again.to_bytes().expect("after"), baseline);
    }

    #[test]
    fn tables_headers_and_footers_are_resolved() {
        let body = format!(
            "{}<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>",
            p("${agency}"),
            p("cell ${agency}")
        );
        let bytes = FixtureDoc::new(&body)
            .header(&p("Header ${agency}"))
            .footer(&p("${year}"))
            .bytes();
        let mut doc = DocxDocument::from_bytes(&bytes).expect("load");
        let mut repl: Replacements = [("agency", "DICT"), ("year", "2025")].into_iter().collect();
        repl.set_policy("agency", ReplacePolicy::CollapseToFirstRun);
        let report = resolve(&mut doc, &repl);
        assert_eq!(report.replaced, 4);

        let cell_text = crate::docx::table::cell_paragraph_texts(
            crate::docx::table::cell_at(doc.tables()[0], 0, 0).expect("cell"),
        );
        assert_eq!(cell_text, vec!["cell DICT".to_string()]);
        let header = doc.part("word/header1.xml").expect("header");
        let hp = header.root.child("w:p").expect("p");
        assert_eq!(wml::paragraph_text(hp), "Header DICT");
        let footer = doc.part("word/footer1.xml").expect("footer");
        assert_eq!(wml::paragraph_text(footer.root.child("w:p").expect("p")), "2025");
    }
}
