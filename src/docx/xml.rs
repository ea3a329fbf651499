use anyhow::{anyhow, Context};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
    PI(String),
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlElement> {
        match self {
            XmlNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn is_element(&self, name: &str) -> bool {
        matches!(self, XmlNode::Element(el) if el.name == name)
    }
}

impl From<XmlElement> for XmlNode {
    fn from(el: XmlElement) -> Self {
        XmlNode::Element(el)
    }
}

/// Attribute values stay escaped, text is unescaped.
#[derive(Clone, Debug, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder form of [`XmlElement::set_attr`].
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(XmlNode::Text(text.into()));
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute from an unescaped value.
    pub fn set_attr(&mut self, key: &str, value: &str) {
        let escaped = escape(value).into_owned();
        for (k, v) in self.attrs.iter_mut() {
            if k == key {
                *v = escaped;
                return;
            }
        }
        self.attrs.push((key.to_string(), escaped));
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.retain(|(k, _)| k != key);
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(XmlNode::as_element_mut)
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.elements_mut().find(|e| e.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut XmlElement> + 'a {
        self.elements_mut().filter(move |e| e.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.is_element(name))
    }

    pub fn remove_children_named(&mut self, name: &str) {
        self.children.retain(|c| !c.is_element(name));
    }

    /// Depth-first, document-order search over descendants (self excluded).
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        fn walk<'a>(el: &'a XmlElement, out: &mut Vec<&'a XmlElement>) {
            for c in el.elements() {
                out.push(c);
                walk(c, out);
            }
        }
        walk(self, &mut out);
        out
    }

    pub fn has_descendant(&self, name: &str) -> bool {
        self.elements()
            .any(|c| c.name == name || c.has_descendant(name))
    }

    pub fn for_each_descendant_mut(&mut self, f: &mut dyn FnMut(&mut XmlElement)) {
        for c in self.elements_mut() {
            f(c);
            c.for_each_descendant_mut(f);
        }
    }

    /// Child-index path (into `children`) of the first descendant matching `pred`.
    pub fn find_path(&self, pred: &dyn Fn(&XmlElement) -> bool) -> Option<Vec<usize>> {
        for (i, c) in self.children.iter().enumerate() {
            let XmlNode::Element(el) = c else {
                continue;
            };
            if pred(el) {
                return Some(vec![i]);
            }
            if let Some(mut rest) = el.find_path(pred) {
                rest.insert(0, i);
                return Some(rest);
            }
        }
        None
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut cur = self;
        for &i in path {
            cur = cur.children.get(i)?.as_element()?;
        }
        Some(cur)
    }

    pub fn element_at_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut cur = self;
        for &i in path {
            cur = cur.children.get_mut(i)?.as_element_mut()?;
        }
        Some(cur)
    }
}

/// `<?xml ...?>` pseudo-attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XmlDecl {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

impl Default for XmlDecl {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            encoding: Some("UTF-8".to_string()),
            standalone: Some("yes".to_string()),
        }
    }
}

/// A parsed XML part. Nodes between the declaration and the root are kept.
#[derive(Clone, Debug)]
pub struct XmlDocument {
    pub name: String,
    pub decl: Option<XmlDecl>,
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn new(name: &str, root: XmlElement) -> Self {
        Self {
            name: name.to_string(),
            decl: Some(XmlDecl::default()),
            prolog: Vec::new(),
            root,
        }
    }

    pub fn parse(name: &str, xml_bytes: &[u8]) -> anyhow::Result<Self> {
        Self::read_tree(name, xml_bytes).with_context(|| format!("parse xml: {name}"))
    }

    fn read_tree(name: &str, xml_bytes: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Reader::from_reader(xml_bytes);
        reader.config_mut().trim_text(false);

        let mut decl = None;
        let mut prolog = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let node = match reader.read_event_into(&mut buf).context("read xml event")? {
                Event::Eof => break,
                Event::Decl(d) => {
                    decl = Some(XmlDecl {
                        version: lossy(d.version().context("decl version")?),
                        encoding: d.encoding().and_then(Result::ok).map(lossy),
                        standalone: d.standalone().and_then(Result::ok).map(lossy),
                    });
                    continue;
                }
                Event::Start(s) => {
                    stack.push(open_element(&s)?);
                    continue;
                }
                Event::Empty(s) => XmlNode::Element(open_element(&s)?),
                Event::End(e) => {
                    let end = lossy(e.name().as_ref());
                    let el = stack.pop().ok_or_else(|| anyhow!("unbalanced </{end}>"))?;
                    if el.name != end {
                        return Err(anyhow!("mismatched </{end}> for <{}>", el.name));
                    }
                    XmlNode::Element(el)
                }
                Event::Text(t) => XmlNode::Text(t.unescape().context("unescape text")?.into_owned()),
                Event::CData(t) => XmlNode::CData(lossy(t.into_inner())),
                Event::Comment(t) => XmlNode::Comment(lossy(t.into_inner())),
                Event::PI(t) => XmlNode::PI(format!("{}{}", lossy(t.target()), lossy(t.content()))),
                Event::DocType(_) => continue,
            };
            match (stack.last_mut(), node) {
                (Some(parent), node) => parent.children.push(node),
                (None, XmlNode::Element(el)) if root.is_none() => root = Some(el),
                (None, XmlNode::Element(el)) => return Err(anyhow!("second root element <{}>", el.name)),
                (None, node) if root.is_none() => prolog.push(node),
                // Whitespace and comments after the root are dropped.
                (None, _) => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(anyhow!("unterminated <{}>", open.name));
        }
        let root = root.ok_or_else(|| anyhow!("no root element"))?;
        Ok(Self {
            name: name.to_string(),
            decl,
            prolog,
            root,
        })
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let mut out = String::new();
        if let Some(decl) = &self.decl {
            out.push_str(&format!(r#"<?xml version="{}""#, decl.version));
            if let Some(encoding) = &decl.encoding {
                out.push_str(&format!(r#" encoding="{encoding}""#));
            }
            if let Some(standalone) = &decl.standalone {
                out.push_str(&format!(r#" standalone="{standalone}""#));
            }
            out.push_str("?>");
        }
        for node in &self.prolog {
            write_node(&mut out, node);
        }
        write_element(&mut out, &self.root);
        Ok(out.into_bytes())
    }
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

fn open_element(start: &BytesStart<'_>) -> anyhow::Result<XmlElement> {
    let mut el = XmlElement::new(lossy(start.name().as_ref()));
    for attr in start.attributes() {
        let attr = attr.context("attr")?;
        // Raw value: character references such as `&#xD;&#xA;` in VML attributes
        // must be written back untouched.
        el.attrs.push((lossy(attr.key.as_ref()), lossy(attr.value.as_ref())));
    }
    Ok(el)
}

fn write_element(out: &mut String, el: &XmlElement) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn write_node(out: &mut String, node: &XmlNode) {
    match node {
        XmlNode::Element(el) => write_element(out, el),
        XmlNode::Text(text) => out.push_str(&partial_escape(text.as_str())),
        XmlNode::CData(text) => {
            out.push_str("<![CDATA[");
            out.push_str(text);
            out.push_str("]]>");
        }
        XmlNode::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        XmlNode::PI(content) => {
            out.push_str("<?");
            out.push_str(content);
            out.push_str("?>");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{XmlDocument, XmlElement, XmlNode};

    #[test]
    fn attribute_character_references_survive() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let doc = XmlDocument::parse("test.xml", xml).expect("parse xml");
        let s = String::from_utf8(doc.to_bytes().expect("write xml")).expect("utf8");

        assert!(s.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(s.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!s.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn tree_round_trip_is_stable() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">a &amp; b </w:t></w:r></w:p><!-- note --><w:sectPr/></w:body></w:document>"#;
        let doc = XmlDocument::parse("word/document.xml", xml).expect("parse");
        assert_eq!(doc.prolog, vec![XmlNode::Text("\n".to_string())]);
        let once = doc.to_bytes().expect("write");
        let again = XmlDocument::parse("word/document.xml", &once)
            .expect("reparse")
            .to_bytes()
            .expect("rewrite");
        assert_eq!(once, again);
        let s = String::from_utf8(once).expect("utf8");
        assert!(s.contains("a &amp; b "));
        assert!(s.contains("<!-- note -->"));
        assert!(s.contains("<w:sectPr/>"));
    }

    #[test]
    fn malformed_trees_are_errors() {
        assert!(XmlDocument::parse("x.xml", b"<a><b></a></b>").is_err());
        assert!(XmlDocument::parse("x.xml", b"<a><b></b>").is_err());
        assert!(XmlDocument::parse("x.xml", b"<a/><b/>").is_err());
        assert!(XmlDocument::parse("x.xml", b"<!-- only a comment -->").is_err());
    }

    #[test]
    fn find_path_walks_document_order() {
        let root = XmlElement::new("body")
            .with_child(XmlElement::new("p").with_attr("id", "1"))
            .with_child(
                XmlElement::new("tbl").with_child(XmlElement::new("p").with_attr("id", "2")),
            );
        let path = root
            .find_path(&|e| e.name == "p" && e.attr("id") == Some("2"))
            .expect("path");
        assert_eq!(path, vec![1, 0]);
        assert_eq!(root.element_at(&path).and_then(|e| e.attr("id")), Some("2"));
    }

    #[test]
    fn set_attr_escapes_values() {
        let el = XmlElement::new("w:t").with_attr("w:val", "a<b & \"c\"");
        assert_eq!(el.attr("w:val"), Some("a&lt;b &amp; &quot;c&quot;"));
    }
}
