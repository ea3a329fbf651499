use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const W: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

#[derive(Default)]
pub struct FixtureDoc {
    body: String,
    root_attrs: String,
    sect_pr: Option<String>,
    styles: Option<String>,
    numbering: Option<String>,
    headers: Vec<(&'static str, String)>,
    footers: Vec<(&'static str, String)>,
}

impl FixtureDoc {
    /// `body` is the inner XML of `w:body` without the final `w:sectPr`.
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            ..Default::default()
        }
    }

    /// Extra attributes (namespace declarations, `mc:Ignorable`) on `w:document`.
    pub fn root_attrs(mut self, attrs: &str) -> Self {
        self.root_attrs = attrs.to_string();
        self
    }

    /// Layout children of the final `w:sectPr`, after any header/footer references.
    pub fn sect_pr(mut self, inner: &str) -> Self {
        self.sect_pr = Some(inner.to_string());
        self
    }

    /// Inner XML of `w:styles`.
    pub fn styles(mut self, inner: &str) -> Self {
        self.styles = Some(inner.to_string());
        self
    }

    /// Inner XML of `w:numbering`.
    pub fn numbering(mut self, inner: &str) -> Self {
        self.numbering = Some(inner.to_string());
        self
    }

    /// Inner XML of the default `w:hdr`.
    pub fn header(self, inner: &str) -> Self {
        self.header_for("default", inner)
    }

    /// A header referenced with `w:type="{variant}"`.
    pub fn header_for(mut self, variant: &'static str, inner: &str) -> Self {
        self.headers.push((variant, inner.to_string()));
        self
    }

    /// Inner XML of the default `w:ftr`.
    pub fn footer(self, inner: &str) -> Self {
        self.footer_for("default", inner)
    }

    pub fn footer_for(mut self, variant: &'static str, inner: &str) -> Self {
        self.footers.push((variant, inner.to_string()));
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut overrides = String::from(
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        let mut rels = String::new();
        let mut sect_refs = String::new();
        let mut parts: Vec<(String, String)> = Vec::new();

        if let Some(styles) = &self.styles {
            overrides.push_str(r#"<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>"#);
            rels.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#);
            parts.push(("word/styles.xml".into(), format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:styles {W}>{styles}</w:styles>"#)));
        }
        if let Some(numbering) = &self.numbering {
            overrides.push_str(r#"<Override PartName="/word/numbering.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml"/>"#);
            rels.push_str(r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering" Target="numbering.xml"/>"#);
            parts.push(("word/numbering.xml".into(), format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:numbering {W}>{numbering}</w:numbering>"#)));
        }
        let stories = [
            ("header", "hdr", "headerReference", &self.headers),
            ("footer", "ftr", "footerReference", &self.footers),
        ];
        for (kind, root, reference, list) in stories {
            for (i, (variant, inner)) in list.iter().enumerate() {
                let n = i + 1;
                overrides.push_str(&format!(r#"<Override PartName="/word/{kind}{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.{kind}+xml"/>"#));
                rels.push_str(&format!(r#"<Relationship Id="rId{kind}{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/{kind}" Target="{kind}{n}.xml"/>"#));
                sect_refs.push_str(&format!(r#"<w:{reference} w:type="{variant}" r:id="rId{kind}{n}"/>"#));
                parts.push((format!("word/{kind}{n}.xml"), format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:{root} {W}>{inner}</w:{root}>"#)));
            }
        }

        let content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        );
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
        let doc_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );
        let layout = self
            .sect_pr
            .as_deref()
            .unwrap_or(r#"<w:pgSz w:w="11906" w:h="16838"/>"#);
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document {W} {}><w:body>{}<w:sectPr>{sect_refs}{layout}</w:sectPr></w:body></w:document>"#,
            self.root_attrs, self.body
        );

        let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
        let opts = SimpleFileOptions::default();
        let mut write = |name: &str, data: &str| {
            zout.start_file(name, opts).expect("start file");
            zout.write_all(data.as_bytes()).expect("write file");
        };
        write("[Content_Types].xml", &content_types);
        write("_rels/.rels", root_rels);
        write("word/document.xml", &document);
        write("word/_rels/document.xml.rels", &doc_rels);
        for (name, data) in &parts {
            write(name, data);
        }
        zout.finish().expect("finish").into_inner()
    }
}

pub fn p(text: &str) -> String {
    format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
}

pub fn styled_p(style_id: &str, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="{style_id}"/></w:pPr><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
    )
}

pub fn paragraph_style_def(id: &str, name: &str, extra: &str) -> String {
    format!(
        r#"<w:style w:type="paragraph" w:styleId="{id}"><w:name w:val="{name}"/>{extra}</w:style>"#
    )
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).expect("encode png");
    out.into_inner()
}
