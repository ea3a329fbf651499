use std::io::Cursor;

use anyhow::{anyhow, Context};
use image::{ImageFormat, ImageReader};

use crate::docx::xml::XmlElement;

pub const EMU_PER_INCH: f64 = 914_400.0;

const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ImageExtent {
    Explicit { width_in: f32, height_in: f32 },
    /// Fixed width, height follows the pixel aspect ratio.
    Width(f32),
}

#[derive(Clone, Debug)]
pub struct ImageInfo {
    pub extension: &'static str,
    pub content_type: &'static str,
    pub width_px: u32,
    pub height_px: u32,
}

pub fn inspect_image(bytes: &[u8]) -> anyhow::Result<ImageInfo> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("sniff image format")?;
    let format = reader.format().ok_or_else(|| anyhow!("unrecognized image format"))?;
    let (extension, content_type) = match format {
        ImageFormat::Png => ("png", "image/png"),
        ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
        ImageFormat::Gif => ("gif", "image/gif"),
        ImageFormat::Bmp => ("bmp", "image/bmp"),
        other => return Err(anyhow!("unsupported image format: {other:?}")),
    };
    let (width_px, height_px) = reader.into_dimensions().context("read image dimensions")?;
    Ok(ImageInfo {
        extension,
        content_type,
        width_px,
        height_px,
    })
}

/// Resolves an extent to `(cx, cy)` in EMU.
pub fn extent_emu(extent: ImageExtent, info: &ImageInfo) -> (u64, u64) {
    match extent {
        ImageExtent::Explicit {
            width_in,
            height_in,
        } => (to_emu(width_in), to_emu(height_in)),
        ImageExtent::Width(width_in) => {
            let cx = to_emu(width_in);
            let cy = if info.width_px == 0 {
                cx
            } else {
                (cx as f64 * info.height_px as f64 / info.width_px as f64).round() as u64
            };
            (cx, cy)
        }
    }
}

fn to_emu(inches: f32) -> u64 {
    (inches as f64 * EMU_PER_INCH).round().max(0.0) as u64
}

/// `w:drawing` holding an inline picture that embeds relationship `rel_id`.
pub fn inline_picture(rel_id: &str, doc_pr_id: u32, name: &str, cx: u64, cy: u64) -> XmlElement {
    let cx = cx.to_string();
    let cy = cy.to_string();
    let id = doc_pr_id.to_string();

    let blip_fill = XmlElement::new("pic:blipFill")
        .with_child(XmlElement::new("a:blip").with_attr("r:embed", rel_id))
        .with_child(XmlElement::new("a:stretch").with_child(XmlElement::new("a:fillRect")));
    let sp_pr = XmlElement::new("pic:spPr")
        .with_child(
            XmlElement::new("a:xfrm")
                .with_child(XmlElement::new("a:off").with_attr("x", "0").with_attr("y", "0"))
                .with_child(XmlElement::new("a:ext").with_attr("cx", &cx).with_attr("cy", &cy)),
        )
        .with_child(
            XmlElement::new("a:prstGeom")
                .with_attr("prst", "rect")
                .with_child(XmlElement::new("a:avLst")),
        );
    let pic = XmlElement::new("pic:pic")
        .with_attr("xmlns:pic", PIC_NS)
        .with_child(
            XmlElement::new("pic:nvPicPr")
                .with_child(XmlElement::new("pic:cNvPr").with_attr("id", "0").with_attr("name", name))
                .with_child(XmlElement::new("pic:cNvPicPr")),
        )
        .with_child(blip_fill)
        .with_child(sp_pr);
    let graphic = XmlElement::new("a:graphic").with_attr("xmlns:a", A_NS).with_child(
        XmlElement::new("a:graphicData")
            .with_attr("uri", PIC_NS)
            .with_child(pic),
    );
    let inline = XmlElement::new("wp:inline")
        .with_attr("distT", "0")
        .with_attr("distB", "0")
        .with_attr("distL", "0")
        .with_attr("distR", "0")
        .with_child(XmlElement::new("wp:extent").with_attr("cx", &cx).with_attr("cy", &cy))
        .with_child(
            XmlElement::new("wp:effectExtent")
                .with_attr("l", "0")
                .with_attr("t", "0")
                .with_attr("r", "0")
                .with_attr("b", "0"),
        )
        .with_child(XmlElement::new("wp:docPr").with_attr("id", &id).with_attr("name", name))
        .with_child(
            XmlElement::new("wp:cNvGraphicFramePr").with_child(
                XmlElement::new("a:graphicFrameLocks")
                    .with_attr("xmlns:a", A_NS)
                    .with_attr("noChangeAspect", "1"),
            ),
        )
        .with_child(graphic);
    XmlElement::new("w:drawing").with_child(inline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_only_extent_keeps_aspect_ratio() {
        let info = ImageInfo {
            extension: "png",
            content_type: "image/png",
            width_px: 200,
            height_px: 100,
        };
        assert_eq!(extent_emu(ImageExtent::Width(6.0), &info), (5_486_400, 2_743_200));
        assert_eq!(
            extent_emu(
                ImageExtent::Explicit {
                    width_in: 8.29,
                    height_in: 5.27
                },
                &info
            ),
            (7_580_376, 4_818_888)
        );
    }

    #[test]
    fn inspection_rejects_garbage() {
        assert!(inspect_image(b"not an image").is_err());
    }

    #[test]
    fn inline_picture_references_relationship() {
        let d = inline_picture("rId7", 3, "Picture 3", 10, 20);
        let blip = d
            .descendants()
            .into_iter()
            .find(|e| e.name == "a:blip")
            .expect("blip");
        assert_eq!(blip.attr("r:embed"), Some("rId7"));
        let doc_pr = d.descendants().into_iter().find(|e| e.name == "wp:docPr").expect("docPr");
        assert_eq!(doc_pr.attr("id"), Some("3"));
    }
}
