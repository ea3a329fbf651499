use anyhow::{anyhow, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde_json::{Map, Value};

use crate::docx::drawing::ImageExtent;
use crate::error::AssembleError;
use crate::template::placeholder::{PolicyTable, Replacements};

/// Part I.B fields rendered with thousands separators.
pub const PART_IB_NUMERIC_FIELDS: &[&str] = &[
    "mooe",
    "co",
    "total",
    "nicthsProjectCost",
    "hsdvProjectCost",
    "hecsProjectCost",
    "totalEmployees",
    "regionalOffices",
    "provincialOffices",
    "coPlantilaPositions",
    "coVacant",
    "coFilledPlantilaPositions",
    "coFilledPhysicalPositions",
    "coCosws",
    "coContractual",
    "coTotal",
    "foPlantilaPositions",
    "foVacant",
    "foFilledPlantilaPositions",
    "foFilledPhysicalPositions",
    "foCosws",
    "foContractual",
    "foTotal",
];

pub const ORG_STRUCTURE_KEY: &str = "organizationalStructure";

pub const ORG_STRUCTURE_EXTENT: ImageExtent = ImageExtent::Explicit {
    width_in: 8.29,
    height_in: 5.27,
};

/// `"1234567"` → `"1,234,567"`. Blank input gives `"0"`; anything that is not
/// a number comes back trimmed and without commas. Fractions are truncated.
pub fn format_number(value: &str) -> String {
    let value = value.trim().replace(',', "");
    if value.is_empty() {
        return "0".to_string();
    }
    let looks_numeric = value
        .chars()
        .filter(|c| *c != '-' && *c != '.')
        .all(|c| c.is_ascii_digit())
        && value.chars().any(|c| c.is_ascii_digit());
    if !looks_numeric {
        log::debug!("value {value:?} is not a number; left as is");
        return value;
    }
    let Ok(num) = value.parse::<f64>() else {
        return value;
    };
    let num = num.trunc();
    let digits = format!("{:.0}", num.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if num < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Decodes a base64 image, with or without a `data:` URL prefix.
pub fn decode_base64_image(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    B64.decode(cleaned.as_bytes()).context("decode base64 image")
}

/// Part I.B scalar replacements: every scalar field except the organizational
/// structure image, numeric fields formatted.
pub fn part_ib_replacements(data: &Map<String, Value>, policies: PolicyTable) -> Replacements {
    let mut out = Replacements::with_policies(policies);
    for (key, value) in data {
        if key == ORG_STRUCTURE_KEY {
            continue;
        }
        let Some(text) = scalar_text(value) else {
            log::debug!("skipping non-scalar field {key}");
            continue;
        };
        if PART_IB_NUMERIC_FIELDS.contains(&key.as_str()) {
            out.insert(key.clone(), format_number(&text));
        } else {
            out.insert(key.clone(), text);
        }
    }
    out
}

pub fn part_ib_image(data: &Map<String, Value>) -> anyhow::Result<Option<Vec<u8>>> {
    match data.get(ORG_STRUCTURE_KEY) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(decode_base64_image(s)?)),
        Some(Value::String(_)) | Some(Value::Null) | None => Ok(None),
        Some(other) => Err(anyhow!("{ORG_STRUCTURE_KEY} must be a base64 string, got {other}")),
    }
}

#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Document parts whose template carries a fixed set of image anchors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImagePart {
    /// Part II.A: information system diagrams.
    IIA,
    /// Part II.D: network layouts.
    IID,
}

impl ImagePart {
    pub fn anchors(self) -> &'static [&'static str] {
        match self {
            ImagePart::IIA => &["ISI", "ISII", "ISIII"],
            ImagePart::IID => &["NLC", "PNL"],
        }
    }

    pub fn from_template_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("templates_ii_a") {
            Some(ImagePart::IIA)
        } else if lower.contains("templates_ii_d") {
            Some(ImagePart::IID)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ImagePart::IIA => "Part II.A",
            ImagePart::IID => "Part II.D",
        }
    }

    /// Pairs anchors with images sorted by file name. The count must match exactly.
    pub fn map_images(
        self,
        mut images: Vec<Upload>,
    ) -> Result<Vec<(&'static str, Upload)>, AssembleError> {
        let anchors = self.anchors();
        if images.len() != anchors.len() {
            return Err(AssembleError::schema(format!(
                "{} requires exactly {} images, got {}",
                self.label(),
                anchors.len(),
                images.len()
            )));
        }
        images.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(anchors.iter().copied().zip(images).collect())
    }
}
