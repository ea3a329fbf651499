use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use serde::Deserialize;

use crate::compose::BreakPolicy;
use crate::docx::drawing::ImageExtent;
use crate::docx::wml::RunStyle;
use crate::forms::ORG_STRUCTURE_EXTENT;
use crate::template::placeholder::{PolicyTable, ReplacePolicy};

pub const CONFIG_FILE_NAME: &str = "docx-assembler.toml";
pub const CONFIG_ENV: &str = "DOCX_ASSEMBLER_CONFIG";

const DEFAULT_IMAGE_WIDTH_IN: f32 = 6.0;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub templates: TemplatesSection,
    /// Per-key replacement policy, `[placeholders.<key>]`.
    #[serde(default)]
    pub placeholders: HashMap<String, PlaceholderRule>,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub merge: MergeSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TemplatesSection {
    /// Directory holding the templates. Relative to the config file.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default)]
    pub records: Option<String>,
    #[serde(default)]
    pub logframe: Option<String>,
    #[serde(default)]
    pub part_ib: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderMode {
    #[default]
    InRun,
    Collapse,
    Restyle,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PlaceholderRule {
    #[serde(default)]
    pub mode: PlaceholderMode,
    #[serde(flatten)]
    pub style: RunStyle,
    #[serde(default)]
    pub quoted: bool,
}

impl PlaceholderRule {
    pub fn policy(&self) -> ReplacePolicy {
        match self.mode {
            PlaceholderMode::InRun => ReplacePolicy::InRun,
            PlaceholderMode::Collapse => ReplacePolicy::CollapseToFirstRun,
            PlaceholderMode::Restyle => ReplacePolicy::Restyle {
                style: self.style.clone(),
                quoted: self.quoted,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ImagesSection {
    /// Width of anchored images in inches; height keeps the aspect ratio.
    #[serde(default)]
    pub width_in: Option<f32>,
    #[serde(default)]
    pub part_ib: Option<ExplicitSize>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct ExplicitSize {
    pub width_in: f32,
    pub height_in: f32,
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BreakPolicyName {
    #[default]
    Section,
    PageRun,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MergeSection {
    #[serde(default)]
    pub break_policy: BreakPolicyName,
}

impl AppConfig {
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::default();
        for (key, rule) in &self.placeholders {
            table.set(key.clone(), rule.policy());
        }
        table
    }

    pub fn image_width_in(&self) -> f32 {
        self.images
            .width_in
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_IMAGE_WIDTH_IN)
    }

    pub fn part_ib_extent(&self) -> ImageExtent {
        match self.images.part_ib {
            Some(size) => ImageExtent::Explicit {
                width_in: size.width_in,
                height_in: size.height_in,
            },
            None => ORG_STRUCTURE_EXTENT,
        }
    }

    pub fn break_policy(&self) -> BreakPolicy {
        match self.merge.break_policy {
            BreakPolicyName::Section => BreakPolicy::SectionBreak,
            BreakPolicyName::PageRun => BreakPolicy::PageBreakRun,
        }
    }

    /// Resolves a template name against `[templates].dir`.
    pub fn template_path(&self, name: &str) -> PathBuf {
        match &self.templates.dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if let Some(w) = self.images.width_in {
            if w <= 0.0 {
                return Err(anyhow!("images.width_in must be positive, got {w}"));
            }
        }
        if let Some(size) = self.images.part_ib {
            if size.width_in <= 0.0 || size.height_in <= 0.0 {
                return Err(anyhow!("images.part_ib needs a positive width_in and height_in"));
            }
        }
        for (key, rule) in &self.placeholders {
            if rule.mode != PlaceholderMode::Restyle && (!rule.style.is_empty() || rule.quoted) {
                log::warn!("placeholders.{key}: formatting is only used with mode = \"restyle\"");
            }
        }
        Ok(())
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// `DOCX_ASSEMBLER_CONFIG` first, then upwards from the working directory,
/// then next to the executable.
pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
        if p.exists() {
            return Some(p);
        }
        log::warn!("{CONFIG_ENV} points at {} which does not exist", p.display());
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let mut cfg = parse_config(&text)?;
    if let Some(dir) = cfg.templates.dir.take() {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        cfg.templates.dir = Some(if dir.is_absolute() { dir } else { base.join(dir) });
    }
    log::debug!("loaded config {}", path.display());
    Ok(cfg)
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    cfg.validate()?;
    Ok(cfg)
}

const DEFAULT_CONFIG_TOML: &str = r#"# docx-assembler configuration.
# Searched upwards from the working directory, or set DOCX_ASSEMBLER_CONFIG.

[templates]
# dir = "templates"
# records = "templates_records.docx"
# logframe = "templates_logframe.docx"
# part_ib = "templates_I_b.docx"

# Per-placeholder replacement policy. mode is one of:
#   in_run   - replace inside each run, keeping its formatting (default)
#   collapse - write the whole paragraph text into its first run
#   restyle  - replace the paragraph's runs with one run formatted below
#
# [placeholders.projectDescription]
# mode = "restyle"
# font = "Arial"
# size = 11
# italic = true
# quoted = true

[images]
# Width in inches for anchored images; height keeps the aspect ratio.
width_in = 6.0

# [images.part_ib]
# width_in = 8.29
# height_in = 5.27

[merge]
# "section"  - end each document's section with a next-page section break
# "page_run" - insert a paragraph holding a page break
break_policy = "section"
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);
    if cfg_path.exists() && !force {
        return Err(anyhow!(
            "config already exists: {} (use --force to overwrite)",
            cfg_path.display()
        ));
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
