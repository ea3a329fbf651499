use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use docx_assembler::compose::BreakPolicy;
use docx_assembler::config::{
    find_default_config, init_default_config, load_config, AppConfig, CONFIG_FILE_NAME,
};
use docx_assembler::error::Origin;
use docx_assembler::forms::Upload;
use docx_assembler::jobs::{self, RecordKind};
use docx_assembler::AssembleError;

#[derive(Parser, Debug)]
#[command(name = "docx-assembler")]
#[command(about = "Fill, tabulate and merge .docx documents from JSON input", long_about = None)]
struct Args {
    /// Config file path (default: DOCX_ASSEMBLER_CONFIG, or docx-assembler.toml searched upwards)
    #[arg(long, global = true, value_name = "TOML")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace placeholders, bullet anchors and images in a template
    Fill {
        #[arg(long, value_name = "DOCX")]
        template: PathBuf,
        /// {"values": {..}, "lists": {..}, "images": {..}, "picture_controls": {..}}
        #[arg(long, value_name = "JSON")]
        data: PathBuf,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Append one labeled-field table per record
    Tables {
        #[arg(long, value_enum)]
        kind: TableKind,
        #[arg(long, value_name = "JSON")]
        records: PathBuf,
        /// Template to append to (default: [templates].records, else a blank document)
        #[arg(long, value_name = "DOCX")]
        template: Option<PathBuf>,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Build logical framework tables
    Logframe {
        #[arg(long, value_name = "JSON")]
        data: PathBuf,
        /// Template to append to (default: [templates].logframe, else a blank document)
        #[arg(long, value_name = "DOCX")]
        template: Option<PathBuf>,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Concatenate 2 to 5 documents in the given order
    Merge {
        #[arg(value_name = "DOCX", required = true)]
        inputs: Vec<PathBuf>,
        /// Seam between documents (default: [merge].break_policy)
        #[arg(long, value_enum)]
        break_policy: Option<BreakKind>,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Place uploaded images into a templates_II_a / templates_II_d document
    Images {
        #[arg(long, value_name = "DOCX")]
        template: PathBuf,
        #[arg(value_name = "IMAGE", required = true)]
        images: Vec<PathBuf>,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Fill the Part I.B template from its form data
    PartIb {
        /// Template (default: [templates].part_ib)
        #[arg(long, value_name = "DOCX")]
        template: Option<PathBuf>,
        #[arg(long, value_name = "JSON")]
        data: PathBuf,
        #[arg(short, long, value_name = "DOCX")]
        output: PathBuf,
    },

    /// Write a commented default config, then exit
    InitConfig {
        /// Directory to write the config to (default: current directory)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TableKind {
    System,
    Database,
    Project,
    ProjectLong,
}

impl From<TableKind> for RecordKind {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::System => RecordKind::System,
            TableKind::Database => RecordKind::Database,
            TableKind::Project => RecordKind::Project,
            TableKind::ProjectLong => RecordKind::ProjectLong,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BreakKind {
    Section,
    PageRun,
}

impl From<BreakKind> for BreakPolicy {
    fn from(kind: BreakKind) -> Self {
        match kind {
            BreakKind::Section => BreakPolicy::SectionBreak,
            BreakKind::PageRun => BreakPolicy::PageBreakRun,
        }
    }
}

fn read_input(path: &Path, origin: Origin) -> Result<Vec<u8>, AssembleError> {
    std::fs::read(path)
        .with_context(|| format!("read {}", path.display()))
        .map_err(|cause| AssembleError::load(path.display().to_string(), origin, cause))
}

fn read_upload(path: &Path) -> Result<Upload, AssembleError> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(Upload {
        file_name,
        bytes: read_input(path, Origin::Client)?,
    })
}

fn read_template(
    explicit: Option<&Path>,
    configured: Option<&str>,
    cfg: &AppConfig,
) -> Result<Option<Vec<u8>>, AssembleError> {
    let path = match (explicit, configured) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(name)) => cfg.template_path(name),
        (None, None) => return Ok(None),
    };
    read_input(&path, Origin::Server).map(Some)
}

/// Printed on stdout after a successful run.
#[derive(Serialize, Debug)]
struct WrittenResponse {
    output: String,
    bytes: usize,
    content_type: &'static str,
}

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output.docx");
    path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}

/// Writes through a sibling temp file so a failed run never leaves a partial output.
fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp = temp_sibling(path);
    let written = std::fs::write(&tmp, bytes)
        .with_context(|| format!("write {}", tmp.display()))
        .and_then(|()| {
            std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))
        });
    if written.is_err() && tmp.is_file() {
        let _ = std::fs::remove_file(&tmp);
    }
    written
}

fn resolve_config(explicit: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let path = match explicit {
        Some(p) => Some(p),
        None => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            find_default_config(&cwd, CONFIG_FILE_NAME)
        }
    };
    match path {
        Some(p) => load_config(&p),
        None => {
            log::debug!("no {CONFIG_FILE_NAME} found; using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn run(command: Command, cfg: &AppConfig) -> Result<(Vec<u8>, PathBuf), AssembleError> {
    match command {
        Command::Fill {
            template,
            data,
            output,
        } => {
            let tpl = read_input(&template, Origin::Server)?;
            let json = read_input(&data, Origin::Client)?;
            Ok((jobs::fill(&tpl, &json, cfg)?, output))
        }
        Command::Tables {
            kind,
            records,
            template,
            output,
        } => {
            let json = read_input(&records, Origin::Client)?;
            let tpl = read_template(template.as_deref(), cfg.templates.records.as_deref(), cfg)?;
            Ok((jobs::tables(tpl.as_deref(), kind.into(), &json)?, output))
        }
        Command::Logframe {
            data,
            template,
            output,
        } => {
            let json = read_input(&data, Origin::Client)?;
            let tpl = read_template(template.as_deref(), cfg.templates.logframe.as_deref(), cfg)?;
            Ok((jobs::logframes(tpl.as_deref(), &json)?, output))
        }
        Command::Merge {
            inputs,
            break_policy,
            output,
        } => {
            let uploads = inputs
                .iter()
                .map(|p| read_upload(p))
                .collect::<Result<Vec<_>, _>>()?;
            let policy = break_policy.map(BreakPolicy::from).unwrap_or_else(|| cfg.break_policy());
            Ok((jobs::merge(&uploads, policy)?, output))
        }
        Command::Images {
            template,
            images,
            output,
        } => {
            let tpl = read_upload(&template)?;
            let uploads = images
                .iter()
                .map(|p| read_upload(p))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((jobs::image_part(&tpl, uploads, cfg.image_width_in())?, output))
        }
        Command::PartIb {
            template,
            data,
            output,
        } => {
            let tpl = read_template(template.as_deref(), cfg.templates.part_ib.as_deref(), cfg)?
                .ok_or_else(|| {
                    AssembleError::schema("part-ib needs --template or [templates].part_ib")
                })?;
            let json = read_input(&data, Origin::Client)?;
            Ok((jobs::part_ib(&tpl, &json, cfg)?, output))
        }
        Command::InitConfig { .. } => Err(AssembleError::schema("init-config is handled before jobs")),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();

    if let Command::InitConfig { dir, force } = &args.command {
        let dir = dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, *force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let cfg = resolve_config(args.config).context("load config")?;
    match run(args.command, &cfg) {
        Ok((bytes, output)) => {
            write_output(&output, &bytes)?;
            log::info!("wrote {} ({} bytes)", output.display(), bytes.len());
            let written = WrittenResponse {
                output: output.display().to_string(),
                bytes: bytes.len(),
                content_type: jobs::DOCX_MIME,
            };
            println!("{}", serde_json::to_string(&written).context("serialize response")?);
            Ok(())
        }
        Err(err) => {
            log::error!("{err}");
            let body = serde_json::to_string(&err.to_response()).context("serialize error")?;
            println!("{body}");
            std::process::exit(1);
        }
    }
}
