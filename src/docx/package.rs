use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use anyhow::{anyhow, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTENT_TYPES_ENTRY: &str = "[Content_Types].xml";

#[derive(Clone, Debug)]
pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxEntry {
    /// A fresh deflated entry for parts and media added during assembly.
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            compression: CompressionMethod::Deflated,
            last_modified: zip::DateTime::default(),
            unix_mode: None,
            is_dir: false,
        }
    }
}

/// Zip entries in their original order, with the metadata needed to write
/// untouched parts back as they were read.
#[derive(Clone, Debug, Default)]
pub struct DocxPackage {
    entries: Vec<DocxEntry>,
    index: HashMap<String, usize>,
}

impl DocxPackage {
    pub fn from_entries(entries: impl IntoIterator<Item = DocxEntry>) -> Self {
        let mut pkg = Self::default();
        for ent in entries {
            pkg.push(ent);
        }
        pkg
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let f = File::open(path).with_context(|| format!("open docx: {}", path.display()))?;
        Self::read_from(f)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Self::read_from(Cursor::new(bytes))
    }

    fn read_from<R: Read + Seek>(reader: R) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut pkg = Self::default();
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {}", file.name()))?;
            let ent = DocxEntry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            };
            if pkg.index.contains_key(&ent.name) {
                log::warn!("duplicate zip entry {}; keeping the last one", ent.name);
            }
            pkg.push(ent);
        }
        if !pkg.contains(CONTENT_TYPES_ENTRY) {
            return Err(anyhow!("not a docx package: missing {CONTENT_TYPES_ENTRY}"));
        }
        Ok(pkg)
    }

    fn push(&mut self, ent: DocxEntry) {
        match self.index.get(&ent.name) {
            Some(&i) => self.entries[i] = ent,
            None => {
                self.index.insert(ent.name.clone(), self.entries.len());
                self.entries.push(ent);
            }
        }
    }

    pub fn entries(&self) -> &[DocxEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Replaces the data of `name`, appending a new entry when it does not exist yet.
    pub fn put(&mut self, name: &str, data: Vec<u8>) {
        match self.index.get(name) {
            Some(&i) => self.entries[i].data = data,
            None => self.push(DocxEntry::new(name, data)),
        }
    }

    /// Writes every entry, taking data from `overrides` where present.
    /// `[Content_Types].xml` always goes first.
    pub fn write_to<W: Write + Seek>(
        &self,
        writer: W,
        overrides: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<W> {
        let mut zout = ZipWriter::new(writer);
        let ordered = self
            .entries
            .iter()
            .filter(|e| e.name == CONTENT_TYPES_ENTRY)
            .chain(self.entries.iter().filter(|e| e.name != CONTENT_TYPES_ENTRY));
        for ent in ordered {
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(&ent.name, opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
                continue;
            }
            let data = overrides.get(&ent.name).unwrap_or(&ent.data);
            zout.start_file(&ent.name, opts)
                .with_context(|| format!("start zip file: {}", ent.name))?;
            zout.write_all(data)
                .with_context(|| format!("write zip file: {}", ent.name))?;
        }
        zout.finish().context("finish zip")
    }

    pub fn to_bytes(&self, overrides: &HashMap<String, Vec<u8>>) -> anyhow::Result<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()), overrides)?.into_inner())
    }
}
