//! DOCX files are ZIP archives of XML parts. Entries keep their original
//! order so `[Content_Types].xml` stays first when re-packed.

use std::fs::File;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use zip::CompressionMethod;
use zip::read::ZipArchive;
use zip::write::{SimpleFileOptions, ZipWriter};

use super::TemplateError;

#[derive(Debug, Default)]
pub struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TemplateError> {
        Self::from_reader(File::open(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateError> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(reader)?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut contents = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut contents)?;
            entries.push((name, contents));
        }

        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// Replace an entry, or append it if absent
    pub fn set(&mut self, name: impl Into<String>, contents: Vec<u8>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, data)) => *data = contents,
            None => self.entries.push((name, contents)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, data)| (n.as_str(), data.as_slice()))
    }

    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W, TemplateError> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, contents) in &self.entries {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(contents)?;
        }

        Ok(zip.finish()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }
}
