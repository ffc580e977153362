//! CSV encoding of result streams and the file-backed writer.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crawlnet_catalog::{FailureRecord, ProductRecord};

use crate::blocking::offload;

use super::{ResultWriter, SinkError};

pub const SUCCESS_HEADERS: [&str; 14] = [
    "Sr No",
    "Product Name",
    "SKU",
    "Description",
    "Main Description",
    "Sizes",
    "Color",
    "Material",
    "Includes",
    "Washing Instructions",
    "Brand",
    "Image URLs",
    "Product URL",
    "Origin",
];

pub const FAILURE_HEADERS: [&str; 4] = ["Sr No", "Product Name", "SKU", "Error"];

pub fn encode_successes<W: Write>(out: W, records: &[ProductRecord]) -> Result<(), SinkError> {
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    w.write_record(SUCCESS_HEADERS)?;
    for r in records {
        let d = &r.details;
        let index = r.index.to_string();
        let images = d.joined_image_urls();
        w.write_record([
            index.as_str(),
            r.product_name.as_str(),
            r.sku.as_str(),
            d.description.as_str(),
            d.main_description.as_str(),
            d.sizes.as_str(),
            d.color.as_str(),
            d.material.as_str(),
            d.includes.as_str(),
            d.washing_instructions.as_str(),
            d.brand.as_str(),
            images.as_str(),
            r.product_url.as_str(),
            r.origin.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

pub fn encode_failures<W: Write>(out: W, records: &[FailureRecord]) -> Result<(), SinkError> {
    let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    w.write_record(FAILURE_HEADERS)?;
    for r in records {
        let index = r.index.to_string();
        w.write_record([
            index.as_str(),
            r.product_name.as_str(),
            r.sku.as_str(),
            r.error.as_str(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Writes result artifacts as CSV files under one directory.
#[derive(Debug, Clone)]
pub struct CsvResultWriter {
    dir: PathBuf,
}

impl CsvResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve an artifact name to its path.
    ///
    /// Only bare file names are accepted.
    pub fn locate(&self, name: &str) -> Result<PathBuf, SinkError> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(SinkError::InvalidName(name.to_string()));
        }
        let path = self.dir.join(name);
        if !path.is_file() {
            return Err(SinkError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, SinkError> {
        let path = self.locate(name)?;
        Ok(offload(|| fs::read(&path))?)
    }

    fn replace<F>(&self, name: &str, encode: F) -> Result<String, SinkError>
    where
        F: FnOnce(&mut fs::File) -> Result<(), SinkError>,
    {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        offload(|| {
            let mut file = fs::File::create(&tmp)?;
            encode(&mut file)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            Ok::<_, SinkError>(())
        })?;
        Ok(name.to_string())
    }
}

impl ResultWriter for CsvResultWriter {
    fn write_successes(&self, name: &str, records: &[ProductRecord]) -> Result<String, SinkError> {
        self.replace(name, |f| encode_successes(f, records))
    }

    fn write_failures(&self, name: &str, records: &[FailureRecord]) -> Result<String, SinkError> {
        self.replace(name, |f| encode_failures(f, records))
    }
}
