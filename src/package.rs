//! Distributable artifacts: brotli and zip encodings of the vacuumed database,
//! each hashed and listed in `manifest.json`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::config::PublishSettings;
use crate::model::{ArtifactEncoding, ArtifactManifest, BuildInfo, BuildStats, ManifestEntry};
use crate::util::{sha256_file, utc_string, write_json_pretty};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_SCHEMA: &str = "https://json-schema.org/draft/2020-12/schema";
pub const MANIFEST_VERSION: &str = "1.0.0";

const BROTLI_QUALITY: u32 = 11;
const BROTLI_LGWIN: u32 = 22;
const BROTLI_BUFFER: usize = 4096;
const ZIP_LEVEL: i32 = 9;
const ARTIFACT_KIND: &str = "sqlite";

pub struct PackageResult {
    pub manifest: ArtifactManifest,
    pub manifest_path: PathBuf,
    /// Encodings that failed and were left out of the manifest.
    pub failures: Vec<String>,
}

pub struct Packager<'a> {
    output_dir: &'a Path,
    publish: &'a PublishSettings,
}

impl<'a> Packager<'a> {
    pub fn new(output_dir: &'a Path, publish: &'a PublishSettings) -> Self {
        Self {
            output_dir,
            publish,
        }
    }

    /// Encodes the database, hashes each artifact and writes the manifest.
    /// The database must already be vacuumed and closed to writers.
    pub fn package(
        &self,
        db_path: &Path,
        tables: BTreeMap<String, i64>,
        stats: &BuildStats,
    ) -> Result<PackageResult> {
        let db_name = db_path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("database path has no file name: {}", db_path.display()))?;

        let mut files = Vec::new();
        let mut failures = Vec::new();
        for encoding in [ArtifactEncoding::Brotli, ArtifactEncoding::Zip] {
            let artifact = self
                .output_dir
                .join(format!("{db_name}.{}", encoding.extension()));
            let encoded = match encoding {
                ArtifactEncoding::Brotli => compress_brotli(db_path, &artifact),
                ArtifactEncoding::Zip => compress_zip(db_path, &artifact, db_name),
            };

            match encoded.and_then(|()| self.manifest_entry(&artifact, encoding)) {
                Ok(entry) => {
                    info!(
                        file = %entry.name,
                        encoding = encoding.as_str(),
                        size = entry.size,
                        sha256 = %entry.sha256,
                        "artifact written"
                    );
                    files.push(entry);
                }
                Err(err) => {
                    warn!(encoding = encoding.as_str(), error = %format!("{err:#}"), "compression failed, artifact skipped");
                    failures.push(format!("{} compression: {err:#}", encoding.as_str()));
                }
            }
        }

        let end_time = stats.end_time.unwrap_or_else(chrono::Utc::now);
        let manifest = ArtifactManifest {
            schema: MANIFEST_SCHEMA.to_string(),
            version: MANIFEST_VERSION.to_string(),
            api_version: self.publish.api_version.clone(),
            generated_at: utc_string(chrono::Utc::now()),
            files,
            tables,
            build: BuildInfo {
                start_time: utc_string(stats.start_time),
                end_time: utc_string(end_time),
                duration_seconds: (end_time - stats.start_time).num_milliseconds() as f64 / 1000.0,
                runner: self.publish.runner.clone(),
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        let manifest_path = self.output_dir.join(MANIFEST_FILE);
        write_json_pretty(&manifest_path, &manifest)?;
        info!(path = %manifest_path.display(), files = manifest.files.len(), "manifest written");

        Ok(PackageResult {
            manifest,
            manifest_path,
            failures,
        })
    }

    fn manifest_entry(&self, artifact: &Path, encoding: ArtifactEncoding) -> Result<ManifestEntry> {
        let name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("artifact has no file name: {}", artifact.display()))?
            .to_string();
        let size = fs::metadata(artifact)
            .with_context(|| format!("failed to stat {}", artifact.display()))?
            .len();

        Ok(ManifestEntry {
            url: format!("{}/{name}", self.publish.base_url.trim_end_matches('/')),
            name,
            size,
            sha256: sha256_file(artifact)?,
            encoding,
            kind: ARTIFACT_KIND.to_string(),
        })
    }
}

pub fn compress_brotli(input: &Path, output: &Path) -> Result<()> {
    let mut reader = BufReader::new(
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?,
    );
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
    let mut writer =
        brotli::CompressorWriter::new(BufWriter::new(file), BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_LGWIN);

    io::copy(&mut reader, &mut writer)
        .with_context(|| format!("failed to brotli-encode {}", input.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("failed to flush {}", output.display()))?;
    Ok(())
}

pub fn compress_zip(input: &Path, output: &Path, entry_name: &str) -> Result<()> {
    let mut reader = BufReader::new(
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?,
    );
    let file =
        File::create(output).with_context(|| format!("failed to create {}", output.display()))?;

    let mut archive = zip::ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(ZIP_LEVEL))
        .large_file(true);
    archive
        .start_file(entry_name, options)
        .with_context(|| format!("failed to start zip entry {entry_name}"))?;
    io::copy(&mut reader, &mut archive)
        .with_context(|| format!("failed to deflate {}", input.display()))?;
    archive
        .finish()
        .with_context(|| format!("failed to finish {}", output.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use chrono::Utc;

    use super::*;

    fn sample_db(dir: &Path) -> PathBuf {
        let path = dir.join("pflanzenschutz.sqlite");
        let payload = (0..2000)
            .map(|index| format!("row {index}: Kupferhydroxid 350 g/kg\n"))
            .collect::<String>();
        fs::write(&path, payload).unwrap();
        path
    }

    fn publish() -> PublishSettings {
        PublishSettings {
            base_url: "https://example.test/db/".to_string(),
            runner: "test".to_string(),
            api_version: "v1".to_string(),
        }
    }

    #[test]
    fn brotli_artifact_decodes_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let db = sample_db(dir.path());
        let artifact = dir.path().join("out.br");

        compress_brotli(&db, &artifact).unwrap();

        let mut decoded = Vec::new();
        brotli::Decompressor::new(File::open(&artifact).unwrap(), 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, fs::read(&db).unwrap());
        assert!(fs::metadata(&artifact).unwrap().len() < fs::metadata(&db).unwrap().len());
    }

    #[test]
    fn zip_artifact_holds_database_entry() {
        let dir = tempfile::tempdir().unwrap();
        let db = sample_db(dir.path());
        let artifact = dir.path().join("out.zip");

        compress_zip(&db, &artifact, "pflanzenschutz.sqlite").unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&artifact).unwrap()).unwrap();
        let mut entry = archive.by_name("pflanzenschutz.sqlite").unwrap();
        let mut decoded = Vec::new();
        entry.read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, fs::read(&db).unwrap());
    }

    #[test]
    fn manifest_hashes_match_artifacts_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db = sample_db(dir.path());
        let publish = publish();
        let mut stats = BuildStats::start(Utc::now());
        stats.finish(Utc::now());
        let tables = BTreeMap::from([("bvl_mittel".to_string(), 2400)]);

        let result = Packager::new(dir.path(), &publish)
            .package(&db, tables, &stats)
            .unwrap();

        assert!(result.failures.is_empty());
        let manifest = &result.manifest;
        assert_eq!(manifest.files.len(), 2);
        for entry in &manifest.files {
            let path = dir.path().join(&entry.name);
            assert_eq!(entry.sha256, sha256_file(&path).unwrap());
            assert_eq!(entry.size, fs::metadata(&path).unwrap().len());
            assert_eq!(entry.url, format!("https://example.test/db/{}", entry.name));
        }
        assert!(manifest.files.iter().all(|entry| entry.name != "pflanzenschutz.sqlite"));
        assert_eq!(manifest.tables.get("bvl_mittel"), Some(&2400));

        let written: serde_json::Value =
            serde_json::from_slice(&fs::read(&result.manifest_path).unwrap()).unwrap();
        assert_eq!(written["$schema"], MANIFEST_SCHEMA);
        assert_eq!(written["files"][0]["encoding"], "brotli");
        assert_eq!(written["files"][1]["type"], "sqlite");
        assert_eq!(written["build"]["runner"], "test");
    }

    #[test]
    fn failed_encoding_is_left_out_of_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let db = sample_db(dir.path());
        // A directory squatting on the zip path makes that encoding fail.
        fs::create_dir(dir.path().join("pflanzenschutz.sqlite.zip")).unwrap();
        let publish = publish();
        let stats = BuildStats::start(Utc::now());

        let result = Packager::new(dir.path(), &publish)
            .package(&db, BTreeMap::new(), &stats)
            .unwrap();

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.manifest.files.len(), 1);
        assert_eq!(result.manifest.files[0].encoding, ArtifactEncoding::Brotli);
    }
}
