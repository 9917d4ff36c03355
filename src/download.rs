use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tokio::io::AsyncWriteExt;

use crate::cli::LoadArgs;
use crate::storage::{StoragePaths, file_present_nonempty};

const GEONAMES_US_ZIP_URL: &str = "https://download.geonames.org/export/zip/US.zip";

/// Where the ZIP centroid table for a load comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CentroidSource {
    /// `--zip-centroids-file`; must exist.
    Given(PathBuf),
    /// A GeoNames extract left by an earlier load.
    Cached(PathBuf),
    /// Fetch `US.zip` and unpack it to this path.
    Fetch(PathBuf),
}

fn plan_centroid_source(paths: &StoragePaths, opts: &LoadArgs) -> anyhow::Result<CentroidSource> {
    if let Some(given) = opts.zip_centroids_file.as_deref() {
        let given = PathBuf::from(given);
        if !file_present_nonempty(&given) {
            return Err(anyhow!(
                "ZIP centroid file {} is missing or empty",
                given.display()
            ));
        }
        return Ok(CentroidSource::Given(given));
    }

    let cached = paths.geonames_us_txt();
    match (file_present_nonempty(&cached) && !opts.force_download, opts.offline) {
        (true, _) => Ok(CentroidSource::Cached(cached)),
        (false, false) => Ok(CentroidSource::Fetch(cached)),
        (false, true) => Err(anyhow!(
            "no ZIP centroids under {} and --offline forbids fetching them; \
             pass --zip-centroids-file with a GeoNames US.txt",
            paths.geo_dir.display()
        )),
    }
}

/// Resolves the GeoNames `US.txt` used to fill `zip_centroids`, fetching it
/// only when no usable copy is on disk.
pub async fn ensure_zip_centroids(paths: &StoragePaths, opts: &LoadArgs) -> anyhow::Result<PathBuf> {
    match plan_centroid_source(paths, opts)? {
        CentroidSource::Given(path) => {
            tracing::info!("Using ZIP centroids from {}", path.display());
            Ok(path)
        }
        CentroidSource::Cached(path) => {
            tracing::info!("Reusing cached ZIP centroids at {}", path.display());
            Ok(path)
        }
        CentroidSource::Fetch(out_txt) => {
            let archive = paths.geonames_us_zip();
            ensure_download(GEONAMES_US_ZIP_URL, &archive, opts.force_download).await?;
            extract_first_txt_from_zip(&archive, &out_txt)
                .with_context(|| format!("unpack ZIP centroids from {}", archive.display()))?;
            Ok(out_txt)
        }
    }
}

/// Streams `url` into a `.part` sibling of `dest`, renamed once complete.
async fn ensure_download(url: &str, dest: &Path, force: bool) -> anyhow::Result<()> {
    use futures_util::StreamExt;

    if !force && file_present_nonempty(dest) {
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }

    tracing::info!("Downloading {} -> {}", url, dest.display());
    let t0 = std::time::Instant::now();
    let resp = reqwest::get(url)
        .await
        .with_context(|| format!("GET {url}"))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(anyhow!("Download failed ({status}): {url}"));
    }

    let part = part_path(dest);
    let mut file = tokio::fs::File::create(&part)
        .await
        .with_context(|| format!("create {}", part.display()))?;
    let mut body = resp.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("read body chunk from {url}"))?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, dest)
        .await
        .with_context(|| format!("rename {} -> {}", part.display(), dest.display()))?;
    tracing::info!(
        "Downloaded {:.1} MB in {:.1}s",
        written as f64 / 1e6,
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    dest.with_file_name(name)
}

/// Copies `US.txt` out of the GeoNames archive, falling back to the first
/// `.txt` entry when the archive uses another name.
fn extract_first_txt_from_zip(zip_path: &Path, out_txt: &Path) -> anyhow::Result<()> {
    let f =
        std::fs::File::open(zip_path).with_context(|| format!("open {}", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(f).context("read zip archive")?;

    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let entry = names
        .iter()
        .find(|n| n.ends_with("US.txt"))
        .or_else(|| {
            let mut txt: Vec<&String> = names.iter().filter(|n| n.ends_with(".txt")).collect();
            txt.sort();
            txt.into_iter().next()
        })
        .ok_or_else(|| anyhow!("no .txt file found in {}", zip_path.display()))?;

    if let Some(parent) = out_txt.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut src = archive.by_name(entry)?;
    let mut out = std::fs::File::create(out_txt)
        .with_context(|| format!("create {}", out_txt.display()))?;
    std::io::copy(&mut src, &mut out).with_context(|| format!("extract {entry}"))?;
    Ok(())
}
