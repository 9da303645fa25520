//! # tesseract-locate
//!
//! Find a [tesseract](https://github.com/tesseract-ocr/tesseract) executable
//! on the current machine and make sure the language model it needs
//! (`<lang>.traineddata`) is available, downloading it into a per-user cache
//! when it is not.
//!
//! ## How it works
//!
//! [`find_tesseract`] checks, in order:
//!
//! 1. `TESSERACT_PATH` — explicit path to the executable.
//! 2. Every directory on `PATH`.
//! 3. Well-known install locations for the current platform.
//!
//! The first hit is cached for the rest of the process.
//!
//! [`ensure_traineddata`] returns a tessdata directory holding the requested
//! language model:
//!
//! 1. `TESSDATA_PREFIX` if it already contains the model.
//! 2. The cache directory ([`tessdata_cache_dir`]) if it already contains it.
//! 3. Otherwise the model is downloaded from the tessdata_fast repository
//!    into the cache directory.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tesseract_locate::{ensure_traineddata, find_tesseract};
//!
//! let exe = find_tesseract().expect("tesseract not installed");
//! let tessdata = ensure_traineddata("eng", None).expect("model unavailable");
//! println!("{} with models in {}", exe.display(), tessdata.display());
//! ```
//!
//! ## Environment variable overrides
//!
//! - `TESSERACT_PATH` — path to the tesseract executable.
//! - `TESSDATA_PREFIX` — existing tessdata directory (tesseract's own variable).
//! - `TESSERACT_LOCATE_CACHE_DIR` — override the default model cache directory.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Base URL the language models are fetched from.
pub const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata_fast/raw/main";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tesseract-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// No executable was found via the env override, `PATH` or install dirs.
    #[error("tesseract executable not found (searched: {searched})")]
    NotFound { searched: String },

    /// The executable exists but could not be run.
    #[error("Failed to run '{path}': {reason}")]
    Exec { path: PathBuf, reason: String },

    /// Could not create or write the local model cache.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// Network download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// The language code contains characters that cannot name a model file.
    #[error("Invalid language code '{0}'")]
    InvalidLanguage(String),
}

// ── Platform metadata ────────────────────────────────────────────────────────

fn executable_name() -> &'static str {
    if cfg!(windows) {
        "tesseract.exe"
    } else {
        "tesseract"
    }
}

fn well_known_locations() -> &'static [&'static str] {
    if cfg!(windows) {
        &[
            r"C:\Program Files\Tesseract-OCR\tesseract.exe",
            r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
        ]
    } else if cfg!(target_os = "macos") {
        &["/opt/homebrew/bin/tesseract", "/usr/local/bin/tesseract"]
    } else {
        &["/usr/bin/tesseract", "/usr/local/bin/tesseract"]
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the directory downloaded language models are stored in.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/scanroute/tessdata/`
/// - **Linux**: `~/.cache/scanroute/tessdata/`
/// - **Windows**: `%LOCALAPPDATA%\scanroute\tessdata\`
///
/// Override by setting `TESSERACT_LOCATE_CACHE_DIR`.
pub fn tessdata_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var("TESSERACT_LOCATE_CACHE_DIR") {
        return PathBuf::from(override_dir).join("tessdata");
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("scanroute").join("tessdata")
}

/// File name of the model for `lang`, e.g. `eng.traineddata`.
pub fn traineddata_file_name(lang: &str) -> Result<String, LocateError> {
    let valid = !lang.is_empty()
        && lang
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(LocateError::InvalidLanguage(lang.to_string()));
    }
    Ok(format!("{lang}.traineddata"))
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_EXE: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate the tesseract executable.
///
/// Safe to call from multiple threads; the search runs at most a handful of
/// times and the first successful result is reused.
pub fn find_tesseract() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_EXE.get() {
        return Ok(path.clone());
    }

    let path = search_executable()?;
    let _ = RESOLVED_EXE.set(path.clone());
    Ok(path)
}

/// Run `<exe> --version` and return the first line, e.g. `tesseract 5.3.4`.
pub fn tesseract_version(exe: &Path) -> Result<String, LocateError> {
    let output = Command::new(exe)
        .arg("--version")
        .output()
        .map_err(|e| LocateError::Exec {
            path: exe.to_path_buf(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(LocateError::Exec {
            path: exe.to_path_buf(),
            reason: format!("exit status {}", output.status),
        });
    }

    // Older builds print the banner to stderr.
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

/// Ensure `<lang>.traineddata` is on disk and return the tessdata directory
/// that holds it.
///
/// `on_progress` receives `(bytes_downloaded, total_size_option)` while a
/// model is being downloaded. Pass `None` to suppress progress callbacks.
pub fn ensure_traineddata(
    lang: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<PathBuf, LocateError> {
    let file_name = traineddata_file_name(lang)?;

    // 1. tesseract's own override.
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let dir = PathBuf::from(prefix);
        if dir.join(&file_name).exists() {
            return Ok(dir);
        }
    }

    // 2. Already cached on disk.
    let cache_dir = tessdata_cache_dir();
    let model_path = cache_dir.join(&file_name);
    if model_path.exists() {
        return Ok(cache_dir);
    }

    // 3. Download.
    std::fs::create_dir_all(&cache_dir).map_err(LocateError::CacheDir)?;
    let url = format!("{TESSDATA_REPO}/{file_name}");
    let bytes = download_bytes(&url, on_progress)?;
    write_atomically(&model_path, &bytes)?;

    Ok(cache_dir)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn search_executable() -> Result<PathBuf, LocateError> {
    let mut searched = Vec::new();

    // 1. Environment variable override.
    if let Ok(env_path) = std::env::var("TESSERACT_PATH") {
        let p = PathBuf::from(&env_path);
        if p.is_file() {
            return Ok(p);
        }
        searched.push(format!("TESSERACT_PATH={env_path}"));
    }

    // 2. PATH lookup.
    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let candidate = dir.join(executable_name());
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        searched.push("PATH".to_string());
    }

    // 3. Platform install locations.
    for location in well_known_locations() {
        let p = PathBuf::from(location);
        if p.is_file() {
            return Ok(p);
        }
        searched.push((*location).to_string());
    }

    Err(LocateError::NotFound {
        searched: searched.join(", "),
    })
}

/// Streams a URL into a `Vec<u8>`, calling `on_progress` every 64 KiB.
fn download_bytes(
    url: &str,
    on_progress: Option<&dyn Fn(u64, Option<u64>)>,
) -> Result<Vec<u8>, LocateError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("tesseract-locate/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| LocateError::Download(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| LocateError::Download(format!("GET {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(LocateError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let capacity = total.unwrap_or(4 * 1024 * 1024) as usize;
    let mut buf = Vec::with_capacity(capacity);

    let mut stream = response;
    let mut chunk = vec![0u8; 64 * 1024]; // 64 KiB
    let mut downloaded: u64 = 0;

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                downloaded += n as u64;
                if let Some(cb) = on_progress {
                    cb(downloaded, total);
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(LocateError::Download(format!("Read error: {e}")));
            }
        }
    }

    Ok(buf)
}

/// A half-written model makes tesseract abort, so write beside and rename.
fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), LocateError> {
    let tmp = dest.with_extension("traineddata.part");
    let mut file = std::fs::File::create(&tmp).map_err(LocateError::CacheDir)?;
    file.write_all(bytes).map_err(LocateError::CacheDir)?;
    file.sync_all().map_err(LocateError::CacheDir)?;
    std::fs::rename(&tmp, dest).map_err(LocateError::CacheDir)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_dir_is_deterministic() {
        let d1 = tessdata_cache_dir();
        let d2 = tessdata_cache_dir();
        assert_eq!(d1, d2);
        assert!(d1.ends_with("tessdata"));
    }

    #[test]
    fn cache_dir_override_via_env() {
        std::env::set_var("TESSERACT_LOCATE_CACHE_DIR", "/tmp/test_scanroute_override");
        let d = tessdata_cache_dir();
        std::env::remove_var("TESSERACT_LOCATE_CACHE_DIR");
        assert!(d.starts_with("/tmp/test_scanroute_override"));
        assert!(d.ends_with("tessdata"));
    }

    #[test]
    fn traineddata_name_for_valid_languages() {
        assert_eq!(traineddata_file_name("eng").unwrap(), "eng.traineddata");
        assert_eq!(
            traineddata_file_name("chi_sim").unwrap(),
            "chi_sim.traineddata"
        );
    }

    #[test]
    fn traineddata_name_rejects_path_like_languages() {
        assert!(traineddata_file_name("").is_err());
        assert!(traineddata_file_name("../eng").is_err());
        assert!(traineddata_file_name("eng/x").is_err());
    }

    #[test]
    fn write_atomically_leaves_no_partial_file() {
        let dir = std::env::temp_dir().join(format!("tl-atomic-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let dest = dir.join("xyz.traineddata");
        write_atomically(&dest, b"model").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"model");
        assert!(!dir.join("xyz.traineddata.part").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn well_known_locations_nonempty() {
        assert!(!well_known_locations().is_empty());
        assert!(executable_name().starts_with("tesseract"));
    }
}
