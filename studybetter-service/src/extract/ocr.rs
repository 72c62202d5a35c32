//! Tesseract adapter and best-of-N trial runner.
//!
//! The engine is an external executable. It is located once per process
//! (default command name first, then well-known install paths) and the
//! result is cached; recognition shells out per call with a bounded
//! runtime. Every failure mode here degrades to "no text" for the unit
//! in question; nothing in this module is fatal to an extraction.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::extract::preprocess;

/// Bound on the `tesseract --version` probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One engine parameter set tried by the trial runner.
#[derive(Debug, Clone, Copy)]
pub struct OcrParams {
    /// Page segmentation mode (`--psm`).
    pub psm: Option<u8>,
    /// OCR engine mode (`--oem`).
    pub oem: Option<u8>,
    /// Character whitelist (`-c tessedit_char_whitelist=...`).
    pub whitelist: Option<&'static str>,
}

impl OcrParams {
    const fn new(psm: u8, oem: u8) -> Self {
        Self {
            psm: Some(psm),
            oem: Some(oem),
            whitelist: None,
        }
    }

    /// The engine's bare defaults: no explicit mode flags at all.
    pub const BARE: Self = Self {
        psm: None,
        oem: None,
        whitelist: None,
    };
}

const WHITELIST: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz.,!?;: ";

/// The fixed, ordered trial list. Earlier entries are not assumed better;
/// all are tried and compared by trimmed output length.
pub const TRIAL_PARAMS: [OcrParams; 7] = [
    OcrParams {
        psm: Some(6),
        oem: None,
        whitelist: Some(WHITELIST),
    },
    OcrParams::new(4, 3),
    OcrParams::new(3, 3),
    OcrParams::new(6, 3),
    OcrParams::new(1, 3),
    OcrParams::new(8, 3),
    OcrParams::new(13, 3),
];

/// Resolved location of the tesseract executable.
#[derive(Debug, Clone)]
pub struct EngineLocation {
    pub command: PathBuf,
    pub version: String,
}

static ENGINE: OnceLock<Option<EngineLocation>> = OnceLock::new();

/// Locate the OCR engine, probing at most once per process lifetime.
/// Returns `None` when no usable executable exists on this host.
pub fn engine() -> Option<&'static EngineLocation> {
    ENGINE.get_or_init(locate_engine).as_ref()
}

fn locate_engine() -> Option<EngineLocation> {
    // The default command name wins when it is on PATH.
    if let Some(version) = probe_version(Path::new("tesseract")) {
        info!(version = %version, "Tesseract found on PATH");
        return Some(EngineLocation {
            command: PathBuf::from("tesseract"),
            version,
        });
    }

    for candidate in candidate_paths() {
        if !candidate.exists() {
            continue;
        }
        if let Some(version) = probe_version(&candidate) {
            info!(path = %candidate.display(), version = %version, "Tesseract found");
            return Some(EngineLocation {
                command: candidate,
                version,
            });
        }
    }

    warn!(
        "Tesseract not found; OCR stages will contribute no text. \
         Install it with `apt-get install tesseract-ocr` (Linux), \
         `brew install tesseract` (macOS), or the UB-Mannheim build (Windows)."
    );
    None
}

#[cfg(not(windows))]
fn candidate_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/bin/tesseract"),
        PathBuf::from("/usr/local/bin/tesseract"),
        PathBuf::from("/opt/homebrew/bin/tesseract"),
    ]
}

#[cfg(windows)]
fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(r"C:\Program Files\Tesseract-OCR\tesseract.exe"),
        PathBuf::from(r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe"),
    ];
    if let Ok(username) = std::env::var("USERNAME") {
        paths.push(PathBuf::from(format!(
            r"C:\Users\{username}\AppData\Local\Tesseract-OCR\tesseract.exe"
        )));
    }
    paths
}

/// Run `--version` under the probe bound; a parsable first line means the
/// binary is usable.
fn probe_version(command: &Path) -> Option<String> {
    let mut cmd = Command::new(command);
    cmd.arg("--version");

    match run_with_timeout(cmd, PROBE_TIMEOUT) {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let combined = if stdout.trim().is_empty() {
                String::from_utf8_lossy(&output.stderr).to_string()
            } else {
                stdout.to_string()
            };
            combined
                .split_whitespace()
                .nth(1)
                .map(|v| v.to_string())
                .or(Some("unknown".to_string()))
        }
        Ok(_) => None,
        Err(e) => {
            debug!(command = %command.display(), error = %e, "Version probe failed");
            None
        }
    }
}

/// Recognize text in one image with one parameter set.
///
/// Returns empty text (never an error) when the engine is missing, the
/// invocation times out, or the engine exits abnormally; all such
/// conditions are logged.
pub fn recognize(image: &DynamicImage, params: OcrParams, config: &ExtractionConfig) -> String {
    let Some(location) = engine() else {
        return String::new();
    };

    let tmp = match write_temp_png(image) {
        Ok(tmp) => tmp,
        Err(e) => {
            warn!(error = %e, "Failed to stage image for OCR");
            return String::new();
        }
    };

    let mut cmd = Command::new(&location.command);
    cmd.arg(tmp.path()).arg("stdout").arg("-l").arg(&config.ocr_language);
    if let Some(psm) = params.psm {
        cmd.arg("--psm").arg(psm.to_string());
    }
    if let Some(oem) = params.oem {
        cmd.arg("--oem").arg(oem.to_string());
    }
    if let Some(whitelist) = params.whitelist {
        cmd.arg("-c")
            .arg(format!("tessedit_char_whitelist={whitelist}"));
    }

    let timeout = Duration::from_secs(config.ocr_timeout_secs);
    match run_with_timeout(cmd, timeout) {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).to_string()
        }
        Ok(output) => {
            debug!(
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "OCR invocation exited abnormally"
            );
            String::new()
        }
        Err(e) => {
            warn!(error = %e, "OCR invocation failed");
            String::new()
        }
    }
}

fn write_temp_png(image: &DynamicImage) -> std::io::Result<tempfile::NamedTempFile> {
    let tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
    image
        .save(tmp.path())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(tmp)
}

/// Run the full trial list against a preprocessed copy of `image` and keep
/// the best result by trimmed length. When the best falls below the floor,
/// make one extra bare-default attempt against the unpreprocessed original
/// and adopt it if it beats the previous best.
///
/// Never fails: with no engine on the host this returns an empty string.
pub fn recognize_best(image: &DynamicImage, config: &ExtractionConfig) -> String {
    if engine().is_none() {
        return String::new();
    }

    let prepared = DynamicImage::ImageLuma8(preprocess::prepare_for_ocr(image));

    let trials = TRIAL_PARAMS
        .iter()
        .map(|params| recognize(&prepared, *params, config));
    let mut best = select_best(trials);

    if best.trim().len() < config.ocr_floor_len {
        let retry = recognize(image, OcrParams::BARE, config);
        if retry.trim().len() > best.trim().len() {
            debug!(chars = retry.trim().len(), "Bare-default retry beat trial results");
            best = retry;
        }
    }

    best.trim().to_string()
}

/// Keep the candidate with the maximum trimmed length; ties keep the
/// first-seen result.
fn select_best(trials: impl Iterator<Item = String>) -> String {
    let mut best = String::new();
    let mut best_len = 0;
    for text in trials {
        let len = text.trim().len();
        if len > best_len {
            debug!(chars = len, "Better OCR trial result");
            best = text;
            best_len = len;
        }
    }
    best
}

/// Spawn the command and poll for completion, killing the child at the
/// deadline. Both pipes are drained on background threads while we wait;
/// a child writing more than the pipe buffer holds would otherwise block
/// forever and only ever be reaped by the timeout kill.
pub(crate) fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<Output> {
    use std::io::Read;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    fn drain(pipe: Option<impl Read + Send + 'static>) -> std::thread::JoinHandle<Vec<u8>> {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = pipe {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        })
    }

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Output {
                status,
                stdout: stdout.join().unwrap_or_default(),
                stderr: stderr.join().unwrap_or_default(),
            });
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("process exceeded {}s", timeout.as_secs()),
            ));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}
