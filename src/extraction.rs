//! Text extraction engine
//!
//! Optical character recognition over invoice images. The production engine
//! drives the Tesseract CLI (`tesseract stdin stdout -l <lang>`) as a child
//! process so recognition never occupies an executor thread. The engine is a
//! single long-lived handle: initialized once at startup (which verifies the
//! binary and the language model), shared by every cycle, and shut down at
//! process exit. Recognitions are serialized through an internal lock.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AuditError, Result};

/// Converts a document image into recognized plain text.
///
/// Returning an empty string is not an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn extract_text(&self, image: &[u8]) -> Result<String>;
}

/// OCR engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    /// Path or name of the Tesseract executable
    pub binary: String,
    /// Language model(s), e.g. `eng` or `eng+spa`
    pub language: String,
    /// Upper bound for a single recognition
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary: "tesseract".to_string(),
            language: "eng".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Tesseract-backed [`TextRecognizer`]
pub struct TesseractEngine {
    config: OcrConfig,
    /// `false` once shut down; held for the duration of each recognition
    state: Mutex<bool>,
}

impl TesseractEngine {
    /// Verify the engine and its language data are usable.
    pub async fn initialize(config: OcrConfig) -> Result<Self> {
        info!(binary = %config.binary, language = %config.language, "Loading OCR engine");

        let version = run_probe(&config.binary, &["--version"]).await?;
        let version = version
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let listing = run_probe(&config.binary, &["--list-langs"]).await?;
        let available = parse_language_list(&listing);
        for wanted in config.language.split('+').map(str::trim).filter(|l| !l.is_empty()) {
            if !available.iter().any(|lang| lang == wanted) {
                return Err(AuditError::Extraction(format!(
                    "language model {wanted:?} is not installed (available: {})",
                    available.join(", ")
                )));
            }
        }

        info!(version = %version, language = %config.language, "OCR engine ready");
        Ok(Self {
            config,
            state: Mutex::new(true),
        })
    }

    /// Release the engine; later recognitions fail.
    ///
    /// Waits for a recognition in progress to finish.
    pub async fn shutdown(&self) {
        let mut open = self.state.lock().await;
        if *open {
            *open = false;
            info!("OCR engine shut down");
        }
    }

    async fn recognize(&self, image: &[u8]) -> Result<String> {
        let mut child = Command::new(&self.config.binary)
            .args(["stdin", "stdout", "-l", self.config.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AuditError::Extraction(format!("failed to start OCR engine: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AuditError::Extraction("OCR engine stdin unavailable".to_string()))?;
        stdin
            .write_all(image)
            .await
            .map_err(|e| AuditError::Extraction(format!("failed to send image to OCR engine: {e}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AuditError::Extraction(format!("OCR engine did not complete: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Extraction(format!(
                "OCR engine exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TextRecognizer for TesseractEngine {
    async fn extract_text(&self, image: &[u8]) -> Result<String> {
        let open = self.state.lock().await;
        if !*open {
            return Err(AuditError::Extraction("OCR engine has been shut down".to_string()));
        }
        if image.is_empty() {
            return Err(AuditError::Extraction("empty image".to_string()));
        }

        let started = Instant::now();
        let text = tokio::time::timeout(self.config.timeout, self.recognize(image))
            .await
            .map_err(|_| {
                AuditError::Extraction(format!(
                    "recognition exceeded {:?}",
                    self.config.timeout
                ))
            })??;

        debug!(
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "OCR complete"
        );
        drop(open);
        Ok(text)
    }
}

async fn run_probe(binary: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| AuditError::Extraction(format!("cannot run {binary}: {e}")))?;

    if !output.status.success() {
        return Err(AuditError::Extraction(format!(
            "{binary} {} exited with {}",
            args.join(" "),
            output.status
        )));
    }

    // Older releases print to stderr.
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Language codes from `tesseract --list-langs` output
fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .filter(|line| !line.contains(' '))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_language_list() {
        let listing = "List of available languages in \"/usr/share/tesseract-ocr/5/tessdata/\" (3):\n\
                       eng\nosd\nspa\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "spa"]);
    }

    #[test]
    fn test_default_config() {
        let config = OcrConfig::default();
        assert_eq!(config.binary, "tesseract");
        assert_eq!(config.language, "eng");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_initialize_fails_for_missing_binary() {
        let config = OcrConfig {
            binary: "/nonexistent/tesseract-binary".to_string(),
            ..OcrConfig::default()
        };
        let err = TesseractEngine::initialize(config).await.err().unwrap();
        assert!(matches!(err, AuditError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_mock_recognizer_returns_empty_text() {
        let mut recognizer = MockTextRecognizer::new();
        recognizer
            .expect_extract_text()
            .returning(|_| Ok(String::new()));
        assert_eq!(recognizer.extract_text(b"img").await.unwrap(), "");
    }

    /// Stand-in engine binary: answers the startup probes, then runs
    /// `recognize` with the image on stdin.
    #[cfg(unix)]
    fn fake_engine(recognize: &str) -> OcrConfig {
        use std::os::unix::fs::PermissionsExt;

        let path = std::env::temp_dir().join(format!("fake-tesseract-{}", uuid::Uuid::new_v4()));
        let script = format!(
            "#!/bin/sh\n\
             case \"$1\" in\n\
             --version) echo 'tesseract 5.3.0'; exit 0 ;;\n\
             --list-langs) echo 'List of available languages in \"/usr/share/tessdata/\" (2):'; \
             echo eng; echo osd; exit 0 ;;\n\
             esac\n\
             {recognize}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        OcrConfig {
            binary: path.to_string_lossy().into_owned(),
            language: "eng".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognition_pipes_image_through_engine() {
        let engine = TesseractEngine::initialize(fake_engine("cat")).await.unwrap();
        let text = engine.extract_text(b"Invoice Total $500 P-101\n").await.unwrap();
        assert_eq!(text, "Invoice Total $500 P-101\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_initialize_rejects_missing_language() {
        let config = OcrConfig {
            language: "eng+deu".to_string(),
            ..fake_engine("cat")
        };
        let err = TesseractEngine::initialize(config).await.err().unwrap();
        assert!(err.to_string().contains("\"deu\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_recognition_times_out() {
        let config = OcrConfig {
            timeout: Duration::from_millis(300),
            ..fake_engine("sleep 5; cat")
        };
        let engine = TesseractEngine::initialize(config).await.unwrap();

        let started = Instant::now();
        let err = engine.extract_text(b"img").await.unwrap_err();
        assert!(err.to_string().contains("recognition exceeded 300ms"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_engine_reports_stderr() {
        let config = fake_engine("cat >/dev/null; echo 'bad image' >&2; exit 1");
        let engine = TesseractEngine::initialize(config).await.unwrap();
        let err = engine.extract_text(b"img").await.unwrap_err();
        assert!(matches!(err, AuditError::Extraction(_)));
        assert!(err.to_string().contains("bad image"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_recognition_after_shutdown_fails() {
        let engine = TesseractEngine::initialize(fake_engine("cat")).await.unwrap();
        engine.shutdown().await;
        engine.shutdown().await;

        let err = engine.extract_text(b"img").await.unwrap_err();
        assert!(err.to_string().contains("shut down"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_image_rejected() {
        let engine = TesseractEngine::initialize(fake_engine("cat")).await.unwrap();
        assert!(engine.extract_text(b"").await.is_err());
    }
}
