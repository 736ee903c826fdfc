use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::ocr::ParagraphSet;

pub type TranslateFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Translates one paragraph at a time. `None` means no translation is
/// available and the source paragraph should be kept.
pub trait ParagraphTranslator: Send + Sync {
    fn name(&self) -> &str;
    fn translate<'a>(&'a self, paragraph: &'a str) -> TranslateFuture<'a>;
}

/// Returns every paragraph unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTranslator;

impl ParagraphTranslator for IdentityTranslator {
    fn name(&self) -> &str {
        "identity"
    }

    fn translate<'a>(&'a self, paragraph: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move { Some(paragraph.to_string()) })
    }
}

/// Pipes each paragraph through an external command: paragraph on stdin,
/// translation on stdout.
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTranslator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Splits a command line on whitespace, e.g. `trans -b :ja`.
    pub fn parse(command: &str, timeout: Duration) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("translate command is empty"))?;
        Ok(Self::new(program, parts.collect(), timeout))
    }

    async fn run(&self, paragraph: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run translate command: {}", self.program))?;
        // Feed stdin while stdout is drained so neither pipe can fill up and
        // stall the other; both sides share the timeout.
        let stdin = child.stdin.take();
        let write = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(paragraph.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async move { tokio::join!(write, child.wait_with_output()) };
        let (written, output) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| anyhow!("translate command timed out after {:?}", self.timeout))?;
        let output = output.with_context(|| "failed to read translate command output")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("translate command failed: {}", stderr.trim()));
        }
        if let Err(err) = written {
            debug!("{} stopped reading its input early: {}", self.program, err);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl ParagraphTranslator for CommandTranslator {
    fn name(&self) -> &str {
        &self.program
    }

    fn translate<'a>(&'a self, paragraph: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            match self.run(paragraph).await {
                Ok(text) if !text.is_empty() => Some(text),
                Ok(_) => {
                    warn!("{} returned an empty translation", self.program);
                    None
                }
                Err(err) => {
                    warn!("{:#}", err);
                    None
                }
            }
        })
    }
}

/// Translates each paragraph independently. Untranslatable paragraphs keep
/// their source text so the paragraph count never changes.
pub async fn translate_paragraphs(
    translator: &dyn ParagraphTranslator,
    paragraphs: &ParagraphSet,
) -> ParagraphSet {
    let mut translated = Vec::with_capacity(paragraphs.len());
    for paragraph in paragraphs {
        match translator.translate(paragraph).await {
            Some(text) => translated.push(text),
            None => {
                debug!("{}: keeping source paragraph", translator.name());
                translated.push(paragraph.clone());
            }
        }
    }
    ParagraphSet::new(translated)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl ParagraphTranslator for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn translate<'a>(&'a self, paragraph: &'a str) -> TranslateFuture<'a> {
            Box::pin(async move {
                if paragraph.starts_with("skip") {
                    None
                } else {
                    Some(paragraph.to_uppercase())
                }
            })
        }
    }

    #[tokio::test]
    async fn translates_each_paragraph() {
        let set = ParagraphSet::new(["one two", "skip me", "three"]);
        let out = translate_paragraphs(&Upper, &set).await;
        assert_eq!(out.paragraphs(), ["ONE TWO", "skip me", "THREE"]);
        assert_eq!(out.join(), "ONE TWO\n\nskip me\n\nTHREE");
    }

    #[tokio::test]
    async fn identity_keeps_text() {
        let set = ParagraphSet::new(["Hello world."]);
        assert_eq!(translate_paragraphs(&IdentityTranslator, &set).await, set);
    }

    #[test]
    fn parses_command_line() {
        let translator = CommandTranslator::parse("trans -b :ja", Duration::from_secs(5)).unwrap();
        assert_eq!(translator.program, "trans");
        assert_eq!(translator.args, ["-b", ":ja"]);
        assert!(CommandTranslator::parse("   ", Duration::from_secs(5)).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_translator_pipes_stdin() {
        let translator = CommandTranslator::new("cat", Vec::new(), Duration::from_secs(5));
        assert_eq!(translator.translate("bonjour").await.as_deref(), Some("bonjour"));

        let missing = CommandTranslator::new("definitely-not-a-command", Vec::new(), Duration::from_secs(5));
        assert_eq!(missing.translate("bonjour").await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_paragraph_streams_through_both_pipes() {
        // Far larger than a pipe buffer in each direction.
        let paragraph = vec!["word"; 200_000].join(" ");
        let translator = CommandTranslator::new("cat", Vec::new(), Duration::from_secs(20));
        let translated = translator.translate(&paragraph).await.expect("translation");
        assert_eq!(translated.len(), paragraph.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let translator = CommandTranslator::new(
            "sleep",
            vec!["5".to_string()],
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        assert_eq!(translator.translate("bonjour").await, None);
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
