//! Overlay CLI
//!
//! Bakes a saved annotation set into a PDF without a browser, and reports
//! page sizes for laying annotations out ahead of time.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use overlay_core::{EditorConfig, EditorSession, HelveticaMeasurer, NoopListeners, PageSize};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "overlay-cli")]
#[command(version, about = "Apply text and image overlays to PDF pages")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose saved annotations into a new PDF
    Compose {
        /// Source PDF
        #[arg(short, long)]
        input: PathBuf,

        /// Annotation set saved by the editor (JSON)
        #[arg(short, long)]
        session: PathBuf,

        /// Where to write the composed PDF
        #[arg(short, long)]
        output: PathBuf,

        /// Draw text without a white background
        #[arg(long)]
        transparent: bool,

        /// Editor configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the size of every page as JSON
    Pages {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct PageReport {
    page: u32,
    size: Option<PageSize>,
}

fn open_session(pdf: &[u8], config: EditorConfig) -> Result<EditorSession<NoopListeners>> {
    EditorSession::open(pdf, NoopListeners, Box::new(HelveticaMeasurer), config)
        .context("Failed to open PDF")
}

async fn compose(pdf: &[u8], annotations: &str, config: EditorConfig, transparent: bool) -> Result<Vec<u8>> {
    let mut session = open_session(pdf, config)?;
    session
        .restore_annotations(annotations)
        .context("Failed to load annotations")?;
    if transparent {
        session.set_transparent_text(true);
    }

    tracing::info!(
        pages = session.page_count(),
        annotations = session.store().len(),
        "composing"
    );
    let bytes = session.export().await.context("Export failed")?;
    Ok(bytes)
}

fn page_report(pdf: &[u8]) -> Result<Vec<PageReport>> {
    let session = open_session(pdf, EditorConfig::default())?;
    Ok((0..session.page_count())
        .map(|page| PageReport {
            page,
            size: session.page_size(page),
        })
        .collect())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    let Some(path) = path else {
        return Ok(EditorConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    EditorConfig::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Compose {
            input,
            session,
            output,
            transparent,
            config,
        } => {
            if input == output {
                bail!("Refusing to overwrite the input PDF");
            }
            let config = load_config(config.as_deref())?;
            let pdf = read(&input)?;
            let annotations = std::fs::read_to_string(&session)
                .with_context(|| format!("Failed to read {}", session.display()))?;

            let bytes = compose(&pdf, &annotations, config, transparent).await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(bytes = bytes.len(), output = %output.display(), "written");
        }
        Command::Pages { input } => {
            let pdf = read(&input)?;
            let report = page_report(&pdf)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Stdout is reserved for command output
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(args).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object};
    use overlay_core::{AnnotationDraft, AnnotationStore, DisplayRect};
    use pretty_assertions::assert_eq;

    fn pdf(sizes: &[(i64, i64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = sizes
            .iter()
            .map(|(w, h)| {
                doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), (*w).into(), (*h).into()],
                })
                .into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => sizes.len() as i64,
                "Kids" => kids,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn annotations(page_count: u32, page: u32) -> String {
        let mut store = AnnotationStore::new(page_count);
        store
            .add(
                page,
                AnnotationDraft::text(DisplayRect::new(72.0, 72.0, 200.0, 40.0), "Signed", 14.0, "#1a1a1a"),
            )
            .unwrap();
        store.to_json().unwrap()
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "overlay-cli",
            "compose",
            "--input",
            "in.pdf",
            "--session",
            "a.json",
            "--output",
            "out.pdf",
            "--transparent",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::Compose { transparent: true, config: None, .. }));
    }

    #[test]
    fn test_page_report() {
        let report = page_report(&pdf(&[(612, 792), (842, 595)])).unwrap();
        assert_eq!(
            report,
            vec![
                PageReport {
                    page: 0,
                    size: Some(PageSize::new(612.0, 792.0)),
                },
                PageReport {
                    page: 1,
                    size: Some(PageSize::new(842.0, 595.0)),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_compose_writes_overlay_content() {
        let out = compose(
            &pdf(&[(612, 792), (612, 792)]),
            &annotations(2, 1),
            EditorConfig::default(),
            false,
        )
        .await
        .unwrap();

        let doc = Document::load_mem(&out).unwrap();
        let pages = doc.get_pages();
        let content = doc.get_page_content(pages[&2]).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("(Signed) Tj"));
        assert!(doc.get_page_content(pages[&1]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_compose_rejects_mismatched_annotations() {
        let result = compose(
            &pdf(&[(612, 792)]),
            &annotations(3, 2),
            EditorConfig::default(),
            false,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_compose_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.pdf");
        let session = dir.path().join("annotations.json");
        let output = dir.path().join("out.pdf");
        std::fs::write(&input, pdf(&[(612, 792)])).unwrap();
        std::fs::write(&session, annotations(1, 0)).unwrap();

        run(Args {
            command: Command::Compose {
                input: input.clone(),
                session,
                output: output.clone(),
                transparent: true,
                config: None,
            },
        })
        .await
        .unwrap();

        let doc = Document::load_mem(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[tokio::test]
    async fn test_run_refuses_to_overwrite_input() {
        let path = PathBuf::from("same.pdf");
        let result = run(Args {
            command: Command::Compose {
                input: path.clone(),
                session: PathBuf::from("a.json"),
                output: path,
                transparent: false,
                config: None,
            },
        })
        .await;
        assert!(result.is_err());
    }
}
